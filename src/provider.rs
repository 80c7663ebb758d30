use std::time::{Duration, Instant};

use spider_client::shapes::request::{ReturnFormat, ReturnFormatHandling};
use spider_client::{RequestParams, Spider};
use tracing::{debug, info, warn};

use crate::error::ScrapeError;
use crate::parser::Document;

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;
const USER_AGENT: &str = concat!("roadmap_scraper/", env!("CARGO_PKG_VERSION"));

/// A fetched page before parsing.
#[derive(Debug, Clone)]
pub struct Page {
    pub url: String,
    pub status: u16,
    pub html: String,
}

/// A rendering session. Callers own the handle and must `close()` it,
/// including after a failed `initialize()`.
#[allow(async_fn_in_trait)]
pub trait DocumentProvider {
    async fn initialize(&mut self) -> Result<(), ScrapeError>;
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<Page, ScrapeError>;
    async fn close(&mut self) -> Result<(), ScrapeError>;
}

/// Navigate under a hard timeout and reject HTTP error statuses.
pub async fn fetch_page<P: DocumentProvider>(
    provider: &P,
    url: &str,
    timeout: Duration,
) -> Result<Page, ScrapeError> {
    debug!("Navigating to {} ({:.0}s budget)", url, timeout.as_secs_f64());
    let start = Instant::now();
    let page = match tokio::time::timeout(timeout, provider.navigate(url, timeout)).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(ScrapeError::NavigationTimeout {
                url: url.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    };
    if page.status >= 400 {
        return Err(ScrapeError::Navigation {
            url: url.to_string(),
            reason: format!("HTTP {}", page.status),
        });
    }
    debug!("Fetched {} in {}ms", url, start.elapsed().as_millis());
    Ok(page)
}

pub async fn fetch_document<P: DocumentProvider>(
    provider: &P,
    url: &str,
    timeout: Duration,
) -> Result<Document, ScrapeError> {
    let page = fetch_page(provider, url, timeout).await?;
    Document::parse(&page.url, &page.html)
}

/// Rendered fetches through spider.cloud.
#[derive(Default)]
pub struct SpiderProvider {
    client: Option<Spider>,
}

impl SpiderProvider {
    fn params() -> RequestParams {
        RequestParams {
            return_format: Some(ReturnFormatHandling::Single(ReturnFormat::Raw)),
            ..Default::default()
        }
    }

    fn client(&self) -> Result<&Spider, ScrapeError> {
        self.client
            .as_ref()
            .ok_or_else(|| ScrapeError::SessionFailure("spider session not initialized".into()))
    }
}

impl DocumentProvider for SpiderProvider {
    async fn initialize(&mut self) -> Result<(), ScrapeError> {
        let api_key = std::env::var("SPIDER_API_KEY").map_err(|_| {
            ScrapeError::SessionFailure("SPIDER_API_KEY environment variable must be set".into())
        })?;
        let spider = Spider::new(Some(api_key))
            .map_err(|e| ScrapeError::SessionFailure(format!("failed to create Spider client: {}", e)))?;
        self.client = Some(spider);
        info!("Spider session ready");
        Ok(())
    }

    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<Page, ScrapeError> {
        let spider = self.client()?;

        for attempt in 0..=MAX_RETRIES {
            match spider.scrape_url(url, Some(Self::params()), "application/json").await {
                Ok(value) => return spider_page(url, value),
                Err(e) => {
                    let reason = e.to_string();
                    if !is_retryable(&reason) || attempt == MAX_RETRIES {
                        return Err(ScrapeError::Navigation {
                            url: url.to_string(),
                            reason,
                        });
                    }
                    let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
                    warn!(
                        "Rate limited on {} (attempt {}/{}), backing off {:.1}s",
                        url,
                        attempt + 1,
                        MAX_RETRIES,
                        backoff.as_secs_f64()
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }

        Err(ScrapeError::Navigation {
            url: url.to_string(),
            reason: "retries exhausted".into(),
        })
    }

    async fn close(&mut self) -> Result<(), ScrapeError> {
        self.client = None;
        Ok(())
    }
}

fn is_retryable(reason: &str) -> bool {
    ["429", "rate", "500", "502", "503"]
        .iter()
        .any(|needle| reason.contains(needle))
}

/// Spider answers with a JSON array (sometimes as a JSON string) of
/// `{ content, status, url }` objects.
fn spider_page(url: &str, value: serde_json::Value) -> Result<Page, ScrapeError> {
    let parsed: serde_json::Value = match value.as_str() {
        Some(s) => serde_json::from_str(s).unwrap_or(value.clone()),
        None => value,
    };

    let first = parsed.as_array().and_then(|arr| arr.first());
    let html = first
        .and_then(|obj| obj.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| ScrapeError::Navigation {
            url: url.to_string(),
            reason: "no content in spider response".into(),
        })?;
    let status = first
        .and_then(|obj| obj.get("status"))
        .and_then(|s| s.as_u64())
        .and_then(|s| u16::try_from(s).ok())
        .unwrap_or(200);

    Ok(Page {
        url: url.to_string(),
        status,
        html: html.to_string(),
    })
}

/// Plain HTTP fetches. Pages are not rendered, so client-side content is missed.
#[derive(Default)]
pub struct HttpProvider {
    client: Option<reqwest::Client>,
}

impl DocumentProvider for HttpProvider {
    async fn initialize(&mut self) -> Result<(), ScrapeError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ScrapeError::SessionFailure(e.to_string()))?;
        self.client = Some(client);
        Ok(())
    }

    async fn navigate(&self, url: &str, timeout: Duration) -> Result<Page, ScrapeError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| ScrapeError::SessionFailure("http session not initialized".into()))?;
        let failed = |e: reqwest::Error| ScrapeError::Navigation {
            url: url.to_string(),
            reason: e.to_string(),
        };

        let resp = client.get(url).timeout(timeout).send().await.map_err(failed)?;
        let status = resp.status().as_u16();
        let final_url = resp.url().to_string();
        let html = resp.text().await.map_err(failed)?;
        Ok(Page {
            url: final_url,
            status,
            html,
        })
    }

    async fn close(&mut self) -> Result<(), ScrapeError> {
        self.client = None;
        Ok(())
    }
}

/// Provider picked at runtime from the CLI.
pub enum AnyProvider {
    Spider(SpiderProvider),
    Http(HttpProvider),
}

impl DocumentProvider for AnyProvider {
    async fn initialize(&mut self) -> Result<(), ScrapeError> {
        match self {
            AnyProvider::Spider(p) => p.initialize().await,
            AnyProvider::Http(p) => p.initialize().await,
        }
    }

    async fn navigate(&self, url: &str, timeout: Duration) -> Result<Page, ScrapeError> {
        match self {
            AnyProvider::Spider(p) => p.navigate(url, timeout).await,
            AnyProvider::Http(p) => p.navigate(url, timeout).await,
        }
    }

    async fn close(&mut self) -> Result<(), ScrapeError> {
        match self {
            AnyProvider::Spider(p) => p.close().await,
            AnyProvider::Http(p) => p.close().await,
        }
    }
}

#[cfg(test)]
pub mod fake {
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use super::*;

    /// In-memory provider. Unknown URLs answer 404; hanging URLs never answer.
    #[derive(Default)]
    pub struct FakeProvider {
        pages: HashMap<String, String>,
        hanging: HashSet<String>,
        calls: Mutex<Vec<String>>,
        pub fail_initialize: bool,
        pub initialized: bool,
        pub closed: bool,
    }

    impl FakeProvider {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_page(mut self, url: &str, html: &str) -> Self {
            self.pages.insert(url.to_string(), html.to_string());
            self
        }

        pub fn with_hanging(mut self, url: &str) -> Self {
            self.hanging.insert(url.to_string());
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl DocumentProvider for FakeProvider {
        async fn initialize(&mut self) -> Result<(), ScrapeError> {
            if self.fail_initialize {
                return Err(ScrapeError::SessionFailure("fake session refused".into()));
            }
            self.initialized = true;
            Ok(())
        }

        async fn navigate(&self, url: &str, _timeout: Duration) -> Result<Page, ScrapeError> {
            self.calls.lock().unwrap().push(url.to_string());
            if self.hanging.contains(url) {
                return std::future::pending().await;
            }
            Ok(match self.pages.get(url) {
                Some(html) => Page {
                    url: url.to_string(),
                    status: 200,
                    html: html.clone(),
                },
                None => Page {
                    url: url.to_string(),
                    status: 404,
                    html: String::new(),
                },
            })
        }

        async fn close(&mut self) -> Result<(), ScrapeError> {
            self.closed = true;
            Ok(())
        }
    }
}
