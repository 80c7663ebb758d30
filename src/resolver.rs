use tracing::{debug, info, warn};
use url::Url;

use crate::config::Config;
use crate::error::ScrapeError;
use crate::model::NodeDetail;
use crate::parser::detail::{outbound_resources, page_detail, section_detail, text_match_detail};
use crate::parser::slug::normalize;
use crate::parser::Document;
use crate::provider::{fetch_document, DocumentProvider};

/// One way of finding a node's detail, tried in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    DedicatedPage(String),
    AlternatePage(String),
    InPageSection,
    FallbackTextMatch,
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::DedicatedPage(_) => "dedicated-page",
            Strategy::AlternatePage(_) => "alternate-page",
            Strategy::InPageSection => "in-page-section",
            Strategy::FallbackTextMatch => "fallback-text-match",
        }
    }
}

/// The cascade for `node_id` on the roadmap at `roadmap_url`.
pub fn plan(roadmap_url: &Url, node_id: &str) -> Vec<Strategy> {
    let origin = roadmap_url.origin().ascii_serialization();
    let base_path = roadmap_url.path().trim_end_matches('/');
    let slug = base_path.rsplit('/').next().unwrap_or_default();
    let id = normalize(node_id);

    let dedicated = if !slug.is_empty() && id == slug {
        roadmap_url.to_string()
    } else {
        format!("{}{}/{}", origin, base_path, id)
    };
    let alternate = if !slug.is_empty() && id.contains(slug) {
        format!("{}{}/{}", origin, base_path, id)
    } else {
        format!("{}{}/{}-{}", origin, base_path, slug, id)
    };

    let mut strategies = vec![Strategy::DedicatedPage(dedicated.clone())];
    if alternate != dedicated {
        strategies.push(Strategy::AlternatePage(alternate));
    }
    strategies.push(Strategy::InPageSection);
    strategies.push(Strategy::FallbackTextMatch);
    strategies
}

/// Runs the cascade for nodes of one roadmap. The roadmap document is fetched
/// at most once and shared by the in-page strategies; a failed fetch is
/// remembered and not retried.
pub struct Resolver<'a, P> {
    provider: &'a P,
    config: &'a Config,
    roadmap_url: Url,
    source_host: String,
    roadmap_doc: Option<Document>,
    roadmap_failure: Option<String>,
}

impl<'a, P: DocumentProvider> Resolver<'a, P> {
    pub fn new(provider: &'a P, config: &'a Config, roadmap_url: &str) -> Result<Self, ScrapeError> {
        let roadmap_url = Url::parse(roadmap_url)?;
        let source_host = roadmap_url.host_str().unwrap_or_default().to_string();
        Ok(Self {
            provider,
            config,
            roadmap_url,
            source_host,
            roadmap_doc: None,
            roadmap_failure: None,
        })
    }

    /// Never fails: exhaustion comes back as `found: false` with the reason.
    pub async fn resolve(&mut self, node_id: &str) -> NodeDetail {
        for strategy in plan(&self.roadmap_url, node_id) {
            debug!("Trying {} for {}", strategy.name(), node_id);
            match self.attempt(&strategy, node_id).await {
                Ok(Some(mut detail)) => {
                    info!(
                        "Resolved {} via {} ({} resources)",
                        node_id,
                        strategy.name(),
                        detail.resources.len()
                    );
                    detail.strategy = Some(strategy.name().to_string());
                    if matches!(strategy, Strategy::InPageSection | Strategy::FallbackTextMatch) {
                        self.follow_detail_page(&mut detail).await;
                    }
                    return detail;
                }
                Ok(None) => debug!("{} found nothing for {}", strategy.name(), node_id),
                Err(e) if e.is_recoverable() => {
                    warn!("{} failed for {}: {}", strategy.name(), node_id, e)
                }
                Err(e) => {
                    warn!("Aborting resolution of {}: {}", node_id, e);
                    return NodeDetail::not_found(node_id, e.to_string());
                }
            }
        }

        let exhausted = ScrapeError::ResolutionExhausted {
            node_id: node_id.to_string(),
        };
        info!("{}", exhausted);
        NodeDetail::not_found(node_id, exhausted.to_string())
    }

    async fn attempt(&mut self, strategy: &Strategy, node_id: &str) -> Result<Option<NodeDetail>, ScrapeError> {
        let config = self.config;
        match strategy {
            Strategy::DedicatedPage(url) | Strategy::AlternatePage(url) => {
                let doc = fetch_document(self.provider, url, config.probe_timeout).await?;
                Ok(page_detail(&doc, node_id, &self.source_host))
            }
            Strategy::InPageSection => {
                let doc = self.roadmap_doc().await?;
                Ok(section_detail(doc, node_id, config))
            }
            Strategy::FallbackTextMatch => {
                let doc = self.roadmap_doc().await?;
                Ok(text_match_detail(doc, node_id, config))
            }
        }
    }

    async fn roadmap_doc(&mut self) -> Result<&Document, ScrapeError> {
        if let Some(reason) = &self.roadmap_failure {
            return Err(ScrapeError::Navigation {
                url: self.roadmap_url.to_string(),
                reason: format!("earlier fetch failed: {}", reason),
            });
        }
        let doc = match self.roadmap_doc.take() {
            Some(doc) => doc,
            None => {
                match fetch_document(self.provider, self.roadmap_url.as_str(), self.config.navigation_timeout).await {
                    Ok(doc) => doc,
                    Err(e) => {
                        self.roadmap_failure = Some(e.to_string());
                        return Err(e);
                    }
                }
            }
        };
        Ok(self.roadmap_doc.insert(doc))
    }

    /// Best effort: pull outbound links from the linked guide/video page.
    async fn follow_detail_page(&self, detail: &mut NodeDetail) {
        let Some(url) = detail.detail_source_url.clone() else {
            return;
        };
        match fetch_document(self.provider, &url, self.config.probe_timeout).await {
            Ok(doc) => {
                let extra = outbound_resources(&doc, &detail.node_id, &self.source_host);
                let added = detail.append_resources(extra);
                debug!("Detail page {} added {} resources", url, added);
            }
            Err(e) => warn!("Detail page {} skipped: {}", url, e),
        }
    }
}

/// Resolve one node with a fresh resolver.
pub async fn resolve_node<P: DocumentProvider>(
    provider: &P,
    config: &Config,
    roadmap_url: &str,
    node_id: &str,
) -> Result<NodeDetail, ScrapeError> {
    let mut resolver = Resolver::new(provider, config, roadmap_url)?;
    Ok(resolver.resolve(node_id).await)
}
