use anyhow::{bail, Result};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::db;
use crate::error::ScrapeError;
use crate::merge::{merge, merge_node_resources};
use crate::model::{NodeDetail, Roadmap, RoadmapExtraction, RoadmapListing};
use crate::parser::listing::parse_roadmap_list;
use crate::parser::{extract_roadmap, Document};
use crate::provider::{fetch_document, fetch_page, DocumentProvider, Page};
use crate::resolver;

/// Counts returned after a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub resources_added: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Created { resources: usize },
    Updated { resources: usize },
    /// Kept the stored roadmap untouched.
    Skipped,
}

impl BatchReport {
    fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Created { resources } => {
                self.created += 1;
                self.resources_added += resources;
            }
            ItemOutcome::Updated { resources } => {
                self.updated += 1;
                self.resources_added += resources;
            }
            ItemOutcome::Skipped => self.skipped += 1,
        }
    }
}

fn progress_bar(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );
    Ok(pb)
}

/// Initialize the session, tearing it down again if that fails.
async fn open_session<P: DocumentProvider>(provider: &mut P) -> Result<()> {
    if let Err(e) = provider.initialize().await {
        close_session(provider).await;
        return Err(e.into());
    }
    Ok(())
}

async fn close_session<P: DocumentProvider>(provider: &mut P) {
    if let Err(e) = provider.close().await {
        warn!("Closing session failed: {}", e);
    }
}

fn is_fatal(e: &anyhow::Error) -> bool {
    e.downcast_ref::<ScrapeError>()
        .is_some_and(|e| !e.is_recoverable())
}

fn listing_for(stored: Option<&Roadmap>, url: &str) -> RoadmapListing {
    match stored {
        Some(r) => RoadmapListing {
            title: r.title.clone(),
            url: r.source_url.clone(),
            category: r.category.clone(),
        },
        None => RoadmapListing {
            title: String::new(),
            url: url.to_string(),
            category: String::new(),
        },
    }
}

/// Merge one extraction result into storage.
///
/// A page without structure leaves a stored roadmap untouched and creates an
/// empty one otherwise.
fn reconcile(
    conn: &Connection,
    existing: Option<Roadmap>,
    extracted: Result<RoadmapExtraction, ScrapeError>,
    listing: &RoadmapListing,
) -> Result<ItemOutcome> {
    let fresh = match extracted {
        Ok(fresh) => fresh,
        Err(ScrapeError::StructureNotFound { url }) if existing.is_some() => {
            warn!("No structure at {}, keeping stored roadmap", url);
            return Ok(ItemOutcome::Skipped);
        }
        Err(ScrapeError::StructureNotFound { url }) => {
            warn!("No structure at {}, storing empty roadmap", url);
            RoadmapExtraction::default()
        }
        Err(e) => return Err(e.into()),
    };

    let known = db::known_resource_urls(conn)?;
    let outcome = merge(existing, fresh, listing, &known, Utc::now());
    let (id, inserted) = db::persist(conn, &outcome.roadmap, &outcome.new_resources, &outcome.links)?;
    debug!(
        "Saved roadmap {} (id {}, {} nodes, {} new resources)",
        outcome.roadmap.source_url,
        id,
        outcome.roadmap.nodes.len(),
        inserted
    );

    Ok(if outcome.created {
        ItemOutcome::Created { resources: inserted }
    } else {
        ItemOutcome::Updated { resources: inserted }
    })
}

/// Fetch, snapshot, extract and merge one roadmap.
async fn scrape_roadmap<P: DocumentProvider>(
    provider: &P,
    conn: &Connection,
    config: &Config,
    listing: &RoadmapListing,
) -> Result<ItemOutcome> {
    let existing = db::find_roadmap(conn, &listing.url)?;
    let page = fetch_page(provider, &listing.url, config.navigation_timeout).await?;
    let page = Page {
        url: listing.url.clone(),
        ..page
    };
    db::save_snapshot(conn, &page)?;

    let extracted = Document::parse(&page.url, &page.html).and_then(|doc| extract_roadmap(&doc, config));
    reconcile(conn, existing, extracted, listing)
}

async fn run_batch<P: DocumentProvider>(provider: &P, conn: &Connection, config: &Config) -> Result<BatchReport> {
    let list_doc = fetch_document(provider, &config.list_url(), config.navigation_timeout).await?;
    let listings = parse_roadmap_list(&list_doc);
    info!("Found {} roadmaps on {}", listings.len(), config.list_url());

    let mut report = BatchReport {
        total: listings.len(),
        ..Default::default()
    };
    let pb = progress_bar(listings.len())?;

    for listing in &listings {
        pb.set_message(listing.title.clone());
        match scrape_roadmap(provider, conn, config, listing).await {
            Ok(outcome) => report.record(outcome),
            Err(e) if is_fatal(&e) => {
                pb.finish_and_clear();
                return Err(e);
            }
            Err(e) => {
                warn!("Skipping {}: {:#}", listing.url, e);
                report.skipped += 1;
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!(
        "Processed {} roadmaps ({} created, {} updated, {} skipped, {} new resources)",
        report.total, report.created, report.updated, report.skipped, report.resources_added
    );
    Ok(report)
}

/// Fetch and parse the roadmap index page.
pub async fn list_roadmaps<P: DocumentProvider>(provider: &mut P, config: &Config) -> Result<Vec<RoadmapListing>> {
    open_session(provider).await?;
    let result = fetch_document(&*provider, &config.list_url(), config.navigation_timeout).await;
    close_session(provider).await;
    Ok(parse_roadmap_list(&result?))
}

/// Scrape every roadmap on the index page. The session is always closed.
pub async fn scrape_all<P: DocumentProvider>(
    provider: &mut P,
    conn: &Connection,
    config: &Config,
) -> Result<BatchReport> {
    open_session(provider).await?;
    let result = run_batch(&*provider, conn, config).await;
    close_session(provider).await;
    result
}

/// Re-extract one stored roadmap.
pub async fn update_one<P: DocumentProvider>(
    provider: &mut P,
    conn: &Connection,
    config: &Config,
    url: &str,
) -> Result<ItemOutcome> {
    let Some(stored) = db::find_roadmap(conn, url)? else {
        bail!("Roadmap not found: {}. Run 'scrape-all' first.", url);
    };
    let listing = listing_for(Some(&stored), url);

    open_session(provider).await?;
    let result = scrape_roadmap(&*provider, conn, config, &listing).await;
    close_session(provider).await;
    result
}

/// Resolve a stored node's detail and persist any new resources against it.
pub async fn resolve_node<P: DocumentProvider>(
    provider: &mut P,
    conn: &Connection,
    config: &Config,
    url: &str,
    node_id: &str,
) -> Result<NodeDetail> {
    let Some(mut roadmap) = db::find_roadmap(conn, url)? else {
        bail!("Roadmap not found: {}", url);
    };
    if !roadmap.nodes.iter().any(|n| n.id == node_id) {
        let available: Vec<&str> = roadmap.nodes.iter().map(|n| n.id.as_str()).collect();
        bail!(
            "Node {} not found in {}. Available nodes: {}",
            node_id,
            url,
            available.join(", ")
        );
    }

    open_session(provider).await?;
    let result = resolver::resolve_node(&*provider, config, url, node_id).await;
    close_session(provider).await;
    let detail = result?;

    if detail.found {
        let known = db::known_resource_urls(conn)?;
        if let Some(update) = merge_node_resources(&mut roadmap, node_id, &detail.resources, &known) {
            roadmap.last_updated = Utc::now();
            let (_, inserted) = db::persist(conn, &roadmap, &update.new_resources, &update.links)?;
            info!("Linked {} resources to {} ({} new)", update.links.len(), node_id, inserted);
        }
    }
    Ok(detail)
}

/// Re-run extraction over stored snapshots without network access. Parsing
/// runs in parallel; merging stays sequential in snapshot order.
pub fn rebuild(conn: &Connection, config: &Config) -> Result<BatchReport> {
    let snapshots = db::fetch_snapshots(conn)?;
    info!("Rebuilding from {} snapshots", snapshots.len());

    let extracted: Vec<(&str, Result<RoadmapExtraction, ScrapeError>)> = snapshots
        .par_iter()
        .map(|page| {
            let result = Document::parse(&page.url, &page.html).and_then(|doc| extract_roadmap(&doc, config));
            (page.url.as_str(), result)
        })
        .collect();

    let mut report = BatchReport {
        total: extracted.len(),
        ..Default::default()
    };
    let pb = progress_bar(extracted.len())?;

    for (url, result) in extracted {
        let existing = db::find_roadmap(conn, url)?;
        let listing = listing_for(existing.as_ref(), url);
        match reconcile(conn, existing, result, &listing) {
            Ok(outcome) => report.record(outcome),
            Err(e) => {
                warn!("Skipping snapshot {}: {:#}", url, e);
                report.skipped += 1;
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!(
        "Rebuilt {} roadmaps ({} created, {} updated, {} skipped)",
        report.total, report.created, report.updated, report.skipped
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::provider::fake::FakeProvider;

    const LIST: &str = "<h2>Role-based Roadmaps</h2><div class='grid'>\
        <a href='/frontend'>Frontend</a><a href='/backend'>Backend</a>\
        <a href='/broken'>Broken</a><a href='/blank'>Blank</a></div>";
    const FRONTEND: &str = "<main><h1>Frontend</h1><p>Guide</p><h2>HTML</h2>\
        <p><a href='https://developer.mozilla.org/html'>MDN</a></p><h3>Forms</h3></main>";
    const BACKEND: &str = "<main><h1>Backend</h1><h2>APIs</h2>\
        <p><a href='https://developer.mozilla.org/html'>MDN</a> <a href='https://restfulapi.net'>REST</a></p></main>";

    fn config() -> Config {
        Config {
            navigation_timeout: Duration::from_millis(200),
            probe_timeout: Duration::from_millis(50),
            ..Config::default()
        }
    }

    fn provider() -> FakeProvider {
        FakeProvider::new()
            .with_page("https://roadmap.sh/roadmaps", LIST)
            .with_page("https://roadmap.sh/frontend", FRONTEND)
            .with_page("https://roadmap.sh/backend", BACKEND)
            .with_page("https://roadmap.sh/blank", "<p>Coming soon</p>")
    }

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        conn
    }

    #[tokio::test]
    async fn lists_roadmaps() {
        let mut p = provider();
        let list = list_roadmaps(&mut p, &config()).await.unwrap();
        assert_eq!(list.len(), 4);
        assert_eq!(list[0].category, "Role-based Roadmaps");
        assert!(p.closed);
    }

    #[tokio::test]
    async fn batch_creates_then_updates() {
        let conn = test_conn();
        let mut p = provider();

        let first = scrape_all(&mut p, &conn, &config()).await.unwrap();
        assert_eq!(
            first,
            BatchReport {
                total: 4,
                created: 3,
                updated: 0,
                skipped: 1,
                resources_added: 2,
            }
        );
        assert!(p.initialized && p.closed);

        let blank = db::find_roadmap(&conn, "https://roadmap.sh/blank").unwrap().unwrap();
        assert!(blank.nodes.is_empty());
        assert_eq!(blank.title, "Blank");

        let second = scrape_all(&mut provider(), &conn, &config()).await.unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.updated, 2);
        assert_eq!(second.skipped, 2);
        assert_eq!(second.resources_added, 0);

        let stats = db::get_stats(&conn).unwrap();
        assert_eq!(stats.roadmaps, 3);
        assert_eq!(stats.resources, 2);
    }

    #[tokio::test]
    async fn session_closed_when_initialize_fails() {
        let conn = test_conn();
        let mut p = provider();
        p.fail_initialize = true;
        let err = scrape_all(&mut p, &conn, &config()).await.unwrap_err();
        assert!(is_fatal(&err));
        assert!(p.closed);
        assert!(p.calls().is_empty());
    }

    #[tokio::test]
    async fn unreachable_list_fails_batch() {
        let conn = test_conn();
        let mut p = FakeProvider::new();
        assert!(scrape_all(&mut p, &conn, &config()).await.is_err());
        assert!(p.closed);
    }

    #[tokio::test]
    async fn update_requires_stored_roadmap() {
        let conn = test_conn();
        let mut p = provider();
        assert!(update_one(&mut p, &conn, &config(), "https://roadmap.sh/frontend").await.is_err());

        scrape_all(&mut p, &conn, &config()).await.unwrap();
        let outcome = update_one(&mut p, &conn, &config(), "https://roadmap.sh/frontend").await.unwrap();
        assert_eq!(outcome, ItemOutcome::Updated { resources: 0 });
    }

    #[tokio::test]
    async fn node_resolution_persists_links() {
        let conn = test_conn();
        let mut p = provider();
        scrape_all(&mut p, &conn, &config()).await.unwrap();

        let detail = resolve_node(&mut p, &conn, &config(), "https://roadmap.sh/backend", "apis")
            .await
            .unwrap();
        assert!(detail.found);
        assert_eq!(detail.resources.len(), 2);

        let stored = db::find_roadmap(&conn, "https://roadmap.sh/backend").unwrap().unwrap();
        let links = db::fetch_resources(&conn, stored.id.unwrap()).unwrap();
        assert!(links.iter().all(|(node, _)| node == "apis"));
        assert_eq!(links.len(), 2);
        // MDN was first claimed by the frontend roadmap.
        assert!(links.iter().any(|(_, r)| r.origin_node_id == "html"));
    }

    #[tokio::test]
    async fn unknown_node_lists_available_ids() {
        let conn = test_conn();
        let mut p = provider();
        scrape_all(&mut p, &conn, &config()).await.unwrap();
        let err = resolve_node(&mut p, &conn, &config(), "https://roadmap.sh/frontend", "rust")
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Node rust not found in https://roadmap.sh/frontend. Available nodes: frontend, html, forms"
        );
    }

    #[tokio::test]
    async fn rebuild_uses_snapshots_only() {
        let conn = test_conn();
        scrape_all(&mut provider(), &conn, &config()).await.unwrap();

        let report = rebuild(&conn, &config()).unwrap();
        assert_eq!(report.total, 3);
        assert_eq!(report.updated, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.resources_added, 0);
    }
}
