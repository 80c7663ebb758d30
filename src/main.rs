mod config;
mod db;
mod error;
mod merge;
mod model;
mod parser;
mod pipeline;
mod provider;
mod resolver;

use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use indicatif::HumanDuration;

use crate::config::Config;
use crate::provider::{AnyProvider, HttpProvider, SpiderProvider};

#[derive(Parser)]
#[command(name = "roadmap_scraper", about = "roadmap.sh topic graph and resource scraper")]
struct Cli {
    /// SQLite database path (overrides ROADMAP_DB)
    #[arg(long, global = true)]
    db: Option<String>,

    /// Page source
    #[arg(long, global = true, value_enum, default_value_t = ProviderKind::Spider)]
    provider: ProviderKind,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProviderKind {
    /// Rendered pages via spider.cloud (needs SPIDER_API_KEY)
    Spider,
    /// Plain HTTP, no rendering
    Http,
}

#[derive(Subcommand)]
enum Commands {
    /// List roadmaps from the index page
    List,
    /// Scrape every listed roadmap into the database
    ScrapeAll,
    /// Re-scrape one stored roadmap
    Update {
        /// Roadmap URL or slug (e.g. "frontend")
        roadmap: String,
    },
    /// Resolve a node's detail and store its resources
    Node {
        /// Roadmap URL or slug
        roadmap: String,
        node_id: String,
    },
    /// Re-extract all roadmaps from stored snapshots (no network)
    Rebuild,
    /// Print a stored roadmap with its resources as JSON
    Show {
        /// Roadmap URL or slug
        roadmap: String,
    },
    /// Show database statistics
    Stats,
}

fn roadmap_url(config: &Config, arg: &str) -> String {
    if arg.starts_with("http://") || arg.starts_with("https://") {
        arg.trim_end_matches('/').to_string()
    } else {
        format!("{}/{}", config.base_url, arg.trim_matches('/'))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    let mut provider = match cli.provider {
        ProviderKind::Spider => AnyProvider::Spider(SpiderProvider::default()),
        ProviderKind::Http => AnyProvider::Http(HttpProvider::default()),
    };

    let result = match cli.command {
        Commands::List => {
            let listings = pipeline::list_roadmaps(&mut provider, &config).await?;
            println!("{:<40} | {:<28} | URL", "Roadmap", "Category");
            println!("{}", "-".repeat(100));
            for l in &listings {
                println!("{:<40} | {:<28} | {}", clip(&l.title, 40), clip(&l.category, 28), l.url);
            }
            println!("\n{} roadmaps", listings.len());
            Ok(())
        }
        Commands::ScrapeAll => {
            let conn = db::connect(&config.db_path)?;
            db::init_schema(&conn)?;
            let report = pipeline::scrape_all(&mut provider, &conn, &config).await?;
            println!(
                "Done: {} roadmaps ({} created, {} updated, {} skipped), {} new resources.",
                report.total, report.created, report.updated, report.skipped, report.resources_added
            );
            Ok(())
        }
        Commands::Update { roadmap } => {
            let conn = db::connect(&config.db_path)?;
            db::init_schema(&conn)?;
            let url = roadmap_url(&config, &roadmap);
            let outcome = pipeline::update_one(&mut provider, &conn, &config, &url).await?;
            println!("{}: {:?}", url, outcome);
            Ok(())
        }
        Commands::Node { roadmap, node_id } => {
            let conn = db::connect(&config.db_path)?;
            db::init_schema(&conn)?;
            let url = roadmap_url(&config, &roadmap);
            let detail = pipeline::resolve_node(&mut provider, &conn, &config, &url, &node_id).await?;
            println!("{}", serde_json::to_string_pretty(&detail)?);
            Ok(())
        }
        Commands::Rebuild => {
            let conn = db::connect(&config.db_path)?;
            db::init_schema(&conn)?;
            let report = pipeline::rebuild(&conn, &config)?;
            println!(
                "Rebuilt {} roadmaps ({} created, {} updated, {} skipped), {} new resources.",
                report.total, report.created, report.updated, report.skipped, report.resources_added
            );
            Ok(())
        }
        Commands::Show { roadmap } => {
            let conn = db::connect(&config.db_path)?;
            db::init_schema(&conn)?;
            let url = roadmap_url(&config, &roadmap);
            let Some(stored) = db::find_roadmap(&conn, &url)? else {
                println!("No roadmap stored for {}. Run 'scrape-all' first.", url);
                return Ok(());
            };
            let resources: Vec<_> = match stored.id {
                Some(id) => db::fetch_resources(&conn, id)?
                    .into_iter()
                    .map(|(node_id, resource)| serde_json::json!({ "nodeId": node_id, "resource": resource }))
                    .collect(),
                None => Vec::new(),
            };
            let out = serde_json::json!({ "roadmap": stored, "resources": resources });
            println!("{}", serde_json::to_string_pretty(&out)?);
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&config.db_path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Roadmaps:  {}", s.roadmaps);
            println!("Nodes:     {}", s.nodes);
            println!("Edges:     {}", s.edges);
            println!("Resources: {}", s.resources);
            println!("Links:     {}", s.links);
            println!("Snapshots: {}", s.snapshots);
            for r in db::list_roadmaps(&conn)? {
                println!(
                    "  #{:<4} {:<36} {:>4} nodes  {}  [{}] {}",
                    r.id,
                    clip(&r.title, 36),
                    r.node_count,
                    r.last_updated,
                    r.category,
                    r.source_url
                );
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", HumanDuration(elapsed));
    }

    result
}

/// Fit `s` into a table column of `width` chars, marking the cut with `…`.
fn clip(s: &str, width: usize) -> String {
    match s.char_indices().nth(width.saturating_sub(1)) {
        Some((cut, _)) if s.chars().count() > width => format!("{}…", &s[..cut]),
        _ => s.to_string(),
    }
}
