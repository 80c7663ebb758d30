use std::collections::HashSet;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};

use crate::model::{Resource, ResourceKind, Roadmap, SourceKind};
use crate::provider::Page;

pub fn connect(path: &str) -> Result<Connection> {
    if let Some(dir) = std::path::Path::new(path).parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS roadmaps (
            id           INTEGER PRIMARY KEY,
            source_url   TEXT UNIQUE NOT NULL,
            slug         TEXT NOT NULL,
            title        TEXT NOT NULL,
            description  TEXT NOT NULL DEFAULT '',
            category     TEXT NOT NULL DEFAULT '',
            nodes        TEXT NOT NULL DEFAULT '[]',
            edges        TEXT NOT NULL DEFAULT '[]',
            last_updated TEXT NOT NULL
        );

        -- Append-only; the first discovering node owns the record
        CREATE TABLE IF NOT EXISTS resources (
            id             INTEGER PRIMARY KEY,
            url            TEXT UNIQUE NOT NULL,
            title          TEXT NOT NULL,
            description    TEXT NOT NULL DEFAULT '',
            kind           TEXT NOT NULL,
            origin_node_id TEXT NOT NULL,
            source         TEXT NOT NULL DEFAULT 'scraped',
            created_at     TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS resource_links (
            id           INTEGER PRIMARY KEY,
            resource_url TEXT NOT NULL REFERENCES resources(url),
            roadmap_id   INTEGER NOT NULL REFERENCES roadmaps(id),
            node_id      TEXT NOT NULL,
            UNIQUE(resource_url, roadmap_id, node_id)
        );
        CREATE INDEX IF NOT EXISTS idx_links_roadmap ON resource_links(roadmap_id);

        CREATE TABLE IF NOT EXISTS snapshots (
            id         INTEGER PRIMARY KEY,
            url        TEXT UNIQUE NOT NULL,
            html       TEXT NOT NULL,
            status     INTEGER NOT NULL,
            fetched_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        ",
    )?;
    Ok(())
}

// ── Roadmaps ──

fn slug_of(source_url: &str) -> String {
    source_url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

pub fn find_roadmap(conn: &Connection, source_url: &str) -> Result<Option<Roadmap>> {
    let row = conn
        .query_row(
            "SELECT id, title, description, source_url, category, nodes, edges, last_updated
             FROM roadmaps WHERE source_url = ?1",
            [source_url],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                ))
            },
        )
        .optional()?;

    let Some((id, title, description, source_url, category, nodes, edges, last_updated)) = row else {
        return Ok(None);
    };
    Ok(Some(Roadmap {
        id: Some(id),
        title,
        description,
        source_url,
        category,
        nodes: serde_json::from_str(&nodes).context("decoding stored nodes")?,
        edges: serde_json::from_str(&edges).context("decoding stored edges")?,
        last_updated: DateTime::parse_from_rfc3339(&last_updated)
            .map(|t| t.with_timezone(&Utc))
            .context("decoding last_updated")?,
    }))
}

/// Upsert keyed on `source_url`. Returns the row id, which never changes
/// once assigned.
pub fn save_roadmap(conn: &Connection, roadmap: &Roadmap) -> Result<i64> {
    conn.execute(
        "INSERT INTO roadmaps (source_url, slug, title, description, category, nodes, edges, last_updated)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(source_url) DO UPDATE SET
            title = excluded.title,
            description = excluded.description,
            category = excluded.category,
            nodes = excluded.nodes,
            edges = excluded.edges,
            last_updated = excluded.last_updated",
        rusqlite::params![
            roadmap.source_url,
            slug_of(&roadmap.source_url),
            roadmap.title,
            roadmap.description,
            roadmap.category,
            serde_json::to_string(&roadmap.nodes)?,
            serde_json::to_string(&roadmap.edges)?,
            roadmap.last_updated.to_rfc3339(),
        ],
    )?;
    let id = conn.query_row(
        "SELECT id FROM roadmaps WHERE source_url = ?1",
        [&roadmap.source_url],
        |r| r.get(0),
    )?;
    Ok(id)
}

pub struct RoadmapRow {
    pub id: i64,
    pub title: String,
    pub source_url: String,
    pub category: String,
    pub node_count: usize,
    pub last_updated: String,
}

pub fn list_roadmaps(conn: &Connection) -> Result<Vec<RoadmapRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, title, source_url, category, json_array_length(nodes), last_updated
         FROM roadmaps ORDER BY category, title",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(RoadmapRow {
                id: row.get(0)?,
                title: row.get(1)?,
                source_url: row.get(2)?,
                category: row.get(3)?,
                node_count: row.get(4)?,
                last_updated: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Resources ──

pub fn known_resource_urls(conn: &Connection) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT url FROM resources")?;
    let urls = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<HashSet<String>, _>>()?;
    Ok(urls)
}

pub fn insert_resources(conn: &Connection, resources: &[Resource]) -> Result<usize> {
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO resources (url, title, description, kind, origin_node_id, source)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    let mut count = 0;
    for r in resources {
        count += stmt.execute(rusqlite::params![
            r.url,
            r.title,
            r.description,
            r.kind.as_str(),
            r.origin_node_id,
            r.source.as_str(),
        ])?;
    }
    Ok(count)
}

pub fn link_resources(conn: &Connection, roadmap_id: i64, links: &[(String, String)]) -> Result<usize> {
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO resource_links (resource_url, roadmap_id, node_id) VALUES (?1, ?2, ?3)",
    )?;
    let mut count = 0;
    for (url, node_id) in links {
        count += stmt.execute(rusqlite::params![url, roadmap_id, node_id])?;
    }
    Ok(count)
}

/// Save a roadmap with its new resources and links in one transaction.
/// Returns the roadmap id and how many resources were inserted.
pub fn persist(
    conn: &Connection,
    roadmap: &Roadmap,
    new_resources: &[Resource],
    links: &[(String, String)],
) -> Result<(i64, usize)> {
    let tx = conn.unchecked_transaction()?;
    let id = save_roadmap(&tx, roadmap)?;
    let inserted = insert_resources(&tx, new_resources)?;
    link_resources(&tx, id, links)?;
    tx.commit()?;
    Ok((id, inserted))
}

/// Resources linked to a roadmap, as `(node id, resource)`.
pub fn fetch_resources(conn: &Connection, roadmap_id: i64) -> Result<Vec<(String, Resource)>> {
    let mut stmt = conn.prepare(
        "SELECT l.node_id, r.title, r.description, r.url, r.kind, r.origin_node_id, r.source
         FROM resource_links l
         JOIN resources r ON r.url = l.resource_url
         WHERE l.roadmap_id = ?1
         ORDER BY l.id",
    )?;
    let rows = stmt
        .query_map([roadmap_id], |row| {
            let kind: String = row.get(4)?;
            let source: String = row.get(6)?;
            Ok((
                row.get(0)?,
                Resource {
                    title: row.get(1)?,
                    description: row.get(2)?,
                    url: row.get(3)?,
                    kind: ResourceKind::parse(&kind),
                    origin_node_id: row.get(5)?,
                    source: SourceKind::parse(&source),
                },
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Snapshots ──

pub fn save_snapshot(conn: &Connection, page: &Page) -> Result<()> {
    conn.execute(
        "INSERT INTO snapshots (url, html, status) VALUES (?1, ?2, ?3)
         ON CONFLICT(url) DO UPDATE SET
            html = excluded.html,
            status = excluded.status,
            fetched_at = datetime('now')",
        rusqlite::params![page.url, page.html, page.status],
    )?;
    Ok(())
}

pub fn fetch_snapshots(conn: &Connection) -> Result<Vec<Page>> {
    let mut stmt = conn.prepare("SELECT url, status, html FROM snapshots ORDER BY id")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Page {
                url: row.get(0)?,
                status: row.get(1)?,
                html: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub roadmaps: usize,
    pub nodes: usize,
    pub edges: usize,
    pub resources: usize,
    pub links: usize,
    pub snapshots: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let roadmaps: usize = conn.query_row("SELECT COUNT(*) FROM roadmaps", [], |r| r.get(0))?;
    let nodes: usize = conn.query_row(
        "SELECT COALESCE(SUM(json_array_length(nodes)), 0) FROM roadmaps",
        [],
        |r| r.get(0),
    )?;
    let edges: usize = conn.query_row(
        "SELECT COALESCE(SUM(json_array_length(edges)), 0) FROM roadmaps",
        [],
        |r| r.get(0),
    )?;
    let resources: usize = conn.query_row("SELECT COUNT(*) FROM resources", [], |r| r.get(0))?;
    let links: usize = conn.query_row("SELECT COUNT(*) FROM resource_links", [], |r| r.get(0))?;
    let snapshots: usize = conn.query_row("SELECT COUNT(*) FROM snapshots", [], |r| r.get(0))?;
    Ok(Stats {
        roadmaps,
        nodes,
        edges,
        resources,
        links,
        snapshots,
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::model::{Edge, NodeKind, Position, TopicNode};

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn roadmap(title: &str) -> Roadmap {
        Roadmap {
            id: None,
            title: title.into(),
            description: "Step by step guide".into(),
            source_url: "https://roadmap.sh/frontend".into(),
            category: "Role-based Roadmaps".into(),
            nodes: vec![TopicNode {
                id: "html".into(),
                title: "HTML".into(),
                description: String::new(),
                kind: NodeKind::Topic,
                parent_id: None,
                position: Position { x: 200.0, y: 0.0 },
                resource_ids: vec!["https://mdn.dev/html".into()],
            }],
            edges: vec![Edge {
                source: "html".into(),
                target: "forms".into(),
                kind: "default".into(),
            }],
            last_updated: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    fn resource(url: &str) -> Resource {
        Resource {
            title: "MDN".into(),
            description: "reference".into(),
            url: url.into(),
            kind: ResourceKind::Article,
            origin_node_id: "html".into(),
            source: SourceKind::Scraped,
        }
    }

    #[test]
    fn roadmap_upsert_keeps_id() {
        let conn = test_conn();
        let first = save_roadmap(&conn, &roadmap("Frontend")).unwrap();
        let second = save_roadmap(&conn, &roadmap("Frontend Developer")).unwrap();
        assert_eq!(first, second);

        let stored = find_roadmap(&conn, "https://roadmap.sh/frontend").unwrap().unwrap();
        assert_eq!(stored.id, Some(first));
        assert_eq!(stored.title, "Frontend Developer");
        assert_eq!(stored.nodes, roadmap("x").nodes);
        assert_eq!(stored.last_updated, roadmap("x").last_updated);
        assert!(find_roadmap(&conn, "https://roadmap.sh/nope").unwrap().is_none());
    }

    #[test]
    fn resources_are_append_only() {
        let conn = test_conn();
        let (id, inserted) = persist(
            &conn,
            &roadmap("Frontend"),
            &[resource("https://mdn.dev/html")],
            &[("https://mdn.dev/html".into(), "html".into())],
        )
        .unwrap();
        assert_eq!(inserted, 1);

        let mut changed = resource("https://mdn.dev/html");
        changed.title = "Other".into();
        assert_eq!(insert_resources(&conn, &[changed]).unwrap(), 0);
        assert_eq!(
            link_resources(&conn, id, &[("https://mdn.dev/html".into(), "html".into())]).unwrap(),
            0
        );

        let linked = fetch_resources(&conn, id).unwrap();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].0, "html");
        assert_eq!(linked[0].1.title, "MDN");
        assert!(known_resource_urls(&conn).unwrap().contains("https://mdn.dev/html"));
    }

    #[test]
    fn snapshots_replace_by_url() {
        let conn = test_conn();
        let page = Page {
            url: "https://roadmap.sh/frontend".into(),
            status: 200,
            html: "<h1>old</h1>".into(),
        };
        save_snapshot(&conn, &page).unwrap();
        save_snapshot(&conn, &Page { html: "<h1>new</h1>".into(), ..page }).unwrap();
        let snaps = fetch_snapshots(&conn).unwrap();
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].html, "<h1>new</h1>");
    }

    #[test]
    fn stats_count_everything() {
        let conn = test_conn();
        let stats = get_stats(&conn).unwrap();
        assert_eq!(stats.nodes, 0);

        persist(&conn, &roadmap("Frontend"), &[resource("https://mdn.dev/html")], &[]).unwrap();
        let stats = get_stats(&conn).unwrap();
        assert_eq!(stats.roadmaps, 1);
        assert_eq!(stats.nodes, 1);
        assert_eq!(stats.edges, 1);
        assert_eq!(stats.resources, 1);
        assert_eq!(stats.links, 0);
        assert_eq!(list_roadmaps(&conn).unwrap()[0].node_count, 1);
    }

    #[test]
    fn slug_from_url() {
        assert_eq!(slug_of("https://roadmap.sh/frontend/"), "frontend");
    }
}
