pub mod detail;
pub mod graph;
pub mod listing;
pub mod resources;
pub mod slug;
pub mod walker;

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::config::Config;
use crate::error::ScrapeError;
use crate::model::{NodeKind, RoadmapExtraction};

/// A parsed snapshot of a rendered page. Never mutated, so it can be walked
/// as many times as needed.
pub struct Document {
    url: Url,
    html: Html,
}

impl Document {
    pub fn parse(url: &str, html: &str) -> Result<Self, ScrapeError> {
        Ok(Self {
            url: Url::parse(url)?,
            html: Html::parse_document(html),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn html(&self) -> &Html {
        &self.html
    }

    /// First configured root holding a structural heading the walker will
    /// reach, else the whole document. Headings under `nav`, `script` and the
    /// other skipped tags don't count.
    pub fn structure_root(&self, selectors: &[String]) -> ElementRef<'_> {
        selectors
            .iter()
            .filter_map(|s| Selector::parse(s).ok())
            .find_map(|sel| {
                self.html
                    .select(&sel)
                    .find(|el| walker::holds_heading(*el))
            })
            .unwrap_or_else(|| self.html.root_element())
    }
}

pub(crate) fn collapse_ws<'a>(text: impl Iterator<Item = &'a str>) -> String {
    let joined: String = text.collect();
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Walk → graph → resources for a whole roadmap page.
pub fn extract_roadmap(doc: &Document, config: &Config) -> Result<RoadmapExtraction, ScrapeError> {
    let elements: Vec<_> = walker::walk(doc, config).collect();
    let mut graph = graph::build_graph(&elements);
    if graph.nodes.is_empty() {
        return Err(ScrapeError::StructureNotFound {
            url: doc.url().to_string(),
        });
    }

    let resources = resources::attach_resources(&mut graph.nodes, &elements, doc.url());

    let (title, description) = graph
        .nodes
        .iter()
        .find(|n| n.kind == NodeKind::Roadmap)
        .map(|n| (n.title.clone(), n.description.clone()))
        .unwrap_or_default();

    Ok(RoadmapExtraction {
        title,
        description,
        nodes: graph.nodes,
        edges: graph.edges,
        resources,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn fixture(name: &str) -> Document {
        let html = std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap();
        Document::parse("https://roadmap.sh/frontend", &html).unwrap()
    }

    #[test]
    fn frontend_fixture() {
        let doc = fixture("frontend");
        let ex = extract_roadmap(&doc, &Config::default()).unwrap();
        assert_eq!(ex.title, "Frontend Developer");
        assert!(ex.description.starts_with("Step by step guide"));
        assert!(ex.nodes.len() >= 8);
        assert!(ex.edges.iter().any(|e| e.source == "html" && e.target == "semantic-tags"));

        // No forward references.
        let mut seen = HashSet::new();
        for node in &ex.nodes {
            if let Some(parent) = &node.parent_id {
                assert!(seen.contains(parent), "{} references later node {}", node.id, parent);
            }
            seen.insert(node.id.clone());
        }

        // Roadmap-wide dedup.
        let urls: HashSet<_> = ex.resources.iter().map(|r| &r.url).collect();
        assert_eq!(urls.len(), ex.resources.len());
        assert!(ex.resources.iter().all(|r| r.url.starts_with("http")));
    }

    #[test]
    fn no_headings_is_structure_not_found() {
        let doc = Document::parse("https://roadmap.sh/empty", "<p>nothing here</p>").unwrap();
        let err = extract_roadmap(&doc, &Config::default()).unwrap_err();
        assert!(matches!(err, ScrapeError::StructureNotFound { .. }));
    }

    #[test]
    fn root_with_only_nav_headings_is_passed_over() {
        let doc = Document::parse(
            "https://roadmap.sh/frontend",
            "<header class='container'><nav><h2>Menu</h2></nav></header>\
             <main><h1>Frontend</h1><h2>HTML</h2></main>",
        )
        .unwrap();
        let config = Config::default();
        assert_eq!(doc.structure_root(&config.root_selectors).value().name(), "main");
        let ex = extract_roadmap(&doc, &config).unwrap();
        let ids: Vec<_> = ex.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["frontend", "html"]);
        assert_eq!(ex.title, "Frontend");
    }

    #[test]
    fn invalid_url_is_rejected() {
        assert!(matches!(
            Document::parse("not a url", "<p></p>"),
            Err(ScrapeError::InvalidUrl(_))
        ));
    }

    #[test]
    fn collapse_whitespace() {
        assert_eq!(collapse_ws(["  a\n", "b  ", "\tc"].into_iter()), "a b c");
    }
}
