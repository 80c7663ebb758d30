use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{ElementRef, Selector};

use super::resources::resolve_href;
use super::{collapse_ws, Document};
use crate::model::RoadmapListing;

static GRID_LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#".grid a[href*="/"]"#).unwrap());

/// Site pages that sit in the same grids but are not roadmaps.
const NON_ROADMAP_PATHS: &[&str] = &["/roadmaps", "/best-practices", "/guides", "/videos"];
const UNCATEGORIZED: &str = "Uncategorized";

/// Parse the roadmap index page into (title, url, category) entries.
pub fn parse_roadmap_list(doc: &Document) -> Vec<RoadmapListing> {
    let mut seen = HashSet::new();

    doc.html()
        .select(&GRID_LINK_SEL)
        .filter_map(|link| {
            let href = link.value().attr("href")?.trim();
            if href.starts_with("http") || NON_ROADMAP_PATHS.contains(&href.trim_end_matches('/')) {
                return None;
            }
            let title = collapse_ws(link.text());
            if title.is_empty() {
                return None;
            }
            Some(RoadmapListing {
                title,
                url: resolve_href(href, doc.url())?.to_string(),
                category: grid_category(link),
            })
        })
        .filter(|listing| seen.insert(listing.url.clone()))
        .collect()
}

/// The grid's section heading is the element right before the grid.
fn grid_category(link: ElementRef<'_>) -> String {
    link.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().classes().any(|c| c == "grid"))
        .and_then(|grid| grid.prev_siblings().find_map(ElementRef::wrap))
        .map(|heading| collapse_ws(heading.text()))
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| UNCATEGORIZED.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(html: &str) -> Vec<RoadmapListing> {
        let doc = Document::parse("https://roadmap.sh/roadmaps", html).unwrap();
        parse_roadmap_list(&doc)
    }

    #[test]
    fn categories_from_preceding_heading() {
        let list = parse(
            "<h2>Role-based Roadmaps</h2><div class='grid'><a href='/frontend'>Frontend</a><a href='/backend'>Backend</a></div>\
             <h2>Skill-based Roadmaps</h2><div class='grid'><a href='/react'> React </a></div>",
        );
        assert_eq!(list.len(), 3);
        assert_eq!(list[0].url, "https://roadmap.sh/frontend");
        assert_eq!(list[0].category, "Role-based Roadmaps");
        assert_eq!(list[2].title, "React");
        assert_eq!(list[2].category, "Skill-based Roadmaps");
    }

    #[test]
    fn skips_external_and_site_pages() {
        let list = parse(
            "<div class='grid'><a href='https://github.com/kamranahmedse'>GitHub</a>\
             <a href='/guides'>Guides</a><a href='/videos/'>Videos</a><a href='/roadmaps'>All</a>\
             <a href='/devops'>DevOps</a><a href='/devops'>DevOps again</a><a href='/empty'> </a></div>",
        );
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].title, "DevOps");
        assert_eq!(list[0].category, UNCATEGORIZED);
    }

    #[test]
    fn fixture() {
        let html = std::fs::read_to_string("tests/fixtures/roadmaps.html").unwrap();
        let list = parse(&html);
        assert_eq!(list.len(), 3);
        assert!(list.iter().all(|l| l.url.starts_with("https://roadmap.sh/")));
    }
}
