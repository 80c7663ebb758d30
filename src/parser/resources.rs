use std::collections::HashSet;

use url::Url;

use super::walker::{owned_spans, Element};
use crate::model::{Resource, ResourceKind, SourceKind, TopicNode};

const FALLBACK_TITLE: &str = "Link";

/// Resolve an href to an absolute http(s) URL without fragment. Pure fragments,
/// other schemes and unparseable hrefs give `None`.
pub fn resolve_href(href: &str, base: &Url) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let mut url = base.join(href).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }
    url.set_fragment(None);
    Some(url)
}

/// Surrounding text with the link text taken out.
pub fn describe(context: Option<&str>, link_text: &str) -> String {
    let Some(context) = context else {
        return String::new();
    };
    let rest = if link_text.is_empty() {
        context.to_string()
    } else {
        context.replacen(link_text, "", 1)
    };
    rest.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_start_matches([':', '-', '–', '—'])
        .trim()
        .to_string()
}

pub fn link_resource(
    href: &str,
    text: &str,
    context: Option<&str>,
    base: &Url,
    owner: &str,
) -> Option<Resource> {
    let url = resolve_href(href, base)?;
    let title = if text.trim().is_empty() {
        FALLBACK_TITLE.to_string()
    } else {
        text.trim().to_string()
    };
    Some(Resource {
        description: describe(context, text),
        kind: ResourceKind::from_url(&url),
        url: url.to_string(),
        title,
        origin_node_id: owner.to_string(),
        source: SourceKind::Scraped,
    })
}

/// URLs already claimed within one roadmap.
#[derive(Debug, Default)]
pub struct ResourceSet {
    seen: HashSet<String>,
}

impl ResourceSet {
    /// True the first time a URL is seen.
    pub fn claim(&mut self, url: &str) -> bool {
        self.seen.insert(url.to_string())
    }
}

#[derive(Debug, Default)]
pub struct NodeResources {
    /// Records first discovered by this node.
    pub created: Vec<Resource>,
    /// Every URL the node references, in order, including ones claimed earlier.
    pub refs: Vec<String>,
}

/// Collect the links in `span` owned by `owner_id`.
pub fn extract_resources(
    span: &[Element],
    owner_id: &str,
    base: &Url,
    seen: &mut ResourceSet,
) -> NodeResources {
    let mut out = NodeResources::default();
    for element in span {
        let Element::Link { owner: Some(owner), href, text, context } = element else {
            continue;
        };
        if owner != owner_id {
            continue;
        }
        let Some(resource) = link_resource(href, text, context.as_deref(), base, owner_id) else {
            continue;
        };
        if !out.refs.contains(&resource.url) {
            out.refs.push(resource.url.clone());
        }
        if seen.claim(&resource.url) {
            out.created.push(resource);
        }
    }
    out
}

/// Attach every node's resources, deduplicated across the whole roadmap.
pub fn attach_resources(nodes: &mut [TopicNode], elements: &[Element], base: &Url) -> Vec<Resource> {
    let mut seen = ResourceSet::default();
    let mut all = Vec::new();

    for (owner, span) in owned_spans(elements) {
        let found = extract_resources(span, owner, base, &mut seen);
        if let Some(node) = nodes.iter_mut().find(|n| n.id == owner) {
            for url in &found.refs {
                node.attach(url);
            }
        }
        all.extend(found.created);
    }
    all
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::parser::graph::build_graph;
    use crate::parser::walker::walk;
    use crate::parser::Document;

    fn base() -> Url {
        Url::parse("https://roadmap.sh/frontend").unwrap()
    }

    fn extract(html: &str) -> (Vec<TopicNode>, Vec<Resource>) {
        let doc = Document::parse("https://roadmap.sh/frontend", html).unwrap();
        let config = Config::default();
        let elements: Vec<_> = walk(&doc, &config).collect();
        let mut graph = build_graph(&elements);
        let resources = attach_resources(&mut graph.nodes, &elements, doc.url());
        (graph.nodes, resources)
    }

    #[test]
    fn resolves_relative_and_drops_fragments() {
        let b = base();
        assert_eq!(
            resolve_href("/guides/http", &b).unwrap().as_str(),
            "https://roadmap.sh/guides/http"
        );
        assert_eq!(
            resolve_href("https://mdn.dev/a#intro", &b).unwrap().as_str(),
            "https://mdn.dev/a"
        );
        assert!(resolve_href("#section", &b).is_none());
        assert!(resolve_href("mailto:a@b.c", &b).is_none());
        assert!(resolve_href("javascript:void(0)", &b).is_none());
        assert!(resolve_href("http://[bad", &b).is_none());
        assert!(resolve_href("  ", &b).is_none());
    }

    #[test]
    fn describe_strips_link_text() {
        assert_eq!(describe(Some("MDN - the reference"), "MDN"), "the reference");
        assert_eq!(describe(None, "MDN"), "");
    }

    #[test]
    fn same_url_different_text_yields_one_resource() {
        let (nodes, resources) = extract(
            "<main><h2>HTML</h2><p><a href='https://mdn.dev/html'>MDN HTML</a></p>\
             <h2>Forms</h2><p><a href='https://mdn.dev/html#forms'>Forms on MDN</a></p></main>",
        );
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].origin_node_id, "html");
        assert_eq!(resources[0].title, "MDN HTML");
        // The later node is linked, not given a second record.
        assert_eq!(nodes[1].resource_ids, vec!["https://mdn.dev/html"]);
    }

    #[test]
    fn empty_text_falls_back_and_kind_is_inferred() {
        let (_, resources) = extract(
            "<main><h2>Video</h2><a href='https://www.youtube.com/watch?v=1'></a>\
             <a href='#top'>top</a><a href='mailto:x@y.z'>mail</a></main>",
        );
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].title, "Link");
        assert_eq!(resources[0].kind, ResourceKind::Video);
        assert_eq!(resources[0].source, SourceKind::Scraped);
    }

    #[test]
    fn links_before_any_heading_are_dropped() {
        let (_, resources) = extract("<body><a href='https://x.dev'>x</a><h2>Topic</h2></body>");
        assert!(resources.is_empty());
    }

    #[test]
    fn list_item_text_becomes_description() {
        let (nodes, resources) = extract(
            "<main><h3>CSS</h3><ul><li><a href='https://web.dev/learn/css'>Learn CSS</a>: free course by Google</li></ul></main>",
        );
        assert_eq!(resources[0].description, "free course by Google");
        assert_eq!(nodes[0].resource_ids, vec!["https://web.dev/learn/css"]);
    }

    #[test]
    fn links_after_wrapped_heading_belong_to_it() {
        let (nodes, resources) = extract(
            "<main><h2>HTML</h2><a href='/frontend/forms'><h3>Forms</h3></a>\
             <p><a href='https://forms.dev'>f</a></p></main>",
        );
        assert_eq!(nodes[0].resource_ids, Vec::<String>::new());
        assert_eq!(
            nodes[1].resource_ids,
            vec!["https://roadmap.sh/frontend/forms", "https://forms.dev/"]
        );
        assert!(resources.iter().all(|r| r.origin_node_id == "forms"));
    }
}
