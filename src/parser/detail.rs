//! Synchronous extraction for each node-detail strategy. The async cascade in
//! `crate::resolver` decides which of these to run and against which page.

use std::sync::LazyLock;

use scraper::{ElementRef, Selector};
use url::Url;

use super::resources::{link_resource, ResourceSet};
use super::slug::normalize;
use super::walker::{link_context, walk, Element};
use super::{collapse_ws, Document};
use crate::config::Config;
use crate::model::{LearningPath, LearningStep, NodeDetail, Resource};

static H1_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").unwrap());
static MAIN_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("main").unwrap());
static BODY_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());
static LINK_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static TEXT_MATCH_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, h2, h3, h4").unwrap());

fn main_or_body(doc: &Document) -> Option<ElementRef<'_>> {
    doc.html()
        .select(&MAIN_SEL)
        .next()
        .or_else(|| doc.html().select(&BODY_SEL).next())
}

fn is_source_host(url: &str, source_host: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.host_str()
                .map(|h| h.trim_start_matches("www.") == source_host.trim_start_matches("www."))
        })
        .unwrap_or(false)
}

/// Links in `main` (or `body`) that leave the source site. Descriptions come
/// from the enclosing paragraph.
pub fn outbound_resources(doc: &Document, node_id: &str, source_host: &str) -> Vec<Resource> {
    let Some(root) = main_or_body(doc) else {
        return Vec::new();
    };
    let mut seen = ResourceSet::default();
    root.select(&LINK_SEL)
        .filter_map(|a| {
            let context = a
                .parent()
                .and_then(ElementRef::wrap)
                .filter(|p| p.value().name() == "p")
                .map(|p| collapse_ws(p.text()));
            link_resource(
                a.value().attr("href")?,
                &collapse_ws(a.text()),
                context.as_deref(),
                doc.url(),
                node_id,
            )
        })
        .filter(|r| !is_source_host(&r.url, source_host))
        .filter(|r| seen.claim(&r.url))
        .collect()
}

/// A dedicated page counts only if it has a primary heading.
pub fn page_detail(doc: &Document, node_id: &str, source_host: &str) -> Option<NodeDetail> {
    let heading = doc.html().select(&H1_SEL).next()?;
    Some(NodeDetail {
        node_id: node_id.to_string(),
        found: true,
        title: collapse_ws(heading.text()),
        content: main_or_body(doc).map(|e| e.inner_html()).unwrap_or_default(),
        resources: outbound_resources(doc, node_id, source_host),
        detail_source_url: Some(doc.url().to_string()),
        ..Default::default()
    })
}

/// Index and level of the heading for `target`: allocated id or `id`
/// attribute first, then marker attributes.
pub fn find_section(elements: &[Element], target: &str) -> Option<(usize, u8)> {
    let normalized = normalize(target);
    let by_id = elements.iter().position(|e| {
        matches!(e, Element::Heading { id, anchor, .. }
            if id == target || *id == normalized || anchor.as_deref() == Some(target))
    });
    let index = by_id.or_else(|| {
        elements.iter().position(|e| {
            matches!(e, Element::Heading { marker: Some(marker), .. } if marker == target)
        })
    })?;
    Some((index, elements[index].heading_level()?))
}

/// Content, resources and learning paths from the node's own section, which
/// ends at the next heading of the same or a higher level.
pub fn section_detail(doc: &Document, node_id: &str, config: &Config) -> Option<NodeDetail> {
    let elements: Vec<Element> = walk(doc, config).collect();
    let (start, level) = find_section(&elements, node_id)?;
    let end = elements[start + 1..]
        .iter()
        .position(|e| e.heading_level().is_some_and(|l| l <= level))
        .map_or(elements.len(), |p| start + 1 + p);
    let span = &elements[start + 1..end];

    let title = match &elements[start] {
        Element::Heading { text, .. } => text.clone(),
        _ => node_id.to_string(),
    };

    let mut seen = ResourceSet::default();
    let mut resources = Vec::new();
    let mut content = Vec::new();
    let mut learning_paths = Vec::new();
    let mut detail_source_url = None;

    for element in span {
        match element {
            Element::Link { href, text, context, .. } => {
                let Some(resource) = link_resource(href, text, context.as_deref(), doc.url(), node_id) else {
                    continue;
                };
                if detail_source_url.is_none() && is_detail_link(&resource.url, config) {
                    detail_source_url = Some(resource.url.clone());
                }
                if seen.claim(&resource.url) {
                    resources.push(resource);
                }
            }
            Element::Content { block, .. } => {
                content.push(block.html.clone());
                if block.items.len() >= config.learning_path_min_items {
                    let n = learning_paths.len();
                    learning_paths.push(LearningPath {
                        id: format!("path-{}-{}", node_id, n),
                        title: format!("{} - Learning Path {}", title, n + 1),
                        steps: block
                            .items
                            .iter()
                            .enumerate()
                            .map(|(i, item)| LearningStep {
                                order: i + 1,
                                title: item.text.clone(),
                                resources: item
                                    .links
                                    .iter()
                                    .filter_map(|l| {
                                        link_resource(&l.href, &l.text, Some(item.text.as_str()), doc.url(), node_id)
                                    })
                                    .collect(),
                            })
                            .collect(),
                    });
                }
            }
            Element::Heading { text, .. } => content.push(text.clone()),
            Element::Connector { .. } => {}
        }
    }

    Some(NodeDetail {
        node_id: node_id.to_string(),
        found: true,
        title,
        content: content.join("\n"),
        resources,
        learning_paths,
        detail_source_url,
        ..Default::default()
    })
}

/// Pick a heading by text. Each criterion is tried over every heading before
/// the next one: exact, exact after normalizing, substring, normalized substring.
pub fn match_heading(texts: &[String], target: &str) -> Option<usize> {
    let raw = target.trim().to_lowercase();
    let normalized = normalize(target);
    let lowered: Vec<String> = texts.iter().map(|t| t.trim().to_lowercase()).collect();

    let criteria: [&dyn Fn(&str) -> bool; 4] = [
        &|t: &str| !raw.is_empty() && t == raw,
        &|t: &str| !normalized.is_empty() && normalize(t) == normalized,
        &|t: &str| !raw.is_empty() && t.contains(raw.as_str()),
        &|t: &str| !normalized.is_empty() && t.contains(normalized.as_str()),
    ];
    criteria
        .iter()
        .find_map(|matches| lowered.iter().position(|t| matches(t.as_str())))
}

/// Last resort: match a heading by text and scan a bounded run of siblings.
pub fn text_match_detail(doc: &Document, node_id: &str, config: &Config) -> Option<NodeDetail> {
    let headings: Vec<ElementRef<'_>> = doc.html().select(&TEXT_MATCH_SEL).collect();
    let texts: Vec<String> = headings.iter().map(|h| collapse_ws(h.text())).collect();
    let index = match_heading(&texts, node_id)?;
    let heading = headings[index];

    let mut seen = ResourceSet::default();
    let mut resources = Vec::new();
    let mut content = Vec::new();
    let mut detail_source_url = None;

    for sibling in heading
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .take(config.fallback_sibling_limit)
    {
        if matches!(sibling.value().name(), "h1" | "h2" | "h3") {
            break;
        }
        content.push(sibling.html());

        let own = (sibling.value().name() == "a").then_some(sibling);
        for a in own.into_iter().chain(sibling.select(&LINK_SEL)) {
            let Some(href) = a.value().attr("href") else {
                continue;
            };
            let context = link_context(a);
            let Some(resource) = link_resource(href, &collapse_ws(a.text()), context.as_deref(), doc.url(), node_id)
            else {
                continue;
            };
            if detail_source_url.is_none() && is_detail_link(&resource.url, config) {
                detail_source_url = Some(resource.url.clone());
            }
            if seen.claim(&resource.url) {
                resources.push(resource);
            }
        }
    }

    Some(NodeDetail {
        node_id: node_id.to_string(),
        found: true,
        title: texts[index].clone(),
        content: content.join("\n"),
        resources,
        detail_source_url,
        ..Default::default()
    })
}

pub fn is_detail_link(url: &str, config: &Config) -> bool {
    Url::parse(url)
        .map(|u| config.detail_page_patterns.iter().any(|p| u.path().contains(p.as_str())))
        .unwrap_or(false)
}
