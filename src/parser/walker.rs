use std::collections::VecDeque;
use std::sync::LazyLock;

use scraper::{ElementRef, Selector};

use super::slug::IdAllocator;
use super::{collapse_ws, Document};
use crate::config::Config;

static LINK_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static HEADING_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1, h2, h3").unwrap());
static IMG_ALT_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img[alt]").unwrap());

const SKIP_TAGS: &[&str] = &["head", "script", "style", "noscript", "template", "nav"];
const BLOCK_TAGS: &[&str] = &["p", "ul", "ol", "pre", "blockquote", "table", "dl", "h4", "h5", "h6"];

#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    /// Structural heading (h1-h3). `id` is unique within the walk.
    Heading {
        level: u8,
        text: String,
        id: String,
        anchor: Option<String>,
        marker: Option<String>,
    },
    Content { owner: Option<String>, block: Block },
    Link {
        owner: Option<String>,
        href: String,
        text: String,
        /// Text of the enclosing list item or paragraph.
        context: Option<String>,
    },
    /// Explicit connector naming both endpoints (`data-source` / `data-target`).
    Connector { source: String, target: String },
}

impl Element {
    pub fn owner(&self) -> Option<&str> {
        match self {
            Element::Heading { id, .. } => Some(id),
            Element::Content { owner, .. } | Element::Link { owner, .. } => owner.as_deref(),
            Element::Connector { .. } => None,
        }
    }

    pub fn heading_level(&self) -> Option<u8> {
        match self {
            Element::Heading { level, .. } => Some(*level),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub tag: String,
    pub text: String,
    pub html: String,
    /// Direct `li` children, for `ul`/`ol` blocks.
    pub items: Vec<ListItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListItem {
    pub text: String,
    pub links: Vec<RawLink>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawLink {
    pub href: String,
    pub text: String,
}

/// Depth-first, document-order walk over the structure root.
///
/// Ownership is a single cursor: the last structural heading seen. Blocks do not
/// nest, but links inside a block are still emitted on their own. A block or
/// link wrapping a structural heading is descended into instead, so the heading
/// still takes ownership where it sits.
pub struct Walker<'a> {
    stack: Vec<(ElementRef<'a>, bool)>,
    pending: VecDeque<Element>,
    owner: Option<String>,
    ids: IdAllocator,
    markers: &'a [String],
}

pub fn walk<'a>(doc: &'a Document, config: &'a Config) -> Walker<'a> {
    let root = doc.structure_root(&config.root_selectors);
    Walker {
        stack: vec![(root, false)],
        pending: VecDeque::new(),
        owner: None,
        ids: IdAllocator::default(),
        markers: &config.marker_attributes,
    }
}

impl Iterator for Walker<'_> {
    type Item = Element;

    fn next(&mut self) -> Option<Element> {
        loop {
            if let Some(el) = self.pending.pop_front() {
                return Some(el);
            }
            let (el, in_block) = self.stack.pop()?;
            self.visit(el, in_block);
        }
    }
}

impl<'a> Walker<'a> {
    fn visit(&mut self, el: ElementRef<'a>, in_block: bool) {
        let name = el.value().name();
        if SKIP_TAGS.contains(&name) {
            return;
        }

        if let Some(level) = heading_level(name) {
            self.heading(el, level);
            return;
        }

        if name == "a" && !holds_heading(el) {
            if let Some(href) = el.value().attr("href") {
                self.pending.push_back(Element::Link {
                    owner: self.owner.clone(),
                    href: href.to_string(),
                    text: collapse_ws(el.text()),
                    context: link_context(el),
                });
                return;
            }
        }

        if let (Some(source), Some(target)) =
            (el.value().attr("data-source"), el.value().attr("data-target"))
        {
            self.pending.push_back(Element::Connector {
                source: source.to_string(),
                target: target.to_string(),
            });
        }

        let opens_block = !in_block && BLOCK_TAGS.contains(&name) && !holds_heading(el);
        if opens_block {
            self.pending.push_back(Element::Content {
                owner: self.owner.clone(),
                block: to_block(el),
            });
        }

        let children: Vec<ElementRef<'a>> = el.children().filter_map(ElementRef::wrap).collect();
        for child in children.into_iter().rev() {
            self.stack.push((child, in_block || opens_block));
        }
    }

    fn heading(&mut self, el: ElementRef<'a>, level: u8) {
        let mut text = collapse_ws(el.text());
        if text.is_empty() {
            text = image_label(el);
        }
        // Empty labels still get an id ("node"), so ownership always moves here.
        let id = self.ids.allocate(&text);
        let marker = self
            .markers
            .iter()
            .find_map(|attr| el.value().attr(attr))
            .map(str::to_string);

        self.owner = Some(id.clone());
        self.pending.push_back(Element::Heading {
            level,
            text,
            id: id.clone(),
            anchor: el.value().attr("id").map(str::to_string),
            marker,
        });

        let wrapper = el
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|a| a.value().name() == "a" && a.value().attr("href").is_some());
        for link in wrapper.into_iter().chain(el.select(&LINK_SEL)) {
            if let Some(href) = link.value().attr("href") {
                self.pending.push_back(Element::Link {
                    owner: Some(id.clone()),
                    href: href.to_string(),
                    text: collapse_ws(link.text()),
                    context: None,
                });
            }
        }
    }
}

/// True when `el` holds an h1-h3 the walk would actually reach, i.e. one not
/// hidden under a skipped subtree.
pub(crate) fn holds_heading(el: ElementRef<'_>) -> bool {
    el.select(&HEADING_SEL).any(|h| {
        !h.ancestors()
            .take_while(|n| n.id() != el.id())
            .filter_map(ElementRef::wrap)
            .any(|a| SKIP_TAGS.contains(&a.value().name()))
    })
}

fn image_label(el: ElementRef<'_>) -> String {
    el.value()
        .attr("aria-label")
        .or_else(|| el.value().attr("title"))
        .or_else(|| el.select(&IMG_ALT_SEL).find_map(|img| img.value().attr("alt")))
        .map(|label| collapse_ws(std::iter::once(label)))
        .unwrap_or_default()
}

fn heading_level(name: &str) -> Option<u8> {
    match name {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        _ => None,
    }
}

fn to_block(el: ElementRef<'_>) -> Block {
    let name = el.value().name();
    let items = if name == "ul" || name == "ol" {
        el.children()
            .filter_map(ElementRef::wrap)
            .filter(|c| c.value().name() == "li")
            .map(|li| ListItem {
                text: collapse_ws(li.text()),
                links: li
                    .select(&LINK_SEL)
                    .filter_map(|a| {
                        Some(RawLink {
                            href: a.value().attr("href")?.to_string(),
                            text: collapse_ws(a.text()),
                        })
                    })
                    .collect(),
            })
            .collect()
    } else {
        Vec::new()
    };

    Block {
        tag: name.to_string(),
        text: collapse_ws(el.text()),
        html: el.html(),
        items,
    }
}

pub(crate) fn link_context(link: ElementRef<'_>) -> Option<String> {
    link.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|e| matches!(e.value().name(), "li" | "p"))
        .map(|e| collapse_ws(e.text()))
}

/// Split a walk into per-heading spans. Ownership only changes at headings, so
/// each span is contiguous and starts with its heading.
pub fn owned_spans(elements: &[Element]) -> Vec<(&str, &[Element])> {
    let starts: Vec<usize> = elements
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e, Element::Heading { .. }))
        .map(|(i, _)| i)
        .collect();

    starts
        .iter()
        .enumerate()
        .filter_map(|(n, &start)| {
            let end = starts.get(n + 1).copied().unwrap_or(elements.len());
            let id = elements[start].owner()?;
            Some((id, &elements[start..end]))
        })
        .collect()
}
