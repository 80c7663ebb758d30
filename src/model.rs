use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Roadmap,
    Topic,
    Subtopic,
    Skill,
}

impl NodeKind {
    pub fn from_level(level: u8) -> Self {
        match level {
            1 => NodeKind::Roadmap,
            2 => NodeKind::Topic,
            _ => NodeKind::Skill,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicNode {
    pub id: String,
    pub title: String,
    pub description: String,
    pub kind: NodeKind,
    pub parent_id: Option<String>,
    pub position: Position,
    /// Resource URLs, in discovery order, without repeats.
    pub resource_ids: Vec<String>,
}

impl TopicNode {
    /// Append a resource reference unless it is already attached.
    pub fn attach(&mut self, url: &str) -> bool {
        if self.resource_ids.iter().any(|u| u == url) {
            return false;
        }
        self.resource_ids.push(url.to_string());
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub kind: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Article,
    Video,
    Course,
    Book,
    Tool,
    Other,
}

const HOST_KINDS: &[(&str, ResourceKind)] = &[
    ("youtube.com", ResourceKind::Video),
    ("youtu.be", ResourceKind::Video),
    ("vimeo.com", ResourceKind::Video),
    ("egghead.io", ResourceKind::Video),
    ("udemy.com", ResourceKind::Course),
    ("coursera.org", ResourceKind::Course),
    ("pluralsight.com", ResourceKind::Course),
    ("frontendmasters.com", ResourceKind::Course),
    ("educative.io", ResourceKind::Course),
    ("codecademy.com", ResourceKind::Course),
    ("oreilly.com", ResourceKind::Book),
    ("manning.com", ResourceKind::Book),
    ("leanpub.com", ResourceKind::Book),
    ("github.com", ResourceKind::Tool),
    ("npmjs.com", ResourceKind::Tool),
    ("crates.io", ResourceKind::Tool),
];

impl ResourceKind {
    /// Infer the kind from the URL host; anything unrecognised is an article.
    pub fn from_url(url: &Url) -> Self {
        let host = url.host_str().unwrap_or("").trim_start_matches("www.");
        HOST_KINDS
            .iter()
            .find(|(pattern, _)| host == *pattern || host.ends_with(&format!(".{}", pattern)))
            .map(|(_, kind)| *kind)
            .unwrap_or(ResourceKind::Article)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Article => "article",
            ResourceKind::Video => "video",
            ResourceKind::Course => "course",
            ResourceKind::Book => "book",
            ResourceKind::Tool => "tool",
            ResourceKind::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "article" => ResourceKind::Article,
            "video" => ResourceKind::Video,
            "course" => ResourceKind::Course,
            "book" => ResourceKind::Book,
            "tool" => ResourceKind::Tool,
            _ => ResourceKind::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Scraped,
    User,
    Curated,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Scraped => "scraped",
            SourceKind::User => "user",
            SourceKind::Curated => "curated",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "user" => SourceKind::User,
            "curated" => SourceKind::Curated,
            _ => SourceKind::Scraped,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub title: String,
    pub description: String,
    pub url: String,
    pub kind: ResourceKind,
    pub origin_node_id: String,
    pub source: SourceKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Roadmap {
    /// Row id; `None` until first persisted.
    pub id: Option<i64>,
    pub title: String,
    pub description: String,
    pub source_url: String,
    pub category: String,
    pub nodes: Vec<TopicNode>,
    pub edges: Vec<Edge>,
    pub last_updated: DateTime<Utc>,
}

impl Roadmap {
    pub fn node_mut(&mut self, id: &str) -> Option<&mut TopicNode> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }
}

/// One entry of the roadmap index page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoadmapListing {
    pub title: String,
    pub url: String,
    pub category: String,
}

/// Output of one bulk extraction, before reconciliation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoadmapExtraction {
    pub title: String,
    pub description: String,
    pub nodes: Vec<TopicNode>,
    pub edges: Vec<Edge>,
    pub resources: Vec<Resource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningStep {
    pub order: usize,
    pub title: String,
    pub resources: Vec<Resource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningPath {
    pub id: String,
    pub title: String,
    pub steps: Vec<LearningStep>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDetail {
    pub node_id: String,
    pub found: bool,
    pub title: String,
    pub content: String,
    pub resources: Vec<Resource>,
    pub learning_paths: Vec<LearningPath>,
    pub detail_source_url: Option<String>,
    /// Name of the strategy that produced this detail.
    pub strategy: Option<String>,
    pub error: Option<String>,
}

impl NodeDetail {
    pub fn not_found(node_id: &str, error: String) -> Self {
        Self {
            node_id: node_id.to_string(),
            error: Some(error),
            ..Default::default()
        }
    }

    /// Append resources whose URL is not already present.
    pub fn append_resources(&mut self, extra: Vec<Resource>) -> usize {
        let mut added = 0;
        for r in extra {
            if !self.resources.iter().any(|e| e.url == r.url) {
                self.resources.push(r);
                added += 1;
            }
        }
        added
    }
}
