//! Reconcile fresh extractions with what is already stored. Pure: the caller
//! supplies the stored roadmap and the set of persisted resource URLs, then
//! writes the outcome.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::model::{Resource, Roadmap, RoadmapExtraction, RoadmapListing};

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub roadmap: Roadmap,
    /// Resources whose URL was not persisted yet.
    pub new_resources: Vec<Resource>,
    /// `(resource url, node id)` pairs to link.
    pub links: Vec<(String, String)>,
    pub created: bool,
}

pub fn merge(
    existing: Option<Roadmap>,
    fresh: RoadmapExtraction,
    listing: &RoadmapListing,
    known: &HashSet<String>,
    now: DateTime<Utc>,
) -> MergeOutcome {
    let created = existing.is_none();
    let mut roadmap = existing.unwrap_or_else(|| Roadmap {
        id: None,
        title: listing.title.clone(),
        description: String::new(),
        source_url: listing.url.clone(),
        category: listing.category.clone(),
        nodes: Vec::new(),
        edges: Vec::new(),
        last_updated: now,
    });

    let previous: HashMap<String, Vec<String>> = roadmap
        .nodes
        .drain(..)
        .map(|n| (n.id, n.resource_ids))
        .collect();

    let mut nodes = fresh.nodes;
    for node in &mut nodes {
        if let Some(old) = previous.get(&node.id) {
            let fresh_ids = std::mem::replace(&mut node.resource_ids, old.clone());
            for url in &fresh_ids {
                node.attach(url);
            }
        }
    }

    if !fresh.title.is_empty() {
        roadmap.title = fresh.title;
    }
    if !fresh.description.is_empty() {
        roadmap.description = fresh.description;
    }
    if !listing.category.is_empty() {
        roadmap.category = listing.category.clone();
    }
    roadmap.nodes = nodes;
    roadmap.edges = fresh.edges;
    roadmap.last_updated = now;

    let new_resources: Vec<Resource> = fresh
        .resources
        .into_iter()
        .filter(|r| !known.contains(&r.url))
        .collect();

    let links = roadmap
        .nodes
        .iter()
        .flat_map(|n| n.resource_ids.iter().map(|url| (url.clone(), n.id.clone())))
        .collect();

    MergeOutcome {
        roadmap,
        new_resources,
        links,
        created,
    }
}

/// Outcome of attaching a resolved node's resources to its roadmap.
#[derive(Debug, Clone, Default)]
pub struct NodeMerge {
    pub new_resources: Vec<Resource>,
    pub links: Vec<(String, String)>,
}

/// Attach detail resources to `node_id`. Returns `None` when the roadmap has
/// no such node.
pub fn merge_node_resources(
    roadmap: &mut Roadmap,
    node_id: &str,
    resources: &[Resource],
    known: &HashSet<String>,
) -> Option<NodeMerge> {
    let node = roadmap.node_mut(node_id)?;
    let mut out = NodeMerge::default();
    for resource in resources {
        node.attach(&resource.url);
        out.links.push((resource.url.clone(), node_id.to_string()));
        if !known.contains(&resource.url) && !out.new_resources.iter().any(|r| r.url == resource.url) {
            out.new_resources.push(resource.clone());
        }
    }
    Some(out)
}
