use std::collections::HashMap;

use super::slug::normalize;
use super::walker::Element;
use crate::model::{Edge, NodeKind, Position, TopicNode};

pub const DEFAULT_EDGE: &str = "default";
pub const CONNECTION_EDGE: &str = "connection";

const X_STEP: f64 = 200.0;
const Y_STEP: f64 = 100.0;

#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub nodes: Vec<TopicNode>,
    pub edges: Vec<Edge>,
}

/// Assemble nodes and edges from a walk.
///
/// Level 1 → roadmap, level 2 → topic, level 3 → skill. Only skills get a parent:
/// the last level-2 heading seen. A skill with no such heading is kept as an
/// orphan without an edge.
pub fn build_graph(elements: &[Element]) -> Graph {
    let mut graph = Graph::default();
    let mut index_of: HashMap<String, usize> = HashMap::new();
    let mut last_seen_parent: Option<String> = None;
    let mut connectors = Vec::new();

    for element in elements {
        match element {
            Element::Heading { level, text, id, .. } => {
                let parent_id = if *level == 3 { last_seen_parent.clone() } else { None };
                if *level == 2 {
                    last_seen_parent = Some(id.clone());
                }
                if let Some(parent) = &parent_id {
                    graph.edges.push(Edge {
                        source: parent.clone(),
                        target: id.clone(),
                        kind: DEFAULT_EDGE.to_string(),
                    });
                }

                let index = graph.nodes.len();
                index_of.insert(id.clone(), index);
                graph.nodes.push(TopicNode {
                    id: id.clone(),
                    title: text.clone(),
                    description: String::new(),
                    kind: NodeKind::from_level(*level),
                    parent_id,
                    position: Position {
                        x: f64::from(*level - 1) * X_STEP,
                        y: index as f64 * Y_STEP,
                    },
                    resource_ids: Vec::new(),
                });
            }
            Element::Content { owner: Some(owner), block } if !block.text.is_empty() => {
                if let Some(&i) = index_of.get(owner) {
                    let description = &mut graph.nodes[i].description;
                    if !description.is_empty() {
                        description.push(' ');
                    }
                    description.push_str(&block.text);
                }
            }
            Element::Connector { source, target } => connectors.push((source, target)),
            _ => {}
        }
    }

    for (source, target) in connectors {
        let (source, target) = (resolve_endpoint(source, &index_of), resolve_endpoint(target, &index_of));
        let (Some(source), Some(target)) = (source, target) else {
            continue;
        };
        if source == target
            || graph
                .edges
                .iter()
                .any(|e| e.source == source && e.target == target)
        {
            continue;
        }
        graph.edges.push(Edge {
            source,
            target,
            kind: CONNECTION_EDGE.to_string(),
        });
    }

    graph
}

fn resolve_endpoint(raw: &str, index_of: &HashMap<String, usize>) -> Option<String> {
    if index_of.contains_key(raw) {
        return Some(raw.to_string());
    }
    let id = normalize(raw);
    index_of.contains_key(&id).then_some(id)
}
