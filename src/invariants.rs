use std::collections::{BTreeSet, HashMap, HashSet};

use anyhow::anyhow;
use serde::Serialize;

use crate::error::{LibError, Result};
use crate::models::{NodeId, NormalizedGraph};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphInvariantViolation {
    KeyMismatch {
        key: NodeId,
        node_id: NodeId,
    },
    MissingParent {
        node_id: NodeId,
        parent_id: NodeId,
    },
    ParentNotFolder {
        node_id: NodeId,
        parent_id: NodeId,
    },
    ChildLinkCount {
        node_id: NodeId,
        parent_id: NodeId,
        count: usize,
    },
    ChildParentMismatch {
        parent_id: NodeId,
        child_id: NodeId,
    },
    RootLinkCount {
        node_id: NodeId,
        count: usize,
    },
    RootHasParent {
        node_id: NodeId,
    },
    DanglingChild {
        parent_id: NodeId,
        child_id: NodeId,
    },
    DanglingRoot {
        node_id: NodeId,
    },
    DuplicateSiblingName {
        parent_id: Option<NodeId>,
        name: String,
    },
    CycleDetected {
        node_ids: Vec<NodeId>,
    },
}

impl GraphInvariantViolation {
    pub const fn error_code(&self) -> &'static str {
        match self {
            GraphInvariantViolation::KeyMismatch { .. } => "graph_key_mismatch",
            GraphInvariantViolation::MissingParent { .. } => "graph_missing_parent",
            GraphInvariantViolation::ParentNotFolder { .. } => "graph_parent_not_folder",
            GraphInvariantViolation::ChildLinkCount { .. } => "graph_child_link_count",
            GraphInvariantViolation::ChildParentMismatch { .. } => "graph_child_parent_mismatch",
            GraphInvariantViolation::RootLinkCount { .. } => "graph_root_link_count",
            GraphInvariantViolation::RootHasParent { .. } => "graph_root_has_parent",
            GraphInvariantViolation::DanglingChild { .. } => "graph_dangling_child",
            GraphInvariantViolation::DanglingRoot { .. } => "graph_dangling_root",
            GraphInvariantViolation::DuplicateSiblingName { .. } => "graph_duplicate_sibling_name",
            GraphInvariantViolation::CycleDetected { .. } => "graph_cycle",
        }
    }

    pub const fn public_message(&self) -> &'static str {
        match self {
            GraphInvariantViolation::KeyMismatch { .. } => "Node is stored under the wrong id",
            GraphInvariantViolation::MissingParent { .. } => {
                "Node references a parent that does not exist"
            }
            GraphInvariantViolation::ParentNotFolder { .. } => "Node parent is not a folder",
            GraphInvariantViolation::ChildLinkCount { .. } => {
                "Folder must list each child exactly once"
            }
            GraphInvariantViolation::ChildParentMismatch { .. } => {
                "Folder lists a child that belongs to another parent"
            }
            GraphInvariantViolation::RootLinkCount { .. } => {
                "Top-level node must appear in the root list exactly once"
            }
            GraphInvariantViolation::RootHasParent { .. } => {
                "Root list contains a node that has a parent"
            }
            GraphInvariantViolation::DanglingChild { .. } => {
                "Folder lists a child that does not exist"
            }
            GraphInvariantViolation::DanglingRoot { .. } => {
                "Root list contains a node that does not exist"
            }
            GraphInvariantViolation::DuplicateSiblingName { .. } => {
                "Sibling nodes must have distinct names"
            }
            GraphInvariantViolation::CycleDetected { .. } => "Folder structure must be acyclic",
        }
    }
}

/// Checks every structural invariant of a room graph and reports all
/// violations found.
pub fn graph_invariant_violations(graph: &NormalizedGraph) -> Vec<GraphInvariantViolation> {
    let nodes = &graph.nodes;
    let mut violations = Vec::new();

    let mut child_links: HashMap<(NodeId, NodeId), usize> = HashMap::new();
    for (key, node) in nodes {
        if *key != node.id {
            violations.push(GraphInvariantViolation::KeyMismatch {
                key: *key,
                node_id: node.id,
            });
        }

        let Some(children) = node.children_ids() else {
            continue;
        };
        for child_id in children {
            match nodes.get(child_id) {
                None => violations.push(GraphInvariantViolation::DanglingChild {
                    parent_id: *key,
                    child_id: *child_id,
                }),
                Some(child) => {
                    if child.parent_id != Some(*key) {
                        violations.push(GraphInvariantViolation::ChildParentMismatch {
                            parent_id: *key,
                            child_id: *child_id,
                        });
                    }
                    *child_links.entry((*key, *child_id)).or_insert(0) += 1;
                }
            }
        }
    }

    let mut root_links: HashMap<NodeId, usize> = HashMap::new();
    for root_id in &graph.root_ids {
        match nodes.get(root_id) {
            None => violations.push(GraphInvariantViolation::DanglingRoot { node_id: *root_id }),
            Some(root) => {
                if root.parent_id.is_some() {
                    violations.push(GraphInvariantViolation::RootHasParent { node_id: *root_id });
                }
                *root_links.entry(*root_id).or_insert(0) += 1;
            }
        }
    }

    let mut sibling_names: HashMap<Option<NodeId>, HashSet<&str>> = HashMap::new();
    for (key, node) in nodes {
        match node.parent_id {
            Some(parent_id) => match nodes.get(&parent_id) {
                None => violations.push(GraphInvariantViolation::MissingParent {
                    node_id: *key,
                    parent_id,
                }),
                Some(parent) if !parent.is_folder() => {
                    violations.push(GraphInvariantViolation::ParentNotFolder {
                        node_id: *key,
                        parent_id,
                    })
                }
                Some(_) => {
                    let count = child_links.get(&(parent_id, *key)).copied().unwrap_or(0);
                    if count != 1 {
                        violations.push(GraphInvariantViolation::ChildLinkCount {
                            node_id: *key,
                            parent_id,
                            count,
                        });
                    }
                }
            },
            None => {
                let count = root_links.get(key).copied().unwrap_or(0);
                if count != 1 {
                    violations.push(GraphInvariantViolation::RootLinkCount {
                        node_id: *key,
                        count,
                    });
                }
            }
        }

        if !sibling_names
            .entry(node.parent_id)
            .or_default()
            .insert(node.name.as_str())
        {
            violations.push(GraphInvariantViolation::DuplicateSiblingName {
                parent_id: node.parent_id,
                name: node.name.clone(),
            });
        }
    }

    let cyclic = nodes_on_parent_cycles(graph);
    if !cyclic.is_empty() {
        violations.push(GraphInvariantViolation::CycleDetected {
            node_ids: cyclic.into_iter().collect(),
        });
    }

    violations
}

pub fn ensure_graph_invariants(graph: &NormalizedGraph) -> Result<()> {
    let violations = graph_invariant_violations(graph);
    if let Some(first) = violations.first() {
        return Err(LibError::unknown_with_code(
            first.error_code(),
            first.public_message(),
            anyhow!("graph invariant validation failed: {:?}", violations),
        ));
    }

    Ok(())
}

/// Nodes whose parent chain never reaches a root.
fn nodes_on_parent_cycles(graph: &NormalizedGraph) -> BTreeSet<NodeId> {
    let nodes = &graph.nodes;
    let mut settled: HashSet<NodeId> = HashSet::with_capacity(nodes.len());
    let mut cyclic = BTreeSet::new();

    for start in nodes.keys() {
        let mut path = Vec::new();
        let mut on_path = HashSet::new();
        let mut current = Some(*start);
        while let Some(node_id) = current {
            if settled.contains(&node_id) || !nodes.contains_key(&node_id) {
                break;
            }
            if !on_path.insert(node_id) {
                let loop_start = path
                    .iter()
                    .position(|id| *id == node_id)
                    .unwrap_or_default();
                cyclic.extend(path[loop_start..].iter().copied());
                break;
            }
            path.push(node_id);
            current = nodes.get(&node_id).and_then(|node| node.parent_id);
        }
        settled.extend(path);
    }

    cyclic
}
