use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::models::{Node, NodeId};

/// Splits `name` at its last `.` into stem and extension (dot included).
///
/// The extension is only recognised when the stem is non-empty and the
/// extension has at least one character after the dot, so `".env"` and
/// `"draft."` have no extension.
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < name.len() => name.split_at(idx),
        _ => (name, ""),
    }
}

/// Returns `base` if it is free, otherwise the first free
/// `"{stem} (n){ext}"` for n = 1, 2, ...
pub fn unique_name(base: &str, taken: &HashSet<&str>) -> String {
    if !taken.contains(base) {
        return base.to_string();
    }
    let (stem, extension) = split_extension(base);
    probe(stem, extension, taken)
}

/// Same probing as [`unique_name`] but without extension handling; room
/// names are not file names.
pub fn unique_plain_name(base: &str, taken: &HashSet<&str>) -> String {
    if !taken.contains(base) {
        return base.to_string();
    }
    probe(base, "", taken)
}

fn probe(stem: &str, extension: &str, taken: &HashSet<&str>) -> String {
    let mut counter = 1usize;
    loop {
        let candidate = format!("{stem} ({counter}){extension}");
        if !taken.contains(candidate.as_str()) {
            return candidate;
        }
        counter += 1;
    }
}

/// Walks `parent_id` links upward from `start` and reports whether `target`
/// is on the chain (including `start` itself).
///
/// The walk is bounded by the number of nodes so a corrupted parent cycle
/// cannot spin forever.
pub fn ancestor_chain_contains(
    nodes: &BTreeMap<NodeId, Node>,
    start: NodeId,
    target: NodeId,
) -> bool {
    let mut current = Some(start);
    let mut steps = 0usize;
    while let Some(node_id) = current {
        if node_id == target {
            return true;
        }
        if steps > nodes.len() {
            return false;
        }
        steps += 1;
        current = nodes.get(&node_id).and_then(|node| node.parent_id);
    }
    false
}

/// Result of a depth-first walk over `children_ids`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubtreeWalk {
    /// Pre-order: every node appears before its descendants.
    pub ids: Vec<NodeId>,
    /// `(parent, child)` pairs whose child id did not resolve.
    pub dangling: Vec<(NodeId, NodeId)>,
}

/// Collects `root` and everything reachable from it through `children_ids`.
///
/// Unresolvable child ids are skipped and reported in
/// [`SubtreeWalk::dangling`]. A node reachable twice is visited once.
pub fn collect_subtree(nodes: &BTreeMap<NodeId, Node>, root: NodeId) -> SubtreeWalk {
    let mut walk = SubtreeWalk::default();
    if !nodes.contains_key(&root) {
        return walk;
    }

    let mut visited = HashSet::new();
    let mut stack = vec![root];
    while let Some(node_id) = stack.pop() {
        if !visited.insert(node_id) {
            continue;
        }
        walk.ids.push(node_id);
        let Some(children) = nodes.get(&node_id).and_then(Node::children_ids) else {
            continue;
        };
        for child_id in children {
            if !nodes.contains_key(child_id) {
                walk.dangling.push((node_id, *child_id));
            }
        }
        stack.extend(
            children
                .iter()
                .rev()
                .filter(|child_id| nodes.contains_key(*child_id)),
        );
    }
    walk
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    #[default]
    Name,
    Size,
    Date,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Orders a listing for display. Folders count as size zero; `Date` sorts by
/// `updated_at`.
pub fn sort_nodes(nodes: &mut [Node], field: SortField, direction: SortDirection) {
    nodes.sort_by(|a, b| {
        let ordering = match field {
            SortField::Name => compare_names(&a.name, &b.name),
            SortField::Size => a.size().cmp(&b.size()),
            SortField::Date => a.updated_at.cmp(&b.updated_at),
        };
        match direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    });
}

fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}
