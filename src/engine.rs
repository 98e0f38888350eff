//! In-memory operations over one room's [`NormalizedGraph`].
//!
//! Every public mutation validates first and only then touches the graph, so
//! a returned error always means the graph is exactly as it was before the
//! call.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, Utc};

use crate::algorithms::{ancestor_chain_contains, collect_subtree, unique_name};
use crate::clock::{Clock, SystemClock};
use crate::error::{LibError, Result};
use crate::ids::{IdGenerator, UuidIdGenerator};
use crate::models::{
    CreateFilePayload, CreateFolderPayload, FileData, FolderData, MoveNodePayload, Node, NodeId,
    NodeKind, NormalizedGraph, UpdateNodePayload, normalize_name,
};

/// A node and its descendants after removal from a graph. The values are
/// owned by the caller until handed to [`GraphEngine::insert_node_subtree`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedSubtree {
    pub root: Node,
    /// Descendants of `root` in depth-first pre-order.
    pub descendants: Vec<Node>,
}

impl ExtractedSubtree {
    /// Number of nodes carried, root included.
    pub fn node_count(&self) -> usize {
        1 + self.descendants.len()
    }

    pub fn ids(&self) -> Vec<NodeId> {
        std::iter::once(self.root.id)
            .chain(self.descendants.iter().map(|node| node.id))
            .collect()
    }
}

pub struct GraphEngine {
    graph: NormalizedGraph,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl GraphEngine {
    pub fn new(graph: NormalizedGraph) -> Self {
        Self::with_env(graph, Arc::new(SystemClock), Arc::new(UuidIdGenerator))
    }

    pub fn with_env(
        graph: NormalizedGraph,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self { graph, clock, ids }
    }

    pub fn graph(&self) -> &NormalizedGraph {
        &self.graph
    }

    pub fn into_graph(self) -> NormalizedGraph {
        self.graph
    }

    pub fn get_node(&self, node_id: NodeId) -> Option<&Node> {
        self.graph.nodes.get(&node_id)
    }

    /// Children of a folder in insertion order. Unknown ids and non-folders
    /// yield an empty list.
    pub fn get_children(&self, parent_id: NodeId) -> Vec<&Node> {
        self.graph
            .nodes
            .get(&parent_id)
            .and_then(Node::children_ids)
            .map(|children| {
                children
                    .iter()
                    .filter_map(|id| self.graph.nodes.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get_root_nodes(&self) -> Vec<&Node> {
        self.graph
            .root_ids
            .iter()
            .filter_map(|id| self.graph.nodes.get(id))
            .collect()
    }

    pub fn create_folder(&mut self, payload: CreateFolderPayload) -> Result<Node> {
        let name = normalize_name(&payload.name, "Folder name cannot be empty")?;
        self.ensure_parent_folder(payload.parent_id)?;

        let name = self.resolve_name(&name, payload.parent_id, None);
        let now = self.clock.now();
        let folder = Node {
            id: self.ids.node_id(),
            name,
            parent_id: payload.parent_id,
            created_at: now,
            updated_at: now,
            kind: NodeKind::Folder(FolderData::default()),
        };

        self.graph.nodes.insert(folder.id, folder.clone());
        self.attach(folder.id, payload.parent_id, now);
        Ok(folder)
    }

    pub fn create_file(&mut self, payload: CreateFilePayload) -> Result<Node> {
        let name = normalize_name(&payload.name, "File name cannot be empty")?;
        self.ensure_parent_folder(payload.parent_id)?;

        let name = self.resolve_name(&name, payload.parent_id, None);
        let mime_type = payload.effective_mime_type().to_string();
        let now = self.clock.now();
        let file = Node {
            id: self.ids.node_id(),
            name,
            parent_id: payload.parent_id,
            created_at: now,
            updated_at: now,
            kind: NodeKind::File(FileData {
                size: payload.content.len(),
                mime_type,
                content: payload.content,
                metadata: payload.metadata,
            }),
        };

        self.graph.nodes.insert(file.id, file.clone());
        self.attach(file.id, payload.parent_id, now);
        Ok(file)
    }

    /// Renames a node. Unlike create and move, a clash with a sibling is an
    /// error rather than an automatic rename.
    pub fn update_node(&mut self, payload: UpdateNodePayload) -> Result<Node> {
        let node = self
            .graph
            .nodes
            .get(&payload.id)
            .ok_or_else(|| LibError::node_not_found(payload.id))?;
        let name = normalize_name(&payload.name, "Name cannot be empty")?;

        let clashes = self
            .siblings(node.parent_id)
            .any(|sibling| sibling.id != node.id && sibling.name == name);
        if clashes {
            tracing::debug!(node_id = %payload.id, name = %name, "rename rejected: sibling name taken");
            return Err(LibError::conflict(
                "A node with this name already exists in this location",
                anyhow!(
                    "a {} named {:?} already exists under {:?}",
                    node.node_type(),
                    name,
                    node.parent_id
                ),
            ));
        }

        let now = self.clock.now();
        let node = self
            .graph
            .nodes
            .get_mut(&payload.id)
            .ok_or_else(|| LibError::node_not_found(payload.id))?;
        node.name = name;
        node.updated_at = now;
        Ok(node.clone())
    }

    /// Deletes a node and, for folders, every descendant. Returns the value
    /// of the deleted node as it was just before removal.
    pub fn delete_node(&mut self, node_id: NodeId) -> Result<Node> {
        let parent_id = self
            .graph
            .nodes
            .get(&node_id)
            .ok_or_else(|| LibError::node_not_found(node_id))?
            .parent_id;

        let walk = collect_subtree(&self.graph.nodes, node_id);
        let now = self.clock.now();
        self.detach(node_id, parent_id, now);

        let mut removed = None;
        for id in walk.ids.iter().rev() {
            removed = self.graph.nodes.remove(id);
        }
        removed.ok_or_else(|| LibError::node_not_found(node_id))
    }

    /// Re-attaches a node value previously removed by a delete.
    ///
    /// The node keeps its id and timestamps. A sibling that took its name in
    /// the meantime causes an automatic rename, and folder child links that
    /// no longer resolve are dropped.
    pub fn restore_node(&mut self, mut node: Node, parent_id: Option<NodeId>) -> Result<Node> {
        if self.graph.nodes.contains_key(&node.id) {
            return Err(LibError::conflict_with_code(
                "node_already_exists",
                "Node already exists in this room",
                anyhow!("node {} is already present", node.id),
            ));
        }
        self.ensure_parent_folder(parent_id)?;

        node.name = self.resolve_name(&node.name, parent_id, None);
        node.parent_id = parent_id;
        let restored_id = node.id;
        let nodes = &self.graph.nodes;
        if let Some(children) = node.children_ids_mut() {
            children.retain(|child_id| {
                nodes
                    .get(child_id)
                    .is_some_and(|child| child.parent_id == Some(restored_id))
            });
        }

        let now = self.clock.now();
        self.graph.nodes.insert(node.id, node.clone());
        self.attach(node.id, parent_id, now);
        Ok(node)
    }

    pub fn move_node(&mut self, payload: MoveNodePayload) -> Result<Node> {
        let node = self
            .graph
            .nodes
            .get(&payload.node_id)
            .ok_or_else(|| LibError::node_not_found(payload.node_id))?;
        let is_folder = node.is_folder();
        let old_parent_id = node.parent_id;
        let current_name = node.name.clone();
        self.ensure_parent_folder(payload.new_parent_id)?;

        if let Some(new_parent_id) = payload.new_parent_id {
            if is_folder
                && ancestor_chain_contains(&self.graph.nodes, new_parent_id, payload.node_id)
            {
                tracing::debug!(
                    node_id = %payload.node_id,
                    new_parent_id = %new_parent_id,
                    "move rejected: destination is inside the moved folder"
                );
                return Err(LibError::cycle(
                    "Cannot move a folder into itself or its descendants",
                    anyhow!(
                        "folder {} is an ancestor of {}",
                        payload.node_id,
                        new_parent_id
                    ),
                ));
            }
        }

        let name = self.resolve_name(&current_name, payload.new_parent_id, Some(payload.node_id));
        let now = self.clock.now();
        self.detach(payload.node_id, old_parent_id, now);
        self.attach(payload.node_id, payload.new_parent_id, now);

        let node = self
            .graph
            .nodes
            .get_mut(&payload.node_id)
            .ok_or_else(|| LibError::node_not_found(payload.node_id))?;
        node.name = name;
        node.parent_id = payload.new_parent_id;
        node.updated_at = now;
        Ok(node.clone())
    }

    /// Nodes from the top-level ancestor down to `node_id`. A broken parent
    /// link ends the walk early; an unknown id gives an empty path.
    pub fn get_path(&self, node_id: NodeId) -> Vec<&Node> {
        let mut path = Vec::new();
        let mut current = Some(node_id);
        while let Some(id) = current {
            if path.len() > self.graph.nodes.len() {
                break;
            }
            let Some(node) = self.graph.nodes.get(&id) else {
                break;
            };
            path.push(node);
            current = node.parent_id;
        }
        path.reverse();
        path
    }

    /// Case-insensitive substring match over every node name in the room.
    pub fn search_nodes(&self, query: &str) -> Vec<&Node> {
        let query = query.to_lowercase();
        self.graph
            .nodes
            .values()
            .filter(|node| node.name.to_lowercase().contains(&query))
            .collect()
    }

    /// Removes a node and its descendants from the graph and hands them to
    /// the caller.
    ///
    /// Child ids that no longer resolve are skipped and dropped from the
    /// extracted folders' child lists instead of failing the extraction.
    pub fn extract_node_subtree(&mut self, node_id: NodeId) -> Result<ExtractedSubtree> {
        let parent_id = self
            .graph
            .nodes
            .get(&node_id)
            .ok_or_else(|| LibError::node_not_found(node_id))?
            .parent_id;

        let walk = collect_subtree(&self.graph.nodes, node_id);
        for (folder_id, missing_id) in &walk.dangling {
            tracing::warn!(
                folder_id = %folder_id,
                child_id = %missing_id,
                "dropping unresolvable child id during extraction"
            );
            if let Some(children) = self
                .graph
                .nodes
                .get_mut(folder_id)
                .and_then(Node::children_ids_mut)
            {
                children.retain(|id| id != missing_id);
            }
        }

        let now = self.clock.now();
        self.detach(node_id, parent_id, now);

        let mut extracted = walk
            .ids
            .iter()
            .filter_map(|id| self.graph.nodes.remove(id))
            .collect::<Vec<_>>();
        if extracted.is_empty() {
            return Err(LibError::node_not_found(node_id));
        }
        let root = extracted.remove(0);
        Ok(ExtractedSubtree {
            root,
            descendants: extracted,
        })
    }

    /// Inserts a previously extracted subtree under `new_parent_id`,
    /// renaming its root if the destination already has that name.
    pub fn insert_node_subtree(
        &mut self,
        subtree: ExtractedSubtree,
        new_parent_id: Option<NodeId>,
    ) -> Result<Node> {
        self.ensure_parent_folder(new_parent_id)?;
        let incoming_ids = subtree.ids();
        let mut seen = HashSet::with_capacity(incoming_ids.len());
        for id in &incoming_ids {
            if self.graph.nodes.contains_key(id) || !seen.insert(*id) {
                return Err(LibError::conflict_with_code(
                    "node_already_exists",
                    "Node already exists in this room",
                    anyhow!("subtree node {} collides with an existing id", id),
                ));
            }
        }

        let ExtractedSubtree {
            mut root,
            descendants,
        } = subtree;
        let now = self.clock.now();
        root.name = self.resolve_name(&root.name, new_parent_id, None);
        root.parent_id = new_parent_id;
        root.updated_at = now;

        let root_id = root.id;
        self.graph.nodes.insert(root_id, root.clone());
        for node in descendants {
            self.graph.nodes.insert(node.id, node);
        }
        self.attach(root_id, new_parent_id, now);
        Ok(root)
    }

    fn siblings(&self, parent_id: Option<NodeId>) -> impl Iterator<Item = &Node> {
        let ids: &[NodeId] = match parent_id {
            Some(parent_id) => self
                .graph
                .nodes
                .get(&parent_id)
                .and_then(Node::children_ids)
                .unwrap_or(&[]),
            None => &self.graph.root_ids,
        };
        ids.iter().filter_map(|id| self.graph.nodes.get(id))
    }

    /// Unique name for `base` among the children of `parent_id`, ignoring
    /// `exclude` (the node being moved, if any).
    fn resolve_name(&self, base: &str, parent_id: Option<NodeId>, exclude: Option<NodeId>) -> String {
        let taken: HashSet<&str> = self
            .siblings(parent_id)
            .filter(|sibling| Some(sibling.id) != exclude)
            .map(|sibling| sibling.name.as_str())
            .collect();
        unique_name(base, &taken)
    }

    fn ensure_parent_folder(&self, parent_id: Option<NodeId>) -> Result<()> {
        let Some(parent_id) = parent_id else {
            return Ok(());
        };
        match self.graph.nodes.get(&parent_id) {
            None => Err(LibError::not_found_with_code(
                "parent_not_found",
                "Parent folder not found",
                anyhow!("parent folder {} not found", parent_id),
            )),
            Some(parent) if !parent.is_folder() => Err(LibError::validation_with_code(
                "parent_not_folder",
                "Parent must be a folder",
                anyhow!("parent {} is a {}", parent_id, parent.node_type()),
            )),
            Some(_) => Ok(()),
        }
    }

    fn attach(&mut self, child_id: NodeId, parent_id: Option<NodeId>, now: DateTime<Utc>) {
        match parent_id {
            Some(parent_id) => {
                if let Some(parent) = self.graph.nodes.get_mut(&parent_id) {
                    if let Some(children) = parent.children_ids_mut() {
                        children.push(child_id);
                        parent.updated_at = now;
                    }
                }
            }
            None => self.graph.root_ids.push(child_id),
        }
    }

    fn detach(&mut self, child_id: NodeId, parent_id: Option<NodeId>, now: DateTime<Utc>) {
        match parent_id {
            Some(parent_id) => {
                if let Some(parent) = self.graph.nodes.get_mut(&parent_id) {
                    if let Some(children) = parent.children_ids_mut() {
                        children.retain(|id| *id != child_id);
                        parent.updated_at = now;
                    }
                }
            }
            None => self.graph.root_ids.retain(|id| *id != child_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::clock::ManualClock;
    use crate::error::ErrorKind;
    use crate::ids::SequentialIdGenerator;
    use crate::invariants::ensure_graph_invariants;
    use crate::models::{FileContent, FileMetadata};

    fn engine() -> GraphEngine {
        let start = Utc
            .with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
            .single()
            .expect("valid timestamp");
        GraphEngine::with_env(
            NormalizedGraph::default(),
            Arc::new(ManualClock::new(start)),
            Arc::new(SequentialIdGenerator::default()),
        )
    }

    fn folder(engine: &mut GraphEngine, name: &str, parent_id: Option<NodeId>) -> Node {
        engine
            .create_folder(CreateFolderPayload {
                name: name.to_string(),
                parent_id,
            })
            .expect("folder should be created")
    }

    fn file(engine: &mut GraphEngine, name: &str, parent_id: Option<NodeId>) -> Node {
        engine
            .create_file(CreateFilePayload {
                name: name.to_string(),
                parent_id,
                content: FileContent::new(b"%PDF-1.7 body".to_vec()),
                mime_type: "application/pdf".to_string(),
                metadata: None,
            })
            .expect("file should be created")
    }

    fn names(nodes: &[&Node]) -> Vec<String> {
        nodes.iter().map(|node| node.name.clone()).collect()
    }

    fn assert_valid(engine: &GraphEngine) {
        ensure_graph_invariants(engine.graph()).expect("graph invariants should hold");
    }

    #[test]
    fn create_folder_at_root_and_nested() {
        let mut engine = engine();
        let parent = folder(&mut engine, "Parent", None);
        let child = folder(&mut engine, "Child", Some(parent.id));

        assert_eq!(child.parent_id, Some(parent.id));
        assert_eq!(names(&engine.get_root_nodes()), vec!["Parent"]);
        assert_eq!(names(&engine.get_children(parent.id)), vec!["Child"]);
        let parent = engine.get_node(parent.id).expect("parent exists");
        assert!(parent.updated_at > parent.created_at);
        assert_valid(&engine);
    }

    #[test]
    fn create_trims_and_rejects_blank_names() {
        let mut engine = engine();
        let created = folder(&mut engine, "  Docs  ", None);
        assert_eq!(created.name, "Docs");

        let err = engine
            .create_folder(CreateFolderPayload {
                name: "   ".to_string(),
                parent_id: None,
            })
            .expect_err("blank name should fail");
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(engine.graph().node_count(), 1);
    }

    #[test]
    fn create_under_missing_or_file_parent_fails() {
        let mut engine = engine();
        let doc = file(&mut engine, "a.pdf", None);

        let err = engine
            .create_folder(CreateFolderPayload {
                name: "X".to_string(),
                parent_id: Some(NodeId(uuid::Uuid::from_u128(999))),
            })
            .expect_err("missing parent should fail");
        assert_eq!(err.code, "parent_not_found");

        let err = engine
            .create_folder(CreateFolderPayload {
                name: "X".to_string(),
                parent_id: Some(doc.id),
            })
            .expect_err("file parent should fail");
        assert_eq!(err.code, "parent_not_folder");
        assert_eq!(engine.graph().node_count(), 1);
    }

    #[test]
    fn create_file_records_size_type_and_metadata() {
        let mut engine = engine();
        let created = engine
            .create_file(CreateFilePayload {
                name: "scan".to_string(),
                parent_id: None,
                content: FileContent::new(vec![1, 2, 3, 4]),
                mime_type: String::new(),
                metadata: Some(FileMetadata {
                    page_count: Some(3),
                    ..FileMetadata::default()
                }),
            })
            .expect("file should be created");

        let data = created.file().expect("file payload");
        assert_eq!(data.size, 4);
        assert_eq!(data.mime_type, "application/pdf");
        assert_eq!(
            data.metadata.as_ref().and_then(|metadata| metadata.page_count),
            Some(3)
        );
    }

    #[test]
    fn colliding_creates_probe_numbered_names() {
        let mut engine = engine();
        file(&mut engine, "Report.pdf", None);
        let second = file(&mut engine, "Report.pdf", None);
        let third = file(&mut engine, "Report.pdf", None);
        assert_eq!(second.name, "Report (1).pdf");
        assert_eq!(third.name, "Report (2).pdf");

        folder(&mut engine, "Notes", None);
        let notes = folder(&mut engine, "Notes", None);
        assert_eq!(notes.name, "Notes (1)");
        assert_valid(&engine);
    }

    #[test]
    fn rename_conflict_is_an_error_and_leaves_name_unchanged() {
        let mut engine = engine();
        folder(&mut engine, "Team", None);
        let second = folder(&mut engine, "Team", None);
        assert_eq!(second.name, "Team (1)");

        let err = engine
            .update_node(UpdateNodePayload {
                id: second.id,
                name: "Team".to_string(),
            })
            .expect_err("rename onto sibling name should fail");
        assert_eq!(err.kind, ErrorKind::Conflict);
        assert!(err.public.contains("already exists"));
        assert_eq!(
            engine.get_node(second.id).expect("node exists").name,
            "Team (1)"
        );
    }

    #[test]
    fn rename_allows_same_name_in_other_folder_and_own_name() {
        let mut engine = engine();
        let p1 = folder(&mut engine, "Parent1", None);
        let p2 = folder(&mut engine, "Parent2", None);
        folder(&mut engine, "Child", Some(p1.id));
        let other = folder(&mut engine, "Other", Some(p2.id));

        let renamed = engine
            .update_node(UpdateNodePayload {
                id: other.id,
                name: " Child ".to_string(),
            })
            .expect("rename should succeed");
        assert_eq!(renamed.name, "Child");
        assert!(renamed.updated_at > other.updated_at);

        engine
            .update_node(UpdateNodePayload {
                id: other.id,
                name: "Child".to_string(),
            })
            .expect("renaming to current name should succeed");
    }

    #[test]
    fn rename_unknown_node_is_not_found() {
        let mut engine = engine();
        let err = engine
            .update_node(UpdateNodePayload {
                id: NodeId(uuid::Uuid::from_u128(42)),
                name: "X".to_string(),
            })
            .expect_err("unknown node");
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[test]
    fn delete_folder_removes_every_descendant() {
        let mut engine = engine();
        let parent = folder(&mut engine, "Parent", None);
        let child = folder(&mut engine, "Child", Some(parent.id));
        let leaf = file(&mut engine, "test.pdf", Some(child.id));
        let keep = file(&mut engine, "keep.pdf", None);

        let removed = engine.delete_node(parent.id).expect("delete should succeed");
        assert_eq!(removed.id, parent.id);

        for id in [parent.id, child.id, leaf.id] {
            assert!(engine.get_node(id).is_none());
        }
        assert_eq!(engine.graph().root_ids, vec![keep.id]);
        assert_valid(&engine);
    }

    #[test]
    fn delete_child_detaches_from_parent() {
        let mut engine = engine();
        let parent = folder(&mut engine, "Parent", None);
        let leaf = file(&mut engine, "test.pdf", Some(parent.id));

        engine.delete_node(leaf.id).expect("delete should succeed");
        assert!(engine.get_children(parent.id).is_empty());
        assert_valid(&engine);

        let err = engine.delete_node(leaf.id).expect_err("second delete fails");
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[test]
    fn move_reparents_and_updates_both_parents() {
        let mut engine = engine();
        let docs = folder(&mut engine, "Docs", None);
        let legal = folder(&mut engine, "Legal", Some(docs.id));
        let contract = file(&mut engine, "contract.pdf", Some(legal.id));
        let archive = folder(&mut engine, "Archive", None);

        let moved = engine
            .move_node(MoveNodePayload {
                node_id: legal.id,
                new_parent_id: Some(archive.id),
            })
            .expect("move should succeed");
        assert_eq!(moved.parent_id, Some(archive.id));

        assert!(engine.get_children(docs.id).is_empty());
        assert_eq!(names(&engine.get_children(archive.id)), vec!["Legal"]);
        assert_eq!(
            names(&engine.get_path(contract.id)),
            vec!["Archive", "Legal", "contract.pdf"]
        );
        let docs_after = engine.get_node(docs.id).expect("docs exists");
        let archive_after = engine.get_node(archive.id).expect("archive exists");
        assert_eq!(docs_after.updated_at, moved.updated_at);
        assert_eq!(archive_after.updated_at, moved.updated_at);
        assert_valid(&engine);
    }

    #[test]
    fn move_into_self_or_descendant_is_a_cycle() {
        let mut engine = engine();
        let a = folder(&mut engine, "A", None);
        let b = folder(&mut engine, "B", Some(a.id));
        let c = folder(&mut engine, "C", Some(b.id));
        let before = engine.graph().clone();

        for target in [a.id, b.id, c.id] {
            let err = engine
                .move_node(MoveNodePayload {
                    node_id: a.id,
                    new_parent_id: Some(target),
                })
                .expect_err("cycle should be rejected");
            assert_eq!(err.kind, ErrorKind::Cycle);
            assert_eq!(err.public, "Cannot move a folder into itself or its descendants");
        }
        assert_eq!(engine.graph(), &before);
    }

    #[test]
    fn move_auto_renames_on_collision_and_to_root() {
        let mut engine = engine();
        let inbox = folder(&mut engine, "Inbox", None);
        file(&mut engine, "Report.pdf", None);
        let nested = file(&mut engine, "Report.pdf", Some(inbox.id));

        let moved = engine
            .move_node(MoveNodePayload {
                node_id: nested.id,
                new_parent_id: None,
            })
            .expect("move to root should succeed");
        assert_eq!(moved.name, "Report (1).pdf");
        assert!(engine.graph().root_ids.contains(&nested.id));
        assert_valid(&engine);
    }

    #[test]
    fn move_within_same_parent_keeps_name() {
        let mut engine = engine();
        let docs = folder(&mut engine, "Docs", None);
        let a = file(&mut engine, "a.pdf", Some(docs.id));
        file(&mut engine, "b.pdf", Some(docs.id));

        let moved = engine
            .move_node(MoveNodePayload {
                node_id: a.id,
                new_parent_id: Some(docs.id),
            })
            .expect("move should succeed");
        assert_eq!(moved.name, "a.pdf");
        assert_eq!(names(&engine.get_children(docs.id)), vec!["b.pdf", "a.pdf"]);
        assert_valid(&engine);
    }

    #[test]
    fn move_validates_node_and_target() {
        let mut engine = engine();
        let doc = file(&mut engine, "a.pdf", None);
        let other = file(&mut engine, "b.pdf", None);

        let err = engine
            .move_node(MoveNodePayload {
                node_id: NodeId(uuid::Uuid::from_u128(500)),
                new_parent_id: None,
            })
            .expect_err("unknown node");
        assert_eq!(err.kind, ErrorKind::NotFound);

        let err = engine
            .move_node(MoveNodePayload {
                node_id: doc.id,
                new_parent_id: Some(other.id),
            })
            .expect_err("file target");
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[test]
    fn get_path_stops_at_broken_link() {
        let mut engine = engine();
        let a = folder(&mut engine, "A", None);
        let b = folder(&mut engine, "B", Some(a.id));
        let c = file(&mut engine, "c.pdf", Some(b.id));

        let mut graph = engine.into_graph();
        graph.nodes.remove(&a.id);
        let engine = GraphEngine::new(graph);
        assert_eq!(names(&engine.get_path(c.id)), vec!["B", "c.pdf"]);
        assert!(engine.get_path(a.id).is_empty());
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let mut engine = engine();
        let docs = folder(&mut engine, "Docs", None);
        file(&mut engine, "Annual REPORT.pdf", Some(docs.id));
        file(&mut engine, "report-draft.pdf", None);
        file(&mut engine, "notes.txt", None);

        let mut found = names(&engine.search_nodes("report"));
        found.sort();
        assert_eq!(found, vec!["Annual REPORT.pdf", "report-draft.pdf"]);
        assert!(engine.search_nodes("missing").is_empty());
    }

    #[test]
    fn extract_then_insert_restores_shape() {
        let mut engine = engine();
        let root = folder(&mut engine, "Root", None);
        let sub = folder(&mut engine, "Sub", Some(root.id));
        file(&mut engine, "a.pdf", Some(sub.id));
        file(&mut engine, "b.pdf", Some(root.id));
        let total = engine.graph().node_count();

        let extracted = engine
            .extract_node_subtree(root.id)
            .expect("extract should succeed");
        assert_eq!(extracted.node_count(), 4);
        assert!(engine.graph().is_empty());
        assert!(engine.graph().root_ids.is_empty());

        let inserted = engine
            .insert_node_subtree(extracted, None)
            .expect("insert should succeed");
        assert_eq!(inserted.name, "Root");
        assert_eq!(engine.graph().node_count(), total);
        assert_eq!(names(&engine.get_children(root.id)), vec!["Sub", "b.pdf"]);
        assert_eq!(names(&engine.get_children(sub.id)), vec!["a.pdf"]);
        assert_valid(&engine);
    }

    #[test]
    fn extract_drops_dangling_children() {
        let mut engine = engine();
        let root = folder(&mut engine, "Root", None);
        let child = file(&mut engine, "a.pdf", Some(root.id));
        let mut graph = engine.into_graph();
        let ghost = NodeId(uuid::Uuid::from_u128(777));
        graph
            .nodes
            .get_mut(&root.id)
            .and_then(Node::children_ids_mut)
            .expect("root is a folder")
            .push(ghost);
        let mut engine = GraphEngine::new(graph);

        let extracted = engine
            .extract_node_subtree(root.id)
            .expect("extract should succeed");
        assert_eq!(extracted.ids(), vec![root.id, child.id]);
        assert_eq!(extracted.root.children_ids(), Some(&[child.id][..]));
    }

    #[test]
    fn insert_subtree_renames_root_and_rejects_bad_targets() {
        let mut source = engine();
        let shared = folder(&mut source, "Shared", None);
        let extracted = source
            .extract_node_subtree(shared.id)
            .expect("extract should succeed");

        let mut target = GraphEngine::new(NormalizedGraph::default());
        let existing = target
            .create_folder(CreateFolderPayload {
                name: "Shared".to_string(),
                parent_id: None,
            })
            .expect("folder should be created");
        let doc = target
            .create_file(CreateFilePayload {
                name: "x.pdf".to_string(),
                parent_id: Some(existing.id),
                content: FileContent::default(),
                mime_type: String::new(),
                metadata: None,
            })
            .expect("file should be created");

        let err = target
            .insert_node_subtree(extracted.clone(), Some(doc.id))
            .expect_err("file target");
        assert_eq!(err.code, "parent_not_folder");

        let inserted = target
            .insert_node_subtree(extracted.clone(), None)
            .expect("insert should succeed");
        assert_eq!(inserted.name, "Shared (1)");

        let err = target
            .insert_node_subtree(extracted, None)
            .expect_err("duplicate ids");
        assert_eq!(err.code, "node_already_exists");
        assert_valid(&target);
    }

    #[test]
    fn restore_reattaches_deleted_node() {
        let mut engine = engine();
        let docs = folder(&mut engine, "Docs", None);
        let doc = file(&mut engine, "a.pdf", Some(docs.id));

        let removed = engine.delete_node(doc.id).expect("delete should succeed");
        let restored = engine
            .restore_node(removed, Some(docs.id))
            .expect("restore should succeed");
        assert_eq!(restored.id, doc.id);
        assert_eq!(restored.created_at, doc.created_at);
        assert_eq!(names(&engine.get_children(docs.id)), vec!["a.pdf"]);
        assert_valid(&engine);
    }

    #[test]
    fn restore_resolves_collisions_and_prunes_lost_children() {
        let mut engine = engine();
        let team = folder(&mut engine, "Team", None);
        file(&mut engine, "plan.pdf", Some(team.id));

        let removed = engine.delete_node(team.id).expect("delete should succeed");
        folder(&mut engine, "Team", None);

        let restored = engine
            .restore_node(removed.clone(), None)
            .expect("restore should succeed");
        assert_eq!(restored.name, "Team (1)");
        assert_eq!(restored.children_ids(), Some(&[][..]));
        assert_valid(&engine);

        let err = engine
            .restore_node(removed, None)
            .expect_err("already present");
        assert_eq!(err.kind, ErrorKind::Conflict);
    }
}
