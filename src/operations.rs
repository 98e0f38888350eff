use std::collections::HashSet;
use std::sync::Arc;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::algorithms::{SortDirection, SortField, sort_nodes, unique_plain_name};
use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfig;
use crate::engine::GraphEngine;
use crate::error::{LibError, Result};
use crate::ids::{IdGenerator, UuidIdGenerator};
use crate::invariants::ensure_graph_invariants;
use crate::locks::RoomLocks;
use crate::metadata::{MetadataExtractor, NoMetadata};
use crate::models::{
    CreateFilePayload, CreateFolderPayload, CreateRoomPayload, DataRoom, MoveNodeBetweenRoomsPayload,
    MoveNodePayload, Node, NodeId, NormalizedGraph, OwnerId, PDF_MIME_TYPE, RenameRoomPayload,
    RoomId, UpdateNodePayload, normalize_name,
};
use crate::store::RecordStore;

/// Every room-store action as one serializable command, for callers that
/// drive the store through tool calls or a single RPC endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum RoomOperation {
    CreateRoom {
        owner_id: OwnerId,
        payload: CreateRoomPayload,
    },
    GetRoom {
        room_id: RoomId,
    },
    ListRooms {
        owner_id: OwnerId,
    },
    RenameRoom {
        room_id: RoomId,
        payload: RenameRoomPayload,
    },
    DeleteRoom {
        room_id: RoomId,
    },
    CreateFolder {
        room_id: RoomId,
        payload: CreateFolderPayload,
    },
    CreateFile {
        room_id: RoomId,
        payload: CreateFilePayload,
    },
    CreateFiles {
        room_id: RoomId,
        payloads: Vec<CreateFilePayload>,
    },
    UpdateNode {
        room_id: RoomId,
        payload: UpdateNodePayload,
    },
    DeleteNode {
        room_id: RoomId,
        node_id: NodeId,
    },
    DeleteNodes {
        room_id: RoomId,
        node_ids: Vec<NodeId>,
    },
    MoveNode {
        room_id: RoomId,
        payload: MoveNodePayload,
    },
    MoveNodeBetweenRooms {
        payload: MoveNodeBetweenRoomsPayload,
    },
    RestoreNode {
        room_id: RoomId,
        node: Node,
        #[serde(default)]
        parent_id: Option<NodeId>,
    },
    GetNode {
        room_id: RoomId,
        node_id: NodeId,
    },
    GetChildren {
        room_id: RoomId,
        #[serde(default)]
        parent_id: Option<NodeId>,
        #[serde(default)]
        sort: Option<SortField>,
        #[serde(default)]
        direction: SortDirection,
    },
    GetPath {
        room_id: RoomId,
        node_id: NodeId,
    },
    SearchNodes {
        room_id: RoomId,
        query: String,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RoomOperationResult {
    Room { room: DataRoom },
    Rooms { rooms: Vec<DataRoom> },
    Node { node: Node },
    Lookup { node: Option<Node> },
    Nodes { nodes: Vec<Node> },
    Deleted,
}

/// Durable entry point for all room and node operations.
///
/// Each mutation runs as load, mutate, persist on one record while holding
/// that room's lock, so operations on the same room are applied one at a
/// time and a failed operation never writes.
#[derive(Clone)]
pub struct RoomStore {
    records: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    extractor: Arc<dyn MetadataExtractor>,
    locks: Arc<RoomLocks>,
    config: StoreConfig,
}

impl RoomStore {
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self {
            records,
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidIdGenerator),
            extractor: Arc::new(NoMetadata),
            locks: Arc::new(RoomLocks::new()),
            config: StoreConfig::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn MetadataExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn records(&self) -> Arc<dyn RecordStore> {
        Arc::clone(&self.records)
    }

    pub async fn execute(&self, operation: RoomOperation) -> Result<RoomOperationResult> {
        match operation {
            RoomOperation::CreateRoom { owner_id, payload } => {
                let room = self.create_room(owner_id, payload).await?;
                Ok(RoomOperationResult::Room { room })
            }
            RoomOperation::GetRoom { room_id } => {
                let room = self.get_room(room_id).await?;
                Ok(RoomOperationResult::Room { room })
            }
            RoomOperation::ListRooms { owner_id } => {
                let rooms = self.list_rooms(owner_id).await?;
                Ok(RoomOperationResult::Rooms { rooms })
            }
            RoomOperation::RenameRoom { room_id, payload } => {
                let room = self.rename_room(room_id, payload).await?;
                Ok(RoomOperationResult::Room { room })
            }
            RoomOperation::DeleteRoom { room_id } => {
                self.delete_room(room_id).await?;
                Ok(RoomOperationResult::Deleted)
            }
            RoomOperation::CreateFolder { room_id, payload } => {
                let node = self.create_folder(room_id, payload).await?;
                Ok(RoomOperationResult::Node { node })
            }
            RoomOperation::CreateFile { room_id, payload } => {
                let node = self.create_file(room_id, payload).await?;
                Ok(RoomOperationResult::Node { node })
            }
            RoomOperation::CreateFiles { room_id, payloads } => {
                let nodes = self.create_files(room_id, payloads).await?;
                Ok(RoomOperationResult::Nodes { nodes })
            }
            RoomOperation::UpdateNode { room_id, payload } => {
                let node = self.update_node(room_id, payload).await?;
                Ok(RoomOperationResult::Node { node })
            }
            RoomOperation::DeleteNode { room_id, node_id } => {
                let node = self.delete_node(room_id, node_id).await?;
                Ok(RoomOperationResult::Node { node })
            }
            RoomOperation::DeleteNodes { room_id, node_ids } => {
                let nodes = self.delete_nodes(room_id, node_ids).await?;
                Ok(RoomOperationResult::Nodes { nodes })
            }
            RoomOperation::MoveNode { room_id, payload } => {
                let node = self.move_node(room_id, payload).await?;
                Ok(RoomOperationResult::Node { node })
            }
            RoomOperation::MoveNodeBetweenRooms { payload } => {
                let node = self.move_node_between_rooms(payload).await?;
                Ok(RoomOperationResult::Node { node })
            }
            RoomOperation::RestoreNode {
                room_id,
                node,
                parent_id,
            } => {
                let node = self.restore_node(room_id, node, parent_id).await?;
                Ok(RoomOperationResult::Node { node })
            }
            RoomOperation::GetNode { room_id, node_id } => {
                let node = self.get_node(room_id, node_id).await?;
                Ok(RoomOperationResult::Lookup { node })
            }
            RoomOperation::GetChildren {
                room_id,
                parent_id,
                sort,
                direction,
            } => {
                let mut nodes = self.get_children(room_id, parent_id).await?;
                if let Some(field) = sort {
                    sort_nodes(&mut nodes, field, direction);
                }
                Ok(RoomOperationResult::Nodes { nodes })
            }
            RoomOperation::GetPath { room_id, node_id } => {
                let nodes = self.get_path(room_id, node_id).await?;
                Ok(RoomOperationResult::Nodes { nodes })
            }
            RoomOperation::SearchNodes { room_id, query } => {
                let nodes = self.search_nodes(room_id, &query).await?;
                Ok(RoomOperationResult::Nodes { nodes })
            }
        }
    }

    /// Creates an empty room. A name already used by one of the owner's
    /// rooms is resolved to `"Name (1)"`, `"Name (2)"`, ...
    ///
    /// The owner's lock is held from reading the existing names until the
    /// new record is written.
    pub async fn create_room(&self, owner_id: OwnerId, payload: CreateRoomPayload) -> Result<DataRoom> {
        let name = normalize_name(&payload.name, "Room name cannot be empty")?;
        let _owner_guard = self.locks.lock_owner(owner_id).await;
        let existing = self.records.list_by_owner(owner_id).await?;
        let taken: HashSet<&str> = existing.iter().map(|room| room.name.as_str()).collect();
        let name = unique_plain_name(&name, &taken);

        let now = self.clock.now();
        let room = DataRoom {
            id: self.ids.room_id(),
            name,
            owner_id,
            created_at: now,
            updated_at: now,
            graph: NormalizedGraph::default(),
        };
        let result = self.records.put(&room).await;
        log_outcome("create_room", room.id, &result);
        result.map(|()| room)
    }

    pub async fn get_room(&self, room_id: RoomId) -> Result<DataRoom> {
        self.load(room_id).await
    }

    /// Rooms owned by `owner_id`, oldest first.
    pub async fn list_rooms(&self, owner_id: OwnerId) -> Result<Vec<DataRoom>> {
        self.records.list_by_owner(owner_id).await
    }

    /// Renames a room. Unlike [`Self::create_room`], a clash with another of
    /// the owner's rooms is an error.
    pub async fn rename_room(&self, room_id: RoomId, payload: RenameRoomPayload) -> Result<DataRoom> {
        let result: Result<DataRoom> = async {
            let _guard = self.locks.lock(room_id).await;
            let mut room = self.load(room_id).await?;
            let name = normalize_name(&payload.name, "Room name cannot be empty")?;

            let _owner_guard = self.locks.lock_owner(room.owner_id).await;
            let siblings = self.records.list_by_owner(room.owner_id).await?;
            if siblings
                .iter()
                .any(|other| other.id != room_id && other.name == name)
            {
                return Err(LibError::conflict(
                    "A data room with this name already exists",
                    anyhow!("owner {} already has a room named {:?}", room.owner_id, name),
                ));
            }

            room.name = name;
            room.updated_at = self.clock.now();
            self.records.put(&room).await?;
            Ok(room)
        }
        .await;
        log_outcome("rename_room", room_id, &result);
        result
    }

    pub async fn delete_room(&self, room_id: RoomId) -> Result<()> {
        let result: Result<()> = async {
            let _guard = self.locks.lock(room_id).await;
            if self.records.delete(room_id).await? {
                Ok(())
            } else {
                Err(LibError::room_not_found(room_id))
            }
        }
        .await;
        self.locks.forget(room_id);
        log_outcome("delete_room", room_id, &result);
        result
    }

    pub async fn create_folder(&self, room_id: RoomId, payload: CreateFolderPayload) -> Result<Node> {
        self.with_room("create_folder", room_id, move |engine| {
            engine.create_folder(payload)
        })
        .await
    }

    /// Creates a file, attaching extracted metadata for PDF content when the
    /// caller did not supply any.
    pub async fn create_file(&self, room_id: RoomId, payload: CreateFilePayload) -> Result<Node> {
        let payload = self.prepare_file(payload).await;
        self.with_room("create_file", room_id, move |engine| engine.create_file(payload))
            .await
    }

    /// Creates several files in one write. Each name is resolved against the
    /// siblings created earlier in the same batch; any failure discards the
    /// whole batch.
    pub async fn create_files(
        &self,
        room_id: RoomId,
        payloads: Vec<CreateFilePayload>,
    ) -> Result<Vec<Node>> {
        let mut prepared = Vec::with_capacity(payloads.len());
        for payload in payloads {
            prepared.push(self.prepare_file(payload).await);
        }
        self.with_room("create_files", room_id, move |engine| {
            prepared
                .into_iter()
                .map(|payload| engine.create_file(payload))
                .collect()
        })
        .await
    }

    pub async fn update_node(&self, room_id: RoomId, payload: UpdateNodePayload) -> Result<Node> {
        self.with_room("update_node", room_id, move |engine| engine.update_node(payload))
            .await
    }

    /// Deletes a node and its descendants, returning the removed node value
    /// for a later [`Self::restore_node`].
    pub async fn delete_node(&self, room_id: RoomId, node_id: NodeId) -> Result<Node> {
        self.with_room("delete_node", room_id, move |engine| {
            engine.delete_node(node_id)
        })
        .await
    }

    /// Deletes several nodes in one write. Every id must exist up front; ids
    /// already removed as descendants of an earlier entry are skipped.
    pub async fn delete_nodes(&self, room_id: RoomId, node_ids: Vec<NodeId>) -> Result<Vec<Node>> {
        self.with_room("delete_nodes", room_id, move |engine| {
            if let Some(missing) = node_ids.iter().find(|id| engine.get_node(**id).is_none()) {
                return Err(LibError::node_not_found(missing));
            }
            let mut removed = Vec::with_capacity(node_ids.len());
            for node_id in node_ids {
                if engine.get_node(node_id).is_some() {
                    removed.push(engine.delete_node(node_id)?);
                }
            }
            Ok(removed)
        })
        .await
    }

    pub async fn move_node(&self, room_id: RoomId, payload: MoveNodePayload) -> Result<Node> {
        self.with_room("move_node", room_id, move |engine| engine.move_node(payload))
            .await
    }

    pub async fn restore_node(
        &self,
        room_id: RoomId,
        node: Node,
        parent_id: Option<NodeId>,
    ) -> Result<Node> {
        self.with_room("restore_node", room_id, move |engine| {
            engine.restore_node(node, parent_id)
        })
        .await
    }

    /// Moves a node and its subtree into another room of the same owner. A
    /// target room owned by someone else is reported as not found.
    ///
    /// Both rooms stay locked for the whole call. The target record is
    /// written first and the source second. If the source write fails the
    /// target is put back to its earlier state before the error is
    /// returned. A crash between the two writes leaves the subtree in both
    /// rooms; it is never lost.
    pub async fn move_node_between_rooms(&self, payload: MoveNodeBetweenRoomsPayload) -> Result<Node> {
        if payload.source_room_id == payload.target_room_id {
            return self
                .move_node(
                    payload.source_room_id,
                    MoveNodePayload {
                        node_id: payload.node_id,
                        new_parent_id: payload.target_parent_id,
                    },
                )
                .await;
        }

        let result = self.transfer_subtree(&payload).await;
        log_outcome("move_node_between_rooms", payload.source_room_id, &result);
        if let Ok(node) = &result {
            tracing::info!(
                node_id = %node.id,
                source_room_id = %payload.source_room_id,
                target_room_id = %payload.target_room_id,
                "moved subtree between rooms"
            );
        }
        result
    }

    pub async fn get_node(&self, room_id: RoomId, node_id: NodeId) -> Result<Option<Node>> {
        let node = self
            .read_room(room_id, |engine| engine.get_node(node_id).cloned())
            .await?;
        Ok(node.flatten())
    }

    /// Like [`Self::get_node`], but a missing room or node is an error.
    pub async fn fetch_node(&self, room_id: RoomId, node_id: NodeId) -> Result<Node> {
        let room = self.load(room_id).await?;
        room.graph
            .nodes
            .get(&node_id)
            .cloned()
            .ok_or_else(|| LibError::node_not_found(node_id))
    }

    /// Children of `parent_id`, or the top-level nodes when it is `None`.
    pub async fn get_children(&self, room_id: RoomId, parent_id: Option<NodeId>) -> Result<Vec<Node>> {
        let nodes = self
            .read_room(room_id, |engine| match parent_id {
                Some(parent_id) => cloned(engine.get_children(parent_id)),
                None => cloned(engine.get_root_nodes()),
            })
            .await?;
        Ok(nodes.unwrap_or_default())
    }

    pub async fn get_root_nodes(&self, room_id: RoomId) -> Result<Vec<Node>> {
        self.get_children(room_id, None).await
    }

    pub async fn get_path(&self, room_id: RoomId, node_id: NodeId) -> Result<Vec<Node>> {
        let nodes = self
            .read_room(room_id, |engine| cloned(engine.get_path(node_id)))
            .await?;
        Ok(nodes.unwrap_or_default())
    }

    pub async fn search_nodes(&self, room_id: RoomId, query: &str) -> Result<Vec<Node>> {
        let nodes = self
            .read_room(room_id, |engine| cloned(engine.search_nodes(query)))
            .await?;
        Ok(nodes.unwrap_or_default())
    }

    async fn transfer_subtree(&self, payload: &MoveNodeBetweenRoomsPayload) -> Result<Node> {
        let _guard = self
            .locks
            .lock_pair(payload.source_room_id, payload.target_room_id)
            .await;
        let mut source = self.load(payload.source_room_id).await?;
        let mut target = self.load(payload.target_room_id).await?;
        if source.owner_id != target.owner_id {
            tracing::debug!(
                source_room_id = %source.id,
                target_room_id = %target.id,
                "cross-room move rejected: rooms belong to different owners"
            );
            return Err(LibError::room_not_found(target.id));
        }
        let target_snapshot = target.clone();

        let mut source_engine = self.engine(std::mem::take(&mut source.graph));
        let subtree = source_engine.extract_node_subtree(payload.node_id)?;
        let mut target_engine = self.engine(std::mem::take(&mut target.graph));
        let inserted = target_engine.insert_node_subtree(subtree, payload.target_parent_id)?;

        source.graph = source_engine.into_graph();
        target.graph = target_engine.into_graph();
        let now = self.clock.now();
        source.updated_at = now;
        target.updated_at = now;
        self.verify(&source)?;
        self.verify(&target)?;

        self.records.put(&target).await?;
        if let Err(err) = self.records.put(&source).await {
            tracing::error!(
                source_room_id = %source.id,
                target_room_id = %target.id,
                error = %err.source,
                "source write failed after target write; restoring target"
            );
            if let Err(restore_err) = self.records.put(&target_snapshot).await {
                tracing::error!(
                    target_room_id = %target.id,
                    error = %restore_err.source,
                    "failed to restore target room; subtree is present in both rooms"
                );
            }
            return Err(err);
        }
        Ok(inserted)
    }

    async fn with_room<T, F>(&self, operation: &'static str, room_id: RoomId, op: F) -> Result<T>
    where
        F: FnOnce(&mut GraphEngine) -> Result<T> + Send,
        T: Send,
    {
        let result = self.apply(room_id, op).await;
        log_outcome(operation, room_id, &result);
        result
    }

    async fn apply<T, F>(&self, room_id: RoomId, op: F) -> Result<T>
    where
        F: FnOnce(&mut GraphEngine) -> Result<T> + Send,
        T: Send,
    {
        let _guard = self.locks.lock(room_id).await;
        let mut room = self.load(room_id).await?;
        let mut engine = self.engine(std::mem::take(&mut room.graph));
        let value = op(&mut engine)?;

        room.graph = engine.into_graph();
        room.updated_at = self.clock.now();
        self.verify(&room)?;
        self.records.put(&room).await?;
        Ok(value)
    }

    async fn read_room<T, F>(&self, room_id: RoomId, read: F) -> Result<Option<T>>
    where
        F: FnOnce(&GraphEngine) -> T + Send,
    {
        let Some(room) = self.records.get(room_id).await? else {
            return Ok(None);
        };
        Ok(Some(read(&self.engine(room.graph))))
    }

    async fn load(&self, room_id: RoomId) -> Result<DataRoom> {
        self.records
            .get(room_id)
            .await?
            .ok_or_else(|| LibError::room_not_found(room_id))
    }

    async fn prepare_file(&self, mut payload: CreateFilePayload) -> CreateFilePayload {
        if payload.metadata.is_none() && payload.effective_mime_type() == PDF_MIME_TYPE {
            let metadata = self.extractor.extract(&payload.content).await;
            if !metadata.is_empty() {
                payload.metadata = Some(metadata);
            }
        }
        payload
    }

    fn engine(&self, graph: NormalizedGraph) -> GraphEngine {
        GraphEngine::with_env(graph, Arc::clone(&self.clock), Arc::clone(&self.ids))
    }

    fn verify(&self, room: &DataRoom) -> Result<()> {
        if self.config.verify_invariants {
            ensure_graph_invariants(&room.graph)?;
        }
        Ok(())
    }
}

fn cloned(nodes: Vec<&Node>) -> Vec<Node> {
    nodes.into_iter().cloned().collect()
}

fn log_outcome<T>(operation: &'static str, room_id: RoomId, result: &Result<T>) {
    match result {
        Ok(_) => tracing::info!(room_id = %room_id, operation, "room operation applied"),
        Err(err) => tracing::error!(
            room_id = %room_id,
            operation,
            kind = ?err.kind,
            code = err.code,
            error = %err.source,
            "room operation failed"
        ),
    }
}
