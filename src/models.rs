use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LibError, Result};

pub const PDF_MIME_TYPE: &str = "application/pdf";

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
        )]
        pub struct $name(pub Uuid);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Uuid::from_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }
    };
}

uuid_id!(RoomId);
uuid_id!(NodeId);
uuid_id!(OwnerId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Folder,
    File,
}

impl NodeType {
    pub const fn as_str(self) -> &'static str {
        match self {
            NodeType::Folder => "folder",
            NodeType::File => "file",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque file body. The graph never looks inside it.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileContent(Vec<u8>);

impl FileContent {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn len(&self) -> u64 {
        self.0.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for FileContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileContent({} bytes)", self.0.len())
    }
}

impl From<Vec<u8>> for FileContent {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl From<&[u8]> for FileContent {
    fn from(value: &[u8]) -> Self {
        Self(value.to_vec())
    }
}

/// Document properties filled in by a metadata extractor when a file is created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub producer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modification_date: Option<DateTime<Utc>>,
}

impl FileMetadata {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderData {
    pub children_ids: Vec<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileData {
    pub size: u64,
    pub mime_type: String,
    pub content: FileContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<FileMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeKind {
    Folder(FolderData),
    File(FileData),
}

/// A folder or file entry. Parent and child links are ids into the owning
/// [`NormalizedGraph`], never references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub parent_id: Option<NodeId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: NodeKind,
}

impl Node {
    pub fn node_type(&self) -> NodeType {
        match self.kind {
            NodeKind::Folder(_) => NodeType::Folder,
            NodeKind::File(_) => NodeType::File,
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self.kind, NodeKind::Folder(_))
    }

    pub fn children_ids(&self) -> Option<&[NodeId]> {
        match &self.kind {
            NodeKind::Folder(folder) => Some(&folder.children_ids),
            NodeKind::File(_) => None,
        }
    }

    pub fn children_ids_mut(&mut self) -> Option<&mut Vec<NodeId>> {
        match &mut self.kind {
            NodeKind::Folder(folder) => Some(&mut folder.children_ids),
            NodeKind::File(_) => None,
        }
    }

    pub fn file(&self) -> Option<&FileData> {
        match &self.kind {
            NodeKind::File(file) => Some(file),
            NodeKind::Folder(_) => None,
        }
    }

    /// Byte size of a file; folders report zero.
    pub fn size(&self) -> u64 {
        self.file().map_or(0, |file| file.size)
    }
}

/// Flat id -> node map plus the ordered list of top-level ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedGraph {
    pub nodes: BTreeMap<NodeId, Node>,
    pub root_ids: Vec<NodeId>,
}

impl NormalizedGraph {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Persisted container record: one room, one owner, one graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataRoom {
    pub id: RoomId,
    pub name: String,
    pub owner_id: OwnerId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub graph: NormalizedGraph,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: RoomId,
    pub name: String,
    pub owner_id: OwnerId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub node_count: usize,
}

impl From<&DataRoom> for RoomSummary {
    fn from(value: &DataRoom) -> Self {
        Self {
            id: value.id,
            name: value.name.clone(),
            owner_id: value.owner_id,
            created_at: value.created_at,
            updated_at: value.updated_at,
            node_count: value.graph.node_count(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomPayload {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameRoomPayload {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFolderPayload {
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<NodeId>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFilePayload {
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<NodeId>,
    pub content: FileContent,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub metadata: Option<FileMetadata>,
}

impl CreateFilePayload {
    /// Declared MIME type, falling back to PDF when the caller sent none.
    pub fn effective_mime_type(&self) -> &str {
        let mime_type = self.mime_type.trim();
        if mime_type.is_empty() {
            PDF_MIME_TYPE
        } else {
            mime_type
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNodePayload {
    pub id: NodeId,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveNodePayload {
    pub node_id: NodeId,
    #[serde(default)]
    pub new_parent_id: Option<NodeId>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveNodeBetweenRoomsPayload {
    pub node_id: NodeId,
    pub source_room_id: RoomId,
    pub target_room_id: RoomId,
    #[serde(default)]
    pub target_parent_id: Option<NodeId>,
}

/// Trims `raw` and rejects names that are empty afterwards.
pub(crate) fn normalize_name(raw: &str, public: &'static str) -> Result<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(LibError::validation(
            public,
            anyhow!("name {:?} is empty after trimming", raw),
        ));
    }
    Ok(name.to_string())
}
