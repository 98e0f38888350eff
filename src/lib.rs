pub mod algorithms;
#[cfg(feature = "api")]
pub mod api;
pub mod clock;
pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod engine;
pub mod error;
pub mod ids;
pub mod invariants;
pub mod locks;
pub mod metadata;
pub mod models;
pub mod operations;
pub mod store;

pub mod prelude {
    pub use crate::algorithms::{SortDirection, SortField, sort_nodes, unique_name};
    #[cfg(feature = "api")]
    pub use crate::api::{AppError, RoomApp, routes};
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::config::StoreConfig;
    #[cfg(feature = "sqlx")]
    pub use crate::db::{SqliteRecordStore, create_room_tables};
    pub use crate::engine::{ExtractedSubtree, GraphEngine};
    pub use crate::error::{ErrorKind, LibError, Result};
    pub use crate::ids::{IdGenerator, SequentialIdGenerator, UuidIdGenerator};
    pub use crate::invariants::{GraphInvariantViolation, ensure_graph_invariants};
    #[cfg(feature = "pdf")]
    pub use crate::metadata::LopdfExtractor;
    pub use crate::metadata::{MetadataExtractor, NoMetadata};
    pub use crate::models::{
        CreateFilePayload, CreateFolderPayload, CreateRoomPayload, DataRoom, FileContent,
        FileMetadata, MoveNodeBetweenRoomsPayload, MoveNodePayload, Node, NodeId, NodeKind,
        NodeType, NormalizedGraph, OwnerId, RenameRoomPayload, RoomId, RoomSummary,
        UpdateNodePayload,
    };
    pub use crate::operations::{RoomOperation, RoomOperationResult, RoomStore};
    pub use crate::store::{MemoryRecordStore, RecordStore};
}
