use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use subseq_dataroom::config::StoreConfig;
use subseq_dataroom::error::{ErrorKind, Result};
use subseq_dataroom::models::{
    CreateFilePayload, CreateFolderPayload, CreateRoomPayload, DataRoom, FileContent,
    MoveNodePayload, Node, NodeId, OwnerId, RenameRoomPayload, RoomId, UpdateNodePayload,
};
use subseq_dataroom::operations::RoomStore;
use subseq_dataroom::store::{MemoryRecordStore, RecordStore};

fn memory_store() -> RoomStore {
    let records: Arc<dyn RecordStore> = Arc::new(MemoryRecordStore::new());
    RoomStore::new(records).with_config(checked())
}

fn checked() -> StoreConfig {
    StoreConfig {
        verify_invariants: true,
        ..StoreConfig::default()
    }
}

#[cfg(feature = "sqlx")]
async fn sqlite_store() -> RoomStore {
    let records = subseq_dataroom::db::SqliteRecordStore::connect(&StoreConfig::default())
        .await
        .expect("in-memory database should open");
    RoomStore::new(Arc::new(records)).with_config(checked())
}

async fn new_room(store: &RoomStore) -> RoomId {
    store
        .create_room(
            OwnerId(Uuid::from_u128(1)),
            CreateRoomPayload {
                name: "Deal".to_string(),
            },
        )
        .await
        .expect("room should be created")
        .id
}

async fn folder(store: &RoomStore, room_id: RoomId, name: &str, parent_id: Option<NodeId>) -> Node {
    store
        .create_folder(
            room_id,
            CreateFolderPayload {
                name: name.to_string(),
                parent_id,
            },
        )
        .await
        .expect("folder should be created")
}

/// Memory store whose owner listing yields before answering, so concurrent
/// callers interleave between reading the names and writing a room.
#[derive(Default)]
struct SlowListing {
    inner: MemoryRecordStore,
}

#[async_trait]
impl RecordStore for SlowListing {
    async fn get(&self, room_id: RoomId) -> Result<Option<DataRoom>> {
        self.inner.get(room_id).await
    }

    async fn list_by_owner(&self, owner_id: OwnerId) -> Result<Vec<DataRoom>> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.inner.list_by_owner(owner_id).await
    }

    async fn put(&self, room: &DataRoom) -> Result<()> {
        self.inner.put(room).await
    }

    async fn delete(&self, room_id: RoomId) -> Result<bool> {
        self.inner.delete(room_id).await
    }
}

async fn create_room(store: &RoomStore, owner_id: OwnerId, name: &str) -> Result<DataRoom> {
    store
        .create_room(
            owner_id,
            CreateRoomPayload {
                name: name.to_string(),
            },
        )
        .await
}

async fn rename_room(store: &RoomStore, room_id: RoomId, name: &str) -> Result<DataRoom> {
    store
        .rename_room(
            room_id,
            RenameRoomPayload {
                name: name.to_string(),
            },
        )
        .await
}

fn names(nodes: &[Node]) -> Vec<&str> {
    nodes.iter().map(|node| node.name.as_str()).collect()
}

async fn archive_scenario(store: RoomStore) {
    let room_id = new_room(&store).await;
    let docs = folder(&store, room_id, "Docs", None).await;
    let legal = folder(&store, room_id, "Legal", Some(docs.id)).await;
    let contract = store
        .create_file(
            room_id,
            CreateFilePayload {
                name: "contract.pdf".to_string(),
                parent_id: Some(legal.id),
                content: FileContent::new(b"%PDF-1.4".to_vec()),
                mime_type: "application/pdf".to_string(),
                metadata: None,
            },
        )
        .await
        .expect("file should be created");
    let archive = folder(&store, room_id, "Archive", None).await;

    store
        .move_node(
            room_id,
            MoveNodePayload {
                node_id: legal.id,
                new_parent_id: Some(archive.id),
            },
        )
        .await
        .expect("move should succeed");

    let docs_children = store
        .get_children(room_id, Some(docs.id))
        .await
        .expect("query should succeed");
    assert!(docs_children.is_empty());
    let archive_children = store
        .get_children(room_id, Some(archive.id))
        .await
        .expect("query should succeed");
    assert_eq!(names(&archive_children), vec!["Legal"]);
    let path = store
        .get_path(room_id, contract.id)
        .await
        .expect("query should succeed");
    assert_eq!(names(&path), vec!["Archive", "Legal", "contract.pdf"]);
}

async fn team_rename_scenario(store: RoomStore) {
    let room_id = new_room(&store).await;
    folder(&store, room_id, "Team", None).await;
    let second = folder(&store, room_id, "Team", None).await;
    assert_eq!(second.name, "Team (1)");

    let err = store
        .update_node(
            room_id,
            UpdateNodePayload {
                id: second.id,
                name: "Team".to_string(),
            },
        )
        .await
        .expect_err("rename should conflict");
    assert_eq!(err.kind, ErrorKind::Conflict);

    let stored = store
        .get_node(room_id, second.id)
        .await
        .expect("query should succeed")
        .expect("node should exist");
    assert_eq!(stored.name, "Team (1)");
}

async fn delete_completeness_scenario(store: RoomStore) {
    let room_id = new_room(&store).await;
    let top = folder(&store, room_id, "Top", None).await;
    let mid = folder(&store, room_id, "Mid", Some(top.id)).await;
    folder(&store, room_id, "Leaf", Some(mid.id)).await;
    let keep = folder(&store, room_id, "Keep", None).await;

    store
        .delete_node(room_id, top.id)
        .await
        .expect("delete should succeed");
    let room = store.get_room(room_id).await.expect("room should exist");
    assert_eq!(room.graph.node_count(), 1);
    assert_eq!(room.graph.root_ids, vec![keep.id]);
}

#[tokio::test]
async fn archive_scenario_in_memory() {
    archive_scenario(memory_store()).await;
}

#[tokio::test]
async fn team_rename_scenario_in_memory() {
    team_rename_scenario(memory_store()).await;
}

#[tokio::test]
async fn delete_completeness_in_memory() {
    delete_completeness_scenario(memory_store()).await;
}

#[cfg(feature = "sqlx")]
#[tokio::test]
async fn archive_scenario_on_sqlite() {
    archive_scenario(sqlite_store().await).await;
}

#[cfg(feature = "sqlx")]
#[tokio::test]
async fn team_rename_scenario_on_sqlite() {
    team_rename_scenario(sqlite_store().await).await;
}

#[cfg(feature = "sqlx")]
#[tokio::test]
async fn delete_completeness_on_sqlite() {
    delete_completeness_scenario(sqlite_store().await).await;
}

#[tokio::test]
async fn concurrent_room_names_stay_unique_per_owner() {
    let records: Arc<dyn RecordStore> = Arc::new(SlowListing::default());
    let store = RoomStore::new(records).with_config(checked());
    let owner = OwnerId(Uuid::from_u128(1));

    let (first, second) = tokio::join!(
        create_room(&store, owner, "Deal"),
        create_room(&store, owner, "Deal")
    );
    let mut created = vec![
        first.expect("room should be created").name,
        second.expect("room should be created").name,
    ];
    created.sort();
    assert_eq!(created, vec!["Deal", "Deal (1)"]);

    let x = create_room(&store, owner, "X").await.expect("room should be created");
    let y = create_room(&store, owner, "Y").await.expect("room should be created");
    let (left, right) = tokio::join!(rename_room(&store, x.id, "Z"), rename_room(&store, y.id, "Z"));
    let conflicts = [left, right]
        .into_iter()
        .filter_map(|result| result.err())
        .map(|err| err.kind)
        .collect::<Vec<_>>();
    assert_eq!(conflicts, vec![ErrorKind::Conflict]);

    let mut names = store
        .list_rooms(owner)
        .await
        .expect("list should succeed")
        .into_iter()
        .map(|room| room.name)
        .collect::<Vec<_>>();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), 4);
    assert!(names.contains(&"Z".to_string()));
}
