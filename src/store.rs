use std::collections::{HashMap, HashSet};

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{LibError, Result};
use crate::models::{DataRoom, OwnerId, RoomId};

/// Durable keyed storage for whole room records.
///
/// Implementations only move records in and out; all graph rules live in
/// [`crate::engine::GraphEngine`] and [`crate::operations::RoomStore`].
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, room_id: RoomId) -> Result<Option<DataRoom>>;

    /// Rooms owned by `owner_id`, oldest first.
    async fn list_by_owner(&self, owner_id: OwnerId) -> Result<Vec<DataRoom>>;

    /// Inserts or replaces the record with the same id.
    async fn put(&self, room: &DataRoom) -> Result<()>;

    /// Returns whether a record was removed.
    async fn delete(&self, room_id: RoomId) -> Result<bool>;
}

#[derive(Default)]
struct MemoryState {
    rooms: HashMap<RoomId, DataRoom>,
    failing_writes: HashSet<RoomId>,
}

/// Process-local [`RecordStore`]. Writes for selected rooms can be made to
/// fail, which is how partial-failure paths are exercised in tests.
#[derive(Default)]
pub struct MemoryRecordStore {
    state: RwLock<MemoryState>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later `put` and `delete` of `room_id` fail with a storage
    /// error until [`Self::clear_write_failures`] is called.
    pub async fn fail_writes_for(&self, room_id: RoomId) {
        self.state.write().await.failing_writes.insert(room_id);
    }

    pub async fn clear_write_failures(&self) {
        self.state.write().await.failing_writes.clear();
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.rooms.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.rooms.is_empty()
    }
}

fn injected_failure(room_id: RoomId) -> LibError {
    LibError::storage(
        "Failed to write room record",
        anyhow!("injected write failure for room {}", room_id),
    )
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, room_id: RoomId) -> Result<Option<DataRoom>> {
        Ok(self.state.read().await.rooms.get(&room_id).cloned())
    }

    async fn list_by_owner(&self, owner_id: OwnerId) -> Result<Vec<DataRoom>> {
        let state = self.state.read().await;
        let mut rooms = state
            .rooms
            .values()
            .filter(|room| room.owner_id == owner_id)
            .cloned()
            .collect::<Vec<_>>();
        rooms.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(rooms)
    }

    async fn put(&self, room: &DataRoom) -> Result<()> {
        let mut state = self.state.write().await;
        if state.failing_writes.contains(&room.id) {
            return Err(injected_failure(room.id));
        }
        state.rooms.insert(room.id, room.clone());
        Ok(())
    }

    async fn delete(&self, room_id: RoomId) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.failing_writes.contains(&room_id) {
            return Err(injected_failure(room_id));
        }
        Ok(state.rooms.remove(&room_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::error::ErrorKind;
    use crate::models::NormalizedGraph;

    fn room(id: u128, owner: u128, name: &str, minutes: i64) -> DataRoom {
        let created = Utc
            .with_ymd_and_hms(2026, 2, 1, 12, 0, 0)
            .single()
            .expect("valid timestamp")
            + Duration::minutes(minutes);
        DataRoom {
            id: RoomId(Uuid::from_u128(id)),
            name: name.to_string(),
            owner_id: OwnerId(Uuid::from_u128(owner)),
            created_at: created,
            updated_at: created,
            graph: NormalizedGraph::default(),
        }
    }

    #[tokio::test]
    async fn put_get_and_delete_round_trip() {
        let store = MemoryRecordStore::new();
        let record = room(1, 10, "Deal", 0);
        store.put(&record).await.expect("put should succeed");

        let loaded = store.get(record.id).await.expect("get should succeed");
        assert_eq!(loaded, Some(record.clone()));

        assert!(store.delete(record.id).await.expect("delete should succeed"));
        assert!(!store.delete(record.id).await.expect("delete should succeed"));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn list_by_owner_filters_and_orders_by_creation() {
        let store = MemoryRecordStore::new();
        for record in [
            room(1, 10, "Later", 5),
            room(2, 10, "Earlier", 1),
            room(3, 20, "Other owner", 0),
        ] {
            store.put(&record).await.expect("put should succeed");
        }

        let rooms = store
            .list_by_owner(OwnerId(Uuid::from_u128(10)))
            .await
            .expect("list should succeed");
        let names = rooms.iter().map(|r| r.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["Earlier", "Later"]);
    }

    #[tokio::test]
    async fn injected_failures_block_writes_until_cleared() {
        let store = MemoryRecordStore::new();
        let record = room(1, 10, "Deal", 0);
        store.fail_writes_for(record.id).await;

        let err = store.put(&record).await.expect_err("put should fail");
        assert_eq!(err.kind, ErrorKind::Storage);
        assert_eq!(store.len().await, 0);

        store.clear_write_failures().await;
        store.put(&record).await.expect("put should succeed");
        assert_eq!(store.len().await, 1);
    }
}
