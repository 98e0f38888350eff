use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

use crate::models::{OwnerId, RoomId};

type LockTable<K> = Mutex<HashMap<K, Arc<tokio::sync::Mutex<()>>>>;

/// One async mutex per room and one per owner. Holding a room's guard
/// serializes every load-mutate-persist cycle against that room; holding an
/// owner's guard serializes changes to that owner's set of room names.
///
/// When both are needed the room lock is taken before the owner lock.
#[derive(Default)]
pub struct RoomLocks {
    locks: LockTable<RoomId>,
    owners: LockTable<OwnerId>,
}

/// Held locks; dropping it releases them.
pub struct RoomGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

fn handle<K: Hash + Eq>(table: &LockTable<K>, key: K) -> Arc<tokio::sync::Mutex<()>> {
    let mut locks = table.lock().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(locks.entry(key).or_default())
}

impl RoomLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, room_id: RoomId) -> Arc<tokio::sync::Mutex<()>> {
        handle(&self.locks, room_id)
    }

    /// Serializes room creation and renaming for one owner.
    pub async fn lock_owner(&self, owner_id: OwnerId) -> RoomGuard {
        let guard = handle(&self.owners, owner_id).lock_owned().await;
        RoomGuard {
            _guards: vec![guard],
        }
    }

    pub async fn lock(&self, room_id: RoomId) -> RoomGuard {
        let guard = self.handle(room_id).lock_owned().await;
        RoomGuard {
            _guards: vec![guard],
        }
    }

    /// Locks two rooms in id order so opposite-direction moves cannot
    /// deadlock. Locking the same room twice takes it once.
    pub async fn lock_pair(&self, a: RoomId, b: RoomId) -> RoomGuard {
        if a == b {
            return self.lock(a).await;
        }
        let (first, second) = if a < b { (a, b) } else { (b, a) };
        let first = self.handle(first).lock_owned().await;
        let second = self.handle(second).lock_owned().await;
        RoomGuard {
            _guards: vec![first, second],
        }
    }

    /// Drops the entry for a deleted room once nobody is waiting on it.
    pub fn forget(&self, room_id: RoomId) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&room_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&room_id);
        }
    }

    pub fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
