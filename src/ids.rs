use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

use crate::models::{NodeId, RoomId};

/// Supplies fresh identifiers. Implementations must never repeat an id;
/// the engine does not check for reuse.
pub trait IdGenerator: Send + Sync {
    fn next_uuid(&self) -> Uuid;

    fn node_id(&self) -> NodeId {
        NodeId(self.next_uuid())
    }

    fn room_id(&self) -> RoomId {
        RoomId(self.next_uuid())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn next_uuid(&self) -> Uuid {
        Uuid::new_v4()
    }
}

/// Counts up from a seed; ids are `Uuid::from_u128(n)`. Used by tests and
/// benchmarks that need reproducible graphs.
#[derive(Debug)]
pub struct SequentialIdGenerator {
    next: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }
}

impl Default for SequentialIdGenerator {
    fn default() -> Self {
        Self::new(1)
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_uuid(&self) -> Uuid {
        let value = self.next.fetch_add(1, Ordering::Relaxed);
        Uuid::from_u128(value as u128)
    }
}
