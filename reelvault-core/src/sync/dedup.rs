//! In-flight identity registry. Prevents two syncs for the same external id
//! from running (or queueing) concurrently.

use std::sync::Arc;

use dashmap::DashSet;

use crate::types::EntityKey;

/// Atomic check-and-set over sync identities. Shared between the facade
/// (enqueue side) and the worker pool (release side); cloning shares the
/// underlying set.
///
/// Single-process by design: a duplicate that slips past in a multi-process
/// deployment is wasted work, not a correctness problem, because full syncs
/// are idempotent upserts.
#[derive(Clone, Debug, Default)]
pub struct DedupGate {
    in_flight: Arc<DashSet<EntityKey>>,
}

impl DedupGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `key` in flight. Returns `false` (without side effects) if it
    /// already was.
    pub fn try_acquire(&self, key: EntityKey) -> bool {
        self.in_flight.insert(key)
    }

    /// Clears the marker once a job reaches a terminal outcome.
    pub fn release(&self, key: EntityKey) {
        self.in_flight.remove(&key);
    }

    pub fn contains(&self, key: EntityKey) -> bool {
        self.in_flight.contains(&key)
    }

    /// Number of identities currently in flight (monitoring).
    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }
}
