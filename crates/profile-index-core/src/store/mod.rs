//! Primary datastore for node records
//!
//! Every mutation is scoped to one node ID. `update` is a compare-and-swap on
//! the stored version so an outcome for an older version can never overwrite
//! a newer one.

pub mod memory;
pub mod sled_store;

pub use memory::InMemoryNodeStore;
pub use sled_store::SledNodeStore;

use async_trait::async_trait;

use crate::contracts::{Node, NodeStatus};
use crate::error::StoreError;

/// Result of a conditional update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The record was replaced
    Applied,
    /// The stored record carries a newer version
    Stale { stored: u64, incoming: u64 },
    /// The stored record is a deletion tombstone
    Terminal,
    /// No record with this ID
    Missing,
}

/// Persistence for node records
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Insert or replace a node unconditionally
    async fn add(&self, node: &Node) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Node>, StoreError>;

    /// Replace a node when `node.version >= stored.version` and the stored
    /// record is not a tombstone
    async fn update(&self, node: &Node) -> Result<UpdateOutcome, StoreError>;

    /// Remove a node; returns whether a record existed
    async fn delete(&self, node: &Node) -> Result<bool, StoreError>;

    /// Mark a node deleted and keep the record; returns the tombstone
    async fn soft_delete(&self, node: &Node, now: i64) -> Result<Option<Node>, StoreError>;

    /// Nodes in `status` whose `last_updated` is before `cutoff`
    async fn find_by_status_older_than(
        &self,
        status: NodeStatus,
        cutoff: i64,
    ) -> Result<Vec<Node>, StoreError>;
}

/// Version and tombstone guard shared by the store implementations
pub(crate) fn check_update(stored: &Node, incoming: &Node) -> Option<UpdateOutcome> {
    if incoming.version < stored.version {
        return Some(UpdateOutcome::Stale {
            stored: stored.version,
            incoming: incoming.version,
        });
    }
    if stored.status == NodeStatus::Deleted {
        return Some(UpdateOutcome::Terminal);
    }
    None
}

pub(crate) fn tombstone(stored: &Node, now: i64) -> Node {
    Node {
        status: NodeStatus::Deleted,
        last_updated: now,
        ..stored.clone()
    }
}
