//! sled-backed node store
//!
//! One tree, keyed by node ID, holding JSON-encoded records. Conditional
//! updates retry `compare_and_swap` until they win or the guard rejects them.

use async_trait::async_trait;
use std::path::Path;

use super::{check_update, tombstone, NodeStore, UpdateOutcome};
use crate::contracts::{Node, NodeStatus};
use crate::error::StoreError;

const NODES_TREE: &str = "nodes";

/// Durable node store
#[derive(Clone)]
pub struct SledNodeStore {
    db: sled::Db,
    nodes: sled::Tree,
}

impl SledNodeStore {
    /// Open (or create) the store under `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path.as_ref())?;
        Self::from_db(db)
    }

    /// Throwaway store that is removed when dropped
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, StoreError> {
        let nodes = db.open_tree(NODES_TREE)?;
        Ok(Self { db, nodes })
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    fn decode(bytes: &[u8]) -> Result<Node, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Swap the stored record for `f(stored)` until no writer races us
    fn swap_with<F>(&self, id: &str, mut f: F) -> Result<Option<Node>, StoreError>
    where
        F: FnMut(&Node) -> Option<Node>,
    {
        loop {
            let Some(current) = self.nodes.get(id.as_bytes())? else {
                return Ok(None);
            };
            let stored = Self::decode(&current)?;
            let Some(next) = f(&stored) else {
                return Ok(Some(stored));
            };
            let encoded = serde_json::to_vec(&next)?;
            match self
                .nodes
                .compare_and_swap(id.as_bytes(), Some(current), Some(encoded))?
            {
                Ok(()) => return Ok(Some(next)),
                Err(_) => continue,
            }
        }
    }
}

#[async_trait]
impl NodeStore for SledNodeStore {
    async fn add(&self, node: &Node) -> Result<(), StoreError> {
        let encoded = serde_json::to_vec(node)?;
        self.nodes.insert(node.id.as_bytes(), encoded)?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Node>, StoreError> {
        self.nodes
            .get(id.as_bytes())?
            .map(|bytes| Self::decode(&bytes))
            .transpose()
    }

    async fn update(&self, node: &Node) -> Result<UpdateOutcome, StoreError> {
        let mut rejected = None;
        let result = self.swap_with(&node.id, |stored| {
            rejected = check_update(stored, node);
            match rejected {
                Some(_) => None,
                None => Some(node.clone()),
            }
        })?;
        Ok(match (result, rejected) {
            (None, _) => UpdateOutcome::Missing,
            (Some(_), Some(outcome)) => outcome,
            (Some(_), None) => UpdateOutcome::Applied,
        })
    }

    async fn delete(&self, node: &Node) -> Result<bool, StoreError> {
        Ok(self.nodes.remove(node.id.as_bytes())?.is_some())
    }

    async fn soft_delete(&self, node: &Node, now: i64) -> Result<Option<Node>, StoreError> {
        self.swap_with(&node.id, |stored| Some(tombstone(stored, now)))
    }

    async fn find_by_status_older_than(
        &self,
        status: NodeStatus,
        cutoff: i64,
    ) -> Result<Vec<Node>, StoreError> {
        let mut found = Vec::new();
        for entry in self.nodes.iter() {
            let (_, value) = entry?;
            let node = Self::decode(&value)?;
            if node.status == status && node.last_updated < cutoff {
                found.push(node);
            }
        }
        found.sort_by(|a, b| a.last_updated.cmp(&b.last_updated));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://example.com/profile.json";

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let node = Node::received(URL, 2, 100);
        {
            let store = SledNodeStore::open(dir.path()).unwrap();
            store.add(&node).await.unwrap();
            store.flush().unwrap();
        }
        let store = SledNodeStore::open(dir.path()).unwrap();
        assert_eq!(store.get(&node.id).await.unwrap(), Some(node));
    }

    #[tokio::test]
    async fn test_compare_and_swap_update() {
        let store = SledNodeStore::temporary().unwrap();
        store.add(&Node::received(URL, 3, 100)).await.unwrap();

        let stale = Node::received(URL, 2, 200);
        assert_eq!(
            store.update(&stale).await.unwrap(),
            UpdateOutcome::Stale {
                stored: 3,
                incoming: 2
            }
        );

        let mut newer = Node::received(URL, 4, 200);
        newer.status = NodeStatus::Validated;
        newer.profile_hash = "abc".into();
        assert_eq!(store.update(&newer).await.unwrap(), UpdateOutcome::Applied);
        let stored = store.get(&newer.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 4);
        assert_eq!(stored.status, NodeStatus::Validated);
    }

    #[tokio::test]
    async fn test_soft_delete_keeps_tombstone() {
        let store = SledNodeStore::temporary().unwrap();
        let node = Node::received(URL, 1, 100);
        store.add(&node).await.unwrap();

        let tomb = store.soft_delete(&node, 300).await.unwrap().unwrap();
        assert_eq!(tomb.status, NodeStatus::Deleted);

        let deleted = store
            .find_by_status_older_than(NodeStatus::Deleted, 301)
            .await
            .unwrap();
        assert_eq!(deleted.len(), 1);
        assert_eq!(store.update(&node).await.unwrap(), UpdateOutcome::Terminal);

        assert!(store.delete(&node).await.unwrap());
        assert!(store.get(&node.id).await.unwrap().is_none());
    }
}
