//! In-memory node store

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{check_update, tombstone, NodeStore, UpdateOutcome};
use crate::contracts::{Node, NodeStatus};
use crate::error::StoreError;

/// Node store held in a process-local map
#[derive(Default)]
pub struct InMemoryNodeStore {
    nodes: RwLock<HashMap<String, Node>>,
}

impl InMemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.nodes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.nodes.read().await.is_empty()
    }
}

#[async_trait]
impl NodeStore for InMemoryNodeStore {
    async fn add(&self, node: &Node) -> Result<(), StoreError> {
        self.nodes
            .write()
            .await
            .insert(node.id.clone(), node.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Node>, StoreError> {
        Ok(self.nodes.read().await.get(id).cloned())
    }

    async fn update(&self, node: &Node) -> Result<UpdateOutcome, StoreError> {
        let mut nodes = self.nodes.write().await;
        let Some(stored) = nodes.get(&node.id) else {
            return Ok(UpdateOutcome::Missing);
        };
        if let Some(outcome) = check_update(stored, node) {
            return Ok(outcome);
        }
        nodes.insert(node.id.clone(), node.clone());
        Ok(UpdateOutcome::Applied)
    }

    async fn delete(&self, node: &Node) -> Result<bool, StoreError> {
        Ok(self.nodes.write().await.remove(&node.id).is_some())
    }

    async fn soft_delete(&self, node: &Node, now: i64) -> Result<Option<Node>, StoreError> {
        let mut nodes = self.nodes.write().await;
        let Some(stored) = nodes.get_mut(&node.id) else {
            return Ok(None);
        };
        *stored = tombstone(stored, now);
        Ok(Some(stored.clone()))
    }

    async fn find_by_status_older_than(
        &self,
        status: NodeStatus,
        cutoff: i64,
    ) -> Result<Vec<Node>, StoreError> {
        let mut found: Vec<Node> = self
            .nodes
            .read()
            .await
            .values()
            .filter(|n| n.status == status && n.last_updated < cutoff)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.last_updated.cmp(&b.last_updated));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://example.com/profile.json";

    #[tokio::test]
    async fn test_update_rejects_older_version() {
        let store = InMemoryNodeStore::new();
        store.add(&Node::received(URL, 5, 100)).await.unwrap();

        let mut older = Node::received(URL, 4, 200);
        older.status = NodeStatus::Validated;
        older.profile_hash = "h".into();

        let outcome = store.update(&older).await.unwrap();
        assert_eq!(
            outcome,
            UpdateOutcome::Stale {
                stored: 5,
                incoming: 4
            }
        );
        let stored = store.get(&older.id).await.unwrap().unwrap();
        assert_eq!(stored.status, NodeStatus::Received);
    }

    #[tokio::test]
    async fn test_update_applies_equal_version() {
        let store = InMemoryNodeStore::new();
        store.add(&Node::received(URL, 5, 100)).await.unwrap();

        let mut same = Node::received(URL, 5, 200);
        same.status = NodeStatus::Validated;
        same.profile_hash = "h".into();
        assert_eq!(store.update(&same).await.unwrap(), UpdateOutcome::Applied);
    }

    #[tokio::test]
    async fn test_update_missing_and_tombstone() {
        let store = InMemoryNodeStore::new();
        let node = Node::received(URL, 1, 100);
        assert_eq!(store.update(&node).await.unwrap(), UpdateOutcome::Missing);

        store.add(&node).await.unwrap();
        let tomb = store.soft_delete(&node, 150).await.unwrap().unwrap();
        assert_eq!(tomb.status, NodeStatus::Deleted);
        assert_eq!(tomb.last_updated, 150);
        assert_eq!(store.update(&node).await.unwrap(), UpdateOutcome::Terminal);
    }

    #[tokio::test]
    async fn test_find_by_status_older_than() {
        let store = InMemoryNodeStore::new();
        let mut old = Node::received("https://a.example/p.json", 1, 10);
        old.status = NodeStatus::ValidationFailed;
        old.failure_reasons = vec!["x".into()];
        let mut fresh = Node::received("https://b.example/p.json", 1, 500);
        fresh.status = NodeStatus::ValidationFailed;
        fresh.failure_reasons = vec!["x".into()];
        store.add(&old).await.unwrap();
        store.add(&fresh).await.unwrap();
        store
            .add(&Node::received("https://c.example/p.json", 1, 10))
            .await
            .unwrap();

        let found = store
            .find_by_status_older_than(NodeStatus::ValidationFailed, 100)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].profile_url, "https://a.example/p.json");
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let store = InMemoryNodeStore::new();
        let node = Node::received(URL, 1, 100);
        store.add(&node).await.unwrap();
        assert!(store.delete(&node).await.unwrap());
        assert!(!store.delete(&node).await.unwrap());
        assert!(store.is_empty().await);
    }
}
