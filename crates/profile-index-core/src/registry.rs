//! Node registry
//!
//! The add-node path: persists a `received` node and publishes `NodeCreated`
//! so the validation engine picks it up. Also serves node lookups.

use std::sync::Arc;

use crate::bus::{publish_event, EventBus};
use crate::clock::Clock;
use crate::contracts::{node_id, Node, NodeCreated};
use crate::error::{NodeError, Result};
use crate::store::NodeStore;

/// Owns node creation and lookup
pub struct NodeRegistry {
    store: Arc<dyn NodeStore>,
    bus: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
}

impl NodeRegistry {
    pub fn new(store: Arc<dyn NodeStore>, bus: Arc<dyn EventBus>, clock: Arc<dyn Clock>) -> Self {
        Self { store, bus, clock }
    }

    /// Register (or re-register) the profile at `profile_url`
    ///
    /// The node is reset to `received`; `created_at` survives re-registration.
    pub async fn add_node(&self, profile_url: &str, version: Option<u64>) -> Result<Node> {
        let profile_url = profile_url.trim();
        if profile_url.is_empty() {
            return Err(NodeError::bad_request("profile_url is required"));
        }
        let version = version.ok_or_else(|| NodeError::bad_request("version is required"))?;

        let now = self.clock.now_unix();
        let mut node = Node::received(profile_url, version, now);
        if let Some(existing) = self.store.get(&node_id(profile_url)).await? {
            if existing.version > version {
                return Err(NodeError::bad_request(format!(
                    "stale version: {} is older than stored version {}",
                    version, existing.version
                )));
            }
            node.created_at = existing.created_at;
        }

        self.store.add(&node).await?;
        let event = NodeCreated {
            profile_url: node.profile_url.clone(),
            version,
        };
        publish_event(self.bus.as_ref(), &event).await?;

        tracing::info!(
            profile_url = %node.profile_url,
            node_id = %node.id,
            version,
            "Node received"
        );
        Ok(node)
    }

    pub async fn get_node(&self, id: &str) -> Result<Node> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| NodeError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;
    use crate::clock::FixedClock;
    use crate::contracts::NodeStatus;
    use crate::store::InMemoryNodeStore;

    const URL: &str = "https://member.example/profile.json";

    fn registry() -> (NodeRegistry, Arc<InMemoryBus>, Arc<FixedClock>) {
        let bus = Arc::new(InMemoryBus::new());
        let clock = Arc::new(FixedClock::new(1_000));
        let registry = NodeRegistry::new(
            Arc::new(InMemoryNodeStore::new()),
            bus.clone(),
            clock.clone(),
        );
        (registry, bus, clock)
    }

    #[tokio::test]
    async fn test_add_node_persists_and_publishes() {
        let (registry, bus, _) = registry();

        let node = registry.add_node(URL, Some(1)).await.unwrap();
        assert_eq!(node.id, node_id(URL));
        assert_eq!(node.status, NodeStatus::Received);

        let stored = registry.get_node(&node.id).await.unwrap();
        assert_eq!(stored, node);
        assert_eq!(
            bus.published_events::<NodeCreated>(),
            vec![NodeCreated {
                profile_url: URL.to_string(),
                version: 1
            }]
        );
    }

    #[tokio::test]
    async fn test_readd_keeps_created_at() {
        let (registry, _, clock) = registry();
        registry.add_node(URL, Some(1)).await.unwrap();
        clock.advance(500);

        let node = registry.add_node(URL, Some(2)).await.unwrap();
        assert_eq!(node.created_at, 1_000);
        assert_eq!(node.last_updated, 1_500);
        assert_eq!(node.version, 2);
    }

    #[tokio::test]
    async fn test_rejects_bad_input() {
        let (registry, bus, _) = registry();
        assert!(matches!(
            registry.add_node("  ", Some(1)).await,
            Err(NodeError::BadRequest(_))
        ));
        assert!(matches!(
            registry.add_node(URL, None).await,
            Err(NodeError::BadRequest(_))
        ));

        registry.add_node(URL, Some(5)).await.unwrap();
        let err = registry.add_node(URL, Some(4)).await.unwrap_err();
        assert!(err.to_string().contains("stale version"));
        assert_eq!(bus.published(crate::contracts::Subject::NodeCreated).len(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_node() {
        let (registry, _, _) = registry();
        assert_eq!(
            registry.get_node("nope").await,
            Err(NodeError::NotFound("nope".to_string()))
        );
    }
}
