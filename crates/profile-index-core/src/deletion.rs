//! Reachability-gated deletion
//!
//! A node may only be removed once its own profile URL has gone dark. The
//! probe result is mapped through a fixed decision table:
//!
//! | probe result                         | decision                       |
//! |--------------------------------------|--------------------------------|
//! | transport error                      | reject: cannot reach URL       |
//! | 200 with a JSON body                 | reject: profile still exists   |
//! | 404, or any status with a non-JSON body | proceed                     |
//! | any other status                     | reject: unexpected status code |
//!
//! Proceeding soft-deletes `posted` nodes and hard-deletes everything else.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::clock::Clock;
use crate::contracts::{Node, NodeStatus};
use crate::error::{NodeError, Result};
use crate::search::SearchBackend;
use crate::store::NodeStore;
use crate::telemetry::NodeMetrics;

/// What a bounded GET of a profile URL produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Response { status: u16, json_body: bool },
    Unreachable(String),
}

/// Issues the bounded GET used by the deletion protocol
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn probe(&self, url: &str) -> ProbeOutcome;
}

/// Probe answering from a fixed URL → outcome table
///
/// Unknown URLs answer 404 with an empty body.
#[derive(Default)]
pub struct StaticProbe {
    outcomes: Mutex<HashMap<String, ProbeOutcome>>,
}

impl StaticProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, url: impl Into<String>, outcome: ProbeOutcome) {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.insert(url.into(), outcome);
        }
    }
}

#[async_trait]
impl ReachabilityProbe for StaticProbe {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        self.outcomes
            .lock()
            .ok()
            .and_then(|outcomes| outcomes.get(url).cloned())
            .unwrap_or(ProbeOutcome::Response {
                status: 404,
                json_body: false,
            })
    }
}

/// Apply the decision table; `Ok(())` means the delete may proceed
pub fn decide(node_id: &str, profile_url: &str, outcome: &ProbeOutcome) -> Result<()> {
    match outcome {
        ProbeOutcome::Unreachable(_) => Err(NodeError::Unreachable {
            node_id: node_id.to_string(),
            profile_url: profile_url.to_string(),
        }),
        ProbeOutcome::Response {
            status: 200,
            json_body: true,
        } => Err(NodeError::Conflict {
            node_id: node_id.to_string(),
            profile_url: profile_url.to_string(),
        }),
        ProbeOutcome::Response { status: 404, .. }
        | ProbeOutcome::Response {
            json_body: false, ..
        } => Ok(()),
        ProbeOutcome::Response { status, .. } => Err(NodeError::UnexpectedStatus {
            profile_url: profile_url.to_string(),
            status: *status,
        }),
    }
}

/// How a node was removed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteKind {
    /// Tombstone kept in the store
    Soft,
    /// Record purged
    Hard,
}

impl DeleteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeleteKind::Soft => "soft",
            DeleteKind::Hard => "hard",
        }
    }
}

/// Successful deletion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deleted {
    pub node_id: String,
    pub profile_url: String,
    pub kind: DeleteKind,
}

/// Deletes nodes whose profile has disappeared
pub struct DeletionProtocol {
    store: Arc<dyn NodeStore>,
    search: Arc<dyn SearchBackend>,
    probe: Arc<dyn ReachabilityProbe>,
    clock: Arc<dyn Clock>,
    metrics: Arc<NodeMetrics>,
    index: String,
}

impl DeletionProtocol {
    pub fn new(
        store: Arc<dyn NodeStore>,
        search: Arc<dyn SearchBackend>,
        probe: Arc<dyn ReachabilityProbe>,
        clock: Arc<dyn Clock>,
        metrics: Arc<NodeMetrics>,
        index: impl Into<String>,
    ) -> Self {
        Self {
            store,
            search,
            probe,
            clock,
            metrics,
            index: index.into(),
        }
    }

    /// Delete a node after confirming its profile URL no longer serves it
    pub async fn delete(&self, node_id: &str) -> Result<Deleted> {
        let node = match self.store.get(node_id).await? {
            Some(node) if node.status != NodeStatus::Deleted => node,
            _ => return Err(NodeError::NotFound(node_id.to_string())),
        };

        let outcome = self.probe.probe(&node.profile_url).await;
        if let Err(err) = decide(&node.id, &node.profile_url, &outcome) {
            tracing::info!(
                node_id = %node.id,
                profile_url = %node.profile_url,
                outcome = ?outcome,
                "Delete rejected"
            );
            self.metrics.record_deletion("rejected");
            return Err(err);
        }

        let kind = self.remove(&node).await?;
        self.metrics.record_deletion(kind.as_str());
        tracing::info!(
            node_id = %node.id,
            profile_url = %node.profile_url,
            kind = kind.as_str(),
            "Node deleted"
        );

        Ok(Deleted {
            node_id: node.id,
            profile_url: node.profile_url,
            kind,
        })
    }

    /// Projection first: a failure leaves the record in place for a retry
    async fn remove(&self, node: &Node) -> Result<DeleteKind> {
        self.search.delete_by_id(&self.index, &node.id).await?;
        if node.status == NodeStatus::Posted {
            self.store.soft_delete(node, self.clock.now_unix()).await?;
            Ok(DeleteKind::Soft)
        } else {
            self.store.delete(node).await?;
            Ok(DeleteKind::Hard)
        }
    }
}
