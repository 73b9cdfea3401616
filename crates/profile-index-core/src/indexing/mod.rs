//! Indexing engine
//!
//! Applies validation outcomes to stored nodes and keeps the search
//! projection in step. Only `posted` nodes are searchable.
//!
//! `set_valid` persists `validated`, normalizes and indexes the profile, then
//! persists `posted` or `post_failed`. `set_invalid` persists
//! `validation_failed` and removes the projection.

pub mod country;
pub mod profile;

pub use profile::{normalize_url, Profile, TagLimits};

use std::sync::Arc;

use crate::clock::{Clock, NEVER};
use crate::config::CoreConfig;
use crate::contracts::{node_id, Node, NodeStatus, NodeValidated, NodeValidationFailed};
use crate::error::Result;
use crate::search::{NodeQuery, SearchBackend, SearchResults};
use crate::store::{NodeStore, UpdateOutcome};

/// Substituted when a failure event carries no reasons
pub const UNSPECIFIED_FAILURE: &str = "Validation failed without a reason";

/// How an outcome event changed the stored node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Validated and indexed
    Posted,
    /// Validated but normalization or the search backend failed
    PostFailed(String),
    /// Marked `validation_failed`
    Invalidated,
    /// The stored node carries a newer version
    Stale { stored: u64, incoming: u64 },
    /// No node for this profile URL
    Missing,
    /// The node is deleted
    Terminal,
}

impl ApplyOutcome {
    fn rejected(outcome: UpdateOutcome) -> Option<Self> {
        match outcome {
            UpdateOutcome::Applied => None,
            UpdateOutcome::Stale { stored, incoming } => Some(ApplyOutcome::Stale { stored, incoming }),
            UpdateOutcome::Terminal => Some(ApplyOutcome::Terminal),
            UpdateOutcome::Missing => Some(ApplyOutcome::Missing),
        }
    }
}

/// Drives the node status state machine and the search projection
pub struct IndexingEngine {
    store: Arc<dyn NodeStore>,
    search: Arc<dyn SearchBackend>,
    clock: Arc<dyn Clock>,
    config: Arc<CoreConfig>,
}

impl IndexingEngine {
    pub fn new(
        store: Arc<dyn NodeStore>,
        search: Arc<dyn SearchBackend>,
        clock: Arc<dyn Clock>,
        config: Arc<CoreConfig>,
    ) -> Self {
        Self {
            store,
            search,
            clock,
            config,
        }
    }

    fn tag_limits(&self) -> TagLimits {
        TagLimits {
            max_count: self.config.tags_array_size,
            max_len: self.config.tags_string_length,
        }
    }

    /// Load the node an event refers to and check it may move to `next`
    async fn load_for(
        &self,
        profile_url: &str,
        version: u64,
        next: NodeStatus,
    ) -> Result<std::result::Result<Node, ApplyOutcome>> {
        let id = node_id(profile_url);
        let Some(stored) = self.store.get(&id).await? else {
            return Ok(Err(ApplyOutcome::Missing));
        };
        if version < stored.version {
            tracing::warn!(
                profile_url = %profile_url,
                stored = stored.version,
                incoming = version,
                "Ignoring outcome for an older version"
            );
            return Ok(Err(ApplyOutcome::Stale {
                stored: stored.version,
                incoming: version,
            }));
        }
        if !stored.status.can_transition_to(next) {
            return Ok(Err(ApplyOutcome::Terminal));
        }
        Ok(Ok(stored))
    }

    /// Apply a `NodeValidated` outcome
    pub async fn set_valid(&self, event: &NodeValidated) -> Result<ApplyOutcome> {
        let stored = match self
            .load_for(&event.profile_url, event.version, NodeStatus::Validated)
            .await?
        {
            Ok(stored) => stored,
            Err(outcome) => return Ok(outcome),
        };

        let mut node = Node {
            id: node_id(&event.profile_url),
            profile_url: event.profile_url.clone(),
            status: NodeStatus::Validated,
            version: event.version,
            profile_hash: event.profile_hash.clone(),
            profile_str: event.profile_str.clone(),
            failure_reasons: Vec::new(),
            created_at: stored.created_at,
            last_updated: event.last_validated,
            last_validated: event.last_validated,
        };
        if let Some(rejected) = ApplyOutcome::rejected(self.store.update(&node).await?) {
            return Ok(rejected);
        }

        let outcome = match self.index(&node).await {
            Ok(()) => {
                node.status = NodeStatus::Posted;
                ApplyOutcome::Posted
            }
            Err(reason) => {
                tracing::warn!(
                    profile_url = %node.profile_url,
                    node_id = %node.id,
                    reason = %reason,
                    "Failed to index node"
                );
                node.status = NodeStatus::PostFailed;
                ApplyOutcome::PostFailed(reason)
            }
        };

        if let Some(rejected) = ApplyOutcome::rejected(self.store.update(&node).await?) {
            // A newer outcome or a delete landed while the projection was written
            self.reconcile_projection(&node.id).await?;
            return Ok(rejected);
        }
        tracing::info!(
            profile_url = %node.profile_url,
            version = node.version,
            status = %node.status,
            "Node updated"
        );
        Ok(outcome)
    }

    /// Make the projection match whatever the store now holds for `id`
    async fn reconcile_projection(&self, id: &str) -> Result<()> {
        match self.store.get(id).await? {
            Some(current) if current.status == NodeStatus::Posted => {
                if let Err(reason) = self.index(&current).await {
                    tracing::warn!(node_id = %id, reason = %reason, "Failed to restore projection");
                }
            }
            _ => {
                self.search.delete_by_id(&self.config.node_index, id).await?;
                tracing::info!(node_id = %id, "Removed projection of superseded outcome");
            }
        }
        Ok(())
    }

    /// Normalize the stored profile and write its projection
    async fn index(&self, node: &Node) -> std::result::Result<(), String> {
        let mut profile = Profile::parse(&node.profile_str).map_err(|e| e.to_string())?;
        profile
            .normalize(self.tag_limits())
            .map_err(|e| e.to_string())?;
        let doc = profile.search_document(&node.profile_url, node.last_validated);
        self.search
            .index_with_id(&self.config.node_index, &node.id, &doc)
            .await
            .map_err(|e| e.to_string())
    }

    /// Apply a `NodeValidationFailed` outcome
    pub async fn set_invalid(&self, event: &NodeValidationFailed) -> Result<ApplyOutcome> {
        let stored = match self
            .load_for(&event.profile_url, event.version, NodeStatus::ValidationFailed)
            .await?
        {
            Ok(stored) => stored,
            Err(outcome) => return Ok(outcome),
        };

        let failure_reasons = if event.failure_reasons.is_empty() {
            vec![UNSPECIFIED_FAILURE.to_string()]
        } else {
            event.failure_reasons.clone()
        };
        // Retention counts from the first failure, not from each revalidation
        let last_updated = if stored.status == NodeStatus::ValidationFailed {
            stored.last_updated
        } else {
            self.clock.now_unix()
        };
        let node = Node {
            id: node_id(&event.profile_url),
            profile_url: event.profile_url.clone(),
            status: NodeStatus::ValidationFailed,
            version: event.version,
            profile_hash: String::new(),
            profile_str: String::new(),
            failure_reasons,
            created_at: stored.created_at,
            last_updated,
            last_validated: NEVER,
        };
        if let Some(rejected) = ApplyOutcome::rejected(self.store.update(&node).await?) {
            return Ok(rejected);
        }

        if let Err(e) = self
            .search
            .delete_by_id(&self.config.node_index, &node.id)
            .await
        {
            tracing::error!(
                node_id = %node.id,
                error = %e,
                "Failed to remove projection of invalid node"
            );
        }
        tracing::info!(
            profile_url = %node.profile_url,
            version = node.version,
            reasons = node.failure_reasons.len(),
            "Node marked validation_failed"
        );
        Ok(ApplyOutcome::Invalidated)
    }

    /// Query the search projection
    pub async fn search(&self, query: &NodeQuery) -> Result<SearchResults> {
        query.validate()?;
        Ok(self.search.search(&self.config.node_index, query).await?)
    }
}
