//! Node entity and lifecycle status

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::clock::NEVER;

/// Hex SHA-256 of a string
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Node identifier for a profile URL
///
/// Always recomputed from the URL; an ID supplied by a client or carried in
/// an event is never trusted.
pub fn node_id(profile_url: &str) -> String {
    sha256_hex(profile_url)
}

/// Lifecycle status of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Received,
    Validated,
    ValidationFailed,
    PostFailed,
    Posted,
    Deleted,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Received => "received",
            NodeStatus::Validated => "validated",
            NodeStatus::ValidationFailed => "validation_failed",
            NodeStatus::PostFailed => "post_failed",
            NodeStatus::Posted => "posted",
            NodeStatus::Deleted => "deleted",
        }
    }

    /// Whether the outcome consumers or the deletion protocol may move a
    /// node from `self` to `next`
    pub fn can_transition_to(&self, next: NodeStatus) -> bool {
        use NodeStatus::*;
        match (self, next) {
            (Deleted, _) => false,
            (_, Deleted) => true,
            (Received, Validated | ValidationFailed) => true,
            (Validated, Posted | PostFailed | ValidationFailed | Validated) => true,
            (Posted | PostFailed, Validated | ValidationFailed) => true,
            (ValidationFailed, Validated | ValidationFailed) => true,
            _ => false,
        }
    }

    /// Whether the node carries a validated profile snapshot
    pub fn has_profile(&self) -> bool {
        matches!(
            self,
            NodeStatus::Validated | NodeStatus::Posted | NodeStatus::PostFailed
        )
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered member profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub profile_url: String,
    pub status: NodeStatus,
    pub version: u64,
    #[serde(default)]
    pub profile_hash: String,
    #[serde(default)]
    pub profile_str: String,
    #[serde(default)]
    pub failure_reasons: Vec<String>,
    pub created_at: i64,
    pub last_updated: i64,
    #[serde(default)]
    pub last_validated: i64,
}

impl Node {
    /// Fresh node in the `received` state
    pub fn received(profile_url: impl Into<String>, version: u64, now: i64) -> Self {
        let profile_url = profile_url.into();
        Self {
            id: node_id(&profile_url),
            profile_url,
            status: NodeStatus::Received,
            version,
            profile_hash: String::new(),
            profile_str: String::new(),
            failure_reasons: Vec::new(),
            created_at: now,
            last_updated: now,
            last_validated: NEVER,
        }
    }

    /// Check the status/payload invariants
    pub fn is_consistent(&self) -> bool {
        let reasons_ok =
            self.failure_reasons.is_empty() != (self.status == NodeStatus::ValidationFailed);
        let hash_ok = if self.status == NodeStatus::ValidationFailed {
            self.profile_hash.is_empty() && self.profile_str.is_empty()
        } else if self.status.has_profile() {
            !self.profile_hash.is_empty()
        } else {
            true
        };
        reasons_ok && hash_ok && self.id == node_id(&self.profile_url)
    }
}
