//! Node and event contracts
//!
//! Shared by the registry, both engines, the deletion protocol and the
//! HTTP boundary.

pub mod events;
pub mod node;

pub use events::{
    dedup_key, Event, NodeCreated, NodeValidated, NodeValidationFailed, Subject,
    INDEX_QUEUE_GROUP, VALIDATION_QUEUE_GROUP,
};
pub use node::{node_id, sha256_hex, Node, NodeStatus};
