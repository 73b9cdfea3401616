//! Event payloads exchanged over the bus
//!
//! One subject per payload type. Payloads are JSON; the correlation key for
//! every event about a node is `(profile_url, version)`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Queue group of the validation consumers
pub const VALIDATION_QUEUE_GROUP: &str = "validation-service";

/// Queue group of the indexing consumers
pub const INDEX_QUEUE_GROUP: &str = "index-service";

/// Named bus subjects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subject {
    NodeCreated,
    NodeValidated,
    NodeValidationFailed,
}

impl Subject {
    pub fn as_str(&self) -> &'static str {
        match self {
            Subject::NodeCreated => "node:created",
            Subject::NodeValidated => "node:validated",
            Subject::NodeValidationFailed => "node:validation_failed",
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dedup/correlation key for a node event
pub fn dedup_key(profile_url: &str, version: u64) -> String {
    format!("{}:{}", profile_url, version)
}

/// A payload bound to its subject
pub trait Event: Serialize + DeserializeOwned + Send + Sync {
    const SUBJECT: Subject;

    fn profile_url(&self) -> &str;

    fn version(&self) -> u64;

    fn dedup_key(&self) -> String {
        dedup_key(self.profile_url(), self.version())
    }
}

/// A node was registered or re-submitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCreated {
    pub profile_url: String,
    pub version: u64,
}

/// The profile passed the default schema and every linked schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeValidated {
    pub profile_url: String,
    pub profile_hash: String,
    pub profile_str: String,
    pub last_validated: i64,
    pub version: u64,
}

/// The profile could not be fetched or did not conform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeValidationFailed {
    pub profile_url: String,
    pub failure_reasons: Vec<String>,
    pub version: u64,
}

impl Event for NodeCreated {
    const SUBJECT: Subject = Subject::NodeCreated;

    fn profile_url(&self) -> &str {
        &self.profile_url
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Event for NodeValidated {
    const SUBJECT: Subject = Subject::NodeValidated;

    fn profile_url(&self) -> &str {
        &self.profile_url
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Event for NodeValidationFailed {
    const SUBJECT: Subject = Subject::NodeValidationFailed;

    fn profile_url(&self) -> &str {
        &self.profile_url
    }

    fn version(&self) -> u64 {
        self.version
    }
}
