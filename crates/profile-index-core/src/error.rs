//! Error types for the node lifecycle pipeline
//!
//! `NodeError` is what callers of the registry and deletion protocol see.
//! Collaborator errors (store, search, bus, cache) fold into
//! `NodeError::Internal`; fetch errors never reach a caller because the
//! validation engine turns them into failure reasons.

use thiserror::Error;

/// Caller-facing error for node operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// Malformed or missing request input
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// No node with the given identifier
    #[error("Node not found: {0}")]
    NotFound(String),

    /// Profile is still publicly reachable, so the node cannot be deleted
    #[error("Profile still exists at {profile_url} for node_id {node_id}")]
    Conflict {
        node_id: String,
        profile_url: String,
    },

    /// Transport failure while probing the profile URL
    #[error("Error when trying to reach {profile_url} to delete node_id {node_id}")]
    Unreachable {
        node_id: String,
        profile_url: String,
    },

    /// Profile URL answered with a status that is neither 200 nor 404
    #[error("Node at {profile_url} returned status code {status}")]
    UnexpectedStatus { profile_url: String, status: u16 },

    /// Datastore, search backend, bus or cache failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl NodeError {
    /// Create a bad request error
    pub fn bad_request(msg: impl Into<String>) -> Self {
        NodeError::BadRequest(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        NodeError::Internal(msg.into())
    }

    /// HTTP status code for this error at the API boundary
    pub fn status_code(&self) -> u16 {
        match self {
            NodeError::BadRequest(_)
            | NodeError::Conflict { .. }
            | NodeError::Unreachable { .. }
            | NodeError::UnexpectedStatus { .. } => 400,
            NodeError::NotFound(_) => 404,
            NodeError::Internal(_) => 500,
        }
    }

    /// Short human title for the error
    pub fn title(&self) -> &'static str {
        match self {
            NodeError::BadRequest(_) => "Bad Request",
            NodeError::NotFound(_) => "Node Not Found",
            NodeError::Conflict { .. } => "Profile Still Exists",
            NodeError::Unreachable { .. } => "Profile Not Reachable",
            NodeError::UnexpectedStatus { .. } => "Unexpected Status Code",
            NodeError::Internal(_) => "Internal Server Error",
        }
    }

    /// Check if this is a user-facing error (vs internal)
    pub fn is_user_error(&self) -> bool {
        !matches!(self, NodeError::Internal(_))
    }
}

/// Errors raised while fetching a profile or schema document
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Transport(String),

    #[error("Unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Invalid JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Document not found: {0}")]
    Missing(String),
}

/// Datastore errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Failed to encode node record: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Search backend errors
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Search backend error: {0}")]
    Backend(String),

    #[error("Search backend unavailable after {elapsed_secs}s: {last_error}")]
    ConnectTimeout { elapsed_secs: u64, last_error: String },

    #[error("Invalid search query: {0}")]
    InvalidQuery(String),
}

/// Event bus errors
#[derive(Error, Debug)]
pub enum BusError {
    #[error("Failed to publish on {subject}: {reason}")]
    Publish { subject: String, reason: String },

    #[error("Failed to subscribe to {subject}: {reason}")]
    Subscribe { subject: String, reason: String },

    #[error("Message already acknowledged")]
    AlreadyAcked,

    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Dedup cache errors
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

/// Normalization errors for the indexing pipeline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("Invalid geolocation {0:?}: expected \"<lat>,<lon>\"")]
    Geolocation(String),

    #[error("Invalid URL: {0:?}")]
    Url(String),

    #[error("Profile is not a JSON object")]
    NotAnObject,

    #[error("Invalid profile JSON: {0}")]
    InvalidJson(String),
}

impl From<StoreError> for NodeError {
    fn from(err: StoreError) -> Self {
        NodeError::Internal(err.to_string())
    }
}

impl From<SearchError> for NodeError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::InvalidQuery(msg) => NodeError::BadRequest(msg),
            other => NodeError::Internal(other.to_string()),
        }
    }
}

impl From<BusError> for NodeError {
    fn from(err: BusError) -> Self {
        NodeError::Internal(err.to_string())
    }
}

impl From<CacheError> for NodeError {
    fn from(err: CacheError) -> Self {
        NodeError::Internal(err.to_string())
    }
}

/// Result type alias for node operations
pub type Result<T> = std::result::Result<T, NodeError>;
