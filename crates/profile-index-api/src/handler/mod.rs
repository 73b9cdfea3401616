//! HTTP handlers for the profile index
//!
//! Every response uses one envelope: `data` on success, a list of `errors`
//! on failure (each with title, detail, source pointer and status) and
//! `meta` for counts, messages and request tracing.

pub mod routes;

pub use routes::{create_router, ApiError, AppState};

use serde::{Deserialize, Serialize};

/// Standard response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorObject>,
    pub meta: ResponseMeta,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
            meta: ResponseMeta::new(),
        }
    }

    pub fn with_meta(mut self, meta: ResponseMeta) -> Self {
        self.meta = meta;
        self
    }
}

impl ApiResponse<()> {
    pub fn failure(errors: Vec<ErrorObject>) -> Self {
        Self {
            data: None,
            errors,
            meta: ResponseMeta::new(),
        }
    }
}

/// One error in the envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub title: String,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ErrorSource>,
    pub status: u16,
}

impl ErrorObject {
    pub fn new(status: u16, title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            detail: detail.into(),
            source: None,
            status,
        }
    }

    pub fn with_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.source = Some(ErrorSource {
            pointer: pointer.into(),
        });
        self
    }
}

/// JSON pointer to the offending request field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSource {
    pub pointer: String,
}

/// Response metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub request_id: String,
    /// ISO 8601
    pub timestamp: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u64>,
}

impl ResponseMeta {
    pub fn new() -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            message: None,
            total: None,
            total_pages: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_pages(mut self, total: u64, total_pages: u64) -> Self {
        self.total = Some(total);
        self.total_pages = Some(total_pages);
        self
    }
}

impl Default for ResponseMeta {
    fn default() -> Self {
        Self::new()
    }
}

/// `POST /v2/nodes` body
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AddNodeRequest {
    #[serde(default)]
    pub profile_url: String,
    #[serde(default)]
    pub version: Option<u64>,
}

/// Public view of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeView {
    pub node_id: String,
    pub profile_url: String,
    pub status: String,
    pub version: u64,
    pub last_updated: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failure_reasons: Vec<String>,
}

impl From<profile_index_core::Node> for NodeView {
    fn from(node: profile_index_core::Node) -> Self {
        Self {
            node_id: node.id,
            profile_url: node.profile_url,
            status: node.status.as_str().to_string(),
            version: node.version,
            last_updated: node.last_updated,
            profile_hash: (!node.profile_hash.is_empty()).then_some(node.profile_hash),
            failure_reasons: node.failure_reasons,
        }
    }
}

/// `DELETE /v2/nodes/:node_id` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedView {
    pub node_id: String,
    pub profile_url: String,
}

/// Health check payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
