//! HTTP clients for external services
//!
//! Profile and schema loading, the deletion reachability probe and the
//! Elasticsearch search backend.

pub mod elasticsearch;
pub mod http;

pub use elasticsearch::{build_search_body, node_index_mapping, ElasticsearchClient, SearchConfig};
pub use http::{HttpDocumentLoader, HttpProbe};
