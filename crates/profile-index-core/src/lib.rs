//! Profile Index Core
//!
//! The node lifecycle pipeline of a decentralized profile directory. Members
//! publish a JSON profile at a URL they control; the pipeline validates it
//! against a chain of JSON Schemas, projects accepted profiles into a search
//! index and keeps both in step as member content changes or disappears.
//!
//! ## Flow
//!
//! 1. [`registry::NodeRegistry`] persists a `received` node and publishes
//!    `NodeCreated`.
//! 2. [`validation::ValidationEngine`] claims the `(profile_url, version)`
//!    dedup key, runs the schema chain and publishes `NodeValidated` or
//!    `NodeValidationFailed`.
//! 3. [`indexing::IndexingEngine`] applies the outcome to the stored node,
//!    normalizes the profile and writes the search projection.
//! 4. [`deletion::DeletionProtocol`] removes a node once its profile URL has
//!    gone dark.
//! 5. [`scheduler::RevalidationScheduler`] re-enters stale nodes and
//!    [`scheduler::Cleanup`] purges long-terminal records.
//!
//! Every collaborator (event bus, dedup cache, datastore, search backend,
//! document loader, reachability probe, clock) sits behind a trait, with
//! in-memory implementations that double as test fakes.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use profile_index_core::{
//!     Collaborators, CoreConfig, HttpDocumentLoader, HttpProbe, NodeMetrics, NodeServices,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CoreConfig::from_env();
//! let deps = Collaborators::in_memory(
//!     Arc::new(HttpDocumentLoader::new(config.http_timeout)?),
//!     Arc::new(HttpProbe::new(config.http_timeout)?),
//! );
//! let services = NodeServices::new(config, deps, Arc::new(NodeMetrics::new()?));
//! services.start_consumers().await?;
//! services
//!     .registry
//!     .add_node("https://example.org/profile.json", Some(1))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod cache;
pub mod client;
pub mod clock;
pub mod config;
pub mod consumers;
pub mod contracts;
pub mod deletion;
pub mod error;
pub mod indexing;
pub mod lifecycle;
pub mod loader;
pub mod registry;
pub mod scheduler;
pub mod search;
pub mod services;
pub mod store;
pub mod telemetry;
pub mod validation;

pub use bus::{EventBus, InMemoryBus};
pub use cache::{DedupCache, InMemoryDedupCache};
pub use client::{ElasticsearchClient, HttpDocumentLoader, HttpProbe, SearchConfig};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::CoreConfig;
pub use consumers::HandlerOutcome;
pub use contracts::{node_id, Node, NodeCreated, NodeStatus, NodeValidated, NodeValidationFailed};
pub use deletion::{DeleteKind, Deleted, DeletionProtocol, ProbeOutcome, ReachabilityProbe};
pub use error::{NodeError, Result};
pub use indexing::{ApplyOutcome, IndexingEngine};
pub use lifecycle::Lifecycle;
pub use loader::{DocumentLoader, StaticLoader};
pub use registry::NodeRegistry;
pub use scheduler::{Cleanup, CleanupReport, RevalidationScheduler};
pub use search::{InMemorySearch, NodeQuery, SearchBackend, SearchDocument, SearchResults};
pub use services::{Collaborators, NodeServices};
pub use store::{InMemoryNodeStore, NodeStore, SledNodeStore};
pub use telemetry::NodeMetrics;
pub use validation::{SchemaChain, ValidationEngine, Verdict};
