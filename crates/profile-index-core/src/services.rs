//! Service wiring
//!
//! `NodeServices` builds every engine from one set of collaborators and
//! starts the bus consumers. Swapping a collaborator (sled for memory,
//! Elasticsearch for the in-process index) happens here and nowhere else.

use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::bus::{EventBus, InMemoryBus};
use crate::cache::{DedupCache, InMemoryDedupCache};
use crate::clock::{Clock, SystemClock};
use crate::config::CoreConfig;
use crate::consumers::{spawn_index_consumers, spawn_validation_consumer};
use crate::deletion::{DeletionProtocol, ReachabilityProbe};
use crate::error::BusError;
use crate::indexing::IndexingEngine;
use crate::loader::DocumentLoader;
use crate::registry::NodeRegistry;
use crate::scheduler::{Cleanup, RevalidationScheduler};
use crate::search::{InMemorySearch, SearchBackend};
use crate::store::{InMemoryNodeStore, NodeStore};
use crate::telemetry::NodeMetrics;
use crate::validation::{SchemaChain, ValidationEngine};

/// External collaborators the pipeline runs against
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn NodeStore>,
    pub search: Arc<dyn SearchBackend>,
    pub bus: Arc<dyn EventBus>,
    pub cache: Arc<dyn DedupCache>,
    pub loader: Arc<dyn DocumentLoader>,
    pub probe: Arc<dyn ReachabilityProbe>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// Process-local collaborators around the given loader and probe
    pub fn in_memory(loader: Arc<dyn DocumentLoader>, probe: Arc<dyn ReachabilityProbe>) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            store: Arc::new(InMemoryNodeStore::new()),
            search: Arc::new(InMemorySearch::new()),
            bus: Arc::new(InMemoryBus::new().with_journal_capacity(0)),
            cache: Arc::new(InMemoryDedupCache::with_clock(clock.clone())),
            loader,
            probe,
            clock,
        }
    }
}

/// Every engine of the node lifecycle pipeline
pub struct NodeServices {
    pub config: Arc<CoreConfig>,
    pub metrics: Arc<NodeMetrics>,
    pub bus: Arc<dyn EventBus>,
    pub registry: Arc<NodeRegistry>,
    pub validation: Arc<ValidationEngine>,
    pub indexing: Arc<IndexingEngine>,
    pub deletion: Arc<DeletionProtocol>,
    pub revalidation: Arc<RevalidationScheduler>,
    pub cleanup: Arc<Cleanup>,
}

impl NodeServices {
    pub fn new(config: CoreConfig, deps: Collaborators, metrics: Arc<NodeMetrics>) -> Self {
        let config = Arc::new(config);
        let Collaborators {
            store,
            search,
            bus,
            cache,
            loader,
            probe,
            clock,
        } = deps;

        let registry = NodeRegistry::new(store.clone(), bus.clone(), clock.clone());
        let validation = ValidationEngine::new(
            SchemaChain::new(loader, config.clone()),
            cache,
            bus.clone(),
            clock.clone(),
            metrics.clone(),
            config.dedup_ttl,
        );
        let indexing = IndexingEngine::new(
            store.clone(),
            search.clone(),
            clock.clone(),
            config.clone(),
        );
        let deletion = DeletionProtocol::new(
            store.clone(),
            search.clone(),
            probe,
            clock.clone(),
            metrics.clone(),
            config.node_index.clone(),
        );
        let revalidation = RevalidationScheduler::new(
            store.clone(),
            bus.clone(),
            clock.clone(),
            metrics.clone(),
            config.revalidate_interval,
        );
        let cleanup = Cleanup::new(store, search, clock, metrics.clone(), config.clone());

        Self {
            config,
            metrics,
            bus,
            registry: Arc::new(registry),
            validation: Arc::new(validation),
            indexing: Arc::new(indexing),
            deletion: Arc::new(deletion),
            revalidation: Arc::new(revalidation),
            cleanup: Arc::new(cleanup),
        }
    }

    /// Subscribe the validation and indexing consumers
    pub async fn start_consumers(&self) -> Result<Vec<JoinHandle<()>>, BusError> {
        let mut handles = vec![
            spawn_validation_consumer(
                self.bus.as_ref(),
                Arc::clone(&self.validation),
                Arc::clone(&self.metrics),
            )
            .await?,
        ];
        handles.extend(
            spawn_index_consumers(
                self.bus.as_ref(),
                Arc::clone(&self.indexing),
                Arc::clone(&self.metrics),
            )
            .await?,
        );
        tracing::info!(consumers = handles.len(), "Consumers started");
        Ok(handles)
    }
}
