//! Process wiring
//!
//! Builds the collaborators for one process: a sled datastore, Elasticsearch
//! (or the in-process index when no URL is given), the in-process bus and
//! dedup cache, and HTTP loaders. Teardown goes through a `Lifecycle` so the
//! store is flushed exactly once.

use anyhow::Context;
use axum::Router;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use profile_index_core::{
    Clock, Collaborators, CoreConfig, ElasticsearchClient, HttpDocumentLoader, HttpProbe, InMemoryBus,
    InMemoryDedupCache, InMemorySearch, Lifecycle, NodeMetrics, NodeServices, SearchBackend,
    SearchConfig, SledNodeStore, SystemClock,
};

use crate::handler::{create_router, AppState};

/// Where the process keeps its state
#[derive(Debug, Clone, Default)]
pub struct AppOptions {
    /// sled directory; a temporary store is used when absent
    pub data_dir: Option<PathBuf>,
    /// Elasticsearch base URL; the in-process index is used when absent
    pub elasticsearch_url: Option<String>,
}

/// A wired process
pub struct App {
    pub services: Arc<NodeServices>,
    pub lifecycle: Arc<Lifecycle>,
    bus: Arc<InMemoryBus>,
}

impl App {
    pub async fn build(options: &AppOptions, config: CoreConfig) -> anyhow::Result<Self> {
        let store = match &options.data_dir {
            Some(dir) => SledNodeStore::open(dir).with_context(|| {
                format!(
                    "opening datastore at {} (a running `serve` holds it and runs both jobs itself)",
                    dir.display()
                )
            })?,
            None => SledNodeStore::temporary().context("opening temporary datastore")?,
        };

        let search: Arc<dyn SearchBackend> = match &options.elasticsearch_url {
            Some(url) => Arc::new(
                ElasticsearchClient::connect(SearchConfig::new(url.clone()), &config.node_index)
                    .await
                    .context("error when trying to connect to Elasticsearch")?,
            ),
            None => {
                tracing::warn!("No Elasticsearch URL configured, using the in-process index");
                Arc::new(InMemorySearch::new())
            }
        };

        let bus = Arc::new(InMemoryBus::new().with_journal_capacity(0));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let deps = Collaborators {
            store: Arc::new(store.clone()),
            search,
            bus: bus.clone(),
            cache: Arc::new(InMemoryDedupCache::with_clock(clock.clone())),
            loader: Arc::new(HttpDocumentLoader::new(config.http_timeout)?),
            probe: Arc::new(HttpProbe::new(config.http_timeout)?),
            clock,
        };
        let metrics = Arc::new(NodeMetrics::new()?);
        let services = Arc::new(NodeServices::new(config, deps, metrics));

        let lifecycle = Arc::new(Lifecycle::new());
        let closing = bus.clone();
        lifecycle.on_shutdown("bus", move || closing.close());
        lifecycle.on_shutdown("datastore", move || {
            if let Err(e) = store.flush() {
                tracing::error!(error = %e, "Failed to flush datastore");
            }
        });

        Ok(Self {
            services,
            lifecycle,
            bus,
        })
    }

    pub fn router(&self) -> Router {
        create_router(Arc::new(AppState::new(Arc::clone(&self.services))))
    }

    /// Start the bus consumers
    pub async fn start_consumers(&self) -> anyhow::Result<Vec<JoinHandle<()>>> {
        Ok(self.services.start_consumers().await?)
    }

    /// Start the periodic revalidation sweep and cleanup; both stop on shutdown
    pub fn start_schedulers(&self) -> Vec<JoinHandle<()>> {
        vec![
            Arc::clone(&self.services.revalidation).spawn(self.lifecycle.subscribe()),
            Arc::clone(&self.services.cleanup).spawn(self.lifecycle.subscribe()),
        ]
    }

    /// Wait for in-flight events to be handled
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.bus.wait_idle(timeout).await
    }

    pub fn shutdown(&self) {
        self.lifecycle.shutdown();
    }
}
