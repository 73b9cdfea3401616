//! Periodic maintenance
//!
//! `RevalidationScheduler` re-enters stale nodes into validation by
//! republishing `NodeCreated` with their stored version. `Cleanup` purges
//! long-standing `validation_failed` nodes and old tombstones. Its two passes
//! run independently; an error in one does not skip the other. Both jobs run
//! on their own interval inside the serving process, which holds the store.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::bus::{publish_event, EventBus};
use crate::clock::Clock;
use crate::config::CoreConfig;
use crate::contracts::{NodeCreated, NodeStatus};
use crate::error::{NodeError, Result};
use crate::search::SearchBackend;
use crate::store::NodeStore;
use crate::telemetry::NodeMetrics;

/// Statuses eligible for revalidation
pub const REVALIDATE_STATUSES: [NodeStatus; 5] = [
    NodeStatus::Received,
    NodeStatus::Validated,
    NodeStatus::Posted,
    NodeStatus::PostFailed,
    NodeStatus::ValidationFailed,
];

fn secs(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}

/// Republishes `NodeCreated` for nodes not touched within the interval
pub struct RevalidationScheduler {
    store: Arc<dyn NodeStore>,
    bus: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
    metrics: Arc<NodeMetrics>,
    interval: Duration,
}

impl RevalidationScheduler {
    pub fn new(
        store: Arc<dyn NodeStore>,
        bus: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
        metrics: Arc<NodeMetrics>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            bus,
            clock,
            metrics,
            interval,
        }
    }

    /// One revalidation sweep; returns how many nodes were re-entered
    pub async fn run_once(&self) -> Result<usize> {
        let cutoff = self.clock.now_unix().saturating_sub(secs(self.interval));
        let mut republished = 0;

        for status in REVALIDATE_STATUSES {
            for node in self.store.find_by_status_older_than(status, cutoff).await? {
                let event = NodeCreated {
                    profile_url: node.profile_url,
                    version: node.version,
                };
                publish_event(self.bus.as_ref(), &event).await?;
                republished += 1;
            }
        }

        self.metrics.record_revalidations(republished as u64);
        tracing::info!(republished, cutoff, "Revalidation sweep finished");
        Ok(republished)
    }

    /// Run a sweep every interval until `shutdown` flips to true
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once().await {
                            tracing::error!(error = %e, "Revalidation sweep failed");
                        }
                    }
                    _ = shutdown.changed() => break,
                }
                if *shutdown.borrow() {
                    break;
                }
            }
            tracing::info!("Revalidation scheduler stopped");
        })
    }
}

/// What one cleanup run removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub validation_failed_purged: usize,
    pub deleted_purged: usize,
    /// One message per failed pass
    pub errors: Vec<String>,
}

impl CleanupReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Purges long-terminal node records
pub struct Cleanup {
    store: Arc<dyn NodeStore>,
    search: Arc<dyn SearchBackend>,
    clock: Arc<dyn Clock>,
    metrics: Arc<NodeMetrics>,
    config: Arc<CoreConfig>,
}

impl Cleanup {
    pub fn new(
        store: Arc<dyn NodeStore>,
        search: Arc<dyn SearchBackend>,
        clock: Arc<dyn Clock>,
        metrics: Arc<NodeMetrics>,
        config: Arc<CoreConfig>,
    ) -> Self {
        Self {
            store,
            search,
            clock,
            metrics,
            config,
        }
    }

    /// Run both passes
    pub async fn run_once(&self) -> CleanupReport {
        let mut report = CleanupReport::default();

        match self
            .purge(NodeStatus::ValidationFailed, self.config.validation_failed_ttl)
            .await
        {
            Ok(n) => report.validation_failed_purged = n,
            Err(e) => {
                tracing::error!(pass = "validation_failed", error = %e, "Cleanup pass failed");
                report.errors.push(format!("validation_failed: {}", e));
            }
        }

        match self
            .purge(NodeStatus::Deleted, self.config.deleted_ttl)
            .await
        {
            Ok(n) => report.deleted_purged = n,
            Err(e) => {
                tracing::error!(pass = "deleted", error = %e, "Cleanup pass failed");
                report.errors.push(format!("deleted: {}", e));
            }
        }

        tracing::info!(
            validation_failed = report.validation_failed_purged,
            deleted = report.deleted_purged,
            errors = report.errors.len(),
            "Cleanup finished"
        );
        report
    }

    /// Run both passes every `cleanup_interval` until `shutdown` flips to true
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.cleanup_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                    _ = shutdown.changed() => break,
                }
                if *shutdown.borrow() {
                    break;
                }
            }
            tracing::info!("Cleanup scheduler stopped");
        })
    }

    async fn purge(&self, status: NodeStatus, retention: Duration) -> Result<usize> {
        let cutoff = self.clock.now_unix().saturating_sub(secs(retention));
        let candidates = self.store.find_by_status_older_than(status, cutoff).await?;

        let mut purged = 0;
        let mut first_error: Option<NodeError> = None;
        for node in candidates {
            let removed = async {
                self.store.delete(&node).await?;
                self.search
                    .delete_by_id(&self.config.node_index, &node.id)
                    .await?;
                Ok::<_, NodeError>(())
            }
            .await;
            match removed {
                Ok(()) => purged += 1,
                Err(e) => {
                    tracing::warn!(node_id = %node.id, error = %e, "Failed to purge node");
                    first_error.get_or_insert(e);
                }
            }
        }

        self.metrics.record_purged(status.as_str(), purged as u64);
        match first_error {
            Some(e) => Err(e),
            None => Ok(purged),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;
    use crate::clock::FixedClock;
    use crate::contracts::{node_id, Node};
    use crate::search::{InMemorySearch, MapLocation, SearchDocument};
    use crate::store::InMemoryNodeStore;

    const DAY: i64 = 86_400;

    fn node(url: &str, status: NodeStatus, last_updated: i64) -> Node {
        let mut node = Node::received(url, 1, last_updated);
        node.status = status;
        if status == NodeStatus::ValidationFailed {
            node.failure_reasons = vec!["bad".to_string()];
        }
        node
    }

    #[tokio::test]
    async fn test_revalidation_republishes_stale_nodes() {
        let store = Arc::new(InMemoryNodeStore::new());
        let bus = Arc::new(InMemoryBus::new());
        let clock = Arc::new(FixedClock::new(10 * DAY));
        let metrics = Arc::new(NodeMetrics::new().unwrap());

        store.add(&node("https://old.example", NodeStatus::Posted, DAY)).await.unwrap();
        store
            .add(&node("https://fresh.example", NodeStatus::Posted, 10 * DAY - 10))
            .await
            .unwrap();
        store.add(&node("https://gone.example", NodeStatus::Deleted, DAY)).await.unwrap();

        let scheduler = RevalidationScheduler::new(
            store,
            bus.clone(),
            clock,
            metrics.clone(),
            Duration::from_secs(DAY as u64),
        );
        assert_eq!(scheduler.run_once().await.unwrap(), 1);
        assert_eq!(
            bus.published_events::<NodeCreated>(),
            vec![NodeCreated {
                profile_url: "https://old.example".to_string(),
                version: 1
            }]
        );
        assert_eq!(metrics.revalidations(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_stops_on_shutdown() {
        let scheduler = Arc::new(RevalidationScheduler::new(
            Arc::new(InMemoryNodeStore::new()),
            Arc::new(InMemoryBus::new()),
            Arc::new(FixedClock::new(0)),
            Arc::new(NodeMetrics::new().unwrap()),
            Duration::from_secs(60),
        ));
        let (tx, rx) = watch::channel(false);
        let handle = scheduler.spawn(rx);
        tokio::time::sleep(Duration::from_secs(130)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_cleanup_purges_both_passes() {
        let store = Arc::new(InMemoryNodeStore::new());
        let search = Arc::new(InMemorySearch::new());
        let clock = Arc::new(FixedClock::new(100 * DAY));
        let metrics = Arc::new(NodeMetrics::new().unwrap());
        let config = Arc::new(CoreConfig::default());

        let failed_old = node("https://failed.example", NodeStatus::ValidationFailed, DAY);
        let failed_new = node("https://recent.example", NodeStatus::ValidationFailed, 100 * DAY);
        let tomb_old = node("https://tomb.example", NodeStatus::Deleted, DAY);
        let posted = node("https://live.example", NodeStatus::Posted, DAY);
        for n in [&failed_old, &failed_new, &tomb_old, &posted] {
            store.add(n).await.unwrap();
        }
        search
            .index_with_id(
                "nodes",
                &tomb_old.id,
                &SearchDocument {
                    geolocation: None,
                    last_checked: DAY,
                    linked_schemas: vec![],
                    maplocation: MapLocation::default(),
                    profile_url: tomb_old.profile_url.clone(),
                },
            )
            .await
            .unwrap();

        let cleanup = Cleanup::new(store.clone(), search.clone(), clock, metrics.clone(), config);
        let report = cleanup.run_once().await;

        assert_eq!(
            report,
            CleanupReport {
                validation_failed_purged: 1,
                deleted_purged: 1,
                errors: vec![],
            }
        );
        assert!(store.get(&node_id("https://failed.example")).await.unwrap().is_none());
        assert!(store.get(&failed_new.id).await.unwrap().is_some());
        assert!(store.get(&posted.id).await.unwrap().is_some());
        assert_eq!(search.count("nodes").await, 0);
        assert_eq!(metrics.purged("validation_failed"), 1);
        assert_eq!(metrics.purged("deleted"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_scheduler_purges_until_shutdown() {
        let store = Arc::new(InMemoryNodeStore::new());
        let failed = node("https://failed.example", NodeStatus::ValidationFailed, DAY);
        store.add(&failed).await.unwrap();

        let config = CoreConfig::builder()
            .cleanup_interval(Duration::from_secs(3600))
            .build();
        let cleanup = Arc::new(Cleanup::new(
            store.clone(),
            Arc::new(InMemorySearch::new()),
            Arc::new(FixedClock::new(100 * DAY)),
            Arc::new(NodeMetrics::new().unwrap()),
            Arc::new(config),
        ));
        let (tx, rx) = watch::channel(false);
        let handle = cleanup.spawn(rx);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(store.get(&failed.id).await.unwrap().is_none());

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_cleanup_passes_are_independent() {
        let store = Arc::new(InMemoryNodeStore::new());
        let search = Arc::new(InMemorySearch::new());
        let clock = Arc::new(FixedClock::new(100 * DAY));
        store
            .add(&node("https://failed.example", NodeStatus::ValidationFailed, DAY))
            .await
            .unwrap();
        store
            .add(&node("https://tomb.example", NodeStatus::Deleted, DAY))
            .await
            .unwrap();
        search.set_unavailable(true);

        let cleanup = Cleanup::new(
            store,
            search,
            clock,
            Arc::new(NodeMetrics::new().unwrap()),
            Arc::new(CoreConfig::default()),
        );
        let report = cleanup.run_once().await;
        assert_eq!(report.errors.len(), 2);
        assert!(report.errors[0].starts_with("validation_failed: "));
        assert!(report.errors[1].starts_with("deleted: "));
        assert!(!report.is_ok());
    }
}
