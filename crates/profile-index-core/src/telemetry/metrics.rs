//! Prometheus metrics for the node lifecycle pipeline
//!
//! - `profile_index_events_total` (counter) - consumed events by subject and outcome
//! - `profile_index_handler_duration_seconds` (histogram) - handler latency by subject
//! - `profile_index_validations_total` (counter) - validation verdicts
//! - `profile_index_deletions_total` (counter) - delete requests by kind
//! - `profile_index_cleanup_purged_total` (counter) - purged records by pass
//! - `profile_index_revalidations_total` (counter) - nodes re-entered into validation

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

use crate::contracts::Subject;

const NAMESPACE: &str = "profile_index";

/// Metrics registry for one process
pub struct NodeMetrics {
    registry: Registry,
    events_total: IntCounterVec,
    handler_duration_seconds: HistogramVec,
    validations_total: IntCounterVec,
    deletions_total: IntCounterVec,
    cleanup_purged_total: IntCounterVec,
    revalidations_total: IntCounter,
}

impl NodeMetrics {
    /// Create the metrics and register them with a fresh registry
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let events_total = IntCounterVec::new(
            Opts::new("events_total", "Bus events consumed by subject and outcome")
                .namespace(NAMESPACE),
            &["subject", "outcome"],
        )?;

        let handler_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "handler_duration_seconds",
                "Time spent handling one bus event",
            )
            .namespace(NAMESPACE)
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["subject"],
        )?;

        let validations_total = IntCounterVec::new(
            Opts::new("validations_total", "Schema-chain verdicts").namespace(NAMESPACE),
            &["result"],
        )?;

        let deletions_total = IntCounterVec::new(
            Opts::new("deletions_total", "Delete requests by outcome").namespace(NAMESPACE),
            &["kind"],
        )?;

        let cleanup_purged_total = IntCounterVec::new(
            Opts::new("cleanup_purged_total", "Records purged by cleanup pass")
                .namespace(NAMESPACE),
            &["pass"],
        )?;

        let revalidations_total = IntCounter::with_opts(
            Opts::new(
                "revalidations_total",
                "Nodes re-entered into validation by the scheduler",
            )
            .namespace(NAMESPACE),
        )?;

        registry.register(Box::new(events_total.clone()))?;
        registry.register(Box::new(handler_duration_seconds.clone()))?;
        registry.register(Box::new(validations_total.clone()))?;
        registry.register(Box::new(deletions_total.clone()))?;
        registry.register(Box::new(cleanup_purged_total.clone()))?;
        registry.register(Box::new(revalidations_total.clone()))?;

        Ok(Self {
            registry,
            events_total,
            handler_duration_seconds,
            validations_total,
            deletions_total,
            cleanup_purged_total,
            revalidations_total,
        })
    }

    pub fn record_event(&self, subject: Subject, outcome: &str) {
        self.events_total
            .with_label_values(&[subject.as_str(), outcome])
            .inc();
    }

    pub fn observe_handler(&self, subject: Subject, seconds: f64) {
        self.handler_duration_seconds
            .with_label_values(&[subject.as_str()])
            .observe(seconds);
    }

    pub fn record_validation(&self, passed: bool) {
        let result = if passed { "validated" } else { "failed" };
        self.validations_total.with_label_values(&[result]).inc();
    }

    pub fn record_deletion(&self, kind: &str) {
        self.deletions_total.with_label_values(&[kind]).inc();
    }

    pub fn record_purged(&self, pass: &str, count: u64) {
        self.cleanup_purged_total
            .with_label_values(&[pass])
            .inc_by(count);
    }

    pub fn record_revalidations(&self, count: u64) {
        self.revalidations_total.inc_by(count);
    }

    /// Current count of consumed events for a subject and outcome
    pub fn events(&self, subject: Subject, outcome: &str) -> u64 {
        self.events_total
            .with_label_values(&[subject.as_str(), outcome])
            .get()
    }

    pub fn validations(&self, result: &str) -> u64 {
        self.validations_total.with_label_values(&[result]).get()
    }

    pub fn deletions(&self, kind: &str) -> u64 {
        self.deletions_total.with_label_values(&[kind]).get()
    }

    pub fn purged(&self, pass: &str) -> u64 {
        self.cleanup_purged_total.with_label_values(&[pass]).get()
    }

    pub fn revalidations(&self) -> u64 {
        self.revalidations_total.get()
    }

    /// Render every metric in the Prometheus text format
    pub fn gather_text(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
