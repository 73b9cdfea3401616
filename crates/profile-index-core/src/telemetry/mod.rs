//! Telemetry for the pipeline

pub mod metrics;

pub use metrics::NodeMetrics;
