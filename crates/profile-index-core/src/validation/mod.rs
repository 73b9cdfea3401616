//! Validation engine
//!
//! Consumes `NodeCreated`, claims the `(profile_url, version)` dedup key, runs
//! the schema chain and publishes exactly one outcome event. Validation
//! problems never surface as errors; they become `NodeValidationFailed`.

pub mod chain;

pub use chain::{compact_json, SchemaChain, Verdict};

use std::sync::Arc;
use std::time::Duration;

use crate::bus::{publish_event, EventBus};
use crate::cache::{DedupCache, PROCESSED};
use crate::clock::Clock;
use crate::contracts::{dedup_key, NodeValidated, NodeValidationFailed};
use crate::consumers::HandlerOutcome;
use crate::telemetry::NodeMetrics;

/// Runs the schema chain for created nodes and publishes the verdict
pub struct ValidationEngine {
    chain: SchemaChain,
    cache: Arc<dyn DedupCache>,
    bus: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
    metrics: Arc<NodeMetrics>,
    dedup_ttl: Duration,
}

impl ValidationEngine {
    pub fn new(
        chain: SchemaChain,
        cache: Arc<dyn DedupCache>,
        bus: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
        metrics: Arc<NodeMetrics>,
        dedup_ttl: Duration,
    ) -> Self {
        Self {
            chain,
            cache,
            bus,
            clock,
            metrics,
            dedup_ttl,
        }
    }

    /// Validate one `(profile_url, version)`; every outcome is published, not returned
    pub async fn validate_node(&self, profile_url: &str, version: u64) -> HandlerOutcome {
        let key = dedup_key(profile_url, version);
        match self.cache.set_if_absent(&key, PROCESSED, self.dedup_ttl).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!(key = %key, "Duplicate node created event");
                return HandlerOutcome::Duplicate;
            }
            Err(e) => return HandlerOutcome::Dropped(format!("dedup cache unavailable: {}", e)),
        }

        let verdict = self.chain.evaluate(profile_url).await;
        self.metrics.record_validation(verdict.is_passed());

        let published = match verdict {
            Verdict::Passed {
                profile_hash,
                profile_str,
            } => {
                tracing::info!(profile_url = %profile_url, version, "Profile validated");
                let event = NodeValidated {
                    profile_url: profile_url.to_string(),
                    profile_hash,
                    profile_str,
                    last_validated: self.clock.now_unix(),
                    version,
                };
                publish_event(self.bus.as_ref(), &event).await
            }
            Verdict::Failed(failure_reasons) => {
                tracing::info!(
                    profile_url = %profile_url,
                    version,
                    reasons = failure_reasons.len(),
                    "Profile failed validation"
                );
                let event = NodeValidationFailed {
                    profile_url: profile_url.to_string(),
                    failure_reasons,
                    version,
                };
                publish_event(self.bus.as_ref(), &event).await
            }
        };

        match published {
            Ok(()) => HandlerOutcome::Processed,
            Err(e) => {
                // Nothing downstream saw this version; let the next delivery retry it
                if let Err(release) = self.cache.remove(&key).await {
                    tracing::warn!(key = %key, error = %release, "Failed to release dedup claim");
                }
                HandlerOutcome::Dropped(format!("failed to publish outcome: {}", e))
            }
        }
    }
}
