//! Bus consumers
//!
//! Each delivery is decoded and handled on its own task. Whatever the handler
//! does, including panicking, the delivery is acknowledged exactly once and
//! the outcome is logged and counted.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;

use crate::bus::{Delivery, EventBus, Subscription};
use crate::contracts::{
    Event, NodeCreated, NodeValidated, NodeValidationFailed, INDEX_QUEUE_GROUP,
    VALIDATION_QUEUE_GROUP,
};
use crate::error::BusError;
use crate::indexing::{ApplyOutcome, IndexingEngine};
use crate::telemetry::NodeMetrics;
use crate::validation::ValidationEngine;

/// What handling one delivery amounted to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// The event was applied
    Processed,
    /// `(profile_url, version)` was already claimed inside the dedup window
    Duplicate,
    /// The stored node carries a newer version
    Stale,
    /// Nothing to apply to, e.g. the node was deleted meanwhile
    Ignored(String),
    /// Undecodable payload, infrastructure failure or panic
    Dropped(String),
}

impl HandlerOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            HandlerOutcome::Processed => "processed",
            HandlerOutcome::Duplicate => "duplicate",
            HandlerOutcome::Stale => "stale",
            HandlerOutcome::Ignored(_) => "ignored",
            HandlerOutcome::Dropped(_) => "dropped",
        }
    }
}

impl From<ApplyOutcome> for HandlerOutcome {
    fn from(outcome: ApplyOutcome) -> Self {
        match outcome {
            ApplyOutcome::Posted | ApplyOutcome::PostFailed(_) | ApplyOutcome::Invalidated => {
                HandlerOutcome::Processed
            }
            ApplyOutcome::Stale { .. } => HandlerOutcome::Stale,
            ApplyOutcome::Missing => HandlerOutcome::Ignored("node not found".to_string()),
            ApplyOutcome::Terminal => HandlerOutcome::Ignored("node is deleted".to_string()),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Decode, handle and acknowledge one delivery
pub async fn handle_delivery<E, H, Fut>(
    mut delivery: Delivery,
    handler: &H,
    metrics: &NodeMetrics,
) -> HandlerOutcome
where
    E: Event,
    H: Fn(E) -> Fut,
    Fut: Future<Output = HandlerOutcome>,
{
    let subject = delivery.subject();
    let started = Instant::now();

    let decoded = serde_json::from_slice::<E>(delivery.payload());
    let outcome = match decoded {
        Err(e) => HandlerOutcome::Dropped(format!("undecodable payload: {}", e)),
        Ok(event) => match AssertUnwindSafe(async { handler(event).await })
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => {
                HandlerOutcome::Dropped(format!("handler panicked: {}", panic_message(&*panic)))
            }
        },
    };

    match &outcome {
        HandlerOutcome::Dropped(reason) => {
            tracing::error!(subject = %subject, reason = %reason, "Dropped message");
        }
        HandlerOutcome::Ignored(reason) => {
            tracing::info!(subject = %subject, reason = %reason, "Ignored message");
        }
        _ => {
            tracing::debug!(subject = %subject, outcome = outcome.label(), "Handled message");
        }
    }
    metrics.record_event(subject, outcome.label());
    metrics.observe_handler(subject, started.elapsed().as_secs_f64());

    if let Err(e) = delivery.ack() {
        tracing::error!(subject = %subject, error = %e, "Error when acknowledging message");
    }

    outcome
}

/// Handle every delivery of a subscription, each on its own task
pub async fn run_consumer<E, H, Fut>(
    mut subscription: Subscription,
    metrics: Arc<NodeMetrics>,
    handler: H,
) where
    E: Event + 'static,
    H: Fn(E) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerOutcome> + Send + 'static,
{
    tracing::info!(
        subject = %subscription.subject(),
        queue_group = subscription.queue_group(),
        "Consumer started"
    );
    let handler = Arc::new(handler);
    while let Some(delivery) = subscription.next().await {
        let handler = Arc::clone(&handler);
        let metrics = Arc::clone(&metrics);
        tokio::spawn(async move {
            handle_delivery::<E, H, Fut>(delivery, handler.as_ref(), &metrics).await;
        });
    }
    tracing::info!(subject = %subscription.subject(), "Consumer stopped");
}

/// Subscribe the validation engine to `NodeCreated`
pub async fn spawn_validation_consumer(
    bus: &dyn EventBus,
    engine: Arc<ValidationEngine>,
    metrics: Arc<NodeMetrics>,
) -> Result<JoinHandle<()>, BusError> {
    let subscription = bus
        .queue_subscribe(NodeCreated::SUBJECT, VALIDATION_QUEUE_GROUP)
        .await?;
    Ok(tokio::spawn(run_consumer(
        subscription,
        metrics,
        move |event: NodeCreated| {
            let engine = Arc::clone(&engine);
            async move { engine.validate_node(&event.profile_url, event.version).await }
        },
    )))
}

/// Subscribe the indexing engine to both validation outcomes
pub async fn spawn_index_consumers(
    bus: &dyn EventBus,
    engine: Arc<IndexingEngine>,
    metrics: Arc<NodeMetrics>,
) -> Result<Vec<JoinHandle<()>>, BusError> {
    let validated = bus
        .queue_subscribe(NodeValidated::SUBJECT, INDEX_QUEUE_GROUP)
        .await?;
    let failed = bus
        .queue_subscribe(NodeValidationFailed::SUBJECT, INDEX_QUEUE_GROUP)
        .await?;

    let valid_engine = Arc::clone(&engine);
    let on_validated = tokio::spawn(run_consumer(
        validated,
        Arc::clone(&metrics),
        move |event: NodeValidated| {
            let engine = Arc::clone(&valid_engine);
            async move {
                match engine.set_valid(&event).await {
                    Ok(outcome) => outcome.into(),
                    Err(e) => HandlerOutcome::Dropped(e.to_string()),
                }
            }
        },
    ));

    let on_failed = tokio::spawn(run_consumer(
        failed,
        metrics,
        move |event: NodeValidationFailed| {
            let engine = Arc::clone(&engine);
            async move {
                match engine.set_invalid(&event).await {
                    Ok(outcome) => outcome.into(),
                    Err(e) => HandlerOutcome::Dropped(e.to_string()),
                }
            }
        },
    ));

    Ok(vec![on_validated, on_failed])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InMemoryBus;
    use crate::contracts::Subject;

    fn created() -> Vec<u8> {
        serde_json::to_vec(&NodeCreated {
            profile_url: "https://a.example/p.json".into(),
            version: 1,
        })
        .unwrap()
    }

    async fn next_delivery(bus: &InMemoryBus, payload: Vec<u8>) -> Delivery {
        let mut sub = bus
            .queue_subscribe(Subject::NodeCreated, VALIDATION_QUEUE_GROUP)
            .await
            .unwrap();
        bus.publish(Subject::NodeCreated, payload).await.unwrap();
        sub.next().await.unwrap()
    }

    async fn poisoned(_: NodeCreated) -> HandlerOutcome {
        panic!("poison message")
    }

    #[tokio::test]
    async fn test_panicking_handler_is_acked_and_dropped() {
        let bus = InMemoryBus::new();
        let metrics = NodeMetrics::new().unwrap();
        let delivery = next_delivery(&bus, created()).await;

        let outcome = handle_delivery(delivery, &poisoned, &metrics).await;

        assert_eq!(
            outcome,
            HandlerOutcome::Dropped("handler panicked: poison message".to_string())
        );
        assert_eq!(bus.acked(Subject::NodeCreated), 1);
        assert_eq!(bus.redelivered(), 0);
        assert_eq!(metrics.events(Subject::NodeCreated, "dropped"), 1);
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_acked_and_dropped() {
        let bus = InMemoryBus::new();
        let metrics = NodeMetrics::new().unwrap();
        let delivery = next_delivery(&bus, b"not json".to_vec()).await;

        let handler = |_: NodeCreated| async { HandlerOutcome::Processed };
        let outcome = handle_delivery(delivery, &handler, &metrics).await;

        assert!(matches!(outcome, HandlerOutcome::Dropped(_)));
        assert_eq!(bus.acked(Subject::NodeCreated), 1);
    }

    #[tokio::test]
    async fn test_processed_is_counted() {
        let bus = InMemoryBus::new();
        let metrics = NodeMetrics::new().unwrap();
        let delivery = next_delivery(&bus, created()).await;

        let handler = |event: NodeCreated| async move {
            assert_eq!(event.version, 1);
            HandlerOutcome::Processed
        };
        handle_delivery(delivery, &handler, &metrics).await;
        assert_eq!(metrics.events(Subject::NodeCreated, "processed"), 1);
    }

    #[test]
    fn test_apply_outcome_mapping() {
        assert_eq!(HandlerOutcome::from(ApplyOutcome::Posted), HandlerOutcome::Processed);
        assert_eq!(
            HandlerOutcome::from(ApplyOutcome::Stale {
                stored: 2,
                incoming: 1
            }),
            HandlerOutcome::Stale
        );
        assert_eq!(HandlerOutcome::from(ApplyOutcome::Terminal).label(), "ignored");
    }
}
