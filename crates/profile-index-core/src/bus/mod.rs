//! Event bus contract
//!
//! Named subjects, queue-group competing consumers, manual acknowledgment and
//! at-least-once delivery. A delivery that is dropped without `ack()` may be
//! handed out again, so consumers must tolerate duplicates.

pub mod memory;

pub use memory::InMemoryBus;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::contracts::{Event, Subject};
use crate::error::BusError;

/// Acknowledges one delivery back to the bus
pub trait Acker: Send {
    fn ack(self: Box<Self>) -> Result<(), BusError>;
}

/// A message handed to exactly one member of a queue group
pub struct Delivery {
    subject: Subject,
    payload: Vec<u8>,
    attempt: u32,
    acker: Option<Box<dyn Acker>>,
}

impl Delivery {
    pub fn new(subject: Subject, payload: Vec<u8>, attempt: u32, acker: Box<dyn Acker>) -> Self {
        Self {
            subject,
            payload,
            attempt,
            acker: Some(acker),
        }
    }

    pub fn subject(&self) -> Subject {
        self.subject
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Delivery attempt, starting at 1
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn is_redelivery(&self) -> bool {
        self.attempt > 1
    }

    /// Acknowledge the delivery; a second call fails with `AlreadyAcked`
    pub fn ack(&mut self) -> Result<(), BusError> {
        match self.acker.take() {
            Some(acker) => acker.ack(),
            None => Err(BusError::AlreadyAcked),
        }
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("subject", &self.subject)
            .field("attempt", &self.attempt)
            .field("bytes", &self.payload.len())
            .field("acked", &self.acker.is_none())
            .finish()
    }
}

/// Stream of deliveries for one queue-group member
pub struct Subscription {
    subject: Subject,
    queue_group: String,
    stream: BoxStream<'static, Delivery>,
}

impl Subscription {
    pub fn new(
        subject: Subject,
        queue_group: impl Into<String>,
        stream: BoxStream<'static, Delivery>,
    ) -> Self {
        Self {
            subject,
            queue_group: queue_group.into(),
            stream,
        }
    }

    pub fn subject(&self) -> Subject {
        self.subject
    }

    pub fn queue_group(&self) -> &str {
        &self.queue_group
    }

    /// Next delivery, or `None` once the bus is closed
    pub async fn next(&mut self) -> Option<Delivery> {
        self.stream.next().await
    }
}

/// Pub/sub transport used by the pipeline
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish a raw payload to every queue group subscribed to `subject`
    async fn publish(&self, subject: Subject, payload: Vec<u8>) -> Result<(), BusError>;

    /// Join `queue_group` on `subject`; members of one group compete for messages
    async fn queue_subscribe(
        &self,
        subject: Subject,
        queue_group: &str,
    ) -> Result<Subscription, BusError>;
}

/// Serialize an event and publish it on its subject
pub async fn publish_event<E: Event>(bus: &dyn EventBus, event: &E) -> Result<(), BusError> {
    let payload = serde_json::to_vec(event)?;
    bus.publish(E::SUBJECT, payload).await
}
