//! In-process event bus
//!
//! Each `(subject, queue group)` pair owns one channel; every subscription to
//! the pair shares the receiving end, so a message reaches exactly one member.
//! Deliveries dropped without an ack are re-queued until `max_deliveries`.
//! The last `journal_capacity` payloads per subject are kept for inspection.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use super::{Acker, Delivery, EventBus, Subscription};
use crate::contracts::{Event, Subject};
use crate::error::BusError;

/// Default cap on delivery attempts per message
pub const DEFAULT_MAX_DELIVERIES: u32 = 5;

/// Default number of payloads kept per subject
pub const DEFAULT_JOURNAL_CAPACITY: usize = 256;

type Receiver = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Delivery>>>;

struct Group {
    sender: mpsc::UnboundedSender<Delivery>,
    receiver: Receiver,
}

#[derive(Default)]
struct Journal {
    published: HashMap<Subject, VecDeque<Vec<u8>>>,
    acked: HashMap<Subject, usize>,
    redelivered: usize,
    /// Deliveries neither acked nor abandoned
    pending: usize,
}

/// Queue-group bus backed by tokio channels
pub struct InMemoryBus {
    groups: Mutex<HashMap<Subject, HashMap<String, Group>>>,
    journal: Arc<Mutex<Journal>>,
    max_deliveries: u32,
    journal_capacity: usize,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::with_max_deliveries(DEFAULT_MAX_DELIVERIES)
    }

    pub fn with_max_deliveries(max_deliveries: u32) -> Self {
        Self {
            groups: Mutex::new(HashMap::new()),
            journal: Arc::new(Mutex::new(Journal::default())),
            max_deliveries: max_deliveries.max(1),
            journal_capacity: DEFAULT_JOURNAL_CAPACITY,
        }
    }

    /// Keep at most `capacity` payloads per subject; 0 disables the journal
    pub fn with_journal_capacity(mut self, capacity: usize) -> Self {
        self.journal_capacity = capacity;
        self
    }

    /// Most recent raw payloads published on a subject, in publish order
    pub fn published(&self, subject: Subject) -> Vec<Vec<u8>> {
        self.journal
            .lock()
            .map(|j| {
                j.published
                    .get(&subject)
                    .map(|payloads| payloads.iter().cloned().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    /// Decoded events published on the event's subject
    pub fn published_events<E: Event>(&self) -> Vec<E> {
        self.published(E::SUBJECT)
            .iter()
            .filter_map(|payload| serde_json::from_slice(payload).ok())
            .collect()
    }

    /// Number of acknowledged deliveries on a subject
    pub fn acked(&self, subject: Subject) -> usize {
        self.journal
            .lock()
            .map(|j| j.acked.get(&subject).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Number of deliveries re-queued after being dropped unacknowledged
    pub fn redelivered(&self) -> usize {
        self.journal.lock().map(|j| j.redelivered).unwrap_or(0)
    }

    /// Messages handed to a queue group and not yet acked or abandoned
    pub fn pending(&self) -> usize {
        self.journal.lock().map(|j| j.pending).unwrap_or(0)
    }

    /// Wait until nothing is pending; returns false if `timeout` passes first
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.pending() > 0 {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        true
    }

    /// Drop every queue group so open subscriptions end
    pub fn close(&self) {
        if let Ok(mut groups) = self.groups.lock() {
            groups.clear();
        }
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, subject: Subject, payload: Vec<u8>) -> Result<(), BusError> {
        let senders: Vec<mpsc::UnboundedSender<Delivery>> = {
            let groups = self.groups.lock().map_err(|e| BusError::Publish {
                subject: subject.to_string(),
                reason: e.to_string(),
            })?;
            groups
                .get(&subject)
                .map(|g| g.values().map(|group| group.sender.clone()).collect())
                .unwrap_or_default()
        };

        if let Ok(mut journal) = self.journal.lock() {
            if self.journal_capacity > 0 {
                let payloads = journal.published.entry(subject).or_default();
                if payloads.len() >= self.journal_capacity {
                    payloads.pop_front();
                }
                payloads.push_back(payload.clone());
            }
            journal.pending += senders.len();
        }

        for sender in senders {
            let delivery = MemoryAcker::delivery(
                subject,
                payload.clone(),
                1,
                sender.clone(),
                Arc::clone(&self.journal),
                self.max_deliveries,
            );
            sender.send(delivery).map_err(|_| BusError::Publish {
                subject: subject.to_string(),
                reason: "queue group closed".to_string(),
            })?;
        }

        Ok(())
    }

    async fn queue_subscribe(
        &self,
        subject: Subject,
        queue_group: &str,
    ) -> Result<Subscription, BusError> {
        let receiver = {
            let mut groups = self.groups.lock().map_err(|e| BusError::Subscribe {
                subject: subject.to_string(),
                reason: e.to_string(),
            })?;
            let group = groups
                .entry(subject)
                .or_default()
                .entry(queue_group.to_string())
                .or_insert_with(|| {
                    let (sender, receiver) = mpsc::unbounded_channel();
                    Group {
                        sender,
                        receiver: Arc::new(tokio::sync::Mutex::new(receiver)),
                    }
                });
            Arc::clone(&group.receiver)
        };

        let stream = futures::stream::unfold(receiver, |receiver| async move {
            let next = receiver.lock().await.recv().await;
            next.map(|delivery| (delivery, receiver))
        });

        Ok(Subscription::new(subject, queue_group, Box::pin(stream)))
    }
}

struct MemoryAcker {
    subject: Subject,
    payload: Vec<u8>,
    attempt: u32,
    sender: mpsc::UnboundedSender<Delivery>,
    journal: Arc<Mutex<Journal>>,
    max_deliveries: u32,
    acked: bool,
}

impl MemoryAcker {
    fn delivery(
        subject: Subject,
        payload: Vec<u8>,
        attempt: u32,
        sender: mpsc::UnboundedSender<Delivery>,
        journal: Arc<Mutex<Journal>>,
        max_deliveries: u32,
    ) -> Delivery {
        let acker = MemoryAcker {
            subject,
            payload: payload.clone(),
            attempt,
            sender,
            journal,
            max_deliveries,
            acked: false,
        };
        Delivery::new(subject, payload, attempt, Box::new(acker))
    }
}

impl Acker for MemoryAcker {
    fn ack(mut self: Box<Self>) -> Result<(), BusError> {
        self.acked = true;
        if let Ok(mut journal) = self.journal.lock() {
            *journal.acked.entry(self.subject).or_insert(0) += 1;
            journal.pending = journal.pending.saturating_sub(1);
        }
        Ok(())
    }
}

impl Drop for MemoryAcker {
    fn drop(&mut self) {
        if self.acked {
            return;
        }
        if self.attempt >= self.max_deliveries {
            if let Ok(mut journal) = self.journal.lock() {
                journal.pending = journal.pending.saturating_sub(1);
            }
            return;
        }
        if let Ok(mut journal) = self.journal.lock() {
            journal.redelivered += 1;
        }
        let redelivery = MemoryAcker::delivery(
            self.subject,
            std::mem::take(&mut self.payload),
            self.attempt + 1,
            self.sender.clone(),
            Arc::clone(&self.journal),
            self.max_deliveries,
        );
        let _ = self.sender.send(redelivery);
    }
}
