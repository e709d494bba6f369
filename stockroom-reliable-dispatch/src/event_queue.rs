use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use stockroom_core::event::{Delivery, DeliveryTag, Event};
use stockroom_core::EventSink;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{info, trace, warn};

use crate::errors::{ReliableDispatchError, Result};

/// Delivery settings of a single queue.
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// How long a received message stays invisible before it is redelivered
    pub lock_duration: Duration,
    /// Deliveries allowed before the message is moved to the dead-letter list
    pub max_deliveries: u32,
    /// Most messages kept ready; publishing past it dead-letters the oldest
    pub capacity: usize,
    /// Most dead letters kept; the oldest are dropped first
    pub dead_letter_capacity: usize,
}

impl Default for QueueOptions {
    fn default() -> Self {
        QueueOptions {
            lock_duration: Duration::from_secs(30),
            max_deliveries: 10,
            capacity: 10_000,
            dead_letter_capacity: 1_000,
        }
    }
}

/// A message that exhausted its deliveries or could not be decoded.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub payload: Vec<u8>,
    pub delivery_count: u32,
    pub reason: String,
}

#[derive(Debug)]
struct QueuedMessage {
    payload: Vec<u8>,
    delivery_count: u32,
}

#[derive(Debug)]
struct LockedMessage {
    message: QueuedMessage,
    lock_expires: Instant,
}

#[derive(Debug, Default)]
struct QueueState {
    // messages available for the next receive, oldest first
    ready: VecDeque<QueuedMessage>,
    // delivered messages awaiting acknowledgement
    locked: HashMap<DeliveryTag, LockedMessage>,
    // newest last, bounded by `dead_letter_capacity`
    dead_letters: VecDeque<DeadLetter>,
    next_tag: DeliveryTag,
    closed: bool,
}

/// EventQueue is an in-process, peek-lock message queue with at-least-once delivery.
///
/// A receive locks each returned message for `lock_duration`. The consumer either
/// acknowledges it (removed for good), abandons it (visible again immediately) or
/// lets the lock lapse (visible again on the next receive). Consumers must therefore
/// tolerate duplicates.
#[derive(Debug)]
pub struct EventQueue {
    name: String,
    options: QueueOptions,
    state: Mutex<QueueState>,
    // wakes receivers blocked on an empty queue
    notify: Notify,
}

impl EventQueue {
    pub fn new(name: impl Into<String>, options: QueueOptions) -> Self {
        EventQueue {
            name: name.into(),
            options,
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Messages waiting to be received (locked ones excluded).
    pub async fn ready_len(&self) -> usize {
        self.state.lock().await.ready.len()
    }

    /// Messages received but not yet acknowledged.
    pub async fn in_flight(&self) -> usize {
        self.state.lock().await.locked.len()
    }

    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state.lock().await.dead_letters.iter().cloned().collect()
    }

    fn dead_letter(&self, state: &mut QueueState, letter: DeadLetter) {
        if self.options.dead_letter_capacity == 0 {
            return;
        }
        while state.dead_letters.len() >= self.options.dead_letter_capacity {
            state.dead_letters.pop_front();
        }
        state.dead_letters.push_back(letter);
    }

    /// Return expired locks to the front of the ready queue, keeping delivery order.
    fn reclaim_expired(&self, state: &mut QueueState, now: Instant) {
        let mut expired: Vec<DeliveryTag> = state
            .locked
            .iter()
            .filter(|(_, locked)| locked.lock_expires <= now)
            .map(|(tag, _)| *tag)
            .collect();
        if expired.is_empty() {
            return;
        }
        expired.sort_unstable();
        for tag in expired.into_iter().rev() {
            if let Some(locked) = state.locked.remove(&tag) {
                trace!(
                    "queue {}: lock on delivery {} expired, redelivering",
                    self.name,
                    tag
                );
                state.ready.push_front(locked.message);
            }
        }
    }

    fn take_batch(&self, state: &mut QueueState, max: usize, now: Instant) -> Vec<Delivery> {
        let mut batch = Vec::new();
        while batch.len() < max {
            let Some(mut message) = state.ready.pop_front() else {
                break;
            };
            message.delivery_count += 1;

            if message.delivery_count > self.options.max_deliveries {
                warn!(
                    "queue {}: message exceeded {} deliveries, moving to dead letters",
                    self.name, self.options.max_deliveries
                );
                self.dead_letter(
                    state,
                    DeadLetter {
                        payload: message.payload,
                        delivery_count: message.delivery_count - 1,
                        reason: "max deliveries exceeded".to_string(),
                    },
                );
                continue;
            }

            let event = match Event::from_payload(&message.payload) {
                Ok(event) => event,
                Err(e) => {
                    warn!("queue {}: undecodable message dead-lettered: {}", self.name, e);
                    self.dead_letter(
                        state,
                        DeadLetter {
                            payload: message.payload,
                            delivery_count: message.delivery_count,
                            reason: e.to_string(),
                        },
                    );
                    continue;
                }
            };

            let tag = state.next_tag;
            state.next_tag += 1;
            batch.push(Delivery {
                tag,
                event,
                delivery_count: message.delivery_count,
            });
            state.locked.insert(
                tag,
                LockedMessage {
                    message,
                    lock_expires: now + self.options.lock_duration,
                },
            );
        }
        batch
    }

    pub(crate) async fn publish_payload(&self, payload: Vec<u8>) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(ReliableDispatchError::Closed(self.name.clone()));
        }
        while state.ready.len() >= self.options.capacity.max(1) {
            let Some(oldest) = state.ready.pop_front() else {
                break;
            };
            warn!(
                "queue {}: capacity {} reached, dead-lettering oldest message",
                self.name, self.options.capacity
            );
            self.dead_letter(
                &mut state,
                DeadLetter {
                    payload: oldest.payload,
                    delivery_count: oldest.delivery_count,
                    reason: "queue capacity exceeded".to_string(),
                },
            );
        }
        state.ready.push_back(QueuedMessage {
            payload,
            delivery_count: 0,
        });
        drop(state);
        self.notify.notify_waiters();
        Ok(())
    }

    async fn receive_batch(&self, max: usize, wait: Duration) -> Result<Vec<Delivery>> {
        if max == 0 {
            return Ok(Vec::new());
        }
        let deadline = Instant::now() + wait;

        loop {
            // register before inspecting the state so a concurrent publish is not missed
            let notified = self.notify.notified();
            tokio::pin!(notified);

            let next_expiry = {
                let mut state = self.state.lock().await;
                if state.closed {
                    return Err(ReliableDispatchError::Closed(self.name.clone()));
                }
                let now = Instant::now();
                self.reclaim_expired(&mut state, now);
                let batch = self.take_batch(&mut state, max, now);
                if !batch.is_empty() {
                    trace!("queue {}: delivering {} messages", self.name, batch.len());
                    return Ok(batch);
                }
                state.locked.values().map(|l| l.lock_expires).min()
            };

            if Instant::now() >= deadline {
                return Ok(Vec::new());
            }
            let wake_at = next_expiry.map_or(deadline, |expiry| expiry.min(deadline));

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn settle(&self, tag: DeliveryTag) -> Result<QueuedMessage> {
        let mut state = self.state.lock().await;
        state
            .locked
            .remove(&tag)
            .map(|locked| locked.message)
            .ok_or(ReliableDispatchError::UnknownDelivery(tag))
    }
}

#[async_trait]
impl EventSink for EventQueue {
    async fn publish(&self, event: &Event) -> stockroom_core::Result<()> {
        let payload = event.to_payload()?;
        self.publish_payload(payload).await?;
        trace!("queue {}: published {} event", self.name, event.action);
        Ok(())
    }

    async fn receive(&self, max: usize, wait: Duration) -> stockroom_core::Result<Vec<Delivery>> {
        Ok(self.receive_batch(max, wait).await?)
    }

    // acknowledgements are still accepted after close so in-flight work can settle
    async fn acknowledge(&self, tag: DeliveryTag) -> stockroom_core::Result<()> {
        self.settle(tag).await?;
        trace!("queue {}: delivery {} acknowledged", self.name, tag);
        Ok(())
    }

    async fn abandon(&self, tag: DeliveryTag) -> stockroom_core::Result<()> {
        let message = self.settle(tag).await?;
        self.state.lock().await.ready.push_front(message);
        self.notify.notify_waiters();
        Ok(())
    }

    async fn close(&self) -> stockroom_core::Result<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Ok(());
        }
        state.closed = true;
        info!(
            "queue {} closed with {} ready and {} unacknowledged messages",
            self.name,
            state.ready.len(),
            state.locked.len()
        );
        drop(state);
        self.notify.notify_waiters();
        Ok(())
    }
}
