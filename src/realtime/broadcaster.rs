//! Per-owner registry of live subscriber sinks.
//!
//! Each sink is a bounded channel. Delivery never buffers beyond the sink's
//! own capacity: a sink that stays full for the delivery timeout misses the
//! event.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::envelope::Envelope;
use crate::config::RealtimeSettings;
use crate::domain::{Message, OwnerId};

/// A registered sink, handed to the transport that drains it.
#[derive(Debug)]
pub struct Subscription {
    pub owner: OwnerId,
    pub id: u64,
    /// Serialized envelopes, in delivery order.
    pub receiver: mpsc::Receiver<String>,
}

type Sinks = HashMap<OwnerId, HashMap<u64, mpsc::Sender<String>>>;

pub struct Broadcaster {
    sinks: RwLock<Sinks>,
    next_id: AtomicU64,
    capacity: usize,
    delivery_timeout: Duration,
}

impl Broadcaster {
    pub fn new(settings: &RealtimeSettings) -> Self {
        Self::with_limits(settings.sink_capacity, settings.delivery_timeout())
    }

    /// Zero capacity is treated as one.
    pub fn with_limits(capacity: usize, delivery_timeout: Duration) -> Self {
        Self {
            sinks: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
            delivery_timeout,
        }
    }

    /// Adds a sink for `owner` and queues the connection ack on it.
    pub async fn register(&self, owner: &OwnerId) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        match Envelope::connection(owner).to_json() {
            Ok(ack) => {
                let _ = sender.try_send(ack);
            }
            Err(e) => warn!(owner_id = %owner, error = %e, "failed to encode connection ack"),
        }

        self.sinks
            .write()
            .await
            .entry(owner.clone())
            .or_default()
            .insert(id, sender);
        debug!(owner_id = %owner, sink = id, "sink registered");

        Subscription {
            owner: owner.clone(),
            id,
            receiver,
        }
    }

    /// Removes a sink, closing it. Returns false if it was not registered.
    pub async fn unregister(&self, owner: &OwnerId, id: u64) -> bool {
        let mut sinks = self.sinks.write().await;
        let Some(owned) = sinks.get_mut(owner) else {
            return false;
        };
        let removed = owned.remove(&id).is_some();
        if owned.is_empty() {
            sinks.remove(owner);
        }
        if removed {
            debug!(owner_id = %owner, sink = id, "sink unregistered");
        }
        removed
    }

    /// Sends `envelope` to every sink of `owner` concurrently.
    ///
    /// Returns how many sinks accepted it. An owner without sinks returns 0
    /// at once. Closed sinks are pruned.
    pub async fn deliver(&self, owner: &OwnerId, envelope: &Envelope) -> usize {
        let targets: Vec<(u64, mpsc::Sender<String>)> = {
            let sinks = self.sinks.read().await;
            match sinks.get(owner) {
                Some(owned) => owned.iter().map(|(id, tx)| (*id, tx.clone())).collect(),
                None => return 0,
            }
        };

        let payload = match envelope.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(owner_id = %owner, error = %e, "failed to encode event");
                return 0;
            }
        };

        let timeout = self.delivery_timeout;
        let results = join_all(targets.iter().map(|(id, sender)| {
            let payload = payload.clone();
            async move {
                match sender.send_timeout(payload, timeout).await {
                    Ok(()) => Ok(*id),
                    Err(SendTimeoutError::Timeout(_)) => {
                        warn!(owner_id = %owner, sink = *id, "sink stalled, event dropped");
                        Err(None)
                    }
                    Err(SendTimeoutError::Closed(_)) => Err(Some(*id)),
                }
            }
        }))
        .await;

        let delivered = results.iter().filter(|r| r.is_ok()).count();
        let closed: Vec<u64> = results.into_iter().filter_map(|r| r.err().flatten()).collect();
        for id in closed {
            self.unregister(owner, id).await;
        }
        delivered
    }

    pub async fn deliver_message(&self, owner: &OwnerId, message: &Message) -> usize {
        match Envelope::new_email(message) {
            Ok(envelope) => self.deliver(owner, &envelope).await,
            Err(e) => {
                warn!(message_id = %message.id, error = %e, "failed to encode message");
                0
            }
        }
    }

    pub async fn deliver_summary(&self, owner: &OwnerId, count: usize) -> usize {
        self.deliver(owner, &Envelope::email_summary(count)).await
    }

    pub async fn connection_count(&self, owner: &OwnerId) -> usize {
        self.sinks.read().await.get(owner).map_or(0, HashMap::len)
    }

    pub async fn has_connection(&self, owner: &OwnerId) -> bool {
        self.connection_count(owner).await > 0
    }

    /// Closes every sink and empties the registry.
    pub async fn close(&self) {
        let mut sinks = self.sinks.write().await;
        let count: usize = sinks.values().map(HashMap::len).sum();
        sinks.clear();
        debug!(count, "closed all sinks");
    }
}
