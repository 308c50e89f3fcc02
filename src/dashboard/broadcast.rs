//! Subscriber registry and fan-out of change signals.
//!
//! The [`ConnectionManager`] owns the set of live WebSocket subscribers. It is
//! shared (via `Arc`) by the WebSocket handler, which subscribes and
//! unsubscribes connections, and by the file watcher, which publishes.
//!
//! Delivery is best-effort: there is no queueing for absent subscribers and
//! no replay for late ones.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::protocol::ServerMessage;
use crate::models::ChangeSignal;

/// Identifier assigned to each subscriber on `subscribe`.
pub type SubscriberId = u64;

/// A live subscription. Dropping the receiver makes the next publish drop
/// this subscriber.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriberId,
    pub receiver: UnboundedReceiver<String>,
}

/// The set of currently connected subscribers.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    next_id: AtomicU64,
    subscribers: RwLock<HashMap<SubscriberId, UnboundedSender<String>>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber. It only receives messages published after
    /// this call returns.
    pub async fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().await.insert(id, tx);
        tracing::debug!(subscriber = id, "Subscriber added");
        Subscription { id, receiver: rx }
    }

    /// Remove a subscriber. Returns whether it was still registered;
    /// removing twice is harmless.
    pub async fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers.write().await.remove(&id).is_some();
        if removed {
            tracing::debug!(subscriber = id, "Subscriber removed");
        }
        removed
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Send a change signal to every open subscriber.
    ///
    /// Returns the number of subscribers the signal was handed to.
    pub async fn publish(&self, signal: &ChangeSignal) -> usize {
        let message = ServerMessage::FileChange {
            data: signal.clone(),
        };
        self.publish_raw(message.to_json()).await
    }

    /// Send a pre-serialized message to every open subscriber, dropping
    /// subscribers whose connection has gone away.
    pub async fn publish_raw(&self, text: String) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();
        {
            let subscribers = self.subscribers.read().await;
            for (id, tx) in subscribers.iter() {
                if tx.send(text.clone()).is_ok() {
                    delivered += 1;
                } else {
                    closed.push(*id);
                }
            }
        }

        if !closed.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            for id in closed {
                subscribers.remove(&id);
                tracing::debug!(subscriber = id, "Dropped closed subscriber");
            }
        }

        delivered
    }
}
