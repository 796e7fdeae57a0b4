// Copyright (c) 2024 -  Nimbus developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use nimbus_types::{ActivationId, ActivationRecord};

pub type CompletionSender = oneshot::Sender<Arc<ActivationRecord>>;
pub type CompletionReceiver = oneshot::Receiver<Arc<ActivationRecord>>;

/// Active notification channel for finished activations.
pub trait CompletionFeed {
    /// Subscribe to the completion of `activation_id`. Dropping the returned
    /// [`Subscription`] unsubscribes.
    fn subscribe(&self, activation_id: ActivationId) -> Subscription;
}

/// Publishing side of a completion feed, used by the execution path.
pub trait CompletionPublisher {
    /// Notify the subscribers of the record's activation, returning how many were notified.
    fn publish(&self, record: Arc<ActivationRecord>) -> usize;
}

impl<T: CompletionFeed> CompletionFeed for Arc<T> {
    fn subscribe(&self, activation_id: ActivationId) -> Subscription {
        (**self).subscribe(activation_id)
    }
}

impl<T: CompletionPublisher> CompletionPublisher for Arc<T> {
    fn publish(&self, record: Arc<ActivationRecord>) -> usize {
        (**self).publish(record)
    }
}

/// Cancellable handle over a feed subscription.
///
/// It yields at most one record. Once dropped the feed forgets about it, so a
/// completion published afterwards is not delivered to anyone.
pub struct Subscription {
    activation_id: ActivationId,
    rx: Option<CompletionReceiver>,
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(
        activation_id: ActivationId,
        rx: CompletionReceiver,
        unsubscribe: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            activation_id,
            rx: Some(rx),
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// A subscription which is closed from the start.
    pub fn closed(activation_id: ActivationId) -> Self {
        Self {
            activation_id,
            rx: None,
            unsubscribe: None,
        }
    }

    pub fn activation_id(&self) -> ActivationId {
        self.activation_id
    }

    /// Waits for the completion record. Returns `None` when the feed closed the
    /// subscription, and on every call after the record was received.
    ///
    /// Cancel safe: dropping the returned future keeps the subscription intact.
    pub async fn recv(&mut self) -> Option<Arc<ActivationRecord>> {
        let rx = self.rx.as_mut()?;
        let result = rx.await.ok();
        self.rx = None;
        result
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("activation_id", &self.activation_id)
            .field("open", &self.rx.is_some())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

type SubscriberId = u64;

#[derive(Default)]
struct Subscribers {
    next_subscriber_id: SubscriberId,
    closed: bool,
    // This map can be unbounded, because concurrency limits are enforced by the
    // controller in front of the waiters.
    waiting: HashMap<ActivationId, HashMap<SubscriberId, CompletionSender>>,
}

/// Process local [`CompletionFeed`], delivering records published on the same node.
///
/// Cloning returns a handle to the same feed.
#[derive(Clone, Default)]
pub struct LocalCompletionFeed {
    subscribers: Arc<Mutex<Subscribers>>,
}

impl LocalCompletionFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the feed: every outstanding subscription observes the closure and new
    /// subscriptions are closed from the start.
    pub fn close(&self) {
        let mut subscribers = self.subscribers.lock();
        subscribers.closed = true;
        // dropping the senders closes the receivers
        subscribers.waiting.clear();
        debug!("Completion feed closed");
    }

    /// Number of live subscriptions for `activation_id`.
    pub fn subscriber_count(&self, activation_id: ActivationId) -> usize {
        self.subscribers
            .lock()
            .waiting
            .get(&activation_id)
            .map_or(0, HashMap::len)
    }

    /// Number of activations with at least one live subscription.
    pub fn watched_activations(&self) -> usize {
        self.subscribers.lock().waiting.len()
    }

    fn unsubscribe(
        subscribers: &Weak<Mutex<Subscribers>>,
        activation_id: ActivationId,
        subscriber_id: SubscriberId,
    ) {
        let Some(subscribers) = subscribers.upgrade() else {
            return;
        };
        let mut subscribers = subscribers.lock();
        if let Some(waiting) = subscribers.waiting.get_mut(&activation_id) {
            waiting.remove(&subscriber_id);
            if waiting.is_empty() {
                subscribers.waiting.remove(&activation_id);
            }
        }
    }
}

impl CompletionFeed for LocalCompletionFeed {
    fn subscribe(&self, activation_id: ActivationId) -> Subscription {
        let mut subscribers = self.subscribers.lock();
        if subscribers.closed {
            return Subscription::closed(activation_id);
        }

        let subscriber_id = subscribers.next_subscriber_id;
        subscribers.next_subscriber_id += 1;

        let (tx, rx) = oneshot::channel();
        subscribers
            .waiting
            .entry(activation_id)
            .or_default()
            .insert(subscriber_id, tx);
        trace!(nimbus.activation.id = %activation_id, "Subscribed to completion");

        let weak_subscribers = Arc::downgrade(&self.subscribers);
        Subscription::new(activation_id, rx, move || {
            Self::unsubscribe(&weak_subscribers, activation_id, subscriber_id)
        })
    }
}

impl CompletionPublisher for LocalCompletionFeed {
    fn publish(&self, record: Arc<ActivationRecord>) -> usize {
        let activation_id = record.activation_id();
        let waiting = self.subscribers.lock().waiting.remove(&activation_id);

        let Some(waiting) = waiting else {
            debug!(
                nimbus.activation.id = %activation_id,
                "No subscriber waiting for the completion, dropping it"
            );
            return 0;
        };

        let mut notified = 0;
        for sender in waiting.into_values() {
            if sender.send(Arc::clone(&record)).is_ok() {
                notified += 1;
            } else {
                debug!(
                    nimbus.activation.id = %activation_id,
                    "Failed to deliver the completion because the subscription went away"
                );
            }
        }
        trace!(nimbus.activation.id = %activation_id, notified, "Published completion");
        notified
    }
}
