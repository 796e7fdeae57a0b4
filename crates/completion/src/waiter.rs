// Copyright (c) 2024 -  Nimbus developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt;
use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, histogram};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

use nimbus_storage_api::{ActivationStore, StorageError};
use nimbus_types::config::CompletionPollingOptions;
use nimbus_types::errors::MaybeRetryableError;
use nimbus_types::{ActivationId, ActivationRecord};

use crate::feed::{CompletionFeed, Subscription};
use crate::metric_definitions::{
    COMPLETION_POLL_ERRORS, COMPLETION_RESOLVED, COMPLETION_TIMEOUTS, COMPLETION_WAIT_DURATION,
    POLL_ERROR_PERMANENT, POLL_ERROR_RETRYABLE, SOURCE_FEED, SOURCE_POLLER,
};
use crate::slot::ResolveSlot;

const MIN_DEADLINE: Duration = Duration::from_millis(1);
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionSource {
    Feed,
    Poller,
}

impl CompletionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionSource::Feed => SOURCE_FEED,
            CompletionSource::Poller => SOURCE_POLLER,
        }
    }
}

impl fmt::Display for CompletionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a wait which did not fail.
#[derive(Debug, Clone)]
pub enum Completion {
    Completed {
        record: Arc<ActivationRecord>,
        source: CompletionSource,
    },
    /// The deadline elapsed first. The activation may still complete later.
    TimedOut,
}

impl Completion {
    pub fn record(&self) -> Option<&Arc<ActivationRecord>> {
        match self {
            Completion::Completed { record, .. } => Some(record),
            Completion::TimedOut => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("cannot look up the activation record: {0}")]
    Storage(#[from] StorageError),
    #[error("the completion feed closed and store polling is disabled")]
    FeedClosed,
}

/// Subscription taken before the activation is submitted, so that a completion
/// published right after the submission is not missed.
#[derive(Debug)]
pub struct PendingCompletion {
    subscription: Subscription,
}

impl PendingCompletion {
    pub fn activation_id(&self) -> ActivationId {
        self.subscription.activation_id()
    }
}

/// Waits for an activation record, racing the completion feed against periodic
/// lookups of the activation store, bounded by a deadline.
///
/// Whichever source yields the record first resolves the wait. Once a wait
/// returns, its feed subscription is released and its poller stopped.
#[derive(Debug, Clone)]
pub struct CompletionWaiter<S, F> {
    store: S,
    feed: F,
    poll_interval: Option<Duration>,
}

impl<S, F> CompletionWaiter<S, F>
where
    S: ActivationStore + Sync,
    F: CompletionFeed,
{
    /// `poll_interval` set to `None` disables store polling.
    pub fn new(store: S, feed: F, poll_interval: Option<Duration>) -> Self {
        Self {
            store,
            feed,
            poll_interval: poll_interval.map(|interval| interval.max(MIN_POLL_INTERVAL)),
        }
    }

    pub fn from_options(store: S, feed: F, options: &CompletionPollingOptions) -> Self {
        Self::new(store, feed, options.enabled.then(|| options.interval()))
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn prepare(&self, activation_id: ActivationId) -> PendingCompletion {
        PendingCompletion {
            subscription: self.feed.subscribe(activation_id),
        }
    }

    pub async fn wait(
        &self,
        activation_id: ActivationId,
        deadline: Duration,
    ) -> Result<Completion, CompletionError> {
        self.wait_prepared(self.prepare(activation_id), deadline)
            .await
    }

    pub async fn wait_prepared(
        &self,
        pending: PendingCompletion,
        deadline: Duration,
    ) -> Result<Completion, CompletionError> {
        let started = Instant::now();
        let activation_id = pending.activation_id();
        let deadline = deadline.max(MIN_DEADLINE);
        let mut subscription = pending.subscription;

        let poll_interval = self.effective_poll_interval(deadline);
        let mut polling = poll_interval.is_some();
        let mut poller = pin!(self.poll(activation_id, poll_interval.unwrap_or(deadline)));
        let mut feed_open = true;
        let mut timeout = pin!(tokio::time::sleep(deadline));

        let slot = ResolveSlot::new();
        let mut failure = None;

        while slot.is_waiting() {
            tokio::select! {
                biased;
                received = subscription.recv(), if feed_open => match received {
                    Some(record) => resolve(&slot, record, CompletionSource::Feed),
                    None if polling => {
                        feed_open = false;
                        debug!(
                            nimbus.activation.id = %activation_id,
                            "Completion feed closed, relying on store polling"
                        );
                    }
                    None => {
                        feed_open = false;
                        failure = Some(CompletionError::FeedClosed);
                        slot.cancel();
                    }
                },
                polled = &mut poller, if polling => {
                    polling = false;
                    match polled {
                        Ok(record) => resolve(&slot, record, CompletionSource::Poller),
                        Err(err) => {
                            failure = Some(CompletionError::Storage(err));
                            slot.cancel();
                        }
                    }
                },
                _ = &mut timeout => {
                    slot.cancel();
                },
            }
        }

        // unsubscribe before reporting
        drop(subscription);

        histogram!(COMPLETION_WAIT_DURATION).record(started.elapsed());
        if let Some(err) = failure {
            warn!(
                nimbus.activation.id = %activation_id,
                "Failed waiting for the activation to complete: {err}"
            );
            return Err(err);
        }

        Ok(match slot.take() {
            Some((record, source)) => Completion::Completed { record, source },
            None => {
                counter!(COMPLETION_TIMEOUTS).increment(1);
                debug!(
                    nimbus.activation.id = %activation_id,
                    "Activation did not complete within {:?}", deadline
                );
                Completion::TimedOut
            }
        })
    }

    /// Poll interval for a wait of `deadline`: at most a tenth of the deadline.
    fn effective_poll_interval(&self, deadline: Duration) -> Option<Duration> {
        self.poll_interval
            .map(|interval| interval.min(deadline / 10).max(MIN_POLL_INTERVAL))
    }

    async fn poll(
        &self,
        activation_id: ActivationId,
        interval: Duration,
    ) -> Result<Arc<ActivationRecord>, StorageError> {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // The first tick completes immediately, picking up records stored before the wait
            ticker.tick().await;
            match self.store.get(activation_id).await {
                Ok(Some(record)) => return Ok(record),
                Ok(None) => {
                    trace!(
                        nimbus.activation.id = %activation_id,
                        "Activation record not yet stored"
                    );
                }
                Err(err) if err.retryable() => {
                    counter!(COMPLETION_POLL_ERRORS, "kind" => POLL_ERROR_RETRYABLE).increment(1);
                    debug!(
                        nimbus.activation.id = %activation_id,
                        "Activation store lookup failed, retrying: {err}"
                    );
                }
                Err(err) => {
                    counter!(COMPLETION_POLL_ERRORS, "kind" => POLL_ERROR_PERMANENT).increment(1);
                    return Err(err);
                }
            }
        }
    }
}

fn resolve(
    slot: &ResolveSlot<(Arc<ActivationRecord>, CompletionSource)>,
    record: Arc<ActivationRecord>,
    source: CompletionSource,
) {
    let activation_id = record.activation_id();
    if slot.try_resolve((record, source)).is_ok() {
        counter!(COMPLETION_RESOLVED, "source" => source.as_str()).increment(1);
        debug!(nimbus.activation.id = %activation_id, %source, "Activation completed");
    } else {
        trace!(nimbus.activation.id = %activation_id, %source, "Ignoring late completion");
    }
}
