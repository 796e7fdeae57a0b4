// Copyright (c) 2024 -  Nimbus developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Completion of blocking activations.
//!
//! A finished activation is both persisted in the [`ActivationStore`] and published
//! on a [`CompletionFeed`]. The [`CompletionWaiter`] listens on both and hands back
//! whichever arrives first, within a deadline.

mod feed;
pub mod metric_definitions;
mod slot;
mod waiter;

use std::sync::Arc;

use nimbus_storage_api::{ActivationStore, StorageError};
use nimbus_types::ActivationRecord;

pub use feed::{
    CompletionFeed, CompletionPublisher, CompletionReceiver, CompletionSender,
    LocalCompletionFeed, Subscription,
};
pub use slot::ResolveSlot;
pub use waiter::{
    Completion, CompletionError, CompletionSource, CompletionWaiter, PendingCompletion,
};

/// Records the completion of an activation: stores the record, then notifies the
/// waiters subscribed to it. Returns the number of notified waiters.
///
/// The record is stored first, so a waiter that misses the notification still
/// finds it by polling.
pub async fn complete_activation<S, P>(
    store: &S,
    publisher: &P,
    record: Arc<ActivationRecord>,
) -> Result<usize, StorageError>
where
    S: ActivationStore,
    P: CompletionPublisher,
{
    store.put(Arc::clone(&record)).await?;
    Ok(publisher.publish(record))
}
