// Copyright (c) 2023 - 2025 Nimbus developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::future::Future;
use std::sync::Arc;

use nimbus_types::errors::MaybeRetryableError;
use nimbus_types::{ActivationId, ActivationRecord};

mod memory;
#[cfg(any(test, feature = "test-util"))]
pub mod test_util;

pub use memory::MemoryActivationStore;

/// Storage error
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("generic storage error: {0}")]
    Generic(#[from] anyhow::Error),
    #[error("storage is temporarily unavailable: {0}")]
    Unavailable(anyhow::Error),
    #[error("failed to convert activation record: {0}")]
    Conversion(anyhow::Error),
    #[error("operational error that can be caused during a graceful shutdown")]
    OperationalError,
    #[error("precondition failed: {0}")]
    PreconditionFailed(anyhow::Error),
}

/// The completion poller treats retryable errors like a missing record and keeps
/// polling; any other error ends the wait.
impl MaybeRetryableError for StorageError {
    fn retryable(&self) -> bool {
        match self {
            StorageError::Unavailable(_) | StorageError::OperationalError => true,
            StorageError::Generic(_)
            | StorageError::Conversion(_)
            | StorageError::PreconditionFailed(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Durable store of activation records, keyed by [`ActivationId`].
///
/// Implementations must be safe to share between many concurrent waiters.
pub trait ActivationStore {
    /// Persist a record. A record is stored exactly once: storing a second record
    /// under the same id fails with [`StorageError::PreconditionFailed`].
    fn put(&self, record: Arc<ActivationRecord>) -> impl Future<Output = Result<()>> + Send;

    /// Look up a record, `None` if it's not (yet) stored.
    fn get(
        &self,
        activation_id: ActivationId,
    ) -> impl Future<Output = Result<Option<Arc<ActivationRecord>>>> + Send;

    /// Delete a record. Deleting a missing record is not an error.
    fn delete(&self, activation_id: ActivationId) -> impl Future<Output = Result<()>> + Send;
}

impl<T: ActivationStore + Send + Sync> ActivationStore for Arc<T> {
    fn put(&self, record: Arc<ActivationRecord>) -> impl Future<Output = Result<()>> + Send {
        (**self).put(record)
    }

    fn get(
        &self,
        activation_id: ActivationId,
    ) -> impl Future<Output = Result<Option<Arc<ActivationRecord>>>> + Send {
        (**self).get(activation_id)
    }

    fn delete(&self, activation_id: ActivationId) -> impl Future<Output = Result<()>> + Send {
        (**self).delete(activation_id)
    }
}
