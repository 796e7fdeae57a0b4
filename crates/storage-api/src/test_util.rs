// Copyright (c) 2023 - 2025 Nimbus developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Store wrappers to exercise the error paths of store consumers.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::anyhow;
use parking_lot::Mutex;

use nimbus_types::{ActivationId, ActivationRecord};

use crate::{ActivationStore, Result, StorageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFault {
    /// Fails with a retryable [`StorageError::Unavailable`].
    Transient,
    /// Fails with a non retryable [`StorageError::Generic`].
    Permanent,
}

impl InjectedFault {
    fn into_error(self) -> StorageError {
        match self {
            InjectedFault::Transient => {
                StorageError::Unavailable(anyhow!("injected transient fault"))
            }
            InjectedFault::Permanent => StorageError::Generic(anyhow!("injected permanent fault")),
        }
    }
}

#[derive(Debug, Default)]
struct FaultState {
    scripted: Mutex<VecDeque<InjectedFault>>,
    sticky: Mutex<Option<InjectedFault>>,
    gets: AtomicUsize,
}

/// Wraps a store, counting lookups and failing them according to a script.
#[derive(Debug, Clone)]
pub struct FaultyActivationStore<S> {
    inner: S,
    state: Arc<FaultState>,
}

impl<S> FaultyActivationStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            state: Arc::default(),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Fail the next lookups, in order, with the given faults.
    pub fn fail_next_gets(&self, faults: impl IntoIterator<Item = InjectedFault>) {
        self.state.scripted.lock().extend(faults);
    }

    /// Fail every lookup after the scripted ones with `fault`.
    pub fn fail_all_gets(&self, fault: InjectedFault) {
        *self.state.sticky.lock() = Some(fault);
    }

    /// Number of lookups issued so far.
    pub fn gets(&self) -> usize {
        self.state.gets.load(Ordering::Relaxed)
    }

    fn next_fault(&self) -> Option<InjectedFault> {
        self.state
            .scripted
            .lock()
            .pop_front()
            .or(*self.state.sticky.lock())
    }
}

impl<S: ActivationStore + Sync> ActivationStore for FaultyActivationStore<S> {
    fn put(&self, record: Arc<ActivationRecord>) -> impl Future<Output = Result<()>> + Send {
        self.inner.put(record)
    }

    async fn get(&self, activation_id: ActivationId) -> Result<Option<Arc<ActivationRecord>>> {
        self.state.gets.fetch_add(1, Ordering::Relaxed);
        if let Some(fault) = self.next_fault() {
            return Err(fault.into_error());
        }
        self.inner.get(activation_id).await
    }

    fn delete(&self, activation_id: ActivationId) -> impl Future<Output = Result<()>> + Send {
        self.inner.delete(activation_id)
    }
}
