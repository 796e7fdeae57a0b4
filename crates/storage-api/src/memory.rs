// Copyright (c) 2023 - 2025 Nimbus developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use anyhow::anyhow;
use parking_lot::Mutex;
use tracing::trace;

use nimbus_types::{ActivationId, ActivationRecord};

use crate::{ActivationStore, Result, StorageError};

/// In-memory [`ActivationStore`]. Cloning returns a handle to the same store.
#[derive(Debug, Clone, Default)]
pub struct MemoryActivationStore {
    records: Arc<Mutex<HashMap<ActivationId, Arc<ActivationRecord>>>>,
}

impl MemoryActivationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl ActivationStore for MemoryActivationStore {
    fn put(&self, record: Arc<ActivationRecord>) -> impl Future<Output = Result<()>> + Send {
        let activation_id = record.activation_id();
        let result = {
            let mut records = self.records.lock();
            if records.contains_key(&activation_id) {
                Err(StorageError::PreconditionFailed(anyhow!(
                    "activation {activation_id} is already stored"
                )))
            } else {
                records.insert(activation_id, record);
                Ok(())
            }
        };
        trace!(nimbus.activation.id = %activation_id, ok = result.is_ok(), "Put activation record");
        std::future::ready(result)
    }

    fn get(
        &self,
        activation_id: ActivationId,
    ) -> impl Future<Output = Result<Option<Arc<ActivationRecord>>>> + Send {
        std::future::ready(Ok(self.records.lock().get(&activation_id).cloned()))
    }

    fn delete(&self, activation_id: ActivationId) -> impl Future<Output = Result<()>> + Send {
        let removed = self.records.lock().remove(&activation_id).is_some();
        trace!(nimbus.activation.id = %activation_id, removed, "Delete activation record");
        std::future::ready(Ok(()))
    }
}
