// Copyright (c) 2023 - 2025 Nimbus developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

mod coordinator;
mod formatter;
mod handler;
mod metric_definitions;
mod server;
mod tracing_setup;

pub use coordinator::{InvocationCoordinator, InvocationResult, InvokeOptions};
pub use formatter::{ExternalResponse, ResponseFormatter, X_NIMBUS_ACTIVATION_ID};
pub use server::{ControllerServer, ControllerServerError, StartSignal};
pub use tracing_setup::{TracingError, init_tracing};

use std::future::Future;
use std::sync::Arc;

use nimbus_types::ActivationId;
use nimbus_types::invocation::ActivationRequest;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("execution path is unavailable: {0}")]
    Unavailable(anyhow::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Hands activations over to the execution path.
pub trait ActivationDispatcher {
    /// Submit the activation for asynchronous execution.
    ///
    /// Resolves once the execution path accepted the request, with the id the
    /// activation record will be stored under. This is the requested id unless
    /// the execution path assigns its own.
    fn submit(
        &self,
        request: Arc<ActivationRequest>,
    ) -> impl Future<Output = Result<ActivationId, DispatchError>> + Send;
}

impl<T: ActivationDispatcher + Send + Sync> ActivationDispatcher for Arc<T> {
    fn submit(
        &self,
        request: Arc<ActivationRequest>,
    ) -> impl Future<Output = Result<ActivationId, DispatchError>> + Send {
        (**self).submit(request)
    }
}

// Contains some mocks we use in unit tests in this crate
#[cfg(test)]
mod mocks {
    use super::*;

    use std::time::Duration;

    use anyhow::anyhow;
    use parking_lot::Mutex;

    use nimbus_completion::{CompletionWaiter, LocalCompletionFeed, complete_activation};
    use nimbus_storage_api::MemoryActivationStore;
    use nimbus_types::ActivationRecord;

    pub(crate) type TestCoordinator =
        InvocationCoordinator<MockDispatcher, MemoryActivationStore, LocalCompletionFeed>;

    type Executor = dyn Fn(&ActivationRequest) -> Option<ActivationRecord> + Send + Sync;

    /// Dispatcher completing activations in process, through its own store and feed,
    /// after a configurable delay.
    #[derive(Clone)]
    pub(crate) struct MockDispatcher {
        store: MemoryActivationStore,
        feed: LocalCompletionFeed,
        executor: Arc<Executor>,
        delay: Duration,
        assigned_id: Option<ActivationId>,
        unavailable: bool,
        submitted: Arc<Mutex<Vec<Arc<ActivationRequest>>>>,
    }

    impl MockDispatcher {
        pub(crate) fn new<E>(executor: E) -> Self
        where
            E: Fn(&ActivationRequest) -> Option<ActivationRecord> + Send + Sync + 'static,
        {
            Self {
                store: MemoryActivationStore::new(),
                feed: LocalCompletionFeed::new(),
                executor: Arc::new(executor),
                delay: Duration::from_millis(10),
                assigned_id: None,
                unavailable: false,
                submitted: Arc::default(),
            }
        }

        /// Store the execution path writes the activation records to.
        pub(crate) fn store(&self) -> &MemoryActivationStore {
            &self.store
        }

        /// Feed the execution path publishes the completions on.
        pub(crate) fn feed(&self) -> &LocalCompletionFeed {
            &self.feed
        }

        pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        /// Reply to every submission with `activation_id` instead of the requested one.
        pub(crate) fn with_assigned_id(mut self, activation_id: ActivationId) -> Self {
            self.assigned_id = Some(activation_id);
            self
        }

        pub(crate) fn unavailable(mut self) -> Self {
            self.unavailable = true;
            self
        }

        pub(crate) fn submitted(&self) -> Vec<Arc<ActivationRequest>> {
            self.submitted.lock().clone()
        }
    }

    impl ActivationDispatcher for MockDispatcher {
        async fn submit(
            &self,
            request: Arc<ActivationRequest>,
        ) -> Result<ActivationId, DispatchError> {
            if self.unavailable {
                return Err(DispatchError::Unavailable(anyhow!("no invoker available")));
            }
            self.submitted.lock().push(Arc::clone(&request));

            if let Some(record) = (self.executor)(&request) {
                let store = self.store.clone();
                let feed = self.feed.clone();
                let delay = self.delay;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = complete_activation(&store, &feed, Arc::new(record)).await;
                });
            }

            Ok(self.assigned_id.unwrap_or(request.activation_id))
        }
    }

    pub(crate) fn coordinator(dispatcher: MockDispatcher) -> TestCoordinator {
        let waiter = CompletionWaiter::new(
            dispatcher.store().clone(),
            dispatcher.feed().clone(),
            Some(Duration::from_millis(100)),
        );
        InvocationCoordinator::new(dispatcher, waiter, Duration::from_secs(60))
    }
}
