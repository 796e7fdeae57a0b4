// Copyright (c) 2024 -  Nimbus developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tracing::{debug, info, warn};

use nimbus_completion::{Completion, CompletionError, CompletionFeed, CompletionWaiter};
use nimbus_storage_api::ActivationStore;
use nimbus_types::config::ControllerOptions;
use nimbus_types::invocation::{ActionDescriptor, ActivationRequest, Identity};
use nimbus_types::{ActivationId, ActivationRecord, ActivationResponse};

use crate::formatter::{ExternalResponse, ResponseFormatter};
use crate::metric_definitions::{
    CONTROLLER_INVOCATIONS, INVOCATION_ACCEPTED, INVOCATION_APPLICATION_ERROR,
    INVOCATION_PENDING, INVOCATION_SUCCESS, INVOCATION_SYSTEM_ERROR, INVOCATION_UNDETERMINED,
    MODE_BLOCKING, MODE_NON_BLOCKING,
};
use crate::{ActivationDispatcher, DispatchError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvokeOptions {
    /// Wait for the activation to complete, up to the blocking wait.
    pub blocking: bool,
    /// Reply with the activation result only, rather than the whole record.
    pub result_only: bool,
}

impl InvokeOptions {
    pub fn blocking() -> Self {
        Self {
            blocking: true,
            result_only: false,
        }
    }

    pub fn non_blocking() -> Self {
        Self::default()
    }

    pub fn with_result_only(mut self, result_only: bool) -> Self {
        self.result_only = result_only;
        self
    }
}

/// Outcome of an invocation, before it is shaped into an [`ExternalResponse`].
#[derive(Debug)]
pub enum InvocationResult {
    /// Non-blocking invocation, accepted for execution.
    Accepted { activation_id: ActivationId },
    Succeeded(Arc<ActivationRecord>),
    /// The action ran and reported an error.
    ApplicationFailed(Arc<ActivationRecord>),
    /// The platform failed to run the action.
    SystemFailed(Arc<ActivationRecord>),
    /// Blocking invocation which did not complete within the blocking wait.
    Pending { activation_id: ActivationId },
    /// Blocking invocation whose outcome cannot be looked up.
    Undetermined {
        activation_id: ActivationId,
        error: CompletionError,
    },
}

impl InvocationResult {
    fn from_record(record: Arc<ActivationRecord>) -> Self {
        match record.response() {
            ActivationResponse::Success(_) => InvocationResult::Succeeded(record),
            ActivationResponse::ApplicationError(_) => InvocationResult::ApplicationFailed(record),
            ActivationResponse::SystemError(_) => InvocationResult::SystemFailed(record),
        }
    }

    pub fn activation_id(&self) -> ActivationId {
        match self {
            InvocationResult::Accepted { activation_id }
            | InvocationResult::Pending { activation_id }
            | InvocationResult::Undetermined { activation_id, .. } => *activation_id,
            InvocationResult::Succeeded(record)
            | InvocationResult::ApplicationFailed(record)
            | InvocationResult::SystemFailed(record) => record.activation_id(),
        }
    }

    pub fn record(&self) -> Option<&Arc<ActivationRecord>> {
        match self {
            InvocationResult::Succeeded(record)
            | InvocationResult::ApplicationFailed(record)
            | InvocationResult::SystemFailed(record) => Some(record),
            InvocationResult::Accepted { .. }
            | InvocationResult::Pending { .. }
            | InvocationResult::Undetermined { .. } => None,
        }
    }

    fn metric_label(&self) -> &'static str {
        match self {
            InvocationResult::Accepted { .. } => INVOCATION_ACCEPTED,
            InvocationResult::Succeeded(_) => INVOCATION_SUCCESS,
            InvocationResult::ApplicationFailed(_) => INVOCATION_APPLICATION_ERROR,
            InvocationResult::SystemFailed(_) => INVOCATION_SYSTEM_ERROR,
            InvocationResult::Pending { .. } => INVOCATION_PENDING,
            InvocationResult::Undetermined { .. } => INVOCATION_UNDETERMINED,
        }
    }
}

/// Submits invocations to the execution path and, for blocking ones, waits for
/// their completion.
///
/// The coordinator never writes activation records: the execution path stores
/// them, also for activations whose blocking wait elapsed.
#[derive(Debug)]
pub struct InvocationCoordinator<D, S, F> {
    dispatcher: D,
    waiter: CompletionWaiter<S, F>,
    blocking_wait: Duration,
}

impl<D, S, F> InvocationCoordinator<D, S, F>
where
    D: ActivationDispatcher + Sync,
    S: ActivationStore + Sync,
    F: CompletionFeed + Sync,
{
    pub fn new(dispatcher: D, waiter: CompletionWaiter<S, F>, blocking_wait: Duration) -> Self {
        Self {
            dispatcher,
            waiter,
            blocking_wait,
        }
    }

    pub fn from_options(options: &ControllerOptions, dispatcher: D, store: S, feed: F) -> Self {
        Self::new(
            dispatcher,
            CompletionWaiter::from_options(store, feed, &options.completion_polling),
            options.blocking_wait(),
        )
    }

    pub fn blocking_wait(&self) -> Duration {
        self.blocking_wait
    }

    /// Invoke the action and shape the outcome into the response for the client.
    pub async fn invoke(
        &self,
        action: ActionDescriptor,
        identity: Identity,
        options: InvokeOptions,
    ) -> Result<ExternalResponse, DispatchError> {
        let result = self.execute(action, identity, options.blocking).await?;
        Ok(ResponseFormatter::format(&result, options.result_only))
    }

    /// Submit the activation and, if `blocking`, wait for it to complete.
    pub async fn execute(
        &self,
        action: ActionDescriptor,
        identity: Identity,
        blocking: bool,
    ) -> Result<InvocationResult, DispatchError> {
        let request = Arc::new(ActivationRequest::new(action, identity, blocking));
        let mode = if blocking {
            MODE_BLOCKING
        } else {
            MODE_NON_BLOCKING
        };

        // Subscribe before submitting, the activation may complete before submit returns
        let pending = blocking.then(|| self.waiter.prepare(request.activation_id));

        let activation_id = match self.dispatcher.submit(Arc::clone(&request)).await {
            Ok(activation_id) => activation_id,
            Err(err) => {
                warn!(
                    nimbus.activation.id = %request.activation_id,
                    "Failed to submit the activation: {err}"
                );
                return Err(err);
            }
        };
        debug!(
            nimbus.activation.id = %activation_id,
            nimbus.action = %request.action,
            "Submitted activation"
        );

        let result = match pending {
            None => InvocationResult::Accepted { activation_id },
            Some(pending) => {
                let pending = if pending.activation_id() == activation_id {
                    pending
                } else {
                    debug!(
                        nimbus.activation.id = %activation_id,
                        "Execution path assigned a different activation id"
                    );
                    drop(pending);
                    self.waiter.prepare(activation_id)
                };

                match self.waiter.wait_prepared(pending, self.blocking_wait).await {
                    Ok(Completion::Completed { record, .. }) => {
                        InvocationResult::from_record(record)
                    }
                    Ok(Completion::TimedOut) => {
                        info!(
                            nimbus.activation.id = %activation_id,
                            "Activation still running after {:?}, replying with the activation id",
                            self.blocking_wait
                        );
                        InvocationResult::Pending { activation_id }
                    }
                    Err(error) => InvocationResult::Undetermined {
                        activation_id,
                        error,
                    },
                }
            }
        };

        counter!(CONTROLLER_INVOCATIONS, "mode" => mode, "outcome" => result.metric_label())
            .increment(1);
        Ok(result)
    }
}
