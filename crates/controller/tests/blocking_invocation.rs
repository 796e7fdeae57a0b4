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

use googletest::prelude::*;
use http::StatusCode;
use serde_json::{Value, json};
use test_log::test;

use nimbus_completion::{CompletionWaiter, LocalCompletionFeed, complete_activation};
use nimbus_controller::{
    ActivationDispatcher, DispatchError, ExternalResponse, InvocationCoordinator, InvokeOptions,
};
use nimbus_storage_api::{ActivationStore, MemoryActivationStore};
use nimbus_test_util::matchers::json_decoded;
use nimbus_test_util::{assert, assert_eq};
use nimbus_types::invocation::{ActionDescriptor, ActivationRequest, Identity};
use nimbus_types::{ActivationId, ActivationRecord, ActivationResponse};

/// Execution path running every activation in process, with a fixed response.
#[derive(Clone)]
struct InProcessExecutor {
    store: MemoryActivationStore,
    feed: LocalCompletionFeed,
    response: Option<ActivationResponse>,
    logs: Vec<String>,
    assigned_id: Option<ActivationId>,
}

impl InProcessExecutor {
    fn new(response: Option<ActivationResponse>) -> Self {
        Self {
            store: MemoryActivationStore::new(),
            feed: LocalCompletionFeed::new(),
            response,
            logs: Vec::new(),
            assigned_id: None,
        }
    }

    fn with_logs(mut self, logs: Vec<String>) -> Self {
        self.logs = logs;
        self
    }

    fn coordinator(
        &self,
        blocking_wait: Duration,
    ) -> InvocationCoordinator<Self, MemoryActivationStore, LocalCompletionFeed> {
        InvocationCoordinator::new(
            self.clone(),
            CompletionWaiter::new(
                self.store.clone(),
                self.feed.clone(),
                Some(Duration::from_millis(100)),
            ),
            blocking_wait,
        )
    }
}

impl ActivationDispatcher for InProcessExecutor {
    async fn submit(
        &self,
        request: Arc<ActivationRequest>,
    ) -> std::result::Result<ActivationId, DispatchError> {
        let activation_id = self.assigned_id.unwrap_or(request.activation_id);

        if let Some(response) = self.response.clone() {
            let record = if self.logs.is_empty() {
                ActivationRecord::mock(activation_id, response)
            } else {
                ActivationRecord::mock_with_logs(activation_id, response, self.logs.clone())
            };
            let store = self.store.clone();
            let feed = self.feed.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                complete_activation(&store, &feed, Arc::new(record))
                    .await
                    .unwrap();
            });
        }

        Ok(activation_id)
    }
}

fn hello() -> ActionDescriptor {
    ActionDescriptor::new("guest", "hello")
}

fn guest() -> Identity {
    Identity::new("guest", "guest")
}

fn body_json(response: &ExternalResponse) -> Value {
    serde_json::from_slice(response.body()).unwrap()
}

#[test(tokio::test(start_paused = true))]
async fn blocking_success_returns_record_without_logs() {
    let executor = InProcessExecutor::new(Some(ActivationResponse::success(json!({"test": "yes"}))))
        .with_logs(vec!["2024-01-01T00:00:00.000Z stdout: hello".to_owned()]);
    let coordinator = executor.coordinator(Duration::from_secs(60));

    let response = coordinator
        .invoke(hello(), guest(), InvokeOptions::blocking())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let stored = executor
        .store
        .get(response.activation_id())
        .await
        .unwrap()
        .unwrap();
    // the stored record keeps its logs, the response does not
    assert_that!(stored.logs().len(), eq(1));
    assert_eq!(body_json(&response), stored.without_logs().to_extended_json());
    assert_eq!(body_json(&response)["response"]["result"], json!({"test": "yes"}));
}

#[test(tokio::test(start_paused = true))]
async fn blocking_result_only_for_existing_record() {
    let activation_id = ActivationId::generate();
    let mut executor = InProcessExecutor::new(None);
    executor.assigned_id = Some(activation_id);
    executor
        .store
        .put(Arc::new(ActivationRecord::mock(
            activation_id,
            ActivationResponse::success(json!({"test": "yes"})),
        )))
        .await
        .unwrap();
    let coordinator = executor.coordinator(Duration::from_secs(60));

    let response = coordinator
        .invoke(
            hello(),
            guest(),
            InvokeOptions::blocking().with_result_only(true),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.activation_id(), activation_id);
    assert_that!(response.body().clone(), json_decoded(eq(json!({"test": "yes"}))));

    let http_response = response.into_http_response::<bytes::Bytes>();
    assert_eq!(
        http_response.headers()[nimbus_controller::X_NIMBUS_ACTIVATION_ID],
        activation_id.to_string()
    );
}

#[test(tokio::test(start_paused = true))]
async fn blocking_system_error() {
    let executor = InProcessExecutor::new(Some(ActivationResponse::system_error("test")));
    let coordinator = executor.coordinator(Duration::from_secs(60));

    let response = coordinator
        .invoke(hello(), guest(), InvokeOptions::blocking())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(&response);
    assert_eq!(body["activationId"], json!(response.activation_id().to_string()));
    assert_eq!(body["response"]["result"], json!({"error": "test"}));
}

#[test(tokio::test(start_paused = true))]
async fn blocking_wait_elapses_without_record() {
    let executor = InProcessExecutor::new(None);
    let coordinator = executor.coordinator(Duration::from_secs(2));
    let started = tokio::time::Instant::now();

    let response = coordinator
        .invoke(hello(), guest(), InvokeOptions::blocking())
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_secs(2));
    assert!(started.elapsed() <= Duration::from_millis(2100));
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(
        body_json(&response),
        json!({"activationId": response.activation_id().to_string()})
    );
    assert!(executor.store.is_empty());
}

#[test(tokio::test(start_paused = true))]
async fn formatting_is_stable() {
    let executor = InProcessExecutor::new(Some(ActivationResponse::application_error(
        json!({"error": "no name"}),
    )));
    let coordinator = executor.coordinator(Duration::from_secs(60));

    let response = coordinator
        .invoke(hello(), guest(), InvokeOptions::blocking())
        .await
        .unwrap();
    let record = executor
        .store
        .get(response.activation_id())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let again = nimbus_controller::ResponseFormatter::format(
        &nimbus_controller::InvocationResult::ApplicationFailed(record),
        false,
    );
    assert_eq!(again, response);
}
