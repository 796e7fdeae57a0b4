// Copyright (c) 2024 -  Nimbus developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use super::Handler;
use super::X_NIMBUS_SUBJECT;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use googletest::prelude::*;
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Empty, Full};
use nimbus_completion::CompletionWaiter;
use nimbus_test_util::matchers::json_decoded;
use nimbus_test_util::{assert, assert_eq};
use nimbus_types::invocation::ActivationRequest;
use nimbus_types::{ActivationId, ActivationRecord, ActivationResponse};
use serde_json::{Value, json};
use tower::ServiceExt;
use test_log::test;

use crate::coordinator::InvocationCoordinator;
use crate::formatter::X_NIMBUS_ACTIVATION_ID;
use crate::mocks::{MockDispatcher, coordinator};

const INVOKE_HELLO: &str = "http://localhost/namespaces/guest/actions/hello";

fn greeting(request: &ActivationRequest) -> Option<ActivationRecord> {
    let name = request.action.parameters["name"]
        .as_str()
        .unwrap_or("stranger")
        .to_owned();
    Some(ActivationRecord::mock_with_logs(
        request.activation_id,
        ActivationResponse::success(json!({"greeting": format!("Hello {name}!")})),
        vec!["2024-01-01T00:00:00.000Z stdout: saying hello".to_owned()],
    ))
}

fn invoke_request(uri: &str, body: Value) -> Request<Full<Bytes>> {
    Request::builder()
        .uri(uri)
        .method(Method::POST)
        .header("content-type", "application/json")
        .header(X_NIMBUS_SUBJECT, "guest")
        .body(Full::new(Bytes::from(serde_json::to_vec(&body).unwrap())))
        .unwrap()
}

async fn handle_with<B>(
    req: Request<B>,
    dispatcher: MockDispatcher,
    limit: usize,
) -> Response<Full<Bytes>>
where
    B: http_body::Body + Send + 'static,
    <B as http_body::Body>::Data: Send,
    <B as http_body::Body>::Error: std::error::Error + Send + Sync + 'static,
{
    let coordinator = Arc::new(coordinator(dispatcher));

    Handler::new(coordinator, limit).oneshot(req).await.unwrap()
}

async fn handle<B>(req: Request<B>) -> Response<Full<Bytes>>
where
    B: http_body::Body + Send + 'static,
    <B as http_body::Body>::Data: Send,
    <B as http_body::Body>::Error: std::error::Error + Send + Sync + 'static,
{
    handle_with(req, MockDispatcher::new(greeting), usize::MAX >> 3).await
}

async fn body_bytes(response: Response<Full<Bytes>>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn activation_id_header(response: &Response<Full<Bytes>>) -> ActivationId {
    response
        .headers()
        .get(X_NIMBUS_ACTIVATION_ID)
        .expect("activation id header")
        .to_str()
        .unwrap()
        .parse()
        .unwrap()
}

#[test(tokio::test(start_paused = true))]
async fn blocking_invoke() {
    let req = invoke_request(&format!("{INVOKE_HELLO}?blocking=true"), json!({"name": "Nimbus"}));

    let response = handle(req).await;

    assert_eq!(response.status(), StatusCode::OK);
    let activation_id = activation_id_header(&response);
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["activationId"], json!(activation_id.to_string()));
    assert_eq!(body["namespace"], json!("guest"));
    assert_eq!(body["response"]["status"], json!("success"));
    assert_eq!(body["response"]["success"], json!(true));
    assert_eq!(
        body["response"]["result"],
        json!({"greeting": "Hello Nimbus!"})
    );
    // logs are stripped from blocking responses
    assert!(body.get("logs").is_none());
}

#[test(tokio::test(start_paused = true))]
async fn blocking_invoke_result_only() {
    let req = invoke_request(
        &format!("{INVOKE_HELLO}?blocking=true&result=true"),
        json!({"name": "Nimbus"}),
    );

    let response = handle(req).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(X_NIMBUS_ACTIVATION_ID));
    assert_that!(
        body_bytes(response).await,
        json_decoded(eq(json!({"greeting": "Hello Nimbus!"})))
    );
}

#[test(tokio::test(start_paused = true))]
async fn non_blocking_invoke() {
    let req = invoke_request(INVOKE_HELLO, json!({}));

    let response = handle(req).await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let activation_id = activation_id_header(&response);
    assert_that!(
        body_bytes(response).await,
        json_decoded(eq(json!({"activationId": activation_id.to_string()})))
    );
}

#[test(tokio::test(start_paused = true))]
async fn blocking_invoke_system_error() {
    let req = invoke_request(&format!("{INVOKE_HELLO}?blocking=true"), json!({}));

    let response = handle_with(
        req,
        MockDispatcher::new(|request| {
            Some(ActivationRecord::mock(
                request.activation_id,
                ActivationResponse::system_error("test"),
            ))
        }),
        usize::MAX >> 3,
    )
    .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let activation_id = activation_id_header(&response);
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["activationId"], json!(activation_id.to_string()));
    assert_eq!(body["response"]["result"], json!({"error": "test"}));
}

#[test(tokio::test(start_paused = true))]
async fn empty_body_means_no_parameters() {
    let req = Request::builder()
        .uri(format!("{INVOKE_HELLO}?blocking=true&result=true"))
        .method(Method::POST)
        .header(X_NIMBUS_SUBJECT, "guest")
        .body(Empty::<Bytes>::default())
        .unwrap();

    let response = handle(req).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_that!(
        body_bytes(response).await,
        json_decoded(eq(json!({"greeting": "Hello stranger!"})))
    );
}

#[test(tokio::test(start_paused = true))]
async fn default_namespace_resolves_to_subject() {
    let dispatcher = MockDispatcher::new(|_| None);
    let submitted = dispatcher.clone();
    let req = invoke_request("http://localhost/namespaces/_/actions/hello", json!({}));

    let response = handle_with(req, dispatcher, usize::MAX >> 3).await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let submitted = submitted.submitted();
    assert_that!(submitted.len(), eq(1));
    assert_eq!(submitted[0].action.namespace, "guest");
    assert_eq!(submitted[0].identity.subject, "guest");
    assert!(!submitted[0].blocking);
}

#[test(tokio::test)]
async fn missing_subject() {
    let req = Request::builder()
        .uri(INVOKE_HELLO)
        .method(Method::POST)
        .body(Empty::<Bytes>::default())
        .unwrap();

    let response = handle(req).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_that!(
        body_bytes(response).await,
        json_decoded(eq(json!({"message": "missing the invoking subject"})))
    );
}

#[test(tokio::test)]
async fn invoke_with_get() {
    let req = Request::builder()
        .uri(INVOKE_HELLO)
        .method(Method::GET)
        .header(X_NIMBUS_SUBJECT, "guest")
        .body(Empty::<Bytes>::default())
        .unwrap();

    let response = handle(req).await;

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[test(tokio::test)]
async fn unknown_path() {
    let req = invoke_request("http://localhost/namespaces/guest/rules/r", json!({}));

    let response = handle(req).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[test(tokio::test)]
async fn bad_blocking_flag() {
    let req = invoke_request(&format!("{INVOKE_HELLO}?blocking=maybe"), json!({}));

    let response = handle(req).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[test(tokio::test)]
async fn parameters_must_be_an_object() {
    let req = invoke_request(INVOKE_HELLO, json!(["Nimbus"]));

    let response = handle(req).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_that!(
        body_bytes(response).await,
        json_decoded(eq(json!({
            "message": "bad parameters, expected a JSON object: got a JSON array"
        })))
    );
}

#[test(tokio::test)]
async fn dispatcher_unavailable() {
    let req = invoke_request(&format!("{INVOKE_HELLO}?blocking=true"), json!({}));

    let response = handle_with(
        req,
        MockDispatcher::new(greeting).unavailable(),
        usize::MAX >> 3,
    )
    .await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(!response.headers().contains_key(X_NIMBUS_ACTIVATION_ID));
}

#[test(tokio::test)]
async fn concurrency_limit_exceeded() {
    let req = invoke_request(INVOKE_HELLO, json!({}));

    let response = handle_with(req, MockDispatcher::new(greeting), 0).await;

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[test(tokio::test(start_paused = true))]
async fn blocking_invoke_times_out() {
    let dispatcher = MockDispatcher::new(|_| None);
    let waiter = CompletionWaiter::new(
        dispatcher.store().clone(),
        dispatcher.feed().clone(),
        Some(Duration::from_millis(100)),
    );
    let coordinator = Arc::new(InvocationCoordinator::new(
        dispatcher,
        waiter,
        Duration::from_secs(5),
    ));
    let req = invoke_request(&format!("{INVOKE_HELLO}?blocking=true"), json!({}));

    let response = Handler::new(coordinator, 10).oneshot(req).await.unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let activation_id = activation_id_header(&response);
    let body: Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body, json!({"activationId": activation_id.to_string()}));
}
