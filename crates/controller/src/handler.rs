// Copyright (c) 2023 -  Nimbus developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

mod error;
mod path_parsing;
#[cfg(test)]
mod tests;

use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use bytes::Bytes;
use futures::future::BoxFuture;
use http::{HeaderMap, HeaderName, Method, Request, Response};
use http_body_util::{BodyExt, Full};
use metrics::{counter, histogram};
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{Instrument, debug, info_span, warn};

use nimbus_completion::CompletionFeed;
use nimbus_storage_api::ActivationStore;
use nimbus_types::invocation::{ActionDescriptor, Identity};

use crate::ActivationDispatcher;
use crate::coordinator::InvocationCoordinator;
use crate::metric_definitions::{
    CONTROLLER_REQUEST_DURATION, CONTROLLER_REQUESTS, REQUEST_ADMITTED, REQUEST_COMPLETED,
    REQUEST_DENIED_THROTTLE,
};

pub(crate) use error::HandlerError;
use path_parsing::{ActionPath, DEFAULT_NAMESPACE, parse_invoke_options};

/// Invoking subject, as established by the authentication layer in front of the controller.
pub(crate) const X_NIMBUS_SUBJECT: HeaderName = HeaderName::from_static("x-nimbus-subject");

pub(crate) struct Handler<D, S, F> {
    coordinator: Arc<InvocationCoordinator<D, S, F>>,
    global_concurrency_semaphore: Arc<Semaphore>,
}

impl<D, S, F> Clone for Handler<D, S, F> {
    fn clone(&self) -> Self {
        Self {
            coordinator: Arc::clone(&self.coordinator),
            global_concurrency_semaphore: Arc::clone(&self.global_concurrency_semaphore),
        }
    }
}

impl<D, S, F> Handler<D, S, F> {
    pub(crate) fn new(
        coordinator: Arc<InvocationCoordinator<D, S, F>>,
        concurrency_limit: usize,
    ) -> Self {
        Self {
            coordinator,
            global_concurrency_semaphore: Arc::new(Semaphore::new(concurrency_limit)),
        }
    }
}

impl<D, S, F, B> tower::Service<Request<B>> for Handler<D, S, F>
where
    D: ActivationDispatcher + Send + Sync + 'static,
    S: ActivationStore + Send + Sync + 'static,
    F: CompletionFeed + Send + Sync + 'static,
    B: http_body::Body + Send + 'static,
    <B as http_body::Body>::Data: Send,
    <B as http_body::Body>::Error: std::error::Error + Send + Sync + 'static,
{
    type Response = Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        let handler = self.clone();
        Box::pin(async move { Ok(handler.handle(req).await) })
    }
}

impl<D, S, F> Handler<D, S, F>
where
    D: ActivationDispatcher + Send + Sync + 'static,
    S: ActivationStore + Send + Sync + 'static,
    F: CompletionFeed + Send + Sync + 'static,
{
    async fn handle<B>(self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: http_body::Body + Send + 'static,
        <B as http_body::Body>::Data: Send,
        <B as http_body::Body>::Error: std::error::Error + Send + Sync + 'static,
    {
        let start_time = Instant::now();

        let response = match self.handle_inner(req).await {
            Ok(response) => response,
            Err(err) => {
                debug!("Rejecting request: {err}");
                err.into_response()
            }
        };

        histogram!(CONTROLLER_REQUEST_DURATION).record(start_time.elapsed());
        counter!(
            CONTROLLER_REQUESTS,
            "status" => REQUEST_COMPLETED,
            "http.response.status_code" => response.status().as_u16().to_string()
        )
        .increment(1);

        response
    }

    async fn handle_inner<B>(self, req: Request<B>) -> Result<Response<Full<Bytes>>, HandlerError>
    where
        B: http_body::Body + Send + 'static,
        <B as http_body::Body>::Data: Send,
        <B as http_body::Body>::Error: std::error::Error + Send + Sync + 'static,
    {
        // Acquire the semaphore permit to check if we have available quota
        let Ok(_permit) = Arc::clone(&self.global_concurrency_semaphore).try_acquire_owned()
        else {
            warn!("No available quota to process the request");
            counter!(CONTROLLER_REQUESTS, "status" => REQUEST_DENIED_THROTTLE).increment(1);
            return Err(HandlerError::TooManyRequests);
        };

        // Register request admitted
        counter!(CONTROLLER_REQUESTS, "status" => REQUEST_ADMITTED).increment(1);

        let (parts, body) = req.into_parts();
        let path = ActionPath::from_uri(&parts.uri)?;
        if parts.method != Method::POST {
            return Err(HandlerError::MethodNotAllowed);
        }
        let options = parse_invoke_options(parts.uri.query())?;
        let subject = parse_subject(&parts.headers)?;

        let collected_request_bytes = body
            .collect()
            .await
            .map_err(|e| HandlerError::Body(e.into()))?
            .to_bytes();
        let parameters = parse_parameters(&collected_request_bytes)?;

        let namespace = if path.namespace == DEFAULT_NAMESPACE {
            subject.clone()
        } else {
            path.namespace
        };
        let identity = Identity::new(subject, namespace.clone());
        let action = ActionDescriptor::new(namespace, path.action).with_parameters(parameters);

        let invoke_span = info_span!(
            "invoke",
            nimbus.action = %action,
            nimbus.invoke.blocking = options.blocking,
            nimbus.invoke.result_only = options.result_only,
            enduser.id = %identity.subject,
        );

        let response = self
            .coordinator
            .invoke(action, identity, options)
            .instrument(invoke_span)
            .await
            .map_err(|err| {
                warn!("Cannot submit the activation: {err}");
                HandlerError::Unavailable
            })?;

        Ok(response.into_http_response())
    }
}

fn parse_subject(headers: &HeaderMap) -> Result<String, HandlerError> {
    let subject = headers
        .get(X_NIMBUS_SUBJECT)
        .ok_or(HandlerError::Unauthenticated)?
        .to_str()
        .map_err(|e| HandlerError::BadHeader(X_NIMBUS_SUBJECT, e))?;

    if subject.is_empty() {
        return Err(HandlerError::Unauthenticated);
    }
    Ok(subject.to_owned())
}

/// An empty body stands for no parameters.
fn parse_parameters(body: &Bytes) -> Result<Value, HandlerError> {
    if body.is_empty() {
        return Ok(Value::Object(Default::default()));
    }

    match serde_json::from_slice(body) {
        Ok(parameters @ Value::Object(_)) => Ok(parameters),
        Ok(other) => Err(HandlerError::BadParameters(format!(
            "got a JSON {}",
            json_type_name(&other)
        ))),
        Err(err) => Err(HandlerError::BadParameters(err.to_string())),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
