// Copyright (c) 2024 -  Nimbus developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use bytes::Bytes;
use http::{HeaderName, HeaderValue, Response, StatusCode, header};
use serde::Serialize;
use tracing::{info, trace, warn};

use nimbus_types::{ActivationId, ActivationRecord};

use crate::coordinator::InvocationResult;

/// Contains the string representation of the activation id
pub const X_NIMBUS_ACTIVATION_ID: HeaderName = HeaderName::from_static("x-nimbus-activation-id");
pub(crate) const APPLICATION_JSON: HeaderValue = HeaderValue::from_static("application/json");

const UNDETERMINED_MESSAGE: &str = "The activation result could not be determined.";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AcceptedResponse {
    activation_id: ActivationId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UndeterminedResponse {
    activation_id: ActivationId,
    error: &'static str,
}

/// Response to an invocation, as sent back to the client.
///
/// The body is always JSON. Formatting the same [`InvocationResult`] twice yields
/// byte-identical responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalResponse {
    status: StatusCode,
    activation_id: ActivationId,
    body: Bytes,
}

impl ExternalResponse {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Value of the [`X_NIMBUS_ACTIVATION_ID`] header.
    pub fn activation_id(&self) -> ActivationId {
        self.activation_id
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn into_http_response<B: From<Bytes>>(self) -> Response<B> {
        Response::builder()
            .status(self.status)
            .header(header::CONTENT_TYPE, APPLICATION_JSON)
            .header(X_NIMBUS_ACTIVATION_ID, self.activation_id.to_string())
            .body(self.body.into())
            .expect("status and headers are valid")
    }
}

pub struct ResponseFormatter;

impl ResponseFormatter {
    /// Shape an invocation outcome. `result_only` selects the result payload instead
    /// of the record for completed activations which did not fail on the platform side.
    ///
    /// Activation logs are never part of the response.
    pub fn format(result: &InvocationResult, result_only: bool) -> ExternalResponse {
        match result {
            InvocationResult::Accepted { activation_id }
            | InvocationResult::Pending { activation_id } => {
                trace!(nimbus.activation.id = %activation_id, "Reply with the activation id");
                Self::respond(
                    StatusCode::ACCEPTED,
                    *activation_id,
                    &AcceptedResponse {
                        activation_id: *activation_id,
                    },
                )
            }
            InvocationResult::Succeeded(record) | InvocationResult::ApplicationFailed(record) => {
                trace!(
                    nimbus.activation.id = %record.activation_id(),
                    result_only,
                    "Reply with the completed activation"
                );
                if result_only {
                    Self::respond(
                        StatusCode::OK,
                        record.activation_id(),
                        &record.result_json(),
                    )
                } else {
                    Self::respond_with_record(StatusCode::OK, record)
                }
            }
            InvocationResult::SystemFailed(record) => {
                info!(
                    nimbus.activation.id = %record.activation_id(),
                    "Reply with the activation failed by the platform"
                );
                Self::respond_with_record(StatusCode::INTERNAL_SERVER_ERROR, record)
            }
            InvocationResult::Undetermined {
                activation_id,
                error,
            } => {
                warn!(
                    nimbus.activation.id = %activation_id,
                    "Cannot determine the activation result: {error}"
                );
                Self::respond(
                    StatusCode::SERVICE_UNAVAILABLE,
                    *activation_id,
                    &UndeterminedResponse {
                        activation_id: *activation_id,
                        error: UNDETERMINED_MESSAGE,
                    },
                )
            }
        }
    }

    fn respond_with_record(status: StatusCode, record: &ActivationRecord) -> ExternalResponse {
        Self::respond(
            status,
            record.activation_id(),
            &record.extended().without_logs(),
        )
    }

    fn respond(
        status: StatusCode,
        activation_id: ActivationId,
        body: &impl Serialize,
    ) -> ExternalResponse {
        ExternalResponse {
            status,
            activation_id,
            body: Bytes::from(
                serde_json::to_vec(body).expect("Serializing the response body should not fail"),
            ),
        }
    }
}
