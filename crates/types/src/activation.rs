// Copyright (c) 2023 - 2025 Nimbus developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Activation records and their JSON projections.
//!
//! An [`ActivationRecord`] is created exactly once, when an invocation finishes, and is
//! never mutated afterwards. Components share it as `Arc<ActivationRecord>`.
//!
//! The JSON shape of a record (the _extended JSON_) is:
//!
//! ```json
//! {
//!   "activationId": "9e1c0a7b3f0e4d6a8c5b2d1e0f9a8b7c",
//!   "namespace": "guest",
//!   "name": "hello",
//!   "subject": "guest",
//!   "start": 1700000000000,
//!   "end": 1700000000042,
//!   "duration": 42,
//!   "response": { "status": "success", "statusCode": 0, "success": true, "result": {} },
//!   "logs": ["..."]
//! }
//! ```
//!
//! `logs` is omitted when the record has no logs, which is always the case for the
//! logs-stripped projection.

use std::time::Duration;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::identifiers::ActivationId;
use crate::time::MillisSinceEpoch;

pub const STATUS_CODE_SUCCESS: u8 = 0;
pub const STATUS_CODE_APPLICATION_ERROR: u8 = 1;
pub const STATUS_CODE_SYSTEM_ERROR: u8 = 2;

/// Outcome of an activation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "ActivationResponseRepr")]
pub enum ActivationResponse {
    /// The action ran and returned `result`.
    Success(Value),
    /// The action ran but reported a business-logic failure, described by `result`.
    ApplicationError(Value),
    /// The platform failed to complete the invocation.
    SystemError(String),
}

impl ActivationResponse {
    pub fn success(result: Value) -> Self {
        ActivationResponse::Success(result)
    }

    pub fn application_error(result: Value) -> Self {
        ActivationResponse::ApplicationError(result)
    }

    pub fn system_error(message: impl Into<String>) -> Self {
        ActivationResponse::SystemError(message.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ActivationResponse::Success(_))
    }

    pub fn is_system_error(&self) -> bool {
        matches!(self, ActivationResponse::SystemError(_))
    }

    pub fn status(&self) -> &'static str {
        match self {
            ActivationResponse::Success(_) => "success",
            ActivationResponse::ApplicationError(_) => "application error",
            ActivationResponse::SystemError(_) => "internal error",
        }
    }

    pub fn status_code(&self) -> u8 {
        match self {
            ActivationResponse::Success(_) => STATUS_CODE_SUCCESS,
            ActivationResponse::ApplicationError(_) => STATUS_CODE_APPLICATION_ERROR,
            ActivationResponse::SystemError(_) => STATUS_CODE_SYSTEM_ERROR,
        }
    }

    /// The result-only JSON projection of this response.
    ///
    /// For a system error this is `{"error": message}`.
    pub fn result_json(&self) -> Value {
        match self {
            ActivationResponse::Success(result) | ActivationResponse::ApplicationError(result) => {
                result.clone()
            }
            ActivationResponse::SystemError(message) => {
                serde_json::json!({ "error": message })
            }
        }
    }
}

#[derive(Serialize)]
struct SystemErrorResult<'a> {
    error: &'a str,
}

impl Serialize for ActivationResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ActivationResponse", 4)?;
        state.serialize_field("status", self.status())?;
        state.serialize_field("statusCode", &self.status_code())?;
        state.serialize_field("success", &self.is_success())?;
        match self {
            ActivationResponse::Success(result) | ActivationResponse::ApplicationError(result) => {
                state.serialize_field("result", result)?
            }
            ActivationResponse::SystemError(message) => {
                state.serialize_field("result", &SystemErrorResult { error: message })?
            }
        }
        state.end()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivationResponseRepr {
    status_code: u8,
    #[serde(default)]
    result: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum ActivationResponseError {
    #[error("unknown activation status code {0}")]
    UnknownStatusCode(u8),
}

impl TryFrom<ActivationResponseRepr> for ActivationResponse {
    type Error = ActivationResponseError;

    fn try_from(repr: ActivationResponseRepr) -> Result<Self, Self::Error> {
        match repr.status_code {
            STATUS_CODE_SUCCESS => Ok(ActivationResponse::Success(repr.result)),
            STATUS_CODE_APPLICATION_ERROR => Ok(ActivationResponse::ApplicationError(repr.result)),
            STATUS_CODE_SYSTEM_ERROR => {
                let message = match repr.result.get("error") {
                    Some(Value::String(message)) => message.clone(),
                    Some(other) => other.to_string(),
                    None => repr.result.to_string(),
                };
                Ok(ActivationResponse::SystemError(message))
            }
            code => Err(ActivationResponseError::UnknownStatusCode(code)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ActivationRecordError {
    #[error("activation record is missing field '{0}'")]
    MissingField(&'static str),
    #[error("activation ends at {end} before it starts at {start}")]
    EndBeforeStart {
        start: MillisSinceEpoch,
        end: MillisSinceEpoch,
    },
    #[error("a system error activation cannot carry logs")]
    LogsOnSystemError,
}

impl From<derive_builder::UninitializedFieldError> for ActivationRecordError {
    fn from(value: derive_builder::UninitializedFieldError) -> Self {
        ActivationRecordError::MissingField(value.field_name())
    }
}

/// One completed invocation.
#[derive(Debug, Clone, PartialEq, derive_builder::Builder, Deserialize)]
#[builder(
    pattern = "owned",
    build_fn(validate = "Self::validate", error = "ActivationRecordError")
)]
#[serde(try_from = "ActivationRecordRepr")]
pub struct ActivationRecord {
    activation_id: ActivationId,
    #[builder(setter(into))]
    namespace: String,
    #[builder(setter(into))]
    name: String,
    #[builder(setter(into))]
    subject: String,
    start: MillisSinceEpoch,
    end: MillisSinceEpoch,
    response: ActivationResponse,
    #[builder(default)]
    logs: Vec<String>,
}

impl ActivationRecordBuilder {
    fn validate(&self) -> Result<(), ActivationRecordError> {
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if end < start {
                return Err(ActivationRecordError::EndBeforeStart { start, end });
            }
        }
        if matches!(self.response, Some(ActivationResponse::SystemError(_)))
            && self.logs.as_ref().is_some_and(|logs| !logs.is_empty())
        {
            return Err(ActivationRecordError::LogsOnSystemError);
        }
        Ok(())
    }
}

impl ActivationRecord {
    pub fn builder() -> ActivationRecordBuilder {
        ActivationRecordBuilder::default()
    }

    pub fn activation_id(&self) -> ActivationId {
        self.activation_id
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn start(&self) -> MillisSinceEpoch {
        self.start
    }

    pub fn end(&self) -> MillisSinceEpoch {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end.saturating_duration_since(self.start)
    }

    pub fn response(&self) -> &ActivationResponse {
        &self.response
    }

    pub fn logs(&self) -> &[String] {
        &self.logs
    }

    /// Copy of this record with the logs removed.
    pub fn without_logs(&self) -> ActivationRecord {
        ActivationRecord {
            logs: Vec::new(),
            ..self.clone()
        }
    }

    /// Serializable view of the extended JSON, including the logs.
    pub fn extended(&self) -> ExtendedJson<'_> {
        ExtendedJson {
            record: self,
            include_logs: true,
        }
    }

    pub fn to_extended_json(&self) -> Value {
        serde_json::to_value(self.extended())
            .expect("activation record is always representable as JSON")
    }

    /// The result-only JSON projection, see [`ActivationResponse::result_json`].
    pub fn result_json(&self) -> Value {
        self.response.result_json()
    }

    #[cfg(any(test, feature = "test-util"))]
    pub fn mock(activation_id: ActivationId, response: ActivationResponse) -> Self {
        ActivationRecord {
            activation_id,
            namespace: "guest".to_owned(),
            name: "hello".to_owned(),
            subject: "guest".to_owned(),
            start: MillisSinceEpoch::new(1_700_000_000_000),
            end: MillisSinceEpoch::new(1_700_000_000_042),
            response,
            logs: Vec::new(),
        }
    }

    #[cfg(any(test, feature = "test-util"))]
    pub fn mock_with_logs(
        activation_id: ActivationId,
        response: ActivationResponse,
        logs: Vec<String>,
    ) -> Self {
        assert!(
            !response.is_system_error(),
            "a system error activation cannot carry logs"
        );
        ActivationRecord {
            logs,
            ..Self::mock(activation_id, response)
        }
    }
}

/// Serializable view over an [`ActivationRecord`] producing the extended JSON.
#[derive(Debug, Clone, Copy)]
pub struct ExtendedJson<'a> {
    record: &'a ActivationRecord,
    include_logs: bool,
}

impl ExtendedJson<'_> {
    pub fn without_logs(self) -> Self {
        ExtendedJson {
            include_logs: false,
            ..self
        }
    }
}

impl Serialize for ExtendedJson<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let record = self.record;
        let with_logs = self.include_logs && !record.logs.is_empty();

        let mut state =
            serializer.serialize_struct("ActivationRecord", if with_logs { 9 } else { 8 })?;
        state.serialize_field("activationId", &record.activation_id)?;
        state.serialize_field("namespace", &record.namespace)?;
        state.serialize_field("name", &record.name)?;
        state.serialize_field("subject", &record.subject)?;
        state.serialize_field("start", &record.start)?;
        state.serialize_field("end", &record.end)?;
        state.serialize_field(
            "duration",
            &u64::try_from(record.duration().as_millis()).unwrap_or(u64::MAX),
        )?;
        state.serialize_field("response", &record.response)?;
        if with_logs {
            state.serialize_field("logs", &record.logs)?;
        } else {
            state.skip_field("logs")?;
        }
        state.end()
    }
}

impl Serialize for ActivationRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.extended().serialize(serializer)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivationRecordRepr {
    activation_id: ActivationId,
    namespace: String,
    name: String,
    subject: String,
    start: MillisSinceEpoch,
    end: MillisSinceEpoch,
    response: ActivationResponse,
    #[serde(default)]
    logs: Vec<String>,
}

impl TryFrom<ActivationRecordRepr> for ActivationRecord {
    type Error = ActivationRecordError;

    fn try_from(repr: ActivationRecordRepr) -> Result<Self, Self::Error> {
        ActivationRecord::builder()
            .activation_id(repr.activation_id)
            .namespace(repr.namespace)
            .name(repr.name)
            .subject(repr.subject)
            .start(repr.start)
            .end(repr.end)
            .response(repr.response)
            .logs(repr.logs)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use googletest::prelude::*;
    use nimbus_test_util::let_assert;
    use serde_json::json;

    fn record(response: ActivationResponse, logs: Vec<String>) -> ActivationRecord {
        ActivationRecord::builder()
            .activation_id(ActivationId::generate())
            .namespace("guest")
            .name("hello")
            .subject("guest-subject")
            .start(MillisSinceEpoch::new(1_000))
            .end(MillisSinceEpoch::new(1_250))
            .response(response)
            .logs(logs)
            .build()
            .unwrap()
    }

    #[test]
    fn extended_json_shape() {
        let record = record(
            ActivationResponse::success(json!({"test": "yes"})),
            vec!["line one".to_owned()],
        );

        assert_that!(
            record.to_extended_json(),
            eq(json!({
                "activationId": record.activation_id().to_string(),
                "namespace": "guest",
                "name": "hello",
                "subject": "guest-subject",
                "start": 1_000,
                "end": 1_250,
                "duration": 250,
                "response": {
                    "status": "success",
                    "statusCode": 0,
                    "success": true,
                    "result": {"test": "yes"}
                },
                "logs": ["line one"]
            }))
        );
    }

    #[test]
    fn stripped_view_omits_logs() {
        let record = record(
            ActivationResponse::application_error(json!({"error": "bad input"})),
            vec!["secret".to_owned()],
        );

        let stripped = serde_json::to_string(&record.extended().without_logs()).unwrap();

        assert_that!(stripped, not(contains_substring("logs")));
        assert_that!(stripped, not(contains_substring("secret")));
        assert_that!(
            serde_json::from_str::<ActivationRecord>(&stripped).unwrap(),
            eq(record.without_logs())
        );
    }

    #[test]
    fn system_error_result_projection() {
        let record = record(ActivationResponse::system_error("test"), vec![]);

        assert_that!(record.result_json(), eq(json!({"error": "test"})));
        assert_that!(
            record.to_extended_json()["response"],
            eq(json!({
                "status": "internal error",
                "statusCode": 2,
                "success": false,
                "result": {"error": "test"}
            }))
        );
    }

    #[test]
    fn json_round_trip_per_variant() {
        for response in [
            ActivationResponse::success(json!({"a": 1})),
            ActivationResponse::application_error(json!({"error": "nope"})),
            ActivationResponse::system_error("boom"),
        ] {
            let original = record(response, vec![]);
            let decoded: ActivationRecord =
                serde_json::from_value(original.to_extended_json()).unwrap();
            assert_that!(decoded, eq(original));
        }
    }

    #[test]
    fn reject_end_before_start() {
        let result = ActivationRecord::builder()
            .activation_id(ActivationId::generate())
            .namespace("guest")
            .name("hello")
            .subject("guest")
            .start(MillisSinceEpoch::new(10))
            .end(MillisSinceEpoch::new(5))
            .response(ActivationResponse::success(json!({})))
            .build();

        let_assert!(Err(ActivationRecordError::EndBeforeStart { .. }) = result);
    }

    #[test]
    fn reject_logs_on_system_error() {
        let result = ActivationRecord::builder()
            .activation_id(ActivationId::generate())
            .namespace("guest")
            .name("hello")
            .subject("guest")
            .start(MillisSinceEpoch::new(10))
            .end(MillisSinceEpoch::new(10))
            .response(ActivationResponse::system_error("crashed"))
            .logs(vec!["partial".to_owned()])
            .build();

        let_assert!(Err(ActivationRecordError::LogsOnSystemError) = result);
    }

    #[test]
    fn reject_missing_fields() {
        let result = ActivationRecord::builder()
            .activation_id(ActivationId::generate())
            .build();

        let_assert!(Err(ActivationRecordError::MissingField(_)) = result);
    }

    #[test]
    fn reject_unknown_status_code() {
        let response = serde_json::from_value::<ActivationResponse>(json!({
            "status": "whatever",
            "statusCode": 7,
            "success": false,
            "result": {}
        }));

        assert_that!(response.is_err(), eq(true));
    }
}
