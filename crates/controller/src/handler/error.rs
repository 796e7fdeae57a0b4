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
use http::{HeaderName, Response, StatusCode, header};
use serde::Serialize;

use crate::formatter::APPLICATION_JSON;

#[derive(Debug, thiserror::Error)]
pub(crate) enum HandlerError {
    #[error("not found")]
    NotFound,
    #[error("bad path, expected /namespaces/:namespace/actions/:action")]
    BadPath,
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("too many requests")]
    TooManyRequests,
    #[error("missing the invoking subject")]
    Unauthenticated,
    #[error("bad header {0}: {1:?}")]
    BadHeader(HeaderName, #[source] header::ToStrError),
    #[error("bad query parameter '{0}', expected either true or false")]
    BadQueryParameter(String),
    #[error("cannot read body: {0:?}")]
    Body(anyhow::Error),
    #[error("bad parameters, expected a JSON object: {0}")]
    BadParameters(String),
    #[error("unavailable")]
    Unavailable,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    // This will simply write the error using the Display trait
    #[serde(with = "serde_with::As::<serde_with::DisplayFromStr>")]
    message: HandlerError,
}

impl HandlerError {
    pub(crate) fn fill_builder<B: From<Bytes>>(
        self,
        res_builder: http::response::Builder,
    ) -> Response<B> {
        let status_code = match &self {
            HandlerError::NotFound => StatusCode::NOT_FOUND,
            HandlerError::BadPath => StatusCode::BAD_REQUEST,
            HandlerError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            HandlerError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            HandlerError::Unauthenticated => StatusCode::UNAUTHORIZED,
            HandlerError::BadHeader(_, _) => StatusCode::BAD_REQUEST,
            HandlerError::BadQueryParameter(_) => StatusCode::BAD_REQUEST,
            HandlerError::Body(_) => StatusCode::INTERNAL_SERVER_ERROR,
            HandlerError::BadParameters(_) => StatusCode::BAD_REQUEST,
            HandlerError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        };

        let error_response = ErrorResponse { message: self };

        res_builder
            .status(status_code)
            .header(header::CONTENT_TYPE, APPLICATION_JSON)
            .body(
                Bytes::from(
                    serde_json::to_vec(&error_response)
                        .expect("Serializing ErrorResponse should not fail"),
                )
                .into(),
            )
            .expect("status and headers are valid")
    }

    pub(crate) fn into_response<B: From<Bytes>>(self) -> Response<B> {
        self.fill_builder(http::response::Builder::new())
    }
}
