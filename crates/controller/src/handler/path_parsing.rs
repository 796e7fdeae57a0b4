// Copyright (c) 2024 -  Nimbus developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::VecDeque;

use http::Uri;

use super::HandlerError;
use crate::coordinator::InvokeOptions;

const BLOCKING_QUERY_PARAM: &str = "blocking";
const RESULT_QUERY_PARAM: &str = "result";

/// Namespace placeholder resolving to the namespace of the invoking subject.
pub(crate) const DEFAULT_NAMESPACE: &str = "_";

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ActionPath {
    pub(crate) namespace: String,
    pub(crate) action: String,
}

impl ActionPath {
    /// Parses `/namespaces/:namespace/actions/:action`.
    pub(crate) fn from_uri(uri: &Uri) -> Result<Self, HandlerError> {
        let mut path_parts: VecDeque<&str> = uri.path().split('/').skip(1).collect();

        if path_parts.pop_front() != Some("namespaces") {
            return Err(HandlerError::NotFound);
        }
        let namespace = non_empty(path_parts.pop_front())?;

        match path_parts.pop_front() {
            Some("actions") => {}
            Some(_) => return Err(HandlerError::NotFound),
            None => return Err(HandlerError::BadPath),
        }
        let action = non_empty(path_parts.pop_front())?;

        if !path_parts.is_empty() {
            return Err(HandlerError::BadPath);
        }

        Ok(Self {
            namespace: namespace.to_owned(),
            action: action.to_owned(),
        })
    }
}

fn non_empty(segment: Option<&str>) -> Result<&str, HandlerError> {
    segment
        .filter(|segment| !segment.is_empty())
        .ok_or(HandlerError::BadPath)
}

/// Parses the `blocking` and `result` query parameters, both defaulting to false.
pub(crate) fn parse_invoke_options(query: Option<&str>) -> Result<InvokeOptions, HandlerError> {
    let mut options = InvokeOptions::default();
    let Some(query) = query else {
        return Ok(options);
    };

    for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
        if k.eq_ignore_ascii_case(BLOCKING_QUERY_PARAM) {
            options.blocking = parse_flag(&k, &v)?;
        } else if k.eq_ignore_ascii_case(RESULT_QUERY_PARAM) {
            options.result_only = parse_flag(&k, &v)?;
        }
    }

    Ok(options)
}

fn parse_flag(key: &str, value: &str) -> Result<bool, HandlerError> {
    if value.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(HandlerError::BadQueryParameter(key.to_owned()))
    }
}
