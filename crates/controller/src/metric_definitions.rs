// Copyright (c) 2023 - 2025 Nimbus developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

/// Optional to have but adds description/help message to the metrics emitted to
/// the metrics' sink.
use metrics::{Unit, describe_counter, describe_histogram};

pub const CONTROLLER_REQUESTS: &str = "nimbus.controller.requests.total";
pub const CONTROLLER_REQUEST_DURATION: &str = "nimbus.controller.request_duration.seconds";
pub const CONTROLLER_INVOCATIONS: &str = "nimbus.controller.invocations.total";

pub const REQUEST_ADMITTED: &str = "admitted";
pub const REQUEST_DENIED_THROTTLE: &str = "throttled";
pub const REQUEST_COMPLETED: &str = "completed";

pub const MODE_BLOCKING: &str = "blocking";
pub const MODE_NON_BLOCKING: &str = "non_blocking";

pub const INVOCATION_ACCEPTED: &str = "accepted";
pub const INVOCATION_SUCCESS: &str = "success";
pub const INVOCATION_APPLICATION_ERROR: &str = "application_error";
pub const INVOCATION_SYSTEM_ERROR: &str = "system_error";
pub const INVOCATION_PENDING: &str = "pending";
pub const INVOCATION_UNDETERMINED: &str = "undetermined";

pub(crate) fn describe_metrics() {
    describe_counter!(
        CONTROLLER_REQUESTS,
        Unit::Count,
        "Number of API requests, by admission status"
    );

    describe_histogram!(
        CONTROLLER_REQUEST_DURATION,
        Unit::Seconds,
        "Total latency of API requests, blocking waits included"
    );

    describe_counter!(
        CONTROLLER_INVOCATIONS,
        Unit::Count,
        "Number of submitted invocations, by mode and outcome"
    );
}
