// Copyright (c) 2024 -  Nimbus developers.
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

pub const COMPLETION_RESOLVED: &str = "nimbus.completion.resolved.total";
pub const COMPLETION_TIMEOUTS: &str = "nimbus.completion.timeouts.total";
pub const COMPLETION_POLL_ERRORS: &str = "nimbus.completion.poll_errors.total";
pub const COMPLETION_WAIT_DURATION: &str = "nimbus.completion.wait_duration.seconds";

pub const SOURCE_FEED: &str = "feed";
pub const SOURCE_POLLER: &str = "poller";

pub const POLL_ERROR_RETRYABLE: &str = "retryable";
pub const POLL_ERROR_PERMANENT: &str = "permanent";

pub fn describe_metrics() {
    describe_counter!(
        COMPLETION_RESOLVED,
        Unit::Count,
        "Number of waits resolved with an activation record, by completion source"
    );

    describe_counter!(
        COMPLETION_TIMEOUTS,
        Unit::Count,
        "Number of waits that reached their deadline"
    );

    describe_counter!(
        COMPLETION_POLL_ERRORS,
        Unit::Count,
        "Number of failed activation store lookups issued by the poller"
    );

    describe_histogram!(
        COMPLETION_WAIT_DURATION,
        Unit::Seconds,
        "Time spent waiting for an activation to complete"
    );
}
