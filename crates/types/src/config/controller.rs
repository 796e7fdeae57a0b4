// Copyright (c) 2024 -  Nimbus developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use tokio::sync::Semaphore;

/// # Controller options
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, derive_builder::Builder)]
#[serde(rename_all = "kebab-case")]
#[builder(default)]
pub struct ControllerOptions {
    /// # Bind address
    ///
    /// The address to bind for the controller HTTP API.
    pub bind_address: SocketAddr,

    /// # Blocking wait
    ///
    /// How long a blocking invocation waits for the activation to complete before the
    /// controller replies with `202 Accepted` and the activation id.
    ///
    /// Can be configured using the [`humantime`](https://docs.rs/humantime/latest/humantime/fn.parse_duration.html) format.
    #[serde_as(as = "serde_with::DisplayFromStr")]
    #[builder(setter(into))]
    blocking_wait: humantime::Duration,

    /// # Completion polling
    ///
    /// Secondary completion path, polling the activation store while waiting.
    pub completion_polling: CompletionPollingOptions,

    /// # Concurrency limit
    ///
    /// Local concurrency limit for in-flight API requests. If exceeded, the controller
    /// replies immediately with `429 Too Many Requests`. Default is unlimited.
    concurrent_requests_limit: Option<NonZeroUsize>,
}

impl ControllerOptions {
    pub fn blocking_wait(&self) -> Duration {
        self.blocking_wait.into()
    }

    pub fn concurrent_requests_limit(&self) -> usize {
        std::cmp::min(
            self.concurrent_requests_limit
                .map(Into::into)
                .unwrap_or(Semaphore::MAX_PERMITS - 1),
            Semaphore::MAX_PERMITS - 1,
        )
    }
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 3233)),
            blocking_wait: Duration::from_secs(60).into(),
            completion_polling: CompletionPollingOptions::default(),
            concurrent_requests_limit: None,
        }
    }
}

/// # Completion polling options
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, derive_builder::Builder)]
#[serde(rename_all = "kebab-case")]
#[builder(default)]
pub struct CompletionPollingOptions {
    /// # Enabled
    ///
    /// Whether blocking invocations also poll the activation store, next to listening
    /// on the completion feed.
    pub enabled: bool,

    /// # Poll interval
    ///
    /// Interval between two lookups of the activation store. The effective interval is
    /// further capped to a tenth of the blocking wait.
    #[serde_as(as = "serde_with::DisplayFromStr")]
    #[builder(setter(into))]
    interval: humantime::Duration,
}

impl CompletionPollingOptions {
    pub fn interval(&self) -> Duration {
        self.interval.into()
    }
}

impl Default for CompletionPollingOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_millis(100).into(),
        }
    }
}
