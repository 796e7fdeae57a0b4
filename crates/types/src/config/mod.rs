// Copyright (c) 2023 - 2025 Nimbus developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

mod controller;

pub use controller::*;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum InvalidConfigurationError {
    #[error("controller.blocking-wait must be greater than zero")]
    ZeroBlockingWait,
    #[error("controller.completion-polling.interval must be greater than zero")]
    ZeroPollInterval,
}

/// Nimbus configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize, derive_builder::Builder)]
#[serde(rename_all = "kebab-case")]
#[builder(default)]
pub struct Configuration {
    #[serde(flatten)]
    pub common: CommonOptions,
    pub controller: ControllerOptions,
}

impl Configuration {
    pub fn validate(&self) -> Result<(), InvalidConfigurationError> {
        if self.controller.blocking_wait().is_zero() {
            return Err(InvalidConfigurationError::ZeroBlockingWait);
        }
        if self.controller.completion_polling.interval().is_zero() {
            return Err(InvalidConfigurationError::ZeroPollInterval);
        }
        Ok(())
    }
}

/// # Common options
#[derive(Debug, Clone, Serialize, Deserialize, derive_builder::Builder)]
#[serde(rename_all = "kebab-case")]
#[builder(default)]
pub struct CommonOptions {
    /// # Logging filter
    ///
    /// Log filter configuration in the `EnvFilter` syntax. `RUST_LOG` overrides it.
    #[builder(setter(into))]
    pub log_filter: String,
}

impl Default for CommonOptions {
    fn default() -> Self {
        Self {
            log_filter: "warn,nimbus=info".to_owned(),
        }
    }
}
