// Copyright (c) 2023 - 2025 Nimbus developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use tracing::info;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer};

use nimbus_types::config::CommonOptions;

#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("cannot parse log filter: {0}")]
    LogDirectiveParseError(#[from] ParseError),
    #[error("could not install the global subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// Installs the process-wide log subscriber, filtered by `log-filter`.
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(common_opts: &CommonOptions) -> Result<(), TracingError> {
    let filter = EnvFilter::try_new(&common_opts.log_filter)?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(filter))
        .try_init()?;

    info!("Log filter set to '{}'", common_opts.log_filter);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use nimbus_test_util::let_assert;
    use nimbus_types::config::CommonOptionsBuilder;

    #[test]
    fn invalid_filter_is_rejected() {
        let options = CommonOptionsBuilder::default()
            .log_filter("nimbus=notalevel")
            .build()
            .unwrap();

        let_assert!(Err(TracingError::LogDirectiveParseError(_)) = init_tracing(&options));
    }
}
