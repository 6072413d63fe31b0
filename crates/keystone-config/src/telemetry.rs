// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Process-wide tracing subscriber.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::error::ConfigError;
use crate::sections::{LogFormat, LoggingConfig};

/// Filter from `RUST_LOG`, falling back to the configured level.
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter, ConfigError> {
	match EnvFilter::try_from_default_env() {
		Ok(filter) => Ok(filter),
		Err(_) => EnvFilter::try_new(&config.level).map_err(|e| ConfigError::InvalidValue {
			key: "logging.level".to_string(),
			message: e.to_string(),
		}),
	}
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), ConfigError> {
	let filter = env_filter(config)?;
	let registry = tracing_subscriber::registry().with(filter);

	let result = match config.format {
		LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
		LogFormat::Json => registry
			.with(tracing_subscriber::fmt::layer().json().with_current_span(true))
			.try_init(),
	};
	result.map_err(|e| ConfigError::Subscriber(e.to_string()))
}
