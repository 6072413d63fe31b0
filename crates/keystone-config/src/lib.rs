// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for keystone.
//!
//! This crate provides:
//! - Layered configuration from defaults, a TOML file and the environment
//! - Validation of the role names and loader limits the engine depends on
//! - Tracing subscriber setup driven by the logging section
//!
//! # Usage
//!
//! ```ignore
//! use keystone_config::{init_tracing, load_config};
//!
//! let config = load_config()?;
//! init_tracing(&config.logging)?;
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;
pub mod telemetry;

pub use error::ConfigError;
pub use layer::KeystoneConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource, SYSTEM_CONFIG_PATH};
pub use telemetry::{env_filter, init_tracing};

use tracing::{debug, info};

/// Fully resolved configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeystoneConfig {
	pub acl: AclConfig,
	pub loader: LoaderConfig,
	pub logging: LoggingConfig,
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`KEYSTONE_*`)
/// 2. Config file (`/etc/keystone/keystone.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<KeystoneConfig, ConfigError> {
	load_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<KeystoneConfig, ConfigError> {
	load_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

/// Load configuration from the environment only.
pub fn load_config_from_env() -> Result<KeystoneConfig, ConfigError> {
	let mut merged = KeystoneConfigLayer::default();
	merged.merge(EnvSource.load()?);
	finalize(merged)
}

fn load_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<KeystoneConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = KeystoneConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	finalize(merged)
}

/// Resolves a merged layer and validates it.
pub fn finalize(layer: KeystoneConfigLayer) -> Result<KeystoneConfig, ConfigError> {
	let config = KeystoneConfig {
		acl: layer.acl.unwrap_or_default().finalize(),
		loader: layer.loader.unwrap_or_default().finalize(),
		logging: layer.logging.unwrap_or_default().finalize(),
	};

	validate_config(&config)?;

	info!(
		administrator_role_configured = config.acl.administrator_role.is_some(),
		everyone_role = %config.acl.everyone_role,
		max_batch_size = config.loader.max_batch_size,
		loader_cache = config.loader.cache,
		"keystone configuration loaded"
	);

	Ok(config)
}

/// Validate cross-field configuration rules.
pub fn validate_config(config: &KeystoneConfig) -> Result<(), ConfigError> {
	if config.acl.everyone_role.trim().is_empty() {
		return Err(ConfigError::Validation(
			"acl.everyone_role must not be empty".to_string(),
		));
	}

	if let Some(admin) = &config.acl.administrator_role {
		if admin.trim().is_empty() {
			return Err(ConfigError::Validation(
				"acl.administrator_role must not be empty when set".to_string(),
			));
		}
		if *admin == config.acl.everyone_role {
			return Err(ConfigError::Validation(format!(
				"acl.administrator_role and acl.everyone_role are both '{admin}'. \
				 This would grant every principal full access."
			)));
		}
	}

	if config.loader.max_batch_size == 0 {
		return Err(ConfigError::Validation(
			"loader.max_batch_size must be at least 1".to_string(),
		));
	}

	Ok(())
}
