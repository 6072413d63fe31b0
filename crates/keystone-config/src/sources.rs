// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: built-in defaults, a TOML file and the environment.

use std::path::PathBuf;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::KeystoneConfigLayer;
use crate::sections::{AclConfigLayer, LoaderConfigLayer, LogFormat, LoggingConfigLayer};

pub const SYSTEM_CONFIG_PATH: &str = "/etc/keystone/keystone.toml";

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<KeystoneConfigLayer, ConfigError>;
}

pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<KeystoneConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(KeystoneConfigLayer::default())
	}
}

/// TOML file source. A missing file contributes nothing.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new(SYSTEM_CONFIG_PATH)
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<KeystoneConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(KeystoneConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: KeystoneConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: `KEYSTONE_<SECTION>_<FIELD>`, with `KEYSTONE_LOG_LEVEL` and
/// `KEYSTONE_LOG_FORMAT` for logging.
pub struct EnvSource;

impl EnvSource {
	/// Builds a layer from `lookup` instead of the process environment.
	pub fn load_from<F>(lookup: F) -> Result<KeystoneConfigLayer, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let env = Env(lookup);
		Ok(KeystoneConfigLayer {
			acl: Some(AclConfigLayer {
				administrator_role: env.var("KEYSTONE_ACL_ADMINISTRATOR_ROLE"),
				everyone_role: env.var("KEYSTONE_ACL_EVERYONE_ROLE"),
			}),
			loader: Some(LoaderConfigLayer {
				max_batch_size: env.usize("KEYSTONE_LOADER_MAX_BATCH_SIZE")?,
				cache: env.bool("KEYSTONE_LOADER_CACHE"),
			}),
			logging: Some(LoggingConfigLayer {
				level: env.var("KEYSTONE_LOG_LEVEL"),
				format: env.log_format("KEYSTONE_LOG_FORMAT")?,
			}),
		})
	}
}

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<KeystoneConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Self::load_from(|name| std::env::var(name).ok())
	}
}

struct Env<F>(F);

impl<F> Env<F>
where
	F: Fn(&str) -> Option<String>,
{
	fn var(&self, name: &str) -> Option<String> {
		(self.0)(name).filter(|s| !s.is_empty())
	}

	fn bool(&self, name: &str) -> Option<bool> {
		self
			.var(name)
			.map(|v| v.eq_ignore_ascii_case("true") || v == "1")
	}

	fn usize(&self, name: &str) -> Result<Option<usize>, ConfigError> {
		match self.var(name) {
			Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
				key: name.to_string(),
				message: format!("invalid usize value '{v}'"),
			}),
			None => Ok(None),
		}
	}

	fn log_format(&self, name: &str) -> Result<Option<LogFormat>, ConfigError> {
		match self.var(name) {
			Some(v) => v
				.parse()
				.map(Some)
				.map_err(|message| ConfigError::InvalidValue {
					key: name.to_string(),
					message,
				}),
			None => Ok(None),
		}
	}
}
