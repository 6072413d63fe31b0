// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Message carried by every [`AclError::Forbidden`].
///
/// Deliberately constant: denial never names the role or filter consulted.
pub const FORBIDDEN_MESSAGE: &str = "You do not have permission to perform this action";

/// Result type alias for access control operations.
pub type Result<T> = std::result::Result<T, AclError>;

/// Top-level error type for access control and loading.
///
/// `Clone` so a single failed batch can be delivered to every waiter.
#[derive(Error, Debug, Clone)]
pub enum AclError {
	/// Mis-registration or missing setup. Never retryable.
	#[error("Configuration error: {0}")]
	Configuration(String),

	/// The principal is malformed (for example, has no roles).
	#[error("Permission error: {0}")]
	Permission(String),

	/// No role grants the requested operation.
	#[error("{}", FORBIDDEN_MESSAGE)]
	Forbidden,

	/// A data provider (or filter function backing store) failed.
	#[error("Provider error: {0}")]
	Provider(#[from] ProviderError),

	#[error("Internal error: {0}")]
	Internal(String),
}

impl AclError {
	pub fn invalid_acl() -> Self {
		AclError::Configuration("Encountered invalid ACL".to_string())
	}

	pub fn is_forbidden(&self) -> bool {
		matches!(self, AclError::Forbidden)
	}
}

/// Failure reported by a storage backend.
///
/// The source is shared so the error stays cheap to clone.
#[derive(Clone)]
pub struct ProviderError {
	message: String,
	source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl ProviderError {
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
			source: None,
		}
	}

	pub fn from_source<E>(message: impl Into<String>, source: E) -> Self
	where
		E: std::error::Error + Send + Sync + 'static,
	{
		Self {
			message: message.into(),
			source: Some(Arc::new(source)),
		}
	}

	pub fn message(&self) -> &str {
		&self.message
	}
}

impl fmt::Debug for ProviderError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ProviderError")
			.field("message", &self.message)
			.field("source", &self.source.as_ref().map(|s| s.to_string()))
			.finish()
	}
}

impl fmt::Display for ProviderError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.source {
			Some(source) => write!(f, "{}: {}", self.message, source),
			None => f.write_str(&self.message),
		}
	}
}

impl std::error::Error for ProviderError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		self
			.source
			.as_deref()
			.map(|e| e as &(dyn std::error::Error + 'static))
	}
}
