// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The authenticated principal of the current request.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{AclError, Result};

/// The principal a request runs as.
///
/// `roles` keeps the order it was supplied in; consolidation walks it in that
/// order. `attributes` carries any consumer-defined data filter functions need.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationContext {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_id: Option<String>,
	#[serde(default)]
	pub roles: Vec<String>,
	#[serde(default, skip_serializing_if = "Map::is_empty")]
	pub attributes: Map<String, Value>,
}

impl AuthorizationContext {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
		self.user_id = Some(user_id.into());
		self
	}

	pub fn with_role(mut self, role: impl Into<String>) -> Self {
		self.roles.push(role.into());
		self
	}

	pub fn with_roles<I, S>(mut self, roles: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.roles.extend(roles.into_iter().map(Into::into));
		self
	}

	pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.attributes.insert(key.into(), value.into());
		self
	}

	pub fn has_role(&self, role: &str) -> bool {
		self.roles.iter().any(|r| r == role)
	}

	pub fn attribute(&self, key: &str) -> Option<&Value> {
		self.attributes.get(key)
	}
}

/// Holds the principal for one request.
///
/// Set once when the request starts, read during processing, cleared when it
/// ends. One store per request; nothing here is process-global.
#[derive(Debug, Default)]
pub struct AuthContextStore {
	current: RwLock<Option<Arc<AuthorizationContext>>>,
}

impl AuthContextStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Replaces any existing context.
	pub fn set_context(&self, context: AuthorizationContext) {
		debug!(
			user_id = context.user_id.as_deref().unwrap_or("-"),
			role_count = context.roles.len(),
			"authorization context set"
		);
		*self.current.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(context));
	}

	pub fn clear_context(&self) {
		*self.current.write().unwrap_or_else(|e| e.into_inner()) = None;
	}

	pub fn is_set(&self) -> bool {
		self
			.current
			.read()
			.unwrap_or_else(|e| e.into_inner())
			.is_some()
	}

	/// The current context.
	pub fn context(&self) -> Result<Arc<AuthorizationContext>> {
		self
			.current
			.read()
			.unwrap_or_else(|e| e.into_inner())
			.clone()
			.ok_or_else(|| {
				AclError::Configuration(
					"Authorization context not set. Call set_context before any access check."
						.to_string(),
				)
			})
	}

	/// The principal's roles; every principal must hold at least one.
	pub fn get_roles(&self) -> Result<Vec<String>> {
		let context = self.context()?;
		if context.roles.is_empty() {
			return Err(AclError::Permission(
				"Authorization context has no roles".to_string(),
			));
		}
		Ok(context.roles.clone())
	}
}
