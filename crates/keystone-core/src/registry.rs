// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Process-wide ACL storage.
//!
//! Written while entities are registered at startup, read-only afterwards.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, instrument};

use crate::acl::AccessControlList;
use crate::consolidate::{consolidate, ConsolidatedAccessControlEntry, RoleNames};
use crate::error::{AclError, Result};

/// Role name consulted for every principal unless configured otherwise.
pub const DEFAULT_EVERYONE_ROLE: &str = "Everyone";

/// Entity name to ACL, plus the distinguished role names.
#[derive(Debug)]
pub struct AclRegistry {
	acls: RwLock<HashMap<String, Arc<AccessControlList>>>,
	administrator_role: RwLock<Option<String>>,
	everyone_role: String,
}

impl Default for AclRegistry {
	fn default() -> Self {
		Self::new()
	}
}

impl AclRegistry {
	pub fn new() -> Self {
		Self::with_everyone_role(DEFAULT_EVERYONE_ROLE)
	}

	pub fn with_everyone_role(everyone_role: impl Into<String>) -> Self {
		Self {
			acls: RwLock::new(HashMap::new()),
			administrator_role: RwLock::new(None),
			everyone_role: everyone_role.into(),
		}
	}

	/// Inserts or overwrites the ACL for `entity`. Last write wins.
	#[instrument(level = "debug", skip(self, acl), fields(roles = acl.len()))]
	pub fn register(&self, entity: &str, acl: AccessControlList) {
		let previous = self
			.acls
			.write()
			.unwrap_or_else(|e| e.into_inner())
			.insert(entity.to_string(), Arc::new(acl));
		if previous.is_some() {
			debug!(entity, "replaced existing ACL");
		}
	}

	/// The ACL for `entity`, or `None` when it declared none.
	pub fn get(&self, entity: &str) -> Option<Arc<AccessControlList>> {
		self
			.acls
			.read()
			.unwrap_or_else(|e| e.into_inner())
			.get(entity)
			.cloned()
	}

	pub fn set_administrator_role_name(&self, name: impl Into<String>) {
		*self
			.administrator_role
			.write()
			.unwrap_or_else(|e| e.into_inner()) = Some(name.into());
	}

	pub fn administrator_role_name(&self) -> Result<String> {
		self
			.administrator_role
			.read()
			.unwrap_or_else(|e| e.into_inner())
			.clone()
			.ok_or_else(|| {
				AclError::Configuration(
					"Administrator role name has not been set. Call set_administrator_role_name at startup."
						.to_string(),
				)
			})
	}

	pub fn everyone_role_name(&self) -> &str {
		&self.everyone_role
	}

	pub fn role_names(&self) -> Result<RoleNames> {
		Ok(RoleNames {
			administrator: self.administrator_role_name()?,
			everyone: self.everyone_role.clone(),
		})
	}

	/// Consolidated grants of `roles` on `entity`.
	///
	/// An entity without an ACL grants nothing to anyone but the administrator.
	pub fn consolidate(&self, entity: &str, roles: &[String]) -> Result<ConsolidatedAccessControlEntry> {
		let names = self.role_names()?;
		let acl = self.get(entity).unwrap_or_default();
		Ok(consolidate(&acl, roles, &names))
	}
}
