// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Distinguished role names.

use serde::Deserialize;

pub const DEFAULT_EVERYONE_ROLE: &str = "Everyone";

/// Role names the access control registry is configured with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclConfig {
	/// Role granted full access on every entity. No default: leaving it unset
	/// makes every access check fail with a configuration error.
	pub administrator_role: Option<String>,
	/// Role consulted for every principal.
	pub everyone_role: String,
}

impl Default for AclConfig {
	fn default() -> Self {
		Self {
			administrator_role: None,
			everyone_role: DEFAULT_EVERYONE_ROLE.to_string(),
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AclConfigLayer {
	#[serde(default)]
	pub administrator_role: Option<String>,
	#[serde(default)]
	pub everyone_role: Option<String>,
}

impl AclConfigLayer {
	pub fn merge(&mut self, other: AclConfigLayer) {
		if other.administrator_role.is_some() {
			self.administrator_role = other.administrator_role;
		}
		if other.everyone_role.is_some() {
			self.everyone_role = other.everyone_role;
		}
	}

	pub fn finalize(self) -> AclConfig {
		AclConfig {
			administrator_role: self.administrator_role,
			everyone_role: self
				.everyone_role
				.unwrap_or_else(|| DEFAULT_EVERYONE_ROLE.to_string()),
		}
	}
}
