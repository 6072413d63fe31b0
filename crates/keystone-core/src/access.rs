// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Operation vocabulary.
//!
//! [`AccessType`] is the closed set of operations a decision is made for.
//! [`AccessSpec`] is the authoring vocabulary, which adds the `write` and `all`
//! shorthands. Shorthands are expanded once, when an ACL is built.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AclError;

/// An operation an ACL decision is made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessType {
	Read,
	Create,
	Update,
	Delete,
}

impl AccessType {
	pub const ALL: [AccessType; 4] = [
		AccessType::Read,
		AccessType::Create,
		AccessType::Update,
		AccessType::Delete,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			AccessType::Read => "read",
			AccessType::Create => "create",
			AccessType::Update => "update",
			AccessType::Delete => "delete",
		}
	}

	pub(crate) fn index(&self) -> usize {
		match self {
			AccessType::Read => 0,
			AccessType::Create => 1,
			AccessType::Update => 2,
			AccessType::Delete => 3,
		}
	}
}

impl fmt::Display for AccessType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// An operation name as written in an ACL entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessSpec {
	Read,
	Create,
	Update,
	Delete,
	/// Create, update and delete.
	Write,
	/// Every operation.
	All,
}

impl AccessSpec {
	/// The concrete operations this name grants.
	pub fn expand(&self) -> &'static [AccessType] {
		match self {
			AccessSpec::Read => &[AccessType::Read],
			AccessSpec::Create => &[AccessType::Create],
			AccessSpec::Update => &[AccessType::Update],
			AccessSpec::Delete => &[AccessType::Delete],
			AccessSpec::Write => &[AccessType::Create, AccessType::Update, AccessType::Delete],
			AccessSpec::All => &AccessType::ALL,
		}
	}
}

impl FromStr for AccessSpec {
	type Err = AclError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"read" => Ok(AccessSpec::Read),
			"create" => Ok(AccessSpec::Create),
			"update" => Ok(AccessSpec::Update),
			"delete" => Ok(AccessSpec::Delete),
			"write" => Ok(AccessSpec::Write),
			"all" => Ok(AccessSpec::All),
			_ => Err(AclError::invalid_acl()),
		}
	}
}

impl From<AccessType> for AccessSpec {
	fn from(value: AccessType) -> Self {
		match value {
			AccessType::Read => AccessSpec::Read,
			AccessType::Create => AccessSpec::Create,
			AccessType::Update => AccessSpec::Update,
			AccessType::Delete => AccessSpec::Delete,
		}
	}
}
