// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Role consolidation.
//!
//! Merges the grants of every role a principal holds, plus the everyone role,
//! into one value per operation:
//!
//! 1. **Administrator**: full, unconditional access; the ACL is not consulted
//! 2. **Allow wins**: any role allowing an operation outright makes it unconditional
//! 3. **Filters accumulate**: otherwise every contributed filter function is kept,
//!    in role order with the everyone role last
//!
//! An operation nobody grants is absent from the result, which is a denial.

use std::collections::HashSet;

use tracing::{instrument, trace};

use crate::access::AccessType;
use crate::acl::{AccessControlList, AccessControlValue, FilterFn};

/// The distinguished role names consolidation needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleNames {
	pub administrator: String,
	pub everyone: String,
}

/// The merged grant for one operation.
#[derive(Clone, Debug)]
pub enum ConsolidatedValue {
	Allow,
	/// Independent sufficient conditions; a row passing any one is admitted.
	Filters(Vec<FilterFn>),
}

impl ConsolidatedValue {
	pub fn is_allow(&self) -> bool {
		matches!(self, ConsolidatedValue::Allow)
	}

	fn merge(&mut self, value: &AccessControlValue) {
		match value {
			AccessControlValue::Allow => *self = ConsolidatedValue::Allow,
			AccessControlValue::Filter(f) => {
				if let ConsolidatedValue::Filters(filters) = self {
					filters.push(f.clone());
				}
			}
		}
	}
}

impl From<&AccessControlValue> for ConsolidatedValue {
	fn from(value: &AccessControlValue) -> Self {
		match value {
			AccessControlValue::Allow => ConsolidatedValue::Allow,
			AccessControlValue::Filter(f) => ConsolidatedValue::Filters(vec![f.clone()]),
		}
	}
}

/// One decision per operation for a principal on an entity type.
#[derive(Clone, Debug, Default)]
pub struct ConsolidatedAccessControlEntry {
	values: [Option<ConsolidatedValue>; 4],
}

impl ConsolidatedAccessControlEntry {
	/// Unconditional access to every operation.
	pub fn full_access() -> Self {
		Self {
			values: [
				Some(ConsolidatedValue::Allow),
				Some(ConsolidatedValue::Allow),
				Some(ConsolidatedValue::Allow),
				Some(ConsolidatedValue::Allow),
			],
		}
	}

	pub fn get(&self, access: AccessType) -> Option<&ConsolidatedValue> {
		self.values[access.index()].as_ref()
	}

	pub fn is_full_access(&self) -> bool {
		self
			.values
			.iter()
			.all(|v| matches!(v, Some(ConsolidatedValue::Allow)))
	}

	/// Operations with any grant at all.
	pub fn granted(&self) -> Vec<AccessType> {
		AccessType::ALL
			.into_iter()
			.filter(|a| self.get(*a).is_some())
			.collect()
	}

	fn merge(&mut self, access: AccessType, value: &AccessControlValue) {
		let slot = &mut self.values[access.index()];
		if let Some(existing) = slot.as_mut() {
			existing.merge(value);
		} else {
			*slot = Some(ConsolidatedValue::from(value));
		}
	}
}

/// Consolidates `acl` for a principal holding `roles`.
#[instrument(level = "trace", skip(acl, names), fields(role_count = roles.len()))]
pub fn consolidate(
	acl: &AccessControlList,
	roles: &[String],
	names: &RoleNames,
) -> ConsolidatedAccessControlEntry {
	if roles.iter().any(|r| *r == names.administrator) {
		trace!("administrator role present, granting full access");
		return ConsolidatedAccessControlEntry::full_access();
	}

	let mut seen = HashSet::new();
	let considered = roles
		.iter()
		.map(String::as_str)
		.chain(std::iter::once(names.everyone.as_str()))
		.filter(|role| seen.insert(*role));

	let mut entry = ConsolidatedAccessControlEntry::default();
	for role in considered {
		let Some(grants) = acl.get(role) else {
			continue;
		};
		for (access, value) in grants.entries() {
			entry.merge(*access, value);
		}
	}

	trace!(granted = ?entry.granted(), "consolidated role grants");
	entry
}
