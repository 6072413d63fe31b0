// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! ACL authoring types.
//!
//! An [`AccessControlList`] maps role names to [`RoleGrants`]. Each grant is
//! either [`AccessControlValue::Allow`] or a filter function that turns the
//! request's [`AuthorizationContext`] into a row-level [`QueryFilter`].
//!
//! # Example
//!
//! ```
//! use keystone_core::{AccessControlList, AccessControlValue, QueryFilter, RoleGrants};
//!
//! let acl = AccessControlList::new()
//! 	.role("Everyone", RoleGrants::new().read(true))
//! 	.role(
//! 		"member",
//! 		RoleGrants::new().write(AccessControlValue::filter_sync(|ctx| {
//! 			ctx.user_id.clone().map(|id| QueryFilter::eq("ownerId", id))
//! 		})),
//! 	);
//! assert!(acl.get("member").is_some());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::access::{AccessSpec, AccessType};
use crate::context::AuthorizationContext;
use crate::error::Result;
use crate::filter::QueryFilter;

/// Future returned by a filter function.
pub type FilterFuture = BoxFuture<'static, Result<Option<QueryFilter>>>;

/// A row-level permission: context in, filter out.
///
/// `Ok(None)` means "no access". An `Err` is a failure of the function itself
/// (for example a timed-out lookup) and is propagated, never read as a denial.
#[derive(Clone)]
pub struct FilterFn(Arc<dyn Fn(Arc<AuthorizationContext>) -> FilterFuture + Send + Sync>);

impl FilterFn {
	pub fn new<F, Fut>(f: F) -> Self
	where
		F: Fn(Arc<AuthorizationContext>) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<Option<QueryFilter>>> + Send + 'static,
	{
		Self(Arc::new(move |ctx| Box::pin(f(ctx))))
	}

	pub fn call(&self, context: Arc<AuthorizationContext>) -> FilterFuture {
		(self.0)(context)
	}
}

impl fmt::Debug for FilterFn {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("FilterFn(..)")
	}
}

/// What a role is granted for one operation.
#[derive(Clone, Debug)]
pub enum AccessControlValue {
	/// Unconditional access.
	Allow,
	/// Access limited to the rows the returned filter admits.
	Filter(FilterFn),
}

impl AccessControlValue {
	/// An asynchronous filter function.
	pub fn filter<F, Fut>(f: F) -> Self
	where
		F: Fn(Arc<AuthorizationContext>) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<Option<QueryFilter>>> + Send + 'static,
	{
		AccessControlValue::Filter(FilterFn::new(f))
	}

	/// A filter function that needs no I/O.
	pub fn filter_sync<F>(f: F) -> Self
	where
		F: Fn(&AuthorizationContext) -> Option<QueryFilter> + Send + Sync + 'static,
	{
		AccessControlValue::filter(move |ctx| {
			let result = f(ctx.as_ref());
			futures::future::ready(Ok(result))
		})
	}

	/// A filter function that never grants anything.
	pub fn deny() -> Self {
		AccessControlValue::filter_sync(|_| None)
	}

	pub fn is_allow(&self) -> bool {
		matches!(self, AccessControlValue::Allow)
	}
}

impl From<bool> for AccessControlValue {
	fn from(value: bool) -> Self {
		if value {
			AccessControlValue::Allow
		} else {
			AccessControlValue::deny()
		}
	}
}

impl From<FilterFn> for AccessControlValue {
	fn from(value: FilterFn) -> Self {
		AccessControlValue::Filter(value)
	}
}

/// The grants one role holds on one entity type.
///
/// Shorthands are expanded as they are added, so the stored list only ever
/// names concrete operations.
#[derive(Clone, Debug, Default)]
pub struct RoleGrants {
	grants: Vec<(AccessType, AccessControlValue)>,
}

impl RoleGrants {
	pub fn new() -> Self {
		Self::default()
	}

	/// Parses string-keyed grants, rejecting unknown operation names.
	pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
	where
		I: IntoIterator<Item = (K, V)>,
		K: AsRef<str>,
		V: Into<AccessControlValue>,
	{
		let mut grants = RoleGrants::new();
		for (name, value) in pairs {
			let spec: AccessSpec = name.as_ref().parse()?;
			grants = grants.grant(spec, value);
		}
		Ok(grants)
	}

	pub fn grant(mut self, spec: AccessSpec, value: impl Into<AccessControlValue>) -> Self {
		let value = value.into();
		for access in spec.expand() {
			self.grants.push((*access, value.clone()));
		}
		self
	}

	pub fn read(self, value: impl Into<AccessControlValue>) -> Self {
		self.grant(AccessSpec::Read, value)
	}

	pub fn create(self, value: impl Into<AccessControlValue>) -> Self {
		self.grant(AccessSpec::Create, value)
	}

	pub fn update(self, value: impl Into<AccessControlValue>) -> Self {
		self.grant(AccessSpec::Update, value)
	}

	pub fn delete(self, value: impl Into<AccessControlValue>) -> Self {
		self.grant(AccessSpec::Delete, value)
	}

	pub fn write(self, value: impl Into<AccessControlValue>) -> Self {
		self.grant(AccessSpec::Write, value)
	}

	pub fn all(self, value: impl Into<AccessControlValue>) -> Self {
		self.grant(AccessSpec::All, value)
	}

	pub fn entries(&self) -> &[(AccessType, AccessControlValue)] {
		&self.grants
	}

	pub fn is_empty(&self) -> bool {
		self.grants.is_empty()
	}
}

/// Role name to grants, for one entity type.
#[derive(Clone, Debug, Default)]
pub struct AccessControlList {
	roles: HashMap<String, RoleGrants>,
}

impl AccessControlList {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds or replaces the grants for `name`.
	pub fn role(mut self, name: impl Into<String>, grants: RoleGrants) -> Self {
		self.roles.insert(name.into(), grants);
		self
	}

	pub fn get(&self, name: &str) -> Option<&RoleGrants> {
		self.roles.get(name)
	}

	pub fn role_names(&self) -> impl Iterator<Item = &str> {
		self.roles.keys().map(String::as_str)
	}

	pub fn len(&self) -> usize {
		self.roles.len()
	}

	pub fn is_empty(&self) -> bool {
		self.roles.is_empty()
	}
}
