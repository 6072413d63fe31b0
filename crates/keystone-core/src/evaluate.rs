// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Turns a consolidated grant into the filter a provider call must carry.

use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, instrument};

use crate::access::AccessType;
use crate::consolidate::{ConsolidatedAccessControlEntry, ConsolidatedValue};
use crate::context::AuthorizationContext;
use crate::error::{AclError, Result};
use crate::filter::QueryFilter;

/// Evaluates one operation's consolidated grant.
///
/// - absent: [`AclError::Forbidden`], no filter function is run
/// - allow: the empty filter
/// - filter functions: all run concurrently; those returning `None` are
///   dropped, none left is `Forbidden`, one is returned verbatim, several are
///   joined with `_or`
///
/// Errors raised by filter functions are returned unchanged.
#[instrument(level = "debug", skip_all, fields(granted = value.is_some()))]
pub async fn evaluate(
	value: Option<&ConsolidatedValue>,
	context: Arc<AuthorizationContext>,
) -> Result<QueryFilter> {
	let filters = match value {
		None => {
			debug!("operation not granted");
			return Err(AclError::Forbidden);
		}
		Some(ConsolidatedValue::Allow) => return Ok(QueryFilter::empty()),
		Some(ConsolidatedValue::Filters(filters)) => filters,
	};

	let results = try_join_all(filters.iter().map(|f| f.call(Arc::clone(&context)))).await?;
	let mut granted: Vec<QueryFilter> = results.into_iter().flatten().collect();

	debug!(
		functions = filters.len(),
		granted = granted.len(),
		"evaluated filter functions"
	);

	match granted.len() {
		0 => Err(AclError::Forbidden),
		1 => Ok(granted.remove(0)),
		_ => Ok(QueryFilter::or_any(granted)),
	}
}

/// [`evaluate`] for `access` within a consolidated entry.
pub async fn evaluate_access(
	entry: &ConsolidatedAccessControlEntry,
	access: AccessType,
	context: Arc<AuthorizationContext>,
) -> Result<QueryFilter> {
	evaluate(entry.get(access), context).await
}
