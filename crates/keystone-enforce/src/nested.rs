// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Permission checks for related entities embedded in a write payload.
//!
//! A payload may reach other entities through its relationship fields:
//!
//! - a bare id or `{ <pk>: id }` links an existing row and needs Read
//! - an object without a primary key creates a row and needs Create
//! - an object with a primary key and other data updates a row and needs Update
//!
//! The walk is iterative over a worklist and records every
//! `(entity, operation, identity)` it has decided, so circular payloads end.
//! Decisions come first and make no provider calls. Rows that a filtered
//! grant must admit are then checked with one read each. Nothing is written
//! until every check has passed.

use std::collections::{HashMap, HashSet};

use futures::future::try_join_all;
use keystone_core::{
	AccessType, AclError, EntityDefinition, EntityId, QueryFilter, Result, Row,
};
use serde_json::Value;
use tracing::{debug, warn};

use crate::scope::RequestScope;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Identity {
	Id(EntityId),
	Payload(String),
}

/// A row that must be visible through a filtered grant before the write.
#[derive(Debug)]
struct VisibilityCheck<'a> {
	definition: &'a EntityDefinition,
	id: EntityId,
	filter: QueryFilter,
}

enum NestedWrite<'p> {
	Link(EntityId),
	Create(&'p Row),
	Update(EntityId, &'p Row),
}

pub(crate) struct WriteValidator<'s> {
	scope: &'s RequestScope,
	filters: HashMap<(String, AccessType), QueryFilter>,
	visited: HashSet<(String, AccessType, Identity)>,
}

impl<'s> WriteValidator<'s> {
	pub(crate) fn new(scope: &'s RequestScope) -> Self {
		Self {
			scope,
			filters: HashMap::new(),
			visited: HashSet::new(),
		}
	}

	/// Validates every relationship reachable from `payload`, a write of
	/// `access` on `root`. The root's own grant is checked by the caller.
	pub(crate) async fn validate(
		mut self,
		root: &'s EntityDefinition,
		access: AccessType,
		payload: &Row,
	) -> Result<()> {
		let scope = self.scope;
		let catalog = scope.catalog();
		if let Some(id) = payload.get(&root.primary_key).and_then(EntityId::from_value) {
			self
				.visited
				.insert((root.name.clone(), access, Identity::Id(id)));
		}

		let mut worklist: Vec<(&EntityDefinition, &Row)> = vec![(root, payload)];
		let mut checks: Vec<VisibilityCheck<'_>> = Vec::new();

		while let Some((definition, row)) = worklist.pop() {
			for (field, relationship) in &definition.relationships {
				let Some(value) = row.get(field) else {
					continue;
				};
				let related = catalog.get(&relationship.related_entity)?;
				for item in relationship_items(definition, field, value)? {
					let Some(write) = classify(related, item) else {
						continue;
					};
					match write {
						NestedWrite::Link(id) => {
							if !self.first_visit(related, AccessType::Read, Identity::Id(id.clone())) {
								continue;
							}
							let filter = self.decide(related, AccessType::Read).await?;
							if !filter.is_empty() {
								checks.push(VisibilityCheck { definition: related, id, filter });
							}
						}
						NestedWrite::Create(data) => {
							let identity = Identity::Payload(Value::Object(data.clone()).to_string());
							if !self.first_visit(related, AccessType::Create, identity) {
								continue;
							}
							let filter = self.decide(related, AccessType::Create).await?;
							if !filter.matches(data) {
								warn!(entity = %related.name, field = %field, "nested create outside granted rows");
								return Err(AclError::Forbidden);
							}
							worklist.push((related, data));
						}
						NestedWrite::Update(id, data) => {
							if !self.first_visit(related, AccessType::Update, Identity::Id(id.clone())) {
								continue;
							}
							let filter = self.decide(related, AccessType::Update).await?;
							if !filter.is_empty() {
								checks.push(VisibilityCheck { definition: related, id, filter });
							}
							worklist.push((related, data));
						}
					}
				}
			}
		}

		debug!(
			decisions = self.visited.len(),
			visibility_checks = checks.len(),
			"nested write permissions decided"
		);
		try_join_all(checks.into_iter().map(verify_visible)).await?;
		Ok(())
	}

	fn first_visit(&mut self, definition: &EntityDefinition, access: AccessType, identity: Identity) -> bool {
		self
			.visited
			.insert((definition.name.clone(), access, identity))
	}

	async fn decide(&mut self, definition: &EntityDefinition, access: AccessType) -> Result<QueryFilter> {
		let key = (definition.name.clone(), access);
		if let Some(filter) = self.filters.get(&key) {
			return Ok(filter.clone());
		}
		let filter = self
			.scope
			.permission_filter(&definition.name, access)
			.await?;
		self.filters.insert(key, filter.clone());
		Ok(filter)
	}
}

/// The values held by a relationship field. Null holds none; arrays hold
/// one per element and may not nest.
fn relationship_items<'p>(
	definition: &EntityDefinition,
	field: &str,
	value: &'p Value,
) -> Result<Vec<&'p Value>> {
	match value {
		Value::Null => Ok(Vec::new()),
		Value::Array(items) => {
			if items.iter().any(Value::is_array) {
				return Err(AclError::Configuration(format!(
					"{}.{field} holds a nested array",
					definition.name
				)));
			}
			Ok(items.iter().filter(|v| !v.is_null()).collect())
		}
		other => Ok(vec![other]),
	}
}

fn classify<'p>(related: &EntityDefinition, value: &'p Value) -> Option<NestedWrite<'p>> {
	match value {
		Value::Object(data) => match data.get(&related.primary_key).and_then(EntityId::from_value) {
			Some(id) if data.len() == 1 => Some(NestedWrite::Link(id)),
			Some(id) => Some(NestedWrite::Update(id, data)),
			None => Some(NestedWrite::Create(data)),
		},
		scalar => EntityId::from_value(scalar).map(NestedWrite::Link),
	}
}

async fn verify_visible(check: VisibilityCheck<'_>) -> Result<()> {
	let target = QueryFilter::and_all([
		QueryFilter::eq(check.definition.primary_key.clone(), check.id.to_value()),
		check.filter,
	]);
	match check.definition.provider.find_one(&target).await? {
		Some(_) => Ok(()),
		None => {
			warn!(entity = %check.definition.name, "nested write references a row outside granted rows");
			Err(AclError::Forbidden)
		}
	}
}
