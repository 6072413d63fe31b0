// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Enforcement hooks for one request.
//!
//! Every operation follows the same path: consolidate the principal's roles
//! for the entity, evaluate the grant into a filter, then call the provider
//! with that filter applied. A denial returns before any provider call.

use std::collections::HashMap;
use std::sync::Arc;

use keystone_core::{
	evaluate, AccessType, AclError, AclRegistry, AuthContextStore, AuthorizationContext,
	EntityCatalog, EntityDefinition, EntityId, Pagination, QueryFilter, RelationshipKind, Result,
	Row,
};
use keystone_loader::{LoadedRow, LoaderConfig, RequestLoader};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::nested::WriteValidator;

/// A resolved relationship field.
#[derive(Debug, Clone)]
pub enum Related {
	One(LoadedRow),
	Many(Vec<Arc<Row>>),
}

impl Related {
	pub fn len(&self) -> usize {
		match self {
			Related::One(row) => usize::from(row.is_some()),
			Related::Many(rows) => rows.len(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn into_rows(self) -> Vec<Arc<Row>> {
		match self {
			Related::One(row) => row.into_iter().collect(),
			Related::Many(rows) => rows,
		}
	}

	fn empty(kind: &RelationshipKind) -> Self {
		match kind {
			RelationshipKind::ManyToOne => Related::One(None),
			_ => Related::Many(Vec::new()),
		}
	}
}

/// State owned by one request: its principal, its loader and its id.
///
/// Dropping the scope clears both the context and the loader cache.
pub struct RequestScope {
	request_id: Uuid,
	registry: Arc<AclRegistry>,
	catalog: Arc<EntityCatalog>,
	context: AuthContextStore,
	loader: RequestLoader,
}

impl std::fmt::Debug for RequestScope {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RequestScope")
			.field("request_id", &self.request_id)
			.field("loader", &self.loader)
			.finish_non_exhaustive()
	}
}

impl RequestScope {
	pub(crate) fn new(
		registry: Arc<AclRegistry>,
		catalog: Arc<EntityCatalog>,
		loader: LoaderConfig,
		context: AuthorizationContext,
	) -> Self {
		let store = AuthContextStore::new();
		store.set_context(context);
		let scope = Self {
			request_id: Uuid::new_v4(),
			registry,
			catalog,
			context: store,
			loader: RequestLoader::new(loader),
		};
		debug!(request_id = %scope.request_id, "request started");
		scope
	}

	pub fn request_id(&self) -> Uuid {
		self.request_id
	}

	pub fn context(&self) -> Result<Arc<AuthorizationContext>> {
		self.context.context()
	}

	pub fn loader(&self) -> &RequestLoader {
		&self.loader
	}

	pub fn catalog(&self) -> &EntityCatalog {
		&self.catalog
	}

	/// Ends the request, clearing the context and the loader cache.
	pub fn finish(self) {}

	/// The filter `access` on `entity` is limited to for this principal.
	///
	/// `Forbidden` when no role grants the operation.
	pub async fn permission_filter(&self, entity: &str, access: AccessType) -> Result<QueryFilter> {
		let roles = self.context.get_roles()?;
		let entry = self.registry.consolidate(entity, &roles)?;
		let result = evaluate(entry.get(access), self.context.context()?).await;
		if let Err(AclError::Forbidden) = &result {
			warn!(request_id = %self.request_id, entity, operation = %access, "access denied");
		}
		result
	}

	/// Lists rows of `entity` matching `filter` that the principal may read.
	#[instrument(level = "debug", skip(self, filter, pagination), fields(request_id = %self.request_id))]
	pub async fn find(
		&self,
		entity: &str,
		filter: &QueryFilter,
		pagination: Option<&Pagination>,
	) -> Result<Vec<Row>> {
		let definition = self.catalog.get(entity)?;
		let effective = self.read_filter(definition, filter).await?;
		Ok(definition.provider.find(&effective, pagination).await?)
	}

	/// The first readable row of `entity` matching `filter`.
	///
	/// A grant that admits nothing yields `None`, not `Forbidden`.
	#[instrument(level = "debug", skip(self, filter), fields(request_id = %self.request_id))]
	pub async fn find_one(&self, entity: &str, filter: &QueryFilter) -> Result<Option<Row>> {
		let definition = self.catalog.get(entity)?;
		let effective = self.read_filter(definition, filter).await?;
		Ok(definition.provider.find_one(&effective).await?)
	}

	/// Batched read of one row by primary key.
	pub async fn load_by_id(&self, entity: &str, id: impl Into<EntityId>) -> Result<LoadedRow> {
		let definition = self.catalog.get(entity)?;
		let permission = self.permission_filter(entity, AccessType::Read).await?;
		self
			.loader
			.load_by_id_filtered(definition, id, &permission)
			.await
	}

	/// Resolves relationship `field` of a `parent` row of `entity`.
	///
	/// When the related entity is not readable the field resolves empty, so
	/// the parent read still succeeds. Filtering by the relationship
	/// (`relation_filter`) while it is not readable is `Forbidden`.
	#[instrument(level = "debug", skip(self, parent, relation_filter), fields(request_id = %self.request_id))]
	pub async fn load_related(
		&self,
		entity: &str,
		parent: &Row,
		field: &str,
		relation_filter: Option<&QueryFilter>,
	) -> Result<Related> {
		let definition = self.catalog.get(entity)?;
		let relationship = definition.relationship(field).ok_or_else(|| {
			AclError::Configuration(format!("{entity} has no relationship named {field}"))
		})?;
		let related = self.catalog.get(&relationship.related_entity)?;
		let relation_filter = relation_filter.cloned().unwrap_or_default();

		let permission = match self.permission_filter(&related.name, AccessType::Read).await {
			Ok(filter) => filter,
			Err(AclError::Forbidden) if relation_filter.is_empty() => {
				debug!(field, related = %related.name, "relationship not readable, resolving empty");
				return Ok(Related::empty(&relationship.kind));
			}
			Err(e) => return Err(e),
		};
		let filter = self
			.authorize_relationship_filters(related, &relation_filter)
			.await?
			.and(permission);

		match &relationship.kind {
			RelationshipKind::ManyToOne => {
				let id = parent
					.get(field)
					.and_then(|v| definition.provider.get_related_entity_id(v, &related.primary_key));
				match id {
					Some(id) => Ok(Related::One(
						self.loader.load_by_id_filtered(related, id, &filter).await?,
					)),
					None => Ok(Related::One(None)),
				}
			}
			RelationshipKind::OneToMany { related_field }
			| RelationshipKind::ManyToMany { related_field } => {
				let Some(parent_id) = parent.get(&definition.primary_key).and_then(EntityId::from_value)
				else {
					return Err(AclError::Internal(format!(
						"{entity} row has no {} to resolve {field}",
						definition.primary_key
					)));
				};
				Ok(Related::Many(
					self
						.loader
						.load_by_related_id_filtered(related, related_field, parent_id, &filter)
						.await?,
				))
			}
		}
	}

	/// Creates a row of `entity`, including any nested writes in `data`.
	#[instrument(level = "debug", skip(self, data), fields(request_id = %self.request_id))]
	pub async fn create_one(&self, entity: &str, data: Row) -> Result<Row> {
		let definition = self.catalog.get(entity)?;
		let permission = self.permission_filter(entity, AccessType::Create).await?;
		if !permission.matches(&data) {
			warn!(request_id = %self.request_id, entity, "create payload outside granted rows");
			return Err(AclError::Forbidden);
		}
		WriteValidator::new(self)
			.validate(definition, AccessType::Create, &data)
			.await?;

		let created = definition.provider.create_one(data).await?;
		self.loader.clear_cache();
		Ok(created)
	}

	/// Updates row `id` of `entity` if the principal's update grant admits it.
	#[instrument(level = "debug", skip(self, id, data), fields(request_id = %self.request_id, id = %id))]
	pub async fn update_one(&self, entity: &str, id: &EntityId, data: Row) -> Result<Row> {
		let definition = self.catalog.get(entity)?;
		let permission = self.permission_filter(entity, AccessType::Update).await?;
		WriteValidator::new(self)
			.validate(definition, AccessType::Update, &data)
			.await?;

		if !permission.is_empty() {
			let target = QueryFilter::and_all([
				QueryFilter::eq(definition.primary_key.clone(), id.to_value()),
				permission,
			]);
			if definition.provider.find_one(&target).await?.is_none() {
				warn!(request_id = %self.request_id, entity, "update target outside granted rows");
				return Err(AclError::Forbidden);
			}
		}

		let updated = definition.provider.update_one(id, data).await?;
		self.loader.clear_cache();
		Ok(updated)
	}

	/// Updates when `data` carries a primary key, creates otherwise.
	pub async fn create_or_update(&self, entity: &str, data: Row) -> Result<Row> {
		let definition = self.catalog.get(entity)?;
		match data.get(&definition.primary_key).and_then(EntityId::from_value) {
			Some(id) => self.update_one(entity, &id, data).await,
			None => self.create_one(entity, data).await,
		}
	}

	/// Deletes the first row of `entity` matching `filter` that the principal
	/// may delete. `false` when nothing matched.
	#[instrument(level = "debug", skip(self, filter), fields(request_id = %self.request_id))]
	pub async fn delete_one(&self, entity: &str, filter: &QueryFilter) -> Result<bool> {
		let definition = self.catalog.get(entity)?;
		let permission = self.permission_filter(entity, AccessType::Delete).await?;
		let effective = self
			.authorize_relationship_filters(definition, filter)
			.await?
			.and(permission);

		let deleted = definition.provider.delete_one(&effective).await?;
		self.loader.clear_cache();
		Ok(deleted)
	}

	/// Caller filter, restricted by relationship read grants, ANDed with the
	/// Read grant for `definition`.
	async fn read_filter(&self, definition: &EntityDefinition, filter: &QueryFilter) -> Result<QueryFilter> {
		let permission = self
			.permission_filter(&definition.name, AccessType::Read)
			.await?;
		let caller = self
			.authorize_relationship_filters(definition, filter)
			.await?;
		Ok(caller.and(permission))
	}

	/// Filtering by a relationship requires reading the related entity; the
	/// related Read grant is folded into that relationship's clauses, at any
	/// depth of nested relationship sub-filters.
	async fn authorize_relationship_filters(
		&self,
		definition: &EntityDefinition,
		filter: &QueryFilter,
	) -> Result<QueryFilter> {
		let restrictions = self.relationship_restrictions(definition, filter).await?;
		restrict_relationships(&self.catalog, definition, filter, &restrictions)
	}

	/// Read grants of every entity `filter` reaches through relationships.
	async fn relationship_restrictions(
		&self,
		definition: &EntityDefinition,
		filter: &QueryFilter,
	) -> Result<HashMap<String, QueryFilter>> {
		let mut restrictions = HashMap::new();
		let mut worklist = vec![(definition, filter.clone())];
		while let Some((definition, filter)) = worklist.pop() {
			for field in filter.referenced_fields() {
				let Some(relationship) = definition.relationship(&field) else {
					continue;
				};
				let related = self.catalog.get(&relationship.related_entity)?;
				if !restrictions.contains_key(&related.name) {
					let restriction = self
						.permission_filter(&related.name, AccessType::Read)
						.await?;
					restrictions.insert(related.name.clone(), restriction);
				}
				worklist.extend(
					filter
						.relation_filters(&field)
						.into_iter()
						.map(|sub| (related, sub)),
				);
			}
		}
		Ok(restrictions)
	}
}

fn restrict_relationships(
	catalog: &EntityCatalog,
	definition: &EntityDefinition,
	filter: &QueryFilter,
	restrictions: &HashMap<String, QueryFilter>,
) -> Result<QueryFilter> {
	let mut authorized = filter.clone();
	for field in filter.referenced_fields() {
		let Some(relationship) = definition.relationship(&field) else {
			continue;
		};
		let related = catalog.get(&relationship.related_entity)?;
		let restriction = restrictions.get(&related.name).ok_or(AclError::Forbidden)?;
		authorized = authorized
			.map_relation(&field, |sub| restrict_relationships(catalog, related, sub, restrictions))?
			.restrict_relation(&field, &related.primary_key, restriction)?;
	}
	Ok(authorized)
}

impl Drop for RequestScope {
	fn drop(&mut self) {
		self.context.clear_context();
		self.loader.clear_cache();
		debug!(request_id = %self.request_id, "request finished");
	}
}
