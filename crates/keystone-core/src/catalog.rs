// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Entity metadata the enforcement layer needs: which provider backs an
//! entity, its primary key, and how its relationship fields are shaped.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{AclError, Result};
use crate::provider::DataProvider;

pub const DEFAULT_PRIMARY_KEY: &str = "id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationshipKind {
	/// The parent row holds one reference to the related row.
	ManyToOne,
	/// Related rows reference the parent through `related_field`.
	OneToMany { related_field: String },
	/// Related rows hold a collection field, `related_field`, that may list
	/// the parent.
	ManyToMany { related_field: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
	pub related_entity: String,
	pub kind: RelationshipKind,
}

impl Relationship {
	pub fn many_to_one(related_entity: impl Into<String>) -> Self {
		Self {
			related_entity: related_entity.into(),
			kind: RelationshipKind::ManyToOne,
		}
	}

	pub fn one_to_many(related_entity: impl Into<String>, related_field: impl Into<String>) -> Self {
		Self {
			related_entity: related_entity.into(),
			kind: RelationshipKind::OneToMany {
				related_field: related_field.into(),
			},
		}
	}

	pub fn many_to_many(related_entity: impl Into<String>, related_field: impl Into<String>) -> Self {
		Self {
			related_entity: related_entity.into(),
			kind: RelationshipKind::ManyToMany {
				related_field: related_field.into(),
			},
		}
	}

	/// The field on the related entity that points back at the parent, if the
	/// relationship is loaded from the related side.
	pub fn inverse_field(&self) -> Option<&str> {
		match &self.kind {
			RelationshipKind::ManyToOne => None,
			RelationshipKind::OneToMany { related_field }
			| RelationshipKind::ManyToMany { related_field } => Some(related_field),
		}
	}
}

#[derive(Clone)]
pub struct EntityDefinition {
	pub name: String,
	pub primary_key: String,
	pub provider: Arc<dyn DataProvider>,
	pub relationships: HashMap<String, Relationship>,
}

impl EntityDefinition {
	pub fn new(name: impl Into<String>, provider: Arc<dyn DataProvider>) -> Self {
		Self {
			name: name.into(),
			primary_key: DEFAULT_PRIMARY_KEY.to_string(),
			provider,
			relationships: HashMap::new(),
		}
	}

	pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
		self.primary_key = primary_key.into();
		self
	}

	pub fn with_relationship(mut self, field: impl Into<String>, relationship: Relationship) -> Self {
		self.relationships.insert(field.into(), relationship);
		self
	}

	pub fn relationship(&self, field: &str) -> Option<&Relationship> {
		self.relationships.get(field)
	}
}

impl fmt::Debug for EntityDefinition {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("EntityDefinition")
			.field("name", &self.name)
			.field("primary_key", &self.primary_key)
			.field("provider", &self.provider.backend_id())
			.field("relationships", &self.relationships)
			.finish()
	}
}

/// Every entity the enforcement layer can reach, by name.
#[derive(Debug, Default, Clone)]
pub struct EntityCatalog {
	entities: HashMap<String, EntityDefinition>,
}

impl EntityCatalog {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register(&mut self, definition: EntityDefinition) {
		self.entities.insert(definition.name.clone(), definition);
	}

	pub fn with(mut self, definition: EntityDefinition) -> Self {
		self.register(definition);
		self
	}

	pub fn get(&self, name: &str) -> Result<&EntityDefinition> {
		self
			.entities
			.get(name)
			.ok_or_else(|| AclError::Configuration(format!("Unknown entity: {name}")))
	}

	pub fn contains(&self, name: &str) -> bool {
		self.entities.contains_key(name)
	}

	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.entities.keys().map(String::as_str)
	}
}
