// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The storage contract every entity's data provider satisfies.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProviderError;
use crate::filter::QueryFilter;

/// A single entity row as exchanged with providers.
pub type Row = Map<String, Value>;

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Primary key of an entity row, normalised to text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	/// Reads an id from a JSON scalar. Objects, arrays and null have no id.
	pub fn from_value(value: &Value) -> Option<Self> {
		match value {
			Value::String(s) => Some(Self(s.clone())),
			Value::Number(n) => Some(Self(n.to_string())),
			_ => None,
		}
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn to_value(&self) -> Value {
		Value::String(self.0.clone())
	}
}

impl fmt::Display for EntityId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for EntityId {
	fn from(value: &str) -> Self {
		Self(value.to_string())
	}
}

impl From<String> for EntityId {
	fn from(value: String) -> Self {
		Self(value)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sort {
	Asc,
	Desc,
}

/// Paging and ordering for list reads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
	#[serde(default)]
	pub offset: usize,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub limit: Option<usize>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub order_by: Vec<(String, Sort)>,
}

impl Pagination {
	pub fn new(offset: usize, limit: usize) -> Self {
		Self {
			offset,
			limit: Some(limit),
			order_by: Vec::new(),
		}
	}

	pub fn order_by(mut self, field: impl Into<String>, sort: Sort) -> Self {
		self.order_by.push((field.into(), sort));
		self
	}
}

/// Storage backend for one entity type.
///
/// Implementations live outside this crate (SQL, REST, ...). Every call made
/// through the enforcement layer has already been authorised; filters handed
/// in already include the permission filter.
#[async_trait]
pub trait DataProvider: Send + Sync {
	/// Short backend name for logs.
	fn backend_id(&self) -> &str;

	async fn find(
		&self,
		filter: &QueryFilter,
		pagination: Option<&Pagination>,
	) -> ProviderResult<Vec<Row>>;

	async fn find_one(&self, filter: &QueryFilter) -> ProviderResult<Option<Row>>;

	/// Rows whose `related_field` references any of `ids`.
	async fn find_by_related_id(
		&self,
		entity: &str,
		related_field: &str,
		ids: &[EntityId],
		filter: Option<&QueryFilter>,
	) -> ProviderResult<Vec<Row>>;

	async fn create_one(&self, entity: Row) -> ProviderResult<Row>;

	async fn update_one(&self, id: &EntityId, entity: Row) -> ProviderResult<Row>;

	async fn delete_one(&self, filter: &QueryFilter) -> ProviderResult<bool>;

	/// Whether a relationship value holds many references.
	fn is_collection(&self, value: &Value) -> bool {
		value.is_array()
	}

	/// The id referenced by a relationship value: a bare id, or `value[field]`
	/// for an embedded row.
	fn get_related_entity_id(&self, value: &Value, field: &str) -> Option<EntityId> {
		match value {
			Value::Object(map) => map.get(field).and_then(EntityId::from_value),
			other => EntityId::from_value(other),
		}
	}
}
