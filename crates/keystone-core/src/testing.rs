// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Test support: an in-memory [`DataProvider`] that records every call.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ProviderError;
use crate::filter::QueryFilter;
use crate::provider::{DataProvider, EntityId, Pagination, ProviderResult, Row, Sort};

/// Number of times each provider method was invoked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
	pub find: usize,
	pub find_one: usize,
	pub find_by_related_id: usize,
	pub create_one: usize,
	pub update_one: usize,
	pub delete_one: usize,
}

impl CallCounts {
	pub fn total(&self) -> usize {
		self.find
			+ self.find_one
			+ self.find_by_related_id
			+ self.create_one
			+ self.update_one
			+ self.delete_one
	}

	pub fn writes(&self) -> usize {
		self.create_one + self.update_one + self.delete_one
	}
}

/// Rows held in memory; filters are evaluated with [`QueryFilter::matches`].
#[derive(Debug)]
pub struct MemoryProvider {
	name: String,
	primary_key: String,
	rows: Mutex<Vec<Row>>,
	calls: Mutex<CallCounts>,
	filters: Mutex<Vec<QueryFilter>>,
	related_batches: Mutex<Vec<Vec<EntityId>>>,
	failure: Mutex<Option<String>>,
	next_id: AtomicU64,
}

impl MemoryProvider {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			primary_key: "id".to_string(),
			rows: Mutex::new(Vec::new()),
			calls: Mutex::new(CallCounts::default()),
			filters: Mutex::new(Vec::new()),
			related_batches: Mutex::new(Vec::new()),
			failure: Mutex::new(None),
			next_id: AtomicU64::new(1),
		}
	}

	pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
		self.primary_key = primary_key.into();
		self
	}

	/// Seeds rows from JSON objects. Non-objects are ignored.
	pub fn with_rows(self, rows: impl IntoIterator<Item = Value>) -> Self {
		for row in rows {
			self.insert(row);
		}
		self
	}

	pub fn insert(&self, row: Value) {
		if let Value::Object(map) = row {
			lock(&self.rows).push(map);
		}
	}

	pub fn rows(&self) -> Vec<Row> {
		lock(&self.rows).clone()
	}

	pub fn calls(&self) -> CallCounts {
		*lock(&self.calls)
	}

	/// Every filter passed to `find`, `find_one`, `find_by_related_id` and
	/// `delete_one`, oldest first.
	pub fn filters_seen(&self) -> Vec<QueryFilter> {
		lock(&self.filters).clone()
	}

	/// The id lists passed to each `find_by_related_id` call.
	pub fn related_batches(&self) -> Vec<Vec<EntityId>> {
		lock(&self.related_batches).clone()
	}

	pub fn reset_calls(&self) {
		*lock(&self.calls) = CallCounts::default();
		lock(&self.filters).clear();
		lock(&self.related_batches).clear();
	}

	/// Makes every following call fail with `message` until cleared.
	pub fn fail_with(&self, message: impl Into<String>) {
		*lock(&self.failure) = Some(message.into());
	}

	pub fn clear_failure(&self) {
		*lock(&self.failure) = None;
	}

	fn record(&self, count: impl FnOnce(&mut CallCounts), filter: Option<&QueryFilter>) -> ProviderResult<()> {
		{
			let mut calls = lock(&self.calls);
			count(&mut *calls);
		}
		if let Some(filter) = filter {
			lock(&self.filters).push(filter.clone());
		}
		match lock(&self.failure).as_ref() {
			Some(message) => Err(ProviderError::new(message.clone())),
			None => Ok(()),
		}
	}

	fn row_id(&self, row: &Row) -> Option<EntityId> {
		row.get(&self.primary_key).and_then(EntityId::from_value)
	}

	fn references_any(&self, value: Option<&Value>, ids: &[EntityId]) -> bool {
		let Some(value) = value else {
			return false;
		};
		let hit = |v: &Value| {
			self
				.get_related_entity_id(v, "id")
				.is_some_and(|id| ids.contains(&id))
		};
		match value {
			Value::Array(items) if self.is_collection(value) => items.iter().any(hit),
			other => hit(other),
		}
	}
}

#[async_trait]
impl DataProvider for MemoryProvider {
	fn backend_id(&self) -> &str {
		&self.name
	}

	async fn find(
		&self,
		filter: &QueryFilter,
		pagination: Option<&Pagination>,
	) -> ProviderResult<Vec<Row>> {
		self.record(|c| c.find += 1, Some(filter))?;
		let mut rows: Vec<Row> = lock(&self.rows)
			.iter()
			.filter(|row| filter.matches(row))
			.cloned()
			.collect();

		if let Some(page) = pagination {
			for (field, sort) in page.order_by.iter().rev() {
				rows.sort_by(|a, b| {
					let ordering = compare_values(a.get(field), b.get(field));
					match sort {
						Sort::Asc => ordering,
						Sort::Desc => ordering.reverse(),
					}
				});
			}
			let rows = rows.into_iter().skip(page.offset);
			return Ok(match page.limit {
				Some(limit) => rows.take(limit).collect(),
				None => rows.collect(),
			});
		}
		Ok(rows)
	}

	async fn find_one(&self, filter: &QueryFilter) -> ProviderResult<Option<Row>> {
		self.record(|c| c.find_one += 1, Some(filter))?;
		Ok(lock(&self.rows).iter().find(|row| filter.matches(row)).cloned())
	}

	async fn find_by_related_id(
		&self,
		_entity: &str,
		related_field: &str,
		ids: &[EntityId],
		filter: Option<&QueryFilter>,
	) -> ProviderResult<Vec<Row>> {
		self.record(|c| c.find_by_related_id += 1, filter)?;
		lock(&self.related_batches).push(ids.to_vec());
		Ok(lock(&self.rows)
			.iter()
			.filter(|row| self.references_any(row.get(related_field), ids))
			.filter(|row| filter.map_or(true, |f| f.matches(row)))
			.cloned()
			.collect())
	}

	async fn create_one(&self, mut entity: Row) -> ProviderResult<Row> {
		self.record(|c| c.create_one += 1, None)?;
		if !entity.contains_key(&self.primary_key) {
			let id = self.next_id.fetch_add(1, AtomicOrdering::SeqCst);
			entity.insert(
				self.primary_key.clone(),
				Value::String(format!("{}-{id}", self.name)),
			);
		}
		lock(&self.rows).push(entity.clone());
		Ok(entity)
	}

	async fn update_one(&self, id: &EntityId, entity: Row) -> ProviderResult<Row> {
		self.record(|c| c.update_one += 1, None)?;
		let mut rows = lock(&self.rows);
		let row = rows
			.iter_mut()
			.find(|row| self.row_id(row).as_ref() == Some(id))
			.ok_or_else(|| ProviderError::new(format!("{} {id} not found", self.name)))?;
		for (key, value) in entity {
			row.insert(key, value);
		}
		Ok(row.clone())
	}

	async fn delete_one(&self, filter: &QueryFilter) -> ProviderResult<bool> {
		self.record(|c| c.delete_one += 1, Some(filter))?;
		let mut rows = lock(&self.rows);
		match rows.iter().position(|row| filter.matches(row)) {
			Some(index) => {
				rows.remove(index);
				Ok(true)
			}
			None => Ok(false),
		}
	}
}

/// Unwraps a JSON object literal into a [`Row`].
pub fn row(value: Value) -> Row {
	match value {
		Value::Object(map) => map,
		_ => Row::new(),
	}
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
	match (a, b) {
		(Some(Value::Number(a)), Some(Value::Number(b))) => a
			.as_f64()
			.partial_cmp(&b.as_f64())
			.unwrap_or(Ordering::Equal),
		(Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
		(None, Some(_)) => Ordering::Less,
		(Some(_), None) => Ordering::Greater,
		_ => Ordering::Equal,
	}
}
