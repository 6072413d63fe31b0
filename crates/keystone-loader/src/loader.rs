// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Request-scoped load coalescing.
//!
//! A load registers its key in the pending batch for its
//! `(entity, [field,] filter)` group, yields once, then dispatches whatever
//! that group has accumulated. Loads polled together (`join_all`, sibling
//! field resolvers) therefore share one provider call. [`RequestLoader::flush`]
//! dispatches every pending group at an explicit boundary.
//!
//! Every registered key gets a shared future, so repeated loads of the same
//! key within a request settle to the same `Arc`.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{join_all, try_join_all, BoxFuture, Shared};
use futures::FutureExt;
use keystone_core::{AclError, DataProvider, EntityDefinition, EntityId, QueryFilter, Result, Row};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, instrument, trace, warn};

use crate::config::LoaderConfig;

type SharedLoad<V> = Shared<BoxFuture<'static, Result<V>>>;
type Waiter<V> = (EntityId, oneshot::Sender<Result<V>>);

/// Identifies one coalescing group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BatchKey {
	entity: String,
	field: Option<String>,
	filter: String,
}

impl BatchKey {
	fn new(entity: &str, field: Option<&str>, filter: Option<&QueryFilter>) -> Self {
		Self {
			entity: entity.to_string(),
			field: field.map(str::to_string),
			filter: filter.map(QueryFilter::cache_key).unwrap_or_default(),
		}
	}
}

/// What a dispatch needs besides the waiters.
#[derive(Clone)]
struct BatchMeta {
	generation: u64,
	entity: String,
	field: Option<String>,
	primary_key: String,
	provider: Arc<dyn DataProvider>,
	filter: Option<QueryFilter>,
}

struct Pending<V> {
	meta: BatchMeta,
	waiters: Vec<Waiter<V>>,
}

struct Entry<V> {
	generation: u64,
	load: SharedLoad<V>,
}

struct Channel<V> {
	cache: HashMap<(BatchKey, EntityId), Entry<V>>,
	pending: HashMap<BatchKey, Pending<V>>,
}

impl<V> Default for Channel<V> {
	fn default() -> Self {
		Self {
			cache: HashMap::new(),
			pending: HashMap::new(),
		}
	}
}

impl<V> Channel<V> {
	/// Drops cache entries created by batch `generation`.
	fn evict(&mut self, key: &BatchKey, generation: u64, ids: &[EntityId]) {
		for id in ids {
			let cache_key = (key.clone(), id.clone());
			if self
				.cache
				.get(&cache_key)
				.is_some_and(|entry| entry.generation == generation)
			{
				self.cache.remove(&cache_key);
			}
		}
	}
}

/// Cache entries of one dispatched chunk.
///
/// Dropping an unfinished settlement evicts the chunk's entries, so a fetch
/// cancelled mid-flight leaves nothing behind for later loads to hit.
struct Settlement<'a, V> {
	channel: &'a Mutex<Channel<V>>,
	key: &'a BatchKey,
	generation: u64,
	ids: Vec<EntityId>,
	keep: bool,
}

impl<'a, V> Settlement<'a, V> {
	fn new(channel: &'a Mutex<Channel<V>>, key: &'a BatchKey, generation: u64, waiters: &[Waiter<V>]) -> Self {
		Self {
			channel,
			key,
			generation,
			ids: waiters.iter().map(|(id, _)| id.clone()).collect(),
			keep: false,
		}
	}

	/// Keeps the entries when `keep`, evicts them otherwise.
	fn finish(mut self, keep: bool) {
		self.keep = keep;
	}
}

impl<V> Drop for Settlement<'_, V> {
	fn drop(&mut self) {
		if !self.keep {
			lock(self.channel).evict(self.key, self.generation, &self.ids);
		}
	}
}

/// A row loaded by primary key; `None` when the provider returned nothing.
pub type LoadedRow = Option<Arc<Row>>;

/// Rows loaded through a relationship field; empty when nothing matched.
pub type LoadedRows = Vec<Arc<Row>>;

/// Batching, caching loader owned by a single request.
pub struct RequestLoader {
	config: LoaderConfig,
	generation: AtomicU64,
	by_id: Mutex<Channel<LoadedRow>>,
	by_related: Mutex<Channel<LoadedRows>>,
}

impl Default for RequestLoader {
	fn default() -> Self {
		Self::new(LoaderConfig::default())
	}
}

impl std::fmt::Debug for RequestLoader {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RequestLoader")
			.field("config", &self.config)
			.field("pending", &self.pending_len())
			.field("cached", &self.cached_len())
			.finish()
	}
}

impl RequestLoader {
	pub fn new(config: LoaderConfig) -> Self {
		Self {
			config,
			generation: AtomicU64::new(0),
			by_id: Mutex::new(Channel::default()),
			by_related: Mutex::new(Channel::default()),
		}
	}

	pub fn config(&self) -> &LoaderConfig {
		&self.config
	}

	/// Loads one row of `entity` by primary key.
	pub async fn load_by_id(&self, entity: &EntityDefinition, id: impl Into<EntityId>) -> Result<LoadedRow> {
		self.load_by_id_inner(entity, id.into(), None).await
	}

	/// Like [`load_by_id`](Self::load_by_id), with `filter` ANDed into the
	/// provider call. Loads with different filters never share a batch.
	pub async fn load_by_id_filtered(
		&self,
		entity: &EntityDefinition,
		id: impl Into<EntityId>,
		filter: &QueryFilter,
	) -> Result<LoadedRow> {
		self
			.load_by_id_inner(entity, id.into(), non_empty(filter))
			.await
	}

	/// Loads several rows, answered in the order of `ids`.
	pub async fn load_many<I>(&self, entity: &EntityDefinition, ids: I) -> Result<Vec<LoadedRow>>
	where
		I: IntoIterator,
		I::Item: Into<EntityId>,
	{
		try_join_all(ids.into_iter().map(|id| self.load_by_id(entity, id))).await
	}

	/// Rows of `entity` whose `related_field` references `id`.
	pub async fn load_by_related_id(
		&self,
		entity: &EntityDefinition,
		related_field: &str,
		id: impl Into<EntityId>,
	) -> Result<LoadedRows> {
		self
			.load_by_related_inner(entity, related_field, id.into(), None)
			.await
	}

	pub async fn load_by_related_id_filtered(
		&self,
		entity: &EntityDefinition,
		related_field: &str,
		id: impl Into<EntityId>,
		filter: &QueryFilter,
	) -> Result<LoadedRows> {
		self
			.load_by_related_inner(entity, related_field, id.into(), non_empty(filter))
			.await
	}

	/// Dispatches every pending batch now.
	pub async fn flush(&self) {
		let by_id: Vec<BatchKey> = lock(&self.by_id).pending.keys().cloned().collect();
		let by_related: Vec<BatchKey> = lock(&self.by_related).pending.keys().cloned().collect();
		debug!(
			by_id = by_id.len(),
			by_related = by_related.len(),
			"flushing pending batches"
		);

		let id_batches = join_all(by_id.iter().map(|key| self.dispatch_by_id(key)));
		let related_batches = join_all(by_related.iter().map(|key| self.dispatch_by_related(key)));
		futures::join!(id_batches, related_batches);
	}

	/// Forgets every cached load and abandons pending batches.
	///
	/// Waiters of an abandoned batch receive an error rather than a value.
	pub fn clear_cache(&self) {
		let mut by_id = lock(&self.by_id);
		let mut by_related = lock(&self.by_related);
		let abandoned = by_id.pending.len() + by_related.pending.len();
		if abandoned > 0 {
			warn!(abandoned, "clearing loader with batches still pending");
		}
		*by_id = Channel::default();
		*by_related = Channel::default();
		trace!("loader cache cleared");
	}

	/// Keys registered but not yet dispatched.
	pub fn pending_len(&self) -> usize {
		count_pending(&lock(&self.by_id).pending) + count_pending(&lock(&self.by_related).pending)
	}

	/// Keys with a cached (settled or in-flight) load.
	pub fn cached_len(&self) -> usize {
		lock(&self.by_id).cache.len() + lock(&self.by_related).cache.len()
	}

	async fn load_by_id_inner(
		&self,
		entity: &EntityDefinition,
		id: EntityId,
		filter: Option<QueryFilter>,
	) -> Result<LoadedRow> {
		let key = BatchKey::new(&entity.name, None, filter.as_ref());
		let load = self.register(&self.by_id, &key, id, || BatchMeta {
			generation: 0,
			entity: entity.name.clone(),
			field: None,
			primary_key: entity.primary_key.clone(),
			provider: Arc::clone(&entity.provider),
			filter,
		});
		if let Some(settled) = load.peek() {
			return settled.clone();
		}

		tokio::task::yield_now().await;
		self.dispatch_by_id(&key).await;
		load.await
	}

	async fn load_by_related_inner(
		&self,
		entity: &EntityDefinition,
		related_field: &str,
		id: EntityId,
		filter: Option<QueryFilter>,
	) -> Result<LoadedRows> {
		let key = BatchKey::new(&entity.name, Some(related_field), filter.as_ref());
		let load = self.register(&self.by_related, &key, id, || BatchMeta {
			generation: 0,
			entity: entity.name.clone(),
			field: Some(related_field.to_string()),
			primary_key: entity.primary_key.clone(),
			provider: Arc::clone(&entity.provider),
			filter,
		});
		if let Some(settled) = load.peek() {
			return settled.clone();
		}

		tokio::task::yield_now().await;
		self.dispatch_by_related(&key).await;
		load.await
	}

	/// Returns the cached load for `(key, id)` or queues a new one.
	fn register<V>(
		&self,
		channel: &Mutex<Channel<V>>,
		key: &BatchKey,
		id: EntityId,
		meta: impl FnOnce() -> BatchMeta,
	) -> SharedLoad<V>
	where
		V: Clone + Send + Sync + 'static,
	{
		let mut state = lock(channel);
		let cache_key = (key.clone(), id);
		if let Some(entry) = state.cache.get(&cache_key) {
			trace!(entity = %key.entity, id = %cache_key.1, "loader cache hit");
			return entry.load.clone();
		}

		let (tx, rx) = oneshot::channel();
		let load = rx
			.map(|received| {
				received.unwrap_or_else(|_| {
					Err(AclError::Internal(
						"load abandoned before its batch completed".to_string(),
					))
				})
			})
			.boxed()
			.shared();

		let generation = match state.pending.get_mut(key) {
			Some(pending) => {
				pending.waiters.push((cache_key.1.clone(), tx));
				pending.meta.generation
			}
			None => {
				let mut meta = meta();
				meta.generation = self.generation.fetch_add(1, Ordering::SeqCst);
				let generation = meta.generation;
				state.pending.insert(
					key.clone(),
					Pending {
						meta,
						waiters: vec![(cache_key.1.clone(), tx)],
					},
				);
				generation
			}
		};

		state.cache.insert(
			cache_key,
			Entry {
				generation,
				load: load.clone(),
			},
		);
		load
	}

	fn take<V>(&self, channel: &Mutex<Channel<V>>, key: &BatchKey) -> Option<Pending<V>> {
		lock(channel).pending.remove(key)
	}

	/// Splits waiters into provider-sized chunks.
	fn chunks<V>(&self, mut waiters: Vec<Waiter<V>>) -> Vec<Vec<Waiter<V>>> {
		let size = self.config.chunk_size();
		let mut chunks = Vec::with_capacity(waiters.len().div_ceil(size));
		while waiters.len() > size {
			let rest = waiters.split_off(size);
			chunks.push(std::mem::replace(&mut waiters, rest));
		}
		if !waiters.is_empty() {
			chunks.push(waiters);
		}
		chunks
	}

	async fn dispatch_by_id(&self, key: &BatchKey) {
		let Some(pending) = self.take(&self.by_id, key) else {
			return;
		};
		let meta = pending.meta;
		let chunks = self.chunks(pending.waiters);
		join_all(chunks.into_iter().map(|chunk| {
			let settlement = Settlement::new(&self.by_id, key, meta.generation, &chunk);
			self.fetch_by_id(&meta, chunk, settlement)
		}))
		.await;
	}

	#[instrument(level = "debug", skip_all, fields(entity = %meta.entity, batch_size = waiters.len()))]
	async fn fetch_by_id(
		&self,
		meta: &BatchMeta,
		waiters: Vec<Waiter<LoadedRow>>,
		settlement: Settlement<'_, LoadedRow>,
	) {
		let by_ids = QueryFilter::eq(
			format!("{}_in", meta.primary_key),
			Value::Array(settlement.ids.iter().map(EntityId::to_value).collect()),
		);
		let filter = by_ids.and(meta.filter.clone().unwrap_or_default());

		match meta.provider.find(&filter, None).await {
			Ok(rows) => {
				let mut index: HashMap<EntityId, Arc<Row>> = HashMap::with_capacity(rows.len());
				for row in rows {
					if let Some(id) = row.get(&meta.primary_key).and_then(EntityId::from_value) {
						index.entry(id).or_insert_with(|| Arc::new(row));
					}
				}
				debug!(requested = waiters.len(), found = index.len(), "batch loaded");
				settlement.finish(self.config.cache);
				for (id, tx) in waiters {
					let _ = tx.send(Ok(index.get(&id).cloned()));
				}
			}
			Err(e) => {
				warn!(error = %e, "batch load failed");
				settlement.finish(false);
				let err = AclError::from(e);
				for (_, tx) in waiters {
					let _ = tx.send(Err(err.clone()));
				}
			}
		}
	}

	async fn dispatch_by_related(&self, key: &BatchKey) {
		let Some(pending) = self.take(&self.by_related, key) else {
			return;
		};
		let meta = pending.meta;
		let chunks = self.chunks(pending.waiters);
		join_all(chunks.into_iter().map(|chunk| {
			let settlement = Settlement::new(&self.by_related, key, meta.generation, &chunk);
			self.fetch_by_related(&meta, chunk, settlement)
		}))
		.await;
	}

	#[instrument(
		level = "debug",
		skip_all,
		fields(entity = %meta.entity, field = meta.field.as_deref().unwrap_or(""), batch_size = waiters.len())
	)]
	async fn fetch_by_related(
		&self,
		meta: &BatchMeta,
		waiters: Vec<Waiter<LoadedRows>>,
		settlement: Settlement<'_, LoadedRows>,
	) {
		let field = meta.field.as_deref().unwrap_or_default();
		let result = meta
			.provider
			.find_by_related_id(&meta.entity, field, &settlement.ids, meta.filter.as_ref())
			.await;

		match result {
			Ok(rows) => {
				let requested: HashSet<&EntityId> = settlement.ids.iter().collect();
				let mut groups: HashMap<EntityId, LoadedRows> = HashMap::new();
				for row in rows {
					let row = Arc::new(row);
					for related in related_ids(meta.provider.as_ref(), row.get(field)) {
						if requested.contains(&related) {
							groups.entry(related).or_default().push(Arc::clone(&row));
						}
					}
				}
				debug!(requested = waiters.len(), matched = groups.len(), "related batch loaded");
				drop(requested);
				settlement.finish(self.config.cache);
				for (id, tx) in waiters {
					let _ = tx.send(Ok(groups.get(&id).cloned().unwrap_or_default()));
				}
			}
			Err(e) => {
				warn!(error = %e, "related batch load failed");
				settlement.finish(false);
				let err = AclError::from(e);
				for (_, tx) in waiters {
					let _ = tx.send(Err(err.clone()));
				}
			}
		}
	}
}

/// Ids a relationship value references, each once.
///
/// A collection contributes every member, a single reference contributes one.
fn related_ids(provider: &dyn DataProvider, value: Option<&Value>) -> Vec<EntityId> {
	let Some(value) = value else {
		return Vec::new();
	};
	let mut ids = Vec::new();
	match value {
		Value::Array(items) if provider.is_collection(value) => {
			for item in items {
				if let Some(id) = provider.get_related_entity_id(item, "id") {
					if !ids.contains(&id) {
						ids.push(id);
					}
				}
			}
		}
		single => ids.extend(provider.get_related_entity_id(single, "id")),
	}
	ids
}

fn count_pending<V>(pending: &HashMap<BatchKey, Pending<V>>) -> usize {
	pending.values().map(|p| p.waiters.len()).sum()
}

fn non_empty(filter: &QueryFilter) -> Option<QueryFilter> {
	(!filter.is_empty()).then(|| filter.clone())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(|e| e.into_inner())
}
