// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Batched relational loading for one request.
//!
//! [`RequestLoader`] turns many single-key loads issued while resolving one
//! response into a few provider calls:
//!
//! - `load_by_id` batches into one `find({ <pk>_in: [...] })` per entity
//! - `load_by_related_id` batches into one `find_by_related_id` per
//!   entity and relationship field, and groups rows by the id they reference
//!
//! Results come back to each caller in the caller's own order, settled loads
//! are memoised until [`RequestLoader::clear_cache`], and a failed provider
//! call fails every load of that batch with the same error.

pub mod config;
pub mod loader;

pub use config::{LoaderConfig, DEFAULT_MAX_BATCH_SIZE};
pub use loader::{LoadedRow, LoadedRows, RequestLoader};
