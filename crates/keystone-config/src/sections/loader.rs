// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Batched loader tuning.

pub use keystone_loader::{LoaderConfig, DEFAULT_MAX_BATCH_SIZE};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoaderConfigLayer {
	#[serde(default)]
	pub max_batch_size: Option<usize>,
	#[serde(default)]
	pub cache: Option<bool>,
}

impl LoaderConfigLayer {
	pub fn merge(&mut self, other: LoaderConfigLayer) {
		if other.max_batch_size.is_some() {
			self.max_batch_size = other.max_batch_size;
		}
		if other.cache.is_some() {
			self.cache = other.cache;
		}
	}

	pub fn finalize(self) -> LoaderConfig {
		LoaderConfig {
			max_batch_size: self.max_batch_size.unwrap_or(DEFAULT_MAX_BATCH_SIZE),
			cache: self.cache.unwrap_or(true),
		}
	}
}
