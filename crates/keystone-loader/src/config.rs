// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_BATCH_SIZE: usize = 1000;

/// Tuning for a [`crate::RequestLoader`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
	/// Largest id list sent to a provider in one call. Bigger batches are split.
	pub max_batch_size: usize,
	/// Keep settled loads for the rest of the request. When off, loads still
	/// coalesce but every new batch goes to the provider.
	pub cache: bool,
}

impl Default for LoaderConfig {
	fn default() -> Self {
		Self {
			max_batch_size: DEFAULT_MAX_BATCH_SIZE,
			cache: true,
		}
	}
}

impl LoaderConfig {
	pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
		self.max_batch_size = max_batch_size;
		self
	}

	pub fn without_cache(mut self) -> Self {
		self.cache = false;
		self
	}

	pub(crate) fn chunk_size(&self) -> usize {
		self.max_batch_size.max(1)
	}
}
