// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Partial configuration as produced by a single source.

use serde::Deserialize;

use crate::sections::{AclConfigLayer, LoaderConfigLayer, LoggingConfigLayer};

/// One source's view of the configuration. Absent sections leave lower
/// precedence values untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeystoneConfigLayer {
	#[serde(default)]
	pub acl: Option<AclConfigLayer>,
	#[serde(default)]
	pub loader: Option<LoaderConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
}

impl KeystoneConfigLayer {
	pub fn merge(&mut self, other: KeystoneConfigLayer) {
		merge_section(&mut self.acl, other.acl, AclConfigLayer::merge);
		merge_section(&mut self.loader, other.loader, LoaderConfigLayer::merge);
		merge_section(&mut self.logging, other.logging, LoggingConfigLayer::merge);
	}
}

fn merge_section<T>(current: &mut Option<T>, other: Option<T>, merge: fn(&mut T, T)) {
	let Some(other) = other else {
		return;
	};
	match current {
		Some(existing) => merge(existing, other),
		None => *current = Some(other),
	}
}
