// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

mod acl;
mod loader;
mod logging;

pub use acl::{AclConfig, AclConfigLayer, DEFAULT_EVERYONE_ROLE};
pub use loader::{LoaderConfig, LoaderConfigLayer, DEFAULT_MAX_BATCH_SIZE};
pub use logging::{LogFormat, LoggingConfig, LoggingConfigLayer};
