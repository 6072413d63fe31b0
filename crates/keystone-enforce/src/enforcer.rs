// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Process-wide enforcement state.

use std::sync::Arc;

use keystone_config::KeystoneConfig;
use keystone_core::{AccessControlList, AclRegistry, AuthorizationContext, EntityCatalog};
use keystone_loader::LoaderConfig;
use tracing::info;

use crate::scope::RequestScope;

/// Owns everything that outlives a request: the ACL registry, the entity
/// catalog and loader tuning. Hands out one [`RequestScope`] per request.
#[derive(Debug, Clone)]
pub struct Enforcer {
	registry: Arc<AclRegistry>,
	catalog: Arc<EntityCatalog>,
	loader: LoaderConfig,
}

impl Enforcer {
	pub fn new(registry: AclRegistry, catalog: EntityCatalog) -> Self {
		Self {
			registry: Arc::new(registry),
			catalog: Arc::new(catalog),
			loader: LoaderConfig::default(),
		}
	}

	/// Builds the registry from resolved configuration.
	pub fn from_config(config: &KeystoneConfig, catalog: EntityCatalog) -> Self {
		let registry = AclRegistry::with_everyone_role(config.acl.everyone_role.clone());
		if let Some(admin) = &config.acl.administrator_role {
			registry.set_administrator_role_name(admin.clone());
		}
		info!(
			entities = catalog.names().count(),
			everyone_role = %config.acl.everyone_role,
			"enforcer configured"
		);

		Self {
			registry: Arc::new(registry),
			catalog: Arc::new(catalog),
			loader: config.loader.clone(),
		}
	}

	pub fn with_loader_config(mut self, loader: LoaderConfig) -> Self {
		self.loader = loader;
		self
	}

	/// Registers (or replaces) the ACL for `entity`.
	pub fn register_acl(&self, entity: &str, acl: AccessControlList) {
		self.registry.register(entity, acl);
	}

	pub fn registry(&self) -> &AclRegistry {
		&self.registry
	}

	pub fn catalog(&self) -> &EntityCatalog {
		&self.catalog
	}

	/// Starts a request running as `context`.
	pub fn begin_request(&self, context: AuthorizationContext) -> RequestScope {
		RequestScope::new(
			Arc::clone(&self.registry),
			Arc::clone(&self.catalog),
			self.loader.clone(),
			context,
		)
	}
}
