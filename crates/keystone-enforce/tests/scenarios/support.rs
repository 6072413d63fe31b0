// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use keystone_core::testing::MemoryProvider;
use keystone_core::{
	AccessControlList, AclRegistry, AuthorizationContext, EntityCatalog, EntityDefinition,
	Relationship, RoleGrants,
};
use keystone_enforce::{Enforcer, RequestScope};
use serde_json::json;

pub const ADMIN: &str = "admin";

/// Four entities over in-memory providers:
///
/// - `Artist` has many `Album`s; each album embeds its artist reference
/// - `Tag` has many `Task`s through the task's `tags` list
pub struct Fixture {
	pub enforcer: Enforcer,
	pub artists: Arc<MemoryProvider>,
	pub albums: Arc<MemoryProvider>,
	pub tasks: Arc<MemoryProvider>,
	pub tags: Arc<MemoryProvider>,
}

impl Fixture {
	pub fn new() -> Self {
		let artists = Arc::new(MemoryProvider::new("Artist").with_rows([
			json!({"id": "a1", "name": "Rush"}),
			json!({"id": "a2", "name": "Yes"}),
		]));
		let albums = Arc::new(MemoryProvider::new("Album").with_rows([
			json!({"id": "al1", "title": "Moving Pictures", "artist": {"id": "a1", "name": "Rush"}}),
			json!({"id": "al2", "title": "2112", "artist": {"id": "a1", "name": "Rush"}}),
			json!({"id": "al3", "title": "Fragile", "artist": {"id": "a2", "name": "Yes"}}),
		]));
		let tasks = Arc::new(MemoryProvider::new("Task").with_rows([
			json!({"id": "t1", "userId": "u1", "tags": ["tag1"]}),
			json!({"id": "t2", "userId": "u2", "tags": ["tag1"]}),
			json!({"id": "t3", "userId": "u1", "tags": ["tag2"]}),
			json!({"id": "t4", "userId": "u1", "tags": ["tag2"]}),
			json!({"id": "t5", "userId": "u1", "tags": ["tag2"]}),
			json!({"id": "t6", "userId": "u2", "tags": ["tag3"]}),
			json!({"id": "t7", "userId": "u2", "tags": ["tag3"]}),
			json!({"id": "t8", "userId": "u2", "tags": ["tag3"]}),
		]));
		let tags = Arc::new(MemoryProvider::new("Tag").with_rows([
			json!({"id": "tag1", "label": "urgent"}),
			json!({"id": "tag2", "label": "home"}),
			json!({"id": "tag3", "label": "work"}),
		]));

		let catalog = EntityCatalog::new()
			.with(
				EntityDefinition::new("Artist", artists.clone())
					.with_relationship("albums", Relationship::one_to_many("Album", "artist")),
			)
			.with(
				EntityDefinition::new("Album", albums.clone())
					.with_relationship("artist", Relationship::many_to_one("Artist")),
			)
			.with(EntityDefinition::new("Task", tasks.clone()))
			.with(
				EntityDefinition::new("Tag", tags.clone())
					.with_relationship("tasks", Relationship::many_to_many("Task", "tags")),
			);

		let registry = AclRegistry::new();
		registry.set_administrator_role_name(ADMIN);

		Self {
			enforcer: Enforcer::new(registry, catalog),
			artists,
			albums,
			tasks,
			tags,
		}
	}

	pub fn acl(self, entity: &str, acl: AccessControlList) -> Self {
		self.enforcer.register_acl(entity, acl);
		self
	}

	/// Shorthand for an ACL granting only the everyone role.
	pub fn everyone(self, entity: &str, grants: RoleGrants) -> Self {
		self.acl(entity, AccessControlList::new().role("Everyone", grants))
	}

	pub fn member(&self, user_id: &str) -> RequestScope {
		self.enforcer.begin_request(
			AuthorizationContext::new()
				.with_user_id(user_id)
				.with_role("member"),
		)
	}

	pub fn admin(&self) -> RequestScope {
		self
			.enforcer
			.begin_request(AuthorizationContext::new().with_user_id("root").with_role(ADMIN))
	}

	pub fn reset_calls(&self) {
		for provider in [&self.artists, &self.albums, &self.tasks, &self.tags] {
			provider.reset_calls();
		}
	}
}
