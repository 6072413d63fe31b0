// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Enforcement hooks for entity resolution.
//!
//! An [`Enforcer`] is built once at startup from the ACL registry and the
//! entity catalog. Each request gets a [`RequestScope`] carrying its
//! principal and its own batched loader; every read and write goes through
//! the scope so the principal's grants are applied before the provider sees
//! the call.
//!
//! ```
//! # use std::sync::Arc;
//! # use keystone_core::testing::MemoryProvider;
//! # use serde_json::json;
//! use keystone_core::{
//! 	AccessControlList, AccessControlValue, AclRegistry, AuthorizationContext, EntityCatalog,
//! 	EntityDefinition, QueryFilter, RoleGrants,
//! };
//! use keystone_enforce::Enforcer;
//!
//! # tokio_test::block_on(async {
//! let tasks = Arc::new(MemoryProvider::new("Task").with_rows([
//! 	json!({"id": "t1", "userId": "u1"}),
//! 	json!({"id": "t2", "userId": "u2"}),
//! ]));
//! let registry = AclRegistry::new();
//! registry.set_administrator_role_name("admin");
//! let enforcer = Enforcer::new(
//! 	registry,
//! 	EntityCatalog::new().with(EntityDefinition::new("Task", tasks)),
//! );
//! enforcer.register_acl(
//! 	"Task",
//! 	AccessControlList::new().role(
//! 		"member",
//! 		RoleGrants::new().read(AccessControlValue::filter_sync(|ctx| {
//! 			ctx.user_id.clone().map(|id| QueryFilter::eq("userId", id))
//! 		})),
//! 	),
//! );
//!
//! let scope = enforcer.begin_request(
//! 	AuthorizationContext::new().with_user_id("u1").with_role("member"),
//! );
//! let visible = scope.find("Task", &QueryFilter::empty(), None).await?;
//! assert_eq!(visible.len(), 1);
//! scope.finish();
//! # Ok::<(), keystone_core::AclError>(())
//! # })
//! # .unwrap();
//! ```

pub mod enforcer;
mod nested;
pub mod scope;

pub use enforcer::Enforcer;
pub use scope::{Related, RequestScope};
