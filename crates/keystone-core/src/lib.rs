// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Row-level access control for entity resolution.
//!
//! This crate decides what a principal may do with an entity type and turns
//! that decision into a [`QueryFilter`] providers can apply:
//!
//! - [`AclRegistry`]: one [`AccessControlList`] per entity, registered at startup
//! - [`consolidate`]: merges a principal's roles (plus the everyone role) into
//!   one grant per [`AccessType`]
//! - [`evaluate`]: runs a grant's filter functions and yields the effective filter
//! - [`AuthContextStore`]: holds the request's [`AuthorizationContext`]
//! - [`DataProvider`]: the storage contract, plus [`EntityCatalog`] metadata
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use keystone_core::{
//! 	evaluate_access, AccessControlList, AccessControlValue, AccessType, AclRegistry,
//! 	AuthorizationContext, QueryFilter, RoleGrants,
//! };
//!
//! # tokio_test::block_on(async {
//! let registry = AclRegistry::new();
//! registry.set_administrator_role_name("admin");
//! registry.register(
//! 	"Task",
//! 	AccessControlList::new().role(
//! 		"Everyone",
//! 		RoleGrants::new().all(AccessControlValue::filter_sync(|ctx| {
//! 			ctx.user_id.clone().map(|id| QueryFilter::eq("userId", id))
//! 		})),
//! 	),
//! );
//!
//! let ctx = AuthorizationContext::new().with_user_id("u1").with_role("member");
//! let entry = registry.consolidate("Task", &ctx.roles).unwrap();
//! let filter = evaluate_access(&entry, AccessType::Read, Arc::new(ctx)).await.unwrap();
//! assert_eq!(filter, QueryFilter::eq("userId", "u1"));
//! # });
//! ```

pub mod access;
pub mod acl;
pub mod catalog;
pub mod consolidate;
pub mod context;
pub mod error;
pub mod evaluate;
pub mod filter;
pub mod provider;
pub mod registry;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use access::{AccessSpec, AccessType};
pub use acl::{AccessControlList, AccessControlValue, FilterFn, FilterFuture, RoleGrants};
pub use catalog::{EntityCatalog, EntityDefinition, Relationship, RelationshipKind};
pub use consolidate::{consolidate, ConsolidatedAccessControlEntry, ConsolidatedValue, RoleNames};
pub use context::{AuthContextStore, AuthorizationContext};
pub use error::{AclError, ProviderError, Result, FORBIDDEN_MESSAGE};
pub use evaluate::{evaluate, evaluate_access};
pub use filter::QueryFilter;
pub use provider::{DataProvider, EntityId, Pagination, ProviderResult, Row, Sort};
pub use registry::{AclRegistry, DEFAULT_EVERYONE_ROLE};
