// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! An entity whose ACL denies everything to everyone.
//!
//! Every operation is `Forbidden` for members and the provider is never
//! reached. The administrator is unaffected.

use keystone_core::testing::row;
use keystone_core::{AclError, QueryFilter, RoleGrants, FORBIDDEN_MESSAGE};
use serde_json::json;

use super::support::Fixture;

fn locked() -> Fixture {
	Fixture::new().everyone("Artist", RoleGrants::new().all(false))
}

#[tokio::test]
async fn find_is_forbidden_without_calling_provider() {
	let fx = locked();
	let scope = fx.member("u1");

	let err = scope.find("Artist", &QueryFilter::empty(), None).await.unwrap_err();

	assert!(err.is_forbidden());
	assert_eq!(err.to_string(), FORBIDDEN_MESSAGE);
	assert_eq!(fx.artists.calls().total(), 0);
}

#[tokio::test]
async fn every_operation_is_forbidden() {
	let fx = locked();
	let scope = fx.member("u1");

	assert!(matches!(
		scope.find_one("Artist", &QueryFilter::eq("id", "a1")).await,
		Err(AclError::Forbidden)
	));
	assert!(matches!(scope.load_by_id("Artist", "a1").await, Err(AclError::Forbidden)));
	assert!(matches!(
		scope.create_one("Artist", row(json!({"name": "Genesis"}))).await,
		Err(AclError::Forbidden)
	));
	assert!(matches!(
		scope
			.update_one("Artist", &"a1".into(), row(json!({"name": "Renamed"})))
			.await,
		Err(AclError::Forbidden)
	));
	assert!(matches!(
		scope.delete_one("Artist", &QueryFilter::eq("id", "a1")).await,
		Err(AclError::Forbidden)
	));

	assert_eq!(fx.artists.calls().total(), 0);
	assert_eq!(fx.artists.rows().len(), 2);
}

#[tokio::test]
async fn administrator_reads_everything() {
	let fx = locked();
	let scope = fx.admin();

	let artists = scope.find("Artist", &QueryFilter::empty(), None).await.unwrap();

	assert_eq!(artists.len(), 2);
	assert_eq!(fx.artists.filters_seen(), vec![QueryFilter::empty()]);
}

#[tokio::test]
async fn administrator_needs_no_registered_acl() {
	let fx = Fixture::new();

	let admin = fx.admin();
	let tags = admin.find("Tag", &QueryFilter::empty(), None).await.unwrap();
	assert_eq!(tags.len(), 3);

	let member = fx.member("u1");
	assert!(member
		.find("Tag", &QueryFilter::empty(), None)
		.await
		.unwrap_err()
		.is_forbidden());
}
