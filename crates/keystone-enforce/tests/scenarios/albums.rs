// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! An entity members may read and update but not create or delete.

use keystone_core::testing::row;
use keystone_core::{AclError, QueryFilter, RoleGrants};
use serde_json::json;

use super::support::Fixture;

fn read_update() -> Fixture {
	Fixture::new().everyone("Album", RoleGrants::new().read(true).update(true))
}

#[tokio::test]
async fn create_or_update_without_id_is_forbidden() {
	let fx = read_update();
	let scope = fx.member("u1");

	let err = scope
		.create_or_update("Album", row(json!({"title": "Signals"})))
		.await
		.unwrap_err();

	assert!(matches!(err, AclError::Forbidden));
	let calls = fx.albums.calls();
	assert_eq!(calls.create_one, 0);
	assert_eq!(calls.update_one, 0);
}

#[tokio::test]
async fn create_or_update_with_id_only_updates() {
	let fx = read_update();
	let scope = fx.member("u1");

	let updated = scope
		.create_or_update("Album", row(json!({"id": "al1", "title": "Signals"})))
		.await
		.unwrap();

	assert_eq!(updated["title"], json!("Signals"));
	let calls = fx.albums.calls();
	assert_eq!(calls.update_one, 1);
	assert_eq!(calls.create_one, 0);
	// An unconditional update grant needs no target lookup.
	assert_eq!(calls.find_one, 0);
}

#[tokio::test]
async fn numeric_id_selects_update() {
	let fx = read_update();
	fx.albums.insert(json!({"id": 42, "title": "Permanent Waves"}));
	let scope = fx.member("u1");

	scope
		.create_or_update("Album", row(json!({"id": 42, "title": "Hemispheres"})))
		.await
		.unwrap();

	assert_eq!(fx.albums.calls().update_one, 1);
}

#[tokio::test]
async fn delete_is_forbidden() {
	let fx = read_update();
	let scope = fx.member("u1");

	assert!(scope
		.delete_one("Album", &QueryFilter::eq("id", "al1"))
		.await
		.unwrap_err()
		.is_forbidden());
	assert_eq!(fx.albums.calls().delete_one, 0);
}

#[tokio::test]
async fn filtered_update_checks_target_first() {
	let fx = Fixture::new().everyone(
		"Album",
		RoleGrants::new().read(true).update(keystone_core::AccessControlValue::filter_sync(
			|_| Some(QueryFilter::eq("title", "2112")),
		)),
	);
	let scope = fx.member("u1");

	let err = scope
		.update_one("Album", &"al1".into(), row(json!({"title": "Renamed"})))
		.await
		.unwrap_err();
	assert!(err.is_forbidden());
	assert_eq!(fx.albums.calls().update_one, 0);

	scope
		.update_one("Album", &"al2".into(), row(json!({"rating": 5})))
		.await
		.unwrap();
	let calls = fx.albums.calls();
	assert_eq!(calls.find_one, 2);
	assert_eq!(calls.update_one, 1);
	assert_eq!(
		fx.albums.filters_seen()[1],
		QueryFilter::try_from(json!({"_and": [{"id": "al2"}, {"title": "2112"}]})).unwrap()
	);
}
