// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use keystone_config::KeystoneConfig;
use keystone_core::testing::{row, MemoryProvider};
use keystone_core::{
	AccessControlValue, AclError, AuthorizationContext, EntityCatalog, EntityDefinition,
	ProviderError, QueryFilter, RoleGrants,
};
use keystone_enforce::Enforcer;
use serde_json::json;

use super::support::Fixture;

#[tokio::test]
async fn filter_function_failure_is_not_a_denial() {
	let fx = Fixture::new().everyone(
		"Artist",
		RoleGrants::new().read(AccessControlValue::filter(|_| async {
			Err::<Option<QueryFilter>, _>(AclError::Provider(ProviderError::new(
				"membership lookup timed out",
			)))
		})),
	);
	let scope = fx.member("u1");

	let err = scope.find("Artist", &QueryFilter::empty(), None).await.unwrap_err();

	assert!(matches!(err, AclError::Provider(_)));
	assert!(err.to_string().contains("membership lookup timed out"));
	assert_eq!(fx.artists.calls().total(), 0);
}

#[tokio::test]
async fn provider_failure_propagates() {
	let fx = Fixture::new().everyone("Artist", RoleGrants::new().read(true));
	fx.artists.fail_with("connection reset");
	let scope = fx.member("u1");

	let err = scope.find("Artist", &QueryFilter::empty(), None).await.unwrap_err();
	assert!(matches!(err, AclError::Provider(_)));

	let err = scope.load_by_id("Artist", "a1").await.unwrap_err();
	assert!(matches!(err, AclError::Provider(_)));

	fx.artists.clear_failure();
	let artist = scope.load_by_id("Artist", "a1").await.unwrap();
	assert!(artist.is_some());
}

#[tokio::test]
async fn principal_without_roles_is_rejected() {
	let fx = Fixture::new().everyone("Artist", RoleGrants::new().read(true));
	let scope = fx
		.enforcer
		.begin_request(AuthorizationContext::new().with_user_id("u1"));

	let err = scope.find("Artist", &QueryFilter::empty(), None).await.unwrap_err();

	assert!(matches!(err, AclError::Permission(_)));
	assert_eq!(fx.artists.calls().total(), 0);
}

#[tokio::test]
async fn missing_administrator_role_is_a_configuration_error() {
	let artists = Arc::new(MemoryProvider::new("Artist"));
	let enforcer = Enforcer::new(
		keystone_core::AclRegistry::new(),
		EntityCatalog::new().with(EntityDefinition::new("Artist", artists.clone())),
	);
	let scope = enforcer.begin_request(AuthorizationContext::new().with_role("member"));

	let err = scope.find("Artist", &QueryFilter::empty(), None).await.unwrap_err();

	assert!(matches!(err, AclError::Configuration(_)));
	assert_eq!(artists.calls().total(), 0);
}

#[tokio::test]
async fn unknown_entity_is_a_configuration_error() {
	let fx = Fixture::new();
	let scope = fx.admin();

	let err = scope.find("Playlist", &QueryFilter::empty(), None).await.unwrap_err();

	assert!(matches!(err, AclError::Configuration(msg) if msg.contains("Playlist")));
}

#[tokio::test]
async fn mutation_clears_loaded_rows() {
	let fx = Fixture::new().everyone("Album", RoleGrants::new().read(true).update(true));
	let scope = fx.member("u1");

	let before = scope.load_by_id("Album", "al1").await.unwrap().unwrap();
	assert_eq!(before["title"], json!("Moving Pictures"));
	assert_eq!(scope.loader().cached_len(), 1);

	scope
		.update_one("Album", &"al1".into(), row(json!({"title": "Signals"})))
		.await
		.unwrap();
	assert_eq!(scope.loader().cached_len(), 0);

	let after = scope.load_by_id("Album", "al1").await.unwrap().unwrap();
	assert_eq!(after["title"], json!("Signals"));
	assert_eq!(fx.albums.calls().find, 2);
}

#[tokio::test]
async fn repeated_loads_within_a_request_are_cached() {
	let fx = Fixture::new().everyone("Album", RoleGrants::new().read(true));
	let scope = fx.member("u1");

	let first = scope.load_by_id("Album", "al1").await.unwrap().unwrap();
	let second = scope.load_by_id("Album", "al1").await.unwrap().unwrap();

	assert!(Arc::ptr_eq(&first, &second));
	assert_eq!(fx.albums.calls().find, 1);
}

#[tokio::test]
async fn each_request_starts_with_an_empty_loader() {
	let fx = Fixture::new().everyone("Album", RoleGrants::new().read(true));

	let first = fx.member("u1");
	first.load_by_id("Album", "al1").await.unwrap();
	let second = fx.member("u2");
	second.load_by_id("Album", "al1").await.unwrap();

	assert_ne!(first.request_id(), second.request_id());
	assert_eq!(fx.albums.calls().find, 2);

	first.finish();
	assert_eq!(second.loader().cached_len(), 1);
}

#[tokio::test]
async fn enforcer_from_config() {
	let mut config = KeystoneConfig::default();
	config.acl.administrator_role = Some("root".to_string());
	config.acl.everyone_role = "Anyone".to_string();
	config.loader.max_batch_size = 2;

	let artists = Arc::new(MemoryProvider::new("Artist").with_rows([
		json!({"id": "a1"}),
		json!({"id": "a2"}),
		json!({"id": "a3"}),
	]));
	let enforcer = Enforcer::from_config(
		&config,
		EntityCatalog::new().with(EntityDefinition::new("Artist", artists.clone())),
	);
	enforcer.register_acl(
		"Artist",
		keystone_core::AccessControlList::new().role("Anyone", RoleGrants::new().read(true)),
	);

	let admin = enforcer.begin_request(AuthorizationContext::new().with_role("root"));
	let everyone = enforcer.begin_request(AuthorizationContext::new().with_role("member"));
	assert_eq!(admin.loader().config().max_batch_size, 2);
	assert_eq!(
		everyone
			.find("Artist", &QueryFilter::empty(), None)
			.await
			.unwrap()
			.len(),
		3
	);

	artists.reset_calls();
	let loaded = everyone
		.loader()
		.load_many(enforcer.catalog().get("Artist").unwrap(), ["a1", "a2", "a3"])
		.await
		.unwrap();
	assert_eq!(loaded.iter().filter(|r| r.is_some()).count(), 3);
	assert_eq!(artists.calls().find, 2);
}
