// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Relationship fields the principal may not read.
//!
//! Resolving such a field yields nothing; filtering by it is `Forbidden`.

use futures::future::join_all;
use keystone_core::{AccessControlValue, AclError, QueryFilter, RoleGrants};
use keystone_enforce::{Related, RequestScope};
use serde_json::{json, Value};

use super::support::Fixture;

fn rush_only() -> AccessControlValue {
	AccessControlValue::filter_sync(|_| Some(QueryFilter::eq("name", "Rush")))
}

async fn album_count(scope: &RequestScope, clause: Value) -> Result<usize, AclError> {
	let filter = QueryFilter::try_from(clause)?;
	Ok(scope.find("Album", &filter, None).await?.len())
}

fn hidden_artists() -> Fixture {
	Fixture::new()
		.everyone("Album", RoleGrants::new().read(true))
		.everyone("Artist", RoleGrants::new().read(false))
}

#[tokio::test]
async fn unreadable_relationship_resolves_empty() {
	let fx = hidden_artists();
	let scope = fx.member("u1");

	let albums = scope.find("Album", &QueryFilter::empty(), None).await.unwrap();
	assert_eq!(albums.len(), 3);

	let artist = scope
		.load_related("Album", &albums[0], "artist", None)
		.await
		.unwrap();
	assert!(matches!(artist, Related::One(None)));
	assert_eq!(fx.artists.calls().total(), 0);
}

#[tokio::test]
async fn unreadable_collection_resolves_empty() {
	let fx = Fixture::new()
		.everyone("Artist", RoleGrants::new().read(true))
		.everyone("Album", RoleGrants::new().read(false));
	let scope = fx.member("u1");

	let artist = scope
		.find_one("Artist", &QueryFilter::eq("id", "a1"))
		.await
		.unwrap()
		.unwrap();
	let albums = scope
		.load_related("Artist", &artist, "albums", None)
		.await
		.unwrap();

	assert!(albums.is_empty());
	assert_eq!(fx.albums.calls().total(), 0);
}

#[tokio::test]
async fn filtering_an_unreadable_relationship_is_forbidden() {
	let fx = hidden_artists();
	let scope = fx.member("u1");
	let album = scope
		.find_one("Album", &QueryFilter::eq("id", "al1"))
		.await
		.unwrap()
		.unwrap();

	let err = scope
		.load_related("Album", &album, "artist", Some(&QueryFilter::eq("name", "Rush")))
		.await
		.unwrap_err();
	assert!(matches!(err, AclError::Forbidden));

	let err = scope
		.find("Album", &QueryFilter::eq("artist", "a1"), None)
		.await
		.unwrap_err();
	assert!(matches!(err, AclError::Forbidden));
}

#[tokio::test]
async fn relationship_filter_carries_related_grant() {
	let fx = Fixture::new()
		.everyone("Album", RoleGrants::new().read(true))
		.everyone("Artist", RoleGrants::new().read(rush_only()));
	let scope = fx.member("u1");

	let by_rush = scope
		.find("Album", &QueryFilter::eq("artist", "a1"), None)
		.await
		.unwrap();
	assert_eq!(by_rush.len(), 2);

	let by_yes = scope
		.find("Album", &QueryFilter::eq("artist", "a2"), None)
		.await
		.unwrap();
	assert!(by_yes.is_empty());

	assert_eq!(
		fx.albums.filters_seen()[1],
		QueryFilter::try_from(json!({"artist": {"_and": [{"id": "a2"}, {"name": "Rush"}]}})).unwrap()
	);
}

#[tokio::test]
async fn filtered_collection_only_holds_granted_rows() {
	let fx = Fixture::new()
		.everyone("Artist", RoleGrants::new().read(true))
		.everyone(
			"Album",
			RoleGrants::new().read(AccessControlValue::filter_sync(|_| {
				Some(QueryFilter::eq("title", "2112"))
			})),
		);
	let scope = fx.member("u1");
	let artist = keystone_core::testing::row(json!({"id": "a1"}));

	let albums = scope
		.load_related("Artist", &artist, "albums", None)
		.await
		.unwrap()
		.into_rows();

	assert_eq!(albums.len(), 1);
	assert_eq!(albums[0]["id"], json!("al2"));
	assert_eq!(fx.albums.filters_seen(), vec![QueryFilter::eq("title", "2112")]);
}

#[tokio::test]
async fn many_to_one_loads_are_batched() {
	let fx = Fixture::new()
		.everyone("Album", RoleGrants::new().read(true))
		.everyone("Artist", RoleGrants::new().read(true));
	let scope = fx.member("u1");
	let albums = scope.find("Album", &QueryFilter::empty(), None).await.unwrap();

	let artists = join_all(
		albums
			.iter()
			.map(|album| scope.load_related("Album", album, "artist", None)),
	)
	.await;

	let names: Vec<String> = artists
		.into_iter()
		.flat_map(|r| r.unwrap().into_rows())
		.map(|a| a["name"].as_str().unwrap_or_default().to_string())
		.collect();
	assert_eq!(names, vec!["Rush", "Rush", "Yes"]);
	assert_eq!(fx.artists.calls().find, 1);
}

#[tokio::test]
async fn operator_clauses_on_a_relationship_carry_related_grant() {
	let fx = Fixture::new()
		.everyone("Album", RoleGrants::new().read(true))
		.everyone("Artist", RoleGrants::new().read(rush_only()));
	let scope = fx.member("u1");
	let count = |clause| album_count(&scope, clause);

	assert_eq!(count(json!({"artist_in": ["a2"]})).await.unwrap(), 0);
	assert_eq!(
		fx.albums.filters_seen()[0],
		QueryFilter::try_from(json!({"artist": {"_and": [{"id_in": ["a2"]}, {"name": "Rush"}]}}))
			.unwrap()
	);
	assert_eq!(count(json!({"artist_in": ["a1", "a2"]})).await.unwrap(), 2);
	assert_eq!(count(json!({"artist_ne": "a2"})).await.unwrap(), 3);
	assert_eq!(count(json!({"artist_nin": ["a2"]})).await.unwrap(), 3);
	assert_eq!(count(json!({"artist_null": false})).await.unwrap(), 2);
	assert_eq!(count(json!({"artist_null": true})).await.unwrap(), 1);

	fx.albums.reset_calls();
	let err = count(json!({"artist_gt": "a1"})).await.unwrap_err();
	assert!(matches!(err, AclError::Forbidden));
	assert_eq!(fx.albums.calls().total(), 0);
}

#[tokio::test]
async fn operator_clauses_on_an_unreadable_relationship_are_forbidden() {
	let fx = hidden_artists();
	let scope = fx.member("u1");

	for clause in [
		json!({"artist_in": ["a1"]}),
		json!({"artist_ne": "a2"}),
		json!({"_or": [{"artist_null": true}, {"title": "2112"}]}),
	] {
		let err = scope
			.find("Album", &QueryFilter::try_from(clause).unwrap(), None)
			.await
			.unwrap_err();
		assert!(matches!(err, AclError::Forbidden));
	}
	assert_eq!(fx.albums.calls().total(), 0);
}

#[tokio::test]
async fn nested_relationship_filters_carry_each_grant() {
	let fx = Fixture::new()
		.everyone("Album", RoleGrants::new().read(true))
		.everyone("Artist", RoleGrants::new().read(rush_only()));
	let scope = fx.member("u1");

	scope
		.find("Artist", &QueryFilter::try_from(json!({"albums": {"artist_in": ["a2"]}})).unwrap(), None)
		.await
		.unwrap();

	assert_eq!(
		fx.artists.filters_seen()[0],
		QueryFilter::try_from(json!({"_and": [
			{"albums": {"artist": {"_and": [{"id_in": ["a2"]}, {"name": "Rush"}]}}},
			{"name": "Rush"}
		]}))
		.unwrap()
	);
}
