// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Row-level ownership: members see only their own tasks, also when tasks are
//! reached through a tag.

use futures::future::join_all;
use keystone_core::testing::row;
use keystone_core::{AccessControlValue, QueryFilter, RoleGrants};
use serde_json::json;

use super::support::Fixture;

fn owned_tasks() -> Fixture {
	Fixture::new()
		.everyone(
			"Task",
			RoleGrants::new().all(AccessControlValue::filter_sync(|ctx| {
				ctx.user_id.clone().map(|id| QueryFilter::eq("userId", id))
			})),
		)
		.everyone("Tag", RoleGrants::new().all(true))
}

fn total_tagged(fx: &Fixture, tag: &str) -> usize {
	fx.tasks
		.rows()
		.iter()
		.filter(|task| task["tags"].as_array().is_some_and(|tags| tags.contains(&json!(tag))))
		.count()
}

#[tokio::test]
async fn tasks_per_tag_are_limited_to_owner() {
	let fx = owned_tasks();
	let scope = fx.member("u1");

	let tags = scope.find("Tag", &QueryFilter::empty(), None).await.unwrap();
	assert_eq!(tags.len(), 3);
	fx.reset_calls();

	let resolved = join_all(
		tags
			.iter()
			.map(|tag| scope.load_related("Tag", tag, "tasks", None)),
	)
	.await;

	let visible: Vec<usize> = resolved.into_iter().map(|r| r.unwrap().len()).collect();
	let totals: Vec<usize> = ["tag1", "tag2", "tag3"]
		.iter()
		.map(|tag| total_tagged(&fx, tag))
		.collect();
	assert_eq!(visible, vec![1, 3, 0]);
	assert_eq!(totals, vec![2, 3, 3]);

	// One batched provider call for all three tags.
	assert_eq!(fx.tasks.calls().find_by_related_id, 1);
	assert_eq!(fx.tasks.related_batches()[0].len(), 3);
	assert_eq!(fx.tasks.filters_seen(), vec![QueryFilter::eq("userId", "u1")]);
}

#[tokio::test]
async fn another_owner_sees_the_complement() {
	let fx = owned_tasks();
	let scope = fx.member("u2");

	let tag3 = row(json!({"id": "tag3"}));
	let tasks = scope
		.load_related("Tag", &tag3, "tasks", None)
		.await
		.unwrap()
		.into_rows();

	assert_eq!(tasks.len(), 3);
	assert!(tasks.iter().all(|t| t["userId"] == json!("u2")));
}

#[tokio::test]
async fn find_applies_owner_filter() {
	let fx = owned_tasks();
	let scope = fx.member("u1");

	let tasks = scope.find("Task", &QueryFilter::empty(), None).await.unwrap();

	assert_eq!(tasks.len(), 4);
	assert_eq!(fx.tasks.filters_seen(), vec![QueryFilter::eq("userId", "u1")]);
}

#[tokio::test]
async fn caller_filter_is_anded_with_owner_filter() {
	let fx = owned_tasks();
	let scope = fx.member("u1");

	let tasks = scope
		.find("Task", &QueryFilter::eq("tags", "tag1"), None)
		.await
		.unwrap();

	assert_eq!(tasks.len(), 1);
	assert_eq!(tasks[0]["id"], json!("t1"));
	assert_eq!(
		fx.tasks.filters_seen(),
		vec![QueryFilter::try_from(json!({"_and": [{"tags": "tag1"}, {"userId": "u1"}]})).unwrap()]
	);
}

#[tokio::test]
async fn create_must_match_owner_filter() {
	let fx = owned_tasks();
	let scope = fx.member("u1");

	let err = scope
		.create_one("Task", row(json!({"userId": "u2", "tags": []})))
		.await
		.unwrap_err();
	assert!(err.is_forbidden());
	assert_eq!(fx.tasks.calls().create_one, 0);

	let created = scope
		.create_one("Task", row(json!({"userId": "u1", "tags": []})))
		.await
		.unwrap();
	assert_eq!(created["userId"], json!("u1"));
	assert_eq!(fx.tasks.calls().create_one, 1);
}

#[tokio::test]
async fn delete_only_reaches_owned_rows() {
	let fx = owned_tasks();
	let scope = fx.member("u1");

	let deleted = scope
		.delete_one("Task", &QueryFilter::eq("id", "t2"))
		.await
		.unwrap();
	assert!(!deleted);

	let deleted = scope
		.delete_one("Task", &QueryFilter::eq("id", "t1"))
		.await
		.unwrap();
	assert!(deleted);
	assert_eq!(fx.tasks.rows().len(), 7);
}

#[tokio::test]
async fn principal_without_user_is_forbidden() {
	let fx = owned_tasks();
	let scope = fx.enforcer.begin_request(
		keystone_core::AuthorizationContext::new().with_role("member"),
	);

	assert!(scope
		.find("Task", &QueryFilter::empty(), None)
		.await
		.unwrap_err()
		.is_forbidden());
	assert_eq!(fx.tasks.calls().total(), 0);
}
