// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Structured query predicates.
//!
//! A [`QueryFilter`] is a JSON object understood by every data provider:
//!
//! - `field: value` equality (against scalars, references or collections)
//! - `field_in`, `field_nin`, `field_ne`, `field_gt`, `field_gte`, `field_lt`,
//!   `field_lte`, `field_like` (`%` wildcard) and `field_null`
//! - `_and: [..]`, `_or: [..]` and `_not: {..}` combinators
//! - `relation: {..}` sub-filters that match against related rows
//!
//! The empty filter matches every row.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AclError;
use crate::provider::Row;

pub const AND_KEY: &str = "_and";
pub const OR_KEY: &str = "_or";
pub const NOT_KEY: &str = "_not";

const OPERATOR_SUFFIXES: [&str; 9] = ["in", "nin", "ne", "gt", "gte", "lt", "lte", "like", "null"];

/// A query predicate handed to data providers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryFilter(Map<String, Value>);

impl QueryFilter {
	/// The filter that matches everything.
	pub fn empty() -> Self {
		Self(Map::new())
	}

	/// A single equality clause.
	pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
		Self::empty().with(field, value)
	}

	/// Adds a clause, replacing any clause with the same key.
	pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.0.insert(key.into(), value.into());
		self
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn get(&self, key: &str) -> Option<&Value> {
		self.0.get(key)
	}

	pub fn as_map(&self) -> &Map<String, Value> {
		&self.0
	}

	pub fn into_value(self) -> Value {
		Value::Object(self.0)
	}

	/// Canonical text form, stable for equal filters.
	pub fn cache_key(&self) -> String {
		Value::Object(self.0.clone()).to_string()
	}

	/// Conjunction of `filters`, skipping empty ones.
	///
	/// No operands yields the empty filter, one operand is returned as-is,
	/// two or more are wrapped in `_and`.
	pub fn and_all(filters: impl IntoIterator<Item = QueryFilter>) -> QueryFilter {
		let mut operands: Vec<QueryFilter> = filters.into_iter().filter(|f| !f.is_empty()).collect();
		match operands.len() {
			0 => QueryFilter::empty(),
			1 => operands.remove(0),
			_ => QueryFilter::eq(AND_KEY, wrap(operands)),
		}
	}

	/// Disjunction of `filters`.
	///
	/// One operand is returned as-is, two or more are wrapped in `_or`.
	/// Empty operands are kept: an empty branch makes the whole `_or` match.
	pub fn or_any(filters: impl IntoIterator<Item = QueryFilter>) -> QueryFilter {
		let mut operands: Vec<QueryFilter> = filters.into_iter().collect();
		match operands.len() {
			0 => QueryFilter::empty(),
			1 => operands.remove(0),
			_ => QueryFilter::eq(OR_KEY, wrap(operands)),
		}
	}

	/// `self AND other`.
	pub fn and(self, other: QueryFilter) -> QueryFilter {
		QueryFilter::and_all([self, other])
	}

	/// Evaluates the filter against an in-memory row.
	pub fn matches(&self, row: &Row) -> bool {
		self
			.0
			.iter()
			.all(|(key, expected)| clause_matches(key, expected, row))
	}

	/// Field names the filter constrains, looking through combinators and
	/// stripping operator suffixes.
	pub fn referenced_fields(&self) -> BTreeSet<String> {
		let mut fields = BTreeSet::new();
		collect_fields(&self.0, &mut fields);
		fields
	}

	/// Object sub-filters on `relation`, looking through combinators.
	pub fn relation_filters(&self, relation: &str) -> Vec<QueryFilter> {
		let mut found = Vec::new();
		collect_relation_filters(&self.0, relation, &mut found);
		found
	}

	/// Replaces every object sub-filter on `relation` with `rewrite(sub)`.
	pub fn map_relation<F>(&self, relation: &str, mut rewrite: F) -> Result<QueryFilter, AclError>
	where
		F: FnMut(&QueryFilter) -> Result<QueryFilter, AclError>,
	{
		map_relation_in(&self.0, relation, &mut rewrite).map(QueryFilter)
	}

	/// Narrows every clause on `relation` with `restriction`, so the filter
	/// only sees related rows the restriction admits.
	///
	/// A bare id (`relation: "a1"`) becomes `{ <related_pk>: "a1" }` first so the
	/// restriction can be attached. Operator clauses are rewritten over the
	/// admitted rows:
	///
	/// - `relation_in: ids` becomes `relation: { <related_pk>_in: ids }`
	/// - `relation_ne` and `relation_nin` negate the restricted match
	/// - `relation_null: false` requires an admitted related row and
	///   `relation_null: true` requires none
	///
	/// Ordering and pattern operators on a relation are `Forbidden`.
	pub fn restrict_relation(
		&self,
		relation: &str,
		related_pk: &str,
		restriction: &QueryFilter,
	) -> Result<QueryFilter, AclError> {
		if restriction.is_empty() {
			return Ok(self.clone());
		}
		let mut out = Map::with_capacity(self.0.len());
		let mut operators = Vec::new();
		for (key, value) in &self.0 {
			match key.as_str() {
				AND_KEY | OR_KEY => {
					let rewritten = match value {
						Value::Array(items) => Value::Array(
							items
								.iter()
								.map(|item| restrict_value(item, relation, related_pk, restriction))
								.collect::<Result<_, _>>()?,
						),
						other => other.clone(),
					};
					out.insert(key.clone(), rewritten);
				}
				NOT_KEY => {
					out.insert(key.clone(), restrict_value(value, relation, related_pk, restriction)?);
				}
				k if k == relation => {
					let sub = match value {
						Value::Object(map) => QueryFilter(map.clone()),
						scalar => QueryFilter::eq(related_pk, scalar.clone()),
					};
					out.insert(key.clone(), sub.and(restriction.clone()).into_value());
				}
				k => match split_operator(k) {
					Some((field, op)) if field == relation => {
						operators.push(restrict_operator(relation, related_pk, op, value, restriction)?);
					}
					_ => {
						out.insert(key.clone(), value.clone());
					}
				},
			}
		}
		Ok(QueryFilter::and_all(
			std::iter::once(QueryFilter(out)).chain(operators),
		))
	}
}

impl TryFrom<Value> for QueryFilter {
	type Error = AclError;

	fn try_from(value: Value) -> Result<Self, Self::Error> {
		match value {
			Value::Object(map) => Ok(QueryFilter(map)),
			Value::Null => Ok(QueryFilter::empty()),
			other => Err(AclError::Configuration(format!(
				"filter must be a JSON object, got {other}"
			))),
		}
	}
}

impl From<Map<String, Value>> for QueryFilter {
	fn from(map: Map<String, Value>) -> Self {
		QueryFilter(map)
	}
}

fn wrap(operands: Vec<QueryFilter>) -> Value {
	Value::Array(operands.into_iter().map(QueryFilter::into_value).collect())
}

fn restrict_value(
	value: &Value,
	relation: &str,
	related_pk: &str,
	restriction: &QueryFilter,
) -> Result<Value, AclError> {
	match value {
		Value::Object(map) => Ok(
			QueryFilter(map.clone())
				.restrict_relation(relation, related_pk, restriction)?
				.into_value(),
		),
		other => Ok(other.clone()),
	}
}

fn restrict_operator(
	relation: &str,
	related_pk: &str,
	op: &str,
	value: &Value,
	restriction: &QueryFilter,
) -> Result<QueryFilter, AclError> {
	let admitted = |target: QueryFilter| {
		QueryFilter::eq(relation, target.and(restriction.clone()).into_value())
	};
	let not = |inner: QueryFilter| QueryFilter::eq(NOT_KEY, inner.into_value());
	let any_of = || QueryFilter::eq(format!("{related_pk}_in"), value.clone());
	match (op, value) {
		("in", _) => Ok(admitted(any_of())),
		("nin", _) => Ok(not(admitted(any_of()))),
		("ne", id) => Ok(not(admitted(QueryFilter::eq(related_pk, id.clone())))),
		("null", Value::Bool(false)) => Ok(admitted(QueryFilter::empty())),
		("null", Value::Bool(true)) => Ok(not(admitted(QueryFilter::empty()))),
		_ => Err(AclError::Forbidden),
	}
}

fn collect_relation_filters(map: &Map<String, Value>, relation: &str, found: &mut Vec<QueryFilter>) {
	for (key, value) in map {
		match (key.as_str(), value) {
			(AND_KEY | OR_KEY, Value::Array(items)) => {
				for item in items {
					if let Value::Object(inner) = item {
						collect_relation_filters(inner, relation, found);
					}
				}
			}
			(NOT_KEY, Value::Object(inner)) => collect_relation_filters(inner, relation, found),
			(k, Value::Object(sub)) if k == relation => found.push(QueryFilter(sub.clone())),
			_ => {}
		}
	}
}

fn map_relation_in<F>(
	map: &Map<String, Value>,
	relation: &str,
	rewrite: &mut F,
) -> Result<Map<String, Value>, AclError>
where
	F: FnMut(&QueryFilter) -> Result<QueryFilter, AclError>,
{
	let mut out = Map::with_capacity(map.len());
	for (key, value) in map {
		let rewritten = match (key.as_str(), value) {
			(AND_KEY | OR_KEY, Value::Array(items)) => {
				let mut mapped = Vec::with_capacity(items.len());
				for item in items {
					mapped.push(match item {
						Value::Object(inner) => Value::Object(map_relation_in(inner, relation, rewrite)?),
						other => other.clone(),
					});
				}
				Value::Array(mapped)
			}
			(NOT_KEY, Value::Object(inner)) => Value::Object(map_relation_in(inner, relation, rewrite)?),
			(k, Value::Object(sub)) if k == relation => rewrite(&QueryFilter(sub.clone()))?.into_value(),
			_ => value.clone(),
		};
		out.insert(key.clone(), rewritten);
	}
	Ok(out)
}

fn collect_fields(map: &Map<String, Value>, fields: &mut BTreeSet<String>) {
	for (key, value) in map {
		match key.as_str() {
			AND_KEY | OR_KEY => {
				if let Value::Array(items) = value {
					for item in items {
						if let Value::Object(inner) = item {
							collect_fields(inner, fields);
						}
					}
				}
			}
			NOT_KEY => {
				if let Value::Object(inner) = value {
					collect_fields(inner, fields);
				}
			}
			_ => {
				let field = split_operator(key).map(|(f, _)| f).unwrap_or(key);
				fields.insert(field.to_string());
			}
		}
	}
}

/// Splits `field_op` into `(field, op)` when `op` is a known operator suffix.
fn split_operator(key: &str) -> Option<(&str, &str)> {
	let (field, op) = key.rsplit_once('_')?;
	if field.is_empty() || !OPERATOR_SUFFIXES.contains(&op) {
		return None;
	}
	Some((field, op))
}

fn clause_matches(key: &str, expected: &Value, row: &Row) -> bool {
	match key {
		AND_KEY => match expected {
			Value::Array(items) => items.iter().all(|item| sub_filter_matches(item, row)),
			_ => false,
		},
		OR_KEY => match expected {
			Value::Array(items) => items.iter().any(|item| sub_filter_matches(item, row)),
			_ => false,
		},
		NOT_KEY => !sub_filter_matches(expected, row),
		_ => {
			// A real column always wins over an operator reading of its name.
			if row.contains_key(key) {
				return field_equals(row.get(key), expected);
			}
			match split_operator(key) {
				Some((field, op)) => operator_matches(op, row.get(field), expected),
				None => field_equals(None, expected),
			}
		}
	}
}

fn sub_filter_matches(value: &Value, row: &Row) -> bool {
	match value {
		Value::Object(map) => QueryFilter(map.clone()).matches(row),
		_ => false,
	}
}

fn field_equals(actual: Option<&Value>, expected: &Value) -> bool {
	let actual = match actual {
		Some(v) => v,
		None => return expected.is_null(),
	};

	match expected {
		Value::Object(sub) => {
			let sub = QueryFilter(sub.clone());
			match actual {
				Value::Object(related) => sub.matches(related),
				Value::Array(items) => items.iter().any(|item| match item {
					Value::Object(related) => sub.matches(related),
					_ => false,
				}),
				_ => false,
			}
		}
		_ => match actual {
			Value::Array(items) => items.iter().any(|item| scalar_equals(item, expected)),
			other => scalar_equals(other, expected),
		},
	}
}

/// Equality that sees through `{ id }` references and number/string ids.
fn scalar_equals(actual: &Value, expected: &Value) -> bool {
	let actual = reference_id(actual).unwrap_or(actual);
	match (actual, expected) {
		(Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
		(Value::String(a), Value::Number(b)) | (Value::Number(b), Value::String(a)) => {
			a == &b.to_string()
		}
		(a, b) => a == b,
	}
}

fn reference_id(value: &Value) -> Option<&Value> {
	match value {
		Value::Object(map) => map.get("id"),
		_ => None,
	}
}

fn operator_matches(op: &str, actual: Option<&Value>, expected: &Value) -> bool {
	match op {
		"in" => match expected {
			Value::Array(options) => options.iter().any(|o| field_equals(actual, o)),
			_ => false,
		},
		"nin" => match expected {
			Value::Array(options) => !options.iter().any(|o| field_equals(actual, o)),
			_ => false,
		},
		"ne" => !field_equals(actual, expected),
		"gt" => compare(actual, expected) == Some(Ordering::Greater),
		"gte" => matches!(
			compare(actual, expected),
			Some(Ordering::Greater | Ordering::Equal)
		),
		"lt" => compare(actual, expected) == Some(Ordering::Less),
		"lte" => matches!(
			compare(actual, expected),
			Some(Ordering::Less | Ordering::Equal)
		),
		"like" => match (actual, expected) {
			(Some(Value::String(text)), Value::String(pattern)) => like(text, pattern),
			_ => false,
		},
		"null" => {
			let is_null = actual.map(Value::is_null).unwrap_or(true);
			match expected {
				Value::Bool(want) => is_null == *want,
				_ => false,
			}
		}
		_ => false,
	}
}

fn compare(actual: Option<&Value>, expected: &Value) -> Option<Ordering> {
	match (actual?, expected) {
		(Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
		(Value::String(a), Value::String(b)) => Some(a.cmp(b)),
		_ => None,
	}
}

/// SQL-style `LIKE` with `%` matching any run of characters.
fn like(text: &str, pattern: &str) -> bool {
	let parts: Vec<&str> = pattern.split('%').collect();
	if parts.len() == 1 {
		return text == pattern;
	}

	let first = parts[0];
	let last = parts[parts.len() - 1];
	if !text.starts_with(first) || text.len() < first.len() + last.len() {
		return false;
	}
	if !text[first.len()..].ends_with(last) {
		return false;
	}

	let mut rest = &text[first.len()..text.len() - last.len()];
	for part in &parts[1..parts.len() - 1] {
		match rest.find(part) {
			Some(pos) => rest = &rest[pos + part.len()..],
			None => return false,
		}
	}
	true
}
