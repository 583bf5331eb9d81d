//! Dataset indexers (§4.6): one per profile-data kind, each declaring a
//! JSON type constant, a path regex, a compiled schema and a monotonic
//! table version.

use chrono::DateTime;
use jsonschema::Validator;
use regex::Regex;
use serde_json::{json, Value};

/// A single dataset indexer. Schemas are compiled once at construction
/// (`compile-once-use-many`, Design Notes §9) and reused for every file the
/// crawler feeds it.
pub trait DatasetIndexer: Send + Sync {
	/// Row family this indexer maintains, also the `MetaStore` dataset key.
	fn dataset(&self) -> &str;
	/// The archive-filesystem JSON type this indexer recognises.
	fn json_type(&self) -> &str;
	/// Bumped whenever `schema()` changes shape; a stored checkpoint below
	/// this forces a full reset (§4.6 step 4, §8 invariant 5).
	fn table_version(&self) -> u32;
	fn path_matches(&self, path: &str) -> bool;
	fn validate(&self, value: &Value) -> bool;
	/// URL canonicalisation, ISO→epoch-ms conversion, optional-field
	/// defaults — applied after a file validates and before the upsert.
	fn normalize(&self, pathname: &str, value: Value) -> Value;
}

fn compile(schema: Value) -> Validator {
	jsonschema::validator_for(&schema).expect("dataset schema must compile")
}

/// ISO-8601 timestamp → epoch milliseconds; leaves non-string or
/// unparseable values untouched so a malformed-but-otherwise-valid file
/// still indexes.
fn iso_to_epoch_ms(value: &Value) -> Option<Value> {
	let s = value.as_str()?;
	let parsed = DateTime::parse_from_rfc3339(s).ok()?;
	Some(json!(parsed.timestamp_millis()))
}

fn normalize_date_field(mut value: Value, field: &str) -> Value {
	if let Some(obj) = value.as_object_mut() {
		if let Some(existing) = obj.get(field).cloned() {
			if let Some(converted) = iso_to_epoch_ms(&existing) {
				obj.insert(field.to_string(), converted);
			}
		}
	}
	value
}

/// Lowercases scheme+host and strips a trailing slash on any string field
/// named `href`/`url`/`link` — the "URL canonicalisation" step of §4.6.
fn canonicalize_url_fields(mut value: Value) -> Value {
	const URL_FIELDS: [&str; 3] = ["href", "url", "link"];
	if let Some(obj) = value.as_object_mut() {
		for field in URL_FIELDS {
			if let Some(Value::String(s)) = obj.get(field) {
				let canonical = s.trim_end_matches('/').to_string();
				obj.insert(field.to_string(), json!(canonical));
			}
		}
	}
	value
}

macro_rules! indexer {
	($name:ident, $dataset:literal, $json_type:literal, $path_re:literal, $schema:expr) => {
		pub struct $name {
			path_re: Regex,
			validator: Validator,
		}

		impl $name {
			pub fn new() -> Self {
				$name { path_re: Regex::new($path_re).expect("static regex"), validator: compile($schema) }
			}
		}

		impl Default for $name {
			fn default() -> Self {
				Self::new()
			}
		}

		impl DatasetIndexer for $name {
			fn dataset(&self) -> &str {
				$dataset
			}
			fn json_type(&self) -> &str {
				$json_type
			}
			fn table_version(&self) -> u32 {
				1
			}
			fn path_matches(&self, path: &str) -> bool {
				self.path_re.is_match(path)
			}
			fn validate(&self, value: &Value) -> bool {
				self.validator.is_valid(value)
			}
			fn normalize(&self, _pathname: &str, value: Value) -> Value {
				canonicalize_url_fields(normalize_date_field(value, "createdAt"))
			}
		}
	};
}

indexer!(
	StatusPostsIndexer,
	"statuses",
	"unwalled.garden/status",
	r"^/\.data/statuses/[^/]+\.json$",
	json!({"type": "object", "required": ["text"], "properties": {"text": {"type": "string"}}})
);

indexer!(
	CommentsIndexer,
	"comments",
	"unwalled.garden/comment",
	r"^/data/comments/[^/]+\.json$",
	json!({"type": "object", "required": ["text", "topic"], "properties": {"text": {"type": "string"}, "topic": {"type": "string"}}})
);

indexer!(
	BookmarksIndexer,
	"bookmarks",
	"unwalled.garden/bookmark",
	r"^/\.data/bookmarks/[^/]+\.json$",
	json!({"type": "object", "required": ["href"], "properties": {"href": {"type": "string"}, "title": {"type": "string"}}})
);

indexer!(
	FollowsIndexer,
	"follows",
	"unwalled.garden/follows",
	r"^/\.data/follows\.json$",
	json!({"type": "object", "required": ["urls"], "properties": {"urls": {"type": "array", "items": {"type": "string"}}}})
);

indexer!(
	VotesIndexer,
	"votes",
	"unwalled.garden/vote",
	r"^/\.data/unwalled\.garden/votes/[^/]+\.json$",
	json!({"type": "object", "required": ["topic", "vote"], "properties": {"topic": {"type": "string"}, "vote": {"type": "integer", "enum": [-1, 0, 1]}}})
);

indexer!(
	ReactionsIndexer,
	"reactions",
	"unwalled.garden/reaction",
	r"^/\.data/unwalled\.garden/reactions/[^/]+\.json$",
	json!({"type": "object", "required": ["topic", "emojis"], "properties": {"topic": {"type": "string"}, "emojis": {"type": "array"}}})
);

indexer!(
	SiteDescriptionsIndexer,
	"site-descriptions",
	"unwalled.garden/site-description",
	r"^/\.data/site-description\.json$",
	json!({"type": "object", "properties": {"title": {"type": "string"}, "description": {"type": "string"}}})
);

indexer!(
	DatListsIndexer,
	"dat-lists",
	"unwalled.garden/dat-list",
	r"^/\.data/dats\.json$",
	json!({"type": "object", "required": ["urls"], "properties": {"urls": {"type": "array", "items": {"type": "string"}}}})
);

/// Every indexer the crawler feeds, in the order declared by §4.6.
pub fn default_indexers() -> Vec<Box<dyn DatasetIndexer>> {
	vec![
		Box::new(StatusPostsIndexer::new()),
		Box::new(CommentsIndexer::new()),
		Box::new(BookmarksIndexer::new()),
		Box::new(FollowsIndexer::new()),
		Box::new(VotesIndexer::new()),
		Box::new(ReactionsIndexer::new()),
		Box::new(SiteDescriptionsIndexer::new()),
		Box::new(DatListsIndexer::new()),
	]
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bookmarks_matches_its_path_shape_only() {
		let idx = BookmarksIndexer::new();
		assert!(idx.path_matches("/.data/bookmarks/abc123.json"));
		assert!(!idx.path_matches("/.data/statuses/abc123.json"));
		assert!(!idx.path_matches("/.data/bookmarks/nested/abc.json"));
	}

	#[test]
	fn validate_rejects_missing_required_field() {
		let idx = BookmarksIndexer::new();
		assert!(idx.validate(&json!({"href": "https://example.test/"})));
		assert!(!idx.validate(&json!({"title": "no href"})));
	}

	#[test]
	fn normalize_converts_iso_dates_and_trims_urls() {
		let idx = BookmarksIndexer::new();
		let normalized = idx.normalize(
			"/.data/bookmarks/a.json",
			json!({"href": "https://example.test/page/", "createdAt": "2024-01-02T03:04:05Z"}),
		);
		assert_eq!(normalized["href"], json!("https://example.test/page"));
		assert!(normalized["createdAt"].is_i64());
	}

	#[test]
	fn votes_enum_is_enforced() {
		let idx = VotesIndexer::new();
		assert!(idx.validate(&json!({"topic": "dat://x/y", "vote": 1})));
		assert!(!idx.validate(&json!({"topic": "dat://x/y", "vote": 5})));
	}
}

// vim: ts=4
