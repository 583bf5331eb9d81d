#![allow(dead_code)]

//! `.datignore` matching (§3 IgnoreRules, §4.3): a path is ignored iff the
//! rule list matches the target path or any of its ancestors.

use crate::error::ExclusionError;
use crate::types::IgnoreRules;
use globset::{Glob, GlobSet, GlobSetBuilder};

pub struct DatIgnoreMatcher {
	set: GlobSet,
}

impl DatIgnoreMatcher {
	pub fn new(rules: &IgnoreRules) -> Result<Self, ExclusionError> {
		let mut builder = GlobSetBuilder::new();
		for pattern in &rules.patterns {
			let normalized = pattern.trim_start_matches('/');
			let glob = Glob::new(normalized)
				.map_err(|e| ExclusionError::InvalidPattern(format!("{}: {}", pattern, e)))?;
			builder.add(glob);
		}
		let set = builder
			.build()
			.map_err(|e| ExclusionError::InvalidPattern(format!("failed to build ignore set: {}", e)))?;
		Ok(DatIgnoreMatcher { set })
	}

	/// True if `path` (archive-rooted, leading `/`) or any ancestor of it
	/// matches the rule list.
	pub fn is_ignored(&self, path: &str) -> bool {
		for ancestor in ancestors(path) {
			if self.set.is_match(ancestor.trim_start_matches('/')) {
				return true;
			}
		}
		false
	}
}

/// Yields `path` itself, then each ancestor directory up to (not including)
/// the root, e.g. `/a/b/c.txt` -> `["/a/b/c.txt", "/a/b", "/a"]`.
fn ancestors(path: &str) -> Vec<String> {
	let trimmed = path.trim_start_matches('/');
	let segments: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();
	let mut out = Vec::with_capacity(segments.len());
	for i in (1..=segments.len()).rev() {
		out.push(format!("/{}", segments[..i].join("/")));
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn matches_exact_mandatory_entries() {
		let rules = IgnoreRules::empty();
		let matcher = DatIgnoreMatcher::new(&rules).unwrap();
		assert!(matcher.is_ignored("/.git"));
		assert!(matcher.is_ignored("/.git/HEAD"));
		assert!(matcher.is_ignored("/.dat"));
		assert!(!matcher.is_ignored("/foo.txt"));
	}

	#[test]
	fn matches_ancestor_directories() {
		let rules = IgnoreRules::parse("node_modules\n");
		let matcher = DatIgnoreMatcher::new(&rules).unwrap();
		assert!(matcher.is_ignored("/node_modules"));
		assert!(matcher.is_ignored("/node_modules/pkg/index.js"));
		assert!(!matcher.is_ignored("/src/node_modules_helper.js"));
	}

	#[test]
	fn anchored_pattern_only_matches_from_root() {
		let rules = IgnoreRules::parse("/build\n");
		let matcher = DatIgnoreMatcher::new(&rules).unwrap();
		assert!(matcher.is_ignored("/build"));
		assert!(matcher.is_ignored("/build/out.bin"));
		assert!(!matcher.is_ignored("/nested/build"));
	}

	#[test]
	fn ancestors_helper_orders_from_leaf_to_root() {
		assert_eq!(ancestors("/a/b/c.txt"), vec!["/a/b/c.txt", "/a/b", "/a"]);
		assert_eq!(ancestors("/top.txt"), vec!["/top.txt"]);
	}
}

// vim: ts=4
