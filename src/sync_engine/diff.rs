//! Tree diff and apply (§4.3).

use crate::capabilities::ArchiveFs;
use crate::error::ArchiveError;
use crate::exclusion::DatIgnoreMatcher;
use crate::types::{ChangeKind, DiffEntry};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct DiffOptions {
	/// Stop descending into a directory subtree once it differs, rather
	/// than enumerating every file inside it.
	pub shallow: bool,
	/// Compare file contents by hash rather than by size/mtime alone.
	pub compare_content: bool,
	/// When set, only these paths (and their ancestors/descendants) are
	/// considered; everything else is pruned from the traversal.
	pub path_whitelist: Option<Vec<String>>,
}

async fn list_tree(fs: &dyn ArchiveFs, root: &str) -> Result<BTreeMap<String, bool>, ArchiveError> {
	let mut out = BTreeMap::new();
	let mut stack = vec![root.to_string()];
	while let Some(dir) = stack.pop() {
		let entries = fs.readdir(&dir).await?;
		for entry in entries {
			let path =
				if dir == "/" { format!("/{}", entry.name) } else { format!("{}/{}", dir, entry.name) };
			out.insert(path.clone(), entry.is_directory);
			if entry.is_directory {
				stack.push(path);
			}
		}
	}
	Ok(out)
}

fn whitelisted(path: &str, whitelist: &Option<Vec<String>>) -> bool {
	match whitelist {
		None => true,
		Some(list) => list.iter().any(|w| path == w || path.starts_with(&format!("{}/", w))),
	}
}

/// Enumerate `left` and `right`, producing an ordered list of the changes
/// needed to bring `right` in line with `left`.
pub async fn diff_trees(
	left: &dyn ArchiveFs,
	right: &dyn ArchiveFs,
	ignore: Option<&DatIgnoreMatcher>,
	opts: &DiffOptions,
) -> Result<Vec<DiffEntry>, ArchiveError> {
	let left_tree = list_tree(left, "/").await?;
	let right_tree = list_tree(right, "/").await?;

	let mut entries = Vec::new();
	let mut skip_prefixes: Vec<String> = Vec::new();

	let mut all_paths: Vec<&String> = left_tree.keys().chain(right_tree.keys()).collect();
	all_paths.sort();
	all_paths.dedup();

	for path in all_paths {
		if !whitelisted(path, &opts.path_whitelist) {
			continue;
		}
		if let Some(matcher) = ignore {
			if matcher.is_ignored(path) {
				continue;
			}
		}
		if opts.shallow && skip_prefixes.iter().any(|p| path.starts_with(p.as_str())) {
			continue;
		}

		let in_left = left_tree.get(path);
		let in_right = right_tree.get(path);

		let change = match (in_left, in_right) {
			(Some(_), None) => Some(ChangeKind::Add),
			(None, Some(_)) => Some(ChangeKind::Del),
			(Some(&l_dir), Some(&r_dir)) => {
				if l_dir != r_dir {
					Some(ChangeKind::Mod)
				} else if !l_dir && opts.compare_content {
					let content_differs = match (left.read_file(path).await, right.read_file(path).await)
					{
						(Ok(l), Ok(r)) => l != r,
						_ => true,
					};
					if content_differs { Some(ChangeKind::Mod) } else { None }
				} else {
					None
				}
			}
			(None, None) => None,
		};

		if let Some(change) = change {
			let is_directory = in_left.or(in_right).copied().unwrap_or(false);
			if opts.shallow && is_directory && matches!(change, ChangeKind::Add | ChangeKind::Del) {
				skip_prefixes.push(format!("{}/", path));
			}
			entries.push(DiffEntry { change, path: path.clone(), is_directory });
		}
	}

	Ok(entries)
}

/// Apply a diff to `right`. `add_only` drops `Mod`/`Del` entries before
/// applying, guaranteeing `left` never destroys content on `right` that
/// `left` doesn't itself know about (§4.3 Apply).
pub async fn apply_diff(
	left: &dyn ArchiveFs,
	right: &dyn ArchiveFs,
	entries: &[DiffEntry],
	add_only: bool,
) -> Result<(), ArchiveError> {
	for entry in entries {
		if add_only && !matches!(entry.change, ChangeKind::Add) {
			continue;
		}
		match entry.change {
			ChangeKind::Add | ChangeKind::Mod => {
				if entry.is_directory {
					right.mkdir(&entry.path).await?;
				} else {
					let bytes = left.read_file(&entry.path).await?;
					right.write_file(&entry.path, &bytes).await?;
				}
			}
			ChangeKind::Del => {
				if entry.is_directory {
					right.rmdir(&entry.path).await?;
				} else {
					right.unlink(&entry.path).await?;
				}
			}
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::capabilities::ScopedLocalFs;

	async fn write(fs: &ScopedLocalFs, path: &str, contents: &str) {
		fs.write_file(path, contents.as_bytes()).await.unwrap();
	}

	#[tokio::test]
	async fn diff_detects_add_mod_del() {
		let left_dir = tempfile::tempdir().unwrap();
		let right_dir = tempfile::tempdir().unwrap();
		let left = ScopedLocalFs::new(left_dir.path().to_path_buf());
		let right = ScopedLocalFs::new(right_dir.path().to_path_buf());

		write(&left, "/a.txt", "left-a").await;
		write(&left, "/b.txt", "same").await;
		write(&right, "/b.txt", "same").await;
		write(&right, "/c.txt", "right-only").await;

		let opts = DiffOptions { compare_content: true, ..Default::default() };
		let entries = diff_trees(&left, &right, None, &opts).await.unwrap();

		assert!(entries.iter().any(|e| e.path == "/a.txt" && e.change == ChangeKind::Add));
		assert!(entries.iter().any(|e| e.path == "/c.txt" && e.change == ChangeKind::Del));
		assert!(!entries.iter().any(|e| e.path == "/b.txt"));
	}

	#[tokio::test]
	async fn apply_add_only_drops_mod_and_del() {
		let left_dir = tempfile::tempdir().unwrap();
		let right_dir = tempfile::tempdir().unwrap();
		let left = ScopedLocalFs::new(left_dir.path().to_path_buf());
		let right = ScopedLocalFs::new(right_dir.path().to_path_buf());

		write(&left, "/new.txt", "hello").await;
		write(&right, "/stale.txt", "bye").await;

		let entries = vec![
			DiffEntry { change: ChangeKind::Add, path: "/new.txt".to_string(), is_directory: false },
			DiffEntry { change: ChangeKind::Del, path: "/stale.txt".to_string(), is_directory: false },
		];
		apply_diff(&left, &right, &entries, true).await.unwrap();

		assert!(right.read_file("/new.txt").await.is_ok());
		assert!(right.read_file("/stale.txt").await.is_ok(), "del entry should have been dropped");
	}

	#[tokio::test]
	async fn ignore_rules_prune_traversal() {
		let left_dir = tempfile::tempdir().unwrap();
		let right_dir = tempfile::tempdir().unwrap();
		let left = ScopedLocalFs::new(left_dir.path().to_path_buf());
		let right = ScopedLocalFs::new(right_dir.path().to_path_buf());

		write(&left, "/node_modules/pkg.js", "noise").await;
		write(&left, "/src/main.rs", "fn main() {}").await;

		let rules = crate::types::IgnoreRules::parse("node_modules\n");
		let matcher = DatIgnoreMatcher::new(&rules).unwrap();
		let entries = diff_trees(&left, &right, Some(&matcher), &DiffOptions::default()).await.unwrap();

		assert!(!entries.iter().any(|e| e.path.contains("node_modules")));
		assert!(entries.iter().any(|e| e.path == "/src/main.rs"));
	}
}

// vim: ts=4
