//! Single-file line diff (§4.3): refuses binary content and oversized
//! files before ever running a diff algorithm over them.

use crate::error::{ArchiveError, SyncEngineError};
use crate::util::{looks_binary_by_content, looks_binary_by_name};
use similar::{ChangeTag, TextDiff};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineChange {
	Equal(String),
	Insert(String),
	Delete(String),
}

/// Diff two text blobs line by line, refusing `InvalidEncoding` for binary
/// content (name heuristic first, then a content sniff) and
/// `SourceTooLarge` above `max_bytes`.
pub fn diff_single_file(
	path: &str,
	left: &[u8],
	right: &[u8],
	max_bytes: u64,
) -> Result<Vec<LineChange>, ArchiveError> {
	if looks_binary_by_name(path) {
		return Err(SyncEngineError::InvalidEncoding { path: path.to_string() }.into());
	}
	for (bytes, which) in [(left, "left"), (right, "right")] {
		let _ = which;
		if bytes.len() as u64 > max_bytes {
			return Err(SyncEngineError::SourceTooLarge {
				path: path.to_string(),
				size: bytes.len() as u64,
				max: max_bytes,
			}
			.into());
		}
		if looks_binary_by_content(bytes) {
			return Err(SyncEngineError::InvalidEncoding { path: path.to_string() }.into());
		}
	}

	let left_text = std::str::from_utf8(left).map_err(|_| SyncEngineError::InvalidEncoding {
		path: path.to_string(),
	})?;
	let right_text = std::str::from_utf8(right).map_err(|_| SyncEngineError::InvalidEncoding {
		path: path.to_string(),
	})?;

	let diff = TextDiff::from_lines(left_text, right_text);
	Ok(diff
		.iter_all_changes()
		.map(|change| {
			let line = change.value().to_string();
			match change.tag() {
				ChangeTag::Equal => LineChange::Equal(line),
				ChangeTag::Insert => LineChange::Insert(line),
				ChangeTag::Delete => LineChange::Delete(line),
			}
		})
		.collect())
}


// vim: ts=4
