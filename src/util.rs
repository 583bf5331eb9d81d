//! Shared utilities (§2.9): binary-content detection and filename slug
//! generation used by both `SyncEngine` and `Crawler`.
#![allow(dead_code)]

/// Extensions that are never treated as text regardless of content, so a
/// valid-UTF8 but binary-flavoured file (e.g. a `.png` that happens to
/// decode as UTF-8) is still refused.
const BINARY_EXTENSIONS: &[&str] = &[
	"png", "jpg", "jpeg", "gif", "webp", "bmp", "ico", "pdf", "zip", "gz", "tar", "7z", "woff", "woff2",
	"ttf", "otf", "mp3", "mp4", "mov", "wasm", "so", "dll", "exe", "bin",
];

pub fn looks_binary_by_name(path: &str) -> bool {
	path.rsplit('.').next().map(|ext| BINARY_EXTENSIONS.contains(&ext.to_lowercase().as_str())).unwrap_or(false)
}

/// First-bytes content sniff: a NUL byte in the first 8 KiB, or invalid
/// UTF-8 anywhere, marks the content as binary.
pub fn looks_binary_by_content(bytes: &[u8]) -> bool {
	let probe = &bytes[..bytes.len().min(8192)];
	if probe.contains(&0) {
		return true;
	}
	std::str::from_utf8(bytes).is_err()
}

/// Lowercase, ASCII, hyphen-separated slug for dataset filenames (e.g.
/// `/.data/bookmarks/<slug>.json`): strips anything that isn't
/// alphanumeric, collapses runs of separators into one `-`, and trims
/// leading/trailing hyphens. Falls back to a BLAKE3 prefix when the input
/// has no ASCII-alphanumeric characters at all, so a slug is never empty.
pub fn slugify(input: &str) -> String {
	let mut slug = String::with_capacity(input.len());
	let mut last_was_sep = false;
	for ch in input.chars() {
		if ch.is_ascii_alphanumeric() {
			slug.push(ch.to_ascii_lowercase());
			last_was_sep = false;
		} else if !last_was_sep && !slug.is_empty() {
			slug.push('-');
			last_was_sep = true;
		}
	}
	while slug.ends_with('-') {
		slug.pop();
	}
	if slug.is_empty() {
		return blake3::hash(input.as_bytes()).to_hex()[..16].to_string();
	}
	slug
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn slugify_lowercases_and_hyphenates() {
		assert_eq!(slugify("Hello, World!"), "hello-world");
	}

	#[test]
	fn slugify_collapses_runs_of_separators() {
		assert_eq!(slugify("a---b  c"), "a-b-c");
	}

	#[test]
	fn slugify_falls_back_to_a_hash_for_no_ascii_input() {
		let slug = slugify("日本語");
		assert_eq!(slug.len(), 16);
	}

	#[test]
	fn detects_binary_by_extension() {
		assert!(looks_binary_by_name("/photo.png"));
		assert!(!looks_binary_by_name("/notes.txt"));
	}

	#[test]
	fn detects_binary_by_nul_byte() {
		assert!(looks_binary_by_content(&[0u8, 1, 2, 3]));
		assert!(!looks_binary_by_content(b"hello world"));
	}
}

// vim: ts=4
