//! Core data model (§3): Archive, UserSettings, ArchiveMeta, bindings,
//! sync queues, ignore rules, and crawl bookkeeping.

use crate::key::{DiscoveryKey, Key};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

/// A single sample in an archive's peer-count history.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PeerCountSample {
	pub at_ms: u64,
	pub count: u32,
}

/// The manifest stored at `/dat.json` inside an archive (§6).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Manifest {
	pub title: String,
	pub description: String,
	#[serde(rename = "type")]
	pub kind: Vec<String>,
	pub author: Option<String>,
	pub fork_of: Option<String>,
	pub web_root: Option<String>,
	pub fallback_page: Option<String>,
	pub links: Option<serde_json::Value>,
	pub content_security_policy: Option<String>,
}

/// Handle to an append-only log of filesystem operations (§3 Archive).
///
/// `Registry` exclusively owns construction and teardown; other subsystems
/// hold only a keyed lookup back through the registry, never this struct
/// directly, matching the ownership rule in §3.
pub struct Archive {
	pub key: Key,
	pub discovery_key: DiscoveryKey,
	pub writable: bool,
	version: AtomicU64,
	size: AtomicU64,
	pub manifest: Mutex<Manifest>,
	pub is_swarming: AtomicBool,
	/// Arena indices into `SwarmHub`'s stream pool (Design Notes §9).
	pub stream_handles: Mutex<Vec<usize>>,
	pub autodownloader: Mutex<Option<()>>,
	pub sync_binding: Mutex<Option<LocalSyncBinding>>,
	pub peer_count_history: Mutex<Vec<PeerCountSample>>,
}

impl Archive {
	pub fn new(key: Key, writable: bool, manifest: Manifest) -> Self {
		Archive {
			discovery_key: key.discovery_key(),
			key,
			writable,
			version: AtomicU64::new(0),
			size: AtomicU64::new(0),
			manifest: Mutex::new(manifest),
			is_swarming: AtomicBool::new(false),
			stream_handles: Mutex::new(Vec::new()),
			autodownloader: Mutex::new(None),
			sync_binding: Mutex::new(None),
			peer_count_history: Mutex::new(Vec::new()),
		}
	}

	pub fn version(&self) -> u64 {
		self.version.load(Ordering::SeqCst)
	}

	pub fn size(&self) -> u64 {
		self.size.load(Ordering::SeqCst)
	}

	/// Advance the version. `version` never decreases (§3 invariant); panics
	/// in debug builds if callers violate that, since it indicates a logic
	/// error elsewhere in the log.
	pub fn set_version(&self, new_version: u64) {
		let prev = self.version.swap(new_version, Ordering::SeqCst);
		debug_assert!(new_version >= prev, "archive version must never decrease");
	}

	pub fn set_size(&self, new_size: u64) {
		self.size.store(new_size, Ordering::SeqCst);
	}
}

pub fn now_ms() -> u64 {
	SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Archive visibility, per `UserSettings.visibility`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
	Unlisted,
	Public,
}

impl Default for Visibility {
	fn default() -> Self {
		Visibility::Unlisted
	}
}

/// Per-archive, per-local-profile settings (§3 UserSettings).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserSettings {
	pub is_saved: bool,
	pub networked: bool,
	pub auto_download: bool,
	pub auto_upload: bool,
	/// 0 = never expires.
	pub expires_at: u64,
	pub local_sync_path: Option<PathBuf>,
	pub preview_mode: bool,
	pub visibility: Visibility,
	pub is_hosting: bool,
}

impl Default for UserSettings {
	fn default() -> Self {
		UserSettings {
			is_saved: false,
			networked: true,
			auto_download: false,
			auto_upload: false,
			expires_at: 0,
			local_sync_path: None,
			preview_mode: false,
			visibility: Visibility::Unlisted,
			is_hosting: false,
		}
	}
}

impl UserSettings {
	/// Enforce the two §3 invariants, normalising rather than rejecting —
	/// this mirrors `configureArchive`'s "persist, sanitize" behaviour.
	pub fn normalize(mut self) -> Self {
		if !self.is_saved {
			self.is_hosting = false;
			self.visibility = Visibility::Unlisted;
		}
		self
	}
}

/// Persisted archive metadata row (§3 ArchiveMeta).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveMeta {
	pub key: String,
	pub title: String,
	pub description: String,
	#[serde(rename = "type")]
	pub kind: Vec<String>,
	pub author: Option<String>,
	pub fork_of: Option<String>,
	pub mtime: u64,
	pub size: u64,
	pub is_owner: bool,
	pub last_access_time: u64,
	pub last_library_access_time: u64,
}

/// The association between an archive and a local folder (§3
/// LocalSyncBinding, derived per the table in §4.3).
#[derive(Debug, Clone, PartialEq)]
pub struct LocalSyncBinding {
	pub path: PathBuf,
	pub auto_publish: bool,
	pub is_using_internal: bool,
}

impl LocalSyncBinding {
	/// Derive a binding from settings per §4.3's table, or `None` if no
	/// binding should exist for this combination.
	pub fn derive(settings: &UserSettings, writable: bool, internal_path: PathBuf) -> Option<Self> {
		if !settings.is_saved {
			return None;
		}
		if !writable {
			return None;
		}
		match (&settings.local_sync_path, settings.preview_mode) {
			(Some(path), false) => {
				Some(LocalSyncBinding { path: path.clone(), auto_publish: true, is_using_internal: false })
			}
			(Some(path), true) => {
				Some(LocalSyncBinding { path: path.clone(), auto_publish: false, is_using_internal: false })
			}
			(None, true) => {
				Some(LocalSyncBinding { path: internal_path, auto_publish: false, is_using_internal: true })
			}
			(None, false) => None,
		}
	}
}

/// Coalesces watcher events for one archive (§3 SyncQueue).
///
/// Replaced wholesale (never mutated in place) on every debounce firing, so
/// in-flight event handlers observing the old object see a closed queue —
/// per §4.3 `queueSyncEvent`'s final step.
#[derive(Debug, Default)]
pub struct SyncQueue {
	pub to_folder: bool,
	pub to_archive: bool,
	pub is_syncing: bool,
}

pub type SharedSyncQueue = Arc<Mutex<SyncQueue>>;

/// Parsed `.datignore` pattern list plus the two mandatory entries (§3
/// IgnoreRules).
#[derive(Debug, Clone)]
pub struct IgnoreRules {
	pub patterns: Vec<String>,
}

impl IgnoreRules {
	pub const MANDATORY: [&'static str; 2] = ["/.git", "/.dat"];

	/// Parse raw `.datignore` contents per §4.3: strip `\r`, prefix bare
	/// patterns with `**/`, then append the mandatory entries.
	pub fn parse(contents: &str) -> Self {
		let mut patterns: Vec<String> = contents
			.lines()
			.map(|line| line.trim_end_matches('\r'))
			.filter(|line| !line.is_empty() && !line.starts_with('#'))
			.map(|line| if line.starts_with('/') { line.to_string() } else { format!("**/{}", line) })
			.collect();
		for mandatory in Self::MANDATORY {
			if !patterns.iter().any(|p| p == mandatory) {
				patterns.push(mandatory.to_string());
			}
		}
		IgnoreRules { patterns }
	}

	pub fn empty() -> Self {
		let mut patterns = Vec::new();
		for mandatory in Self::MANDATORY {
			patterns.push(mandatory.to_string());
		}
		IgnoreRules { patterns }
	}
}

/// A single row identifying an archive being indexed (§3 CrawlSource).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlSource {
	pub id: String,
	pub url: String,
	pub dns_binding_id: Option<String>,
	pub is_private: bool,
}

/// Per-(source, dataset) resumable checkpoint (§3 CrawlCheckpoint).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CrawlCheckpoint {
	pub table_version: u32,
	pub last_seen_version: u64,
}

impl CrawlCheckpoint {
	pub fn fresh(table_version: u32) -> Self {
		CrawlCheckpoint { table_version, last_seen_version: 0 }
	}

	/// True if the stored checkpoint predates the indexer's current schema,
	/// requiring a full dataset reset (§4.6 step 4, invariant 5 in §8).
	pub fn needs_reset(&self, current_table_version: u32) -> bool {
		self.table_version < current_table_version
	}
}

/// One entry in a folder↔archive diff (§4.3 diff algorithm output).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeKind {
	Add,
	Mod,
	Del,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
	pub change: ChangeKind,
	pub path: String,
	pub is_directory: bool,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn binding_table_matches_spec() {
		let internal = PathBuf::from("/internal");
		let mut s = UserSettings { is_saved: false, ..Default::default() };
		assert_eq!(LocalSyncBinding::derive(&s, true, internal.clone()), None);

		s.is_saved = true;
		assert_eq!(LocalSyncBinding::derive(&s, false, internal.clone()), None);

		s.local_sync_path = Some(PathBuf::from("/foo"));
		s.preview_mode = false;
		let b = LocalSyncBinding::derive(&s, true, internal.clone()).unwrap();
		assert!(b.auto_publish);
		assert!(!b.is_using_internal);

		s.preview_mode = true;
		let b = LocalSyncBinding::derive(&s, true, internal.clone()).unwrap();
		assert!(!b.auto_publish);

		s.local_sync_path = None;
		s.preview_mode = true;
		let b = LocalSyncBinding::derive(&s, true, internal.clone()).unwrap();
		assert!(b.is_using_internal);
		assert_eq!(b.path, internal);

		s.preview_mode = false;
		assert_eq!(LocalSyncBinding::derive(&s, true, internal), None);
	}

	#[test]
	fn ignore_rules_prefix_and_mandatory_entries() {
		let rules = IgnoreRules::parse("node_modules\n/absolute\r\n# comment\n");
		assert!(rules.patterns.contains(&"**/node_modules".to_string()));
		assert!(rules.patterns.contains(&"/absolute".to_string()));
		assert!(rules.patterns.contains(&"/.git".to_string()));
		assert!(rules.patterns.contains(&"/.dat".to_string()));
		assert!(!rules.patterns.iter().any(|p| p.contains("comment")));
	}

	#[test]
	fn checkpoint_reset_on_table_version_bump() {
		let cp = CrawlCheckpoint { table_version: 3, last_seen_version: 42 };
		assert!(!cp.needs_reset(3));
		assert!(cp.needs_reset(4));
	}

	#[test]
	fn settings_normalize_enforces_invariant() {
		let s = UserSettings {
			is_saved: false,
			is_hosting: true,
			visibility: Visibility::Public,
			..Default::default()
		}
		.normalize();
		assert!(!s.is_hosting);
		assert_eq!(s.visibility, Visibility::Unlisted);
	}
}

// vim: ts=4
