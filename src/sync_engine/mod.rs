//! Folder↔archive synchronisation (§4.3), the engine's hardest subsystem.

mod diff;
mod queue;
mod single_file;
mod watcher;

pub use diff::{apply_diff, diff_trees, DiffOptions};
pub use single_file::{diff_single_file, LineChange};

use crate::archive_fs::LiveArchiveFs;
use crate::archive_log::ArchiveLog;
use crate::capabilities::{ArchiveFs, ScopedLocalFs};
use crate::config::RuntimeConfig;
use crate::error::{ArchiveError, SyncEngineError};
use crate::exclusion::DatIgnoreMatcher;
use crate::locks::{names, NamedLocks};
use crate::types::{Archive, DiffEntry, IgnoreRules, LocalSyncBinding, Manifest};
use queue::SyncEventQueue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::mpsc::unbounded_channel;
use tracing::{info, warn};
use watcher::FolderWatcher;

/// Per-archive watcher + debounce state, torn down and rebuilt by every
/// `configure_binding` call.
struct BindingState {
	_folder_watcher: Option<FolderWatcher>,
	_ignore_watcher: Option<FolderWatcher>,
	queue: Arc<SyncEventQueue>,
	binding: LocalSyncBinding,
}

pub struct SyncEngine {
	config: Arc<RuntimeConfig>,
	locks: Arc<NamedLocks>,
	active_syncs: StdMutex<HashMap<String, Arc<AtomicU64>>>,
	bindings: StdMutex<HashMap<String, BindingState>>,
	/// One monotonic call counter per archive, per §4.3 `configureBinding`:
	/// a stale in-flight call checks this after every `await` and aborts.
	generation_counter: StdMutex<HashMap<String, Arc<StdMutex<u64>>>>,
}

impl SyncEngine {
	pub fn new(config: Arc<RuntimeConfig>, locks: Arc<NamedLocks>) -> Self {
		SyncEngine {
			config,
			locks,
			active_syncs: StdMutex::new(HashMap::new()),
			bindings: StdMutex::new(HashMap::new()),
			generation_counter: StdMutex::new(HashMap::new()),
		}
	}

	fn active_counter(&self, key_hex: &str) -> Arc<AtomicU64> {
		self.active_syncs
			.lock()
			.unwrap()
			.entry(key_hex.to_string())
			.or_insert_with(|| Arc::new(AtomicU64::new(0)))
			.clone()
	}

	async fn ignore_matcher(local_path: &std::path::Path) -> DatIgnoreMatcher {
		let contents = tokio::fs::read_to_string(local_path.join(".datignore")).await.unwrap_or_default();
		let rules = if contents.is_empty() { IgnoreRules::empty() } else { IgnoreRules::parse(&contents) };
		DatIgnoreMatcher::new(&rules).unwrap_or_else(|_| DatIgnoreMatcher::new(&IgnoreRules::empty()).unwrap())
	}

	/// `syncArchiveToFolder(A, opts)` — no writability requirement.
	/// `add_only` suppresses deletes/overwrites of folder-only content, used
	/// for a binding's first archive→folder pass so the archive doesn't
	/// clobber pre-existing folder state it has never seen (§4.3).
	pub async fn sync_archive_to_folder(
		&self,
		archive: &Archive,
		log: Arc<ArchiveLog>,
		folder: &std::path::Path,
		opts: &DiffOptions,
		add_only: bool,
	) -> Result<Vec<DiffEntry>, ArchiveError> {
		let hex = archive.key.to_hex();
		let _guard = self.locks.acquire(&names::sync(&hex)).await;
		let counter = self.active_counter(&hex);
		counter.fetch_add(1, Ordering::SeqCst);

		let archive_fs = LiveArchiveFs::head(log);
		let local_fs = ScopedLocalFs::new(folder.to_path_buf());
		let matcher = Self::ignore_matcher(folder).await;
		let result = match diff_trees(&archive_fs, &local_fs, Some(&matcher), opts).await {
			Ok(entries) => apply_diff(&archive_fs, &local_fs, &entries, add_only).await.map(|_| entries),
			Err(e) => Err(e),
		};

		counter.fetch_sub(1, Ordering::SeqCst);
		result
	}

	/// `syncFolderToArchive(A, opts)` — fails `NotWritable` unless A is
	/// writable.
	pub async fn sync_folder_to_archive(
		&self,
		archive: &Archive,
		log: Arc<ArchiveLog>,
		folder: &std::path::Path,
		opts: &DiffOptions,
	) -> Result<Vec<DiffEntry>, ArchiveError> {
		if !archive.writable {
			return Err(SyncEngineError::NotWritable { key: archive.key.to_hex() }.into());
		}
		let hex = archive.key.to_hex();
		let _guard = self.locks.acquire(&names::sync(&hex)).await;
		let counter = self.active_counter(&hex);
		counter.fetch_add(1, Ordering::SeqCst);

		let archive_fs = LiveArchiveFs::head(log);
		let local_fs = ScopedLocalFs::new(folder.to_path_buf());
		let matcher = Self::ignore_matcher(folder).await;
		let result = match diff_trees(&local_fs, &archive_fs, Some(&matcher), opts).await {
			Ok(entries) => apply_diff(&local_fs, &archive_fs, &entries, false).await.map(|_| entries),
			Err(e) => Err(e),
		};

		counter.fetch_sub(1, Ordering::SeqCst);
		result
	}

	/// `mergeArchiveAndFolder(A)` — initial reconciliation on first bind:
	/// merge manifests (folder wins), then archive→folder add-only, then
	/// folder→archive full.
	pub async fn merge_archive_and_folder(
		&self,
		archive: &Archive,
		log: Arc<ArchiveLog>,
		folder: &std::path::Path,
	) -> Result<(), ArchiveError> {
		let archive_fs = LiveArchiveFs::head(Arc::clone(&log));
		let local_fs = ScopedLocalFs::new(folder.to_path_buf());

		let archive_manifest = archive_fs.read_manifest().await?;
		let folder_manifest = local_fs.read_manifest().await?;
		let merged = merge_manifests(archive_manifest, folder_manifest);
		local_fs.write_manifest(&merged).await?;

		let opts = DiffOptions { shallow: false, compare_content: true, path_whitelist: None };
		let to_folder = diff_trees(&archive_fs, &local_fs, None, &opts).await?;
		apply_diff(&archive_fs, &local_fs, &to_folder, true).await?;

		let to_archive = diff_trees(&local_fs, &archive_fs, None, &opts).await?;
		apply_diff(&local_fs, &archive_fs, &to_archive, false).await?;

		info!(key = %archive.key, "merged archive and folder");
		Ok(())
	}

	/// `configureBinding(A)` — rebuild watchers for a (possibly new)
	/// binding, guarded by a monotonic call counter so a stale in-flight
	/// call aborts after any `await` if superseded.
	pub async fn configure_binding(
		self: &Arc<Self>,
		archive: Arc<Archive>,
		log: Arc<ArchiveLog>,
		binding: Option<LocalSyncBinding>,
	) -> Result<(), ArchiveError> {
		let hex = archive.key.to_hex();
		let generation_cell = {
			let mut counters = self.generation_counter.lock().unwrap();
			counters.entry(hex.clone()).or_insert_with(|| Arc::new(StdMutex::new(0))).clone()
		};
		let my_generation = {
			let mut g = generation_cell.lock().unwrap();
			*g += 1;
			*g
		};
		let stale = || *generation_cell.lock().unwrap() != my_generation;

		// tear down whatever watcher existed before.
		self.bindings.lock().unwrap().remove(&hex);

		let Some(binding) = binding else {
			return Ok(());
		};

		if binding.is_using_internal {
			tokio::fs::create_dir_all(&binding.path).await?;
		}
		if stale() {
			return Ok(());
		}
		if !binding.path.exists() {
			warn!(key = %archive.key, path = %binding.path.display(), "sync binding folder missing, not watching");
			return Ok(());
		}

		let queue = Arc::new(SyncEventQueue::new(self.config.sync_debounce));
		let (tx, folder_rx) = unbounded_channel();
		let folder_watcher =
			if binding.auto_publish { FolderWatcher::watch(&binding.path, tx).ok() } else { None };
		let (ignore_tx, ignore_rx) = unbounded_channel();
		let ignore_watcher = FolderWatcher::watch_file(&binding.path.join(".datignore"), ignore_tx).ok();

		if stale() {
			return Ok(());
		}

		if binding.auto_publish {
			self.merge_archive_and_folder(&archive, Arc::clone(&log), &binding.path).await?;
		} else {
			let opts = DiffOptions { shallow: false, compare_content: true, path_whitelist: None };
			self.sync_archive_to_folder(&archive, Arc::clone(&log), &binding.path, &opts, true).await?;
		}

		if stale() {
			return Ok(());
		}

		if folder_watcher.is_some() {
			// a folder change means the local copy is ahead: fold it toward the archive.
			self.spawn_change_driver(Arc::clone(&archive), Arc::clone(&log), hex.clone(), false, true, folder_rx);
		}
		// `.datignore` changes affect both directions equally; re-run whatever
		// direction the binding normally drives.
		self.spawn_change_driver(Arc::clone(&archive), Arc::clone(&log), hex.clone(), !binding.auto_publish, binding.auto_publish, ignore_rx);

		self.bindings.lock().unwrap().insert(
			hex,
			BindingState { _folder_watcher: folder_watcher, _ignore_watcher: ignore_watcher, queue, binding },
		);
		Ok(())
	}

	/// Drains a watcher's change signals into the binding's debounce queue
	/// and, once armed, waits out the debounce window before firing exactly
	/// one sync. Exits once the channel closes (the watcher was torn down by
	/// a later `configure_binding` call).
	fn spawn_change_driver(
		self: &Arc<Self>,
		archive: Arc<Archive>,
		log: Arc<ArchiveLog>,
		hex: String,
		to_folder: bool,
		to_archive: bool,
		mut changes: tokio::sync::mpsc::UnboundedReceiver<()>,
	) {
		let engine = Arc::clone(self);
		tokio::spawn(async move {
			while changes.recv().await.is_some() {
				if !engine.queue_sync_event(&hex, to_folder, to_archive) {
					continue;
				}
				if let Some(debounce) = engine.debounce_for(&hex) {
					tokio::time::sleep(debounce).await;
				}
				let Some(binding) = engine.bindings.lock().unwrap().get(&hex).map(|s| s.binding.clone()) else {
					continue;
				};
				if let Err(e) = engine.fire_queued_sync(&archive, Arc::clone(&log), &binding).await {
					warn!(key = %archive.key, error = %e, "debounced sync failed");
				}
			}
		});
	}

	/// `queueSyncEvent(A, {toFolder, toArchive})`: coalesces via the
	/// binding's debounce queue. Returns whether the caller should arm a
	/// debounce timer.
	pub fn queue_sync_event(&self, key_hex: &str, to_folder: bool, to_archive: bool) -> bool {
		let bindings = self.bindings.lock().unwrap();
		match bindings.get(key_hex) {
			Some(state) => state.queue.enqueue(to_folder, to_archive),
			None => false,
		}
	}

	pub fn debounce_for(&self, key_hex: &str) -> Option<std::time::Duration> {
		self.bindings.lock().unwrap().get(key_hex).map(|s| s.queue.debounce())
	}

	/// Called once the debounce timer armed by `queue_sync_event` fires:
	/// locks the queue, re-checks folder existence, runs exactly one
	/// directional sync, then replaces the queue object.
	pub async fn fire_queued_sync(
		&self,
		archive: &Archive,
		log: Arc<ArchiveLog>,
		binding: &LocalSyncBinding,
	) -> Result<(), ArchiveError> {
		let hex = archive.key.to_hex();
		let queue = match self.bindings.lock().unwrap().get(&hex) {
			Some(state) => state.queue.clone(),
			None => return Ok(()),
		};
		let Some(run) = queue.fire() else { return Ok(()) };

		if !binding.path.exists() {
			warn!(key = %archive.key, "sync binding folder disappeared, stopping watch");
			self.bindings.lock().unwrap().remove(&hex);
			queue.finish(run);
			return Ok(());
		}

		let opts = DiffOptions { shallow: false, compare_content: true, path_whitelist: None };
		let outcome = if run.run_to_archive {
			self.sync_folder_to_archive(archive, log, &binding.path, &opts).await
		} else {
			self.sync_archive_to_folder(archive, log, &binding.path, &opts, false).await
		};

		queue.finish(run);

		match &outcome {
			Err(ArchiveError::CycleError { message }) => {
				warn!(key = %archive.key, message = %message, "sync cycle error");
			}
			Err(e) => {
				warn!(key = %archive.key, error = %e, "sync failed");
			}
			Ok(_) => {}
		}
		outcome.map(|_| ())
	}

	/// `ensureSyncFinished(A)` — awaits the per-archive sync lock, then
	/// re-checks the active-sync counter; recurses until both hold.
	pub async fn ensure_sync_finished(&self, key_hex: &str) {
		loop {
			let guard = self.locks.acquire(&names::sync(key_hex)).await;
			let counter = self.active_counter(key_hex);
			if counter.load(Ordering::SeqCst) == 0 {
				return;
			}
			drop(guard);
			tokio::task::yield_now().await;
		}
	}
}

fn merge_manifests(archive: Manifest, folder: Manifest) -> Manifest {
	Manifest {
		title: if folder.title.is_empty() { archive.title } else { folder.title },
		description: if folder.description.is_empty() { archive.description } else { folder.description },
		kind: if folder.kind.is_empty() { archive.kind } else { folder.kind },
		author: folder.author.or(archive.author),
		fork_of: folder.fork_of.or(archive.fork_of),
		web_root: folder.web_root.or(archive.web_root),
		fallback_page: folder.fallback_page.or(archive.fallback_page),
		links: folder.links.or(archive.links),
		content_security_policy: folder.content_security_policy.or(archive.content_security_policy),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::key::KeyPair;

	fn test_engine() -> SyncEngine {
		SyncEngine::new(Arc::new(RuntimeConfig::default()), Arc::new(NamedLocks::new()))
	}

	#[tokio::test]
	async fn folder_to_archive_refuses_when_not_writable() {
		let engine = test_engine();
		let kp = KeyPair::generate();
		let key = kp.public_key();
		let archive = Archive::new(key, false, Manifest::default());
		let log = Arc::new(ArchiveLog::new_readonly(key));
		let dir = tempfile::tempdir().unwrap();
		let result =
			engine.sync_folder_to_archive(&archive, log, dir.path(), &DiffOptions::default()).await;
		assert!(matches!(result, Err(ArchiveError::SyncEngine(SyncEngineError::NotWritable { .. }))));
	}

	#[tokio::test]
	async fn merge_writes_folder_winning_manifest() {
		let engine = test_engine();
		let kp = KeyPair::generate();
		let key = kp.public_key();
		let archive = Archive::new(key, true, Manifest::default());
		let log = Arc::new(ArchiveLog::new_owned(kp));
		let archive_fs = LiveArchiveFs::head(Arc::clone(&log));
		archive_fs
			.write_manifest(&Manifest { title: "from-archive".into(), ..Default::default() })
			.await
			.unwrap();

		let dir = tempfile::tempdir().unwrap();
		let local_fs = ScopedLocalFs::new(dir.path().to_path_buf());
		local_fs
			.write_manifest(&Manifest { title: "from-folder".into(), ..Default::default() })
			.await
			.unwrap();

		engine.merge_archive_and_folder(&archive, log, dir.path()).await.unwrap();
		let merged = local_fs.read_manifest().await.unwrap();
		assert_eq!(merged.title, "from-folder");
	}

	#[tokio::test]
	async fn ensure_sync_finished_waits_for_zero_counter() {
		let engine = Arc::new(test_engine());
		let counter = engine.active_counter("abc");
		counter.fetch_add(1, Ordering::SeqCst);
		let e2 = engine.clone();
		let handle = tokio::spawn(async move {
			tokio::time::sleep(std::time::Duration::from_millis(20)).await;
			e2.active_counter("abc").fetch_sub(1, Ordering::SeqCst);
		});
		engine.ensure_sync_finished("abc").await;
		handle.await.unwrap();
	}

	#[tokio::test]
	async fn archive_to_folder_populates_empty_directory() {
		let engine = test_engine();
		let kp = KeyPair::generate();
		let key = kp.public_key();
		let archive = Archive::new(key, true, Manifest::default());
		let log = Arc::new(ArchiveLog::new_owned(kp));
		LiveArchiveFs::head(Arc::clone(&log)).write_file("/hello.txt", b"hi").await.unwrap();

		let dir = tempfile::tempdir().unwrap();
		engine
			.sync_archive_to_folder(&archive, log, dir.path(), &DiffOptions { compare_content: true, ..Default::default() }, false)
			.await
			.unwrap();

		let content = tokio::fs::read(dir.path().join("hello.txt")).await.unwrap();
		assert_eq!(content, b"hi");
	}

	/// §4.3: a non-autoPublish binding's first archive→folder pass must not
	/// delete or overwrite pre-existing folder content the archive has
	/// never seen — the archive is additive only until the folder opts in.
	#[tokio::test]
	async fn first_preview_sync_is_add_only() {
		let engine = test_engine();
		let kp = KeyPair::generate();
		let key = kp.public_key();
		let archive = Archive::new(key, false, Manifest::default());
		let log = Arc::new(ArchiveLog::new_owned(kp));
		LiveArchiveFs::head(Arc::clone(&log)).write_file("/archive-only.txt", b"from archive").await.unwrap();

		let dir = tempfile::tempdir().unwrap();
		tokio::fs::write(dir.path().join("folder-only.txt"), b"pre-existing").await.unwrap();

		engine
			.sync_archive_to_folder(
				&archive,
				log,
				dir.path(),
				&DiffOptions { compare_content: true, ..Default::default() },
				true,
			)
			.await
			.unwrap();

		let archive_copy = tokio::fs::read(dir.path().join("archive-only.txt")).await.unwrap();
		assert_eq!(archive_copy, b"from archive");
		let preserved = tokio::fs::read(dir.path().join("folder-only.txt")).await.unwrap();
		assert_eq!(preserved, b"pre-existing");
	}
}

// vim: ts=4
