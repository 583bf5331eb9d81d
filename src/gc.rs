//! Garbage collection (§4.5): timer-driven sweep of expired/unused
//! archives and stale trash entries.

use crate::config::RuntimeConfig;
use crate::error::ArchiveError;
use crate::meta_store::MetaStore;
use crate::registry::Registry;
use crate::types::now_ms;
use std::sync::Arc;
use tokio::time::interval;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcResult {
	pub total_bytes: u64,
	pub total_archives: u64,
	pub skipped_archives: u64,
}

pub struct Gc {
	config: Arc<RuntimeConfig>,
	meta_store: Arc<dyn MetaStore>,
	registry: Arc<Registry>,
}

impl Gc {
	pub fn new(config: Arc<RuntimeConfig>, meta_store: Arc<dyn MetaStore>, registry: Arc<Registry>) -> Self {
		Gc { config, meta_store, registry }
	}

	/// Drives the timer loop for the lifetime of the process: first
	/// collection after `gc_initial_delay`, then every `gc_interval`.
	/// Clears any pending tick before running, and always reschedules on
	/// exit, success or error (§4.5).
	pub async fn run_forever(&self) {
		tokio::time::sleep(self.config.gc_initial_delay).await;
		let mut ticker = interval(self.config.gc_interval);
		ticker.tick().await; // first tick fires immediately; consume it here
		loop {
			match self.collect().await {
				Ok(result) => {
					info!(
						total_bytes = result.total_bytes,
						total_archives = result.total_archives,
						skipped_archives = result.skipped_archives,
						"gc pass complete"
					);
				}
				Err(e) => warn!(error = %e, "gc pass failed"),
			}
			ticker.tick().await;
		}
	}

	/// One full GC pass, per §4.5's three-step procedure.
	pub async fn collect(&self) -> Result<GcResult, ArchiveError> {
		let now = now_ms();
		self.expire_archives(now).await?;
		let (freed_bytes, freed_archives, skipped) = self.collect_unused_archives(now).await?;
		let trash_bytes = self.sweep_trash(now).await?;
		Ok(GcResult {
			total_bytes: freed_bytes + trash_bytes,
			total_archives: freed_archives,
			skipped_archives: skipped,
		})
	}

	/// Step 1: archives past `expiresAt` become unsaved.
	async fn expire_archives(&self, now: u64) -> Result<(), ArchiveError> {
		for key in self.meta_store.list_expired_archives(now).await? {
			if let Some(settings) = self.meta_store.get_user_settings(key).await? {
				let mut settings = settings;
				settings.is_saved = false;
				self.meta_store.set_user_settings(key, settings.normalize()).await?;
			}
		}
		Ok(())
	}

	/// Step 2: unsaved archives idle past `gc_unused_age` are unloaded and
	/// their metadata deleted. Returns `(bytes_freed, archives_freed,
	/// archives_skipped)`.
	async fn collect_unused_archives(&self, now: u64) -> Result<(u64, u64, u64), ArchiveError> {
		let unused_before = now.saturating_sub(self.config.gc_unused_age.as_millis() as u64);
		let candidates = self.meta_store.list_garbage_collectable_archives(unused_before).await?;

		let mut freed_bytes = 0u64;
		let mut freed_archives = 0u64;
		let mut skipped = 0u64;

		for key in candidates {
			let hex = key.to_hex();
			let meta = self.meta_store.get_meta(key).await.ok().flatten();
			if let Some(archive) = self.registry.get_archive(&hex) {
				self.registry.unload_archive(key).await;
				freed_bytes += archive.size();
			} else if let Some(meta) = &meta {
				freed_bytes += meta.size;
			}
			match self.meta_store.delete_archive(key).await {
				Ok(()) => freed_archives += 1,
				Err(_) => skipped += 1,
			}
		}

		Ok((freed_bytes, freed_archives, skipped))
	}

	/// Step 3: sweep the trash directory for entries older than
	/// `trash_max_age`.
	async fn sweep_trash(&self, now: u64) -> Result<u64, ArchiveError> {
		let trash_dir = self.config.trash_dir();
		let mut freed = 0u64;
		let max_age_ms = self.config.trash_max_age.as_millis() as u64;

		let mut entries = match tokio::fs::read_dir(&trash_dir).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
			Err(e) => return Err(e.into()),
		};

		while let Some(entry) = entries.next_entry().await? {
			let meta = entry.metadata().await?;
			let mtime_ms = meta
				.modified()
				.ok()
				.and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
				.map(|d| d.as_millis() as u64)
				.unwrap_or(0);
			if now.saturating_sub(mtime_ms) < max_age_ms {
				continue;
			}
			let size = dir_size(&entry.path()).await;
			if meta.is_dir() {
				tokio::fs::remove_dir_all(entry.path()).await?;
			} else {
				tokio::fs::remove_file(entry.path()).await?;
			}
			freed += size;
		}

		Ok(freed)
	}
}

fn dir_size(path: &std::path::Path) -> std::pin::Pin<Box<dyn std::future::Future<Output = u64> + Send + '_>> {
	Box::pin(async move {
		let meta = match tokio::fs::metadata(path).await {
			Ok(m) => m,
			Err(_) => return 0,
		};
		if !meta.is_dir() {
			return meta.len();
		}
		let mut total = 0u64;
		let mut stack = vec![path.to_path_buf()];
		while let Some(dir) = stack.pop() {
			let Ok(mut entries) = tokio::fs::read_dir(&dir).await else { continue };
			while let Ok(Some(entry)) = entries.next_entry().await {
				if let Ok(meta) = entry.metadata().await {
					if meta.is_dir() {
						stack.push(entry.path());
					} else {
						total += meta.len();
					}
				}
			}
		}
		total
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::key::KeyPair;
	use crate::meta_store::RedbMetaStore;
	use crate::registry::{NoopSideEffects, Registry};
	use crate::types::{ArchiveMeta, UserSettings};

	async fn test_gc() -> (Gc, tempfile::TempDir) {
		let dir = tempfile::tempdir().unwrap();
		let meta_store: Arc<dyn MetaStore> =
			Arc::new(RedbMetaStore::open(&dir.path().join("meta.redb")).unwrap());
		let config = Arc::new(RuntimeConfig { dat_path: dir.path().to_path_buf(), ..Default::default() });
		let registry =
			Arc::new(Registry::new(config.as_ref().clone(), Arc::clone(&meta_store), Arc::new(NoopSideEffects)));
		(Gc::new(config, meta_store, registry), dir)
	}

	#[tokio::test]
	async fn expires_archives_past_expiry() {
		let (gc, _dir) = test_gc().await;
		let key = KeyPair::generate().public_key();
		let settings = UserSettings { is_saved: true, expires_at: 1000, ..Default::default() };
		gc.meta_store.set_user_settings(key, settings).await.unwrap();

		gc.expire_archives(2000).await.unwrap();
		let after = gc.meta_store.get_user_settings(key).await.unwrap().unwrap();
		assert!(!after.is_saved);
	}

	#[tokio::test]
	async fn sweep_trash_removes_old_entries_only() {
		let (gc, dir) = test_gc().await;
		let trash = dir.path().join("Trash");
		tokio::fs::create_dir_all(&trash).await.unwrap();
		let old_file = trash.join("old.bin");
		tokio::fs::write(&old_file, b"stale").await.unwrap();
		let old_time = filetime::FileTime::from_unix_time(0, 0);
		filetime::set_file_mtime(&old_file, old_time).unwrap();

		let fresh_file = trash.join("fresh.bin");
		tokio::fs::write(&fresh_file, b"new").await.unwrap();

		let freed = gc.sweep_trash(now_ms()).await.unwrap();
		assert!(freed > 0);
		assert!(!old_file.exists());
		assert!(fresh_file.exists());
	}

	#[tokio::test]
	async fn collect_unused_deletes_idle_unsaved_archives() {
		let (gc, _dir) = test_gc().await;
		let key = KeyPair::generate().public_key();
		let hex = key.to_hex();
		gc.meta_store.set_user_settings(key, UserSettings { is_saved: false, ..Default::default() }).await.unwrap();
		gc.meta_store
			.set_meta(ArchiveMeta {
				key: hex.clone(),
				title: String::new(),
				description: String::new(),
				kind: vec![],
				author: None,
				fork_of: None,
				mtime: 0,
				size: 1024,
				is_owner: false,
				last_access_time: 0,
				last_library_access_time: 0,
			})
			.await
			.unwrap();

		let (bytes, archives, skipped) = gc.collect_unused_archives(now_ms()).await.unwrap();
		assert_eq!(archives, 1);
		assert_eq!(skipped, 0);
		assert_eq!(bytes, 1024);
	}
}

// vim: ts=4
