//! `ArchiveFs` over the live append-only log (Design Notes §9): both the
//! writable head and a version-bounded historic checkout are the same
//! type, differing only in `as_of_version` and read-only-ness.

use crate::archive_log::{ArchiveLog, LogOp};
use crate::capabilities::{ArchiveFs, DirEntry, Stat};
use crate::error::ArchiveError;
use crate::types::Manifest;
use async_trait::async_trait;
use std::sync::Arc;

pub struct LiveArchiveFs {
	log: Arc<ArchiveLog>,
	/// `None` tracks the live head; `Some(v)` pins a historic checkout.
	as_of_version: Option<u64>,
}

impl LiveArchiveFs {
	pub fn head(log: Arc<ArchiveLog>) -> Self {
		LiveArchiveFs { log, as_of_version: None }
	}

	pub fn historic(log: Arc<ArchiveLog>, version: u64) -> Self {
		LiveArchiveFs { log, as_of_version: Some(version) }
	}

	fn version(&self) -> u64 {
		self.as_of_version.unwrap_or_else(|| self.log.latest_version())
	}

	fn normalize(path: &str) -> String {
		if path == "/" { String::new() } else { path.trim_end_matches('/').to_string() }
	}
}

#[async_trait]
impl ArchiveFs for LiveArchiveFs {
	async fn stat(&self, path: &str) -> Result<Stat, ArchiveError> {
		let target = Self::normalize(path);
		if let Some(bytes) = self.log.read_path_at(&format!("/{}", target.trim_start_matches('/')), self.version())
		{
			return Ok(Stat { is_directory: false, size: bytes.len() as u64, mtime_ms: 0 });
		}
		let prefix = format!("{}/", target);
		let is_dir = self.log.snapshot_paths(self.version()).iter().any(|p| p.starts_with(&prefix) || target.is_empty());
		if is_dir {
			Ok(Stat { is_directory: true, size: 0, mtime_ms: 0 })
		} else {
			Err(ArchiveError::NotFound { what: path.to_string() })
		}
	}

	async fn read_file(&self, path: &str) -> Result<Vec<u8>, ArchiveError> {
		self.log
			.read_path_at(path, self.version())
			.ok_or_else(|| ArchiveError::NotFound { what: path.to_string() })
	}

	async fn readdir(&self, path: &str) -> Result<Vec<DirEntry>, ArchiveError> {
		let prefix = Self::normalize(path);
		let search_prefix = if prefix.is_empty() { "/".to_string() } else { format!("{}/", prefix) };
		let mut seen = std::collections::BTreeMap::new();
		for full_path in self.log.snapshot_paths(self.version()) {
			let Some(rest) = full_path.strip_prefix(&search_prefix) else { continue };
			if rest.is_empty() {
				continue;
			}
			match rest.find('/') {
				Some(idx) => {
					seen.insert(rest[..idx].to_string(), true);
				}
				None => {
					seen.entry(rest.to_string()).or_insert(false);
				}
			}
		}
		Ok(seen.into_iter().map(|(name, is_directory)| DirEntry { name, is_directory }).collect())
	}

	async fn write_file(&self, path: &str, contents: &[u8]) -> Result<(), ArchiveError> {
		self.log.append(path.to_string(), LogOp::Put(contents.to_vec())).map(|_| ())
	}

	async fn mkdir(&self, _path: &str) -> Result<(), ArchiveError> {
		// Directories are implicit from file paths in the flat log; nothing
		// to materialise.
		Ok(())
	}

	async fn unlink(&self, path: &str) -> Result<(), ArchiveError> {
		self.log.append(path.to_string(), LogOp::Delete).map(|_| ())
	}

	async fn rmdir(&self, path: &str) -> Result<(), ArchiveError> {
		let prefix = format!("{}/", Self::normalize(path));
		let under: Vec<String> =
			self.log.snapshot_paths(self.version()).into_iter().filter(|p| p.starts_with(&prefix)).collect();
		for p in under {
			self.log.append(p, LogOp::Delete)?;
		}
		Ok(())
	}

	async fn read_manifest(&self) -> Result<Manifest, ArchiveError> {
		match self.read_file("/dat.json").await {
			Ok(bytes) => serde_json::from_slice(&bytes)
				.map_err(|e| ArchiveError::Other { message: e.to_string() }),
			Err(ArchiveError::NotFound { .. }) => Ok(Manifest::default()),
			Err(e) => Err(e),
		}
	}

	async fn write_manifest(&self, manifest: &Manifest) -> Result<(), ArchiveError> {
		let json = serde_json::to_vec_pretty(manifest)
			.map_err(|e| ArchiveError::Other { message: e.to_string() })?;
		self.write_file("/dat.json", &json).await
	}

	async fn read_size(&self) -> Result<u64, ArchiveError> {
		let version = self.version();
		let total: u64 = self
			.log
			.snapshot_paths(version)
			.iter()
			.filter_map(|p| self.log.read_path_at(p, version))
			.map(|bytes| bytes.len() as u64)
			.sum();
		Ok(total)
	}

	fn is_read_only(&self) -> bool {
		self.as_of_version.is_some() || !self.log.is_writable()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::key::KeyPair;

	fn writable_log() -> Arc<ArchiveLog> {
		Arc::new(ArchiveLog::new_owned(KeyPair::generate()))
	}

	#[tokio::test]
	async fn write_then_read_round_trips() {
		let log = writable_log();
		let fs = LiveArchiveFs::head(log);
		fs.write_file("/a.txt", b"hello").await.unwrap();
		assert_eq!(fs.read_file("/a.txt").await.unwrap(), b"hello");
	}

	#[tokio::test]
	async fn readdir_synthesises_directories() {
		let log = writable_log();
		let fs = LiveArchiveFs::head(log);
		fs.write_file("/dir/a.txt", b"1").await.unwrap();
		fs.write_file("/dir/sub/b.txt", b"2").await.unwrap();
		fs.write_file("/top.txt", b"3").await.unwrap();

		let root = fs.readdir("/").await.unwrap();
		assert!(root.iter().any(|e| e.name == "dir" && e.is_directory));
		assert!(root.iter().any(|e| e.name == "top.txt" && !e.is_directory));

		let sub = fs.readdir("/dir").await.unwrap();
		assert!(sub.iter().any(|e| e.name == "a.txt" && !e.is_directory));
		assert!(sub.iter().any(|e| e.name == "sub" && e.is_directory));
	}

	#[tokio::test]
	async fn historic_checkout_is_read_only_and_version_bounded() {
		let log = writable_log();
		let fs = LiveArchiveFs::head(Arc::clone(&log));
		fs.write_file("/a.txt", b"v1").await.unwrap();
		fs.write_file("/a.txt", b"v2").await.unwrap();

		let historic = LiveArchiveFs::historic(log, 1);
		assert!(historic.is_read_only());
		assert_eq!(historic.read_file("/a.txt").await.unwrap(), b"v1");
	}

	#[tokio::test]
	async fn rmdir_deletes_everything_under_prefix() {
		let log = writable_log();
		let fs = LiveArchiveFs::head(Arc::clone(&log));
		fs.write_file("/dir/a.txt", b"1").await.unwrap();
		fs.write_file("/dir/b.txt", b"2").await.unwrap();
		fs.rmdir("/dir").await.unwrap();
		assert!(fs.readdir("/").await.unwrap().is_empty());
	}
}

// vim: ts=4
