//! The `ArchiveFs` capability set (Design Notes §9): object-shape
//! polymorphism between archive, scoped local filesystem, historic
//! checkout, and preview filesystem becomes one trait every sync/diff
//! operation is generic over.

use crate::error::ArchiveError;
use crate::types::Manifest;
use async_trait::async_trait;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct Stat {
	pub is_directory: bool,
	pub size: u64,
	pub mtime_ms: u64,
}

/// One entry yielded by `readdir`.
#[derive(Debug, Clone)]
pub struct DirEntry {
	pub name: String,
	pub is_directory: bool,
}

/// The common surface every archive-like filesystem exposes: the live
/// archive log, a historic checkout bounded by version, a scoped local
/// folder, or a preview filesystem filtered by ignore rules.
#[async_trait]
pub trait ArchiveFs: Send + Sync {
	async fn stat(&self, path: &str) -> Result<Stat, ArchiveError>;
	async fn read_file(&self, path: &str) -> Result<Vec<u8>, ArchiveError>;
	async fn readdir(&self, path: &str) -> Result<Vec<DirEntry>, ArchiveError>;
	async fn write_file(&self, path: &str, contents: &[u8]) -> Result<(), ArchiveError>;
	async fn mkdir(&self, path: &str) -> Result<(), ArchiveError>;
	async fn unlink(&self, path: &str) -> Result<(), ArchiveError>;
	async fn rmdir(&self, path: &str) -> Result<(), ArchiveError>;
	async fn read_manifest(&self) -> Result<Manifest, ArchiveError>;
	async fn write_manifest(&self, manifest: &Manifest) -> Result<(), ArchiveError>;
	async fn read_size(&self) -> Result<u64, ArchiveError>;

	/// Whether this view rejects mutation (historic checkouts are always
	/// read-only regardless of the underlying archive's `writable` bit).
	fn is_read_only(&self) -> bool {
		false
	}
}

/// A scoped view of the real OS filesystem rooted at `root`, used for
/// folder bindings and as the backing store for preview checkouts. Every
/// path is joined against `root` and never escapes it — callers never see
/// a raw absolute-path API, per Design Notes §9.
pub struct ScopedLocalFs {
	root: std::path::PathBuf,
}

impl ScopedLocalFs {
	pub fn new(root: std::path::PathBuf) -> Self {
		ScopedLocalFs { root }
	}

	fn resolve(&self, path: &str) -> Result<std::path::PathBuf, ArchiveError> {
		let relative = path.trim_start_matches('/');
		let relative = Path::new(relative);
		if relative.components().any(|c| matches!(c, std::path::Component::ParentDir)) {
			return Err(ArchiveError::InvalidPath { path: path.to_string() });
		}
		Ok(self.root.join(relative))
	}
}

#[async_trait]
impl ArchiveFs for ScopedLocalFs {
	async fn stat(&self, path: &str) -> Result<Stat, ArchiveError> {
		let full = self.resolve(path)?;
		let meta = tokio::fs::metadata(&full).await?;
		let mtime_ms = meta
			.modified()
			.ok()
			.and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
			.map(|d| d.as_millis() as u64)
			.unwrap_or(0);
		Ok(Stat { is_directory: meta.is_dir(), size: meta.len(), mtime_ms })
	}

	async fn read_file(&self, path: &str) -> Result<Vec<u8>, ArchiveError> {
		let full = self.resolve(path)?;
		Ok(tokio::fs::read(&full).await?)
	}

	async fn readdir(&self, path: &str) -> Result<Vec<DirEntry>, ArchiveError> {
		let full = self.resolve(path)?;
		let mut entries = Vec::new();
		let mut read_dir = tokio::fs::read_dir(&full).await?;
		while let Some(entry) = read_dir.next_entry().await? {
			let file_type = entry.file_type().await?;
			entries.push(DirEntry {
				name: entry.file_name().to_string_lossy().into_owned(),
				is_directory: file_type.is_dir(),
			});
		}
		Ok(entries)
	}

	async fn write_file(&self, path: &str, contents: &[u8]) -> Result<(), ArchiveError> {
		let full = self.resolve(path)?;
		if let Some(parent) = full.parent() {
			tokio::fs::create_dir_all(parent).await?;
		}
		Ok(tokio::fs::write(&full, contents).await?)
	}

	async fn mkdir(&self, path: &str) -> Result<(), ArchiveError> {
		let full = self.resolve(path)?;
		Ok(tokio::fs::create_dir_all(&full).await?)
	}

	async fn unlink(&self, path: &str) -> Result<(), ArchiveError> {
		let full = self.resolve(path)?;
		Ok(tokio::fs::remove_file(&full).await?)
	}

	async fn rmdir(&self, path: &str) -> Result<(), ArchiveError> {
		let full = self.resolve(path)?;
		Ok(tokio::fs::remove_dir_all(&full).await?)
	}

	async fn read_manifest(&self) -> Result<Manifest, ArchiveError> {
		match self.read_file("/dat.json").await {
			Ok(bytes) => Ok(serde_json::from_slice(&bytes)
				.map_err(|e| ArchiveError::Other { message: e.to_string() })?),
			Err(ArchiveError::Io(std::io::ErrorKind::NotFound, _)) => Ok(Manifest::default()),
			Err(e) => Err(e),
		}
	}

	async fn write_manifest(&self, manifest: &Manifest) -> Result<(), ArchiveError> {
		let json = serde_json::to_vec_pretty(manifest)
			.map_err(|e| ArchiveError::Other { message: e.to_string() })?;
		self.write_file("/dat.json", &json).await
	}

	async fn read_size(&self) -> Result<u64, ArchiveError> {
		Ok(walk_size(&self.root).await)
	}
}

fn walk_size(root: &Path) -> std::pin::Pin<Box<dyn std::future::Future<Output = u64> + Send + '_>> {
	Box::pin(async move {
		let mut total = 0u64;
		let mut stack = vec![root.to_path_buf()];
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

	#[tokio::test]
	async fn scoped_fs_rejects_escaping_paths() {
		let dir = tempfile::tempdir().unwrap();
		let fs = ScopedLocalFs::new(dir.path().to_path_buf());
		let result = fs.stat("../../etc/passwd").await;
		assert!(matches!(result, Err(ArchiveError::InvalidPath { .. })));
	}

	#[tokio::test]
	async fn scoped_fs_roundtrips_manifest() {
		let dir = tempfile::tempdir().unwrap();
		let fs = ScopedLocalFs::new(dir.path().to_path_buf());
		let manifest = Manifest { title: "hello".to_string(), ..Default::default() };
		fs.write_manifest(&manifest).await.unwrap();
		let read_back = fs.read_manifest().await.unwrap();
		assert_eq!(read_back.title, "hello");
	}

	#[tokio::test]
	async fn scoped_fs_defaults_manifest_when_absent() {
		let dir = tempfile::tempdir().unwrap();
		let fs = ScopedLocalFs::new(dir.path().to_path_buf());
		let manifest = fs.read_manifest().await.unwrap();
		assert_eq!(manifest, Manifest::default());
	}
}

// vim: ts=4
