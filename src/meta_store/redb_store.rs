//! `redb`-backed `MetaStore` adapter, grounded on the teacher's
//! `ChildCache` (table-per-concern, `TableDefinition`, one `Database` per
//! store). Values are richer than raw chunk bytes here, so entries are
//! JSON-encoded rather than bincode.

use super::MetaStore;
use crate::error::{ArchiveError, MetaStoreError};
use crate::key::Key;
use crate::types::{ArchiveMeta, CrawlCheckpoint, CrawlSource, UserSettings};
use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};
use std::collections::HashMap;
use std::path::Path;

const ARCHIVE_META: TableDefinition<&str, &str> = TableDefinition::new("archive_meta");
const USER_SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("user_settings");
const SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings");
const CRAWL_SOURCES: TableDefinition<&str, &str> = TableDefinition::new("crawl_sources");
const CHECKPOINTS: TableDefinition<&str, &str> = TableDefinition::new("checkpoints");
const DATASET_ROWS: TableDefinition<&str, &str> = TableDefinition::new("dataset_rows");

pub struct RedbMetaStore {
	db: Database,
}

fn backend_err(e: impl std::fmt::Display) -> ArchiveError {
	ArchiveError::MetaStore(MetaStoreError::Backend { message: e.to_string() })
}

fn checkpoint_key(source_id: &str, dataset: &str) -> String {
	format!("{}\0{}", source_id, dataset)
}

fn row_key(source_id: &str, dataset: &str, pathname: &str) -> String {
	format!("{}\0{}\0{}", source_id, dataset, pathname)
}

fn row_prefix(source_id: &str, dataset: &str) -> String {
	format!("{}\0{}\0", source_id, dataset)
}

impl RedbMetaStore {
	pub fn open(path: &Path) -> Result<Self, ArchiveError> {
		let db = Database::create(path).map_err(backend_err)?;
		let write_txn = db.begin_write().map_err(backend_err)?;
		{
			let _ = write_txn.open_table(ARCHIVE_META).map_err(backend_err)?;
			let _ = write_txn.open_table(USER_SETTINGS).map_err(backend_err)?;
			let _ = write_txn.open_table(SETTINGS).map_err(backend_err)?;
			let _ = write_txn.open_table(CRAWL_SOURCES).map_err(backend_err)?;
			let _ = write_txn.open_table(CHECKPOINTS).map_err(backend_err)?;
			let _ = write_txn.open_table(DATASET_ROWS).map_err(backend_err)?;
		}
		write_txn.commit().map_err(backend_err)?;
		Ok(RedbMetaStore { db })
	}
}

#[async_trait]
impl MetaStore for RedbMetaStore {
	async fn query(&self) -> Result<Vec<ArchiveMeta>, ArchiveError> {
		let read_txn = self.db.begin_read().map_err(backend_err)?;
		let table = read_txn.open_table(ARCHIVE_META).map_err(backend_err)?;
		let mut out = Vec::new();
		for entry in table.iter().map_err(backend_err)? {
			let (_, value) = entry.map_err(backend_err)?;
			out.push(serde_json::from_str(value.value()).map_err(backend_err)?);
		}
		Ok(out)
	}

	async fn set_user_settings(&self, key: Key, settings: UserSettings) -> Result<(), ArchiveError> {
		let json = serde_json::to_string(&settings).map_err(backend_err)?;
		let write_txn = self.db.begin_write().map_err(backend_err)?;
		{
			let mut table = write_txn.open_table(USER_SETTINGS).map_err(backend_err)?;
			table.insert(key.to_hex().as_str(), json.as_str()).map_err(backend_err)?;
		}
		write_txn.commit().map_err(backend_err)?;
		Ok(())
	}

	async fn get_user_settings(&self, key: Key) -> Result<Option<UserSettings>, ArchiveError> {
		let read_txn = self.db.begin_read().map_err(backend_err)?;
		let table = read_txn.open_table(USER_SETTINGS).map_err(backend_err)?;
		match table.get(key.to_hex().as_str()).map_err(backend_err)? {
			Some(v) => Ok(Some(serde_json::from_str(v.value()).map_err(backend_err)?)),
			None => Ok(None),
		}
	}

	async fn get_meta(&self, key: Key) -> Result<Option<ArchiveMeta>, ArchiveError> {
		let read_txn = self.db.begin_read().map_err(backend_err)?;
		let table = read_txn.open_table(ARCHIVE_META).map_err(backend_err)?;
		match table.get(key.to_hex().as_str()).map_err(backend_err)? {
			Some(v) => Ok(Some(serde_json::from_str(v.value()).map_err(backend_err)?)),
			None => Ok(None),
		}
	}

	async fn set_meta(&self, meta: ArchiveMeta) -> Result<(), ArchiveError> {
		let json = serde_json::to_string(&meta).map_err(backend_err)?;
		let write_txn = self.db.begin_write().map_err(backend_err)?;
		{
			let mut table = write_txn.open_table(ARCHIVE_META).map_err(backend_err)?;
			table.insert(meta.key.as_str(), json.as_str()).map_err(backend_err)?;
		}
		write_txn.commit().map_err(backend_err)?;
		Ok(())
	}

	async fn touch(&self, key: Key, now_ms: u64) -> Result<(), ArchiveError> {
		let mut meta = self.get_meta(key).await?.ok_or_else(|| {
			ArchiveError::MetaStore(MetaStoreError::NotFound { key: key.to_hex() })
		})?;
		meta.last_access_time = now_ms;
		self.set_meta(meta).await
	}

	async fn delete_archive(&self, key: Key) -> Result<(), ArchiveError> {
		let write_txn = self.db.begin_write().map_err(backend_err)?;
		{
			let mut meta_table = write_txn.open_table(ARCHIVE_META).map_err(backend_err)?;
			meta_table.remove(key.to_hex().as_str()).map_err(backend_err)?;
			let mut settings_table = write_txn.open_table(USER_SETTINGS).map_err(backend_err)?;
			settings_table.remove(key.to_hex().as_str()).map_err(backend_err)?;
		}
		write_txn.commit().map_err(backend_err)?;
		Ok(())
	}

	async fn list_expired_archives(&self, now_ms: u64) -> Result<Vec<Key>, ArchiveError> {
		let read_txn = self.db.begin_read().map_err(backend_err)?;
		let table = read_txn.open_table(USER_SETTINGS).map_err(backend_err)?;
		let mut out = Vec::new();
		for entry in table.iter().map_err(backend_err)? {
			let (k, v) = entry.map_err(backend_err)?;
			let settings: UserSettings = serde_json::from_str(v.value()).map_err(backend_err)?;
			if settings.expires_at > 0 && settings.expires_at < now_ms {
				out.push(Key::from_hex(k.value())?);
			}
		}
		Ok(out)
	}

	async fn list_garbage_collectable_archives(
		&self,
		unused_before_ms: u64,
	) -> Result<Vec<Key>, ArchiveError> {
		let read_txn = self.db.begin_read().map_err(backend_err)?;
		let settings_table = read_txn.open_table(USER_SETTINGS).map_err(backend_err)?;
		let meta_table = read_txn.open_table(ARCHIVE_META).map_err(backend_err)?;
		let mut out = Vec::new();
		for entry in settings_table.iter().map_err(backend_err)? {
			let (k, v) = entry.map_err(backend_err)?;
			let settings: UserSettings = serde_json::from_str(v.value()).map_err(backend_err)?;
			if settings.is_saved {
				continue;
			}
			let Some(meta_bytes) = meta_table.get(k.value()).map_err(backend_err)? else { continue };
			let meta: ArchiveMeta = serde_json::from_str(meta_bytes.value()).map_err(backend_err)?;
			if meta.last_access_time < unused_before_ms {
				out.push(Key::from_hex(k.value())?);
			}
		}
		Ok(out)
	}

	async fn get_setting(&self, name: &str) -> Result<Option<String>, ArchiveError> {
		let read_txn = self.db.begin_read().map_err(backend_err)?;
		let table = read_txn.open_table(SETTINGS).map_err(backend_err)?;
		Ok(table.get(name).map_err(backend_err)?.map(|v| v.value().to_string()))
	}

	async fn set_setting(&self, name: &str, value: String) -> Result<(), ArchiveError> {
		let write_txn = self.db.begin_write().map_err(backend_err)?;
		{
			let mut table = write_txn.open_table(SETTINGS).map_err(backend_err)?;
			table.insert(name, value.as_str()).map_err(backend_err)?;
		}
		write_txn.commit().map_err(backend_err)?;
		Ok(())
	}

	async fn get_all_settings(&self) -> Result<HashMap<String, String>, ArchiveError> {
		let read_txn = self.db.begin_read().map_err(backend_err)?;
		let table = read_txn.open_table(SETTINGS).map_err(backend_err)?;
		let mut out = HashMap::new();
		for entry in table.iter().map_err(backend_err)? {
			let (k, v) = entry.map_err(backend_err)?;
			out.insert(k.value().to_string(), v.value().to_string());
		}
		Ok(out)
	}

	async fn get_crawl_source(&self, url: &str) -> Result<Option<CrawlSource>, ArchiveError> {
		let read_txn = self.db.begin_read().map_err(backend_err)?;
		let table = read_txn.open_table(CRAWL_SOURCES).map_err(backend_err)?;
		match table.get(url).map_err(backend_err)? {
			Some(v) => Ok(Some(serde_json::from_str(v.value()).map_err(backend_err)?)),
			None => Ok(None),
		}
	}

	async fn upsert_crawl_source(&self, source: CrawlSource) -> Result<(), ArchiveError> {
		let json = serde_json::to_string(&source).map_err(backend_err)?;
		let write_txn = self.db.begin_write().map_err(backend_err)?;
		{
			let mut table = write_txn.open_table(CRAWL_SOURCES).map_err(backend_err)?;
			table.insert(source.url.as_str(), json.as_str()).map_err(backend_err)?;
		}
		write_txn.commit().map_err(backend_err)?;
		Ok(())
	}

	async fn get_checkpoint(
		&self,
		source_id: &str,
		dataset: &str,
	) -> Result<Option<CrawlCheckpoint>, ArchiveError> {
		let read_txn = self.db.begin_read().map_err(backend_err)?;
		let table = read_txn.open_table(CHECKPOINTS).map_err(backend_err)?;
		let key = checkpoint_key(source_id, dataset);
		match table.get(key.as_str()).map_err(backend_err)? {
			Some(v) => Ok(Some(serde_json::from_str(v.value()).map_err(backend_err)?)),
			None => Ok(None),
		}
	}

	async fn set_checkpoint(
		&self,
		source_id: &str,
		dataset: &str,
		checkpoint: CrawlCheckpoint,
	) -> Result<(), ArchiveError> {
		let json = serde_json::to_string(&checkpoint).map_err(backend_err)?;
		let key = checkpoint_key(source_id, dataset);
		let write_txn = self.db.begin_write().map_err(backend_err)?;
		{
			let mut table = write_txn.open_table(CHECKPOINTS).map_err(backend_err)?;
			table.insert(key.as_str(), json.as_str()).map_err(backend_err)?;
		}
		write_txn.commit().map_err(backend_err)?;
		Ok(())
	}

	async fn delete_dataset_rows(&self, source_id: &str, dataset: &str) -> Result<(), ArchiveError> {
		let prefix = row_prefix(source_id, dataset);
		let write_txn = self.db.begin_write().map_err(backend_err)?;
		{
			let mut table = write_txn.open_table(DATASET_ROWS).map_err(backend_err)?;
			let keys: Vec<String> = table
				.range(prefix.as_str()..)
				.map_err(backend_err)?
				.filter_map(|r| r.ok())
				.map(|(k, _)| k.value().to_string())
				.take_while(|k| k.starts_with(&prefix))
				.collect();
			for k in keys {
				table.remove(k.as_str()).map_err(backend_err)?;
			}
		}
		write_txn.commit().map_err(backend_err)?;
		Ok(())
	}

	async fn upsert_dataset_row(
		&self,
		source_id: &str,
		dataset: &str,
		pathname: &str,
		value: serde_json::Value,
	) -> Result<(), ArchiveError> {
		let json = serde_json::to_string(&value).map_err(backend_err)?;
		let key = row_key(source_id, dataset, pathname);
		let write_txn = self.db.begin_write().map_err(backend_err)?;
		{
			let mut table = write_txn.open_table(DATASET_ROWS).map_err(backend_err)?;
			table.insert(key.as_str(), json.as_str()).map_err(backend_err)?;
		}
		write_txn.commit().map_err(backend_err)?;
		Ok(())
	}

	async fn delete_dataset_row(
		&self,
		source_id: &str,
		dataset: &str,
		pathname: &str,
	) -> Result<(), ArchiveError> {
		let key = row_key(source_id, dataset, pathname);
		let write_txn = self.db.begin_write().map_err(backend_err)?;
		{
			let mut table = write_txn.open_table(DATASET_ROWS).map_err(backend_err)?;
			table.remove(key.as_str()).map_err(backend_err)?;
		}
		write_txn.commit().map_err(backend_err)?;
		Ok(())
	}

	async fn list_dataset_rows(
		&self,
		source_id: &str,
		dataset: &str,
	) -> Result<Vec<(String, serde_json::Value)>, ArchiveError> {
		let prefix = row_prefix(source_id, dataset);
		let read_txn = self.db.begin_read().map_err(backend_err)?;
		let table = read_txn.open_table(DATASET_ROWS).map_err(backend_err)?;
		let mut out = Vec::new();
		for entry in table.range(prefix.as_str()..).map_err(backend_err)? {
			let (k, v) = entry.map_err(backend_err)?;
			if !k.value().starts_with(&prefix) {
				break;
			}
			let pathname = k.value().rsplit('\0').next().unwrap_or_default().to_string();
			out.push((pathname, serde_json::from_str(v.value()).map_err(backend_err)?));
		}
		Ok(out)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::key::KeyPair;

	#[tokio::test]
	async fn user_settings_roundtrip() {
		let dir = tempfile::tempdir().unwrap();
		let store = RedbMetaStore::open(&dir.path().join("meta.redb")).unwrap();
		let key = KeyPair::generate().public_key();
		let settings = UserSettings { is_saved: true, ..Default::default() };
		store.set_user_settings(key, settings.clone()).await.unwrap();
		let read_back = store.get_user_settings(key).await.unwrap().unwrap();
		assert!(read_back.is_saved);
	}

	#[tokio::test]
	async fn expired_archives_are_listed() {
		let dir = tempfile::tempdir().unwrap();
		let store = RedbMetaStore::open(&dir.path().join("meta.redb")).unwrap();
		let key = KeyPair::generate().public_key();
		let settings = UserSettings { expires_at: 100, ..Default::default() };
		store.set_user_settings(key, settings).await.unwrap();
		let expired = store.list_expired_archives(200).await.unwrap();
		assert_eq!(expired, vec![key]);
		let not_yet = store.list_expired_archives(50).await.unwrap();
		assert!(not_yet.is_empty());
	}

	#[tokio::test]
	async fn dataset_rows_scoped_by_prefix() {
		let dir = tempfile::tempdir().unwrap();
		let store = RedbMetaStore::open(&dir.path().join("meta.redb")).unwrap();
		store
			.upsert_dataset_row("src-a", "bookmarks", "/a.json", serde_json::json!({"v": 1}))
			.await
			.unwrap();
		store
			.upsert_dataset_row("src-a", "comments", "/b.json", serde_json::json!({"v": 2}))
			.await
			.unwrap();
		let rows = store.list_dataset_rows("src-a", "bookmarks").await.unwrap();
		assert_eq!(rows.len(), 1);
		assert_eq!(rows[0].0, "/a.json");

		store.delete_dataset_rows("src-a", "bookmarks").await.unwrap();
		assert!(store.list_dataset_rows("src-a", "bookmarks").await.unwrap().is_empty());
		assert_eq!(store.list_dataset_rows("src-a", "comments").await.unwrap().len(), 1);
	}

	#[tokio::test]
	async fn checkpoint_roundtrip() {
		let dir = tempfile::tempdir().unwrap();
		let store = RedbMetaStore::open(&dir.path().join("meta.redb")).unwrap();
		let cp = CrawlCheckpoint { table_version: 3, last_seen_version: 42 };
		store.set_checkpoint("src-a", "bookmarks", cp).await.unwrap();
		let read_back = store.get_checkpoint("src-a", "bookmarks").await.unwrap().unwrap();
		assert_eq!(read_back.last_seen_version, 42);
	}
}

// vim: ts=4
