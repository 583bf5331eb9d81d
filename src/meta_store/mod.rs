//! The `MetaStore` interface (§6): typed operations over the external
//! metadata database. The production store is SQLite-backed and external
//! per spec's Non-goals; `redb_store` is the concrete, embeddable adapter
//! used by the runtime and by tests.

mod redb_store;

pub use redb_store::RedbMetaStore;

use crate::error::ArchiveError;
use crate::key::Key;
use crate::types::{ArchiveMeta, CrawlCheckpoint, CrawlSource, UserSettings};
use async_trait::async_trait;
use std::collections::HashMap;

#[async_trait]
pub trait MetaStore: Send + Sync {
	async fn query(&self) -> Result<Vec<ArchiveMeta>, ArchiveError>;
	async fn set_user_settings(&self, key: Key, settings: UserSettings) -> Result<(), ArchiveError>;
	async fn get_user_settings(&self, key: Key) -> Result<Option<UserSettings>, ArchiveError>;
	async fn get_meta(&self, key: Key) -> Result<Option<ArchiveMeta>, ArchiveError>;
	async fn set_meta(&self, meta: ArchiveMeta) -> Result<(), ArchiveError>;
	async fn touch(&self, key: Key, now_ms: u64) -> Result<(), ArchiveError>;
	async fn delete_archive(&self, key: Key) -> Result<(), ArchiveError>;
	async fn list_expired_archives(&self, now_ms: u64) -> Result<Vec<Key>, ArchiveError>;
	async fn list_garbage_collectable_archives(
		&self,
		unused_before_ms: u64,
	) -> Result<Vec<Key>, ArchiveError>;

	async fn get_setting(&self, name: &str) -> Result<Option<String>, ArchiveError>;
	async fn set_setting(&self, name: &str, value: String) -> Result<(), ArchiveError>;
	async fn get_all_settings(&self) -> Result<HashMap<String, String>, ArchiveError>;

	async fn get_crawl_source(&self, url: &str) -> Result<Option<CrawlSource>, ArchiveError>;
	async fn upsert_crawl_source(&self, source: CrawlSource) -> Result<(), ArchiveError>;
	async fn get_checkpoint(
		&self,
		source_id: &str,
		dataset: &str,
	) -> Result<Option<CrawlCheckpoint>, ArchiveError>;
	async fn set_checkpoint(
		&self,
		source_id: &str,
		dataset: &str,
		checkpoint: CrawlCheckpoint,
	) -> Result<(), ArchiveError>;
	async fn delete_dataset_rows(&self, source_id: &str, dataset: &str) -> Result<(), ArchiveError>;
	async fn upsert_dataset_row(
		&self,
		source_id: &str,
		dataset: &str,
		pathname: &str,
		value: serde_json::Value,
	) -> Result<(), ArchiveError>;
	async fn delete_dataset_row(
		&self,
		source_id: &str,
		dataset: &str,
		pathname: &str,
	) -> Result<(), ArchiveError>;
	async fn list_dataset_rows(
		&self,
		source_id: &str,
		dataset: &str,
	) -> Result<Vec<(String, serde_json::Value)>, ArchiveError>;
}

// vim: ts=4
