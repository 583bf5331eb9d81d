//! `NameResolver` (§4.7): host→key resolution with a persistent cache.

use crate::error::{ArchiveError, NameResolverError};
use crate::key::Key;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use redb::{ReadableTable, TableDefinition};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const CACHE_TABLE: TableDefinition<&str, &str> = TableDefinition::new("name_cache");

#[async_trait]
pub trait NameResolver: Send + Sync {
	async fn resolve_name(&self, name: &str, ignore_cached_miss: bool)
		-> Result<Key, ArchiveError>;
	async fn flush_cache(&self) -> Result<(), ArchiveError>;
}

struct PersistentCache {
	db: redb::Database,
}

impl PersistentCache {
	fn open(path: &Path) -> Result<Self, ArchiveError> {
		let db = redb::Database::create(path)
			.map_err(|e| ArchiveError::Other { message: e.to_string() })?;
		let write_txn =
			db.begin_write().map_err(|e| ArchiveError::Other { message: e.to_string() })?;
		{
			let _ = write_txn
				.open_table(CACHE_TABLE)
				.map_err(|e| ArchiveError::Other { message: e.to_string() })?;
		}
		write_txn.commit().map_err(|e| ArchiveError::Other { message: e.to_string() })?;
		Ok(PersistentCache { db })
	}

	fn read(&self, name: &str) -> Result<Option<Key>, ArchiveError> {
		let read_txn =
			self.db.begin_read().map_err(|e| ArchiveError::Other { message: e.to_string() })?;
		let table = read_txn
			.open_table(CACHE_TABLE)
			.map_err(|e| ArchiveError::Other { message: e.to_string() })?;
		match table.get(name).map_err(|e| ArchiveError::Other { message: e.to_string() })? {
			Some(v) => Ok(Some(Key::from_hex(v.value())?)),
			None => Ok(None),
		}
	}

	fn write(&self, name: &str, key: Key) -> Result<(), ArchiveError> {
		let write_txn =
			self.db.begin_write().map_err(|e| ArchiveError::Other { message: e.to_string() })?;
		{
			let mut table = write_txn
				.open_table(CACHE_TABLE)
				.map_err(|e| ArchiveError::Other { message: e.to_string() })?;
			table
				.insert(name, key.to_hex().as_str())
				.map_err(|e| ArchiveError::Other { message: e.to_string() })?;
		}
		write_txn.commit().map_err(|e| ArchiveError::Other { message: e.to_string() })?;
		Ok(())
	}

	fn clear(&self) -> Result<(), ArchiveError> {
		let write_txn =
			self.db.begin_write().map_err(|e| ArchiveError::Other { message: e.to_string() })?;
		{
			let mut table = write_txn
				.open_table(CACHE_TABLE)
				.map_err(|e| ArchiveError::Other { message: e.to_string() })?;
			let keys: Vec<String> = table
				.iter()
				.map_err(|e| ArchiveError::Other { message: e.to_string() })?
				.filter_map(|r| r.ok())
				.map(|(k, _)| k.value().to_string())
				.collect();
			for k in keys {
				table.remove(k.as_str()).map_err(|e| ArchiveError::Other { message: e.to_string() })?;
			}
		}
		write_txn.commit().map_err(|e| ArchiveError::Other { message: e.to_string() })?;
		Ok(())
	}
}

/// DNS-over-HTTPS trait for the actual network round trip, injectable so
/// tests substitute a fixed provider without reaching the network.
#[async_trait]
pub trait DohProvider: Send + Sync {
	async fn resolve(&self, provider_url: &str, name: &str) -> Result<Option<Key>, ArchiveError>;
}

#[derive(Deserialize)]
struct DohAnswer {
	#[serde(rename = "Answer")]
	answer: Option<Vec<DohRecord>>,
}

#[derive(Deserialize)]
struct DohRecord {
	data: String,
}

pub struct ReqwestDohProvider {
	client: reqwest::Client,
	timeout: Duration,
}

impl ReqwestDohProvider {
	pub fn new(timeout: Duration) -> Self {
		ReqwestDohProvider { client: reqwest::Client::new(), timeout }
	}
}

#[async_trait]
impl DohProvider for ReqwestDohProvider {
	async fn resolve(&self, provider_url: &str, name: &str) -> Result<Option<Key>, ArchiveError> {
		let response = self
			.client
			.get(provider_url)
			.query(&[("name", name), ("type", "TXT")])
			.header("accept", "application/dns-json")
			.timeout(self.timeout)
			.send()
			.await
			.map_err(|e| ArchiveError::Other { message: e.to_string() })?;

		let parsed: DohAnswer = response
			.json()
			.await
			.map_err(|e| ArchiveError::Other { message: e.to_string() })?;

		let Some(answers) = parsed.answer else { return Ok(None) };
		for record in answers {
			let cleaned = record.data.trim_matches('"');
			if let Ok(key) = Key::from_hex(cleaned) {
				return Ok(Some(key));
			}
		}
		Ok(None)
	}
}

pub struct DohNameResolver {
	providers: Vec<String>,
	doh: Box<dyn DohProvider>,
	cache: PersistentCache,
}

impl DohNameResolver {
	pub fn new(
		providers: Vec<String>,
		doh: Box<dyn DohProvider>,
		cache_path: &Path,
	) -> Result<Self, ArchiveError> {
		Ok(DohNameResolver { providers, doh, cache: PersistentCache::open(cache_path)? })
	}

	fn is_hash(name: &str) -> bool {
		name.len() == 64 && name.bytes().all(|b| b.is_ascii_hexdigit())
	}
}

#[async_trait]
impl NameResolver for DohNameResolver {
	async fn resolve_name(
		&self,
		name: &str,
		ignore_cached_miss: bool,
	) -> Result<Key, ArchiveError> {
		if Self::is_hash(name) {
			return Key::from_hex(name);
		}

		if !ignore_cached_miss {
			if let Some(key) = self.cache.read(name)? {
				return Ok(key);
			}
		}

		let mut order: Vec<&String> = self.providers.iter().collect();
		order.shuffle(&mut rand::thread_rng());

		for provider in order {
			if let Ok(Some(key)) = self.doh.resolve(provider, name).await {
				self.cache.write(name, key)?;
				return Ok(key);
			}
		}

		Err(ArchiveError::NameResolver(NameResolverError::AllProvidersFailed {
			name: name.to_string(),
		}))
	}

	async fn flush_cache(&self) -> Result<(), ArchiveError> {
		self.cache.clear()
	}
}


// vim: ts=4
