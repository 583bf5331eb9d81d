//! Crawler & Indexers (§4.6): per-archive change feed fanned out to the
//! dataset indexers, with resumable per-dataset checkpoints and a debounced
//! file-system-style watcher.

mod indexers;

pub use indexers::{default_indexers, DatasetIndexer};

use crate::archive_log::{ArchiveLog, LogOp};
use crate::capabilities::ArchiveFs;
use crate::error::{ArchiveError, CrawlError};
use crate::key::ArchiveUrl;
use crate::locks::{names, NamedLocks};
use crate::meta_store::MetaStore;
use crate::name_resolver::NameResolver;
use crate::types::CrawlCheckpoint;
use crate::types::CrawlSource;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;

struct WatchHandle {
	tx: mpsc::UnboundedSender<()>,
	task: JoinHandle<()>,
}

pub struct Crawler {
	meta_store: Arc<dyn MetaStore>,
	name_resolver: Arc<dyn NameResolver>,
	locks: Arc<NamedLocks>,
	indexers: Vec<Box<dyn DatasetIndexer>>,
	debounce: Duration,
	watches: StdMutex<HashMap<String, WatchHandle>>,
}

impl Crawler {
	pub fn new(
		meta_store: Arc<dyn MetaStore>,
		name_resolver: Arc<dyn NameResolver>,
		locks: Arc<NamedLocks>,
		debounce: Duration,
	) -> Self {
		Crawler {
			meta_store,
			name_resolver,
			locks,
			indexers: default_indexers(),
			debounce,
			watches: StdMutex::new(HashMap::new()),
		}
	}

	/// One full crawl pass over `url`, per §4.6's five-step procedure.
	/// `is_local_root` marks the archive as the locally-hosted root, which
	/// makes its CrawlSource row `isPrivate`.
	pub async fn crawl_site(
		&self,
		url: &str,
		fs: &dyn ArchiveFs,
		log: &ArchiveLog,
		is_local_root: bool,
	) -> Result<(), ArchiveError> {
		let _guard = self.locks.acquire(&names::crawl(url)).await;

		let source = self.ensure_crawl_source(url, is_local_root).await?;
		let current_binding = self.resolve_current_binding(url).await?;
		let global_reset_required = match (&current_binding, &source.dns_binding_id) {
			(Some(current), Some(stored)) => current != stored,
			_ => false,
		};
		let current_version = log.latest_version();

		let results = futures::future::join_all(
			self.indexers
				.iter()
				.map(|indexer| self.run_indexer(indexer.as_ref(), &source, log, current_version, global_reset_required, fs)),
		)
		.await;
		for result in results {
			if let Err(e) = result {
				warn!(url, error = %e, "crawl pass aborted for one indexer");
			}
		}

		if let Some(current) = current_binding {
			if source.dns_binding_id.as_deref() != Some(current.as_str()) {
				self.meta_store
					.upsert_crawl_source(CrawlSource { dns_binding_id: Some(current), ..source })
					.await?;
			}
		}

		Ok(())
	}

	async fn ensure_crawl_source(&self, url: &str, is_local_root: bool) -> Result<CrawlSource, ArchiveError> {
		if let Some(existing) = self.meta_store.get_crawl_source(url).await? {
			return Ok(existing);
		}
		let source = CrawlSource {
			id: Uuid::new_v4().to_string(),
			url: url.to_string(),
			dns_binding_id: None,
			is_private: is_local_root,
		};
		self.meta_store.upsert_crawl_source(source.clone()).await?;
		Ok(source)
	}

	/// The key the host currently resolves to, or `None` when resolution
	/// fails (a resolution failure never forces a reset — only an observed
	/// *change* does).
	async fn resolve_current_binding(&self, url: &str) -> Result<Option<String>, ArchiveError> {
		let parsed = ArchiveUrl::parse(url)?;
		if parsed.host_is_hash() {
			return Ok(Some(parsed.host));
		}
		match self.name_resolver.resolve_name(&parsed.host, true).await {
			Ok(key) => Ok(Some(key.to_hex())),
			Err(_) => Ok(None),
		}
	}

	async fn run_indexer(
		&self,
		indexer: &dyn DatasetIndexer,
		source: &CrawlSource,
		log: &ArchiveLog,
		current_version: u64,
		global_reset_required: bool,
		fs: &dyn ArchiveFs,
	) -> Result<(), ArchiveError> {
		let dataset = indexer.dataset();
		let stored = self.meta_store.get_checkpoint(&source.id, dataset).await?;
		let reset_required = global_reset_required
			|| stored.map(|cp| cp.needs_reset(indexer.table_version())).unwrap_or(false);

		let mut checkpoint = if reset_required {
			self.meta_store.delete_dataset_rows(&source.id, dataset).await?;
			CrawlCheckpoint::fresh(indexer.table_version())
		} else {
			stored.unwrap_or_else(|| CrawlCheckpoint::fresh(indexer.table_version()))
		};

		let changes: Vec<_> =
			log.entries_since(checkpoint.last_seen_version).into_iter().filter(|e| indexer.path_matches(&e.path)).collect();
		let _ = current_version;

		for change in changes {
			match &change.op {
				LogOp::Delete => {
					self.meta_store.delete_dataset_row(&source.id, dataset, &change.path).await?;
				}
				LogOp::Put(_) => match fs.read_file(&change.path).await {
					Err(e) => {
						warn!(path = %change.path, dataset, error = %e, "indexer read failed, aborting pass");
						return Err(ArchiveError::Crawl(CrawlError::ReadFailed {
							path: change.path.clone(),
							message: e.to_string(),
						}));
					}
					Ok(bytes) => match serde_json::from_slice::<serde_json::Value>(&bytes) {
						Ok(value) if indexer.validate(&value) => {
							let normalized = indexer.normalize(&change.path, value);
							self.meta_store.upsert_dataset_row(&source.id, dataset, &change.path, normalized).await?;
						}
						Ok(_) => warn!(path = %change.path, dataset, "schema validation failed, skipping file"),
						Err(e) => warn!(path = %change.path, dataset, error = %e, "json parse failed, skipping file"),
					},
				},
			}
			checkpoint.last_seen_version = change.version;
			self.meta_store.set_checkpoint(&source.id, dataset, checkpoint).await?;
		}

		Ok(())
	}

	/// Install a debounced change listener: the first signal after a quiet
	/// period arms a `crawl_site` call once `debounce` has elapsed with no
	/// further signals. Idempotent — a second `watch_site` for the same url
	/// is a no-op.
	pub fn watch_site(
		self: &Arc<Self>,
		url: String,
		fs: Arc<dyn ArchiveFs>,
		log: Arc<ArchiveLog>,
		is_local_root: bool,
	) {
		let mut watches = self.watches.lock().unwrap();
		if watches.contains_key(&url) {
			return;
		}
		let (tx, mut rx) = mpsc::unbounded_channel();
		let crawler = Arc::clone(self);
		let debounce = self.debounce;
		let watched_url = url.clone();
		let task = tokio::spawn(async move {
			while rx.recv().await.is_some() {
				loop {
					match tokio::time::timeout(debounce, rx.recv()).await {
						Ok(Some(())) => continue,
						Ok(None) => return,
						Err(_elapsed) => break,
					}
				}
				if let Err(e) = crawler.crawl_site(&watched_url, fs.as_ref(), &log, is_local_root).await {
					warn!(url = %watched_url, error = %e, "debounced crawl pass failed");
				}
			}
		});
		watches.insert(url, WatchHandle { tx, task });
	}

	pub fn unwatch_site(&self, url: &str) {
		if let Some(handle) = self.watches.lock().unwrap().remove(url) {
			handle.task.abort();
		}
	}

	/// Feeds the debounce timer for an already-watched site; a no-op if
	/// nothing is watching `url`.
	pub fn notify_change(&self, url: &str) {
		if let Some(handle) = self.watches.lock().unwrap().get(url) {
			let _ = handle.tx.send(());
		}
	}

	pub fn is_watching(&self, url: &str) -> bool {
		self.watches.lock().unwrap().contains_key(url)
	}
}


// vim: ts=4
