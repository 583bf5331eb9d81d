//! `RuntimeContext` (Design Notes §9): the one place every subsystem is
//! constructed and wired together. Replaces "global mutables" with fields
//! owned by one `Arc`, constructed once at process start.

use crate::config::RuntimeConfig;
use crate::crawler::Crawler;
use crate::error::ArchiveError;
use crate::extension_bus::ExtensionBus;
use crate::gc::Gc;
use crate::key::Key;
use crate::locks::NamedLocks;
use crate::meta_store::{MetaStore, RedbMetaStore};
use crate::name_resolver::{DohNameResolver, NameResolver, ReqwestDohProvider};
use crate::registry::{ArchiveSideEffects, Registry};
use crate::swarm::{LoopbackDiscovery, LoopbackListener, SwarmHub};
use crate::sync_engine::SyncEngine;
use crate::types::LocalSyncBinding;
use async_trait::async_trait;
use std::sync::{Arc, Weak};
use tracing::warn;

pub struct RuntimeContext {
	pub config: Arc<RuntimeConfig>,
	pub registry: Arc<Registry>,
	pub swarm: Arc<SwarmHub>,
	pub sync_engine: Arc<SyncEngine>,
	pub extension_bus: Arc<ExtensionBus>,
	pub gc: Arc<Gc>,
	pub crawler: Arc<Crawler>,
	pub meta_store: Arc<dyn MetaStore>,
	pub name_resolver: Arc<dyn NameResolver>,
	pub locks: Arc<NamedLocks>,
}

impl RuntimeContext {
	pub fn new(config: RuntimeConfig) -> Result<Arc<Self>, ArchiveError> {
		std::fs::create_dir_all(&config.dat_path)?;
		let config = Arc::new(config);

		let meta_store: Arc<dyn MetaStore> =
			Arc::new(RedbMetaStore::open(&config.dat_path.join("archives-db.redb"))?);
		let name_resolver: Arc<dyn NameResolver> = Arc::new(DohNameResolver::new(
			config.dns_providers.clone(),
			Box::new(ReqwestDohProvider::new(config.dns_timeout)),
			&config.dat_path.join("name-cache.redb"),
		)?);
		let locks = Arc::new(NamedLocks::new());

		let swarm = Arc::new(SwarmHub::new(Arc::new(LoopbackDiscovery::new()), Arc::new(LoopbackListener)));
		swarm.set_upload_limit(config.upload_bytes_per_sec);
		swarm.set_download_limit(config.download_bytes_per_sec);

		let sync_engine = Arc::new(SyncEngine::new(Arc::clone(&config), Arc::clone(&locks)));
		let crawler =
			Arc::new(Crawler::new(Arc::clone(&meta_store), Arc::clone(&name_resolver), Arc::clone(&locks), config.crawl_debounce));
		let extension_bus = Arc::new(ExtensionBus::new());

		let registry = Arc::new_cyclic(|weak_registry: &Weak<Registry>| {
			let side_effects: Arc<dyn ArchiveSideEffects> = Arc::new(ContextSideEffects {
				registry: weak_registry.clone(),
				swarm: Arc::clone(&swarm),
				sync_engine: Arc::clone(&sync_engine),
			});
			Registry::new(config.as_ref().clone(), Arc::clone(&meta_store), side_effects)
		});

		let gc = Arc::new(Gc::new(Arc::clone(&config), Arc::clone(&meta_store), Arc::clone(&registry)));

		Ok(Arc::new(RuntimeContext {
			config,
			registry,
			swarm,
			sync_engine,
			extension_bus,
			gc,
			crawler,
			meta_store,
			name_resolver,
			locks,
		}))
	}

	/// Starts the long-running background loops (GC timer, listening
	/// socket). Crawl watchers and sync bindings are started per-archive by
	/// `Registry::configure_archive`, not here.
	pub async fn spawn_background_tasks(self: &Arc<Self>) {
		self.swarm.ensure_listening(self.config.swarm_port).await;
		let gc = Arc::clone(&self.gc);
		tokio::spawn(async move { gc.run_forever().await });
	}
}

/// Dispatches `Registry::configure_archive`'s side effects to `SwarmHub`
/// and `SyncEngine`, looking the `Archive`/`ArchiveLog` handles back up
/// through the registry since the trait methods only carry a bare `Key`
/// (Design Notes §9 — no subsystem holds a strong cycle back to another).
struct ContextSideEffects {
	registry: Weak<Registry>,
	swarm: Arc<SwarmHub>,
	sync_engine: Arc<SyncEngine>,
}

#[async_trait]
impl ArchiveSideEffects for ContextSideEffects {
	async fn on_join_swarm(&self, key: Key) {
		let Some(registry) = self.registry.upgrade() else { return };
		let Some(archive) = registry.get_archive(&key.to_hex()) else { return };
		self.swarm.join(archive).await;
	}

	async fn on_leave_swarm(&self, key: Key) {
		let Some(registry) = self.registry.upgrade() else { return };
		let Some(archive) = registry.get_archive(&key.to_hex()) else { return };
		self.swarm.leave(archive).await;
	}

	async fn on_start_autodownload(&self, key: Key) {
		let Some(registry) = self.registry.upgrade() else { return };
		let Some(archive) = registry.get_archive(&key.to_hex()) else { return };
		*archive.autodownloader.lock().unwrap() = Some(());
	}

	async fn on_stop_autodownload(&self, key: Key) {
		let Some(registry) = self.registry.upgrade() else { return };
		let Some(archive) = registry.get_archive(&key.to_hex()) else { return };
		*archive.autodownloader.lock().unwrap() = None;
	}

	async fn on_reconfigure_binding(&self, key: Key, binding: Option<LocalSyncBinding>) {
		let Some(registry) = self.registry.upgrade() else { return };
		let Some(archive) = registry.get_archive(&key.to_hex()) else { return };
		let Some(log) = registry.get_archive_log(key) else { return };
		if let Err(e) = self.sync_engine.configure_binding(archive, log, binding).await {
			warn!(%key, error = %e, "failed to configure sync binding");
		}
	}
}


// vim: ts=4
