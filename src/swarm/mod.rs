//! SwarmHub (§4.2): announce/lookup discovery keys, accept inbound
//! streams, create outbound streams, multiplex archives onto a single
//! protocol stream per peer.

mod discovery;
mod streams;
mod throttle;

pub use discovery::{DiscoveryTransport, Listener, LoopbackDiscovery, LoopbackListener};
pub use streams::{StreamPool, StreamSlot};
pub use throttle::TokenBucket;

use crate::error::{ArchiveError, SwarmError};
use crate::key::DiscoveryKey;
use crate::types::Archive;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex as StdMutex};
use tracing::{info, warn};

pub struct SwarmHub {
	discovery: Arc<dyn DiscoveryTransport>,
	listener: Arc<dyn Listener>,
	bound_port: StdMutex<Option<u16>>,
	/// discoveryKey hex -> set of archive key hexes announcing under it.
	by_discovery_key: StdMutex<HashMap<String, HashSet<String>>>,
	archives: StdMutex<HashMap<String, Arc<Archive>>>,
	streams: StdMutex<StreamPool>,
	pub upload: Arc<TokenBucket>,
	pub download: Arc<TokenBucket>,
}

impl SwarmHub {
	pub fn new(discovery: Arc<dyn DiscoveryTransport>, listener: Arc<dyn Listener>) -> Self {
		SwarmHub {
			discovery,
			listener,
			bound_port: StdMutex::new(None),
			by_discovery_key: StdMutex::new(HashMap::new()),
			archives: StdMutex::new(HashMap::new()),
			streams: StdMutex::new(StreamPool::new()),
			upload: Arc::new(TokenBucket::new(None)),
			download: Arc::new(TokenBucket::new(None)),
		}
	}

	/// Bind the listening socket, rebinding once on failure and logging
	/// further failures without propagating them (§4.2 failure semantics).
	pub async fn ensure_listening(&self, preferred_port: u16) -> u16 {
		if let Some(port) = *self.bound_port.lock().unwrap() {
			return port;
		}
		let port = match self.listener.bind(preferred_port).await {
			Ok(p) => p,
			Err(e) => {
				warn!(error = %e, "listener bind failed, rebinding once on an OS-assigned port");
				match self.listener.bind(0).await {
					Ok(p) => p,
					Err(e2) => {
						warn!(error = %e2, "rebind also failed");
						0
					}
				}
			}
		};
		*self.bound_port.lock().unwrap() = Some(port);
		port
	}

	pub fn set_upload_limit(&self, bytes_per_sec: Option<u64>) {
		self.upload.set_rate(bytes_per_sec);
	}

	pub fn set_download_limit(&self, bytes_per_sec: Option<u64>) {
		self.download.set_rate(bytes_per_sec);
	}

	/// `join(archive)` — idempotent.
	#[tracing::instrument(skip(self, archive))]
	pub async fn join(&self, archive: Arc<Archive>) {
		let hex = archive.key.to_hex();
		if archive.is_swarming.swap(true, Ordering::SeqCst) {
			return;
		}
		self.archives.lock().unwrap().insert(hex.clone(), archive.clone());
		self.by_discovery_key
			.lock()
			.unwrap()
			.entry(archive.discovery_key.to_hex())
			.or_default()
			.insert(hex);
		self.discovery.announce(archive.discovery_key).await;
		info!(key = %archive.key, "joined swarm");
	}

	/// `leave(archive)` — destroys all replication streams on this archive.
	#[tracing::instrument(skip(self, archive))]
	pub async fn leave(&self, archive: Arc<Archive>) {
		let hex = archive.key.to_hex();
		archive.is_swarming.store(false, Ordering::SeqCst);
		self.archives.lock().unwrap().remove(&hex);
		if let Some(set) = self.by_discovery_key.lock().unwrap().get_mut(&archive.discovery_key.to_hex())
		{
			set.remove(&hex);
		}
		self.discovery.unannounce(archive.discovery_key).await;

		let handles: Vec<usize> = std::mem::take(&mut archive.stream_handles.lock().unwrap());
		let mut pool = self.streams.lock().unwrap();
		for handle in handles {
			pool.remove(handle);
		}
		info!(key = %archive.key, "left swarm");
	}

	/// Inbound stream arrival (§4.2). Per the resolved open question
	/// (spec.md §9), a stream with no identifiable discovery key is a hard
	/// error — never falls back to "first known topic".
	#[tracing::instrument(skip(self))]
	pub fn handle_inbound_stream(
		&self,
		peer_id: &str,
		discovery_key: Option<DiscoveryKey>,
	) -> Result<Vec<usize>, ArchiveError> {
		let discovery_key = discovery_key.ok_or(SwarmError::MissingTopic)?;
		let dk_hex = discovery_key.to_hex();

		let matching_archives: Vec<(String, Arc<Archive>)> = {
			let by_dk = self.by_discovery_key.lock().unwrap();
			let archives = self.archives.lock().unwrap();
			by_dk
				.get(&dk_hex)
				.into_iter()
				.flatten()
				.filter_map(|hex| archives.get(hex).map(|a| (hex.clone(), a.clone())))
				.collect()
		};

		let mut opened = Vec::new();
		for (hex, archive) in matching_archives {
			let mut pool = self.streams.lock().unwrap();
			if pool.find_for_archive_and_peer(&hex, peer_id).is_some() {
				continue;
			}
			let slot = StreamSlot {
				archive_key_hex: hex,
				peer_id: peer_id.to_string(),
				throttle: throttle::StreamThrottle::new(),
			};
			let index = pool.insert(slot);
			drop(pool);
			archive.stream_handles.lock().unwrap().push(index);
			opened.push(index);
		}
		Ok(opened)
	}

	/// Stream-level error/end/finish/close: remove from tracking, never
	/// surfaced to the Registry (§4.2 failure semantics).
	pub fn close_stream(&self, archive: &Arc<Archive>, index: usize) {
		self.streams.lock().unwrap().remove(index);
		archive.stream_handles.lock().unwrap().retain(|&h| h != index);
	}

	pub fn live_stream_count(&self) -> usize {
		self.streams.lock().unwrap().live_count()
	}
}


// vim: ts=4
