//! Discovery client keyed on discoveryKey (§4.2). The real UDP/TCP
//! transport is external per spec's Non-goals; `LoopbackDiscovery` is the
//! in-process default/test implementation.

use crate::key::DiscoveryKey;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;

#[async_trait]
pub trait DiscoveryTransport: Send + Sync {
	async fn announce(&self, discovery_key: DiscoveryKey);
	async fn unannounce(&self, discovery_key: DiscoveryKey);
	fn is_announced(&self, discovery_key: DiscoveryKey) -> bool;
}

#[derive(Default)]
pub struct LoopbackDiscovery {
	announced: Mutex<HashSet<[u8; 32]>>,
}

impl LoopbackDiscovery {
	pub fn new() -> Self {
		LoopbackDiscovery::default()
	}
}

#[async_trait]
impl DiscoveryTransport for LoopbackDiscovery {
	async fn announce(&self, discovery_key: DiscoveryKey) {
		self.announced.lock().unwrap().insert(discovery_key.0);
	}

	async fn unannounce(&self, discovery_key: DiscoveryKey) {
		self.announced.lock().unwrap().remove(&discovery_key.0);
	}

	fn is_announced(&self, discovery_key: DiscoveryKey) -> bool {
		self.announced.lock().unwrap().contains(&discovery_key.0)
	}
}

/// Binds the listening socket described in §4.2: a well-known port,
/// falling back to an OS-assigned one on bind failure, with a single
/// rebind retry.
#[async_trait]
pub trait Listener: Send + Sync {
	async fn bind(&self, preferred_port: u16) -> Result<u16, crate::error::ArchiveError>;
}

pub struct LoopbackListener;

#[async_trait]
impl Listener for LoopbackListener {
	async fn bind(&self, preferred_port: u16) -> Result<u16, crate::error::ArchiveError> {
		Ok(preferred_port)
	}
}

// vim: ts=4
