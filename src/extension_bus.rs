//! ExtensionBus (§4.4): per-archive ephemeral messaging and small
//! session-scoped key/value data for peer-connected extensions.

use crate::error::ArchiveError;
use crate::key::Key;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::broadcast;

/// Session-data values are capped at 256 bytes (§4.4).
pub const SESSION_DATA_CAP_BYTES: usize = 256;

#[derive(Debug, Clone)]
pub enum ExtensionEvent {
	PeerConnected { peer_id: String },
	PeerDisconnected { peer_id: String },
	Message { peer_id: String, payload: Vec<u8> },
	SessionDataChanged { peer_id: String, key: String },
}

struct ArchiveBus {
	sender: broadcast::Sender<ExtensionEvent>,
	session_data: StdMutex<HashMap<(String, String), Vec<u8>>>,
}

pub struct ExtensionBus {
	buses: StdMutex<HashMap<String, Arc<ArchiveBus>>>,
}

impl Default for ExtensionBus {
	fn default() -> Self {
		Self::new()
	}
}

impl ExtensionBus {
	pub fn new() -> Self {
		ExtensionBus { buses: StdMutex::new(HashMap::new()) }
	}

	fn bus_for(&self, key: Key) -> Arc<ArchiveBus> {
		let mut buses = self.buses.lock().unwrap();
		buses
			.entry(key.to_hex())
			.or_insert_with(|| {
				let (sender, _) = broadcast::channel(256);
				Arc::new(ArchiveBus { sender, session_data: StdMutex::new(HashMap::new()) })
			})
			.clone()
	}

	pub fn subscribe(&self, key: Key) -> broadcast::Receiver<ExtensionEvent> {
		self.bus_for(key).sender.subscribe()
	}

	pub fn peer_connected(&self, key: Key, peer_id: &str) {
		let _ = self.bus_for(key).sender.send(ExtensionEvent::PeerConnected { peer_id: peer_id.to_string() });
	}

	pub fn peer_disconnected(&self, key: Key, peer_id: &str) {
		let bus = self.bus_for(key);
		let _ = bus.sender.send(ExtensionEvent::PeerDisconnected { peer_id: peer_id.to_string() });
		bus.session_data.lock().unwrap().retain(|(p, _), _| p != peer_id);
	}

	/// Ephemeral message to all peers on this archive's extension channel;
	/// never persisted.
	pub fn send_message(&self, key: Key, peer_id: &str, payload: Vec<u8>) {
		let _ = self
			.bus_for(key)
			.sender
			.send(ExtensionEvent::Message { peer_id: peer_id.to_string(), payload });
	}

	/// Set a small, session-scoped key/value pair, capped at
	/// `SESSION_DATA_CAP_BYTES`.
	pub fn set_session_data(
		&self,
		key: Key,
		peer_id: &str,
		data_key: &str,
		value: Vec<u8>,
	) -> Result<(), ArchiveError> {
		if value.len() > SESSION_DATA_CAP_BYTES {
			return Err(ArchiveError::QuotaExceeded {
				message: format!(
					"session data value is {} bytes, exceeds {} byte cap",
					value.len(),
					SESSION_DATA_CAP_BYTES
				),
			});
		}
		let bus = self.bus_for(key);
		bus.session_data.lock().unwrap().insert((peer_id.to_string(), data_key.to_string()), value);
		let _ = bus.sender.send(ExtensionEvent::SessionDataChanged {
			peer_id: peer_id.to_string(),
			key: data_key.to_string(),
		});
		Ok(())
	}

	pub fn get_session_data(&self, key: Key, peer_id: &str, data_key: &str) -> Option<Vec<u8>> {
		self.bus_for(key).session_data.lock().unwrap().get(&(peer_id.to_string(), data_key.to_string())).cloned()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::key::KeyPair;

	fn test_key() -> Key {
		KeyPair::generate().public_key()
	}

	#[test]
	fn session_data_rejects_oversized_values() {
		let bus = ExtensionBus::new();
		let key = test_key();
		let too_big = vec![0u8; SESSION_DATA_CAP_BYTES + 1];
		let result = bus.set_session_data(key, "peer1", "nickname", too_big);
		assert!(matches!(result, Err(ArchiveError::QuotaExceeded { .. })));
	}

	#[test]
	fn session_data_roundtrips_within_cap() {
		let bus = ExtensionBus::new();
		let key = test_key();
		bus.set_session_data(key, "peer1", "nickname", b"alice".to_vec()).unwrap();
		assert_eq!(bus.get_session_data(key, "peer1", "nickname"), Some(b"alice".to_vec()));
	}

	#[test]
	fn disconnect_clears_that_peers_session_data() {
		let bus = ExtensionBus::new();
		let key = test_key();
		bus.set_session_data(key, "peer1", "k", b"v".to_vec()).unwrap();
		bus.set_session_data(key, "peer2", "k", b"v2".to_vec()).unwrap();
		bus.peer_disconnected(key, "peer1");
		assert_eq!(bus.get_session_data(key, "peer1", "k"), None);
		assert_eq!(bus.get_session_data(key, "peer2", "k"), Some(b"v2".to_vec()));
	}

	#[tokio::test]
	async fn subscribers_receive_messages() {
		let bus = ExtensionBus::new();
		let key = test_key();
		let mut rx = bus.subscribe(key);
		bus.send_message(key, "peer1", b"hi".to_vec());
		let event = rx.recv().await.unwrap();
		assert!(matches!(event, ExtensionEvent::Message { peer_id, payload } if peer_id == "peer1" && payload == b"hi"));
	}
}

// vim: ts=4
