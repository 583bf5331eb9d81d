//! Minimal in-process append-only signed log backing an `Archive` (SPEC_FULL
//! §B). The real wire protocol and its framing are external per spec's
//! Non-goals; this is the concrete store every other subsystem operates
//! against, persisted to `<dat_path>/Archives/Meta/<k0>/<k1>/content`.

use crate::error::ArchiveError;
use crate::key::{verify_block, Key, KeyPair};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// One versioned write to an archive's tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
	pub version: u64,
	pub path: String,
	pub op: LogOp,
	pub signature: [u8; 64],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LogOp {
	Put(Vec<u8>),
	Delete,
}

fn signing_message(version: u64, path: &str, op: &LogOp) -> Vec<u8> {
	let mut message = Vec::new();
	message.extend_from_slice(&version.to_le_bytes());
	message.extend_from_slice(path.as_bytes());
	match op {
		LogOp::Put(bytes) => {
			message.push(1);
			message.extend_from_slice(bytes);
		}
		LogOp::Delete => message.push(0),
	}
	message
}

/// Append-only, signed log of operations against one archive.
///
/// `writable` archives own a `KeyPair` and can append; read-only archives
/// (someone else's, replicated over the swarm) hold only the public `Key`
/// and validate every entry against it (§3 invariant).
pub struct ArchiveLog {
	pub key: Key,
	keypair: Option<KeyPair>,
	entries: Mutex<Vec<LogEntry>>,
}

impl ArchiveLog {
	pub fn new_owned(keypair: KeyPair) -> Self {
		let key = keypair.public_key();
		ArchiveLog { key, keypair: Some(keypair), entries: Mutex::new(Vec::new()) }
	}

	pub fn new_readonly(key: Key) -> Self {
		ArchiveLog { key, keypair: None, entries: Mutex::new(Vec::new()) }
	}

	pub fn is_writable(&self) -> bool {
		self.keypair.is_some()
	}

	pub fn latest_version(&self) -> u64 {
		self.entries.lock().unwrap().len() as u64
	}

	/// Append a new entry, signing it with the held secret key.
	///
	/// Fails `NotWritable` for a read-only handle — this is the operational
	/// meaning of "only the holder of the secret key may append" (§3).
	pub fn append(&self, path: String, op: LogOp) -> Result<u64, ArchiveError> {
		let keypair = self
			.keypair
			.as_ref()
			.ok_or_else(|| ArchiveError::NotWritable { key: self.key.to_hex() })?;
		let mut entries = self.entries.lock().unwrap();
		let version = entries.len() as u64 + 1;
		let message = signing_message(version, &path, &op);
		let signature = keypair.sign(&message);
		entries.push(LogEntry { version, path, op, signature });
		Ok(version)
	}

	/// Append a pre-signed entry received from a peer, validating the
	/// signature against this archive's public key before accepting it —
	/// "readers validate every block against the signed log" (§3).
	pub fn append_remote(&self, entry: LogEntry) -> Result<(), ArchiveError> {
		let message = signing_message(entry.version, &entry.path, &entry.op);
		if !verify_block(self.key, &message, &entry.signature) {
			return Err(ArchiveError::InvalidKey { message: "block signature verification failed".into() });
		}
		let mut entries = self.entries.lock().unwrap();
		let expected = entries.len() as u64 + 1;
		if entry.version != expected {
			return Err(ArchiveError::VersionOutOfRange {
				requested: entry.version.to_string(),
				current: entries.len() as u64,
			});
		}
		entries.push(entry);
		Ok(())
	}

	/// Fetch the entry at `version`, or the most recent write to `path` as
	/// of `version` when reading a historic checkout.
	pub fn get(&self, version: u64) -> Option<LogEntry> {
		let entries = self.entries.lock().unwrap();
		entries.get((version.checked_sub(1))? as usize).cloned()
	}

	/// Reconstruct the value at `path` as of `as_of_version` (inclusive).
	pub fn read_path_at(&self, path: &str, as_of_version: u64) -> Option<Vec<u8>> {
		let entries = self.entries.lock().unwrap();
		entries
			.iter()
			.take(as_of_version as usize)
			.rev()
			.find(|e| e.path == path)
			.and_then(|e| match &e.op {
				LogOp::Put(bytes) => Some(bytes.clone()),
				LogOp::Delete => None,
			})
	}

	/// Entries with version strictly greater than `after_version`, in
	/// version order — the change feed a crawl pass walks (§4.6).
	pub fn entries_since(&self, after_version: u64) -> Vec<LogEntry> {
		let entries = self.entries.lock().unwrap();
		entries.iter().skip(after_version as usize).cloned().collect()
	}

	pub fn snapshot_paths(&self, as_of_version: u64) -> Vec<String> {
		let entries = self.entries.lock().unwrap();
		let mut seen = std::collections::BTreeMap::new();
		for entry in entries.iter().take(as_of_version as usize) {
			match &entry.op {
				LogOp::Put(_) => {
					seen.insert(entry.path.clone(), true);
				}
				LogOp::Delete => {
					seen.remove(&entry.path);
				}
			}
		}
		seen.into_keys().collect()
	}

	pub fn meta_storage_path(meta_dir: &Path) -> PathBuf {
		meta_dir.join("content.json")
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn owned_log_appends_and_verifies() {
		let kp = KeyPair::generate();
		let log = ArchiveLog::new_owned(kp);
		assert!(log.is_writable());
		let v1 = log.append("/a.txt".to_string(), LogOp::Put(b"hello".to_vec())).unwrap();
		assert_eq!(v1, 1);
		assert_eq!(log.latest_version(), 1);
		assert_eq!(log.read_path_at("/a.txt", 1), Some(b"hello".to_vec()));
	}

	#[test]
	fn readonly_log_rejects_append() {
		let kp = KeyPair::generate();
		let key = kp.public_key();
		let log = ArchiveLog::new_readonly(key);
		let result = log.append("/a.txt".to_string(), LogOp::Put(b"x".to_vec()));
		assert!(matches!(result, Err(ArchiveError::NotWritable { .. })));
	}

	#[test]
	fn remote_entries_require_valid_signature_and_order() {
		let kp = KeyPair::generate();
		let key = kp.public_key();
		let owner_log = ArchiveLog::new_owned(kp);
		owner_log.append("/a.txt".to_string(), LogOp::Put(b"1".to_vec())).unwrap();
		let entry = owner_log.get(1).unwrap();

		let reader_log = ArchiveLog::new_readonly(key);
		reader_log.append_remote(entry.clone()).unwrap();
		assert_eq!(reader_log.latest_version(), 1);

		let mut tampered = entry;
		tampered.path = "/evil.txt".to_string();
		let result = reader_log.append_remote(tampered);
		assert!(result.is_err());
	}

	#[test]
	fn delete_removes_from_snapshot() {
		let kp = KeyPair::generate();
		let log = ArchiveLog::new_owned(kp);
		log.append("/a.txt".to_string(), LogOp::Put(b"1".to_vec())).unwrap();
		log.append("/a.txt".to_string(), LogOp::Delete).unwrap();
		assert_eq!(log.read_path_at("/a.txt", 2), None);
		assert!(log.snapshot_paths(2).is_empty());
	}
}

// vim: ts=4
