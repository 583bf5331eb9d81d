//! Archive key material: public/secret keypairs, discovery-key derivation,
//! and the `dat://` URL grammar (spec §3, §6).

use crate::error::ArchiveError;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-byte public key identifying an archive. Its hex form is the
/// canonical cache key (spec §3).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Key(#[serde(with = "hex_bytes")] pub [u8; 32]);

/// A 32-byte deterministic, one-way derivation of a `Key`, used on the wire
/// so the public key is never announced (spec §3).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DiscoveryKey(#[serde(with = "hex_bytes")] pub [u8; 32]);

mod hex_bytes {
	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
		s.serialize_str(&hex::encode(bytes))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
		let s = String::deserialize(d)?;
		let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
		bytes.try_into().map_err(|_| serde::de::Error::custom("key must be 32 bytes"))
	}
}

impl Key {
	/// Canonical hex form — the cache key used throughout the registry.
	pub fn to_hex(self) -> String {
		hex::encode(self.0)
	}

	/// Parse a key from raw 32-byte, 64-char hex, or `dat://<hex>[/...]` form.
	pub fn parse(input: &str) -> Result<Self, ArchiveError> {
		let host = ArchiveUrl::host_from_input(input)?;
		Self::from_hex(&host).map_err(|_| ArchiveError::InvalidUrl { input: input.to_string() })
	}

	pub fn from_hex(hex_str: &str) -> Result<Self, ArchiveError> {
		if hex_str.len() != 64 {
			return Err(ArchiveError::InvalidKey {
				message: format!("expected 64 hex chars, got {}", hex_str.len()),
			});
		}
		let bytes = hex::decode(hex_str)
			.map_err(|e| ArchiveError::InvalidKey { message: e.to_string() })?;
		let arr: [u8; 32] = bytes
			.try_into()
			.map_err(|_| ArchiveError::InvalidKey { message: "wrong length".into() })?;
		Ok(Key(arr))
	}

	/// Derive this key's discovery key via a one-way BLAKE3 keyed hash.
	///
	/// Keying the hash (rather than hashing the raw key) is what makes the
	/// derivation one-way with respect to swarm observers: the discovery
	/// key alone gives no information that lets an observer recover the
	/// archive's public key.
	pub fn discovery_key(self) -> DiscoveryKey {
		let hash = blake3::keyed_hash(b"archivist-discovery-key-deriv-32", &self.0);
		DiscoveryKey(*hash.as_bytes())
	}
}

impl fmt::Debug for Key {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Key({})", self.to_hex())
	}
}

impl fmt::Display for Key {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.to_hex())
	}
}

impl fmt::Debug for DiscoveryKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "DiscoveryKey({})", hex::encode(self.0))
	}
}

impl DiscoveryKey {
	pub fn to_hex(self) -> String {
		hex::encode(self.0)
	}
}

/// An Ed25519 keypair: the secret half of an owned archive.
///
/// Holding this is what spec §3's `writable` invariant means operationally:
/// only the holder of the secret key may produce a signature that
/// `verify_block` accepts for this archive's public key.
pub struct KeyPair {
	signing_key: SigningKey,
}

impl KeyPair {
	/// Generate a fresh keypair (the `loadArchive(null)` owner path).
	pub fn generate() -> Self {
		let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
		KeyPair { signing_key: SigningKey::from_bytes(&seed) }
	}

	pub fn public_key(&self) -> Key {
		Key(self.signing_key.verifying_key().to_bytes())
	}

	pub fn sign(&self, message: &[u8]) -> [u8; 64] {
		self.signing_key.sign(message).to_bytes()
	}
}

/// Verify a block signature against an archive's public key.
pub fn verify_block(key: Key, message: &[u8], signature: &[u8; 64]) -> bool {
	let Ok(verifying_key) = VerifyingKey::from_bytes(&key.0) else {
		return false;
	};
	let signature = Signature::from_bytes(signature);
	verifying_key.verify(message, &signature).is_ok()
}

/// The version suffix/selector of a `dat://` url (spec §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSelector {
	Latest,
	Preview,
	Exact(u64),
}

impl fmt::Display for VersionSelector {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			VersionSelector::Latest => write!(f, "latest"),
			VersionSelector::Preview => write!(f, "preview"),
			VersionSelector::Exact(v) => write!(f, "{}", v),
		}
	}
}

/// A parsed `dat://<host>[+<version>][/path][?q][#f]` url (spec §6).
#[derive(Debug, Clone)]
pub struct ArchiveUrl {
	pub host: String,
	pub version: VersionSelector,
	pub path: String,
}

impl ArchiveUrl {
	/// Parse a `dat://` url, a raw 64-hex key, or a raw 32-byte key string.
	pub fn parse(input: &str) -> Result<Self, ArchiveError> {
		let rest = input.strip_prefix("dat://").unwrap_or(input);
		let (rest, _fragment) = split_once_keep_first(rest, '#');
		let (rest, _query) = split_once_keep_first(rest, '?');

		let (host_and_version, path) = match rest.find('/') {
			Some(idx) => (&rest[..idx], rest[idx..].to_string()),
			None => (rest, String::new()),
		};

		let (host, version) = match host_and_version.split_once('+') {
			Some((h, v)) => (h, Self::parse_version(v)?),
			None => (host_and_version, VersionSelector::Latest),
		};

		if host.is_empty() {
			return Err(ArchiveError::InvalidUrl { input: input.to_string() });
		}

		Ok(ArchiveUrl { host: host.to_string(), version, path })
	}

	fn parse_version(v: &str) -> Result<VersionSelector, ArchiveError> {
		match v {
			"latest" => Ok(VersionSelector::Latest),
			"preview" => Ok(VersionSelector::Preview),
			n => n
				.parse::<u64>()
				.map(VersionSelector::Exact)
				.map_err(|_| ArchiveError::InvalidUrl { input: v.to_string() }),
		}
	}

	/// Extract just the host component, used when only key normalisation is
	/// wanted (e.g. `Key::parse`).
	fn host_from_input(input: &str) -> Result<String, ArchiveError> {
		Ok(Self::parse(input)?.host)
	}

	/// True if the host is already a canonical 64-hex key (no DNS lookup
	/// needed).
	pub fn host_is_hash(&self) -> bool {
		self.host.len() == 64 && self.host.bytes().all(|b| b.is_ascii_hexdigit())
	}
}

fn split_once_keep_first(s: &str, sep: char) -> (&str, Option<&str>) {
	match s.find(sep) {
		Some(idx) => (&s[..idx], Some(&s[..idx])),
		None => (s, None),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_raw_hex_key() {
		let hex = "a".repeat(64);
		let url = ArchiveUrl::parse(&hex).unwrap();
		assert_eq!(url.host, hex);
		assert_eq!(url.version, VersionSelector::Latest);
		assert!(url.host_is_hash());
	}

	#[test]
	fn parses_dat_url_with_version_and_path() {
		let hex = "b".repeat(64);
		let url = ArchiveUrl::parse(&format!("dat://{}+42/foo/bar.json", hex)).unwrap();
		assert_eq!(url.host, hex);
		assert_eq!(url.version, VersionSelector::Exact(42));
		assert_eq!(url.path, "/foo/bar.json");
	}

	#[test]
	fn parses_preview_and_latest() {
		let hex = "c".repeat(64);
		let preview = ArchiveUrl::parse(&format!("dat://{}+preview", hex)).unwrap();
		assert_eq!(preview.version, VersionSelector::Preview);
		let latest = ArchiveUrl::parse(&format!("dat://{}+latest", hex)).unwrap();
		assert_eq!(latest.version, VersionSelector::Latest);
	}

	#[test]
	fn parses_dns_host() {
		let url = ArchiveUrl::parse("dat://example.test/a.txt").unwrap();
		assert_eq!(url.host, "example.test");
		assert!(!url.host_is_hash());
	}

	#[test]
	fn rejects_empty_host() {
		assert!(ArchiveUrl::parse("dat:///foo").is_err());
	}

	#[test]
	fn strips_query_and_fragment_together() {
		let hex = "e".repeat(64);
		let url = ArchiveUrl::parse(&format!("dat://{}+3/foo?q=1#frag", hex)).unwrap();
		assert_eq!(url.host, hex);
		assert_eq!(url.version, VersionSelector::Exact(3));
		assert_eq!(url.path, "/foo");
	}

	#[test]
	fn discovery_key_is_deterministic_and_one_way() {
		let kp = KeyPair::generate();
		let key = kp.public_key();
		let dk1 = key.discovery_key();
		let dk2 = key.discovery_key();
		assert_eq!(dk1, dk2);
		assert_ne!(dk1.0, key.0);
	}

	#[test]
	fn sign_and_verify_roundtrip() {
		let kp = KeyPair::generate();
		let msg = b"block contents";
		let sig = kp.sign(msg);
		assert!(verify_block(kp.public_key(), msg, &sig));
		assert!(!verify_block(kp.public_key(), b"tampered", &sig));
	}

	#[test]
	fn key_parse_accepts_hex_and_url() {
		let hex = "d".repeat(64);
		let k1 = Key::parse(&hex).unwrap();
		let k2 = Key::parse(&format!("dat://{}", hex)).unwrap();
		assert_eq!(k1, k2);
	}
}

// vim: ts=4
