#![allow(dead_code)]

//! Unified runtime configuration.
//!
//! This module consolidates every tunable into a single `RuntimeConfig`
//! struct, the single source of truth passed into `RuntimeContext::new`.
//!
//! The configuration follows a priority chain:
//! 1. Built-in defaults (`RuntimeConfig::default()`)
//! 2. `<dat_path>/config.toml`
//! 3. Environment variables (`ARCHIVIST_*` prefix)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Single source of truth for all archivist runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RuntimeConfig {
	// ========================================================================
	// ON-DISK LAYOUT
	// ========================================================================
	/// Root of all on-disk state: `Archives/Meta`, `Archives/LocalCopy`, trash.
	pub dat_path: PathBuf,

	// ========================================================================
	// SWARM & BANDWIDTH
	// ========================================================================
	/// Preferred UDP/TCP port for the discovery listener; falls back to an
	/// OS-assigned port on bind failure.
	pub swarm_port: u16,

	/// Upload throttle in bytes/sec. `None` disables throttling.
	pub upload_bytes_per_sec: Option<u64>,

	/// Download throttle in bytes/sec. `None` disables throttling.
	pub download_bytes_per_sec: Option<u64>,

	// ========================================================================
	// SYNC ENGINE
	// ========================================================================
	/// Debounce window for coalescing watcher events into one sync pass.
	#[serde(with = "duration_millis")]
	pub sync_debounce: Duration,

	/// Size cap above which single-file diffs refuse with `SourceTooLarge`.
	pub single_file_diff_cap_bytes: u64,

	// ========================================================================
	// GARBAGE COLLECTION
	// ========================================================================
	/// Delay before the first GC run after process start.
	#[serde(with = "duration_secs")]
	pub gc_initial_delay: Duration,

	/// Period between subsequent GC runs.
	#[serde(with = "duration_secs")]
	pub gc_interval: Duration,

	/// Age after which an unsaved archive becomes GC-eligible.
	#[serde(with = "duration_secs")]
	pub gc_unused_age: Duration,

	/// Age after which a trash entry is swept.
	#[serde(with = "duration_secs")]
	pub trash_max_age: Duration,

	// ========================================================================
	// CRAWLER
	// ========================================================================
	/// Debounce window between an archive change and a crawl pass.
	#[serde(with = "duration_secs")]
	pub crawl_debounce: Duration,

	// ========================================================================
	// NAME RESOLUTION
	// ========================================================================
	/// DNS-over-HTTPS provider endpoints, queried in random order with
	/// fallback.
	pub dns_providers: Vec<String>,

	/// Timeout for a single DNS provider call.
	#[serde(with = "duration_millis")]
	pub dns_timeout: Duration,

	// ========================================================================
	// LOCKS
	// ========================================================================
	/// How long a named lock may be held before a `Timeout` is logged (does
	/// not forcibly release the lock; diagnostic only).
	#[serde(with = "duration_secs")]
	pub lock_warn_after: Duration,
}

impl Default for RuntimeConfig {
	fn default() -> Self {
		RuntimeConfig {
			dat_path: default_dat_path(),
			swarm_port: 3282,
			upload_bytes_per_sec: None,
			download_bytes_per_sec: None,
			sync_debounce: Duration::from_millis(500),
			single_file_diff_cap_bytes: 100 * 1024,
			gc_initial_delay: Duration::from_secs(30),
			gc_interval: Duration::from_secs(15 * 60),
			gc_unused_age: Duration::from_secs(7 * 24 * 60 * 60),
			trash_max_age: Duration::from_secs(7 * 24 * 60 * 60),
			crawl_debounce: Duration::from_secs(5),
			dns_providers: vec![
				"https://cloudflare-dns.com/dns-query".to_string(),
				"https://dns.google/resolve".to_string(),
			],
			dns_timeout: Duration::from_millis(5000),
			lock_warn_after: Duration::from_secs(30),
		}
	}
}

fn default_dat_path() -> PathBuf {
	dirs_home().join(".archivist")
}

fn dirs_home() -> PathBuf {
	std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."))
}

impl RuntimeConfig {
	/// Load per the documented priority chain: defaults, then
	/// `<dat_path>/config.toml` if present, then `ARCHIVIST_*` environment
	/// overrides.
	pub fn load(dat_path_override: Option<PathBuf>) -> Result<Self, crate::error::ArchiveError> {
		let mut config = RuntimeConfig::default();
		if let Some(p) = dat_path_override {
			config.dat_path = p;
		}

		let config_file = config.dat_path.join("config.toml");
		if config_file.exists() {
			let contents = std::fs::read_to_string(&config_file)?;
			config = toml::from_str(&contents)
				.map_err(|e| crate::error::ArchiveError::Other { message: e.to_string() })?;
		}

		config.apply_env_overrides();
		Ok(config)
	}

	fn apply_env_overrides(&mut self) {
		if let Ok(v) = std::env::var("ARCHIVIST_DAT_PATH") {
			self.dat_path = PathBuf::from(v);
		}
		if let Ok(v) = std::env::var("ARCHIVIST_SWARM_PORT") {
			if let Ok(port) = v.parse() {
				self.swarm_port = port;
			}
		}
		if let Ok(v) = std::env::var("ARCHIVIST_UPLOAD_BYTES_PER_SEC") {
			self.upload_bytes_per_sec = v.parse().ok();
		}
		if let Ok(v) = std::env::var("ARCHIVIST_DOWNLOAD_BYTES_PER_SEC") {
			self.download_bytes_per_sec = v.parse().ok();
		}
	}

	pub fn meta_dir(&self, key_hex: &str) -> PathBuf {
		self.dat_path.join("Archives").join("Meta").join(&key_hex[0..2]).join(&key_hex[2..])
	}

	pub fn internal_sync_dir(&self, key_hex: &str) -> PathBuf {
		self.dat_path.join("Archives").join("LocalCopy").join(&key_hex[0..2]).join(&key_hex[2..])
	}

	pub fn trash_dir(&self) -> PathBuf {
		self.dat_path.join("Trash")
	}
}

mod duration_millis {
	use serde::{Deserialize, Deserializer, Serializer};
	use std::time::Duration;

	pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
		s.serialize_u64(d.as_millis() as u64)
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
		Ok(Duration::from_millis(u64::deserialize(d)?))
	}
}

mod duration_secs {
	use serde::{Deserialize, Deserializer, Serializer};
	use std::time::Duration;

	pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
		s.serialize_u64(d.as_secs())
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
		Ok(Duration::from_secs(u64::deserialize(d)?))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_match_spec_timings() {
		let c = RuntimeConfig::default();
		assert_eq!(c.sync_debounce, Duration::from_millis(500));
		assert_eq!(c.gc_initial_delay, Duration::from_secs(30));
		assert_eq!(c.gc_interval, Duration::from_secs(15 * 60));
		assert_eq!(c.single_file_diff_cap_bytes, 100 * 1024);
		assert_eq!(c.crawl_debounce, Duration::from_secs(5));
	}

	#[test]
	fn meta_dir_splits_key_prefix() {
		let c = RuntimeConfig { dat_path: PathBuf::from("/data"), ..Default::default() };
		let hex = "ab".to_string() + &"c".repeat(62);
		let dir = c.meta_dir(&hex);
		assert_eq!(dir, PathBuf::from("/data/Archives/Meta/ab").join(&hex[2..]));
	}

	#[test]
	fn env_override_applies_on_top_of_defaults() {
		std::env::set_var("ARCHIVIST_SWARM_PORT", "9999");
		let mut c = RuntimeConfig::default();
		c.apply_env_overrides();
		assert_eq!(c.swarm_port, 9999);
		std::env::remove_var("ARCHIVIST_SWARM_PORT");
	}
}

// vim: ts=4
