//! # Archivist — a peer-to-peer content-addressed archive runtime
//!
//! Every archive is a signed, append-only log of path → content changes
//! (`ArchiveLog`), replicated between peers over `SwarmHub`, synchronised
//! with a local folder by `SyncEngine`, and indexed into queryable profile
//! datasets by `Crawler`. `RuntimeContext` owns and wires every subsystem;
//! nothing in this crate reaches for a process-global static.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use archivist::config::RuntimeConfig;
//! use archivist::context::RuntimeContext;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ctx = RuntimeContext::new(RuntimeConfig::load(None)?)?;
//!     ctx.spawn_background_tasks().await;
//!     let archive = ctx.registry.load_archive(None, None).await?;
//!     println!("opened {}", archive.key);
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]
#![warn(dead_code)]

pub mod archive_fs;
pub mod archive_log;
pub mod capabilities;
pub mod config;
pub mod context;
pub mod crawler;
pub mod error;
pub mod exclusion;
pub mod extension_bus;
pub mod gc;
pub mod key;
pub mod locks;
pub mod logging;
pub mod meta_store;
pub mod name_resolver;
pub mod registry;
pub mod swarm;
pub mod sync_engine;
pub mod types;
pub mod util;

// Re-export the types most callers reach for first.
pub use archive_log::ArchiveLog;
pub use context::RuntimeContext;
pub use error::ArchiveError;
pub use key::{DiscoveryKey, Key, KeyPair};
pub use types::{Archive, ArchiveMeta, LocalSyncBinding, UserSettings};

// vim: ts=4
