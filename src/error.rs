//! Error types for the archive runtime
//!
//! Mirrors the teacher crate's hand-rolled style: one unified enum with
//! direct variants for common errors plus nested variants for
//! subsystem-specific errors, each with its own `Display`/`Error` impl and
//! a `From` conversion into the unified type.

use std::error::Error;
use std::fmt;
use std::io;

/// Helper to reduce `Box::new()` boilerplate when wrapping errors.
#[inline]
pub fn boxed_error<E: Error + Send + Sync + 'static>(e: E) -> Box<dyn Error + Send + Sync> {
	Box::new(e)
}

/// Unified error type for the archive runtime.
///
/// Covers the abstract error kinds named in spec §7 plus nested
/// subsystem errors that convert into it via `From`.
#[derive(Debug, Clone)]
pub enum ArchiveError {
	/// Archive URL failed to normalise (bad hex, bad scheme, bad version suffix)
	InvalidUrl { input: String },

	/// Path escapes the archive/folder root or contains unsafe components
	InvalidPath { path: String },

	/// Single-file diff refused: not valid UTF-8 / binary content detected
	InvalidEncoding { path: String },

	/// Single-file diff refused: file exceeds the diff size cap
	SourceTooLarge { path: String, size: u64, max: u64 },

	/// DNS name did not resolve to a key through any configured provider
	InvalidDomainName { name: String },

	/// Malformed 32-byte key (wrong length, bad hex)
	InvalidKey { message: String },

	/// Mutation attempted against a non-owned (read-only) archive
	NotWritable { key: String },

	/// Userland write to a protected archive path (e.g. `/dat.json`)
	ProtectedFileNotWritable { path: String },

	/// Operation required a directory but the target isn't one
	NotAFolder { path: String },

	/// Archive, version, or path not found
	NotFound { what: String },

	/// A configured quota was exceeded
	QuotaExceeded { message: String },

	/// Filesystem permission denied
	PermissionDenied { path: String },

	/// The user declined a prompt-gated operation
	UserDenied,

	/// An operation carrying an explicit timeout did not complete in time
	Timeout { operation: String },

	/// A sync would require an impossible rename cycle; surfaced as an event,
	/// never propagated as a hard failure of the top-level sync call.
	CycleError { message: String },

	/// Archive key failed validation (distinguished from `InvalidKey` for
	/// call sites that specifically reject an *archive* key argument)
	InvalidArchiveKey { message: String },

	/// Checkout version is not `latest`, `preview`, or `<= current version`
	VersionOutOfRange { requested: String, current: u64 },

	/// `getArchiveCheckout(archive, "preview")` requested but no folder is bound
	NoPreview { key: String },

	/// Plain I/O error
	Io(io::ErrorKind, String),

	/// Lock acquisition failed (named-lock contention, file lock already held)
	LockFailed { message: String },

	/// Nested registry error
	Registry(RegistryError),

	/// Nested swarm error
	Swarm(SwarmError),

	/// Nested sync-engine error
	SyncEngine(SyncEngineError),

	/// Nested crawl error
	Crawl(CrawlError),

	/// Nested metadata-store error
	MetaStore(MetaStoreError),

	/// Nested name-resolver error
	NameResolver(NameResolverError),

	/// Nested exclusion-engine error
	Exclusion(ExclusionError),

	/// Generic message, used sparingly at call sites with no typed variant
	Other { message: String },
}

impl fmt::Display for ArchiveError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ArchiveError::InvalidUrl { input } => write!(f, "invalid archive url: {}", input),
			ArchiveError::InvalidPath { path } => write!(f, "invalid path: {}", path),
			ArchiveError::InvalidEncoding { path } => {
				write!(f, "refusing non-text content for diff: {}", path)
			}
			ArchiveError::SourceTooLarge { path, size, max } => {
				write!(f, "{} is {} bytes, exceeds diff cap of {} bytes", path, size, max)
			}
			ArchiveError::InvalidDomainName { name } => {
				write!(f, "could not resolve domain name: {}", name)
			}
			ArchiveError::InvalidKey { message } => write!(f, "invalid key: {}", message),
			ArchiveError::NotWritable { key } => write!(f, "archive {} is not writable", key),
			ArchiveError::ProtectedFileNotWritable { path } => {
				write!(f, "{} is protected and cannot be written by userland", path)
			}
			ArchiveError::NotAFolder { path } => write!(f, "{} is not a folder", path),
			ArchiveError::NotFound { what } => write!(f, "not found: {}", what),
			ArchiveError::QuotaExceeded { message } => write!(f, "quota exceeded: {}", message),
			ArchiveError::PermissionDenied { path } => write!(f, "permission denied: {}", path),
			ArchiveError::UserDenied => write!(f, "operation declined by user"),
			ArchiveError::Timeout { operation } => write!(f, "timed out: {}", operation),
			ArchiveError::CycleError { message } => write!(f, "sync cycle error: {}", message),
			ArchiveError::InvalidArchiveKey { message } => {
				write!(f, "invalid archive key: {}", message)
			}
			ArchiveError::VersionOutOfRange { requested, current } => {
				write!(f, "version {} out of range (current is {})", requested, current)
			}
			ArchiveError::NoPreview { key } => {
				write!(f, "archive {} has no folder bound to preview", key)
			}
			ArchiveError::Io(kind, message) => write!(f, "i/o error ({:?}): {}", kind, message),
			ArchiveError::LockFailed { message } => write!(f, "lock failed: {}", message),
			ArchiveError::Registry(e) => write!(f, "registry error: {}", e),
			ArchiveError::Swarm(e) => write!(f, "swarm error: {}", e),
			ArchiveError::SyncEngine(e) => write!(f, "sync engine error: {}", e),
			ArchiveError::Crawl(e) => write!(f, "crawl error: {}", e),
			ArchiveError::MetaStore(e) => write!(f, "meta store error: {}", e),
			ArchiveError::NameResolver(e) => write!(f, "name resolver error: {}", e),
			ArchiveError::Exclusion(e) => write!(f, "exclusion error: {}", e),
			ArchiveError::Other { message } => write!(f, "{}", message),
		}
	}
}

impl Error for ArchiveError {}

impl From<io::Error> for ArchiveError {
	fn from(e: io::Error) -> Self {
		ArchiveError::Io(e.kind(), e.to_string())
	}
}

impl From<String> for ArchiveError {
	fn from(e: String) -> Self {
		ArchiveError::Other { message: e }
	}
}

macro_rules! nest_error {
	($variant:ident, $ty:ty) => {
		impl From<$ty> for ArchiveError {
			fn from(e: $ty) -> Self {
				ArchiveError::$variant(e)
			}
		}
	};
}

nest_error!(Registry, RegistryError);
nest_error!(Swarm, SwarmError);
nest_error!(SyncEngine, SyncEngineError);
nest_error!(Crawl, CrawlError);
nest_error!(MetaStore, MetaStoreError);
nest_error!(NameResolver, NameResolverError);
nest_error!(Exclusion, ExclusionError);

/// Errors from the archive registry (§4.1)
#[derive(Debug, Clone)]
pub enum RegistryError {
	InvalidUrl { input: String },
	NotFound { key: String },
	NoPreview { key: String },
	VersionOutOfRange { requested: String, current: u64 },
	NotWritable { key: String },
	LoadFailed { key: String, message: String },
}

impl fmt::Display for RegistryError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RegistryError::InvalidUrl { input } => write!(f, "invalid archive url: {}", input),
			RegistryError::NotFound { key } => write!(f, "archive not loaded: {}", key),
			RegistryError::NoPreview { key } => write!(f, "no preview binding for {}", key),
			RegistryError::VersionOutOfRange { requested, current } => {
				write!(f, "version {} out of range (current {})", requested, current)
			}
			RegistryError::NotWritable { key } => write!(f, "{} is not writable", key),
			RegistryError::LoadFailed { key, message } => {
				write!(f, "failed to load {}: {}", key, message)
			}
		}
	}
}

impl Error for RegistryError {}

/// Errors from swarm/replication (§4.2)
#[derive(Debug, Clone)]
pub enum SwarmError {
	/// Inbound stream arrived with no identifiable topic (spec.md §9 open
	/// question: treated as an upstream bug, not given a silent fallback)
	MissingTopic,
	BindFailed { message: String },
	StreamClosed,
}

impl fmt::Display for SwarmError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SwarmError::MissingTopic => {
				write!(f, "inbound stream has no discovery topic to identify it by")
			}
			SwarmError::BindFailed { message } => write!(f, "failed to bind listener: {}", message),
			SwarmError::StreamClosed => write!(f, "stream closed"),
		}
	}
}

impl Error for SwarmError {}

/// Errors from the folder↔archive sync engine (§4.3)
#[derive(Debug, Clone)]
pub enum SyncEngineError {
	NotWritable { key: String },
	FolderMissing { path: String },
	Cycle { message: String },
	InvalidEncoding { path: String },
	SourceTooLarge { path: String, size: u64, max: u64 },
}

impl fmt::Display for SyncEngineError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncEngineError::NotWritable { key } => write!(f, "{} is not writable", key),
			SyncEngineError::FolderMissing { path } => write!(f, "folder missing: {}", path),
			SyncEngineError::Cycle { message } => write!(f, "sync cycle: {}", message),
			SyncEngineError::InvalidEncoding { path } => {
				write!(f, "binary content refused: {}", path)
			}
			SyncEngineError::SourceTooLarge { path, size, max } => {
				write!(f, "{} is {} bytes, exceeds {} byte cap", path, size, max)
			}
		}
	}
}

impl Error for SyncEngineError {}

/// Errors from the crawler & dataset indexers (§4.6)
#[derive(Debug, Clone)]
pub enum CrawlError {
	ReadFailed { path: String, message: String },
	SchemaCompileFailed { dataset: String, message: String },
	LockFailed { url: String },
}

impl fmt::Display for CrawlError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			CrawlError::ReadFailed { path, message } => {
				write!(f, "failed to read {}: {}", path, message)
			}
			CrawlError::SchemaCompileFailed { dataset, message } => {
				write!(f, "failed to compile schema for {}: {}", dataset, message)
			}
			CrawlError::LockFailed { url } => write!(f, "failed to acquire crawl lock for {}", url),
		}
	}
}

impl Error for CrawlError {}

/// Errors from the `MetaStore` adapter (§6)
#[derive(Debug, Clone)]
pub enum MetaStoreError {
	Backend { message: String },
	NotFound { key: String },
}

impl fmt::Display for MetaStoreError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			MetaStoreError::Backend { message } => write!(f, "meta store backend error: {}", message),
			MetaStoreError::NotFound { key } => write!(f, "no meta store row for {}", key),
		}
	}
}

impl Error for MetaStoreError {}

/// Errors from the `NameResolver` (§4.7)
#[derive(Debug, Clone)]
pub enum NameResolverError {
	AllProvidersFailed { name: String },
	Timeout { name: String },
}

impl fmt::Display for NameResolverError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			NameResolverError::AllProvidersFailed { name } => {
				write!(f, "all DoH providers failed to resolve {}", name)
			}
			NameResolverError::Timeout { name } => write!(f, "timed out resolving {}", name),
		}
	}
}

impl Error for NameResolverError {}

/// Errors from pattern/ignore-rule exclusion (carried from the teacher crate)
#[derive(Debug, Clone)]
pub enum ExclusionError {
	InvalidPattern(String),
	IgnoreFileError(String),
}

impl fmt::Display for ExclusionError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ExclusionError::InvalidPattern(msg) => write!(f, "invalid exclusion pattern: {}", msg),
			ExclusionError::IgnoreFileError(msg) => write!(f, "ignore file error: {}", msg),
		}
	}
}

impl Error for ExclusionError {}

// vim: ts=4
