//! Named string-keyed mutexes with refcounted entries (Design Notes §9),
//! generalising the teacher's single global `FileLock` into many concern-
//! scoped locks: `archives-db:meta`, `crawl:<url>`, `sync:<url>`,
//! `configure-archive:<url>` (§5 Shared resource policy).

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, Weak};
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A pool of named async mutexes. Unused locks are reclaimed: once the last
/// guard and the last held `Weak` drop, the map entry is removed on the
/// next `acquire` of the same name (or left to be recreated).
#[derive(Default)]
pub struct NamedLocks {
	entries: StdMutex<HashMap<String, Weak<Mutex<()>>>>,
}

impl NamedLocks {
	pub fn new() -> Self {
		NamedLocks { entries: StdMutex::new(HashMap::new()) }
	}

	fn get_or_create(&self, name: &str) -> Arc<Mutex<()>> {
		let mut entries = self.entries.lock().unwrap();
		if let Some(existing) = entries.get(name).and_then(Weak::upgrade) {
			return existing;
		}
		let fresh = Arc::new(Mutex::new(()));
		entries.insert(name.to_string(), Arc::downgrade(&fresh));
		fresh
	}

	/// Acquire the named lock, blocking other holders of the same name
	/// until the returned guard drops.
	pub async fn acquire(&self, name: &str) -> OwnedMutexGuard<()> {
		let mutex = self.get_or_create(name);
		mutex.lock_owned().await
	}

	/// Number of currently-live named locks, for diagnostics/tests.
	pub fn live_count(&self) -> usize {
		let mut entries = self.entries.lock().unwrap();
		entries.retain(|_, weak| weak.strong_count() > 0);
		entries.len()
	}
}

pub mod names {
	pub fn crawl(url: &str) -> String {
		format!("crawl:{}", url)
	}

	pub fn sync(url: &str) -> String {
		format!("sync:{}", url)
	}

	pub fn configure_archive(url: &str) -> String {
		format!("configure-archive:{}", url)
	}

	pub const ARCHIVES_DB_META: &str = "archives-db:meta";
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn same_name_serialises_holders() {
		let locks = Arc::new(NamedLocks::new());
		let order = Arc::new(StdMutex::new(Vec::new()));

		let l1 = locks.clone();
		let o1 = order.clone();
		let h1 = tokio::spawn(async move {
			let _guard = l1.acquire("sync:a").await;
			tokio::time::sleep(std::time::Duration::from_millis(20)).await;
			o1.lock().unwrap().push(1);
		});

		tokio::time::sleep(std::time::Duration::from_millis(5)).await;

		let l2 = locks.clone();
		let o2 = order.clone();
		let h2 = tokio::spawn(async move {
			let _guard = l2.acquire("sync:a").await;
			o2.lock().unwrap().push(2);
		});

		h1.await.unwrap();
		h2.await.unwrap();
		assert_eq!(*order.lock().unwrap(), vec![1, 2]);
	}

	#[tokio::test]
	async fn distinct_names_run_concurrently() {
		let locks = NamedLocks::new();
		let a = locks.acquire("sync:a").await;
		let b = locks.acquire("sync:b").await;
		drop(a);
		drop(b);
	}

	#[tokio::test]
	async fn unused_locks_are_reclaimed() {
		let locks = NamedLocks::new();
		{
			let _g = locks.acquire("crawl:x").await;
		}
		assert_eq!(locks.live_count(), 0);
	}
}

// vim: ts=4
