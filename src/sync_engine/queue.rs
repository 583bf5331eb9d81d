//! Per-archive sync event coalescing (§4.3 `queueSyncEvent`).
//!
//! The queue object is replaced wholesale only once the run it gated has
//! finished (never mutated in place), so event handlers that captured the
//! old `Arc` while a sync was in flight keep observing a closed
//! (`is_syncing=true`) queue for the whole run, and their events are
//! correctly dropped rather than silently lost.

use crate::types::SyncQueue;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub struct SyncEventQueue {
	current: Mutex<Arc<Mutex<SyncQueue>>>,
	debounce: Duration,
	timer_pending: Mutex<bool>,
}

/// A queue that fired its debounce timer and is now locked for one run.
pub struct ArmedRun {
	pub run_to_archive: bool,
	locked: Arc<Mutex<SyncQueue>>,
}

impl SyncEventQueue {
	pub fn new(debounce: Duration) -> Self {
		SyncEventQueue {
			current: Mutex::new(Arc::new(Mutex::new(SyncQueue::default()))),
			debounce,
			timer_pending: Mutex::new(false),
		}
	}

	fn snapshot(&self) -> Arc<Mutex<SyncQueue>> {
		self.current.lock().unwrap().clone()
	}

	/// Enqueue a direction. Dropped if a sync is already running against
	/// the queue this call observes. Returns `true` if the caller should
	/// arm the debounce timer (i.e. this is the first event since the last
	/// fire).
	pub fn enqueue(&self, to_folder: bool, to_archive: bool) -> bool {
		let queue = self.snapshot();
		let mut q = queue.lock().unwrap();
		if q.is_syncing {
			return false;
		}
		q.to_folder |= to_folder;
		q.to_archive |= to_archive;
		drop(q);

		let mut pending = self.timer_pending.lock().unwrap();
		if *pending {
			false
		} else {
			*pending = true;
			true
		}
	}

	pub fn debounce(&self) -> Duration {
		self.debounce
	}

	/// Timer fired: lock the current queue for exactly one run, deciding
	/// direction (`to_archive` wins if both are set). Returns `None` if
	/// nothing was actually queued.
	pub fn fire(&self) -> Option<ArmedRun> {
		*self.timer_pending.lock().unwrap() = false;
		let queue = self.snapshot();
		let mut q = queue.lock().unwrap();
		if !q.to_folder && !q.to_archive {
			return None;
		}
		q.is_syncing = true;
		let run_to_archive = q.to_archive;
		drop(q);
		Some(ArmedRun { run_to_archive, locked: queue })
	}

	/// The run finished (successfully or not): replace the queue object so
	/// future `enqueue` calls see a fresh, unlocked queue. The just-locked
	/// queue stays `is_syncing=true` forever for anyone still holding it.
	pub fn finish(&self, run: ArmedRun) {
		let mut current = self.current.lock().unwrap();
		if Arc::ptr_eq(&*current, &run.locked) {
			*current = Arc::new(Mutex::new(SyncQueue::default()));
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn first_enqueue_arms_timer_subsequent_do_not() {
		let q = SyncEventQueue::new(Duration::from_millis(500));
		assert!(q.enqueue(true, false));
		assert!(!q.enqueue(true, false));
	}

	#[test]
	fn to_archive_wins_when_both_queued() {
		let q = SyncEventQueue::new(Duration::from_millis(500));
		q.enqueue(true, false);
		q.enqueue(false, true);
		let run = q.fire().unwrap();
		assert!(run.run_to_archive);
	}

	#[test]
	fn events_dropped_while_syncing_then_accepted_after_finish() {
		let q = SyncEventQueue::new(Duration::from_millis(500));
		q.enqueue(true, false);
		let run = q.fire().unwrap();
		// a handler still holding the old (locked) queue observes it closed
		assert!(!q.enqueue(false, true), "queue is locked mid-run");
		q.finish(run);
		assert!(q.enqueue(false, true), "fresh queue accepts events again");
	}

	#[test]
	fn empty_fire_is_a_noop() {
		let q = SyncEventQueue::new(Duration::from_millis(500));
		assert!(q.fire().is_none());
	}
}

// vim: ts=4
