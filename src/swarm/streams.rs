//! Replication stream pool: cyclic archive↔stream↔peer back-references
//! become arena indices (Design Notes §9). Archives hold integer handles
//! into this pool; on close the slot is freed and the index recycled.

use super::throttle::StreamThrottle;

pub struct StreamSlot {
	pub archive_key_hex: String,
	pub peer_id: String,
	pub throttle: StreamThrottle,
}

#[derive(Default)]
pub struct StreamPool {
	slots: Vec<Option<StreamSlot>>,
	free: Vec<usize>,
}

impl StreamPool {
	pub fn new() -> Self {
		StreamPool::default()
	}

	pub fn insert(&mut self, slot: StreamSlot) -> usize {
		if let Some(index) = self.free.pop() {
			self.slots[index] = Some(slot);
			index
		} else {
			self.slots.push(Some(slot));
			self.slots.len() - 1
		}
	}

	pub fn get(&self, index: usize) -> Option<&StreamSlot> {
		self.slots.get(index).and_then(|s| s.as_ref())
	}

	/// Free the slot at `index`, returning it if it was occupied.
	pub fn remove(&mut self, index: usize) -> Option<StreamSlot> {
		let slot = self.slots.get_mut(index)?.take();
		if slot.is_some() {
			self.free.push(index);
		}
		slot
	}

	pub fn find_for_archive_and_peer(&self, archive_key_hex: &str, peer_id: &str) -> Option<usize> {
		self.slots.iter().enumerate().find_map(|(i, slot)| {
			let slot = slot.as_ref()?;
			(slot.archive_key_hex == archive_key_hex && slot.peer_id == peer_id).then_some(i)
		})
	}

	pub fn live_count(&self) -> usize {
		self.slots.iter().filter(|s| s.is_some()).count()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn insert_and_remove_recycles_index() {
		let mut pool = StreamPool::new();
		let a = pool.insert(StreamSlot {
			archive_key_hex: "a".to_string(),
			peer_id: "p1".to_string(),
			throttle: StreamThrottle::new(),
		});
		assert_eq!(a, 0);
		pool.remove(a);
		let b = pool.insert(StreamSlot {
			archive_key_hex: "b".to_string(),
			peer_id: "p2".to_string(),
			throttle: StreamThrottle::new(),
		});
		assert_eq!(b, 0, "freed slot should be recycled");
	}

	#[test]
	fn find_for_archive_and_peer() {
		let mut pool = StreamPool::new();
		pool.insert(StreamSlot {
			archive_key_hex: "a".to_string(),
			peer_id: "p1".to_string(),
			throttle: StreamThrottle::new(),
		});
		assert_eq!(pool.find_for_archive_and_peer("a", "p1"), Some(0));
		assert_eq!(pool.find_for_archive_and_peer("a", "p2"), None);
	}
}

// vim: ts=4
