//! Per-direction bandwidth throttles: two global token buckets (up/down),
//! applied to every stream created after a limit change (§4.2).

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub struct TokenBucket {
	rate_bytes_per_sec: AtomicU64,
	tokens: Mutex<(i64, Instant)>,
}

impl TokenBucket {
	pub fn new(rate: Option<u64>) -> Self {
		TokenBucket {
			rate_bytes_per_sec: AtomicU64::new(rate.unwrap_or(0)),
			tokens: Mutex::new((0, Instant::now())),
		}
	}

	pub fn set_rate(&self, rate: Option<u64>) {
		self.rate_bytes_per_sec.store(rate.unwrap_or(0), Ordering::SeqCst);
	}

	pub fn is_unlimited(&self) -> bool {
		self.rate_bytes_per_sec.load(Ordering::SeqCst) == 0
	}

	/// Block until `bytes` worth of budget is available, refilling linearly
	/// since the last call. A rate of 0 means unthrottled.
	pub async fn acquire(&self, bytes: u64) {
		let rate = self.rate_bytes_per_sec.load(Ordering::SeqCst);
		if rate == 0 {
			return;
		}
		loop {
			let wait = {
				let mut guard = self.tokens.lock().await;
				let (tokens, last) = *guard;
				let elapsed = last.elapsed();
				let refill = (elapsed.as_secs_f64() * rate as f64) as i64;
				let available = tokens + refill;
				if available >= bytes as i64 {
					*guard = (available - bytes as i64, Instant::now());
					None
				} else {
					*guard = (available, Instant::now());
					let missing = bytes as i64 - available;
					Some(Duration::from_secs_f64(missing as f64 / rate as f64))
				}
			};
			match wait {
				None => return,
				Some(d) => tokio::time::sleep(d).await,
			}
		}
	}
}

/// A per-stream handle into the shared up/down buckets; created fresh for
/// every stream so rate changes only affect streams created afterward.
pub struct StreamThrottle {
	pub up_budget_used: AtomicI64,
	pub down_budget_used: AtomicI64,
}

impl StreamThrottle {
	pub fn new() -> Self {
		StreamThrottle { up_budget_used: AtomicI64::new(0), down_budget_used: AtomicI64::new(0) }
	}
}

impl Default for StreamThrottle {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn unlimited_bucket_never_blocks() {
		let bucket = TokenBucket::new(None);
		bucket.acquire(1_000_000_000).await;
	}

	#[tokio::test]
	async fn limited_bucket_throttles() {
		let bucket = TokenBucket::new(Some(1_000_000));
		let start = Instant::now();
		bucket.acquire(500_000).await;
		bucket.acquire(1_000_000).await;
		assert!(start.elapsed() >= Duration::from_millis(400));
	}

	#[tokio::test]
	async fn rate_change_only_affects_future_acquires() {
		let bucket = TokenBucket::new(Some(1_000_000));
		bucket.set_rate(None);
		assert!(bucket.is_unlimited());
	}
}

// vim: ts=4
