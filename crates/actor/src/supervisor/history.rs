use tokio::time::Instant;

/// Fixed-capacity ring of restart timestamps.
///
/// Once full, each new restart overwrites the oldest one, so counts saturate
/// at the capacity. A capacity of `max_restarts + 1` is enough to tell when a
/// quota is exceeded.
#[derive(Debug, Clone)]
pub struct RestartHistory {
	stamps: Vec<Instant>,
	capacity: usize,
	/// Slot the next restart overwrites once the ring is full.
	next: usize,
}

impl RestartHistory {
	/// # Panics
	///
	/// Panics if `capacity` is zero.
	pub fn new(capacity: usize) -> Self {
		assert!(capacity > 0, "restart history capacity must be > 0");
		Self {
			stamps: Vec::with_capacity(capacity),
			capacity,
			next: 0,
		}
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}

	pub fn add_restart(&mut self, at: Instant) {
		if self.stamps.len() < self.capacity {
			self.stamps.push(at);
		} else {
			self.stamps[self.next] = at;
		}
		self.next = (self.next + 1) % self.capacity;
	}

	/// Remembered restarts at or after `since`.
	pub fn num_restarts(&self, since: Instant) -> usize {
		self.stamps.iter().filter(|at| **at >= since).count()
	}

	/// Remembered restarts no older than `window` relative to `now`.
	pub fn restarts_within(&self, now: Instant, window: std::time::Duration) -> usize {
		match now.checked_sub(window) {
			Some(since) => self.num_restarts(since),
			None => self.stamps.len(),
		}
	}

	pub fn clear(&mut self) {
		self.stamps.clear();
		self.next = 0;
	}
}
