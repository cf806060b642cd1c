use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic id source for strands, actors, watches and requests.
///
/// Ids start at 1 and are unique for the lifetime of the clock.
#[derive(Debug, Default)]
pub struct IdClock {
	next: AtomicU64,
}

impl IdClock {
	/// Creates a clock whose first id is 1.
	pub const fn new() -> Self {
		Self { next: AtomicU64::new(0) }
	}

	/// Returns the next id.
	pub fn next(&self) -> u64 {
		self.next.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
	}
}
