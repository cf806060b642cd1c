//! Scheduler and mailbox configuration.
//!
//! All types deserialize from TOML/serde with every field defaulted, so a
//! partial table only overrides what it names.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ChannelError;

/// Sizing of the native worker pool that strands are multiplexed over.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
	/// Number of native worker threads.
	pub worker_threads: usize,
	/// Name given to every worker thread.
	pub thread_name: String,
}

impl Default for SchedulerConfig {
	fn default() -> Self {
		Self {
			worker_threads: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
			thread_name: "skein-worker".to_string(),
		}
	}
}

/// Mailbox capacity.
///
/// On the wire this is a single integer: `-1` unbounded, `0` rendezvous,
/// `n > 0` bounded to `n` queued messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "i64")]
pub enum Capacity {
	/// No limit; overflow policies never apply.
	#[default]
	Unbounded,
	/// Transfer channel: a message is only accepted while a receiver waits for it.
	Rendezvous,
	/// At most `n` queued messages.
	Bounded(usize),
}

impl Capacity {
	/// Maps the integer encoding to a capacity.
	pub fn from_raw(raw: i64) -> Result<Self, ChannelError> {
		match raw {
			-1 => Ok(Self::Unbounded),
			0 => Ok(Self::Rendezvous),
			n if n > 0 => Ok(Self::Bounded(n as usize)),
			n => Err(ChannelError::InvalidCapacity(n)),
		}
	}

	/// Returns the integer encoding.
	pub fn as_raw(self) -> i64 {
		match self {
			Self::Unbounded => -1,
			Self::Rendezvous => 0,
			Self::Bounded(n) => n as i64,
		}
	}

	/// Returns `true` for [`Capacity::Bounded`].
	pub const fn is_bounded(self) -> bool {
		matches!(self, Self::Bounded(_))
	}
}

impl TryFrom<i64> for Capacity {
	type Error = ChannelError;

	fn try_from(raw: i64) -> Result<Self, Self::Error> {
		Self::from_raw(raw)
	}
}

/// Behavior of a send when the channel has no room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
	/// Reject the send with [`crate::SendError::Full`].
	#[default]
	Throw,
	/// Silently discard the new message.
	Drop,
	/// Suspend the sender until room is available.
	Block,
	/// Retry with exponentially growing delays, then give up with `Full`.
	Backoff,
	/// Evict the oldest queued message. Bounded channels only.
	Displace,
}

/// Retry schedule for [`OverflowPolicy::Backoff`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackoffConfig {
	/// First retry delay in milliseconds.
	pub initial_ms: u64,
	/// Upper bound for a single retry delay in milliseconds.
	pub max_delay_ms: u64,
	/// Retries attempted before giving up.
	pub max_attempts: u32,
}

impl BackoffConfig {
	pub fn initial(&self) -> Duration {
		Duration::from_millis(self.initial_ms.max(1))
	}

	pub fn max_delay(&self) -> Duration {
		Duration::from_millis(self.max_delay_ms.max(self.initial_ms).max(1))
	}
}

impl Default for BackoffConfig {
	fn default() -> Self {
		Self {
			initial_ms: 1,
			max_delay_ms: 64,
			max_attempts: 8,
		}
	}
}

/// Capacity and overflow behavior of one channel or actor mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MailboxConfig {
	pub capacity: Capacity,
	pub overflow: OverflowPolicy,
	pub backoff: BackoffConfig,
}

impl MailboxConfig {
	/// Unbounded mailbox; sends always enqueue.
	pub fn unbounded() -> Self {
		Self::default()
	}

	/// Bounded mailbox with the given overflow policy.
	///
	/// # Panics
	///
	/// Panics if `capacity` is zero; use [`MailboxConfig::rendezvous`] for
	/// transfer semantics.
	pub fn bounded(capacity: usize, overflow: OverflowPolicy) -> Self {
		assert!(capacity > 0, "bounded mailbox capacity must be > 0");
		Self {
			capacity: Capacity::Bounded(capacity),
			overflow,
			backoff: BackoffConfig::default(),
		}
	}

	/// Rendezvous mailbox with the given overflow policy.
	pub fn rendezvous(overflow: OverflowPolicy) -> Self {
		Self {
			capacity: Capacity::Rendezvous,
			overflow,
			backoff: BackoffConfig::default(),
		}
	}

	/// Replaces the backoff schedule.
	#[must_use]
	pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
		self.backoff = backoff;
		self
	}

	/// Checks capacity/policy combinations.
	pub fn validate(&self) -> Result<(), ChannelError> {
		match (self.capacity, self.overflow) {
			(Capacity::Bounded(0), _) => Err(ChannelError::InvalidCapacity(0)),
			(Capacity::Unbounded | Capacity::Rendezvous, OverflowPolicy::Displace) => Err(ChannelError::PolicyRequiresBound { policy: self.overflow }),
			_ => Ok(()),
		}
	}
}
