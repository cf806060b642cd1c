//! Error types for strands and channels.

use std::fmt;

use thiserror::Error;

use crate::config::OverflowPolicy;

/// Errors surfaced by strand lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrandError {
	/// `start` was called on a strand that already left the NEW state.
	#[error("strand already started")]
	AlreadyStarted,
	/// `join` was called on a strand that was never started.
	#[error("strand not started")]
	NotStarted,
	/// The strand's output was already taken by an earlier `join`.
	#[error("strand result already taken")]
	ResultTaken,
	/// The computation panicked; carries the panic payload message.
	#[error("strand panicked: {0}")]
	Panicked(String),
	/// The host runtime dropped the computation before it finished.
	#[error("strand cancelled")]
	Cancelled,
	/// The worker pool could not be built.
	#[error("failed to build scheduler runtime: {0}")]
	Runtime(String),
}

/// Returned from a suspension point when the strand was interrupted.
///
/// Observing the interrupt clears the strand's interrupt flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("strand interrupted")]
pub struct Interrupted;

/// Invalid channel configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
	#[error("invalid mailbox capacity {0} (expected -1, 0 or a positive size)")]
	InvalidCapacity(i64),
	#[error("overflow policy {policy:?} requires a bounded capacity")]
	PolicyRequiresBound { policy: OverflowPolicy },
}

/// Rejected send. The message is handed back to the caller.
#[derive(Clone, PartialEq, Eq, Error)]
pub enum SendError<T> {
	/// No room and the overflow policy gave up (`Throw`, exhausted `Backoff`,
	/// or a non-suspending send under `Block`).
	#[error("channel full")]
	Full(T),
	/// A bounded wait for room elapsed.
	#[error("send timed out")]
	Timeout(T),
}

impl<T> SendError<T> {
	/// Recovers the rejected message.
	pub fn into_inner(self) -> T {
		match self {
			Self::Full(msg) | Self::Timeout(msg) => msg,
		}
	}

	/// Maps the carried message, keeping the error kind.
	pub fn map<U>(self, f: impl FnOnce(T) -> U) -> SendError<U> {
		match self {
			Self::Full(msg) => SendError::Full(f(msg)),
			Self::Timeout(msg) => SendError::Timeout(f(msg)),
		}
	}

	pub fn is_full(&self) -> bool {
		matches!(self, Self::Full(_))
	}

	pub fn is_timeout(&self) -> bool {
		matches!(self, Self::Timeout(_))
	}
}

impl<T> fmt::Debug for SendError<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Full(_) => f.write_str("Full(..)"),
			Self::Timeout(_) => f.write_str("Timeout(..)"),
		}
	}
}
