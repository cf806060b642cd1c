//! Lossy multi-consumer ticker channel.
//!
//! Producers never wait. The buffer is a fixed ring that displaces its oldest
//! entry when full; each consumer reads at its own pace and a slow one skips
//! what was overwritten. No consumer sees a message twice or out of order.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use crate::channel::SendOutcome;

/// Creates a ticker channel buffering at most `capacity` messages, rounded up
/// to a power of two.
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub fn ticker<T: Clone + Send + 'static>(capacity: usize) -> TickerSender<T> {
	assert!(capacity > 0, "ticker capacity must be > 0");
	let (tx, _) = broadcast::channel(capacity);
	TickerSender {
		tx: Arc::new(Mutex::new(Some(tx))),
	}
}

/// Producer side of a ticker channel. Cloneable.
#[derive(Clone)]
pub struct TickerSender<T> {
	tx: Arc<Mutex<Option<broadcast::Sender<T>>>>,
}

impl<T: Clone + Send + 'static> TickerSender<T> {
	/// Appends a message, displacing the oldest one if the ring is full.
	///
	/// Returns `Closed` once [`Self::close`] has been called. A message sent
	/// while no consumer is subscribed is still reported `Enqueued`; nobody
	/// will ever read it.
	pub fn send(&self, msg: T) -> SendOutcome {
		match self.tx.lock().as_ref() {
			Some(tx) => {
				let _ = tx.send(msg);
				SendOutcome::Enqueued
			}
			None => SendOutcome::Closed,
		}
	}

	/// Creates a consumer that starts at the next message sent.
	pub fn subscribe(&self) -> TickerConsumer<T> {
		TickerConsumer {
			rx: self.tx.lock().as_ref().map(broadcast::Sender::subscribe),
			skipped: 0,
		}
	}

	/// Closes the ticker. Consumers drain what they still hold, then see `None`.
	pub fn close(&self) {
		self.tx.lock().take();
	}

	pub fn is_closed(&self) -> bool {
		self.tx.lock().is_none()
	}

	pub fn consumer_count(&self) -> usize {
		self.tx.lock().as_ref().map_or(0, broadcast::Sender::receiver_count)
	}
}

/// Independent reader of a ticker channel.
pub struct TickerConsumer<T> {
	rx: Option<broadcast::Receiver<T>>,
	skipped: u64,
}

impl<T: Clone + Send + 'static> TickerConsumer<T> {
	/// Waits for the next message this consumer has not seen. `None` once closed and drained.
	pub async fn recv(&mut self) -> Option<T> {
		let rx = self.rx.as_mut()?;
		loop {
			match rx.recv().await {
				Ok(msg) => return Some(msg),
				Err(RecvError::Lagged(n)) => self.skipped += n,
				Err(RecvError::Closed) => return None,
			}
		}
	}

	/// Like [`Self::recv`] but returns `None` after `timeout`.
	pub async fn recv_timeout(&mut self, timeout: Duration) -> Option<T> {
		tokio::time::timeout(timeout, self.recv()).await.ok().flatten()
	}

	pub fn try_recv(&mut self) -> Option<T> {
		let rx = self.rx.as_mut()?;
		loop {
			match rx.try_recv() {
				Ok(msg) => return Some(msg),
				Err(TryRecvError::Lagged(n)) => self.skipped += n,
				Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
			}
		}
	}

	/// Messages this consumer missed because the ring overwrote them.
	pub fn skipped(&self) -> u64 {
		self.skipped
	}
}
