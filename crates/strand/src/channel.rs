//! Multi-producer, single-consumer channels with overflow policies.
//!
//! These are the mailboxes actors consume. Capacity and the behavior of a
//! send into a full channel come from [`MailboxConfig`]. Every wait is an
//! `.await`, so a blocked sender or receiver releases its worker thread.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::config::{Capacity, MailboxConfig, OverflowPolicy};
use crate::error::{ChannelError, SendError};

/// Result of a send that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
	/// Message was queued.
	Enqueued,
	/// Channel was full and the message was discarded (`Drop`).
	Dropped,
	/// Channel was full and the oldest queued message was evicted (`Displace`).
	Displaced,
	/// Channel is closed; the message was discarded.
	Closed,
}

struct ChannelState<T> {
	queue: VecDeque<T>,
	closed: bool,
	/// Receivers currently suspended in a receive. Only rendezvous channels care.
	waiting_receivers: usize,
}

struct Shared<T> {
	config: MailboxConfig,
	state: Mutex<ChannelState<T>>,
	notify_recv: Notify,
	notify_send: Notify,
	senders: AtomicUsize,
}

enum Offer<T> {
	Done(SendOutcome),
	Full(T),
}

impl<T> Shared<T> {
	fn has_room(&self, state: &ChannelState<T>) -> bool {
		match self.config.capacity {
			Capacity::Unbounded => true,
			Capacity::Rendezvous => state.queue.len() < state.waiting_receivers,
			Capacity::Bounded(n) => state.queue.len() < n,
		}
	}

	/// Single non-suspending enqueue attempt. `Block` and `Backoff` hand the
	/// message back when there is no room; the caller decides whether to wait.
	fn offer(&self, msg: T) -> Offer<T> {
		let mut state = self.state.lock();
		if state.closed {
			return Offer::Done(SendOutcome::Closed);
		}
		if self.has_room(&state) {
			state.queue.push_back(msg);
			drop(state);
			self.notify_recv.notify_one();
			return Offer::Done(SendOutcome::Enqueued);
		}
		match self.config.overflow {
			OverflowPolicy::Drop => Offer::Done(SendOutcome::Dropped),
			OverflowPolicy::Displace => {
				let _ = state.queue.pop_front();
				state.queue.push_back(msg);
				drop(state);
				self.notify_recv.notify_one();
				Offer::Done(SendOutcome::Displaced)
			}
			OverflowPolicy::Throw | OverflowPolicy::Block | OverflowPolicy::Backoff => Offer::Full(msg),
		}
	}

	fn close(&self) {
		let mut state = self.state.lock();
		if state.closed {
			return;
		}
		state.closed = true;
		drop(state);
		self.notify_recv.notify_waiters();
		self.notify_send.notify_waiters();
	}

	fn take_first(&self, pred: &mut impl FnMut(&T) -> bool) -> Option<T> {
		let mut state = self.state.lock();
		let idx = state.queue.iter().position(|msg| pred(msg))?;
		let msg = state.queue.remove(idx);
		drop(state);
		self.notify_send.notify_waiters();
		msg
	}
}

/// Sending half. Cloneable; the channel closes when the last sender drops.
pub struct Sender<T> {
	shared: Arc<Shared<T>>,
}

/// Receiving half. Single consumer; dropping it closes the channel.
pub struct Receiver<T> {
	shared: Arc<Shared<T>>,
}

/// Creates a channel configured by `config`.
pub fn channel<T>(config: &MailboxConfig) -> Result<(Sender<T>, Receiver<T>), ChannelError> {
	config.validate()?;
	let preallocate = match config.capacity {
		Capacity::Bounded(n) => n.min(1024),
		Capacity::Unbounded | Capacity::Rendezvous => 0,
	};
	let shared = Arc::new(Shared {
		config: *config,
		state: Mutex::new(ChannelState {
			queue: VecDeque::with_capacity(preallocate),
			closed: false,
			waiting_receivers: 0,
		}),
		notify_recv: Notify::new(),
		notify_send: Notify::new(),
		senders: AtomicUsize::new(1),
	});
	Ok((Sender { shared: Arc::clone(&shared) }, Receiver { shared }))
}

impl<T> Clone for Sender<T> {
	fn clone(&self) -> Self {
		self.shared.senders.fetch_add(1, Ordering::Relaxed);
		Self {
			shared: Arc::clone(&self.shared),
		}
	}
}

impl<T> Drop for Sender<T> {
	fn drop(&mut self) {
		if self.shared.senders.fetch_sub(1, Ordering::AcqRel) == 1 {
			self.shared.close();
		}
	}
}

impl<T> Drop for Receiver<T> {
	fn drop(&mut self) {
		self.shared.close();
	}
}

impl<T> Sender<T> {
	/// Sends honoring the overflow policy.
	///
	/// Only `Throw`, and `Backoff` once its retries are exhausted, reject the
	/// message. `Block` waits for room for as long as it takes.
	pub async fn send(&self, msg: T) -> Result<SendOutcome, SendError<T>> {
		self.send_until(msg, None).await
	}

	/// Like [`Self::send`], but a `Block`/`Backoff` wait gives up after
	/// `timeout` with [`SendError::Timeout`].
	pub async fn send_timeout(&self, msg: T, timeout: Duration) -> Result<SendOutcome, SendError<T>> {
		self.send_until(msg, Some(Instant::now() + timeout)).await
	}

	/// Sends, then yields so a receiver woken by the message can run right away.
	pub async fn send_sync(&self, msg: T) -> Result<SendOutcome, SendError<T>> {
		let outcome = self.send(msg).await?;
		tokio::task::yield_now().await;
		Ok(outcome)
	}

	/// Never suspends. `Block` and `Backoff` report [`SendError::Full`] when there is no room.
	pub fn try_send(&self, msg: T) -> Result<SendOutcome, SendError<T>> {
		match self.shared.offer(msg) {
			Offer::Done(outcome) => Ok(outcome),
			Offer::Full(msg) => Err(SendError::Full(msg)),
		}
	}

	/// Enqueues regardless of capacity and policy. Still discarded once closed.
	pub fn force_send(&self, msg: T) -> SendOutcome {
		let mut state = self.shared.state.lock();
		if state.closed {
			return SendOutcome::Closed;
		}
		state.queue.push_back(msg);
		drop(state);
		self.shared.notify_recv.notify_one();
		SendOutcome::Enqueued
	}

	async fn send_until(&self, msg: T, deadline: Option<Instant>) -> Result<SendOutcome, SendError<T>> {
		match self.shared.config.overflow {
			OverflowPolicy::Block => self.send_blocking(msg, deadline).await,
			OverflowPolicy::Backoff => self.send_backoff(msg, deadline).await,
			OverflowPolicy::Throw | OverflowPolicy::Drop | OverflowPolicy::Displace => self.try_send(msg),
		}
	}

	async fn send_blocking(&self, mut msg: T, deadline: Option<Instant>) -> Result<SendOutcome, SendError<T>> {
		loop {
			// Registered before the attempt so a receiver freeing room in between is not missed.
			let notified = self.shared.notify_send.notified();
			msg = match self.shared.offer(msg) {
				Offer::Done(outcome) => return Ok(outcome),
				Offer::Full(msg) => msg,
			};
			match deadline {
				None => notified.await,
				Some(deadline) => {
					if tokio::time::timeout_at(deadline, notified).await.is_err() {
						return match self.shared.offer(msg) {
							Offer::Done(outcome) => Ok(outcome),
							Offer::Full(msg) => Err(SendError::Timeout(msg)),
						};
					}
				}
			}
		}
	}

	async fn send_backoff(&self, mut msg: T, deadline: Option<Instant>) -> Result<SendOutcome, SendError<T>> {
		let backoff = self.shared.config.backoff;
		let mut delay = backoff.initial();
		let mut attempts = 0;
		loop {
			msg = match self.shared.offer(msg) {
				Offer::Done(outcome) => return Ok(outcome),
				Offer::Full(msg) => msg,
			};
			if attempts >= backoff.max_attempts {
				return Err(SendError::Full(msg));
			}
			if let Some(deadline) = deadline
				&& Instant::now().checked_add(delay).is_none_or(|wake| wake > deadline)
			{
				tokio::time::sleep_until(deadline).await;
				return match self.shared.offer(msg) {
					Offer::Done(outcome) => Ok(outcome),
					Offer::Full(msg) => Err(SendError::Timeout(msg)),
				};
			}
			attempts += 1;
			tokio::time::sleep(delay).await;
			delay = next_backoff(delay, backoff.max_delay());
		}
	}

	/// Closes the channel. Idempotent.
	pub fn close(&self) {
		self.shared.close();
	}

	pub fn is_closed(&self) -> bool {
		self.shared.state.lock().closed
	}

	pub fn len(&self) -> usize {
		self.shared.state.lock().queue.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn capacity(&self) -> Capacity {
		self.shared.config.capacity
	}

	pub fn config(&self) -> &MailboxConfig {
		&self.shared.config
	}

	/// Returns `true` if both senders feed the same channel.
	pub fn same_channel(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.shared, &other.shared)
	}
}

fn next_backoff(delay: Duration, max: Duration) -> Duration {
	delay.saturating_mul(2).min(max)
}

/// Counts a receiver as waiting for the lifetime of one receive call.
struct WaitingGuard<'a, T> {
	shared: &'a Shared<T>,
}

impl<'a, T> WaitingGuard<'a, T> {
	fn register(shared: &'a Shared<T>) -> Self {
		shared.state.lock().waiting_receivers += 1;
		// Rendezvous senders blocked on "no receiver" can retry now.
		shared.notify_send.notify_waiters();
		Self { shared }
	}
}

impl<T> Drop for WaitingGuard<'_, T> {
	fn drop(&mut self) {
		let mut state = self.shared.state.lock();
		state.waiting_receivers = state.waiting_receivers.saturating_sub(1);
	}
}

impl<T> Receiver<T> {
	/// Waits for the next message. `None` once closed and drained.
	pub async fn recv(&self) -> Option<T> {
		self.recv_matching(|_: &T| true, None).await
	}

	/// Like [`Self::recv`] but returns `None` after `timeout`. Nothing is closed.
	pub async fn recv_timeout(&self, timeout: Duration) -> Option<T> {
		self.recv_matching(|_: &T| true, Some(Instant::now() + timeout)).await
	}

	pub fn try_recv(&self) -> Option<T> {
		self.shared.take_first(&mut |_: &T| true)
	}

	/// Selective receive: takes the first queued message matching `pred` and
	/// leaves the others queued in order.
	pub async fn recv_where(&self, pred: impl FnMut(&T) -> bool) -> Option<T> {
		self.recv_matching(pred, None).await
	}

	pub async fn recv_where_timeout(&self, pred: impl FnMut(&T) -> bool, timeout: Duration) -> Option<T> {
		self.recv_matching(pred, Some(Instant::now() + timeout)).await
	}

	pub async fn recv_where_until(&self, pred: impl FnMut(&T) -> bool, deadline: Instant) -> Option<T> {
		self.recv_matching(pred, Some(deadline)).await
	}

	pub fn try_recv_where(&self, mut pred: impl FnMut(&T) -> bool) -> Option<T> {
		self.shared.take_first(&mut pred)
	}

	/// Removes every queued message matching `pred`, returning how many were removed.
	pub fn discard_where(&self, mut pred: impl FnMut(&T) -> bool) -> usize {
		let mut state = self.shared.state.lock();
		let before = state.queue.len();
		state.queue.retain(|msg| !pred(msg));
		let removed = before - state.queue.len();
		drop(state);
		if removed > 0 {
			self.shared.notify_send.notify_waiters();
		}
		removed
	}

	async fn recv_matching(&self, mut pred: impl FnMut(&T) -> bool, deadline: Option<Instant>) -> Option<T> {
		let mut waiting = None;
		loop {
			let notified = self.shared.notify_recv.notified();
			if let Some(msg) = self.shared.take_first(&mut pred) {
				return Some(msg);
			}
			if self.shared.state.lock().closed {
				return None;
			}
			if waiting.is_none() {
				waiting = Some(WaitingGuard::register(&self.shared));
			}
			match deadline {
				None => notified.await,
				Some(deadline) => {
					if tokio::time::timeout_at(deadline, notified).await.is_err() {
						return self.shared.take_first(&mut pred);
					}
				}
			}
		}
	}

	/// Closes the channel. Queued messages stay receivable.
	pub fn close(&self) {
		self.shared.close();
	}

	pub fn is_closed(&self) -> bool {
		self.shared.state.lock().closed
	}

	pub fn len(&self) -> usize {
		self.shared.state.lock().queue.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn capacity(&self) -> Capacity {
		self.shared.config.capacity
	}
}

impl<T> fmt::Debug for Sender<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Sender").field("config", &self.shared.config).finish_non_exhaustive()
	}
}

impl<T> fmt::Debug for Receiver<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Receiver").field("config", &self.shared.config).finish_non_exhaustive()
	}
}
