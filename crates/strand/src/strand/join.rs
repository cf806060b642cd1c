use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;

use crate::error::StrandError;

/// How the strand's task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum JoinOutcome {
	Completed,
	Panicked(String),
	Cancelled,
}

impl From<JoinError> for JoinOutcome {
	fn from(err: JoinError) -> Self {
		if err.is_panic() {
			Self::Panicked(panic_message(err.into_panic()))
		} else {
			Self::Cancelled
		}
	}
}

/// Extracts a readable message from a panic payload.
pub fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
	match payload.downcast::<&'static str>() {
		Ok(msg) => (*msg).to_string(),
		Err(payload) => match payload.downcast::<String>() {
			Ok(msg) => *msg,
			Err(_) => "non-string panic payload".to_string(),
		},
	}
}

/// Join coordination state machine for one strand task.
///
/// Only one caller at a time owns the join handle; every other caller waits
/// on `done` until the owner records the outcome or hands the handle back.
enum JoinState {
	/// The strand has not been submitted to the worker pool.
	Unstarted,
	/// Task is running and nobody is awaiting its handle.
	Running(JoinHandle<()>),
	/// A caller is currently awaiting the handle.
	Joining,
	/// Task has completed.
	Done(JoinOutcome),
}

pub(super) struct JoinCtrl {
	state: Mutex<JoinState>,
	done: Notify,
}

/// Returns the handle to the state machine if the owning join is dropped or
/// times out before the task completes.
struct Lease<'a> {
	ctrl: &'a JoinCtrl,
	handle: Option<JoinHandle<()>>,
}

impl Drop for Lease<'_> {
	fn drop(&mut self) {
		if let Some(handle) = self.handle.take() {
			*self.ctrl.state.lock() = JoinState::Running(handle);
			self.ctrl.done.notify_waiters();
		}
	}
}

impl JoinCtrl {
	pub(super) fn new() -> Self {
		Self {
			state: Mutex::new(JoinState::Unstarted),
			done: Notify::new(),
		}
	}

	pub(super) fn attach(&self, handle: JoinHandle<()>) {
		*self.state.lock() = JoinState::Running(handle);
	}

	/// Waits for the task, optionally bounded by `deadline`.
	///
	/// Returns `Ok(None)` when the deadline passes first. Multiple callers are safe.
	pub(super) async fn wait(&self, deadline: Option<Instant>) -> Result<Option<JoinOutcome>, StrandError> {
		loop {
			// Registered before inspecting state so a concurrent completion is not missed.
			let notified = self.done.notified();
			let handle = {
				let mut st = self.state.lock();
				match &*st {
					JoinState::Unstarted => return Err(StrandError::NotStarted),
					JoinState::Done(outcome) => return Ok(Some(outcome.clone())),
					JoinState::Joining => None,
					JoinState::Running(_) => match std::mem::replace(&mut *st, JoinState::Joining) {
						JoinState::Running(handle) => Some(handle),
						_ => None,
					},
				}
			};

			let Some(handle) = handle else {
				match deadline {
					None => notified.await,
					Some(deadline) => {
						if tokio::time::timeout_at(deadline, notified).await.is_err() {
							return Ok(None);
						}
					}
				}
				continue;
			};

			let mut lease = Lease { ctrl: self, handle: Some(handle) };
			let Some(running) = lease.handle.as_mut() else {
				continue;
			};
			let result = match deadline {
				None => running.await,
				Some(deadline) => match tokio::time::timeout_at(deadline, running).await {
					Ok(result) => result,
					// Lease drop puts the handle back for the next joiner.
					Err(_) => return Ok(None),
				},
			};
			lease.handle = None;

			let outcome = match result {
				Ok(()) => JoinOutcome::Completed,
				Err(err) => JoinOutcome::from(err),
			};
			*self.state.lock() = JoinState::Done(outcome.clone());
			self.done.notify_waiters();
			return Ok(Some(outcome));
		}
	}
}
