//! Strands: lightweight, cooperatively scheduled computations.
//!
//! A strand is a tokio task with an identity, an observable state, an
//! interrupt flag and a park/unpark primitive. Its computation receives an
//! explicit [`StrandContext`]; every suspension goes through that context so
//! the strand's state and interrupt flag stay accurate.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::{Interrupted, StrandError};
use crate::id::IdClock;

mod join;

pub use join::panic_message;
use join::{JoinCtrl, JoinOutcome};

static STRAND_IDS: IdClock = IdClock::new();

tokio::task_local! {
	/// Identity of the strand whose task is being polled.
	static CURRENT_STRAND: StrandId;
}

/// Process-unique strand identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StrandId(u64);

impl StrandId {
	pub const fn as_u64(self) -> u64 {
		self.0
	}
}

impl fmt::Display for StrandId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "strand-{}", self.0)
	}
}

/// Scheduling state of a strand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StrandState {
	/// Created, not yet submitted to the worker pool.
	New = 0,
	/// Submitted; running or ready to run.
	Runnable = 1,
	/// Suspended at a park or other suspension point.
	Waiting = 2,
	/// Finished, panicked or cancelled. Irreversible.
	Terminated = 3,
}

impl StrandState {
	fn from_u8(raw: u8) -> Self {
		match raw {
			0 => Self::New,
			1 => Self::Runnable,
			2 => Self::Waiting,
			_ => Self::Terminated,
		}
	}
}

/// Result of a timed park.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParkOutcome {
	Unparked,
	TimedOut,
}

pub(crate) struct StrandCore {
	id: StrandId,
	name: String,
	state: AtomicU8,
	interrupted: AtomicBool,
	wake: Notify,
}

impl StrandCore {
	fn new(name: String) -> Self {
		Self {
			id: StrandId(STRAND_IDS.next()),
			name,
			state: AtomicU8::new(StrandState::New as u8),
			interrupted: AtomicBool::new(false),
			wake: Notify::new(),
		}
	}

	fn state(&self) -> StrandState {
		StrandState::from_u8(self.state.load(Ordering::Acquire))
	}

	/// Moves to `to` unless already terminated.
	fn transition(&self, to: StrandState) {
		let _ = self
			.state
			.fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| (cur != StrandState::Terminated as u8).then_some(to as u8));
	}

	fn terminate(&self) {
		self.state.store(StrandState::Terminated as u8, Ordering::Release);
	}

	/// Consumes a pending interrupt.
	fn take_interrupt(&self) -> bool {
		self.interrupted.swap(false, Ordering::AcqRel)
	}

	fn unpark(&self) {
		if self.state() == StrandState::Waiting {
			self.wake.notify_waiters();
		}
	}

	fn interrupt(&self) {
		if self.state() == StrandState::Terminated {
			return;
		}
		self.interrupted.store(true, Ordering::Release);
		self.wake.notify_waiters();
	}
}

/// Marks the strand terminated however its task ends.
struct TerminateOnDrop(Arc<StrandCore>);

impl Drop for TerminateOnDrop {
	fn drop(&mut self) {
		self.0.terminate();
	}
}

/// Cloneable control handle for a strand.
#[derive(Clone)]
pub struct StrandRef {
	core: Arc<StrandCore>,
}

impl StrandRef {
	pub fn id(&self) -> StrandId {
		self.core.id
	}

	pub fn name(&self) -> &str {
		&self.core.name
	}

	pub fn state(&self) -> StrandState {
		self.core.state()
	}

	pub fn is_interrupted(&self) -> bool {
		self.core.interrupted.load(Ordering::Acquire)
	}

	/// Resumes the strand if it is parked. Swallowed in any other state.
	pub fn unpark(&self) {
		self.core.unpark();
	}

	/// Sets the interrupt flag and forces an unpark. No-op once terminated.
	pub fn interrupt(&self) {
		self.core.interrupt();
	}
}

impl fmt::Debug for StrandRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("StrandRef")
			.field("id", &self.core.id)
			.field("name", &self.core.name)
			.field("state", &self.core.state())
			.finish()
	}
}

impl PartialEq for StrandRef {
	fn eq(&self, other: &Self) -> bool {
		self.core.id == other.core.id
	}
}

impl Eq for StrandRef {}

/// Execution context handed to a strand's computation.
///
/// Suspension operations must be awaited on the strand that owns the
/// context; awaiting them anywhere else is a programming error and panics.
pub struct StrandContext {
	core: Arc<StrandCore>,
}

impl StrandContext {
	pub fn id(&self) -> StrandId {
		self.core.id
	}

	pub fn name(&self) -> &str {
		&self.core.name
	}

	/// Control handle for this strand.
	pub fn handle(&self) -> StrandRef {
		StrandRef {
			core: Arc::clone(&self.core),
		}
	}

	/// Returns the interrupt flag without clearing it.
	pub fn is_interrupted(&self) -> bool {
		self.core.interrupted.load(Ordering::Acquire)
	}

	/// Consumes a pending interrupt without suspending.
	pub fn check_interrupt(&self) -> Result<(), Interrupted> {
		if self.core.take_interrupt() { Err(Interrupted) } else { Ok(()) }
	}

	/// Parks until unparked or interrupted.
	pub async fn park(&self) -> Result<(), Interrupted> {
		self.park_inner(None).await.map(|_| ())
	}

	/// Parks until unparked, interrupted, or `timeout` elapses.
	pub async fn park_timeout(&self, timeout: Duration) -> Result<ParkOutcome, Interrupted> {
		self.park_inner(Some(timeout)).await
	}

	async fn park_inner(&self, timeout: Option<Duration>) -> Result<ParkOutcome, Interrupted> {
		self.assert_current();
		let notified = self.core.wake.notified();
		tokio::pin!(notified);
		notified.as_mut().enable();
		self.core.transition(StrandState::Waiting);
		if self.core.take_interrupt() {
			self.core.transition(StrandState::Runnable);
			return Err(Interrupted);
		}

		let outcome = match timeout {
			None => {
				notified.await;
				ParkOutcome::Unparked
			}
			Some(timeout) => match tokio::time::timeout(timeout, notified).await {
				Ok(()) => ParkOutcome::Unparked,
				Err(_) => ParkOutcome::TimedOut,
			},
		};
		self.core.transition(StrandState::Runnable);
		self.check_interrupt()?;
		Ok(outcome)
	}

	/// Awaits `fut` as a suspension point: the strand is WAITING meanwhile and
	/// an interrupt abandons the wait.
	pub async fn suspend<F>(&self, fut: F) -> Result<F::Output, Interrupted>
	where
		F: Future,
	{
		self.assert_current();
		self.check_interrupt()?;
		self.core.transition(StrandState::Waiting);
		tokio::pin!(fut);
		let result = loop {
			let notified = self.core.wake.notified();
			tokio::pin!(notified);
			notified.as_mut().enable();
			if self.core.take_interrupt() {
				break Err(Interrupted);
			}
			tokio::select! {
				biased;
				out = &mut fut => break Ok(out),
				() = &mut notified => {}
			}
		};
		self.core.transition(StrandState::Runnable);
		result
	}

	/// Like [`Self::suspend`] but gives up after `timeout`, returning `Ok(None)`.
	pub async fn suspend_timeout<F>(&self, fut: F, timeout: Duration) -> Result<Option<F::Output>, Interrupted>
	where
		F: Future,
	{
		self.suspend_until(fut, Instant::now() + timeout).await
	}

	/// Like [`Self::suspend`] but gives up at `deadline`, returning `Ok(None)`.
	pub async fn suspend_until<F>(&self, fut: F, deadline: Instant) -> Result<Option<F::Output>, Interrupted>
	where
		F: Future,
	{
		Ok(self.suspend(tokio::time::timeout_at(deadline, fut)).await?.ok())
	}

	/// Interruptible sleep.
	pub async fn sleep(&self, duration: Duration) -> Result<(), Interrupted> {
		self.suspend(tokio::time::sleep(duration)).await
	}

	/// Cooperatively yields the worker to other runnable strands.
	pub async fn yield_now(&self) {
		self.assert_current();
		tokio::task::yield_now().await;
	}

	fn assert_current(&self) {
		let on_own_strand = CURRENT_STRAND.try_with(|id| *id == self.core.id).unwrap_or(false);
		assert!(on_own_strand, "{} ({}) suspended outside its own execution context", self.core.id, self.core.name);
	}
}

impl fmt::Debug for StrandContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("StrandContext").field("id", &self.core.id).field("name", &self.core.name).finish()
	}
}

type PendingTask = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Owning handle for a strand: starts it and joins its output.
///
/// Dropping the handle detaches a running strand; it keeps running.
pub struct Strand<T> {
	core: Arc<StrandCore>,
	runtime: Handle,
	pending: Mutex<Option<PendingTask>>,
	output: Arc<Mutex<Option<T>>>,
	join: JoinCtrl,
}

impl<T> Strand<T>
where
	T: Send + 'static,
{
	pub(crate) fn new<F, Fut>(runtime: Handle, name: String, computation: F) -> Self
	where
		F: FnOnce(StrandContext) -> Fut + Send + 'static,
		Fut: Future<Output = T> + Send + 'static,
	{
		let core = Arc::new(StrandCore::new(name));
		let output = Arc::new(Mutex::new(None));
		let ctx = StrandContext { core: Arc::clone(&core) };
		let task_core = Arc::clone(&core);
		let task_output = Arc::clone(&output);
		let task: PendingTask = Box::pin(async move {
			let _terminated = TerminateOnDrop(task_core);
			let out = computation(ctx).await;
			*task_output.lock() = Some(out);
		});
		tracing::trace!(strand = core.id.0, name = %core.name, "skein.strand.spawn");

		Self {
			core,
			runtime,
			pending: Mutex::new(Some(task)),
			output,
			join: JoinCtrl::new(),
		}
	}

	pub fn id(&self) -> StrandId {
		self.core.id
	}

	pub fn name(&self) -> &str {
		&self.core.name
	}

	pub fn state(&self) -> StrandState {
		self.core.state()
	}

	/// Cloneable control handle.
	pub fn handle(&self) -> StrandRef {
		StrandRef {
			core: Arc::clone(&self.core),
		}
	}

	/// Submits the strand to the worker pool (NEW → RUNNABLE).
	pub fn start(&self) -> Result<(), StrandError> {
		let Some(task) = self.pending.lock().take() else {
			return Err(StrandError::AlreadyStarted);
		};
		self.core.transition(StrandState::Runnable);
		tracing::trace!(strand = self.core.id.0, name = %self.core.name, "skein.strand.start");
		let handle = self.runtime.spawn(CURRENT_STRAND.scope(self.core.id, task));
		self.join.attach(handle);
		Ok(())
	}

	pub fn unpark(&self) {
		self.core.unpark();
	}

	pub fn interrupt(&self) {
		self.core.interrupt();
	}

	/// Waits for the strand to finish and takes its output.
	///
	/// Safe to call from several tasks at once; only the first caller to
	/// observe completion receives the output, later ones get
	/// [`StrandError::ResultTaken`].
	pub async fn join(&self) -> Result<T, StrandError> {
		let Some(outcome) = self.join.wait(None).await? else {
			unreachable!("untimed join returned without an outcome");
		};
		self.finish(outcome)
	}

	/// Like [`Self::join`] but returns `Ok(None)` if the strand is still running after `timeout`.
	pub async fn join_timeout(&self, timeout: Duration) -> Result<Option<T>, StrandError> {
		match self.join.wait(Some(Instant::now() + timeout)).await? {
			Some(outcome) => self.finish(outcome).map(Some),
			None => Ok(None),
		}
	}

	fn finish(&self, outcome: JoinOutcome) -> Result<T, StrandError> {
		match outcome {
			JoinOutcome::Completed => self.output.lock().take().ok_or(StrandError::ResultTaken),
			JoinOutcome::Panicked(msg) => Err(StrandError::Panicked(msg)),
			JoinOutcome::Cancelled => Err(StrandError::Cancelled),
		}
	}
}

impl<T> fmt::Debug for Strand<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Strand")
			.field("id", &self.core.id)
			.field("name", &self.core.name)
			.field("state", &self.core.state())
			.finish()
	}
}
