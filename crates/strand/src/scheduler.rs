use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};

use crate::config::SchedulerConfig;
use crate::error::StrandError;
use crate::strand::{Strand, StrandContext};

/// Fixed pool of worker threads that strands are multiplexed over.
///
/// Cloning is cheap; clones share the same pool.
#[derive(Clone)]
pub struct Scheduler {
	handle: Handle,
	/// Set when this scheduler built (and therefore owns) its runtime.
	runtime: Option<Arc<Runtime>>,
}

impl Scheduler {
	/// Builds a dedicated multi-thread pool.
	pub fn new(config: &SchedulerConfig) -> Result<Self, StrandError> {
		let runtime = Builder::new_multi_thread()
			.enable_all()
			.worker_threads(config.worker_threads.max(1))
			.thread_name(config.thread_name.clone())
			.build()
			.map_err(|err| StrandError::Runtime(err.to_string()))?;
		tracing::debug!(workers = config.worker_threads.max(1), thread_name = %config.thread_name, "skein.scheduler.start");
		Ok(Self {
			handle: runtime.handle().clone(),
			runtime: Some(Arc::new(runtime)),
		})
	}

	/// Reuses the ambient tokio runtime, falling back to a lazily built
	/// process-wide pool when called outside one.
	pub fn current() -> Self {
		Self::from_handle(runtime_handle())
	}

	/// Wraps an existing runtime. The caller keeps ownership of it.
	pub fn from_handle(handle: Handle) -> Self {
		Self { handle, runtime: None }
	}

	/// Creates a strand in the NEW state. Nothing runs until [`Strand::start`].
	pub fn spawn<F, Fut, T>(&self, name: impl Into<String>, computation: F) -> Strand<T>
	where
		F: FnOnce(StrandContext) -> Fut + Send + 'static,
		Fut: Future<Output = T> + Send + 'static,
		T: Send + 'static,
	{
		Strand::new(self.handle.clone(), name.into(), computation)
	}

	/// Creates and starts a strand.
	pub fn spawn_started<F, Fut, T>(&self, name: impl Into<String>, computation: F) -> Result<Strand<T>, StrandError>
	where
		F: FnOnce(StrandContext) -> Fut + Send + 'static,
		Fut: Future<Output = T> + Send + 'static,
		T: Send + 'static,
	{
		let strand = self.spawn(name, computation);
		strand.start()?;
		Ok(strand)
	}

	/// Drives `fut` to completion from a non-async thread.
	///
	/// # Panics
	///
	/// Panics when called from inside the pool's own worker threads.
	pub fn block_on<F: Future>(&self, fut: F) -> F::Output {
		self.handle.block_on(fut)
	}

	pub fn handle(&self) -> &Handle {
		&self.handle
	}

	/// Number of native worker threads in the pool.
	pub fn worker_threads(&self) -> usize {
		self.handle.metrics().num_workers()
	}

	/// Shuts down an owned pool, waiting up to `timeout` for running strands.
	///
	/// No-op for borrowed runtimes or while other clones are alive.
	pub fn shutdown(self, timeout: Duration) {
		if let Some(runtime) = self.runtime.and_then(|rt| Arc::try_unwrap(rt).ok()) {
			runtime.shutdown_timeout(timeout);
		}
	}
}

impl std::fmt::Debug for Scheduler {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Scheduler").field("owned", &self.runtime.is_some()).finish_non_exhaustive()
	}
}

fn runtime_handle() -> Handle {
	if let Ok(handle) = Handle::try_current() {
		return handle;
	}

	static GLOBAL_RT: OnceLock<Runtime> = OnceLock::new();
	let runtime = GLOBAL_RT.get_or_init(|| {
		let config = SchedulerConfig::default();
		Builder::new_multi_thread()
			.enable_all()
			.worker_threads(config.worker_threads.max(1))
			.thread_name(format!("{}-global", config.thread_name))
			.build()
			.expect("failed to build skein global tokio runtime")
	});
	runtime.handle().clone()
}
