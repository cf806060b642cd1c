use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use skein_strand::{MailboxConfig, Scheduler};

use crate::actor::{Actor, ActorSpec};
use crate::cell::{ActorRef, AnyActorRef};
use crate::config::SkeinConfig;
use crate::error::{ActorError, ConfigError};
use crate::metrics::{ActorMetrics, NoopMetrics};
use crate::registry::Registry;
use crate::runner::spawn_actor;
use crate::supervisor::{SupervisorRef, SupervisorSpec};

/// State every actor of one system points back to.
pub(crate) struct SystemShared {
	pub(crate) registry: Registry,
	pub(crate) metrics: Arc<dyn ActorMetrics>,
}

/// Entry point: a scheduler, the runtime configuration, a name registry and a metrics sink.
///
/// Cloning is cheap. Names registered in one system are invisible to another.
#[derive(Clone)]
pub struct ActorSystem {
	scheduler: Scheduler,
	config: Arc<SkeinConfig>,
	shared: Arc<SystemShared>,
}

impl ActorSystem {
	/// Builds a system with its own worker pool.
	///
	/// Drop it (or call [`Self::shutdown`]) from outside the pool's threads.
	pub fn new(config: SkeinConfig) -> Result<Self, ActorError> {
		let scheduler = Scheduler::new(&config.scheduler)?;
		Ok(Self::with_scheduler(scheduler, config))
	}

	/// Loads the configuration from a TOML file and builds a system from it.
	pub fn from_config_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
		let config = SkeinConfig::load(path)?;
		let scheduler = Scheduler::new(&config.scheduler)?;
		Ok(Self::with_scheduler(scheduler, config))
	}

	/// Runs on the ambient tokio runtime with default configuration.
	pub fn current() -> Self {
		Self::with_scheduler(Scheduler::current(), SkeinConfig::default())
	}

	pub fn with_scheduler(scheduler: Scheduler, config: SkeinConfig) -> Self {
		Self {
			scheduler,
			config: Arc::new(config),
			shared: Arc::new(SystemShared {
				registry: Registry::default(),
				metrics: Arc::new(NoopMetrics),
			}),
		}
	}

	/// Installs a metrics sink. Only actors spawned afterwards report to it.
	#[must_use]
	pub fn with_metrics(self, metrics: Arc<dyn ActorMetrics>) -> Self {
		Self {
			shared: Arc::new(SystemShared {
				registry: Registry::default(),
				metrics,
			}),
			..self
		}
	}

	pub fn config(&self) -> &SkeinConfig {
		&self.config
	}

	pub fn scheduler(&self) -> &Scheduler {
		&self.scheduler
	}

	pub(crate) fn shared(&self) -> &Arc<SystemShared> {
		&self.shared
	}

	/// Copy handed to actors. It borrows the pool instead of owning it, so an
	/// actor outliving every user handle never drops the runtime on its own thread.
	pub(crate) fn detached(&self) -> Self {
		Self {
			scheduler: Scheduler::from_handle(self.scheduler.handle().clone()),
			config: Arc::clone(&self.config),
			shared: Arc::clone(&self.shared),
		}
	}

	/// Spawns an anonymous actor with the default mailbox.
	pub fn spawn<A: Actor>(&self, actor: A) -> Result<ActorRef<A::Msg>, ActorError> {
		spawn_actor(self, String::new(), actor, &self.config.mailbox)
	}

	pub fn spawn_named<A: Actor>(&self, name: impl Into<String>, actor: A) -> Result<ActorRef<A::Msg>, ActorError> {
		spawn_actor(self, name.into(), actor, &self.config.mailbox)
	}

	pub fn spawn_with<A: Actor>(&self, name: impl Into<String>, actor: A, mailbox: MailboxConfig) -> Result<ActorRef<A::Msg>, ActorError> {
		spawn_actor(self, name.into(), actor, &mailbox)
	}

	/// Spawns a fresh instance built from `spec`.
	pub fn spawn_spec<A: Actor>(&self, spec: &ActorSpec<A>) -> Result<ActorRef<A::Msg>, ActorError> {
		let mailbox = spec.mailbox.unwrap_or(self.config.mailbox);
		spawn_actor(self, spec.name.clone(), spec.build(), &mailbox)
	}

	/// Spawns a supervisor and starts its initial children in order.
	pub fn supervisor(&self, spec: SupervisorSpec) -> Result<SupervisorRef, ActorError> {
		SupervisorRef::spawn(self, spec)
	}

	/// Live actor registered under `name`.
	pub fn whereis(&self, name: &str) -> Option<AnyActorRef> {
		self.shared.registry.whereis(name)
	}

	/// Like [`Self::whereis`] but also checks the message type.
	pub fn whereis_typed<M: Send + 'static>(&self, name: &str) -> Option<ActorRef<M>> {
		self.whereis(name)?.downcast()
	}

	/// Names of live registered actors, sorted.
	pub fn registered(&self) -> Vec<String> {
		self.shared.registry.names()
	}

	/// Shuts down an owned worker pool, giving running strands up to `timeout`.
	pub fn shutdown(self, timeout: Duration) {
		self.scheduler.shutdown(timeout);
	}
}

impl fmt::Debug for ActorSystem {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ActorSystem")
			.field("scheduler", &self.scheduler)
			.field("registered", &self.registered())
			.finish_non_exhaustive()
	}
}
