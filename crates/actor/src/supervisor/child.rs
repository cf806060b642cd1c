use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::actor::{Actor, ActorSpec};
use crate::cell::AnyActorRef;
use crate::config::SupervisorDefaults;
use crate::error::ActorError;
use crate::lifecycle::WatchId;
use crate::supervisor::history::RestartHistory;
use crate::supervisor::{SupervisorRef, SupervisorSpec};
use crate::system::ActorSystem;

/// Whether a dead child is brought back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestartMode {
	/// Always restarted.
	#[default]
	Permanent,
	/// Restarted only after an abnormal exit.
	Transient,
	/// Never restarted; removed from the supervisor once dead.
	Temporary,
}

/// Starts one incarnation of a child.
pub(crate) trait ChildFactory: Send + Sync + 'static {
	fn start(&self, system: &ActorSystem) -> Result<AnyActorRef, ActorError>;
}

struct ActorFactory<A>(ActorSpec<A>);

impl<A: Actor> ChildFactory for ActorFactory<A> {
	fn start(&self, system: &ActorSystem) -> Result<AnyActorRef, ActorError> {
		system.spawn_spec(&self.0).map(AnyActorRef::from)
	}
}

struct NestedSupervisor(SupervisorSpec);

impl ChildFactory for NestedSupervisor {
	fn start(&self, system: &ActorSystem) -> Result<AnyActorRef, ActorError> {
		SupervisorRef::spawn(system, self.0.clone()).map(|supervisor| supervisor.actor_ref().erase())
	}
}

/// How a supervisor starts and restarts one child.
#[derive(Clone)]
pub struct ChildSpec {
	pub(crate) id: String,
	pub(crate) mode: RestartMode,
	max_restarts: Option<usize>,
	window: Option<Duration>,
	shutdown_timeout: Option<Duration>,
	pub(crate) factory: Arc<dyn ChildFactory>,
}

impl ChildSpec {
	/// Child built from an actor spec; its id defaults to the spec name.
	pub fn new<A: Actor>(spec: ActorSpec<A>) -> Self {
		Self::from_factory(spec.name.clone(), Arc::new(ActorFactory(spec)))
	}

	/// Nested supervisor child, forming a tree.
	pub fn supervisor(spec: SupervisorSpec) -> Self {
		Self::from_factory(spec.name.clone(), Arc::new(NestedSupervisor(spec)))
	}

	fn from_factory(id: String, factory: Arc<dyn ChildFactory>) -> Self {
		Self {
			id,
			mode: RestartMode::default(),
			max_restarts: None,
			window: None,
			shutdown_timeout: None,
			factory,
		}
	}

	#[must_use]
	pub fn id(mut self, id: impl Into<String>) -> Self {
		self.id = id.into();
		self
	}

	#[must_use]
	pub fn mode(mut self, mode: RestartMode) -> Self {
		self.mode = mode;
		self
	}

	#[must_use]
	pub fn max_restarts(mut self, max_restarts: usize) -> Self {
		self.max_restarts = Some(max_restarts);
		self
	}

	#[must_use]
	pub fn window(mut self, window: Duration) -> Self {
		self.window = Some(window);
		self
	}

	/// Grace period for each of the two waits when stopping this child.
	#[must_use]
	pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
		self.shutdown_timeout = Some(timeout);
		self
	}

	pub fn child_id(&self) -> &str {
		&self.id
	}

	pub(crate) fn resolve_max_restarts(&self, defaults: &SupervisorDefaults) -> usize {
		self.max_restarts.unwrap_or(defaults.max_restarts)
	}

	pub(crate) fn resolve_window(&self, defaults: &SupervisorDefaults) -> Duration {
		self.window.unwrap_or_else(|| defaults.window())
	}

	pub(crate) fn resolve_shutdown_timeout(&self, defaults: &SupervisorDefaults) -> Duration {
		self.shutdown_timeout.unwrap_or_else(|| defaults.shutdown_timeout())
	}
}

impl fmt::Debug for ChildSpec {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ChildSpec")
			.field("id", &self.id)
			.field("mode", &self.mode)
			.field("max_restarts", &self.max_restarts)
			.field("window", &self.window)
			.field("shutdown_timeout", &self.shutdown_timeout)
			.finish_non_exhaustive()
	}
}

/// A child slot in the supervisor's table.
pub(crate) struct Child {
	pub(crate) spec: ChildSpec,
	/// `None` while stopped for a restart.
	pub(crate) actor: Option<AnyActorRef>,
	pub(crate) watch: Option<WatchId>,
	pub(crate) history: RestartHistory,
	pub(crate) restarts: usize,
}

impl Child {
	pub(crate) fn new(spec: ChildSpec, defaults: &SupervisorDefaults) -> Self {
		let history = RestartHistory::new(spec.resolve_max_restarts(defaults) + 1);
		Self {
			spec,
			actor: None,
			watch: None,
			history,
			restarts: 0,
		}
	}

	pub(crate) fn info(&self) -> ChildInfo {
		ChildInfo {
			id: self.spec.id.clone(),
			actor: self.actor.clone(),
			mode: self.spec.mode,
			restarts: self.restarts,
		}
	}
}

/// Snapshot of one child, as reported by [`SupervisorRef::children`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildInfo {
	pub id: String,
	/// `None` while the child is being restarted.
	pub actor: Option<AnyActorRef>,
	pub mode: RestartMode,
	pub restarts: usize,
}
