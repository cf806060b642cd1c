//! Supervisors: actors that start, watch and restart other actors.
//!
//! The child table lives inside the supervisor actor and is only touched from
//! its own strand. [`SupervisorRef`] reaches it through request/reply.

use std::time::Duration;

use async_trait::async_trait;
use skein_strand::MailboxConfig;
use tokio::time::Instant;

use crate::actor::{Actor, ActorFlow};
use crate::call::{Request, call};
use crate::cell::{ActorRef, AnyActorRef};
use crate::config::SupervisorDefaults;
use crate::context::ActorContext;
use crate::envelope::LifecycleMessage;
use crate::error::ActorError;
use crate::lifecycle::WatchId;
use crate::system::ActorSystem;

mod child;
mod history;

pub use child::{ChildInfo, ChildSpec, RestartMode};
use child::Child;
pub use history::RestartHistory;

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// What a supervisor does when a child dies and is due for a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestartStrategy {
	/// Restart only the dead child.
	#[default]
	OneForOne,
	/// Stop every other child, then restart all of them in order.
	AllForOne,
	/// Stop the children started after the dead one, then restart it and them in order.
	RestForOne,
	/// Never restart; a death that would have been restarted fails the supervisor itself.
	Escalate,
}

/// Blueprint of a supervisor and its initial children.
#[derive(Debug, Clone)]
pub struct SupervisorSpec {
	pub(crate) name: String,
	strategy: RestartStrategy,
	children: Vec<ChildSpec>,
	mailbox: Option<MailboxConfig>,
	defaults: Option<SupervisorDefaults>,
}

impl SupervisorSpec {
	pub fn new(name: impl Into<String>, strategy: RestartStrategy) -> Self {
		Self {
			name: name.into(),
			strategy,
			children: Vec::new(),
			mailbox: None,
			defaults: None,
		}
	}

	/// Appends an initial child. Children start in the order they are added.
	#[must_use]
	pub fn child(mut self, child: ChildSpec) -> Self {
		self.children.push(child);
		self
	}

	/// Mailbox of the supervisor itself. Unbounded unless set.
	#[must_use]
	pub fn mailbox(mut self, mailbox: MailboxConfig) -> Self {
		self.mailbox = Some(mailbox);
		self
	}

	/// Replaces the system-wide restart and shutdown defaults for this supervisor's children.
	#[must_use]
	pub fn defaults(mut self, defaults: SupervisorDefaults) -> Self {
		self.defaults = Some(defaults);
		self
	}
}

/// Requests understood by a supervisor.
pub enum SupervisorMsg {
	AddChild(Request<ChildSpec, AnyActorRef>),
	/// Child id and whether to stop it; replies whether the child existed.
	RemoveChild(Request<(String, bool), bool>),
	GetChild(Request<String, Option<AnyActorRef>>),
	Children(Request<(), Vec<ChildInfo>>),
}

impl From<Request<ChildSpec, AnyActorRef>> for SupervisorMsg {
	fn from(request: Request<ChildSpec, AnyActorRef>) -> Self {
		Self::AddChild(request)
	}
}

impl From<Request<(String, bool), bool>> for SupervisorMsg {
	fn from(request: Request<(String, bool), bool>) -> Self {
		Self::RemoveChild(request)
	}
}

impl From<Request<String, Option<AnyActorRef>>> for SupervisorMsg {
	fn from(request: Request<String, Option<AnyActorRef>>) -> Self {
		Self::GetChild(request)
	}
}

impl From<Request<(), Vec<ChildInfo>>> for SupervisorMsg {
	fn from(request: Request<(), Vec<ChildInfo>>) -> Self {
		Self::Children(request)
	}
}

/// Handle to a running supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorRef {
	actor: ActorRef<SupervisorMsg>,
	call_timeout: Duration,
}

impl SupervisorRef {
	pub(crate) fn spawn(system: &ActorSystem, spec: SupervisorSpec) -> Result<Self, ActorError> {
		let defaults = spec.defaults.unwrap_or(system.config().supervisor);
		let supervisor = Supervisor {
			name: spec.name.clone(),
			strategy: spec.strategy,
			initial: spec.children,
			children: Vec::new(),
			defaults,
		};
		let mailbox = spec.mailbox.unwrap_or_else(MailboxConfig::unbounded);
		let actor = system.spawn_with(spec.name, supervisor, mailbox)?;
		Ok(Self {
			actor,
			call_timeout: DEFAULT_CALL_TIMEOUT,
		})
	}

	/// Bounds every management call made through this handle.
	#[must_use]
	pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
		self.call_timeout = timeout;
		self
	}

	/// Starts and supervises a new child. Fails with [`ActorError::DuplicateChild`] on an id clash.
	pub async fn add_child(&self, spec: ChildSpec) -> Result<AnyActorRef, ActorError> {
		call(&self.actor, spec, self.call_timeout).await
	}

	/// Forgets a child, stopping it first when `terminate` is set. Returns `false` for an unknown id.
	pub async fn remove_child(&self, id: &str, terminate: bool) -> Result<bool, ActorError> {
		call(&self.actor, (id.to_string(), terminate), self.call_timeout).await
	}

	/// Current incarnation of a child; `None` for an unknown id or while it restarts.
	pub async fn child(&self, id: &str) -> Result<Option<AnyActorRef>, ActorError> {
		call(&self.actor, id.to_string(), self.call_timeout).await
	}

	/// Children in start order.
	pub async fn children(&self) -> Result<Vec<ChildInfo>, ActorError> {
		call(&self.actor, (), self.call_timeout).await
	}

	pub fn actor_ref(&self) -> &ActorRef<SupervisorMsg> {
		&self.actor
	}

	pub fn is_alive(&self) -> bool {
		self.actor.is_alive()
	}

	/// Waits for the supervisor to die. Giving up on a child surfaces as its cause.
	pub async fn join(&self) -> Result<(), ActorError> {
		self.actor.join().await
	}

	/// Asks the supervisor to stop its children in reverse order, then itself.
	pub fn shutdown(&self) -> bool {
		self.actor.shutdown()
	}
}

struct Supervisor {
	name: String,
	strategy: RestartStrategy,
	initial: Vec<ChildSpec>,
	children: Vec<Child>,
	defaults: SupervisorDefaults,
}

impl Supervisor {
	fn add_child(&mut self, ctx: &mut ActorContext<SupervisorMsg>, spec: ChildSpec) -> Result<AnyActorRef, ActorError> {
		if self.children.iter().any(|child| child.spec.id == spec.id) {
			return Err(ActorError::DuplicateChild(spec.id));
		}
		self.children.push(Child::new(spec, &self.defaults));
		let index = self.children.len() - 1;
		match self.start_child(ctx, index) {
			Ok(actor) => Ok(actor),
			Err(err) => {
				self.children.pop();
				Err(err)
			}
		}
	}

	fn start_child(&mut self, ctx: &mut ActorContext<SupervisorMsg>, index: usize) -> Result<AnyActorRef, ActorError> {
		let child = &mut self.children[index];
		let actor = child.spec.factory.start(ctx.system())?;
		child.watch = Some(ctx.watch(&actor));
		child.actor = Some(actor.clone());
		Ok(actor)
	}

	fn restart_child(&mut self, ctx: &mut ActorContext<SupervisorMsg>, index: usize) -> Result<(), ActorError> {
		let actor = self.start_child(ctx, index)?;
		let child = &mut self.children[index];
		child.restarts += 1;
		ctx.system().shared().metrics.restart(&child.spec.id);
		tracing::debug!(supervisor = %self.name, child = %child.spec.id, actor = %actor.id(), restarts = child.restarts, "skein.supervisor.restart");
		Ok(())
	}

	async fn child_died(&mut self, ctx: &mut ActorContext<SupervisorMsg>, index: usize, cause: Option<ActorError>) -> Result<ActorFlow, ActorError> {
		let child = &mut self.children[index];
		child.actor = None;
		child.watch = None;
		let id = child.spec.id.clone();
		tracing::debug!(supervisor = %self.name, child = %id, cause = ?cause, "skein.supervisor.child_exit");

		let restart = match child.spec.mode {
			RestartMode::Permanent => true,
			RestartMode::Transient => cause.is_some(),
			RestartMode::Temporary => false,
		};
		if !restart {
			self.children.remove(index);
			return Ok(ActorFlow::Continue);
		}
		if self.strategy == RestartStrategy::Escalate {
			return Err(ActorError::Escalated {
				child: id,
				cause: cause.map(Box::new),
			});
		}

		let now = Instant::now();
		child.history.add_restart(now);
		let recent = child.history.restarts_within(now, child.spec.resolve_window(&self.defaults));
		let max = child.spec.resolve_max_restarts(&self.defaults);
		if recent > max {
			tracing::warn!(supervisor = %self.name, child = %id, restarts = recent, max, "skein.supervisor.give_up");
			return Err(ActorError::RestartQuotaExceeded { child: id });
		}

		match self.strategy {
			RestartStrategy::OneForOne | RestartStrategy::Escalate => self.restart_child(ctx, index)?,
			RestartStrategy::AllForOne => self.restart_from(ctx, 0).await?,
			RestartStrategy::RestForOne => self.restart_from(ctx, index).await?,
		}
		Ok(ActorFlow::Continue)
	}

	/// Stops every running child from `from` on in reverse order, then
	/// restarts the stopped ones in start order. Stopped temporary children
	/// are dropped instead.
	async fn restart_from(&mut self, ctx: &mut ActorContext<SupervisorMsg>, from: usize) -> Result<(), ActorError> {
		for index in (from..self.children.len()).rev() {
			let child = &mut self.children[index];
			let Some(actor) = child.actor.take() else {
				continue;
			};
			let watch = child.watch.take();
			let timeout = child.spec.resolve_shutdown_timeout(&self.defaults);
			let id = child.spec.id.clone();
			stop_child(ctx, &self.name, &id, actor, watch, timeout).await;
		}

		let mut index = from;
		while index < self.children.len() {
			let child = &self.children[index];
			if child.actor.is_some() {
				index += 1;
			} else if child.spec.mode == RestartMode::Temporary {
				self.children.remove(index);
			} else {
				self.restart_child(ctx, index)?;
				index += 1;
			}
		}
		Ok(())
	}

	async fn remove_child(&mut self, ctx: &mut ActorContext<SupervisorMsg>, id: &str, terminate: bool) -> bool {
		let Some(index) = self.children.iter().position(|child| child.spec.id == id) else {
			return false;
		};
		let child = self.children.remove(index);
		match (child.actor, child.watch) {
			(Some(actor), watch) if terminate => {
				let timeout = child.spec.resolve_shutdown_timeout(&self.defaults);
				stop_child(ctx, &self.name, id, actor, watch, timeout).await;
			}
			(_, Some(watch)) => ctx.unwatch(watch),
			(_, None) => {}
		}
		true
	}
}

/// Shutdown notice, bounded wait, interrupt, second bounded wait, then abandonment.
async fn stop_child(ctx: &mut ActorContext<SupervisorMsg>, supervisor: &str, id: &str, actor: AnyActorRef, watch: Option<WatchId>, timeout: Duration) {
	if let Some(watch) = watch {
		ctx.unwatch(watch);
	}
	if !actor.shutdown_from(Some(ctx.self_ref().as_any())) {
		return;
	}
	if wait_dead(ctx, &actor, timeout).await {
		return;
	}
	tracing::debug!(supervisor, child = id, actor = %actor.id(), "skein.supervisor.interrupt");
	actor.interrupt();
	if wait_dead(ctx, &actor, timeout).await {
		return;
	}
	actor.unregister();
	tracing::warn!(supervisor, child = id, actor = %actor.id(), ?timeout, "skein.supervisor.abandon");
}

async fn wait_dead(ctx: &ActorContext<SupervisorMsg>, actor: &AnyActorRef, timeout: Duration) -> bool {
	matches!(ctx.strand().suspend_timeout(actor.join(), timeout).await, Ok(Some(_))) || !actor.is_alive()
}

#[async_trait]
impl Actor for Supervisor {
	type Msg = SupervisorMsg;

	async fn on_start(&mut self, ctx: &mut ActorContext<SupervisorMsg>) -> Result<(), ActorError> {
		for spec in std::mem::take(&mut self.initial) {
			self.add_child(ctx, spec)?;
		}
		tracing::debug!(supervisor = %self.name, strategy = ?self.strategy, children = self.children.len(), "skein.supervisor.start");
		Ok(())
	}

	async fn handle(&mut self, msg: SupervisorMsg, ctx: &mut ActorContext<SupervisorMsg>) -> Result<ActorFlow, ActorError> {
		match msg {
			SupervisorMsg::AddChild(request) => {
				let (spec, replier) = request.split();
				replier.respond(self.add_child(ctx, spec));
			}
			SupervisorMsg::RemoveChild(request) => {
				let ((id, terminate), replier) = request.split();
				replier.reply(self.remove_child(ctx, &id, terminate).await);
			}
			SupervisorMsg::GetChild(request) => {
				let actor = self.children.iter().find(|child| &child.spec.id == request.body()).and_then(|child| child.actor.clone());
				request.reply(actor);
			}
			SupervisorMsg::Children(request) => {
				request.reply(self.children.iter().map(Child::info).collect());
			}
		}
		Ok(ActorFlow::Continue)
	}

	async fn handle_lifecycle(&mut self, notice: LifecycleMessage, ctx: &mut ActorContext<SupervisorMsg>) -> Result<ActorFlow, ActorError> {
		if let LifecycleMessage::Exit(exit) = &notice
			&& exit.watch.is_some()
			&& let Some(index) = self.children.iter().position(|child| child.watch == exit.watch)
		{
			return self.child_died(ctx, index, exit.cause.clone()).await;
		}
		ctx.default_lifecycle(notice)
	}

	async fn on_terminate(&mut self, cause: Option<&ActorError>, ctx: &mut ActorContext<SupervisorMsg>) {
		tracing::debug!(supervisor = %self.name, cause = ?cause, children = self.children.len(), "skein.supervisor.stop");
		while let Some(child) = self.children.pop() {
			if let Some(actor) = child.actor {
				let timeout = child.spec.resolve_shutdown_timeout(&self.defaults);
				stop_child(ctx, &self.name, &child.spec.id, actor, child.watch, timeout).await;
			}
		}
	}
}
