use std::sync::Arc;

use async_trait::async_trait;
use skein_strand::MailboxConfig;

use crate::context::ActorContext;
use crate::envelope::LifecycleMessage;
use crate::error::ActorError;

/// Continuation directive from one handling step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorFlow {
	/// Keep processing messages.
	Continue,
	/// Stop normally.
	Stop,
}

/// Behavior run on an actor's strand.
///
/// An `Err` from any hook, or a panic, terminates the actor with that cause.
#[async_trait]
pub trait Actor: Send + 'static {
	type Msg: Send + 'static;

	async fn on_start(&mut self, _ctx: &mut ActorContext<Self::Msg>) -> Result<(), ActorError> {
		Ok(())
	}

	async fn handle(&mut self, msg: Self::Msg, ctx: &mut ActorContext<Self::Msg>) -> Result<ActorFlow, ActorError>;

	/// Reacts to an exit or shutdown notice. Defaults to [`ActorContext::default_lifecycle`].
	async fn handle_lifecycle(&mut self, notice: LifecycleMessage, ctx: &mut ActorContext<Self::Msg>) -> Result<ActorFlow, ActorError> {
		ctx.default_lifecycle(notice)
	}

	/// Runs once before the actor dies, with the death cause it is about to record.
	async fn on_terminate(&mut self, _cause: Option<&ActorError>, _ctx: &mut ActorContext<Self::Msg>) {}
}

/// Recipe for spawning an actor, reusable to build fresh instances on restart.
pub struct ActorSpec<A> {
	pub(crate) name: String,
	pub(crate) mailbox: Option<MailboxConfig>,
	factory: Arc<dyn Fn() -> A + Send + Sync>,
}

impl<A: Actor> ActorSpec<A> {
	pub fn new(name: impl Into<String>, factory: impl Fn() -> A + Send + Sync + 'static) -> Self {
		Self {
			name: name.into(),
			mailbox: None,
			factory: Arc::new(factory),
		}
	}

	/// Overrides the system's default mailbox.
	#[must_use]
	pub fn mailbox(mut self, mailbox: MailboxConfig) -> Self {
		self.mailbox = Some(mailbox);
		self
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Produces a fresh instance.
	pub fn build(&self) -> A {
		(self.factory)()
	}
}

impl<A> Clone for ActorSpec<A> {
	fn clone(&self) -> Self {
		Self {
			name: self.name.clone(),
			mailbox: self.mailbox,
			factory: Arc::clone(&self.factory),
		}
	}
}
