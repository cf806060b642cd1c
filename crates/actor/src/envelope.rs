use std::any::Any;
use std::fmt;

use crate::call::RequestId;
use crate::cell::AnyActorRef;
use crate::error::ActorError;
use crate::lifecycle::WatchId;

/// What actually travels through an actor's mailbox.
pub(crate) enum Envelope<M> {
	User(M),
	System(SystemMessage),
}

impl<M> Envelope<M> {
	pub(crate) fn is_exit_for(&self, watch: WatchId) -> bool {
		matches!(self, Self::System(SystemMessage::Lifecycle(LifecycleMessage::Exit(exit))) if exit.watch == Some(watch))
	}

	pub(crate) fn is_reply_to(&self, request: RequestId, watch: WatchId) -> bool {
		match self {
			Self::System(SystemMessage::Response(response)) => response.id == request,
			Self::User(_) | Self::System(_) => self.is_exit_for(watch),
		}
	}
}

/// Runtime traffic that bypasses mailbox capacity.
pub(crate) enum SystemMessage {
	Lifecycle(LifecycleMessage),
	Response(Response),
}

/// Tagged reply to a request.
pub(crate) struct Response {
	pub(crate) id: RequestId,
	pub(crate) result: Result<Box<dyn Any + Send>, ActorError>,
}

/// Notification delivered to an actor about another actor's lifecycle.
#[derive(Debug, Clone)]
pub enum LifecycleMessage {
	Exit(ExitMessage),
	Shutdown(ShutdownMessage),
}

/// Another actor died.
#[derive(Clone)]
pub struct ExitMessage {
	/// The actor that died.
	pub actor: AnyActorRef,
	/// `None` for a normal exit.
	pub cause: Option<ActorError>,
	/// Set when the notice comes from a watch rather than a link.
	pub watch: Option<WatchId>,
}

impl ExitMessage {
	pub fn is_abnormal(&self) -> bool {
		self.cause.is_some()
	}
}

impl fmt::Debug for ExitMessage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ExitMessage")
			.field("actor", &self.actor.id())
			.field("cause", &self.cause)
			.field("watch", &self.watch)
			.finish()
	}
}

/// Request to stop normally.
#[derive(Clone)]
pub struct ShutdownMessage {
	pub requester: Option<AnyActorRef>,
}

impl fmt::Debug for ShutdownMessage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ShutdownMessage").field("requester", &self.requester.as_ref().map(AnyActorRef::id)).finish()
	}
}
