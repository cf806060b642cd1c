//! Death listeners: links, watches and custom callbacks.

use std::fmt;

use skein_strand::IdClock;

use crate::cell::{ActorId, AnyActorRef};
use crate::envelope::{ExitMessage, LifecycleMessage, SystemMessage};
use crate::error::ActorError;

static WATCH_IDS: IdClock = IdClock::new();
static CALLBACK_IDS: IdClock = IdClock::new();

/// Opaque id correlating a watch with the exit notice it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(u64);

impl WatchId {
	pub(crate) fn next() -> Self {
		Self(WATCH_IDS.next())
	}
}

impl fmt::Display for WatchId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "watch-{}", self.0)
	}
}

/// Identifies one listener in an actor's listener table.
///
/// Registering a second listener under an existing key replaces the first,
/// so one relationship never produces two notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKey {
	/// Link to the given actor.
	Link(ActorId),
	Watch(WatchId),
	Callback(u64),
}

impl ListenerKey {
	pub(crate) fn callback() -> Self {
		Self::Callback(CALLBACK_IDS.next())
	}
}

/// Invoked at most once, when the observed actor dies.
pub trait LifecycleListener: Send + Sync + 'static {
	fn dead(&self, actor: &AnyActorRef, cause: Option<&ActorError>);
}

impl<F> LifecycleListener for F
where
	F: Fn(&AnyActorRef, Option<&ActorError>) + Send + Sync + 'static,
{
	fn dead(&self, actor: &AnyActorRef, cause: Option<&ActorError>) {
		self(actor, cause);
	}
}

/// Delivers the exit of a linked actor to `peer`.
pub(crate) struct LinkListener {
	pub(crate) peer: AnyActorRef,
}

impl LifecycleListener for LinkListener {
	fn dead(&self, actor: &AnyActorRef, cause: Option<&ActorError>) {
		self.peer.deliver(SystemMessage::Lifecycle(LifecycleMessage::Exit(ExitMessage {
			actor: actor.clone(),
			cause: cause.cloned(),
			watch: None,
		})));
	}
}

/// Delivers the exit of a watched actor to `watcher`, tagged with the watch id.
pub(crate) struct WatchListener {
	pub(crate) watcher: AnyActorRef,
	pub(crate) id: WatchId,
}

impl LifecycleListener for WatchListener {
	fn dead(&self, actor: &AnyActorRef, cause: Option<&ActorError>) {
		self.watcher.deliver(SystemMessage::Lifecycle(LifecycleMessage::Exit(ExitMessage {
			actor: actor.clone(),
			cause: cause.cloned(),
			watch: Some(self.id),
		})));
	}
}
