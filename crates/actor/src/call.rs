//! Request/reply on top of plain mailboxes.
//!
//! A request carries a fresh [`RequestId`] and the caller's identity. The
//! caller watches the target, sends, then selectively receives only the
//! response with that id or the exit notice of that watch. Responses that
//! arrive after the wait is over match nothing and are discarded.

use std::any::Any;
use std::convert::Infallible;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use skein_strand::{IdClock, MailboxConfig, SendError, SendOutcome, channel};
use tokio::time::Instant;

use crate::cell::{ActorId, ActorRef, AnyActorRef, new_cell};
use crate::envelope::{Envelope, LifecycleMessage, Response, SystemMessage};
use crate::error::ActorError;
use crate::lifecycle::{ListenerKey, WatchId, WatchListener};

static REQUEST_IDS: IdClock = IdClock::new();

/// Correlation id of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
	pub(crate) fn next() -> Self {
		Self(REQUEST_IDS.next())
	}
}

impl fmt::Display for RequestId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "req-{}", self.0)
	}
}

/// A request with body `Q` expecting a reply of type `R`.
///
/// Replying consumes the request, so each request is answered at most once.
pub struct Request<Q, R> {
	id: RequestId,
	from: AnyActorRef,
	body: Q,
	_reply: PhantomData<fn() -> R>,
}

impl<Q, R: Send + 'static> Request<Q, R> {
	pub(crate) fn new(id: RequestId, from: AnyActorRef, body: Q) -> Self {
		Self {
			id,
			from,
			body,
			_reply: PhantomData,
		}
	}

	pub fn id(&self) -> RequestId {
		self.id
	}

	/// The caller. A call made outside any actor shows a short-lived caller here.
	pub fn from(&self) -> &AnyActorRef {
		&self.from
	}

	pub fn body(&self) -> &Q {
		&self.body
	}

	/// Separates the body from the means to answer it.
	pub fn split(self) -> (Q, Replier<R>) {
		let replier = Replier {
			id: self.id,
			to: self.from,
			_reply: PhantomData,
		};
		(self.body, replier)
	}

	/// Returns `false` when the caller is gone.
	pub fn reply(self, value: R) -> bool {
		self.split().1.reply(value)
	}

	pub fn reply_error(self, error: ActorError) -> bool {
		self.split().1.reply_error(error)
	}

	pub fn respond(self, result: Result<R, ActorError>) -> bool {
		self.split().1.respond(result)
	}
}

impl<Q: fmt::Debug, R> fmt::Debug for Request<Q, R> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Request")
			.field("id", &self.id)
			.field("from", &self.from.id())
			.field("body", &self.body)
			.finish()
	}
}

/// Answers one request.
pub struct Replier<R> {
	id: RequestId,
	to: AnyActorRef,
	_reply: PhantomData<fn() -> R>,
}

impl<R: Send + 'static> Replier<R> {
	pub fn reply(self, value: R) -> bool {
		self.respond(Ok(value))
	}

	pub fn reply_error(self, error: ActorError) -> bool {
		self.respond(Err(error))
	}

	pub fn respond(self, result: Result<R, ActorError>) -> bool {
		let response = Response {
			id: self.id,
			result: result.map(|value| Box::new(value) as Box<dyn Any + Send>),
		};
		self.to.deliver(SystemMessage::Response(response)) != SendOutcome::Closed
	}
}

/// Calls `target` from code that is not an actor.
///
/// A short-lived caller identity receives the reply. Fails with
/// [`ActorError::Timeout`] after `timeout`, [`ActorError::TargetDied`] if the
/// target dies first, or with whatever error the target replied.
pub async fn call<M, Q, R>(target: &ActorRef<M>, body: Q, timeout: Duration) -> Result<R, ActorError>
where
	M: From<Request<Q, R>> + Send + 'static,
	Q: Send + 'static,
	R: Send + 'static,
{
	let deadline = Instant::now() + timeout;
	let (tx, rx) = channel::<Envelope<Infallible>>(&MailboxConfig::unbounded())?;
	let caller = new_cell(format!("call:{}", target.name()), tx, Arc::clone(target.system()));

	let watch = WatchId::next();
	let key = ListenerKey::Watch(watch);
	target.add_listener(
		key,
		Arc::new(WatchListener {
			watcher: caller.erase(),
			id: watch,
		}),
	);

	let id = RequestId::next();
	let result = match send_request(target, Request::new(id, caller.erase(), body), deadline).await {
		Ok(()) => finish(target.id(), rx.recv_where_until(|env| env.is_reply_to(id, watch), deadline).await),
		Err(err) => Err(err),
	};
	target.remove_listener(key);
	result
}

/// Fire-and-forget send.
pub async fn cast<M: Send + 'static>(target: &ActorRef<M>, msg: M) {
	target.cast(msg).await;
}

pub(crate) async fn send_request<M, Q, R>(target: &ActorRef<M>, request: Request<Q, R>, deadline: Instant) -> Result<(), ActorError>
where
	M: From<Request<Q, R>> + Send + 'static,
	R: Send + 'static,
{
	let sent = target.send_timeout(M::from(request), deadline.saturating_duration_since(Instant::now())).await;
	tokio::task::yield_now().await;
	match sent {
		// A dropped request times out; a closed mailbox means the exit notice is on its way.
		Ok(SendOutcome::Enqueued | SendOutcome::Displaced | SendOutcome::Dropped | SendOutcome::Closed) => Ok(()),
		Err(SendError::Full(_)) => Err(ActorError::MailboxFull),
		Err(SendError::Timeout(_)) => Err(ActorError::Timeout),
	}
}

/// Turns the outcome of the selective receive into the call result.
pub(crate) fn finish<M, R: 'static>(target: ActorId, reply: Option<Envelope<M>>) -> Result<R, ActorError> {
	match reply {
		None => Err(ActorError::Timeout),
		Some(Envelope::System(SystemMessage::Response(response))) => {
			let value = response.result?;
			value.downcast::<R>().map(|value| *value).map_err(|_| ActorError::ResponseType)
		}
		Some(Envelope::System(SystemMessage::Lifecycle(LifecycleMessage::Exit(exit)))) => Err(ActorError::TargetDied {
			actor: target,
			cause: exit.cause.map(Box::new),
		}),
		Some(Envelope::System(SystemMessage::Lifecycle(LifecycleMessage::Shutdown(_))) | Envelope::User(_)) => Err(ActorError::ResponseType),
	}
}
