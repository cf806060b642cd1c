use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use skein_strand::{Receiver, SendError, SendOutcome, StrandContext};
use tokio::time::Instant;

use crate::actor::{Actor, ActorFlow};
use crate::call::{Request, RequestId, finish, send_request};
use crate::cell::{ActorId, ActorRef, AnyActorRef};
use crate::envelope::{Envelope, ExitMessage, LifecycleMessage, SystemMessage};
use crate::error::ActorError;
use crate::lifecycle::{LinkListener, ListenerKey, WatchId, WatchListener};
use crate::system::ActorSystem;

/// What the run loop hands to the actor next.
pub(crate) enum Event<M> {
	User(M),
	Lifecycle(LifecycleMessage),
}

/// Per-actor execution context.
///
/// Owns the mailbox's receiving end and the actor's strand context, so every
/// receive, call and sleep suspends the actor's own strand and observes
/// interrupts.
pub struct ActorContext<M> {
	self_ref: ActorRef<M>,
	mailbox: Receiver<Envelope<M>>,
	strand: StrandContext,
	system: ActorSystem,
	/// Lifecycle notices that arrived during a nested receive, in arrival order.
	deferred: VecDeque<LifecycleMessage>,
	watches: HashMap<WatchId, AnyActorRef>,
	trap_exits: bool,
}

impl<M: Send + 'static> ActorContext<M> {
	pub(crate) fn new(self_ref: ActorRef<M>, mailbox: Receiver<Envelope<M>>, strand: StrandContext, system: ActorSystem) -> Self {
		Self {
			self_ref,
			mailbox,
			strand,
			system,
			deferred: VecDeque::new(),
			watches: HashMap::new(),
			trap_exits: false,
		}
	}

	pub fn self_ref(&self) -> &ActorRef<M> {
		&self.self_ref
	}

	pub fn id(&self) -> ActorId {
		self.self_ref.id()
	}

	pub fn name(&self) -> &str {
		self.self_ref.name()
	}

	pub fn system(&self) -> &ActorSystem {
		&self.system
	}

	pub fn strand(&self) -> &StrandContext {
		&self.strand
	}

	/// Receives the next user message from inside a handler.
	///
	/// Lifecycle notices met on the way are intercepted. A linked exit fails
	/// the receive with [`ActorError::LinkedExit`] unless exits are trapped.
	/// A shutdown notice ends the receive with `Ok(None)`. Every other notice,
	/// and a trapped linked exit, is handed to [`Actor::handle_lifecycle`] once
	/// the handler returns. `Ok(None)` also means the mailbox is closed.
	pub async fn receive(&mut self) -> Result<Option<M>, ActorError> {
		self.receive_matching(|_| true, None).await
	}

	/// Like [`Self::receive`] but yields `Ok(None)` after `timeout`.
	pub async fn receive_timeout(&mut self, timeout: Duration) -> Result<Option<M>, ActorError> {
		self.receive_matching(|_| true, Some(Instant::now() + timeout)).await
	}

	/// Selective receive: the first queued user message matching `pred`.
	/// Skipped messages keep their order.
	pub async fn receive_where(&mut self, pred: impl FnMut(&M) -> bool + Send) -> Result<Option<M>, ActorError> {
		self.receive_matching(pred, None).await
	}

	pub async fn receive_where_timeout(&mut self, pred: impl FnMut(&M) -> bool + Send, timeout: Duration) -> Result<Option<M>, ActorError> {
		self.receive_matching(pred, Some(Instant::now() + timeout)).await
	}

	/// Never suspends. Lifecycle notices are intercepted as in [`Self::receive`].
	pub fn try_receive(&mut self) -> Result<Option<M>, ActorError> {
		loop {
			if self.shutdown_pending() {
				return Ok(None);
			}
			match self.mailbox.try_recv() {
				None => return Ok(None),
				Some(Envelope::User(msg)) => return Ok(Some(msg)),
				Some(Envelope::System(msg)) => self.intercept(msg)?,
			}
		}
	}

	/// While set, linked exits no longer end nested receives; they wait for
	/// [`Actor::handle_lifecycle`] like any other notice. Off by default.
	pub fn trap_exits(&mut self, trap: bool) {
		self.trap_exits = trap;
	}

	pub fn is_trapping_exits(&self) -> bool {
		self.trap_exits
	}

	async fn receive_matching(&mut self, mut pred: impl FnMut(&M) -> bool + Send, deadline: Option<Instant>) -> Result<Option<M>, ActorError> {
		loop {
			if self.shutdown_pending() {
				return Ok(None);
			}
			let accept = |envelope: &Envelope<M>| match envelope {
				Envelope::User(msg) => pred(msg),
				Envelope::System(_) => true,
			};
			let envelope = match deadline {
				None => self.strand.suspend(self.mailbox.recv_where(accept)).await?,
				Some(deadline) => self.strand.suspend(self.mailbox.recv_where_until(accept, deadline)).await?,
			};
			match envelope {
				None => return Ok(None),
				Some(Envelope::User(msg)) => return Ok(Some(msg)),
				Some(Envelope::System(msg)) => self.intercept(msg)?,
			}
		}
	}

	/// Applies a system message dequeued by a nested receive.
	fn intercept(&mut self, msg: SystemMessage) -> Result<(), ActorError> {
		match msg {
			SystemMessage::Response(response) => self.stray_response(response.id),
			SystemMessage::Lifecycle(notice) => match self.observe(notice) {
				LifecycleMessage::Exit(exit) if exit.watch.is_none() && !self.trap_exits => return Err(linked_exit(exit)),
				notice => self.deferred.push_back(notice),
			},
		}
		Ok(())
	}

	/// A shutdown notice is waiting for the run loop.
	fn shutdown_pending(&self) -> bool {
		self.deferred.iter().any(|notice| matches!(notice, LifecycleMessage::Shutdown(_)))
	}

	fn stray_response(&self, id: RequestId) {
		tracing::trace!(actor = %self.name(), request = %id, "skein.call.stray_response");
	}

	/// Next thing for the run loop: deferred lifecycle notices first, then the mailbox.
	pub(crate) async fn next_event(&mut self) -> Result<Option<Event<M>>, ActorError> {
		loop {
			if let Some(notice) = self.deferred.pop_front() {
				return Ok(Some(Event::Lifecycle(notice)));
			}
			match self.strand.suspend(self.mailbox.recv()).await? {
				None => return Ok(None),
				Some(Envelope::User(msg)) => return Ok(Some(Event::User(msg))),
				Some(Envelope::System(SystemMessage::Lifecycle(notice))) => return Ok(Some(Event::Lifecycle(self.observe(notice)))),
				Some(Envelope::System(SystemMessage::Response(response))) => self.stray_response(response.id),
			}
		}
	}

	/// Drops bookkeeping for relationships an exit notice has ended.
	fn observe(&mut self, notice: LifecycleMessage) -> LifecycleMessage {
		if let LifecycleMessage::Exit(exit) = &notice {
			match exit.watch {
				Some(watch) => {
					self.watches.remove(&watch);
				}
				None => {
					self.self_ref.remove_listener(ListenerKey::Link(exit.actor.id()));
				}
			}
		}
		notice
	}

	/// Default lifecycle handling.
	///
	/// A watched exit is informational. A linked exit is fatal, even a normal
	/// one. A shutdown notice stops the actor normally.
	pub fn default_lifecycle(&self, notice: LifecycleMessage) -> Result<ActorFlow, ActorError> {
		match notice {
			LifecycleMessage::Exit(exit) if exit.watch.is_some() => Ok(ActorFlow::Continue),
			LifecycleMessage::Exit(exit) => Err(linked_exit(exit)),
			LifecycleMessage::Shutdown(_) => Ok(ActorFlow::Stop),
		}
	}

	/// Links this actor with `other`. If `other` is already dead its exit
	/// notice is delivered right away.
	pub fn link(&mut self, other: &AnyActorRef) {
		let me = self.self_ref.erase();
		if other.id() == me.id() {
			return;
		}
		me.add_listener(ListenerKey::Link(other.id()), Arc::new(LinkListener { peer: other.clone() }));
		other.add_listener(ListenerKey::Link(me.id()), Arc::new(LinkListener { peer: me }));
	}

	pub fn unlink(&mut self, other: &AnyActorRef) {
		self.self_ref.remove_listener(ListenerKey::Link(other.id()));
		other.remove_listener(ListenerKey::Link(self.id()));
	}

	/// Watches `other`. Its exit arrives as a notice tagged with the returned id.
	pub fn watch(&mut self, other: &AnyActorRef) -> WatchId {
		let id = WatchId::next();
		self.watches.insert(id, other.clone());
		other.add_listener(
			ListenerKey::Watch(id),
			Arc::new(WatchListener {
				watcher: self.self_ref.erase(),
				id,
			}),
		);
		id
	}

	/// Stops watching and discards any exit notice for `id` not yet handled.
	pub fn unwatch(&mut self, id: WatchId) {
		if let Some(target) = self.watches.remove(&id) {
			target.remove_listener(ListenerKey::Watch(id));
		}
		self.mailbox.discard_where(|envelope| envelope.is_exit_for(id));
		self.deferred.retain(|notice| !matches!(notice, LifecycleMessage::Exit(exit) if exit.watch == Some(id)));
	}

	/// Publishes this actor under `name` in the system registry.
	pub fn register(&mut self, name: &str) -> Result<(), ActorError> {
		self.self_ref.register(name)
	}

	/// Retracts the registered name. No-op when not registered.
	pub fn unregister(&mut self) {
		self.self_ref.unregister();
	}

	pub fn whereis(&self, name: &str) -> Option<AnyActorRef> {
		self.system.whereis(name)
	}

	/// Calls `target` and waits for the reply on this actor's own mailbox.
	///
	/// Other messages that arrive meanwhile stay queued in order.
	pub async fn call<N, Q, R>(&mut self, target: &ActorRef<N>, body: Q, timeout: Duration) -> Result<R, ActorError>
	where
		N: From<Request<Q, R>> + Send + 'static,
		Q: Send + 'static,
		R: Send + 'static,
	{
		let deadline = Instant::now() + timeout;
		let watch = self.watch(target.as_any());
		let id = RequestId::next();
		let request = Request::new(id, self.self_ref.erase(), body);

		let result = match self.strand.suspend(send_request(target, request, deadline)).await {
			Ok(Ok(())) => match self.strand.suspend(self.mailbox.recv_where_until(|envelope| envelope.is_reply_to(id, watch), deadline)).await {
				Ok(reply) => finish(target.id(), reply),
				Err(interrupted) => Err(interrupted.into()),
			},
			Ok(Err(err)) => Err(err),
			Err(interrupted) => Err(interrupted.into()),
		};
		self.unwatch(watch);
		result
	}

	/// Sends to `target` from actor code. A wait on a full `Block` or `Backoff`
	/// mailbox suspends this strand, so it observes interrupts.
	pub async fn send<N: Send + 'static>(&self, target: &ActorRef<N>, msg: N) -> Result<SendOutcome, ActorError> {
		delivered(self.strand.suspend(target.send(msg)).await?)
	}

	pub async fn send_timeout<N: Send + 'static>(&self, target: &ActorRef<N>, msg: N, timeout: Duration) -> Result<SendOutcome, ActorError> {
		delivered(self.strand.suspend(target.send_timeout(msg, timeout)).await?)
	}

	/// Like [`Self::send`], then yields so the receiver can run right away.
	pub async fn send_sync<N: Send + 'static>(&self, target: &ActorRef<N>, msg: N) -> Result<SendOutcome, ActorError> {
		delivered(self.strand.suspend(target.send_sync(msg)).await?)
	}

	pub fn spawn<A: Actor>(&self, actor: A) -> Result<ActorRef<A::Msg>, ActorError> {
		self.system.spawn(actor)
	}

	/// Spawns and links in one step.
	pub fn spawn_linked<A: Actor>(&mut self, actor: A) -> Result<ActorRef<A::Msg>, ActorError> {
		let child = self.system.spawn(actor)?;
		self.link(child.as_any());
		Ok(child)
	}

	/// Interruptible sleep.
	pub async fn sleep(&self, duration: Duration) -> Result<(), ActorError> {
		Ok(self.strand.sleep(duration).await?)
	}
}

fn linked_exit(exit: ExitMessage) -> ActorError {
	ActorError::LinkedExit {
		actor: exit.actor.id(),
		cause: exit.cause.map(Box::new),
	}
}

fn delivered<N>(sent: Result<SendOutcome, SendError<N>>) -> Result<SendOutcome, ActorError> {
	sent.map_err(|err| match err {
		SendError::Full(_) => ActorError::MailboxFull,
		SendError::Timeout(_) => ActorError::Timeout,
	})
}
