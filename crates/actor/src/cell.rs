//! Actor identity, death bookkeeping and the handles that point at it.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::Mutex;
use skein_strand::{IdClock, SendError, SendOutcome, Sender, StrandRef, panic_message};
use tokio::sync::watch;

use crate::envelope::{Envelope, LifecycleMessage, ShutdownMessage, SystemMessage};
use crate::error::ActorError;
use crate::lifecycle::{LifecycleListener, ListenerKey};
use crate::system::SystemShared;

static ACTOR_IDS: IdClock = IdClock::new();

/// Process-unique actor identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(u64);

impl ActorId {
	pub const fn as_u64(self) -> u64 {
		self.0
	}
}

impl fmt::Display for ActorId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "actor-{}", self.0)
	}
}

/// Type-erased write access to a mailbox for runtime traffic.
pub(crate) trait SystemSink: Send + Sync + 'static {
	fn deliver(&self, msg: SystemMessage) -> SendOutcome;
	fn close(&self);
	fn queued(&self) -> usize;
	fn as_any(&self) -> &dyn Any;
}

impl<M: Send + 'static> SystemSink for Sender<Envelope<M>> {
	fn deliver(&self, msg: SystemMessage) -> SendOutcome {
		self.force_send(Envelope::System(msg))
	}

	fn close(&self) {
		Sender::close(self);
	}

	fn queued(&self) -> usize {
		self.len()
	}

	fn as_any(&self) -> &dyn Any {
		self
	}
}

struct LifecycleState {
	/// `Some(cause)` once dead; `Some(None)` is a normal exit.
	death: Option<Option<ActorError>>,
	listeners: IndexMap<ListenerKey, Arc<dyn LifecycleListener>>,
	registered: Option<String>,
}

pub(crate) struct ActorCore {
	id: ActorId,
	name: String,
	alive: AtomicBool,
	lifecycle: Mutex<LifecycleState>,
	dead: watch::Sender<bool>,
	sink: Box<dyn SystemSink>,
	system: Arc<SystemShared>,
	strand: OnceLock<StrandRef>,
}

/// Type-erased actor handle used by links, watches, the registry and supervisors.
///
/// Equality and hashing go by actor id.
#[derive(Clone)]
pub struct AnyActorRef {
	core: Arc<ActorCore>,
}

/// Creates the bookkeeping for a new actor around its mailbox.
pub(crate) fn new_cell<M: Send + 'static>(name: String, mailbox: Sender<Envelope<M>>, system: Arc<SystemShared>) -> ActorRef<M> {
	let id = ActorId(ACTOR_IDS.next());
	let name = if name.is_empty() { id.to_string() } else { name };
	let (dead, _) = watch::channel(false);
	let core = Arc::new(ActorCore {
		id,
		name,
		alive: AtomicBool::new(true),
		lifecycle: Mutex::new(LifecycleState {
			death: None,
			listeners: IndexMap::new(),
			registered: None,
		}),
		dead,
		sink: Box::new(mailbox.clone()),
		system,
		strand: OnceLock::new(),
	});
	ActorRef {
		any: AnyActorRef { core },
		mailbox,
	}
}

impl AnyActorRef {
	pub fn id(&self) -> ActorId {
		self.core.id
	}

	pub fn name(&self) -> &str {
		&self.core.name
	}

	pub fn is_alive(&self) -> bool {
		self.core.alive.load(Ordering::Acquire)
	}

	/// `None` while alive, `Some(None)` after a normal exit, `Some(Some(cause))` after a failure.
	pub fn exit_reason(&self) -> Option<Option<ActorError>> {
		self.core.lifecycle.lock().death.clone()
	}

	/// Death cause of an abnormally terminated actor.
	pub fn death_cause(&self) -> Option<ActorError> {
		self.exit_reason().flatten()
	}

	/// Name this actor is registered under, if any.
	pub fn registered_name(&self) -> Option<String> {
		self.core.lifecycle.lock().registered.clone()
	}

	/// Control handle of the actor's strand. `None` for call-scoped callers.
	pub fn strand(&self) -> Option<&StrandRef> {
		self.core.strand.get()
	}

	/// Messages currently queued in the mailbox, system traffic included.
	pub fn mailbox_len(&self) -> usize {
		self.core.sink.queued()
	}

	/// Waits for the actor to die. A failure surfaces as its cause.
	pub async fn join(&self) -> Result<(), ActorError> {
		let mut dead = self.core.dead.subscribe();
		// The sender lives in the core we hold, so this only returns once dead.
		let _ = dead.wait_for(|dead| *dead).await;
		match self.exit_reason() {
			Some(Some(cause)) => Err(cause),
			Some(None) | None => Ok(()),
		}
	}

	/// Like [`Self::join`] but returns `None` if the actor is still alive after `timeout`.
	pub async fn join_timeout(&self, timeout: Duration) -> Option<Result<(), ActorError>> {
		tokio::time::timeout(timeout, self.join()).await.ok()
	}

	/// Asks the actor to stop normally. Returns `false` if it is already dead.
	pub fn shutdown(&self) -> bool {
		self.shutdown_from(None)
	}

	pub fn shutdown_from(&self, requester: Option<&AnyActorRef>) -> bool {
		let notice = ShutdownMessage {
			requester: requester.cloned(),
		};
		self.deliver(SystemMessage::Lifecycle(LifecycleMessage::Shutdown(notice))) != SendOutcome::Closed
	}

	/// Interrupts the actor's strand; the next suspension fails with [`ActorError::Interrupted`].
	pub fn interrupt(&self) {
		if let Some(strand) = self.core.strand.get() {
			strand.interrupt();
		}
	}

	/// Registers a callback run once when this actor dies, immediately if it already has.
	pub fn on_death(&self, listener: impl LifecycleListener) -> ListenerKey {
		let key = ListenerKey::callback();
		self.add_listener(key, Arc::new(listener));
		key
	}

	/// Removes a listener. Returns `false` if it was not registered (or already fired).
	pub fn remove_listener(&self, key: ListenerKey) -> bool {
		self.core.lifecycle.lock().listeners.shift_remove(&key).is_some()
	}

	/// Recovers the typed handle if `M` is this actor's message type.
	pub fn downcast<M: Send + 'static>(&self) -> Option<ActorRef<M>> {
		let mailbox = self.core.sink.as_any().downcast_ref::<Sender<Envelope<M>>>()?;
		Some(ActorRef {
			any: self.clone(),
			mailbox: mailbox.clone(),
		})
	}

	pub(crate) fn system(&self) -> &Arc<SystemShared> {
		&self.core.system
	}

	pub(crate) fn attach_strand(&self, strand: StrandRef) {
		let _ = self.core.strand.set(strand);
	}

	pub(crate) fn deliver(&self, msg: SystemMessage) -> SendOutcome {
		self.core.sink.deliver(msg)
	}

	/// Adds `listener` under `key`, or runs it right away if the actor is already dead.
	pub(crate) fn add_listener(&self, key: ListenerKey, listener: Arc<dyn LifecycleListener>) {
		let mut lifecycle = self.core.lifecycle.lock();
		if let Some(cause) = lifecycle.death.clone() {
			drop(lifecycle);
			self.notify(listener.as_ref(), cause.as_ref());
			return;
		}
		lifecycle.listeners.insert(key, listener);
	}

	pub(crate) fn register(&self, name: &str) -> Result<(), ActorError> {
		match self.registered_name() {
			Some(current) if current == name => return Ok(()),
			Some(current) => return Err(ActorError::AlreadyRegistered { name: current }),
			None => {}
		}
		self.core.system.registry.bind(name, self)?;
		self.core.lifecycle.lock().registered = Some(name.to_string());
		tracing::debug!(actor = %self.core.name, name, "skein.actor.register");
		Ok(())
	}

	/// Retracts the registered name. No-op when not registered.
	pub(crate) fn unregister(&self) {
		let registered = self.core.lifecycle.lock().registered.take();
		if let Some(name) = registered {
			self.core.system.registry.unbind(&name, self.core.id);
		}
	}

	/// Terminates the actor's bookkeeping. Runs once; later calls are ignored.
	pub(crate) fn die(&self, cause: Option<ActorError>) {
		let (listeners, registered) = {
			let mut lifecycle = self.core.lifecycle.lock();
			if lifecycle.death.is_some() {
				return;
			}
			lifecycle.death = Some(cause.clone());
			self.core.alive.store(false, Ordering::Release);
			(std::mem::take(&mut lifecycle.listeners), lifecycle.registered.take())
		};

		if let Some(name) = registered {
			self.core.system.registry.unbind(&name, self.core.id);
		}
		self.core.sink.close();
		self.core.system.metrics.death(self.core.id, cause.is_some());
		tracing::debug!(actor = %self.core.name, id = %self.core.id, cause = ?cause, listeners = listeners.len(), "skein.actor.death");

		for listener in listeners.values() {
			self.notify(listener.as_ref(), cause.as_ref());
		}
		self.core.dead.send_replace(true);
	}

	fn notify(&self, listener: &dyn LifecycleListener, cause: Option<&ActorError>) {
		if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(|| listener.dead(self, cause))) {
			tracing::warn!(actor = %self.core.name, panic = %panic_message(payload), "skein.actor.listener_panicked");
		}
	}
}

impl PartialEq for AnyActorRef {
	fn eq(&self, other: &Self) -> bool {
		self.core.id == other.core.id
	}
}

impl Eq for AnyActorRef {}

impl Hash for AnyActorRef {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.core.id.hash(state);
	}
}

impl fmt::Debug for AnyActorRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AnyActorRef")
			.field("id", &self.core.id)
			.field("name", &self.core.name)
			.field("alive", &self.is_alive())
			.finish()
	}
}

/// Typed handle to an actor accepting `M`.
///
/// Dereferences to [`AnyActorRef`] for identity and lifecycle operations.
pub struct ActorRef<M> {
	any: AnyActorRef,
	mailbox: Sender<Envelope<M>>,
}

impl<M: Send + 'static> ActorRef<M> {
	/// Sends honoring the mailbox overflow policy. A rejected message is handed back.
	pub async fn send(&self, msg: M) -> Result<SendOutcome, SendError<M>> {
		let outcome = self.mailbox.send(Envelope::User(msg)).await.map_err(|err| err.map(user_payload))?;
		Ok(self.record(outcome))
	}

	/// Sends and yields so the receiver can run right away.
	pub async fn send_sync(&self, msg: M) -> Result<SendOutcome, SendError<M>> {
		let outcome = self.mailbox.send_sync(Envelope::User(msg)).await.map_err(|err| err.map(user_payload))?;
		Ok(self.record(outcome))
	}

	/// Never suspends.
	pub fn try_send(&self, msg: M) -> Result<SendOutcome, SendError<M>> {
		let outcome = self.mailbox.try_send(Envelope::User(msg)).map_err(|err| err.map(user_payload))?;
		Ok(self.record(outcome))
	}

	pub async fn send_timeout(&self, msg: M, timeout: Duration) -> Result<SendOutcome, SendError<M>> {
		let outcome = self
			.mailbox
			.send_timeout(Envelope::User(msg), timeout)
			.await
			.map_err(|err| err.map(user_payload))?;
		Ok(self.record(outcome))
	}

	/// Fire-and-forget send. Rejections and drops are ignored.
	pub async fn cast(&self, msg: M) {
		let _ = self.send(msg).await;
	}

	/// Type-erased copy of this handle.
	pub fn erase(&self) -> AnyActorRef {
		self.any.clone()
	}

	pub fn as_any(&self) -> &AnyActorRef {
		&self.any
	}

	fn record(&self, outcome: SendOutcome) -> SendOutcome {
		if matches!(outcome, SendOutcome::Enqueued | SendOutcome::Displaced) {
			self.any.core.system.metrics.message_enqueued(self.any.core.id);
		}
		outcome
	}
}

fn user_payload<M>(envelope: Envelope<M>) -> M {
	match envelope {
		Envelope::User(msg) => msg,
		Envelope::System(_) => unreachable!("user send returned a system message"),
	}
}

impl<M> Deref for ActorRef<M> {
	type Target = AnyActorRef;

	fn deref(&self) -> &AnyActorRef {
		&self.any
	}
}

impl<M> Clone for ActorRef<M> {
	fn clone(&self) -> Self {
		Self {
			any: self.any.clone(),
			mailbox: self.mailbox.clone(),
		}
	}
}

impl<M> PartialEq for ActorRef<M> {
	fn eq(&self, other: &Self) -> bool {
		self.any == other.any
	}
}

impl<M> Eq for ActorRef<M> {}

impl<M> Hash for ActorRef<M> {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.any.hash(state);
	}
}

impl<M> fmt::Debug for ActorRef<M> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("ActorRef").field(&self.any).finish()
	}
}

impl<M> From<ActorRef<M>> for AnyActorRef {
	fn from(actor: ActorRef<M>) -> Self {
		actor.any
	}
}
