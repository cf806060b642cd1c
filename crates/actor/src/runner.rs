//! Spawning an actor: mailbox, cell, strand and the monitor that records its death.

use std::sync::Arc;

use skein_strand::{MailboxConfig, StrandError, channel};

use crate::actor::{Actor, ActorFlow};
use crate::cell::{ActorRef, new_cell};
use crate::context::{ActorContext, Event};
use crate::envelope::Envelope;
use crate::error::ActorError;
use crate::system::ActorSystem;

pub(crate) fn spawn_actor<A: Actor>(system: &ActorSystem, name: String, actor: A, mailbox: &MailboxConfig) -> Result<ActorRef<A::Msg>, ActorError> {
	let (tx, rx) = channel::<Envelope<A::Msg>>(mailbox)?;
	let actor_ref = new_cell(name, tx, Arc::clone(system.shared()));

	let task_ref = actor_ref.clone();
	let task_system = system.detached();
	let strand = system
		.scheduler()
		.spawn(actor_ref.name().to_string(), move |strand| run_actor(actor, ActorContext::new(task_ref, rx, strand, task_system)));
	actor_ref.attach_strand(strand.handle());
	strand.start()?;

	tracing::debug!(actor = %actor_ref.name(), id = %actor_ref.id(), strand = %strand.id(), capacity = mailbox.capacity.as_raw(), "skein.actor.spawn");

	let monitored = actor_ref.erase();
	system.scheduler().handle().spawn(async move {
		let cause = match strand.join().await {
			Ok(cause) => cause,
			Err(StrandError::Panicked(msg)) => Some(ActorError::Panicked(msg)),
			Err(err) => Some(ActorError::Strand(err)),
		};
		monitored.die(cause);
	});

	Ok(actor_ref)
}

/// Body of an actor's strand. Returns the death cause, `None` for a normal exit.
async fn run_actor<A: Actor>(mut actor: A, mut ctx: ActorContext<A::Msg>) -> Option<ActorError> {
	let outcome = match actor.on_start(&mut ctx).await {
		Ok(()) => run_loop(&mut actor, &mut ctx).await,
		Err(err) => Err(err),
	};
	let cause = outcome.err();
	actor.on_terminate(cause.as_ref(), &mut ctx).await;
	cause
}

async fn run_loop<A: Actor>(actor: &mut A, ctx: &mut ActorContext<A::Msg>) -> Result<(), ActorError> {
	loop {
		let flow = match ctx.next_event().await? {
			// Closed mailbox: nobody can reach this actor anymore.
			None => return Ok(()),
			Some(Event::User(msg)) => actor.handle(msg, ctx).await?,
			Some(Event::Lifecycle(notice)) => actor.handle_lifecycle(notice, ctx).await?,
		};
		if flow == ActorFlow::Stop {
			return Ok(());
		}
	}
}
