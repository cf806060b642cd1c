use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use skein_actor::{ActorError, LifecycleMessage, MailboxConfig, OverflowPolicy, SendError, SendOutcome};
use tokio::sync::mpsc;

use crate::common::{Script, Scripted, Sleeper, exec, system};

fn exit_of(notice: LifecycleMessage) -> skein_actor::ExitMessage {
	match notice {
		LifecycleMessage::Exit(exit) => exit,
		other => panic!("expected an exit notice, got {other:?}"),
	}
}

#[tokio::test]
async fn linked_failure_kills_the_peer_with_the_cause() {
	let system = system();
	let a = system.spawn(Scripted::default()).expect("spawn a");
	let b = system.spawn(Scripted::default()).expect("spawn b");

	let peer = b.erase();
	exec(&a, move |ctx| ctx.link(&peer)).await;
	a.send(Script::fail("boom")).await.expect("send");

	assert_eq!(a.join().await, Err(ActorError::failed("boom")));
	assert_eq!(
		b.join().await,
		Err(ActorError::LinkedExit {
			actor: a.id(),
			cause: Some(Box::new(ActorError::failed("boom"))),
		})
	);
}

#[tokio::test]
async fn link_notifies_exactly_once_and_can_be_trapped() {
	let system = system();
	let (tx, mut notices) = mpsc::unbounded_channel();
	let a = system.spawn(Scripted::default()).expect("spawn a");
	let b = system.spawn(Scripted::trapping(tx)).expect("spawn b");

	let peer = a.erase();
	exec(&b, move |ctx| ctx.link(&peer)).await;
	a.send(Script::fail("boom")).await.expect("send");
	let _ = a.join().await;

	let exit = exit_of(notices.recv().await.expect("exit notice"));
	assert_eq!(exit.actor.id(), a.id());
	assert_eq!(exit.cause, Some(ActorError::failed("boom")));
	assert_eq!(exit.watch, None);

	// Round-trip through b's mailbox; a duplicate notice would be queued before this.
	exec(&b, |_| ()).await;
	assert!(notices.try_recv().is_err());
	assert!(b.is_alive());
}

#[tokio::test]
async fn normal_exit_of_a_linked_actor_is_still_fatal() {
	let system = system();
	let a = system.spawn(Scripted::default()).expect("spawn a");
	let b = system.spawn(Scripted::default()).expect("spawn b");

	let peer = a.erase();
	exec(&b, move |ctx| ctx.link(&peer)).await;
	a.send(Script::stop()).await.expect("send");

	assert_eq!(a.join().await, Ok(()));
	assert_eq!(b.join().await, Err(ActorError::LinkedExit { actor: a.id(), cause: None }));
}

#[tokio::test]
async fn linking_to_a_dead_actor_notifies_immediately() {
	let system = system();
	let dead = system.spawn(Scripted::default()).expect("spawn dead");
	dead.send(Script::fail("gone")).await.expect("send");
	let _ = dead.join().await;

	let b = system.spawn(Scripted::default()).expect("spawn b");
	let peer = dead.erase();
	exec(&b, move |ctx| ctx.link(&peer)).await;

	assert_eq!(
		b.join().await,
		Err(ActorError::LinkedExit {
			actor: dead.id(),
			cause: Some(Box::new(ActorError::failed("gone"))),
		})
	);
}

#[tokio::test]
async fn unlink_removes_both_directions() {
	let system = system();
	let a = system.spawn(Scripted::default()).expect("spawn a");
	let b = system.spawn(Scripted::default()).expect("spawn b");

	let peer = b.erase();
	exec(&a, move |ctx| {
		ctx.link(&peer);
		ctx.unlink(&peer);
	})
	.await;

	b.send(Script::fail("b fails")).await.expect("send");
	let _ = b.join().await;
	exec(&a, |_| ()).await;
	assert!(a.is_alive());

	a.send(Script::fail("a fails")).await.expect("send");
	let _ = a.join().await;
}

#[tokio::test]
async fn watch_is_informational_and_unwatch_discards() {
	let system = system();
	let (tx, mut notices) = mpsc::unbounded_channel();
	let watcher = system.spawn(Scripted::reporting(tx)).expect("spawn watcher");
	let watched = system.spawn(Scripted::default()).expect("spawn watched");
	let ignored = system.spawn(Scripted::default()).expect("spawn ignored");

	let (target, other) = (watched.erase(), ignored.erase());
	let watch = exec(&watcher, move |ctx| {
		let watch = ctx.watch(&target);
		let dropped = ctx.watch(&other);
		ctx.unwatch(dropped);
		watch
	})
	.await;

	ignored.send(Script::fail("unseen")).await.expect("send");
	let _ = ignored.join().await;
	watched.send(Script::fail("seen")).await.expect("send");
	let _ = watched.join().await;

	let exit = exit_of(notices.recv().await.expect("exit notice"));
	assert_eq!(exit.actor.id(), watched.id());
	assert_eq!(exit.watch, Some(watch));
	assert!(exit.is_abnormal());

	exec(&watcher, |_| ()).await;
	assert!(notices.try_recv().is_err());
	assert!(watcher.is_alive());
}

#[tokio::test]
async fn registry_binds_names_to_live_actors() {
	let system = system();
	let first = system.spawn(Scripted::default()).expect("spawn first");
	let second = system.spawn(Scripted::default()).expect("spawn second");

	exec(&first, |ctx| ctx.register("service")).await.expect("register");
	assert_eq!(system.whereis("service"), Some(first.erase()));
	assert_eq!(system.whereis_typed::<Script>("service"), Some(first.clone()));
	assert!(system.whereis_typed::<u32>("service").is_none());
	assert_eq!(first.registered_name().as_deref(), Some("service"));
	assert_eq!(system.registered(), ["service"]);

	assert_eq!(exec(&first, |ctx| ctx.register("service")).await, Ok(()));
	assert_eq!(
		exec(&first, |ctx| ctx.register("other")).await,
		Err(ActorError::AlreadyRegistered { name: "service".into() })
	);
	assert_eq!(
		exec(&second, |ctx| ctx.register("service")).await,
		Err(ActorError::NameTaken {
			name: "service".into(),
			holder: first.id(),
		})
	);

	first.send(Script::stop()).await.expect("send");
	first.join().await.expect("normal stop");
	assert_eq!(system.whereis("service"), None);

	exec(&second, |ctx| ctx.register("service")).await.expect("rebind after death");
	assert_eq!(system.whereis("service"), Some(second.erase()));
}

#[tokio::test]
async fn unregister_is_idempotent() {
	let system = system();
	let actor = system.spawn(Scripted::default()).expect("spawn");

	exec(&actor, |ctx| {
		ctx.unregister();
		ctx.unregister();
	})
	.await;
	exec(&actor, |ctx| ctx.register("transient")).await.expect("register");
	exec(&actor, |ctx| {
		ctx.unregister();
		ctx.unregister();
	})
	.await;

	assert_eq!(system.whereis("transient"), None);
	assert!(actor.is_alive());
}

#[tokio::test]
async fn registries_are_per_system() {
	let one = system();
	let two = system();
	let actor = one.spawn(Scripted::default()).expect("spawn");
	exec(&actor, |ctx| ctx.register("shared-name")).await.expect("register");

	assert!(one.whereis("shared-name").is_some());
	assert!(two.whereis("shared-name").is_none());
}

#[tokio::test]
async fn handler_panic_becomes_the_death_cause() {
	let actor = system().spawn(Scripted::default()).expect("spawn");
	actor.send(Script::panic("kaboom")).await.expect("send");

	assert_eq!(actor.join().await, Err(ActorError::Panicked("kaboom".into())));
	assert_eq!(actor.death_cause(), Some(ActorError::Panicked("kaboom".into())));
	assert!(!actor.is_alive());
}

#[tokio::test]
async fn interrupt_ends_a_suspended_actor() {
	let actor = system().spawn(Sleeper).expect("spawn");
	tokio::task::yield_now().await;

	actor.interrupt();
	assert_eq!(actor.join().await, Err(ActorError::Interrupted));
}

#[tokio::test]
async fn shutdown_stops_normally_and_reports_dead_targets() {
	let actor = system().spawn(Scripted::default()).expect("spawn");
	assert!(actor.shutdown());
	assert_eq!(actor.join().await, Ok(()));
	assert_eq!(actor.exit_reason(), Some(None));
	assert!(!actor.shutdown());
}

#[tokio::test]
async fn full_mailbox_rejects_under_throw() {
	let actor = system().spawn_with("sleepy", Sleeper, MailboxConfig::bounded(1, OverflowPolicy::Throw)).expect("spawn");

	assert_eq!(actor.send(1).await, Ok(SendOutcome::Enqueued));
	assert!(matches!(actor.send(2).await, Err(SendError::Full(2))));
	assert!(matches!(actor.try_send(3), Err(SendError::Full(3))));
	assert_eq!(actor.mailbox_len(), 1);

	actor.interrupt();
	let _ = actor.join().await;
	assert_eq!(actor.send(4).await, Ok(SendOutcome::Closed));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn death_listeners_run_exactly_once() {
	let actor = system().spawn(Scripted::default()).expect("spawn");
	let calls = Arc::new(AtomicUsize::new(0));

	let mut registrations = Vec::new();
	for _ in 0..8 {
		let actor = actor.erase();
		let calls = Arc::clone(&calls);
		registrations.push(tokio::spawn(async move {
			for _ in 0..50 {
				let calls = Arc::clone(&calls);
				actor.on_death(move |_: &skein_actor::AnyActorRef, _: Option<&ActorError>| {
					calls.fetch_add(1, Ordering::SeqCst);
				});
				tokio::task::yield_now().await;
			}
		}));
	}
	actor.send(Script::fail("racing")).await.expect("send");

	for registration in registrations {
		registration.await.expect("registration task");
	}
	let _ = actor.join().await;
	assert_eq!(calls.load(Ordering::SeqCst), 8 * 50);
}

#[tokio::test]
async fn panicking_listener_does_not_starve_the_rest() {
	let actor = system().spawn(Scripted::default()).expect("spawn");
	let calls = Arc::new(AtomicUsize::new(0));

	actor.on_death(|_: &skein_actor::AnyActorRef, _: Option<&ActorError>| panic!("listener bug"));
	let counted = Arc::clone(&calls);
	actor.on_death(move |_: &skein_actor::AnyActorRef, cause: Option<&ActorError>| {
		assert_eq!(cause, Some(&ActorError::failed("done")));
		counted.fetch_add(1, Ordering::SeqCst);
	});
	let removed = actor.on_death({
		let calls = Arc::clone(&calls);
		move |_: &skein_actor::AnyActorRef, _: Option<&ActorError>| {
			calls.fetch_add(100, Ordering::SeqCst);
		}
	});
	assert!(actor.remove_listener(removed));

	actor.send(Script::fail("done")).await.expect("send");
	let _ = actor.join().await;
	tokio::time::sleep(Duration::from_millis(10)).await;

	assert_eq!(calls.load(Ordering::SeqCst), 1);
	assert!(!actor.remove_listener(removed));
}
