use std::time::Duration;

use rstest::rstest;
use skein_actor::{ActorError, ActorId, ChildSpec, RestartMode, RestartStrategy, SupervisorRef, SupervisorSpec};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::common::{Stubborn, WorkerEvent, WorkerMsg, eventually, system, tell, worker};

async fn started(events: &mut mpsc::UnboundedReceiver<WorkerEvent>) -> (String, ActorId) {
	loop {
		match events.recv().await.expect("worker events") {
			WorkerEvent::Started(label, id) => return (label, id),
			WorkerEvent::Stopped(_) => {}
		}
	}
}

async fn child_ids(supervisor: &SupervisorRef) -> Vec<(String, Option<ActorId>)> {
	supervisor
		.children()
		.await
		.expect("children")
		.into_iter()
		.map(|info| (info.id, info.actor.map(|actor| actor.id())))
		.collect()
}

async fn running(supervisor: &SupervisorRef, id: &str) -> skein_actor::AnyActorRef {
	supervisor.child(id).await.expect("child lookup").expect("child running")
}

#[rstest]
#[case::two_in_one_second(2, Duration::from_millis(1_000), &[0, 200, 400])]
#[case::three_in_ten_seconds(3, Duration::from_secs(10), &[0, 1_000, 2_000, 4_000])]
#[tokio::test(start_paused = true)]
async fn restart_quota_gives_up_on_the_last_failure(#[case] max_restarts: usize, #[case] window: Duration, #[case] failures_at_ms: &[u64]) {
	let (tx, mut events) = mpsc::unbounded_channel();
	let supervisor = system()
		.supervisor(SupervisorSpec::new("quota", RestartStrategy::OneForOne).child(ChildSpec::new(worker("c", &tx)).max_restarts(max_restarts).window(window)))
		.expect("spawn supervisor");
	started(&mut events).await;

	let origin = Instant::now();
	let (last, restarted) = failures_at_ms.split_last().expect("at least one failure");
	for at in restarted {
		tokio::time::sleep_until(origin + Duration::from_millis(*at)).await;
		tell(&running(&supervisor, "c").await, WorkerMsg::Fail("crash".into())).await;
		started(&mut events).await;
	}
	let infos = supervisor.children().await.expect("children");
	assert_eq!(infos[0].restarts, restarted.len());
	assert_eq!(restarted.len(), max_restarts);

	tokio::time::sleep_until(origin + Duration::from_millis(*last)).await;
	tell(&running(&supervisor, "c").await, WorkerMsg::Fail("crash".into())).await;

	assert_eq!(supervisor.join().await, Err(ActorError::RestartQuotaExceeded { child: "c".into() }));
}

#[tokio::test(start_paused = true)]
async fn failures_outside_the_window_are_forgiven() {
	let (tx, mut events) = mpsc::unbounded_channel();
	let supervisor = system()
		.supervisor(SupervisorSpec::new("forgiving", RestartStrategy::OneForOne).child(ChildSpec::new(worker("c", &tx)).max_restarts(1).window(Duration::from_secs(1))))
		.expect("spawn supervisor");
	started(&mut events).await;

	for _ in 0..5 {
		tell(&running(&supervisor, "c").await, WorkerMsg::Fail("crash".into())).await;
		started(&mut events).await;
		tokio::time::sleep(Duration::from_secs(2)).await;
	}
	assert!(supervisor.is_alive());
	assert_eq!(supervisor.children().await.expect("children")[0].restarts, 5);
}

/// Which of `a`, `b`, `c` get a fresh incarnation when `b` fails.
#[rstest]
#[case::one_for_one(RestartStrategy::OneForOne, [false, true, false])]
#[case::all_for_one(RestartStrategy::AllForOne, [true, true, true])]
#[case::rest_for_one(RestartStrategy::RestForOne, [false, true, true])]
#[tokio::test]
async fn strategies_restart_the_right_children(#[case] strategy: RestartStrategy, #[case] replaced: [bool; 3]) {
	let (tx, _events) = mpsc::unbounded_channel();
	let supervisor = system()
		.supervisor(
			SupervisorSpec::new("tree", strategy)
				.child(ChildSpec::new(worker("a", &tx)))
				.child(ChildSpec::new(worker("b", &tx)))
				.child(ChildSpec::new(worker("c", &tx))),
		)
		.expect("spawn supervisor");
	let before = child_ids(&supervisor).await;

	tell(&running(&supervisor, "b").await, WorkerMsg::Fail("boom".into())).await;
	let (sup, old_b) = (&supervisor, before[1].1);
	eventually("b restarted", || async move {
		let now = child_ids(sup).await;
		now[1].1.is_some() && now[1].1 != old_b && now.iter().all(|(_, actor)| actor.is_some())
	})
	.await;

	let after = child_ids(&supervisor).await;
	let labels: Vec<_> = after.iter().map(|(id, _)| id.as_str()).collect();
	assert_eq!(labels, ["a", "b", "c"]);
	for (index, expect_new) in replaced.into_iter().enumerate() {
		assert_eq!(after[index].1 != before[index].1, expect_new, "child {}", after[index].0);
	}

	supervisor.shutdown();
	supervisor.join().await.expect("normal stop");
}

#[tokio::test]
async fn escalate_fails_the_supervisor() {
	let (tx, mut events) = mpsc::unbounded_channel();
	let supervisor = system()
		.supervisor(
			SupervisorSpec::new("escalating", RestartStrategy::Escalate)
				.child(ChildSpec::new(worker("a", &tx)))
				.child(ChildSpec::new(worker("b", &tx))),
		)
		.expect("spawn supervisor");
	started(&mut events).await;
	started(&mut events).await;

	let a = running(&supervisor, "a").await;
	tell(&running(&supervisor, "b").await, WorkerMsg::Fail("boom".into())).await;

	assert_eq!(
		supervisor.join().await,
		Err(ActorError::Escalated {
			child: "b".into(),
			cause: Some(Box::new(ActorError::failed("boom"))),
		})
	);
	assert_eq!(a.join().await, Ok(()));
}

#[rstest]
#[case::transient_normal_exit(RestartMode::Transient, WorkerMsg::Stop, false)]
#[case::transient_failure(RestartMode::Transient, WorkerMsg::Fail("boom".into()), true)]
#[case::permanent_normal_exit(RestartMode::Permanent, WorkerMsg::Stop, true)]
#[case::temporary_failure(RestartMode::Temporary, WorkerMsg::Fail("boom".into()), false)]
#[tokio::test]
async fn restart_mode_decides_between_restart_and_removal(#[case] mode: RestartMode, #[case] msg: WorkerMsg, #[case] restarted: bool) {
	let (tx, mut events) = mpsc::unbounded_channel();
	let supervisor = system()
		.supervisor(SupervisorSpec::new("modes", RestartStrategy::OneForOne).child(ChildSpec::new(worker("c", &tx)).mode(mode)))
		.expect("spawn supervisor");
	let (_, first) = started(&mut events).await;

	tell(&running(&supervisor, "c").await, msg).await;

	let sup = &supervisor;
	if restarted {
		let (_, second) = started(&mut events).await;
		assert_ne!(first, second);
		eventually("restart recorded", || async move { sup.children().await.expect("children")[0].restarts == 1 }).await;
	} else {
		eventually("child removed", || async move { sup.children().await.expect("children").is_empty() }).await;
	}
	assert!(supervisor.is_alive());

	supervisor.shutdown();
	supervisor.join().await.expect("normal stop");
}

#[tokio::test]
async fn shutdown_stops_children_in_reverse_order() {
	let (tx, mut events) = mpsc::unbounded_channel();
	let supervisor = system()
		.supervisor(
			SupervisorSpec::new("ordered", RestartStrategy::OneForOne)
				.child(ChildSpec::new(worker("a", &tx)))
				.child(ChildSpec::new(worker("b", &tx)))
				.child(ChildSpec::new(worker("c", &tx))),
		)
		.expect("spawn supervisor");
	for expected in ["a", "b", "c"] {
		assert_eq!(started(&mut events).await.0, expected);
	}

	assert!(supervisor.shutdown());
	supervisor.join().await.expect("normal stop");

	let mut stopped = Vec::new();
	while let Ok(event) = events.try_recv() {
		if let WorkerEvent::Stopped(label) = event {
			stopped.push(label);
		}
	}
	assert_eq!(stopped, ["c", "b", "a"]);
}

#[tokio::test(start_paused = true)]
async fn unresponsive_child_is_abandoned() {
	let system = system();
	let supervisor = system
		.supervisor(SupervisorSpec::new("patient", RestartStrategy::OneForOne))
		.expect("spawn supervisor");
	let spec = skein_actor::ActorSpec::new("stubborn", || Stubborn { name: "stubborn" });
	let child = supervisor
		.add_child(ChildSpec::new(spec).shutdown_timeout(Duration::from_millis(100)))
		.await
		.expect("add child");
	let sys = &system;
	eventually("registered", || async move { sys.whereis("stubborn").is_some() }).await;

	let started = Instant::now();
	assert!(supervisor.remove_child("stubborn", true).await.expect("remove"));

	assert!(started.elapsed() >= Duration::from_millis(200));
	assert!(child.is_alive());
	assert_eq!(system.whereis("stubborn"), None);
	assert!(supervisor.children().await.expect("children").is_empty());
}

#[tokio::test]
async fn nested_supervisor_restarts_an_escalating_subtree() {
	let (tx, mut events) = mpsc::unbounded_channel();
	let inner = SupervisorSpec::new("inner", RestartStrategy::Escalate).child(ChildSpec::new(worker("leaf", &tx)));
	let root = system()
		.supervisor(SupervisorSpec::new("root", RestartStrategy::OneForOne).child(ChildSpec::supervisor(inner)))
		.expect("spawn root");
	let (_, first_leaf) = started(&mut events).await;

	let inner_ref = running(&root, "inner").await;
	let leaf = inner_ref
		.downcast::<skein_actor::SupervisorMsg>()
		.expect("inner is a supervisor");
	let leaf = skein_actor::call::<_, String, Option<skein_actor::AnyActorRef>>(&leaf, "leaf".to_string(), Duration::from_secs(1))
		.await
		.expect("leaf lookup")
		.expect("leaf running");
	tell(&leaf, WorkerMsg::Fail("leaf crash".into())).await;

	let (_, second_leaf) = started(&mut events).await;
	assert_ne!(first_leaf, second_leaf);
	assert!(matches!(inner_ref.join().await, Err(ActorError::Escalated { .. })));
	let sup = &root;
	eventually("inner restarted", || async move { sup.children().await.expect("children")[0].restarts == 1 }).await;
	assert!(root.is_alive());

	root.shutdown();
	root.join().await.expect("normal stop");
}
