use std::time::Duration;

use async_trait::async_trait;
use skein_actor::{Actor, ActorContext, ActorError, ActorFlow, ActorRef, Request, call, cast};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::common::system;

#[derive(Clone, Copy)]
pub struct Add(pub i64, pub i64);
#[derive(Clone, Copy)]
pub struct Divide(pub i64, pub i64);
pub struct Ignore;
pub struct Crash;
pub struct SlowAdd(pub i64, pub i64, pub Duration);

pub enum CalcMsg {
	Add(Request<Add, i64>),
	Divide(Request<Divide, i64>),
	Ignore(Request<Ignore, i64>),
	Crash(Request<Crash, i64>),
	SlowAdd(Request<SlowAdd, i64>),
	Bump(i64),
	Total(Request<(), i64>),
}

macro_rules! calc_request {
	($($body:ident),*) => {
		$(impl From<Request<$body, i64>> for CalcMsg {
			fn from(request: Request<$body, i64>) -> Self {
				Self::$body(request)
			}
		})*
	};
}

calc_request!(Add, Divide, Ignore, Crash, SlowAdd);

impl From<Request<(), i64>> for CalcMsg {
	fn from(request: Request<(), i64>) -> Self {
		Self::Total(request)
	}
}

/// Answers arithmetic requests. Reports whether each slow reply found its caller.
#[derive(Default)]
struct Calculator {
	total: i64,
	late_replies: Option<mpsc::UnboundedSender<bool>>,
}

#[async_trait]
impl Actor for Calculator {
	type Msg = CalcMsg;

	async fn handle(&mut self, msg: CalcMsg, ctx: &mut ActorContext<CalcMsg>) -> Result<ActorFlow, ActorError> {
		match msg {
			CalcMsg::Add(request) => {
				let Add(a, b) = *request.body();
				request.reply(a + b);
			}
			CalcMsg::Divide(request) => {
				let Divide(a, b) = *request.body();
				if b == 0 {
					request.reply_error(ActorError::failed("division by zero"));
				} else {
					request.reply(a / b);
				}
			}
			CalcMsg::Ignore(_request) => {}
			CalcMsg::Crash(_request) => return Err(ActorError::failed("crash requested")),
			CalcMsg::SlowAdd(request) => {
				let (SlowAdd(a, b, delay), replier) = request.split();
				ctx.sleep(delay).await?;
				let delivered = replier.reply(a + b);
				if let Some(report) = &self.late_replies {
					let _ = report.send(delivered);
				}
			}
			CalcMsg::Bump(by) => self.total += by,
			CalcMsg::Total(request) => {
				request.reply(self.total);
			}
		}
		Ok(ActorFlow::Continue)
	}
}

fn calculator() -> ActorRef<CalcMsg> {
	system().spawn_named("calc", Calculator::default()).expect("spawn calculator")
}

#[tokio::test]
async fn call_returns_the_reply() {
	let calc = calculator();
	assert_eq!(call(&calc, Add(3, 4), Duration::from_secs(1)).await, Ok(7));
	assert_eq!(call(&calc, Divide(9, 3), Duration::from_secs(1)).await, Ok(3));
}

#[tokio::test(start_paused = true)]
async fn call_times_out_no_earlier_than_requested() {
	let calc = calculator();
	let started = Instant::now();

	let result = call(&calc, Ignore, Duration::from_secs(1)).await;

	assert_eq!(result, Err(ActorError::Timeout));
	assert!(started.elapsed() >= Duration::from_secs(1));
	assert!(calc.is_alive());
}

#[tokio::test]
async fn reply_error_surfaces_as_the_call_error() {
	let calc = calculator();
	let result = call(&calc, Divide(1, 0), Duration::from_secs(1)).await;
	assert_eq!(result, Err(ActorError::failed("division by zero")));
}

#[tokio::test]
async fn target_death_during_call_is_reported() {
	let calc = calculator();
	let result = call(&calc, Crash, Duration::from_secs(5)).await;

	assert_eq!(
		result,
		Err(ActorError::TargetDied {
			actor: calc.id(),
			cause: Some(Box::new(ActorError::failed("crash requested"))),
		})
	);
	assert_eq!(calc.join().await, Err(ActorError::failed("crash requested")));
}

#[tokio::test]
async fn calling_a_dead_actor_fails_fast() {
	let calc = calculator();
	assert!(calc.shutdown());
	calc.join().await.expect("normal stop");

	let result = call(&calc, Add(1, 1), Duration::from_secs(5)).await;
	assert_eq!(result, Err(ActorError::TargetDied { actor: calc.id(), cause: None }));
}

#[tokio::test(start_paused = true)]
async fn late_reply_finds_nobody() {
	let (tx, mut delivered) = mpsc::unbounded_channel();
	let calc = system()
		.spawn(Calculator {
			total: 0,
			late_replies: Some(tx),
		})
		.expect("spawn calculator");

	let result = call(&calc, SlowAdd(1, 2, Duration::from_secs(2)), Duration::from_secs(1)).await;
	assert_eq!(result, Err(ActorError::Timeout));
	assert_eq!(delivered.recv().await, Some(false));

	let result = call(&calc, SlowAdd(1, 2, Duration::from_millis(10)), Duration::from_secs(1)).await;
	assert_eq!(result, Ok(3));
	assert_eq!(delivered.recv().await, Some(true));
}

#[tokio::test]
async fn cast_is_fire_and_forget() {
	let calc = calculator();
	cast(&calc, CalcMsg::Bump(2)).await;
	calc.cast(CalcMsg::Bump(5)).await;
	assert_eq!(call(&calc, (), Duration::from_secs(1)).await, Ok(7));
}

pub enum RelayMsg {
	Relay(Request<(i64, i64), i64>),
	Slow(Request<Duration, Option<i64>>),
}

impl From<Request<(i64, i64), i64>> for RelayMsg {
	fn from(request: Request<(i64, i64), i64>) -> Self {
		Self::Relay(request)
	}
}

impl From<Request<Duration, Option<i64>>> for RelayMsg {
	fn from(request: Request<Duration, Option<i64>>) -> Self {
		Self::Slow(request)
	}
}

/// Forwards work to a calculator with its own calls.
struct Relay {
	calc: ActorRef<CalcMsg>,
}

#[async_trait]
impl Actor for Relay {
	type Msg = RelayMsg;

	async fn handle(&mut self, msg: RelayMsg, ctx: &mut ActorContext<RelayMsg>) -> Result<ActorFlow, ActorError> {
		match msg {
			RelayMsg::Relay(request) => {
				let ((a, b), replier) = request.split();
				replier.respond(ctx.call(&self.calc, Add(a, b), Duration::from_secs(1)).await);
			}
			RelayMsg::Slow(request) => {
				let (delay, replier) = request.split();
				let sum = ctx.call(&self.calc, SlowAdd(1, 1, delay), Duration::from_millis(100)).await;
				replier.reply(sum.ok());
			}
		}
		Ok(ActorFlow::Continue)
	}
}

#[tokio::test(start_paused = true)]
async fn actors_call_each_other_and_ignore_stray_replies() {
	let system = system();
	let calc = system.spawn(Calculator::default()).expect("spawn calculator");
	let relay = system.spawn(Relay { calc }).expect("spawn relay");

	assert_eq!(call(&relay, (20_i64, 22_i64), Duration::from_secs(1)).await, Ok(42));

	// The slow reply lands in the relay's mailbox after its call gave up.
	assert_eq!(call(&relay, Duration::from_millis(500), Duration::from_secs(5)).await, Ok(None));
	tokio::time::sleep(Duration::from_secs(1)).await;

	assert_eq!(call(&relay, (1_i64, 2_i64), Duration::from_secs(1)).await, Ok(3));
	assert!(relay.is_alive());
}
