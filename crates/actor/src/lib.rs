//! Actors over skein strands.
//!
//! An actor is one strand, one mailbox and its lifecycle bookkeeping. This
//! crate provides:
//! * `ActorSystem`: spawning, the name registry and runtime configuration
//! * `Actor` / `ActorContext`: the behavior trait and the explicit per-actor context
//! * links, watches and death listeners
//! * `call` / `cast`: request/reply over ordinary mailboxes
//! * supervisors with restart strategies and rate limits

mod actor;
mod call;
mod cell;
pub mod config;
mod context;
mod envelope;
pub mod error;
mod lifecycle;
pub mod metrics;
mod registry;
mod runner;
pub mod supervisor;
mod system;

pub use actor::{Actor, ActorFlow, ActorSpec};
pub use call::{Replier, Request, RequestId, call, cast};
pub use cell::{ActorId, ActorRef, AnyActorRef};
pub use config::{SkeinConfig, SupervisorDefaults};
pub use context::ActorContext;
pub use envelope::{ExitMessage, LifecycleMessage, ShutdownMessage};
pub use error::{ActorError, ConfigError};
pub use lifecycle::{LifecycleListener, ListenerKey, WatchId};
pub use metrics::{ActorMetrics, NoopMetrics};
pub use skein_strand::{MailboxConfig, OverflowPolicy, SendError, SendOutcome};
pub use supervisor::{ChildInfo, ChildSpec, RestartHistory, RestartMode, RestartStrategy, SupervisorMsg, SupervisorRef, SupervisorSpec};
pub use system::ActorSystem;

/// Result type for actor operations.
pub type Result<T, E = ActorError> = std::result::Result<T, E>;
