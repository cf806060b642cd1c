//! Lightweight strands multiplexed over a fixed pool of worker threads.
//!
//! This crate provides the execution layer the actor runtime builds on:
//! * `Scheduler`: owns (or borrows) the tokio worker pool and creates strands
//! * `Strand` / `StrandContext` / `StrandRef`: start, join, park, unpark, interrupt
//! * `channel`: multi-producer, single-consumer channels with overflow policies
//! * `ticker`: lossy multi-consumer ring channel that never blocks producers

pub mod channel;
pub mod config;
pub mod error;
mod id;
pub mod scheduler;
pub mod strand;
pub mod ticker;

pub use channel::{Receiver, SendOutcome, Sender, channel};
pub use config::{BackoffConfig, Capacity, MailboxConfig, OverflowPolicy, SchedulerConfig};
pub use error::{ChannelError, Interrupted, SendError, StrandError};
pub use id::IdClock;
pub use scheduler::Scheduler;
pub use strand::{ParkOutcome, Strand, StrandContext, StrandId, StrandRef, StrandState, panic_message};
pub use ticker::{TickerConsumer, TickerSender, ticker};

/// Result type for strand lifecycle operations.
pub type Result<T, E = StrandError> = std::result::Result<T, E>;
