//! Actor error taxonomy.
//!
//! [`ActorError`] doubles as the death cause carried by exit notifications,
//! so it is `Clone` and comparable.

use std::path::PathBuf;

use skein_strand::{ChannelError, Interrupted, StrandError};
use thiserror::Error;

use crate::cell::ActorId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActorError {
	/// Handler or startup failure reported by actor code.
	#[error("{0}")]
	Failed(String),
	/// A handler panicked; carries the panic message.
	#[error("actor panicked: {0}")]
	Panicked(String),
	/// A linked actor died and lifecycle handling re-raised its exit.
	#[error("linked actor {actor} exited{}", fmt_cause(.cause))]
	LinkedExit { actor: ActorId, cause: Option<Box<ActorError>> },
	/// The actor's strand was interrupted at a suspension point.
	#[error("actor interrupted")]
	Interrupted,
	/// A call or timed receive ran out of time.
	#[error("call timed out")]
	Timeout,
	/// The target of a call died before replying.
	#[error("call target {actor} died{}", fmt_cause(.cause))]
	TargetDied { actor: ActorId, cause: Option<Box<ActorError>> },
	/// The name is bound to another live actor.
	#[error("name {name:?} is already registered to {holder}")]
	NameTaken { name: String, holder: ActorId },
	/// The actor is already registered under a different name.
	#[error("actor is already registered as {name:?}")]
	AlreadyRegistered { name: String },
	/// A response value did not have the type the caller expected.
	#[error("response has an unexpected type")]
	ResponseType,
	/// A supervised child died more often than its restart window allows.
	#[error("restart quota exceeded for child {child:?}")]
	RestartQuotaExceeded { child: String },
	/// A supervisor with the escalate strategy lost a child.
	#[error("child {child:?} failed and was escalated{}", fmt_cause(.cause))]
	Escalated { child: String, cause: Option<Box<ActorError>> },
	/// A send was rejected by a full mailbox.
	#[error("mailbox full")]
	MailboxFull,
	/// The target mailbox is closed; the actor is dead.
	#[error("mailbox closed")]
	MailboxClosed,
	/// A supervisor already has a child with this id.
	#[error("duplicate child id {0:?}")]
	DuplicateChild(String),
	#[error(transparent)]
	Strand(#[from] StrandError),
	#[error(transparent)]
	Channel(#[from] ChannelError),
}

fn fmt_cause(cause: &Option<Box<ActorError>>) -> String {
	match cause {
		Some(cause) => format!(": {cause}"),
		None => String::new(),
	}
}

impl ActorError {
	pub fn failed(msg: impl Into<String>) -> Self {
		Self::Failed(msg.into())
	}
}

impl From<Interrupted> for ActorError {
	fn from(_: Interrupted) -> Self {
		Self::Interrupted
	}
}

/// Errors loading runtime configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("invalid config: {0}")]
	Toml(#[from] toml::de::Error),
	#[error("failed to read {path}: {error}")]
	Io { path: PathBuf, error: std::io::Error },
	#[error("invalid default mailbox: {0}")]
	Mailbox(#[from] ChannelError),
	#[error(transparent)]
	Scheduler(#[from] StrandError),
}

/// Result type for actor operations.
pub type Result<T, E = ActorError> = std::result::Result<T, E>;
