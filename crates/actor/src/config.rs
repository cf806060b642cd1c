//! Runtime configuration.
//!
//! ```toml
//! [scheduler]
//! worker_threads = 4
//!
//! [mailbox]
//! capacity = 128
//! overflow = "block"
//!
//! [supervisor]
//! max_restarts = 3
//! window_ms = 5000
//! shutdown_timeout_ms = 1000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use skein_strand::{MailboxConfig, SchedulerConfig};

use crate::error::ConfigError;

/// Top-level configuration for an [`crate::ActorSystem`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SkeinConfig {
	pub scheduler: SchedulerConfig,
	/// Mailbox used by actors spawned without an explicit one.
	pub mailbox: MailboxConfig,
	pub supervisor: SupervisorDefaults,
}

impl SkeinConfig {
	pub fn from_toml_str(src: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(src)?;
		config.mailbox.validate()?;
		Ok(config)
	}

	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let src = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		Self::from_toml_str(&src)
	}
}

/// Restart and shutdown defaults applied to child specs that do not set their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupervisorDefaults {
	/// Restarts allowed within one window before the supervisor gives up.
	pub max_restarts: usize,
	pub window_ms: u64,
	/// Grace period for each of the two shutdown waits.
	pub shutdown_timeout_ms: u64,
}

impl SupervisorDefaults {
	pub fn window(&self) -> Duration {
		Duration::from_millis(self.window_ms)
	}

	pub fn shutdown_timeout(&self) -> Duration {
		Duration::from_millis(self.shutdown_timeout_ms)
	}
}

impl Default for SupervisorDefaults {
	fn default() -> Self {
		Self {
			max_restarts: 3,
			window_ms: 5_000,
			shutdown_timeout_ms: 1_000,
		}
	}
}
