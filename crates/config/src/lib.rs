//! Configuration for the swapguard reload pipeline.
//!
//! One TOML document configures all three components. Every section and key is
//! optional; missing values fall back to the defaults below. Durations are
//! integer milliseconds and their keys end in `_ms`.
//!
//! ```toml
//! [state]
//! max_concurrent_reloads = 1
//! enable_queue = true
//! max_pending = 10
//! reload_timeout_ms = 60000
//! emergency_reset_delay_ms = 5000
//!
//! [monitor]
//! detection_interval_ms = 1000
//! race_window_ms = 50
//! min_report_severity = "warning"
//! violation_log_path = "/tmp/swapguard-violations.log"
//!
//! [gateway]
//! max_concurrent_callbacks = 64
//! callback_timeout_ms = 30000
//! slow_callback_threshold_ms = 100
//! ```
//!
//! Unknown keys are rejected so typos surface at load time instead of being
//! silently ignored.

use std::path::Path;

use serde::Deserialize;

mod duration_ms;
pub mod error;
mod gateway;
mod monitor;
mod state;

pub use error::{ConfigError, Result};
pub use gateway::GatewayConfig;
pub use monitor::MonitorConfig;
pub use state::StateConfig;

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SwapguardConfig {
	pub state: StateConfig,
	pub monitor: MonitorConfig,
	pub gateway: GatewayConfig,
}

impl SwapguardConfig {
	/// Parses and validates a TOML document.
	pub fn from_toml_str(source: &str) -> Result<Self> {
		let config: Self = toml::from_str(source)?;
		config.validate()?;
		Ok(config)
	}

	/// Reads, parses and validates a TOML file.
	pub fn load(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let source = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		Self::from_toml_str(&source)
	}

	/// Checks cross-field constraints that serde cannot express.
	pub fn validate(&self) -> Result<()> {
		self.state.validate()?;
		self.monitor.validate()?;
		self.gateway.validate()
	}
}

pub(crate) fn ensure(cond: bool, field: &'static str, reason: &'static str) -> Result<()> {
	if cond { Ok(()) } else { Err(ConfigError::Invalid { field, reason }) }
}
