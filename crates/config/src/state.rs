use std::time::Duration;

use serde::Deserialize;

use crate::{Result, ensure};

/// Reload state machine settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StateConfig {
	/// Sessions allowed past admission at once.
	pub max_concurrent_reloads: usize,
	/// Whether a busy `begin` is counted as pending instead of rejected.
	pub enable_queue: bool,
	/// Upper bound of the pending counter.
	pub max_pending: usize,
	/// Age after which an active session is reported as stuck.
	#[serde(rename = "reload_timeout_ms", with = "crate::duration_ms")]
	pub reload_timeout: Duration,
	/// Grace period between an emergency stop and the automatic return to idle.
	#[serde(rename = "emergency_reset_delay_ms", with = "crate::duration_ms")]
	pub emergency_reset_delay: Duration,
	/// How long shutdown waits for active sessions before forcing an emergency stop.
	#[serde(rename = "shutdown_drain_timeout_ms", with = "crate::duration_ms")]
	pub shutdown_drain_timeout: Duration,
}

impl Default for StateConfig {
	fn default() -> Self {
		Self {
			max_concurrent_reloads: 1,
			enable_queue: true,
			max_pending: 10,
			reload_timeout: Duration::from_secs(60),
			emergency_reset_delay: Duration::from_secs(5),
			shutdown_drain_timeout: Duration::from_secs(30),
		}
	}
}

impl StateConfig {
	pub(crate) fn validate(&self) -> Result<()> {
		ensure(self.max_concurrent_reloads > 0, "state.max_concurrent_reloads", "must be at least 1")?;
		ensure(!self.reload_timeout.is_zero(), "state.reload_timeout_ms", "must be non-zero")
	}
}
