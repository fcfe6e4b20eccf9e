use std::time::Duration;

use serde::Deserialize;

use crate::{Result, ensure};

/// Bounded callback gateway settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
	pub max_concurrent_callbacks: usize,
	/// Soft ceiling; a call that returns later is reported as `Timeout`.
	#[serde(rename = "callback_timeout_ms", with = "crate::duration_ms")]
	pub callback_timeout: Duration,
	pub enable_timeout: bool,
	pub enable_statistics: bool,
	pub log_slow_callbacks: bool,
	#[serde(rename = "slow_callback_threshold_ms", with = "crate::duration_ms")]
	pub slow_callback_threshold: Duration,
	#[serde(rename = "shutdown_drain_timeout_ms", with = "crate::duration_ms")]
	pub shutdown_drain_timeout: Duration,
}

impl Default for GatewayConfig {
	fn default() -> Self {
		Self {
			max_concurrent_callbacks: 64,
			callback_timeout: Duration::from_secs(30),
			enable_timeout: true,
			enable_statistics: true,
			log_slow_callbacks: true,
			slow_callback_threshold: Duration::from_millis(100),
			shutdown_drain_timeout: Duration::from_secs(10),
		}
	}
}

impl GatewayConfig {
	pub(crate) fn validate(&self) -> Result<()> {
		ensure(self.max_concurrent_callbacks > 0, "gateway.max_concurrent_callbacks", "must be at least 1")?;
		ensure(!self.callback_timeout.is_zero(), "gateway.callback_timeout_ms", "must be non-zero")
	}
}
