use std::time::Duration;

use swapguard_config::ConfigError;
use swapguard_monitor::MonitorError;
use swapguard_state::{BeginError, EndError};
use thiserror::Error;

/// Why a [`crate::ReloadContext`] could not be built.
#[derive(Debug, Error)]
pub enum ContextError {
	#[error("invalid configuration: {0}")]
	Config(#[from] ConfigError),
	#[error("monitor setup failed: {0}")]
	Monitor(#[from] MonitorError),
}

/// Failure of [`crate::ReloadContext::run_reload`].
#[derive(Debug, Error)]
pub enum ReloadError<E> {
	#[error("reload could not start: {0}")]
	Begin(#[source] BeginError),
	#[error("reload operation failed: {0}")]
	Operation(#[source] E),
	/// The session was ended from outside, typically by an emergency stop,
	/// before the operation's result could be committed.
	#[error("reload session was ended externally: {0}")]
	Interrupted(#[source] EndError),
}

/// Failure of [`crate::ReloadContext::with_reload_quiesced`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QuiesceError {
	#[error("no idle window within {0:?}")]
	TimedOut(Duration),
	#[error("a reload started before the quiesced section could run")]
	ReloadStarted,
}
