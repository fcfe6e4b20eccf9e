use thiserror::Error;

/// Lifecycle errors of the monitor. Recording and detection never fail.
#[derive(Debug, Error)]
pub enum MonitorError {
	#[error("monitor is already initialized")]
	AlreadyInitialized,
	#[error("monitor is not initialized")]
	NotInitialized,
	#[error("detection thread is already running")]
	AlreadyRunning,
	#[error("failed to spawn detection thread: {0}")]
	Spawn(#[source] std::io::Error),
}
