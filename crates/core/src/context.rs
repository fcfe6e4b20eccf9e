use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use swapguard_config::SwapguardConfig;
use swapguard_gateway::CallbackGateway;
use swapguard_monitor::ConcurrencyMonitor;
use swapguard_state::{ReloadKind, ReloadSession, ReloadStateMachine};

use crate::probe::StateConsistencyProbe;
use crate::{ContextError, QuiesceError, ReloadError};

/// The one object that owns the reload pipeline's safety machinery.
///
/// Hosts build one context at startup and pass `Arc<ReloadContext>` to the
/// subsystems that need it. Dropping the last reference shuts everything down.
pub struct ReloadContext {
	config: SwapguardConfig,
	state: ReloadStateMachine,
	monitor: ConcurrencyMonitor,
	gateway: CallbackGateway,
	waiting: AtomicUsize,
	shut_down: AtomicBool,
}

/// Counts a thread in [`ReloadContext::waiting_threads`] until dropped.
struct WaitingGuard<'a>(&'a AtomicUsize);

impl<'a> WaitingGuard<'a> {
	fn enter(counter: &'a AtomicUsize) -> Self {
		counter.fetch_add(1, Ordering::AcqRel);
		Self(counter)
	}
}

impl Drop for WaitingGuard<'_> {
	fn drop(&mut self) {
		self.0.fetch_sub(1, Ordering::AcqRel);
	}
}

impl ReloadContext {
	/// Validates `config`, initialises all three components and wires them together.
	pub fn new(config: SwapguardConfig) -> Result<Arc<Self>, ContextError> {
		config.validate()?;

		let state = ReloadStateMachine::new();
		let monitor = ConcurrencyMonitor::new();
		let gateway = CallbackGateway::new();
		// The monitor is the only fallible step, so it goes first and a failure leaves nothing to undo.
		monitor.initialize(config.monitor.clone())?;
		state.initialize(config.state.clone());
		gateway.initialize(config.gateway.clone());
		gateway.attach_monitor(monitor.clone());
		monitor.add_cycle_probe(Arc::new(StateConsistencyProbe::new(state.clone())));

		let context = Arc::new(Self {
			config,
			state,
			monitor,
			gateway,
			waiting: AtomicUsize::new(0),
			shut_down: AtomicBool::new(false),
		});
		if context.config.monitor.start_on_init {
			if let Err(error) = context.monitor.start_monitoring() {
				tracing::error!(%error, "context.monitor_start_failed");
				context.shutdown();
				return Err(error.into());
			}
		}
		tracing::info!(monitoring = context.monitor.is_monitoring(), "context.ready");
		Ok(context)
	}

	/// Loads a TOML config file and builds the context from it.
	pub fn from_config_file(path: impl AsRef<Path>) -> Result<Arc<Self>, ContextError> {
		Self::new(SwapguardConfig::load(path)?)
	}

	pub fn config(&self) -> &SwapguardConfig {
		&self.config
	}

	pub fn state(&self) -> &ReloadStateMachine {
		&self.state
	}

	pub fn monitor(&self) -> &ConcurrencyMonitor {
		&self.monitor
	}

	pub fn gateway(&self) -> &CallbackGateway {
		&self.gateway
	}

	/// Runs `f` inside a reload session and records its outcome.
	///
	/// `Ok` ends the session as succeeded and `Err` as failed. A panic in `f`
	/// unwinds through the session guard, which records a failure.
	pub fn run_reload<T, E>(
		&self,
		kind: ReloadKind,
		f: impl FnOnce(&ReloadSession) -> Result<T, E>,
	) -> Result<T, ReloadError<E>> {
		let session = self.state.begin_session(kind).map_err(ReloadError::Begin)?;
		let id = session.id();
		match f(&session) {
			Ok(value) => {
				session.succeed().map_err(ReloadError::Interrupted)?;
				Ok(value)
			}
			Err(error) => {
				if let Err(end) = session.fail() {
					tracing::warn!(session = id.get(), error = %end, "context.reload.fail_rejected");
				}
				Err(ReloadError::Operation(error))
			}
		}
	}

	/// Waits up to `timeout` for the reload slot to be idle, then runs `f`.
	///
	/// The idle check is repeated right before `f` runs, but nothing stops a
	/// reload from starting while `f` executes: `f` sees a consistent world
	/// only if reloads are started from the same thread or after it returns.
	pub fn with_reload_quiesced<R>(&self, timeout: Duration, f: impl FnOnce() -> R) -> Result<R, QuiesceError> {
		let _waiting = WaitingGuard::enter(&self.waiting);
		if !self.state.wait_for_completion(timeout) {
			tracing::debug!(timeout_ms = timeout.as_millis() as u64, "context.quiesce.timeout");
			return Err(QuiesceError::TimedOut(timeout));
		}
		if self.state.is_hot_reloading() {
			return Err(QuiesceError::ReloadStarted);
		}
		Ok(f())
	}

	/// Threads currently inside [`Self::with_reload_quiesced`].
	pub fn waiting_threads(&self) -> usize {
		self.waiting.load(Ordering::Acquire)
	}

	/// Ready, consistent, and healthy in both the monitor and the gateway.
	pub fn is_healthy(&self) -> bool {
		self.state.is_system_ready()
			&& self.state.consistency_issues().is_empty()
			&& self.monitor.is_system_healthy()
			&& self.gateway.is_system_healthy()
	}

	pub fn export_diagnostics_report(&self) -> String {
		let mut out = format!(
			"== reload context ==\nhealthy={} waiting_threads={} shut_down={}\n",
			self.is_healthy(),
			self.waiting_threads(),
			self.shut_down.load(Ordering::Acquire),
		);
		out.push_str(&self.state.export_diagnostics_report());
		out.push_str(&self.gateway.export_diagnostics_report());
		out.push_str(&self.monitor.export_diagnostics_report());
		out
	}

	/// Drains the gateway, then the state machine, then stops the monitor.
	/// Later calls are no-ops.
	pub fn shutdown(&self) {
		if self.shut_down.swap(true, Ordering::AcqRel) {
			return;
		}
		tracing::info!("context.shutdown.begin");
		if !self.gateway.shutdown() {
			tracing::warn!("context.shutdown.gateway_abandoned_calls");
		}
		self.monitor.clear_cycle_probes();
		self.state.shutdown();
		self.monitor.shutdown();
		tracing::info!("context.shutdown.done");
	}

	pub fn is_shut_down(&self) -> bool {
		self.shut_down.load(Ordering::Acquire)
	}
}

impl Drop for ReloadContext {
	fn drop(&mut self) {
		self.shutdown();
	}
}

impl std::fmt::Debug for ReloadContext {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ReloadContext")
			.field("state", &self.state)
			.field("monitor", &self.monitor)
			.field("gateway", &self.gateway)
			.field("shut_down", &self.is_shut_down())
			.finish()
	}
}
