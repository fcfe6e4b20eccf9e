use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};
use rustc_hash::FxHashMap;
use swapguard_config::StateConfig;
use swapguard_worker::{GenerationClock, StopToken, TaskClass, ThreadJoinCtrl, deadline_after, remaining_until, wait_until_deadline};

use crate::consistency::{self, ConsistencyIssue};
use crate::registry::AssemblyRegistry;
use crate::session::ReloadSession;
use crate::stats::{ReloadStats, ReloadStatsSnapshot};
use crate::{BeginError, EndError, PhaseError, PlatformPhase, ReloadKind, ReloadState, SessionId, SessionOutcome};

const RECOVERY_THREAD: &str = "swapguard-reload-recovery";
const RECOVERY_JOIN_BUDGET: Duration = Duration::from_secs(1);

/// Public view of one active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveSessionInfo {
	pub id: SessionId,
	pub kind: ReloadKind,
	pub age: Duration,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ActiveSession {
	pub(crate) kind: ReloadKind,
	pub(crate) started: Instant,
}

/// Mutation-side state. Holding this lock is the only way to change the
/// reload state, the active counters or the active-session set.
#[derive(Debug, Default)]
pub(crate) struct Core {
	pub(crate) active: FxHashMap<SessionId, ActiveSession>,
	emergency_epoch: u64,
}

struct Recovery {
	stop: StopToken,
	ctrl: ThreadJoinCtrl,
}

pub(crate) struct Inner {
	state: AtomicU8,
	kind: AtomicU8,
	phase: AtomicU8,
	active_count: AtomicUsize,
	pending: AtomicUsize,
	ready: AtomicBool,
	shutting_down: AtomicBool,
	emergency: AtomicBool,
	core: Mutex<Core>,
	idle: Condvar,
	config: RwLock<StateConfig>,
	ids: GenerationClock,
	stats: ReloadStats,
	assemblies: AssemblyRegistry,
	recovery: Mutex<Option<Recovery>>,
}

/// Process-wide hot-reload slot.
///
/// A cheap-to-clone handle; clones share one machine. Status accessors read
/// atomics without locking. Every mutation takes the state mutex, so the
/// state, the active counter and the active-session set agree whenever the
/// mutex is free.
#[derive(Clone)]
pub struct ReloadStateMachine {
	inner: Arc<Inner>,
}

impl Default for ReloadStateMachine {
	fn default() -> Self {
		Self::new()
	}
}

impl ReloadStateMachine {
	/// Creates an uninitialised machine; `begin` reports `NotReady` until
	/// [`Self::initialize`] runs.
	pub fn new() -> Self {
		Self {
			inner: Arc::new(Inner {
				state: AtomicU8::new(ReloadState::Idle as u8),
				kind: AtomicU8::new(ReloadKind::Full as u8),
				phase: AtomicU8::new(PlatformPhase::Ready as u8),
				active_count: AtomicUsize::new(0),
				pending: AtomicUsize::new(0),
				ready: AtomicBool::new(false),
				shutting_down: AtomicBool::new(false),
				emergency: AtomicBool::new(false),
				core: Mutex::new(Core::default()),
				idle: Condvar::new(),
				config: RwLock::new(StateConfig::default()),
				ids: GenerationClock::new(),
				stats: ReloadStats::default(),
				assemblies: AssemblyRegistry::new(),
				recovery: Mutex::new(None),
			}),
		}
	}

	/// Resets every counter, session and registry entry, applies `config` and
	/// marks the machine ready. Session ids keep increasing across resets.
	pub fn initialize(&self, config: StateConfig) {
		self.cancel_recovery();
		*self.inner.config.write() = config;
		{
			let mut core = self.inner.core.lock();
			core.active.clear();
			core.emergency_epoch = core.emergency_epoch.wrapping_add(1);
			self.force_state(ReloadState::Idle);
			self.inner.active_count.store(0, Ordering::Release);
			self.inner.pending.store(0, Ordering::Release);
			self.inner.phase.store(PlatformPhase::Ready as u8, Ordering::Release);
			self.inner.emergency.store(false, Ordering::Release);
			self.inner.shutting_down.store(false, Ordering::Release);
			self.inner.ready.store(true, Ordering::Release);
		}
		self.inner.stats.reset();
		self.inner.assemblies.clear();
		self.inner.idle.notify_all();
		tracing::info!("reload.initialized");
	}

	/// Stops admitting sessions, drains active ones, and marks the machine not ready.
	///
	/// Sessions still active after `shutdown_drain_timeout` are emergency-stopped.
	/// Calling this on a machine that is not ready is a no-op.
	pub fn shutdown(&self) {
		if !self.inner.ready.load(Ordering::Acquire) || self.inner.shutting_down.swap(true, Ordering::AcqRel) {
			return;
		}
		let drain = self.inner.config.read().shutdown_drain_timeout;
		tracing::info!(active = self.active_count(), drain_ms = drain.as_millis() as u64, "reload.shutdown.begin");
		// An emergency stop already abandoned every session; only its reset is outstanding.
		let drained = self.inner.emergency.load(Ordering::Acquire) || self.wait_for_completion(drain);
		if !drained {
			tracing::warn!(active = self.active_count(), "reload.shutdown.drain_timeout");
			self.stop_all(false);
		}
		self.cancel_recovery();

		tracing::info!(report = %self.export_diagnostics_report(), "reload.shutdown.report");
		{
			let mut core = self.inner.core.lock();
			core.active.clear();
			core.emergency_epoch = core.emergency_epoch.wrapping_add(1);
			self.force_state(ReloadState::Idle);
			self.inner.active_count.store(0, Ordering::Release);
			self.inner.pending.store(0, Ordering::Release);
			self.inner.emergency.store(false, Ordering::Release);
			self.inner.ready.store(false, Ordering::Release);
			self.inner.shutting_down.store(false, Ordering::Release);
		}
		self.inner.idle.notify_all();
		tracing::info!("reload.shutdown.done");
	}

	pub fn update_config(&self, config: StateConfig) {
		*self.inner.config.write() = config;
	}

	pub fn config(&self) -> StateConfig {
		self.inner.config.read().clone()
	}

	/// Attempts to claim the reload slot.
	pub fn begin(&self, kind: ReloadKind) -> Result<SessionId, BeginError> {
		self.begin_with(kind, true)
	}

	/// Claims the reload slot and wraps it in a guard that must be completed explicitly.
	pub fn begin_session(&self, kind: ReloadKind) -> Result<ReloadSession, BeginError> {
		let id = self.begin(kind)?;
		Ok(ReloadSession::new(self.clone(), id, kind))
	}

	/// Like [`Self::begin`], but waits for the slot to free up until `timeout`.
	///
	/// Only the first attempt may be counted as pending; retries after a wake-up
	/// do not queue again.
	pub fn begin_or_wait(&self, kind: ReloadKind, timeout: Duration) -> Result<SessionId, BeginError> {
		let deadline = deadline_after(timeout);
		let mut attempt = self.begin_with(kind, true);
		loop {
			match attempt {
				Err(err) if err.is_retryable() => {}
				other => return other,
			}
			let remaining = remaining_until(deadline);
			if remaining.is_zero() || !self.wait_for_completion(remaining) {
				return attempt;
			}
			attempt = self.begin_with(kind, false);
		}
	}

	fn begin_with(&self, kind: ReloadKind, allow_queue: bool) -> Result<SessionId, BeginError> {
		if !self.is_system_ready() {
			return Err(BeginError::NotReady);
		}
		let (enable_queue, max_pending, max_concurrent) = {
			let config = self.inner.config.read();
			(config.enable_queue, config.max_pending, config.max_concurrent_reloads)
		};

		let mut core = self.inner.core.lock();
		if !self.is_system_ready() {
			return Err(BeginError::NotReady);
		}
		let current = self.current_state();
		if current != ReloadState::Idle {
			let pending = self.inner.pending.load(Ordering::Acquire);
			if allow_queue && enable_queue && pending < max_pending {
				self.inner.pending.store(pending + 1, Ordering::Release);
				self.inner.stats.record_queued();
				tracing::debug!(kind = kind.as_str(), state = current.as_str(), pending = pending + 1, "reload.begin.queued");
				return Err(BeginError::Queued { pending: pending + 1 });
			}
			self.inner.stats.record_busy();
			tracing::debug!(kind = kind.as_str(), state = current.as_str(), "reload.begin.busy");
			return Err(BeginError::Busy(current));
		}
		if self.inner.active_count.load(Ordering::Acquire) >= max_concurrent {
			tracing::warn!(kind = kind.as_str(), max_concurrent, "reload.begin.capacity");
			return Err(BeginError::CapacityExceeded);
		}
		if self
			.inner
			.state
			.compare_exchange(ReloadState::Idle as u8, ReloadState::Preparing as u8, Ordering::AcqRel, Ordering::Acquire)
			.is_err()
		{
			return Err(BeginError::Raced);
		}

		self.inner.kind.store(kind as u8, Ordering::Release);
		let id = SessionId(self.inner.ids.next());
		core.active.insert(id, ActiveSession { kind, started: Instant::now() });
		self.inner.active_count.fetch_add(1, Ordering::AcqRel);
		if let Err(err) = self.transition(&mut core, ReloadState::InProgress) {
			tracing::error!(session = id.get(), error = %err, "reload.begin.transition");
		}
		drop(core);

		self.inner.stats.record_started();
		tracing::info!(session = id.get(), kind = kind.as_str(), "reload.begin");
		Ok(id)
	}

	/// Ends an active session with `outcome`.
	///
	/// Valid only from `InProgress` or `Finalizing` and only for an id in the
	/// active set. Consumes one pending request if any were counted.
	pub fn end(&self, id: SessionId, outcome: SessionOutcome, elapsed: Duration) -> Result<(), EndError> {
		let mut core = self.inner.core.lock();
		let current = self.current_state();
		if !matches!(current, ReloadState::InProgress | ReloadState::Finalizing) {
			return Err(EndError::InvalidState(current));
		}
		if !core.active.contains_key(&id) {
			return Err(EndError::UnknownSession(id));
		}
		if current == ReloadState::InProgress {
			self.transition(&mut core, ReloadState::Finalizing)?;
		}

		self.inner.stats.record_outcome(outcome, elapsed);
		self.release_session(&mut core, id);
		let _ = self.inner.pending.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
		if outcome != SessionOutcome::Succeeded {
			self.transition(&mut core, ReloadState::Failed)?;
		}
		self.transition(&mut core, ReloadState::Idle)?;
		drop(core);
		self.inner.idle.notify_all();

		match outcome {
			SessionOutcome::Succeeded => {
				tracing::info!(session = id.get(), elapsed_ms = elapsed.as_millis() as u64, "reload.end")
			}
			SessionOutcome::Failed => {
				tracing::warn!(session = id.get(), elapsed_ms = elapsed.as_millis() as u64, "reload.end.failed")
			}
			SessionOutcome::Abandoned => {
				tracing::error!(session = id.get(), elapsed_ms = elapsed.as_millis() as u64, "reload.end.abandoned")
			}
		}
		Ok(())
	}

	/// Cancels an active session. Cancelling while idle succeeds without side effects.
	pub fn cancel(&self, id: SessionId) -> Result<(), EndError> {
		let mut core = self.inner.core.lock();
		let current = self.current_state();
		if current == ReloadState::Idle {
			tracing::debug!(session = id.get(), "reload.cancel.idle");
			return Ok(());
		}
		if !core.active.contains_key(&id) {
			return Err(EndError::UnknownSession(id));
		}
		self.transition(&mut core, ReloadState::Cancelled)?;
		self.inner.stats.record_cancelled();
		self.release_session(&mut core, id);
		self.transition(&mut core, ReloadState::Idle)?;
		drop(core);
		self.inner.idle.notify_all();
		tracing::info!(session = id.get(), "reload.cancel");
		Ok(())
	}

	/// Blocks until the slot is idle or `timeout` elapses. Returns whether it is idle.
	pub fn wait_for_completion(&self, timeout: Duration) -> bool {
		let deadline = deadline_after(timeout);
		let mut core = self.inner.core.lock();
		while self.current_state() != ReloadState::Idle {
			if wait_until_deadline(&self.inner.idle, &mut core, deadline) {
				return self.current_state() == ReloadState::Idle;
			}
		}
		true
	}

	/// Abandons every session, forces `Cancelled`, and schedules the return to
	/// `Idle` after the configured grace period. Returns the number of sessions
	/// that were active.
	///
	/// While the emergency latch is set, `begin` reports `NotReady`. A later
	/// emergency stop supersedes the pending reset of an earlier one.
	pub fn emergency_stop_all(&self) -> usize {
		self.stop_all(true)
	}

	fn stop_all(&self, schedule_reset: bool) -> usize {
		let (abandoned, epoch) = {
			let mut core = self.inner.core.lock();
			self.inner.emergency.store(true, Ordering::Release);
			self.force_state(ReloadState::Cancelled);
			let abandoned = core.active.len();
			core.active.clear();
			self.inner.active_count.store(0, Ordering::Release);
			self.inner.pending.store(0, Ordering::Release);
			self.inner.phase.store(PlatformPhase::Ready as u8, Ordering::Release);
			core.emergency_epoch = core.emergency_epoch.wrapping_add(1);
			(abandoned, core.emergency_epoch)
		};
		self.inner.idle.notify_all();
		tracing::warn!(abandoned, epoch, "reload.emergency_stop");

		if schedule_reset {
			self.schedule_recovery(epoch);
		}
		abandoned
	}

	fn schedule_recovery(&self, epoch: u64) {
		let delay = self.inner.config.read().emergency_reset_delay;
		let stop = StopToken::new();
		let machine = self.clone();
		let waiter = stop.clone();
		let spawned = ThreadJoinCtrl::spawn(TaskClass::Recovery, RECOVERY_THREAD, move || {
			if !waiter.wait_timeout(delay) {
				machine.finish_emergency(epoch);
			}
		});
		match spawned {
			Ok(ctrl) => {
				if let Some(previous) = self.inner.recovery.lock().replace(Recovery { stop, ctrl }) {
					previous.stop.cancel();
				}
			}
			Err(error) => {
				tracing::error!(%error, epoch, "reload.emergency_stop.recovery_spawn_failed");
			}
		}
	}

	fn finish_emergency(&self, epoch: u64) {
		let mut core = self.inner.core.lock();
		if core.emergency_epoch != epoch || !self.inner.emergency.load(Ordering::Acquire) {
			return;
		}
		self.inner.emergency.store(false, Ordering::Release);
		self.force_state(ReloadState::Idle);
		drop(core);
		self.inner.idle.notify_all();
		tracing::info!(epoch, "reload.emergency_stop.reset");
	}

	fn cancel_recovery(&self) {
		let recovery = self.inner.recovery.lock().take();
		if let Some(recovery) = recovery {
			recovery.stop.cancel();
			if !recovery.ctrl.join_with_timeout(RECOVERY_JOIN_BUDGET) {
				tracing::warn!(thread = recovery.ctrl.name(), "reload.recovery.join_timeout");
			}
		}
	}

	/// Moves the platform sub-phase. Non-`Ready` phases need an in-progress session.
	pub fn set_platform_phase(&self, phase: PlatformPhase) -> Result<PlatformPhase, PhaseError> {
		let _core = self.inner.core.lock();
		let current = self.current_state();
		if phase != PlatformPhase::Ready && current != ReloadState::InProgress {
			return Err(PhaseError::NoActiveSession(current));
		}
		let previous = PlatformPhase::from_u8(self.inner.phase.swap(phase as u8, Ordering::AcqRel));
		tracing::debug!(from = previous.as_str(), to = phase.as_str(), "reload.platform_phase");
		Ok(previous)
	}

	/// Number of issues found by [`Self::consistency_issues`]; logged, never repaired.
	pub fn validate_state_consistency(&self) -> usize {
		let issues = self.consistency_issues();
		for issue in &issues {
			tracing::warn!(issue = %issue, "reload.consistency");
		}
		issues.len()
	}

	/// Checks the state, the active counter and the active-session set against
	/// each other under the state mutex.
	pub fn consistency_issues(&self) -> Vec<ConsistencyIssue> {
		let reload_timeout = self.inner.config.read().reload_timeout;
		let core = self.inner.core.lock();
		consistency::check(
			self.current_state(),
			self.inner.active_count.load(Ordering::Acquire),
			self.inner.emergency.load(Ordering::Acquire),
			&core.active,
			reload_timeout,
		)
	}

	pub fn current_state(&self) -> ReloadState {
		ReloadState::from_u8(self.inner.state.load(Ordering::Acquire))
	}

	/// Kind of the most recently started session.
	pub fn current_kind(&self) -> ReloadKind {
		ReloadKind::from_u8(self.inner.kind.load(Ordering::Acquire))
	}

	pub fn platform_phase(&self) -> PlatformPhase {
		PlatformPhase::from_u8(self.inner.phase.load(Ordering::Acquire))
	}

	pub fn is_hot_reloading(&self) -> bool {
		self.current_state() != ReloadState::Idle
	}

	/// Initialised, not shutting down, and no emergency stop latched.
	pub fn is_system_ready(&self) -> bool {
		self.inner.ready.load(Ordering::Acquire)
			&& !self.inner.shutting_down.load(Ordering::Acquire)
			&& !self.inner.emergency.load(Ordering::Acquire)
	}

	pub fn is_emergency_stopped(&self) -> bool {
		self.inner.emergency.load(Ordering::Acquire)
	}

	/// An emergency reset is scheduled and its thread is still waiting out the delay.
	pub fn is_recovery_pending(&self) -> bool {
		self.inner.recovery.lock().as_ref().is_some_and(|recovery| !recovery.ctrl.has_exited())
	}

	pub fn active_count(&self) -> usize {
		self.inner.active_count.load(Ordering::Acquire)
	}

	pub fn pending_count(&self) -> usize {
		self.inner.pending.load(Ordering::Acquire)
	}

	/// Active sessions, ascending by id.
	pub fn active_sessions(&self) -> Vec<ActiveSessionInfo> {
		let mut sessions: Vec<_> = self
			.inner
			.core
			.lock()
			.active
			.iter()
			.map(|(id, session)| ActiveSessionInfo {
				id: *id,
				kind: session.kind,
				age: session.started.elapsed(),
			})
			.collect();
		sessions.sort_unstable_by_key(|session| session.id);
		sessions
	}

	pub fn statistics(&self) -> ReloadStatsSnapshot {
		self.inner.stats.snapshot()
	}

	pub fn reset_statistics(&self) {
		self.inner.stats.reset();
		tracing::debug!("reload.statistics.reset");
	}

	pub fn assemblies(&self) -> &AssemblyRegistry {
		&self.inner.assemblies
	}

	fn release_session(&self, core: &mut Core, id: SessionId) {
		core.active.remove(&id);
		let _ = self.inner.active_count.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
		self.inner.phase.store(PlatformPhase::Ready as u8, Ordering::Release);
	}

	/// Moves along one edge of the lifecycle graph. Requires the state mutex.
	fn transition(&self, _core: &mut Core, to: ReloadState) -> Result<(), EndError> {
		let from = self.current_state();
		if !from.can_transition_to(to) {
			tracing::error!(from = from.as_str(), to = to.as_str(), "reload.transition.rejected");
			return Err(EndError::Transition { from, to });
		}
		self.inner.state.store(to as u8, Ordering::Release);
		tracing::trace!(from = from.as_str(), to = to.as_str(), "reload.transition");
		Ok(())
	}

	/// Overrides the lifecycle graph. Only for resets, emergency stop and its recovery.
	fn force_state(&self, to: ReloadState) {
		self.inner.state.store(to as u8, Ordering::Release);
	}
}

impl std::fmt::Debug for ReloadStateMachine {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ReloadStateMachine")
			.field("state", &self.current_state())
			.field("active", &self.active_count())
			.field("pending", &self.pending_count())
			.field("ready", &self.is_system_ready())
			.finish()
	}
}
