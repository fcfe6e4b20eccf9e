use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use swapguard_config::MonitorConfig;
use swapguard_primitives::{Severity, ThreadTag};
use swapguard_worker::{GenerationClock, StopToken, TaskClass, ThreadJoinCtrl, WorkerRecord, WorkerRegistry};

use crate::ledger::{RaceWindows, ResourceAccessLedger};
use crate::lock_order::LockOrderTable;
use crate::report::ViolationLog;
use crate::stats::{MonitorStats, MonitorStatsSnapshot};
use crate::threads::ThreadTable;
use crate::{AccessPattern, LockId, MonitorError, ResourceId, ViolationKind, ViolationReport};

pub(crate) const MONITOR_THREAD: &str = "swapguard-monitor";
const STOP_JOIN_BUDGET: Duration = Duration::from_secs(5);
/// Fraction of the detection interval a cycle may use before it is logged as slow.
const SLOW_CYCLE_RATIO: f64 = 0.8;

/// Extra check run at the end of every detection cycle.
///
/// Probes run on the detection thread without any monitor lock held and may
/// call back into the monitor, typically to [`ConcurrencyMonitor::report_violation`].
pub trait CycleProbe: Send + Sync {
	fn name(&self) -> &str;
	fn probe(&self, monitor: &ConcurrencyMonitor);
}

/// What one detection cycle found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
	pub races: usize,
	pub unsafe_accesses: usize,
	pub deadlocks: usize,
	pub leaks: usize,
	pub expired_records: usize,
	pub expired_threads: usize,
	pub elapsed: Duration,
}

impl CycleSummary {
	pub const fn violations(&self) -> usize {
		self.races + self.unsafe_accesses + self.deadlocks + self.leaks
	}
}

struct Worker {
	stop: StopToken,
	ctrl: ThreadJoinCtrl,
}

pub(crate) struct Inner {
	pub(crate) initialized: AtomicBool,
	pub(crate) config: RwLock<MonitorConfig>,
	pub(crate) ledger: Mutex<ResourceAccessLedger>,
	pub(crate) locks: Mutex<LockOrderTable>,
	pub(crate) threads: Mutex<ThreadTable>,
	pub(crate) violations: Mutex<ViolationLog>,
	probes: Mutex<Vec<Arc<dyn CycleProbe>>>,
	pub(crate) stats: MonitorStats,
	worker: Mutex<Option<Worker>>,
	pub(crate) workers: WorkerRegistry,
	generations: GenerationClock,
}

/// Background detector for violations of the pipeline's own concurrency discipline.
///
/// A cheap-to-clone handle. Each table has its own mutex and no method holds
/// two of them at once; findings are collected under one lock and reported
/// after it is released.
#[derive(Clone)]
pub struct ConcurrencyMonitor {
	pub(crate) inner: Arc<Inner>,
}

impl Default for ConcurrencyMonitor {
	fn default() -> Self {
		Self::new()
	}
}

impl ConcurrencyMonitor {
	pub fn new() -> Self {
		let config = MonitorConfig::default();
		Self {
			inner: Arc::new(Inner {
				initialized: AtomicBool::new(false),
				ledger: Mutex::new(ResourceAccessLedger::new(config.max_records_per_resource, config.coalesce_window)),
				locks: Mutex::new(LockOrderTable::new()),
				threads: Mutex::new(ThreadTable::default()),
				violations: Mutex::new(ViolationLog::new(config.max_violation_reports)),
				config: RwLock::new(config),
				probes: Mutex::new(Vec::new()),
				stats: MonitorStats::default(),
				worker: Mutex::new(None),
				workers: WorkerRegistry::new(),
				generations: GenerationClock::new(),
			}),
		}
	}

	/// Resets every table to `config` and registers the calling thread.
	pub fn initialize(&self, config: MonitorConfig) -> Result<(), MonitorError> {
		if self.inner.initialized.swap(true, Ordering::AcqRel) {
			return Err(MonitorError::AlreadyInitialized);
		}
		*self.inner.ledger.lock() = ResourceAccessLedger::new(config.max_records_per_resource, config.coalesce_window);
		*self.inner.locks.lock() = LockOrderTable::new();
		*self.inner.threads.lock() = ThreadTable::default();
		*self.inner.violations.lock() = ViolationLog::new(config.max_violation_reports);
		self.inner.stats.reset();
		tracing::info!(
			interval_ms = config.detection_interval.as_millis() as u64,
			min_severity = config.min_report_severity.as_str(),
			"monitor.initialized"
		);
		*self.inner.config.write() = config;

		let current = std::thread::current();
		self.register_current_thread(current.name().unwrap_or("main"));
		Ok(())
	}

	/// Stops the detection thread, logs the final diagnostics, and writes the
	/// violation report to the configured log file.
	pub fn shutdown(&self) {
		if !self.inner.initialized.load(Ordering::Acquire) {
			return;
		}
		self.stop_monitoring();
		tracing::info!(report = %self.export_diagnostics_report(), "monitor.shutdown.report");

		let path = self.inner.config.read().violation_log_path.clone();
		if let Some(path) = path {
			match std::fs::write(&path, self.export_violation_report()) {
				Ok(()) => tracing::info!(path = %path.display(), "monitor.violation_log.written"),
				Err(error) => tracing::error!(path = %path.display(), %error, "monitor.violation_log.write_failed"),
			}
		}
		self.inner.probes.lock().clear();
		self.inner.initialized.store(false, Ordering::Release);
		tracing::info!("monitor.shutdown.done");
	}

	pub fn is_initialized(&self) -> bool {
		self.inner.initialized.load(Ordering::Acquire)
	}

	pub fn update_config(&self, config: MonitorConfig) {
		*self.inner.config.write() = config;
	}

	pub fn config(&self) -> MonitorConfig {
		self.inner.config.read().clone()
	}

	/// Spawns the detection thread.
	pub fn start_monitoring(&self) -> Result<(), MonitorError> {
		if !self.is_initialized() {
			return Err(MonitorError::NotInitialized);
		}
		let generation = {
			let mut worker = self.inner.worker.lock();
			if worker.is_some() {
				return Err(MonitorError::AlreadyRunning);
			}
			let stop = StopToken::new();
			let waiter = stop.clone();
			let monitor = self.clone();
			let ctrl = ThreadJoinCtrl::spawn(TaskClass::Monitoring, MONITOR_THREAD, move || monitor.run_loop(&waiter))
				.map_err(MonitorError::Spawn)?;
			*worker = Some(Worker { stop, ctrl });
			self.inner.generations.next()
		};
		self.inner.workers.upsert(WorkerRecord::started(MONITOR_THREAD, TaskClass::Monitoring, generation));
		tracing::info!(generation, "monitor.started");
		Ok(())
	}

	/// Stops and joins the detection thread. No-op when it is not running.
	pub fn stop_monitoring(&self) {
		let Some(worker) = self.inner.worker.lock().take() else {
			return;
		};
		worker.stop.cancel();
		let exit = if worker.ctrl.join_with_timeout(STOP_JOIN_BUDGET) {
			worker.ctrl.panic_message().map_or_else(|| "stopped".to_string(), |msg| format!("panicked: {msg}"))
		} else {
			tracing::warn!(budget_ms = STOP_JOIN_BUDGET.as_millis() as u64, "monitor.stop.join_timeout");
			"detached".to_string()
		};
		self.inner.workers.mark_exited(MONITOR_THREAD, exit);
		tracing::info!("monitor.stopped");
	}

	pub fn is_monitoring(&self) -> bool {
		self.inner.worker.lock().is_some()
	}

	/// Background threads owned by the monitor.
	pub fn workers(&self) -> Vec<WorkerRecord> {
		self.inner.workers.snapshots()
	}

	fn run_loop(&self, stop: &StopToken) {
		tracing::debug!("monitor.loop.enter");
		loop {
			let interval = self.inner.config.read().detection_interval;
			if stop.wait_timeout(interval) {
				break;
			}
			self.run_detection_cycle();
			self.inner.workers.record_cycle(MONITOR_THREAD);
		}
		tracing::debug!("monitor.loop.exit");
	}

	pub fn add_cycle_probe(&self, probe: Arc<dyn CycleProbe>) {
		tracing::debug!(probe = probe.name(), "monitor.probe.add");
		self.inner.probes.lock().push(probe);
	}

	pub fn clear_cycle_probes(&self) {
		self.inner.probes.lock().clear();
	}

	pub fn register_thread(&self, thread: ThreadTag, name: &str) {
		self.inner.threads.lock().register(thread, name.into(), Instant::now());
		tracing::debug!(thread = %thread, name, "monitor.thread.register");
	}

	pub fn register_current_thread(&self, name: &str) {
		self.register_thread(ThreadTag::current(), name);
	}

	/// Forgets the thread and any locks it was recorded as holding.
	pub fn unregister_thread(&self, thread: ThreadTag) {
		let known = self.inner.threads.lock().unregister(thread);
		self.inner.locks.lock().remove_thread(thread);
		tracing::debug!(thread = %thread, known, "monitor.thread.unregister");
	}

	/// Records an access by the calling thread.
	pub fn record_resource_access(&self, resource: impl Into<ResourceId>, name: &str, pattern: AccessPattern) {
		self.record_access_from(ThreadTag::current(), resource, name, pattern);
	}

	/// Records an access on behalf of `thread`.
	pub fn record_access_from(&self, thread: ThreadTag, resource: impl Into<ResourceId>, name: &str, pattern: AccessPattern) {
		if !self.is_initialized() || !self.inner.config.read().enable_resource_tracking {
			return;
		}
		let now = Instant::now();
		self.inner.ledger.lock().record(resource.into(), name, thread, pattern, now);
		self.inner.stats.record_access();
		self.touch_thread(thread, now);
	}

	/// Records that the calling thread now holds `lock`.
	///
	/// Reports a lock-order inversion immediately, and excessive nesting when
	/// the thread holds more than `max_held_locks`.
	pub fn record_lock_acquisition(&self, lock: LockId, name: &str) {
		let (order_checks, max_held) = {
			let config = self.inner.config.read();
			if !config.enable_lock_order_validation && !config.enable_deadlock_detection {
				return;
			}
			(config.enable_lock_order_validation, config.max_held_locks)
		};
		if !self.is_initialized() {
			return;
		}
		let thread = ThreadTag::current();
		let now = Instant::now();
		let check = self.inner.locks.lock().acquire(thread, lock, name, now);
		self.touch_thread(thread, now);

		if !order_checks {
			return;
		}
		if let Some((held, held_name)) = check.inverted_against {
			let report = ViolationReport::new(
				ViolationKind::LockOrderViolation,
				Severity::Warning,
				format!(
					"{} acquired {name} ({lock}) while holding {held_name} ({held})",
					self.describe_thread(thread)
				),
			)
			.resource(name)
			.thread(thread)
			.detail("acquired", lock)
			.detail("held", held);
			self.report_violation(report);
		}
		if check.depth > max_held {
			let report = ViolationReport::new(
				ViolationKind::ExcessiveLocking,
				Severity::Warning,
				format!("{} holds {} locks (limit {max_held})", self.describe_thread(thread), check.depth),
			)
			.resource(name)
			.thread(thread)
			.detail("depth", check.depth);
			self.report_violation(report);
		}
	}

	/// Records that the calling thread released `lock`.
	pub fn record_lock_release(&self, lock: LockId, name: &str) {
		{
			let config = self.inner.config.read();
			if !config.enable_lock_order_validation && !config.enable_deadlock_detection {
				return;
			}
		}
		if !self.is_initialized() {
			return;
		}
		let thread = ThreadTag::current();
		if !self.inner.locks.lock().release(thread, lock) {
			let report = ViolationReport::new(
				ViolationKind::ThreadUnsafeUsage,
				Severity::Warning,
				format!("{} released {name} ({lock}) without holding it", self.describe_thread(thread)),
			)
			.resource(name)
			.thread(thread);
			self.report_violation(report);
		}
	}

	/// Stores `report` if it passes the severity filter. Returns whether it was stored.
	pub fn report_violation(&self, report: ViolationReport) -> bool {
		let (min, log) = {
			let config = self.inner.config.read();
			(config.min_report_severity, config.log_violations)
		};
		if report.severity < min {
			return false;
		}
		self.inner.stats.record_violation(report.kind);
		if log {
			log_violation(&report);
		}
		let evicted = self.inner.violations.lock().push(report);
		if evicted > 0 {
			self.inner.stats.record_evicted(evicted);
			tracing::debug!(evicted, "monitor.violations.evicted");
		}
		true
	}

	/// Runs one detection pass: races, deadlock potential, leaks, expiry, probes.
	pub fn run_detection_cycle(&self) -> CycleSummary {
		let started = Instant::now();
		let config = self.inner.config.read().clone();
		let mut summary = CycleSummary::default();

		if config.enable_race_detection {
			let findings = self.inner.ledger.lock().analyze_races(RaceWindows {
				analysis_window: config.analysis_window,
				race: config.race_window,
				conflict: config.conflict_window,
			});
			for finding in findings {
				let (severity, verb) = match finding.kind {
					ViolationKind::RaceCondition => {
						summary.races += 1;
						(Severity::Error, "overlapping writes")
					}
					_ => {
						summary.unsafe_accesses += 1;
						(Severity::Warning, "unsynchronised read/write")
					}
				};
				let report = ViolationReport::new(
					finding.kind,
					severity,
					format!(
						"{verb} on {} by {} ({}) and {} ({}) {}ms apart",
						finding.resource_name,
						self.describe_thread(finding.earlier.0),
						finding.earlier.1.as_str(),
						self.describe_thread(finding.later.0),
						finding.later.1.as_str(),
						finding.gap.as_millis(),
					),
				)
				.resource(Arc::clone(&finding.resource_name))
				.thread(finding.earlier.0)
				.thread(finding.later.0)
				.detail("resource_id", &finding.resource)
				.detail("gap_ms", finding.gap.as_millis());
				self.report_violation(report);
			}
		}

		if config.enable_deadlock_detection {
			let findings = self.inner.locks.lock().detect_deadlocks();
			summary.deadlocks = findings.len();
			for finding in findings {
				let (a, b) = finding.threads;
				let names: Vec<_> = finding.shared.iter().map(|(lock, name)| format!("{name} ({lock})")).collect();
				let mut report = ViolationReport::new(
					ViolationKind::DeadlockPotential,
					Severity::Error,
					format!("{} and {} both hold {}", self.describe_thread(a), self.describe_thread(b), names.join(", ")),
				)
				.thread(a)
				.thread(b);
				if let Some((_, name)) = finding.shared.first() {
					report = report.resource(Arc::clone(name));
				}
				self.report_violation(report);
			}
		}

		let now = Instant::now();
		if config.enable_resource_tracking {
			let findings = self.inner.ledger.lock().detect_leaks(now, config.resource_leak_timeout);
			summary.leaks = findings.len();
			for finding in findings {
				let report = ViolationReport::new(
					ViolationKind::ResourceLeak,
					Severity::Warning,
					format!(
						"{} untouched for {}ms (last by {})",
						finding.resource_name,
						finding.idle.as_millis(),
						self.describe_thread(finding.last_thread),
					),
				)
				.resource(Arc::clone(&finding.resource_name))
				.thread(finding.last_thread)
				.detail("idle_ms", finding.idle.as_millis());
				self.report_violation(report);
			}
		}

		summary.expired_records = self.inner.ledger.lock().expire(now, config.record_expiry);
		let idle_threads = self.inner.threads.lock().expire_idle(now, config.thread_idle_expiry);
		summary.expired_threads = idle_threads.len();
		if !idle_threads.is_empty() {
			let mut locks = self.inner.locks.lock();
			for thread in &idle_threads {
				locks.remove_thread(*thread);
			}
		}

		let probes = self.inner.probes.lock().clone();
		for probe in probes {
			tracing::trace!(probe = probe.name(), "monitor.probe.run");
			probe.probe(self);
		}

		summary.elapsed = started.elapsed();
		self.inner.stats.record_cycle(summary.elapsed);
		if summary.elapsed.as_secs_f64() > config.detection_interval.as_secs_f64() * SLOW_CYCLE_RATIO {
			tracing::warn!(
				elapsed_ms = summary.elapsed.as_millis() as u64,
				interval_ms = config.detection_interval.as_millis() as u64,
				"monitor.cycle.slow"
			);
		}
		tracing::trace!(
			races = summary.races,
			unsafe_accesses = summary.unsafe_accesses,
			deadlocks = summary.deadlocks,
			leaks = summary.leaks,
			"monitor.cycle"
		);
		summary
	}

	/// Stored reports with `severity >= min`, oldest first.
	pub fn violation_reports(&self, min: Severity) -> Vec<ViolationReport> {
		self.inner.violations.lock().at_least(min)
	}

	pub fn clear_violation_reports(&self) {
		self.inner.violations.lock().clear();
		tracing::debug!("monitor.violations.cleared");
	}

	/// False once a critical report is stored or the accepted violation count
	/// exceeds the configured threshold.
	pub fn is_system_healthy(&self) -> bool {
		let threshold = self.inner.config.read().unhealthy_violation_threshold;
		!self.inner.violations.lock().has_critical() && self.inner.stats.total() <= threshold
	}

	pub fn statistics(&self) -> MonitorStatsSnapshot {
		let mut snapshot = self.inner.stats.snapshot();
		snapshot.stored_reports = self.inner.violations.lock().len();
		{
			let ledger = self.inner.ledger.lock();
			snapshot.tracked_resources = ledger.resource_count();
			snapshot.tracked_records = ledger.record_count();
		}
		snapshot.monitored_threads = self.inner.threads.lock().len();
		snapshot.threads_holding_locks = self.inner.locks.lock().thread_count();
		snapshot
	}

	/// Clears counters without touching stored reports or tables.
	pub fn reset_statistics(&self) {
		self.inner.stats.reset();
	}

	/// Locks currently recorded as held by `thread`, in acquisition order.
	pub fn held_locks(&self, thread: ThreadTag) -> Vec<LockId> {
		self.inner.locks.lock().held_by(thread)
	}

	/// "t3 (render)" when the thread is known, "t3" otherwise.
	pub(crate) fn describe_thread(&self, thread: ThreadTag) -> String {
		match self.inner.threads.lock().name(thread) {
			Some(name) => format!("{thread} ({name})"),
			None => thread.to_string(),
		}
	}

	fn touch_thread(&self, thread: ThreadTag, now: Instant) {
		self.inner.threads.lock().touch(thread, now, || {
			if thread == ThreadTag::current() {
				std::thread::current().name().unwrap_or("unnamed").into()
			} else {
				"unnamed".into()
			}
		});
	}
}

fn log_violation(report: &ViolationReport) {
	let resource = report.resource_name.as_deref().unwrap_or("-");
	let threads: Vec<_> = report.threads.iter().map(ToString::to_string).collect();
	let threads = threads.join(",");
	match report.severity {
		Severity::Critical | Severity::Error => tracing::error!(
			kind = report.kind.as_str(),
			severity = report.severity.as_str(),
			resource,
			threads = %threads,
			description = %report.description,
			"monitor.violation"
		),
		Severity::Warning => tracing::warn!(
			kind = report.kind.as_str(),
			resource,
			threads = %threads,
			description = %report.description,
			"monitor.violation"
		),
		Severity::Info => tracing::info!(
			kind = report.kind.as_str(),
			resource,
			threads = %threads,
			description = %report.description,
			"monitor.violation"
		),
	}
}

impl std::fmt::Debug for ConcurrencyMonitor {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ConcurrencyMonitor")
			.field("initialized", &self.is_initialized())
			.field("monitoring", &self.is_monitoring())
			.finish()
	}
}
