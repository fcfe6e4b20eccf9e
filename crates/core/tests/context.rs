//! Integration tests for the reload context.
//!
//! These drive the three components through the context the way a host
//! would: scoped reloads, quiesced sections, the consistency probe, and
//! shutdown ordering.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use swapguard_config::{ConfigError, SwapguardConfig};
use swapguard_core::{ContextError, QuiesceError, ReloadContext, ReloadError};
use swapguard_gateway::{CallKind, CallbackResult};
use swapguard_monitor::ViolationKind;
use swapguard_primitives::Severity;
use swapguard_state::{BeginError, ReloadKind, ReloadState};

fn config() -> SwapguardConfig {
	let mut config = SwapguardConfig::default();
	config.monitor.start_on_init = false;
	config.monitor.log_violations = false;
	config
}

fn context_with(config: SwapguardConfig) -> Arc<ReloadContext> {
	let _ = tracing_subscriber::fmt::try_init();
	ReloadContext::new(config).unwrap()
}

fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
	let end = Instant::now() + deadline;
	while Instant::now() < end {
		if cond() {
			return true;
		}
		thread::sleep(Duration::from_millis(2));
	}
	cond()
}

#[test]
fn fresh_context_is_ready_and_healthy() {
	let ctx = context_with(config());
	assert!(ctx.state().is_system_ready());
	assert!(ctx.gateway().is_ready());
	assert!(ctx.monitor().is_initialized());
	assert!(!ctx.monitor().is_monitoring());
	assert!(ctx.is_healthy());

	let report = ctx.export_diagnostics_report();
	for section in ["== reload context ==", "== reload state ==", "== callback gateway ==", "== concurrency monitor =="] {
		assert!(report.contains(section), "missing {section}");
	}
}

#[test]
fn start_on_init_spawns_the_detection_thread() {
	let mut config = config();
	config.monitor.start_on_init = true;
	let ctx = context_with(config);
	assert!(ctx.monitor().is_monitoring());
	ctx.shutdown();
	assert!(!ctx.monitor().is_monitoring());
}

#[test]
fn invalid_config_is_rejected() {
	let mut config = config();
	config.gateway.max_concurrent_callbacks = 0;
	let err = ReloadContext::new(config).unwrap_err();
	assert!(matches!(
		err,
		ContextError::Config(ConfigError::Invalid {
			field: "gateway.max_concurrent_callbacks",
			..
		})
	));
}

#[test]
fn builds_from_config_file() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("swapguard.toml");
	std::fs::write(
		&path,
		"[state]\nmax_pending = 2\n\n[monitor]\nstart_on_init = false\n\n[gateway]\nmax_concurrent_callbacks = 8\n",
	)
	.unwrap();

	let ctx = ReloadContext::from_config_file(&path).unwrap();
	assert_eq!(ctx.config().state.max_pending, 2);
	assert_eq!(ctx.gateway().config().max_concurrent_callbacks, 8);

	let missing = ReloadContext::from_config_file(dir.path().join("absent.toml")).unwrap_err();
	assert!(matches!(missing, ContextError::Config(ConfigError::Io { .. })));
}

#[test]
fn successful_reload_returns_value_and_frees_slot() {
	let ctx = context_with(config());
	let value = ctx
		.run_reload(ReloadKind::Assembly, |session| {
			assert_eq!(session.kind(), ReloadKind::Assembly);
			assert_eq!(session.machine().current_state(), ReloadState::InProgress);
			Ok::<_, String>(42)
		})
		.unwrap();

	assert_eq!(value, 42);
	assert_eq!(ctx.state().current_state(), ReloadState::Idle);
	let stats = ctx.state().statistics();
	assert_eq!((stats.started, stats.succeeded, stats.failed), (1, 1, 0));
}

#[test]
fn failing_reload_is_recorded_as_failed() {
	let ctx = context_with(config());
	let err = ctx.run_reload(ReloadKind::Full, |_| Err::<(), _>("compile error")).unwrap_err();
	assert!(matches!(err, ReloadError::Operation("compile error")));
	assert_eq!(ctx.state().current_state(), ReloadState::Idle);
	assert_eq!(ctx.state().statistics().failed, 1);
}

#[test]
fn panicking_reload_is_recorded_as_failed() {
	let ctx = context_with(config());
	let result = panic::catch_unwind(AssertUnwindSafe(|| {
		let _ = ctx.run_reload(ReloadKind::Method, |_| -> Result<(), String> { panic!("patch blew up") });
	}));
	assert!(result.is_err());
	assert_eq!(ctx.state().current_state(), ReloadState::Idle);
	assert_eq!(ctx.state().statistics().failed, 1);
	assert_eq!(ctx.state().active_count(), 0);
}

#[test]
fn nested_reload_is_refused() {
	let ctx = context_with(config());
	let inner = ctx
		.run_reload(ReloadKind::Full, |_| {
			Ok::<_, String>(ctx.run_reload(ReloadKind::Incremental, |_| Ok::<_, String>(())).err())
		})
		.unwrap();
	assert!(matches!(inner, Some(ReloadError::Begin(BeginError::Queued { pending: 1 }))));
	assert_eq!(ctx.state().pending_count(), 0);
}

#[test]
fn emergency_stop_interrupts_running_reload() {
	let mut config = config();
	config.state.emergency_reset_delay = Duration::from_millis(50);
	let ctx = context_with(config);

	let err = ctx
		.run_reload(ReloadKind::Full, |session| {
			assert_eq!(session.machine().emergency_stop_all(), 1);
			Ok::<_, String>(())
		})
		.unwrap_err();
	assert!(matches!(err, ReloadError::Interrupted(_)));
	assert_eq!(ctx.state().current_state(), ReloadState::Cancelled);
	assert!(wait_until(Duration::from_secs(5), || ctx.state().current_state() == ReloadState::Idle));
	assert!(ctx.run_reload(ReloadKind::Full, |_| Ok::<_, String>(())).is_ok());
}

#[test]
fn quiesced_section_waits_for_active_reload() {
	let ctx = context_with(config());
	let session = ctx.state().begin_session(ReloadKind::Incremental).unwrap();

	assert_eq!(
		ctx.with_reload_quiesced(Duration::from_millis(20), || ()),
		Err(QuiesceError::TimedOut(Duration::from_millis(20)))
	);

	let waiter = {
		let ctx = Arc::clone(&ctx);
		thread::spawn(move || ctx.with_reload_quiesced(Duration::from_secs(5), || "ran"))
	};
	assert!(wait_until(Duration::from_secs(5), || ctx.waiting_threads() == 1));
	session.succeed().unwrap();

	assert_eq!(waiter.join().unwrap(), Ok("ran"));
	assert_eq!(ctx.waiting_threads(), 0);
	assert_eq!(ctx.with_reload_quiesced(Duration::ZERO, || 5), Ok(5));
}

#[test]
fn probe_reports_stuck_session_once() {
	let mut config = config();
	config.state.reload_timeout = Duration::from_millis(10);
	let ctx = context_with(config);
	let session = ctx.state().begin_session(ReloadKind::Full).unwrap();
	thread::sleep(Duration::from_millis(30));

	ctx.monitor().run_detection_cycle();
	ctx.monitor().run_detection_cycle();
	let reports = ctx.monitor().violation_reports(Severity::Info);
	assert_eq!(reports.len(), 1);
	assert_eq!(reports[0].kind, ViolationKind::MemoryOrdering);
	assert_eq!(reports[0].severity, Severity::Warning);
	assert_eq!(reports[0].resource_name.as_deref(), Some("reload-state"));
	assert!(!ctx.is_healthy());

	session.succeed().unwrap();
	ctx.monitor().run_detection_cycle();
	assert_eq!(ctx.monitor().violation_reports(Severity::Info).len(), 1);
	assert!(ctx.is_healthy());
}

#[test]
fn gateway_calls_are_bounded_through_the_context() {
	let ctx = context_with(config());
	let outcome = ctx.gateway().execute(CallKind::Custom("tick"), || Ok(3));
	assert_eq!(outcome.result, CallbackResult::Success);
	assert_eq!(ctx.gateway().statistics().succeeded, 1);
}

#[test]
fn shutdown_is_idempotent_and_closes_everything() {
	let dir = tempfile::tempdir().unwrap();
	let log = dir.path().join("violations.log");
	let mut config = config();
	config.monitor.start_on_init = true;
	config.monitor.violation_log_path = Some(log.clone());
	let ctx = context_with(config);

	ctx.shutdown();
	ctx.shutdown();
	assert!(ctx.is_shut_down());
	assert!(!ctx.state().is_system_ready());
	assert!(!ctx.gateway().is_ready());
	assert!(!ctx.monitor().is_monitoring());
	assert!(!ctx.is_healthy());
	assert!(log.exists());

	assert_eq!(ctx.gateway().execute(CallKind::Custom("late"), || Ok(())).result, CallbackResult::SystemNotReady);
	assert!(matches!(
		ctx.run_reload(ReloadKind::Full, |_| Ok::<_, String>(())),
		Err(ReloadError::Begin(BeginError::NotReady))
	));
}

#[test]
fn unbounded_timeouts_leave_recovery_waiting_and_shutdown_prompt() {
	let mut config = config();
	config.state.emergency_reset_delay = Duration::MAX;
	config.state.shutdown_drain_timeout = Duration::MAX;
	config.gateway.shutdown_drain_timeout = Duration::MAX;
	let ctx = context_with(config);

	assert_eq!(ctx.with_reload_quiesced(Duration::MAX, || 1), Ok(1));
	assert!(ctx.gateway().wait_for_callback_slot(Duration::MAX));

	let err = ctx
		.run_reload(ReloadKind::Full, |session| {
			session.machine().emergency_stop_all();
			Ok::<_, String>(())
		})
		.unwrap_err();
	assert!(matches!(err, ReloadError::Interrupted(_)));
	thread::sleep(Duration::from_millis(30));
	assert!(ctx.state().is_recovery_pending());
	assert!(ctx.state().is_emergency_stopped());

	let started = Instant::now();
	ctx.shutdown();
	assert!(started.elapsed() < Duration::from_secs(5));
	assert!(!ctx.state().is_recovery_pending());
	assert_eq!(ctx.state().current_state(), ReloadState::Idle);
}
