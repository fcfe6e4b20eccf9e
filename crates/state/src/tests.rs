use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;

use proptest::prelude::*;
use rstest::rstest;
use swapguard_config::StateConfig;

use super::*;

fn machine_with(configure: impl FnOnce(&mut StateConfig)) -> ReloadStateMachine {
	let _ = tracing_subscriber::fmt::try_init();
	let mut config = StateConfig {
		emergency_reset_delay: Duration::from_millis(50),
		shutdown_drain_timeout: Duration::from_secs(2),
		..StateConfig::default()
	};
	configure(&mut config);
	let machine = ReloadStateMachine::new();
	machine.initialize(config);
	machine
}

fn machine() -> ReloadStateMachine {
	machine_with(|_| {})
}

#[rstest]
#[case(ReloadState::Idle, ReloadState::Preparing, true)]
#[case(ReloadState::Idle, ReloadState::InProgress, false)]
#[case(ReloadState::Preparing, ReloadState::InProgress, true)]
#[case(ReloadState::Preparing, ReloadState::Cancelled, true)]
#[case(ReloadState::InProgress, ReloadState::Finalizing, true)]
#[case(ReloadState::InProgress, ReloadState::Idle, false)]
#[case(ReloadState::Finalizing, ReloadState::Idle, true)]
#[case(ReloadState::Finalizing, ReloadState::Cancelled, false)]
#[case(ReloadState::Failed, ReloadState::Idle, true)]
#[case(ReloadState::Failed, ReloadState::InProgress, false)]
#[case(ReloadState::Cancelled, ReloadState::Idle, true)]
#[case(ReloadState::Cancelled, ReloadState::Preparing, false)]
fn transition_table(#[case] from: ReloadState, #[case] to: ReloadState, #[case] allowed: bool) {
	assert_eq!(from.can_transition_to(to), allowed, "{from} -> {to}");
}

#[test]
fn uninitialised_machine_is_not_ready() {
	let machine = ReloadStateMachine::new();
	assert_eq!(machine.begin(ReloadKind::Full), Err(BeginError::NotReady));
	assert!(!machine.is_hot_reloading());
}

#[test]
fn begin_and_end_round_trip() {
	let machine = machine();
	let id = machine.begin(ReloadKind::Incremental).unwrap();
	assert_eq!(machine.current_state(), ReloadState::InProgress);
	assert_eq!(machine.current_kind(), ReloadKind::Incremental);
	assert_eq!(machine.active_count(), 1);
	assert!(machine.is_hot_reloading());

	machine.end(id, SessionOutcome::Succeeded, Duration::from_millis(40)).unwrap();
	assert_eq!(machine.current_state(), ReloadState::Idle);
	assert_eq!(machine.active_count(), 0);

	let next = machine.begin(ReloadKind::Full).unwrap();
	assert!(next > id);
	machine.end(next, SessionOutcome::Failed, Duration::from_millis(5)).unwrap();

	let stats = machine.statistics();
	assert_eq!((stats.started, stats.succeeded, stats.failed), (2, 1, 1));
	assert_eq!(stats.avg_duration_ms, 40.0);
	assert_eq!(stats.max_duration_ms, 40.0);
	assert_eq!(stats.success_rate(), 0.5);
}

#[test]
fn busy_slot_queues_until_pending_limit() {
	let machine = machine_with(|config| config.max_pending = 2);
	let id = machine.begin(ReloadKind::Full).unwrap();
	assert_eq!(machine.begin(ReloadKind::Method), Err(BeginError::Queued { pending: 1 }));
	assert_eq!(machine.begin(ReloadKind::Method), Err(BeginError::Queued { pending: 2 }));
	assert_eq!(machine.begin(ReloadKind::Method), Err(BeginError::Busy(ReloadState::InProgress)));
	assert_eq!(machine.active_count(), 1);

	machine.end(id, SessionOutcome::Succeeded, Duration::ZERO).unwrap();
	assert_eq!(machine.pending_count(), 1);
	let stats = machine.statistics();
	assert_eq!((stats.queued, stats.busy_rejections), (2, 1));
}

#[test]
fn disabled_queue_rejects_as_busy() {
	let machine = machine_with(|config| config.enable_queue = false);
	let _id = machine.begin(ReloadKind::Full).unwrap();
	assert_eq!(machine.begin(ReloadKind::Full), Err(BeginError::Busy(ReloadState::InProgress)));
	assert_eq!(machine.pending_count(), 0);
}

#[test]
fn end_rejects_idle_and_unknown_sessions() {
	let machine = machine();
	let id = machine.begin(ReloadKind::Full).unwrap();
	let stranger = SessionId(id.get() + 100);
	assert_eq!(
		machine.end(stranger, SessionOutcome::Succeeded, Duration::ZERO),
		Err(EndError::UnknownSession(stranger))
	);
	machine.end(id, SessionOutcome::Succeeded, Duration::ZERO).unwrap();
	assert_eq!(
		machine.end(id, SessionOutcome::Succeeded, Duration::ZERO),
		Err(EndError::InvalidState(ReloadState::Idle))
	);
}

#[test]
fn cancel_when_idle_is_idempotent() {
	let machine = machine();
	let before = machine.statistics();
	assert_eq!(machine.cancel(SessionId(42)), Ok(()));
	assert_eq!(machine.cancel(SessionId(42)), Ok(()));
	assert_eq!(machine.statistics(), before);
	assert_eq!(machine.active_count(), 0);
}

#[test]
fn cancel_releases_the_slot() {
	let machine = machine();
	let id = machine.begin(ReloadKind::Assembly).unwrap();
	machine.cancel(id).unwrap();
	assert_eq!(machine.current_state(), ReloadState::Idle);
	assert_eq!(machine.active_count(), 0);
	assert_eq!(machine.statistics().cancelled, 1);
	assert!(machine.active_sessions().is_empty());
}

#[test]
fn concurrent_begin_admits_exactly_one() {
	const THREADS: usize = 16;
	let machine = machine();
	let barrier = Arc::new(Barrier::new(THREADS));
	let handles: Vec<_> = (0..THREADS)
		.map(|_| {
			let machine = machine.clone();
			let barrier = Arc::clone(&barrier);
			std::thread::spawn(move || {
				barrier.wait();
				machine.begin(ReloadKind::Full)
			})
		})
		.collect();
	let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

	let admitted = results.iter().filter(|r| r.is_ok()).count();
	let queued = results.iter().filter(|r| matches!(r, Err(BeginError::Queued { .. }))).count();
	let busy = results.iter().filter(|r| matches!(r, Err(BeginError::Busy(_)))).count();
	assert_eq!(admitted, 1);
	assert_eq!(queued, 10);
	assert_eq!(busy, THREADS - 11);
	assert_eq!(machine.active_count(), 1);
	assert_eq!(machine.validate_state_consistency(), 0);
}

#[test]
fn wait_for_completion_wakes_on_end() {
	let machine = machine();
	let id = machine.begin(ReloadKind::Full).unwrap();
	assert!(!machine.wait_for_completion(Duration::from_millis(10)));

	let ender = machine.clone();
	let handle = std::thread::spawn(move || {
		std::thread::sleep(Duration::from_millis(20));
		ender.end(id, SessionOutcome::Succeeded, Duration::from_millis(20)).unwrap();
	});
	assert!(machine.wait_for_completion(Duration::from_secs(5)));
	handle.join().unwrap();
}

#[test]
fn begin_or_wait_claims_slot_after_release() {
	let machine = machine();
	let first = machine.begin(ReloadKind::Full).unwrap();
	let ender = machine.clone();
	let handle = std::thread::spawn(move || {
		std::thread::sleep(Duration::from_millis(30));
		ender.end(first, SessionOutcome::Succeeded, Duration::from_millis(30)).unwrap();
	});

	let second = machine.begin_or_wait(ReloadKind::Method, Duration::from_secs(5)).unwrap();
	handle.join().unwrap();
	assert!(second > first);
	assert_eq!(machine.current_kind(), ReloadKind::Method);
	assert_eq!(machine.pending_count(), 0);
}

#[test]
fn begin_or_wait_gives_up_at_deadline() {
	let machine = machine_with(|config| config.enable_queue = false);
	let _held = machine.begin(ReloadKind::Full).unwrap();
	assert_eq!(
		machine.begin_or_wait(ReloadKind::Full, Duration::from_millis(20)),
		Err(BeginError::Busy(ReloadState::InProgress))
	);
}

#[test]
fn unbounded_timeouts_wait_without_deadline() {
	let machine = machine();
	assert!(machine.wait_for_completion(Duration::MAX));
	let first = machine.begin_or_wait(ReloadKind::Full, Duration::MAX).unwrap();

	let waiter = {
		let machine = machine.clone();
		std::thread::spawn(move || {
			let idle = machine.wait_for_completion(Duration::MAX);
			(idle, machine.begin_or_wait(ReloadKind::Method, Duration::MAX))
		})
	};
	std::thread::sleep(Duration::from_millis(20));
	machine.end(first, SessionOutcome::Succeeded, Duration::from_millis(20)).unwrap();

	let (idle, second) = waiter.join().unwrap();
	assert!(idle);
	assert!(second.unwrap() > first);
	assert_eq!(machine.current_kind(), ReloadKind::Method);
}

#[test]
fn unbounded_reset_delay_keeps_recovery_waiting() {
	let machine = machine_with(|config| config.emergency_reset_delay = Duration::MAX);
	machine.emergency_stop_all();
	std::thread::sleep(Duration::from_millis(30));
	assert!(machine.is_recovery_pending());
	assert!(machine.is_emergency_stopped());
	assert!(machine.export_diagnostics_report().contains("recovery_pending=true"));

	machine.initialize(machine.config());
	assert!(!machine.is_recovery_pending());
	assert!(!machine.is_emergency_stopped());
	let id = machine.begin(ReloadKind::Full).unwrap();
	machine.end(id, SessionOutcome::Succeeded, Duration::ZERO).unwrap();
}

#[test]
fn emergency_stop_cancels_everything_then_recovers() {
	let machine = machine();
	let _active = machine.begin(ReloadKind::Full).unwrap();
	assert!(matches!(machine.begin(ReloadKind::Full), Err(BeginError::Queued { .. })));
	assert!(matches!(machine.begin(ReloadKind::Full), Err(BeginError::Queued { .. })));

	let polling = Arc::new(AtomicBool::new(true));
	let pollers: Vec<_> = (0..4)
		.map(|_| {
			let machine = machine.clone();
			let polling = Arc::clone(&polling);
			std::thread::spawn(move || {
				let mut observations = 0_u64;
				while polling.load(Ordering::Relaxed) {
					let _ = machine.current_state();
					let _ = machine.is_hot_reloading();
					observations += 1;
				}
				observations
			})
		})
		.collect();

	assert_eq!(machine.emergency_stop_all(), 1);
	assert_eq!(machine.current_state(), ReloadState::Cancelled);
	assert_eq!(machine.active_count(), 0);
	assert_eq!(machine.pending_count(), 0);
	assert!(machine.is_emergency_stopped());
	assert_eq!(machine.begin(ReloadKind::Full), Err(BeginError::NotReady));
	assert_eq!(machine.validate_state_consistency(), 0);

	assert!(machine.wait_for_completion(Duration::from_secs(5)));
	assert_eq!(machine.current_state(), ReloadState::Idle);
	assert!(!machine.is_emergency_stopped());

	polling.store(false, Ordering::Relaxed);
	for poller in pollers {
		assert!(poller.join().unwrap() > 0);
	}
	let id = machine.begin(ReloadKind::Full).unwrap();
	machine.end(id, SessionOutcome::Succeeded, Duration::ZERO).unwrap();
}

#[test]
fn newer_emergency_stop_supersedes_pending_reset() {
	let machine = machine_with(|config| config.emergency_reset_delay = Duration::from_millis(300));
	machine.emergency_stop_all();
	std::thread::sleep(Duration::from_millis(200));
	machine.emergency_stop_all();
	std::thread::sleep(Duration::from_millis(150));
	assert!(machine.is_emergency_stopped(), "first reset must not reopen the slot");
	assert!(machine.wait_for_completion(Duration::from_secs(5)));
	assert!(!machine.is_emergency_stopped());
}

#[test]
fn dropped_session_is_abandoned_not_failed() {
	let machine = machine();
	let session = machine.begin_session(ReloadKind::Assembly).unwrap();
	assert_eq!(machine.active_count(), 1);
	drop(session);

	let stats = machine.statistics();
	assert_eq!((stats.abandoned, stats.failed), (1, 0));
	assert_eq!(machine.current_state(), ReloadState::Idle);
}

#[test]
fn session_dropped_during_panic_counts_as_failed() {
	let machine = machine();
	let inner = machine.clone();
	let result = std::panic::catch_unwind(AssertUnwindSafe(move || {
		let _session = inner.begin_session(ReloadKind::Full).unwrap();
		panic!("reload step exploded");
	}));
	assert!(result.is_err());
	let stats = machine.statistics();
	assert_eq!((stats.failed, stats.abandoned), (1, 0));
	assert!(!machine.is_hot_reloading());
}

#[test]
fn explicit_session_outcomes() {
	let machine = machine();
	machine.begin_session(ReloadKind::Full).unwrap().succeed().unwrap();
	machine.begin_session(ReloadKind::Full).unwrap().fail().unwrap();
	machine.begin_session(ReloadKind::Full).unwrap().cancel().unwrap();
	let stats = machine.statistics();
	assert_eq!((stats.succeeded, stats.failed, stats.cancelled, stats.abandoned), (1, 1, 1, 0));
}

#[test]
fn platform_phase_requires_active_session() {
	let machine = machine();
	assert_eq!(
		machine.set_platform_phase(PlatformPhase::DomainSwitching),
		Err(PhaseError::NoActiveSession(ReloadState::Idle))
	);
	assert_eq!(machine.set_platform_phase(PlatformPhase::Ready), Ok(PlatformPhase::Ready));

	let id = machine.begin(ReloadKind::Method).unwrap();
	assert_eq!(machine.set_platform_phase(PlatformPhase::MethodReplacing), Ok(PlatformPhase::Ready));
	assert_eq!(machine.platform_phase(), PlatformPhase::MethodReplacing);
	machine.end(id, SessionOutcome::Succeeded, Duration::ZERO).unwrap();
	assert_eq!(machine.platform_phase(), PlatformPhase::Ready);
}

#[test]
fn stuck_session_is_reported() {
	let machine = machine_with(|config| config.reload_timeout = Duration::from_millis(1));
	let id = machine.begin(ReloadKind::Full).unwrap();
	std::thread::sleep(Duration::from_millis(10));
	let issues = machine.consistency_issues();
	assert!(matches!(issues.as_slice(), [ConsistencyIssue::StuckSession { id: stuck, .. }] if *stuck == id));
	assert_eq!(machine.validate_state_consistency(), 1);
	assert!(machine.export_diagnostics_report().contains("consistency: 1 issue(s)"));
}

#[test]
fn shutdown_waits_for_active_session() {
	let machine = machine();
	let id = machine.begin(ReloadKind::Full).unwrap();
	let ender = machine.clone();
	let handle = std::thread::spawn(move || {
		std::thread::sleep(Duration::from_millis(30));
		ender.end(id, SessionOutcome::Succeeded, Duration::from_millis(30))
	});
	machine.shutdown();
	assert_eq!(handle.join().unwrap(), Ok(()));
	assert!(!machine.is_system_ready());
	assert_eq!(machine.begin(ReloadKind::Full), Err(BeginError::NotReady));
	assert_eq!(machine.statistics().succeeded, 1);
	machine.shutdown();
}

#[test]
fn shutdown_force_stops_wedged_session() {
	let machine = machine_with(|config| config.shutdown_drain_timeout = Duration::from_millis(20));
	let _wedged = machine.begin(ReloadKind::Full).unwrap();
	machine.shutdown();
	assert_eq!(machine.current_state(), ReloadState::Idle);
	assert_eq!(machine.active_count(), 0);
	assert!(!machine.is_emergency_stopped());
	assert!(!machine.is_system_ready());
}

#[test]
fn diagnostics_report_lists_sessions_and_counters() {
	let machine = machine();
	let _id = machine.begin(ReloadKind::Incremental).unwrap();
	let report = machine.export_diagnostics_report();
	assert!(report.contains("state=in_progress"), "{report}");
	assert!(report.contains("incremental"), "{report}");
	assert!(report.contains("active=1 pending=0"), "{report}");
	assert!(report.contains("consistency: ok"), "{report}");
}

#[derive(Debug, Clone)]
enum Op {
	Begin(ReloadKind),
	End(usize, bool),
	Cancel(usize),
	Phase,
}

fn op_strategy() -> impl Strategy<Value = Op> {
	let kind = prop_oneof![
		Just(ReloadKind::Full),
		Just(ReloadKind::Incremental),
		Just(ReloadKind::Assembly),
		Just(ReloadKind::Method),
	];
	prop_oneof![
		kind.prop_map(Op::Begin),
		(0..3usize, any::<bool>()).prop_map(|(slot, ok)| Op::End(slot, ok)),
		(0..3usize).prop_map(Op::Cancel),
		Just(Op::Phase),
	]
}

proptest! {
	#[test]
	fn random_operations_keep_state_and_counters_consistent(ops in proptest::collection::vec(op_strategy(), 1..48)) {
		let machine = machine();
		let mut live: Vec<SessionId> = Vec::new();
		for op in ops {
			match op {
				Op::Begin(kind) => {
					if let Ok(id) = machine.begin(kind) {
						live.push(id);
					}
				}
				Op::End(slot, ok) => {
					let id = live.get(slot).copied().unwrap_or(SessionId(u64::MAX));
					let outcome = if ok { SessionOutcome::Succeeded } else { SessionOutcome::Failed };
					if machine.end(id, outcome, Duration::from_millis(1)).is_ok() {
						live.retain(|live_id| *live_id != id);
					}
				}
				Op::Cancel(slot) => {
					let id = live.get(slot).copied().unwrap_or(SessionId(u64::MAX));
					if machine.cancel(id).is_ok() {
						live.retain(|live_id| *live_id != id);
					}
				}
				Op::Phase => {
					let _ = machine.set_platform_phase(PlatformPhase::DomainSwitching);
				}
			}
			prop_assert_eq!(machine.validate_state_consistency(), 0);
			prop_assert_eq!(machine.current_state() == ReloadState::Idle, machine.active_count() == 0);
			prop_assert_eq!(machine.active_sessions().len(), live.len());
			prop_assert!(live.len() <= 1);
		}
	}
}
