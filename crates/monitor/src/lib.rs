//! Concurrency violation monitor for the reload pipeline.
//!
//! # Purpose
//!
//! - Record which threads touch which shared resources, and which locks each thread holds.
//! - Turn those records into [`ViolationReport`]s: races, unsafe read/write overlap, lock-order inversions, deadlock potential, resource leaks.
//! - Keep a bounded, severity-filtered history of reports and answer "is the system healthy?".
//! - Exclude prevention: the monitor observes and reports, it never blocks or repairs the code it watches.
//!
//! # Mental model
//!
//! - Instrumented code calls `record_*` on every access and lock event; these calls are cheap table updates under one short mutex each.
//! - Lock-order inversions are reported synchronously at acquisition time. Everything else is found by [`ConcurrencyMonitor::run_detection_cycle`], run either by the background thread or directly by tests.
//! - Detection looks only at adjacent records per resource, and each pair is classified once.
//! - [`CycleProbe`]s let other subsystems hook their own checks into each cycle.
//!
//! # Key types
//!
//! | Type | Meaning | Constraints | Constructed / mutated in |
//! |---|---|---|---|
//! | [`ConcurrencyMonitor`] | Shared handle to all tables | MUST NOT hold two table locks at once | `ConcurrencyMonitor::*` |
//! | [`ResourceAccessLedger`] | Bounded per-resource access history | MUST keep at most `max_records_per_resource` records per resource | `ConcurrencyMonitor::record_access_from` |
//! | [`LockOrderTable`] | Per-thread held-lock stacks | A release MUST match a recorded acquisition | `ConcurrencyMonitor::record_lock_*` |
//! | [`ViolationReport`] | One accepted finding | Stored only when `severity >= min_report_severity` | `ConcurrencyMonitor::report_violation` |
//! | [`Monitored`] / [`TrackedMutex`] | Self-reporting lock wrappers | Record before handing out the guard | `tracked` |
//!
//! # Invariants
//!
//! 1. The report store MUST NOT exceed `max_violation_reports`; overflow evicts the oldest half.
//!    - Enforced in: `ViolationLog::push`
//!    - Tested by: `tests::report_store_is_bounded`
//!    - Failure symptom: a violation storm grows memory without bound during a long session.
//!
//! 2. A conflicting access pair MUST be reported at most once across cycles.
//!    - Enforced in: `ResourceAccessLedger::analyze_races`
//!    - Tested by: `tests::close_writes_from_two_threads_race_once`
//!    - Failure symptom: one race floods the log with one report per detection interval.
//!
//! 3. Reports below `min_report_severity` MUST NOT be stored or counted.
//!    - Enforced in: `ConcurrencyMonitor::report_violation`
//!    - Tested by: `tests::severity_filter_drops_low_reports`
//!    - Failure symptom: health flips to unhealthy on informational noise.
//!
//! 4. Detection MUST run without any monitor table lock held while reports are filed and probes run.
//!    - Enforced in: `ConcurrencyMonitor::run_detection_cycle`
//!    - Tested by: `tests::probe_can_report_from_inside_a_cycle`
//!    - Failure symptom: the detection thread self-deadlocks the first time it finds something.

mod error;
mod export;
mod ledger;
mod lock_order;
mod monitor;
mod report;
mod stats;
mod threads;
mod tracked;
mod types;

pub use error::MonitorError;
pub use ledger::{AccessRecord, LeakFinding, RaceFinding, RaceWindows, ResourceAccessLedger};
pub use lock_order::{AcquireCheck, DeadlockFinding, LockOrderTable};
pub use monitor::{ConcurrencyMonitor, CycleProbe, CycleSummary};
pub use report::ViolationReport;
pub use stats::MonitorStatsSnapshot;
pub use tracked::{Monitored, TrackedGuard, TrackedMutex};
pub use types::{AccessPattern, LockId, ResourceId, ViolationKind};
