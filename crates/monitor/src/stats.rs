use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use swapguard_primitives::AtomicF64;

use crate::ViolationKind;

const CYCLE_EWMA_RETAIN: f64 = 0.95;

#[derive(Debug, Default)]
pub(crate) struct MonitorStats {
	total: AtomicU64,
	races: AtomicU64,
	unsafe_accesses: AtomicU64,
	deadlocks: AtomicU64,
	lock_order: AtomicU64,
	leaks: AtomicU64,
	other: AtomicU64,
	evicted: AtomicU64,
	accesses: AtomicU64,
	cycles: AtomicU64,
	avg_cycle_ms: AtomicF64,
	max_cycle_ms: AtomicF64,
}

impl MonitorStats {
	pub(crate) fn record_violation(&self, kind: ViolationKind) {
		self.total.fetch_add(1, Ordering::Relaxed);
		let counter = match kind {
			ViolationKind::RaceCondition => &self.races,
			ViolationKind::UnsafeConcurrentAccess => &self.unsafe_accesses,
			ViolationKind::DeadlockPotential => &self.deadlocks,
			ViolationKind::LockOrderViolation => &self.lock_order,
			ViolationKind::ResourceLeak => &self.leaks,
			ViolationKind::ExcessiveLocking | ViolationKind::ThreadUnsafeUsage | ViolationKind::MemoryOrdering => &self.other,
		};
		counter.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_evicted(&self, n: usize) {
		self.evicted.fetch_add(n as u64, Ordering::Relaxed);
	}

	pub(crate) fn record_access(&self) {
		self.accesses.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_cycle(&self, elapsed: Duration) {
		self.cycles.fetch_add(1, Ordering::Relaxed);
		let ms = elapsed.as_nanos() as f64 / 1_000_000.0;
		self.avg_cycle_ms.fold_ewma(ms, CYCLE_EWMA_RETAIN);
		self.max_cycle_ms.fetch_max(ms);
	}

	pub(crate) fn total(&self) -> u64 {
		self.total.load(Ordering::Relaxed)
	}

	pub(crate) fn reset(&self) {
		for counter in [
			&self.total,
			&self.races,
			&self.unsafe_accesses,
			&self.deadlocks,
			&self.lock_order,
			&self.leaks,
			&self.other,
			&self.evicted,
			&self.accesses,
			&self.cycles,
		] {
			counter.store(0, Ordering::Relaxed);
		}
		self.avg_cycle_ms.store(0.0);
		self.max_cycle_ms.store(0.0);
	}

	pub(crate) fn snapshot(&self) -> MonitorStatsSnapshot {
		MonitorStatsSnapshot {
			total_violations: self.total.load(Ordering::Relaxed),
			race_conditions: self.races.load(Ordering::Relaxed),
			unsafe_accesses: self.unsafe_accesses.load(Ordering::Relaxed),
			deadlock_potentials: self.deadlocks.load(Ordering::Relaxed),
			lock_order_violations: self.lock_order.load(Ordering::Relaxed),
			resource_leaks: self.leaks.load(Ordering::Relaxed),
			other_violations: self.other.load(Ordering::Relaxed),
			evicted_reports: self.evicted.load(Ordering::Relaxed),
			recorded_accesses: self.accesses.load(Ordering::Relaxed),
			cycles: self.cycles.load(Ordering::Relaxed),
			avg_cycle_ms: self.avg_cycle_ms.load(),
			max_cycle_ms: self.max_cycle_ms.load(),
			..MonitorStatsSnapshot::default()
		}
	}
}

/// Point-in-time copy of the monitor counters and table sizes.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MonitorStatsSnapshot {
	/// Violations accepted by the severity filter since initialisation.
	pub total_violations: u64,
	pub race_conditions: u64,
	pub unsafe_accesses: u64,
	pub deadlock_potentials: u64,
	pub lock_order_violations: u64,
	pub resource_leaks: u64,
	pub other_violations: u64,
	pub evicted_reports: u64,
	pub recorded_accesses: u64,
	pub cycles: u64,
	pub avg_cycle_ms: f64,
	pub max_cycle_ms: f64,
	pub stored_reports: usize,
	pub tracked_resources: usize,
	pub tracked_records: usize,
	pub monitored_threads: usize,
	pub threads_holding_locks: usize,
}
