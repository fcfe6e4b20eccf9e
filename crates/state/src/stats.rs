use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use swapguard_primitives::AtomicF64;

use crate::SessionOutcome;

const EWMA_RETAIN: f64 = 0.9;

/// Lock-free reload counters.
#[derive(Debug, Default)]
pub(crate) struct ReloadStats {
	started: AtomicU64,
	succeeded: AtomicU64,
	failed: AtomicU64,
	cancelled: AtomicU64,
	abandoned: AtomicU64,
	queued: AtomicU64,
	busy: AtomicU64,
	avg_ms: AtomicF64,
	max_ms: AtomicF64,
}

impl ReloadStats {
	pub(crate) fn record_started(&self) {
		self.started.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_queued(&self) {
		self.queued.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_busy(&self) {
		self.busy.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_cancelled(&self) {
		self.cancelled.fetch_add(1, Ordering::Relaxed);
	}

	/// Only successful sessions feed the duration average and maximum.
	pub(crate) fn record_outcome(&self, outcome: SessionOutcome, elapsed: Duration) {
		match outcome {
			SessionOutcome::Succeeded => {
				self.succeeded.fetch_add(1, Ordering::Relaxed);
				let ms = elapsed.as_nanos() as f64 / 1_000_000.0;
				self.avg_ms.fold_ewma(ms, EWMA_RETAIN);
				self.max_ms.fetch_max(ms);
			}
			SessionOutcome::Failed => {
				self.failed.fetch_add(1, Ordering::Relaxed);
			}
			SessionOutcome::Abandoned => {
				self.abandoned.fetch_add(1, Ordering::Relaxed);
			}
		}
	}

	pub(crate) fn reset(&self) {
		for counter in [
			&self.started,
			&self.succeeded,
			&self.failed,
			&self.cancelled,
			&self.abandoned,
			&self.queued,
			&self.busy,
		] {
			counter.store(0, Ordering::Relaxed);
		}
		self.avg_ms.store(0.0);
		self.max_ms.store(0.0);
	}

	pub(crate) fn snapshot(&self) -> ReloadStatsSnapshot {
		ReloadStatsSnapshot {
			started: self.started.load(Ordering::Relaxed),
			succeeded: self.succeeded.load(Ordering::Relaxed),
			failed: self.failed.load(Ordering::Relaxed),
			cancelled: self.cancelled.load(Ordering::Relaxed),
			abandoned: self.abandoned.load(Ordering::Relaxed),
			queued: self.queued.load(Ordering::Relaxed),
			busy_rejections: self.busy.load(Ordering::Relaxed),
			avg_duration_ms: self.avg_ms.load(),
			max_duration_ms: self.max_ms.load(),
		}
	}
}

/// Point-in-time copy of the reload counters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReloadStatsSnapshot {
	pub started: u64,
	pub succeeded: u64,
	pub failed: u64,
	pub cancelled: u64,
	pub abandoned: u64,
	pub queued: u64,
	pub busy_rejections: u64,
	pub avg_duration_ms: f64,
	pub max_duration_ms: f64,
}

impl ReloadStatsSnapshot {
	/// Sessions that reached any terminal outcome.
	pub const fn finished(&self) -> u64 {
		self.succeeded + self.failed + self.cancelled + self.abandoned
	}

	/// Fraction of finished sessions that succeeded; 0 when none finished.
	pub fn success_rate(&self) -> f64 {
		match self.finished() {
			0 => 0.0,
			n => self.succeeded as f64 / n as f64,
		}
	}
}
