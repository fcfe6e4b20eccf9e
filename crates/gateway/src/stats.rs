use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use swapguard_primitives::AtomicF64;

use crate::CallbackResult;

const EXEC_EWMA_RETAIN: f64 = 0.9;
/// Completed calls before the timeout ratio counts towards health.
pub(crate) const TIMEOUT_RATIO_MIN_CALLS: u64 = 100;

#[derive(Debug, Default)]
pub(crate) struct GatewayStats {
	total: AtomicU64,
	succeeded: AtomicU64,
	failed: AtomicU64,
	timed_out: AtomicU64,
	rejected: AtomicU64,
	not_ready: AtomicU64,
	peak_concurrency: AtomicUsize,
	avg_ms: AtomicF64,
	max_ms: AtomicF64,
}

impl GatewayStats {
	pub(crate) fn record(&self, result: CallbackResult, elapsed: Duration) {
		self.total.fetch_add(1, Ordering::Relaxed);
		let counter = match result {
			CallbackResult::Success => {
				let ms = elapsed.as_nanos() as f64 / 1_000_000.0;
				self.avg_ms.fold_ewma(ms, EXEC_EWMA_RETAIN);
				self.max_ms.fetch_max(ms);
				&self.succeeded
			}
			CallbackResult::Failed => &self.failed,
			CallbackResult::Timeout => &self.timed_out,
			CallbackResult::TooManyConcurrentCalls => &self.rejected,
			CallbackResult::SystemNotReady => &self.not_ready,
		};
		counter.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn observe_concurrency(&self, active: usize) {
		self.peak_concurrency.fetch_max(active, Ordering::Relaxed);
	}

	pub(crate) fn reset(&self) {
		for counter in [&self.total, &self.succeeded, &self.failed, &self.timed_out, &self.rejected, &self.not_ready] {
			counter.store(0, Ordering::Relaxed);
		}
		self.peak_concurrency.store(0, Ordering::Relaxed);
		self.avg_ms.store(0.0);
		self.max_ms.store(0.0);
	}

	pub(crate) fn snapshot(&self, active: usize) -> GatewayStatsSnapshot {
		GatewayStatsSnapshot {
			total_calls: self.total.load(Ordering::Relaxed),
			succeeded: self.succeeded.load(Ordering::Relaxed),
			failed: self.failed.load(Ordering::Relaxed),
			timed_out: self.timed_out.load(Ordering::Relaxed),
			rejected: self.rejected.load(Ordering::Relaxed),
			not_ready: self.not_ready.load(Ordering::Relaxed),
			active,
			peak_concurrency: self.peak_concurrency.load(Ordering::Relaxed),
			avg_execution_ms: self.avg_ms.load(),
			max_execution_ms: self.max_ms.load(),
		}
	}
}

/// Point-in-time copy of the gateway counters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GatewayStatsSnapshot {
	/// Every call attempt, rejected ones included.
	pub total_calls: u64,
	pub succeeded: u64,
	pub failed: u64,
	pub timed_out: u64,
	/// Refused with `TooManyConcurrentCalls`.
	pub rejected: u64,
	/// Refused with `SystemNotReady`.
	pub not_ready: u64,
	pub active: usize,
	pub peak_concurrency: usize,
	/// Moving average over successful calls.
	pub avg_execution_ms: f64,
	pub max_execution_ms: f64,
}

impl GatewayStatsSnapshot {
	/// Calls that were admitted and returned.
	pub const fn completed(&self) -> u64 {
		self.succeeded + self.failed + self.timed_out
	}

	/// Share of completed calls that succeeded; 1.0 before any call completes.
	pub fn success_rate(&self) -> f64 {
		match self.completed() {
			0 => 1.0,
			n => self.succeeded as f64 / n as f64,
		}
	}

	pub fn timeout_ratio(&self) -> f64 {
		match self.completed() {
			0 => 0.0,
			n => self.timed_out as f64 / n as f64,
		}
	}
}
