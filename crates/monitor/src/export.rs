use std::fmt::Write;
use std::time::Instant;

use swapguard_primitives::Severity;

use crate::ConcurrencyMonitor;

impl ConcurrencyMonitor {
	/// Every stored report, grouped by severity from critical down.
	pub fn export_violation_report(&self) -> String {
		let reports = self.violation_reports(Severity::Info);
		let stats = self.statistics();

		let mut out = String::new();
		let _ = writeln!(out, "== concurrency violations ==");
		let _ = writeln!(
			out,
			"stored={} total={} evicted={}",
			reports.len(),
			stats.total_violations,
			stats.evicted_reports
		);
		for severity in Severity::DESCENDING {
			let group: Vec<_> = reports.iter().filter(|r| r.severity == severity).collect();
			if group.is_empty() {
				continue;
			}
			let _ = writeln!(out, "-- {} ({}) --", severity.as_str(), group.len());
			for report in group {
				let threads: Vec<_> = report.threads.iter().map(ToString::to_string).collect();
				let _ = writeln!(
					out,
					"[{}] {} resource={} threads={} {}",
					report.detected_wall.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
					report.kind,
					report.resource_name.as_deref().unwrap_or("-"),
					threads.join(","),
					report.description,
				);
				for (key, value) in &report.details {
					let _ = writeln!(out, "    {key}={value}");
				}
			}
		}
		out
	}

	/// Counters, table sizes, threads and background workers.
	pub fn export_diagnostics_report(&self) -> String {
		let stats = self.statistics();
		let config = self.config();

		let mut out = String::new();
		let _ = writeln!(out, "== concurrency monitor ==");
		let _ = writeln!(
			out,
			"initialized={} monitoring={} healthy={} interval_ms={}",
			self.is_initialized(),
			self.is_monitoring(),
			self.is_system_healthy(),
			config.detection_interval.as_millis(),
		);
		let _ = writeln!(
			out,
			"violations total={} race={} unsafe={} deadlock={} lock_order={} leak={} other={} stored={} evicted={}",
			stats.total_violations,
			stats.race_conditions,
			stats.unsafe_accesses,
			stats.deadlock_potentials,
			stats.lock_order_violations,
			stats.resource_leaks,
			stats.other_violations,
			stats.stored_reports,
			stats.evicted_reports,
		);
		let _ = writeln!(
			out,
			"accesses={} resources={} records={} threads={} holding_locks={}",
			stats.recorded_accesses,
			stats.tracked_resources,
			stats.tracked_records,
			stats.monitored_threads,
			stats.threads_holding_locks,
		);
		let _ = writeln!(
			out,
			"cycles={} avg_cycle_ms={:.3} max_cycle_ms={:.3}",
			stats.cycles, stats.avg_cycle_ms, stats.max_cycle_ms
		);

		if let Some((thread, lock, held)) = self.inner.locks.lock().oldest_hold(Instant::now()) {
			let _ = writeln!(out, "longest hold: {lock} by {thread} for {}ms", held.as_millis());
		}
		let threads = self.inner.threads.lock().snapshot();
		let now = Instant::now();
		for (tag, info) in threads {
			let _ = writeln!(
				out,
				"  thread {tag} ({}) idle {}ms",
				info.name,
				now.saturating_duration_since(info.last_activity).as_millis()
			);
		}
		for worker in self.workers() {
			let _ = writeln!(
				out,
				"  worker {} [{}] gen={} cycles={} running={} exit={}",
				worker.name,
				worker.class.as_str(),
				worker.generation,
				worker.cycles,
				worker.running,
				worker.last_exit.as_deref().unwrap_or("-"),
			);
		}
		out
	}
}
