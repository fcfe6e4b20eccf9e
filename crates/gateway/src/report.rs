use std::fmt::Write;

use crate::CallbackGateway;

impl CallbackGateway {
	/// Multi-line status dump for logs.
	pub fn export_diagnostics_report(&self) -> String {
		let stats = self.statistics();
		let config = self.config();

		let mut out = String::new();
		let _ = writeln!(out, "== callback gateway ==");
		let _ = writeln!(
			out,
			"ready={} shutting_down={} healthy={} active={}/{} peak={}",
			self.is_ready(),
			self.is_shutting_down(),
			self.is_system_healthy(),
			stats.active,
			config.max_concurrent_callbacks,
			stats.peak_concurrency,
		);
		let _ = writeln!(
			out,
			"total={} succeeded={} failed={} timed_out={} rejected={} not_ready={}",
			stats.total_calls, stats.succeeded, stats.failed, stats.timed_out, stats.rejected, stats.not_ready,
		);
		let _ = writeln!(
			out,
			"success_rate={:.1}% timeout_ratio={:.1}% avg_ms={:.2} max_ms={:.2}",
			stats.success_rate() * 100.0,
			stats.timeout_ratio() * 100.0,
			stats.avg_execution_ms,
			stats.max_execution_ms,
		);
		for call in self.active_calls() {
			let _ = writeln!(
				out,
				"  call #{} {} on {} for {}ms",
				call.id,
				call.kind.as_str(),
				call.thread,
				call.age.as_millis()
			);
		}
		out
	}
}
