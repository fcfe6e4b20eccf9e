use std::fmt::Write;

use crate::ReloadStateMachine;

impl ReloadStateMachine {
	/// Multi-line status dump for logs.
	pub fn export_diagnostics_report(&self) -> String {
		let stats = self.statistics();
		let issues = self.consistency_issues();
		let sessions = self.active_sessions();
		let assemblies = self.assemblies();

		let mut out = String::new();
		let _ = writeln!(out, "== reload state ==");
		let _ = writeln!(
			out,
			"state={} kind={} phase={} ready={} emergency={} recovery_pending={}",
			self.current_state(),
			self.current_kind().as_str(),
			self.platform_phase().as_str(),
			self.is_system_ready(),
			self.is_emergency_stopped(),
			self.is_recovery_pending(),
		);
		let _ = writeln!(out, "active={} pending={}", self.active_count(), self.pending_count());
		if !sessions.is_empty() {
			let ids: Vec<_> = sessions
				.iter()
				.map(|session| format!("{} ({}, {}ms)", session.id, session.kind.as_str(), session.age.as_millis()))
				.collect();
			let _ = writeln!(out, "sessions: {}", ids.join(", "));
		}
		let _ = writeln!(
			out,
			"started={} succeeded={} failed={} cancelled={} abandoned={} queued={} busy={}",
			stats.started, stats.succeeded, stats.failed, stats.cancelled, stats.abandoned, stats.queued, stats.busy_rejections,
		);
		let _ = writeln!(
			out,
			"success_rate={:.1}% avg_ms={:.2} max_ms={:.2}",
			stats.success_rate() * 100.0,
			stats.avg_duration_ms,
			stats.max_duration_ms,
		);
		let _ = writeln!(
			out,
			"assemblies={} method_replacements={}",
			assemblies.assembly_count(),
			assemblies.replacement_count()
		);
		if issues.is_empty() {
			let _ = writeln!(out, "consistency: ok");
		} else {
			let _ = writeln!(out, "consistency: {} issue(s)", issues.len());
			for issue in issues {
				let _ = writeln!(out, "  - {issue}");
			}
		}
		out
	}
}
