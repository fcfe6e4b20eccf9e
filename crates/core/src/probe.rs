use std::sync::atomic::{AtomicBool, Ordering};

use swapguard_monitor::{ConcurrencyMonitor, CycleProbe, ViolationKind, ViolationReport};
use swapguard_primitives::Severity;
use swapguard_state::{ConsistencyIssue, ReloadStateMachine};

pub(crate) const STATE_RESOURCE: &str = "reload-state";

/// Files a violation when the reload state and its bookkeeping disagree.
///
/// Reports once per episode: a persisting disagreement is not re-reported
/// every cycle, and the probe re-arms once the state is consistent again.
pub(crate) struct StateConsistencyProbe {
	state: ReloadStateMachine,
	reported: AtomicBool,
}

impl StateConsistencyProbe {
	pub(crate) fn new(state: ReloadStateMachine) -> Self {
		Self {
			state,
			reported: AtomicBool::new(false),
		}
	}
}

impl CycleProbe for StateConsistencyProbe {
	fn name(&self) -> &str {
		"state-consistency"
	}

	fn probe(&self, monitor: &ConcurrencyMonitor) {
		let issues = self.state.consistency_issues();
		if issues.is_empty() {
			self.reported.store(false, Ordering::Release);
			return;
		}
		if self.reported.swap(true, Ordering::AcqRel) {
			return;
		}
		let structural = issues.iter().any(|issue| !matches!(issue, ConsistencyIssue::StuckSession { .. }));
		let severity = if structural { Severity::Error } else { Severity::Warning };
		let descriptions: Vec<_> = issues.iter().map(ToString::to_string).collect();
		let report = ViolationReport::new(
			ViolationKind::MemoryOrdering,
			severity,
			format!("reload state inconsistent: {}", descriptions.join("; ")),
		)
		.resource(STATE_RESOURCE)
		.detail("state", self.state.current_state())
		.detail("active", self.state.active_count());
		monitor.report_violation(report);
	}
}
