use std::fmt;
use std::time::Duration;

use rustc_hash::FxHashMap;

use crate::machine::ActiveSession;
use crate::{ReloadState, SessionId};

/// One disagreement between the reload state and its bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsistencyIssue {
	/// Idle, yet sessions are counted as active.
	IdleWithActiveSessions { active: usize },
	/// A reload state other than idle with nothing active outside an emergency stop.
	BusyWithoutSessions { state: ReloadState },
	/// The active counter and the active-session set disagree.
	CountMismatch { counted: usize, tracked: usize },
	/// A session has outlived the reload timeout.
	StuckSession { id: SessionId, age: Duration },
}

impl fmt::Display for ConsistencyIssue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::IdleWithActiveSessions { active } => write!(f, "idle with {active} active sessions"),
			Self::BusyWithoutSessions { state } => write!(f, "state {state} with no active session"),
			Self::CountMismatch { counted, tracked } => {
				write!(f, "active counter {counted} but {tracked} tracked session ids")
			}
			Self::StuckSession { id, age } => write!(f, "{id} active for {}ms", age.as_millis()),
		}
	}
}

pub(crate) fn check(
	state: ReloadState,
	counted: usize,
	emergency: bool,
	active: &FxHashMap<SessionId, ActiveSession>,
	reload_timeout: Duration,
) -> Vec<ConsistencyIssue> {
	let mut issues = Vec::new();
	if state == ReloadState::Idle && counted > 0 {
		issues.push(ConsistencyIssue::IdleWithActiveSessions { active: counted });
	}
	// An emergency stop holds `Cancelled` with nothing active until its reset.
	if state != ReloadState::Idle && counted == 0 && !emergency {
		issues.push(ConsistencyIssue::BusyWithoutSessions { state });
	}
	if active.len() != counted {
		issues.push(ConsistencyIssue::CountMismatch {
			counted,
			tracked: active.len(),
		});
	}
	let mut stuck: Vec<_> = active
		.iter()
		.map(|(id, session)| (*id, session.started.elapsed()))
		.filter(|(_, age)| *age > reload_timeout)
		.collect();
	stuck.sort_unstable_by_key(|(id, _)| *id);
	issues.extend(stuck.into_iter().map(|(id, age)| ConsistencyIssue::StuckSession { id, age }));
	issues
}
