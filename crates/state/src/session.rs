use std::time::{Duration, Instant};

use crate::{EndError, ReloadKind, ReloadStateMachine, SessionId, SessionOutcome};

/// Scoped claim on the reload slot.
///
/// The outcome must be stated through [`ReloadSession::succeed`],
/// [`ReloadSession::fail`] or [`ReloadSession::cancel`]. Dropping the guard
/// without one ends the session as [`SessionOutcome::Abandoned`], or as
/// [`SessionOutcome::Failed`] when the drop happens during a panic.
#[must_use = "a reload session must be completed with succeed(), fail() or cancel()"]
#[derive(Debug)]
pub struct ReloadSession {
	machine: ReloadStateMachine,
	id: SessionId,
	kind: ReloadKind,
	started: Instant,
	finished: bool,
}

impl ReloadSession {
	pub(crate) fn new(machine: ReloadStateMachine, id: SessionId, kind: ReloadKind) -> Self {
		Self {
			machine,
			id,
			kind,
			started: Instant::now(),
			finished: false,
		}
	}

	pub fn id(&self) -> SessionId {
		self.id
	}

	pub fn kind(&self) -> ReloadKind {
		self.kind
	}

	pub fn elapsed(&self) -> Duration {
		self.started.elapsed()
	}

	pub fn machine(&self) -> &ReloadStateMachine {
		&self.machine
	}

	pub fn succeed(self) -> Result<(), EndError> {
		self.finish(SessionOutcome::Succeeded)
	}

	pub fn fail(self) -> Result<(), EndError> {
		self.finish(SessionOutcome::Failed)
	}

	pub fn cancel(mut self) -> Result<(), EndError> {
		self.finished = true;
		self.machine.cancel(self.id)
	}

	fn finish(mut self, outcome: SessionOutcome) -> Result<(), EndError> {
		self.finished = true;
		self.machine.end(self.id, outcome, self.started.elapsed())
	}
}

impl Drop for ReloadSession {
	fn drop(&mut self) {
		if self.finished {
			return;
		}
		let outcome = if std::thread::panicking() {
			SessionOutcome::Failed
		} else {
			SessionOutcome::Abandoned
		};
		tracing::error!(session = self.id.get(), outcome = outcome.as_str(), "reload.session.dropped_without_outcome");
		if let Err(err) = self.machine.end(self.id, outcome, self.started.elapsed()) {
			tracing::warn!(session = self.id.get(), error = %err, "reload.session.end_rejected");
		}
	}
}
