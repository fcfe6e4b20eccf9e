//! Rejections returned by the state machine.

use thiserror::Error;

use crate::{ReloadState, SessionId};

/// Why a reload could not start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BeginError {
	/// Not initialised, shutting down, or an emergency stop is latched.
	#[error("reload system is not ready")]
	NotReady,
	/// Another reload is running; the request was counted as pending.
	#[error("reload queued behind the active session ({pending} pending)")]
	Queued { pending: usize },
	/// Another reload is running and the pending queue is disabled or full.
	#[error("reload slot busy (state {0})")]
	Busy(ReloadState),
	/// The concurrent session ceiling is reached.
	#[error("concurrent reload limit reached")]
	CapacityExceeded,
	/// The idle slot was claimed between the check and the swap.
	#[error("lost the race for the idle reload slot")]
	Raced,
}

impl BeginError {
	/// Whether waiting for the active session to finish may let a retry succeed.
	pub const fn is_retryable(self) -> bool {
		matches!(self, Self::Queued { .. } | Self::Busy(_) | Self::CapacityExceeded | Self::Raced)
	}
}

/// Why ending or cancelling a session was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EndError {
	#[error("no session can end from state {0}")]
	InvalidState(ReloadState),
	#[error("{0} is not an active session")]
	UnknownSession(SessionId),
	#[error("illegal transition {from} -> {to}")]
	Transition { from: ReloadState, to: ReloadState },
}

/// Why a platform phase change was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PhaseError {
	#[error("platform phases other than ready require an in-progress reload (state {0})")]
	NoActiveSession(ReloadState),
}
