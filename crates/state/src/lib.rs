//! Atomic hot-reload state machine.
//!
//! # Purpose
//!
//! - Guarantee that at most one reload progresses through its lifecycle at a time, however many threads try to start one.
//! - Give every other part of the host a lock-free answer to "is a reload running right now?".
//! - Provide an emergency stop that unblocks the host when a reload wedges, and a bounded drain on shutdown.
//! - Exclude the reload work itself (loading assemblies, patching methods); callers do that between `begin` and `end`.
//!
//! # Mental model
//!
//! - There is one reload slot per [`ReloadStateMachine`]. `begin` claims it, `end` or `cancel` releases it.
//! - The slot's [`ReloadState`] only moves along the edges of [`ReloadState::can_transition_to`], except for emergency stop and resets.
//! - A `begin` that finds the slot busy is either counted as pending (a hint for the caller to retry) or rejected as busy.
//! - Waiting is condition-variable based: [`ReloadStateMachine::wait_for_completion`] and [`ReloadStateMachine::begin_or_wait`] wake on every release.
//! - An emergency stop latches a flag, abandons every session, parks the slot in `Cancelled`, and a recovery thread returns it to `Idle` after a grace period.
//!
//! # Key types
//!
//! | Type | Meaning | Constraints | Constructed / mutated in |
//! |---|---|---|---|
//! | [`ReloadStateMachine`] | Shared handle to the reload slot | MUST be the only writer of state, counters and the active set | `ReloadStateMachine::*` |
//! | [`SessionId`] | Identity of one claim on the slot | MUST be unique for the process lifetime | `ReloadStateMachine::begin` |
//! | [`ReloadSession`] | Scoped claim with explicit outcome | MUST end the session on drop; an unstated outcome is `Abandoned` | `ReloadStateMachine::begin_session`, `Drop` |
//! | [`BeginError`] | Why a claim was refused | MUST NOT leave any counter changed except `pending` for `Queued` | `ReloadStateMachine::begin` |
//! | [`ConsistencyIssue`] | Disagreement between state and bookkeeping | Reported only, never repaired | `ReloadStateMachine::consistency_issues` |
//! | [`AssemblyRegistry`] | Loaded assemblies and method replacements | Weak entries MUST be re-validated on lookup | `AssemblyRegistry::*` |
//!
//! # Invariants
//!
//! 1. With the state mutex free, `state == Idle` iff `active_count == 0`, except while the emergency latch is set.
//!    - Enforced in: `ReloadStateMachine::begin`, `ReloadStateMachine::end`, `ReloadStateMachine::cancel`
//!    - Tested by: `tests::random_operations_keep_state_and_counters_consistent`
//!    - Failure symptom: `is_hot_reloading` reports a reload that nobody owns, blocking every future reload.
//!
//! 2. The number of tracked session ids MUST equal `active_count`.
//!    - Enforced in: `ReloadStateMachine::release_session`
//!    - Tested by: `tests::random_operations_keep_state_and_counters_consistent`
//!    - Failure symptom: `end` rejects a live session as unknown, or a stale id ends a newer session.
//!
//! 3. Concurrent `begin` calls MUST admit exactly one session while the slot is busy.
//!    - Enforced in: `ReloadStateMachine::begin_with`
//!    - Tested by: `tests::concurrent_begin_admits_exactly_one`
//!    - Failure symptom: two reloads patch the same assemblies at once and corrupt the runtime.
//!
//! 4. A recovery thread MUST only reset the emergency stop that scheduled it.
//!    - Enforced in: `ReloadStateMachine::finish_emergency`
//!    - Tested by: `tests::newer_emergency_stop_supersedes_pending_reset`
//!    - Failure symptom: the slot reopens in the middle of a second emergency's grace period.

mod consistency;
pub mod error;
mod machine;
mod registry;
mod report;
mod session;
mod stats;
mod types;

pub use consistency::ConsistencyIssue;
pub use error::{BeginError, EndError, PhaseError};
pub use machine::{ActiveSessionInfo, ReloadStateMachine};
pub use registry::AssemblyRegistry;
pub use session::ReloadSession;
pub use stats::ReloadStatsSnapshot;
pub use types::{PlatformPhase, ReloadKind, ReloadState, SessionId, SessionOutcome};

#[cfg(test)]
mod tests;
