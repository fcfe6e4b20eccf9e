//! Reload context: one explicit owner for the reload pipeline's safety machinery.
//!
//! # Purpose
//!
//! - Build, wire and tear down the reload state machine, the concurrency monitor and the callback gateway as one unit.
//! - Offer the two scoped entry points hosts actually need: run a reload, or run code while no reload is in flight.
//! - Exclude the reload work itself; callers supply it as closures.
//!
//! # Mental model
//!
//! - A host creates one [`ReloadContext`] and shares it as `Arc<ReloadContext>`. There are no process-wide statics.
//! - The gateway reports handle accesses to the monitor; the monitor checks the state machine's bookkeeping every cycle through a probe.
//! - Shutdown runs in dependency order: close the gateway, drain reloads, then stop the monitor so it can write its final report.
//!
//! # Key types
//!
//! | Type | Meaning | Constraints | Constructed / mutated in |
//! |---|---|---|---|
//! | [`ReloadContext`] | Owner of all three components | MUST be shut down at most once | `ReloadContext::new`, `ReloadContext::shutdown` |
//! | [`ReloadError`] | Failure of a scoped reload | `Operation` MUST mean the session was recorded as failed | `ReloadContext::run_reload` |
//! | [`QuiesceError`] | No idle window for a quiesced section | Never runs the closure | `ReloadContext::with_reload_quiesced` |
//!
//! # Invariants
//!
//! 1. `run_reload` MUST record exactly one outcome for every session it begins, including when the closure panics.
//!    - Enforced in: `ReloadContext::run_reload`, `ReloadSession::drop`
//!    - Tested by: `context::panicking_reload_is_recorded_as_failed`
//!    - Failure symptom: the slot stays claimed after a crashed reload and every later reload is refused.
//!
//! 2. Shutdown MUST close the gateway before draining reloads.
//!    - Enforced in: `ReloadContext::shutdown`
//!    - Tested by: `context::shutdown_is_idempotent_and_closes_everything`
//!    - Failure symptom: callbacks enter a runtime that is being torn down.

mod context;
mod error;
mod probe;

pub use context::ReloadContext;
pub use error::{ContextError, QuiesceError, ReloadError};
