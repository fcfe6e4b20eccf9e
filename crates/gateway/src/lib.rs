//! Bounded gateway for calls from host threads into the reloadable runtime.
//!
//! Every call through [`CallbackGateway`] is admitted against a concurrency
//! ceiling, timed, shielded from panics, and counted. Nothing is admitted
//! once shutdown begins, and shutdown waits a bounded time for in-flight
//! calls before abandoning them.
//!
//! The runtime itself sits behind [`ManagedRuntime`]; the gateway never calls
//! it except through [`CallbackGateway::execute`].

mod gateway;
mod outcome;
mod report;
mod runtime;
mod stats;

pub use gateway::{ActiveCall, CallbackGateway};
pub use outcome::{CallKind, CallOutcome, CallbackResult};
pub use runtime::{ForeignError, ManagedRuntime};
pub use stats::GatewayStatsSnapshot;
