//! Background thread plumbing shared by the monitor and the state machine.
//!
//! Everything here runs on plain OS threads: the reload pipeline must keep
//! working while the host's async runtimes are being torn down and rebuilt.

mod class;
mod deadline;
mod join_ctrl;
mod panic;
mod registry;
mod spawn;
mod token;

pub use class::TaskClass;
pub use deadline::{deadline_after, remaining_until, wait_until_deadline};
pub use join_ctrl::ThreadJoinCtrl;
pub use panic::panic_message;
pub use registry::{WorkerRecord, WorkerRegistry};
pub use spawn::spawn_named_thread;
pub use token::{GenerationClock, StopToken};
