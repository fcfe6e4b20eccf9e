use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::{deadline_after, wait_until_deadline};

/// Monotonic generation clock for sessions, epochs and worker lifecycles.
#[derive(Debug, Default, Clone)]
pub struct GenerationClock {
	next: Arc<AtomicU64>,
}

impl GenerationClock {
	/// Creates a new generation clock starting at generation 1.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the next generation ID.
	pub fn next(&self) -> u64 {
		self.next.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
	}
}

#[derive(Debug, Default)]
struct StopState {
	stopped: Mutex<bool>,
	cv: Condvar,
}

/// Cooperative stop signal for background threads.
///
/// Threads sleep through [`StopToken::wait_timeout`] instead of
/// `thread::sleep`, so a stop request interrupts the wait immediately.
#[derive(Debug, Default, Clone)]
pub struct StopToken {
	state: Arc<StopState>,
}

impl StopToken {
	pub fn new() -> Self {
		Self::default()
	}

	/// Requests stop and wakes every waiter.
	pub fn cancel(&self) {
		*self.state.stopped.lock() = true;
		self.state.cv.notify_all();
	}

	/// Sleeps up to `timeout`. Returns `true` if stop was requested.
	pub fn wait_timeout(&self, timeout: Duration) -> bool {
		let deadline = deadline_after(timeout);
		let mut stopped = self.state.stopped.lock();
		while !*stopped {
			if wait_until_deadline(&self.state.cv, &mut stopped, deadline) {
				break;
			}
		}
		*stopped
	}
}
