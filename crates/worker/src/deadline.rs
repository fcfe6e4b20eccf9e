use std::time::{Duration, Instant};

use parking_lot::{Condvar, MutexGuard};

/// Absolute deadline `timeout` from now.
///
/// `None` when the deadline is past what `Instant` can represent; callers
/// treat that as an unbounded wait.
pub fn deadline_after(timeout: Duration) -> Option<Instant> {
	Instant::now().checked_add(timeout)
}

/// Time left until `deadline`, saturating at zero. An unbounded deadline never runs out.
pub fn remaining_until(deadline: Option<Instant>) -> Duration {
	deadline.map_or(Duration::MAX, |deadline| deadline.saturating_duration_since(Instant::now()))
}

/// Waits on `cv` until notified or `deadline` passes. Returns `true` on timeout.
///
/// Spurious wake-ups are possible, so callers re-check their condition in a loop.
pub fn wait_until_deadline<T: ?Sized>(cv: &Condvar, guard: &mut MutexGuard<'_, T>, deadline: Option<Instant>) -> bool {
	match deadline {
		Some(deadline) => cv.wait_until(guard, deadline).timed_out(),
		None => {
			cv.wait(guard);
			false
		}
	}
}
