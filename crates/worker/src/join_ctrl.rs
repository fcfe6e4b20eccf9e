use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::{TaskClass, deadline_after, panic_message, spawn_named_thread, wait_until_deadline};

/// Join coordination state for one background thread.
///
/// Prevents concurrent stop callers from racing: only one caller becomes the
/// leader that joins the handle, all others wait on the condvar until the
/// leader transitions to `Done`.
enum JoinState {
	/// Thread is still owned; first caller to join takes it.
	Handle(JoinHandle<()>),
	/// A caller is currently joining.
	Joining,
	/// Thread has been joined.
	Done,
}

struct Inner {
	state: JoinState,
	exited: bool,
	panic: Option<String>,
}

struct Shared {
	inner: Mutex<Inner>,
	cv: Condvar,
}

/// Flips `exited` when the thread body returns or unwinds.
struct ExitSignal(Arc<Shared>);

impl Drop for ExitSignal {
	fn drop(&mut self) {
		self.0.inner.lock().exited = true;
		self.0.cv.notify_all();
	}
}

/// Joinable handle to a named background thread with bounded joins.
///
/// `std::thread::JoinHandle` cannot be joined with a deadline, so the spawned
/// body carries an exit signal and joins wait on that before touching the
/// handle.
pub struct ThreadJoinCtrl {
	name: String,
	shared: Arc<Shared>,
}

impl ThreadJoinCtrl {
	/// Spawns `f` on a named thread under join control.
	pub fn spawn<F>(class: TaskClass, name: impl Into<String>, f: F) -> std::io::Result<Self>
	where
		F: FnOnce() + Send + 'static,
	{
		let name = name.into();
		let shared = Arc::new(Shared {
			inner: Mutex::new(Inner {
				state: JoinState::Done,
				exited: false,
				panic: None,
			}),
			cv: Condvar::new(),
		});
		let signal = ExitSignal(Arc::clone(&shared));
		let handle = spawn_named_thread(class, name.clone(), move || {
			let _signal = signal;
			f();
		})?;
		// The placeholder `Done` is never observable: joins need `Self`, which
		// does not exist until the handle is installed.
		shared.inner.lock().state = JoinState::Handle(handle);
		Ok(Self { name, shared })
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	/// Returns true once the thread body has returned or unwound.
	pub fn has_exited(&self) -> bool {
		self.shared.inner.lock().exited
	}

	/// Panic message of the thread, available after a successful join.
	pub fn panic_message(&self) -> Option<String> {
		self.shared.inner.lock().panic.clone()
	}

	/// Joins with a deadline. Returns `true` if completed, `false` if timed out.
	///
	/// A timeout too large for a deadline waits until the thread exits. Multiple
	/// callers are safe: one joins the handle, the rest wait for it to finish.
	pub fn join_with_timeout(&self, timeout: Duration) -> bool {
		let deadline = deadline_after(timeout);
		let mut inner = self.shared.inner.lock();
		loop {
			match &inner.state {
				JoinState::Done => return true,
				JoinState::Handle(_) if inner.exited => {
					let JoinState::Handle(handle) = std::mem::replace(&mut inner.state, JoinState::Joining) else {
						unreachable!()
					};
					drop(inner);
					self.finish(handle);
					return true;
				}
				JoinState::Handle(_) | JoinState::Joining => {
					if wait_until_deadline(&self.shared.cv, &mut inner, deadline) {
						return matches!(inner.state, JoinState::Done);
					}
				}
			}
		}
	}

	fn finish(&self, handle: JoinHandle<()>) {
		let panic = handle.join().err().map(|payload| panic_message(payload.as_ref()).unwrap_or_else(|| "opaque panic".to_string()));
		if let Some(msg) = &panic {
			tracing::error!(thread = %self.name, panic = %msg, "worker.thread.panicked");
		}
		let mut inner = self.shared.inner.lock();
		inner.state = JoinState::Done;
		inner.panic = panic;
		drop(inner);
		self.shared.cv.notify_all();
	}
}

impl std::fmt::Debug for ThreadJoinCtrl {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ThreadJoinCtrl").field("name", &self.name).field("exited", &self.has_exited()).finish()
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicBool, Ordering};

	use super::*;
	use crate::StopToken;

	#[test]
	fn timeout_join_leaves_thread_joinable() {
		let stop = StopToken::new();
		let waiter = stop.clone();
		let ctrl = ThreadJoinCtrl::spawn(TaskClass::Monitoring, "join-timeout", move || {
			waiter.wait_timeout(Duration::from_secs(30));
		})
		.unwrap();

		assert!(!ctrl.join_with_timeout(Duration::from_millis(20)));
		assert!(!ctrl.has_exited());

		stop.cancel();
		assert!(ctrl.join_with_timeout(Duration::from_secs(5)));
		assert!(ctrl.has_exited());
		assert!(ctrl.panic_message().is_none());
	}

	#[test]
	fn concurrent_joiners_all_return() {
		let ran = Arc::new(AtomicBool::new(false));
		let flag = Arc::clone(&ran);
		let ctrl = Arc::new(
			ThreadJoinCtrl::spawn(TaskClass::Recovery, "join-many", move || {
				std::thread::sleep(Duration::from_millis(20));
				flag.store(true, Ordering::SeqCst);
			})
			.unwrap(),
		);

		let joiners: Vec<_> = (0..4)
			.map(|_| {
				let ctrl = Arc::clone(&ctrl);
				std::thread::spawn(move || assert!(ctrl.join_with_timeout(Duration::MAX)))
			})
			.collect();
		for joiner in joiners {
			joiner.join().unwrap();
		}
		assert!(ran.load(Ordering::SeqCst));
		assert!(ctrl.join_with_timeout(Duration::ZERO));
	}

	#[test]
	fn panic_message_is_captured() {
		let ctrl = ThreadJoinCtrl::spawn(TaskClass::Recovery, "join-panic", || panic!("reset failed")).unwrap();
		assert!(ctrl.join_with_timeout(Duration::MAX));
		assert_eq!(ctrl.panic_message().as_deref(), Some("reset failed"));
	}
}
