use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TAG: AtomicU64 = AtomicU64::new(1);

thread_local! {
	static CURRENT: ThreadTag = ThreadTag::allocate();
}

/// Process-unique identifier for an OS thread.
///
/// Assigned lazily the first time a thread asks for its tag and never reused,
/// so a tag stays meaningful in reports after the thread has exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadTag(u64);

impl ThreadTag {
	fn allocate() -> Self {
		Self(NEXT_TAG.fetch_add(1, Ordering::Relaxed))
	}

	/// Returns the tag of the calling thread.
	///
	/// During thread-local destruction the cached tag is gone; a fresh tag is
	/// handed out instead so callers never panic.
	pub fn current() -> Self {
		CURRENT.try_with(|tag| *tag).unwrap_or_else(|_| Self::allocate())
	}

	pub const fn from_raw(raw: u64) -> Self {
		Self(raw)
	}

	pub const fn get(self) -> u64 {
		self.0
	}
}

impl fmt::Display for ThreadTag {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "t{}", self.0)
	}
}
