use std::fmt;
use std::sync::Arc;

use swapguard_primitives::ManagedHandle;

/// How a thread touched a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessPattern {
	Read,
	Write,
	ReadWrite,
	/// Access through atomic operations; never conflicts.
	Atomic,
}

impl AccessPattern {
	/// Whether the access mutates the resource non-atomically.
	pub const fn writes(self) -> bool {
		matches!(self, Self::Write | Self::ReadWrite)
	}

	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Read => "read",
			Self::Write => "write",
			Self::ReadWrite => "read_write",
			Self::Atomic => "atomic",
		}
	}
}

/// Category of a detected violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
	RaceCondition,
	DeadlockPotential,
	UnsafeConcurrentAccess,
	LockOrderViolation,
	ResourceLeak,
	ExcessiveLocking,
	ThreadUnsafeUsage,
	MemoryOrdering,
}

impl ViolationKind {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::RaceCondition => "race_condition",
			Self::DeadlockPotential => "deadlock_potential",
			Self::UnsafeConcurrentAccess => "unsafe_concurrent_access",
			Self::LockOrderViolation => "lock_order_violation",
			Self::ResourceLeak => "resource_leak",
			Self::ExcessiveLocking => "excessive_locking",
			Self::ThreadUnsafeUsage => "thread_unsafe_usage",
			Self::MemoryOrdering => "memory_ordering",
		}
	}
}

impl fmt::Display for ViolationKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Identity of a tracked resource.
///
/// Addresses are only meaningful while the resource stays put; named
/// resources pool every access made under the same name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceId {
	Addr(usize),
	Named(Arc<str>),
}

impl ResourceId {
	/// Identity of the value behind `value`.
	pub fn of<T: ?Sized>(value: &T) -> Self {
		Self::Addr(value as *const T as *const () as usize)
	}
}

impl From<usize> for ResourceId {
	fn from(addr: usize) -> Self {
		Self::Addr(addr)
	}
}

impl From<&str> for ResourceId {
	fn from(name: &str) -> Self {
		Self::Named(name.into())
	}
}

impl<T> From<&ManagedHandle<T>> for ResourceId {
	fn from(handle: &ManagedHandle<T>) -> Self {
		Self::Addr(handle.addr())
	}
}

impl fmt::Display for ResourceId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Addr(addr) => write!(f, "{addr:#x}"),
			Self::Named(name) => f.write_str(name),
		}
	}
}

/// Identity of a lock, ordered by address for the lock-order heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LockId(pub usize);

impl LockId {
	pub fn of<T: ?Sized>(lock: &T) -> Self {
		Self(lock as *const T as *const () as usize)
	}
}

impl fmt::Display for LockId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:#x}", self.0)
	}
}
