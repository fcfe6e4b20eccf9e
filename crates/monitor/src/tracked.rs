//! Lock wrappers that report their own accesses to a [`ConcurrencyMonitor`].

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{AccessPattern, ConcurrencyMonitor, LockId, ResourceId};

/// Shared value whose reads and writes land in the access ledger under its name.
///
/// The wrapper itself is correctly synchronised; it exists so that code that
/// bypasses it (raw pointers into the value, foreign callbacks) shows up next
/// to the synchronised accesses in the same ledger entry.
pub struct Monitored<T> {
	name: Arc<str>,
	value: RwLock<T>,
	monitor: ConcurrencyMonitor,
}

impl<T> Monitored<T> {
	pub fn new(monitor: &ConcurrencyMonitor, name: &str, value: T) -> Self {
		Self {
			name: name.into(),
			value: RwLock::new(value),
			monitor: monitor.clone(),
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn resource_id(&self) -> ResourceId {
		ResourceId::Named(Arc::clone(&self.name))
	}

	pub fn read(&self) -> RwLockReadGuard<'_, T> {
		self.record(AccessPattern::Read);
		self.value.read()
	}

	pub fn write(&self) -> RwLockWriteGuard<'_, T> {
		self.record(AccessPattern::Write);
		self.value.write()
	}

	/// Read-modify-write under the write lock.
	pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
		self.record(AccessPattern::ReadWrite);
		f(&mut self.value.write())
	}

	fn record(&self, pattern: AccessPattern) {
		self.monitor.record_resource_access(self.resource_id(), &self.name, pattern);
	}
}

/// Mutex whose acquisitions and releases feed the lock-order and deadlock checks.
pub struct TrackedMutex<T> {
	name: Arc<str>,
	inner: Mutex<T>,
	monitor: ConcurrencyMonitor,
}

impl<T> TrackedMutex<T> {
	pub fn new(monitor: &ConcurrencyMonitor, name: &str, value: T) -> Self {
		Self {
			name: name.into(),
			inner: Mutex::new(value),
			monitor: monitor.clone(),
		}
	}

	/// Address of the underlying mutex; stable while `self` does not move.
	pub fn id(&self) -> LockId {
		LockId::of(&self.inner)
	}

	pub fn lock(&self) -> TrackedGuard<'_, T> {
		let guard = self.inner.lock();
		self.monitor.record_lock_acquisition(self.id(), &self.name);
		TrackedGuard { owner: self, guard }
	}

	pub fn try_lock(&self) -> Option<TrackedGuard<'_, T>> {
		let guard = self.inner.try_lock()?;
		self.monitor.record_lock_acquisition(self.id(), &self.name);
		Some(TrackedGuard { owner: self, guard })
	}
}

pub struct TrackedGuard<'a, T> {
	owner: &'a TrackedMutex<T>,
	guard: MutexGuard<'a, T>,
}

impl<T> Deref for TrackedGuard<'_, T> {
	type Target = T;

	fn deref(&self) -> &T {
		&self.guard
	}
}

impl<T> DerefMut for TrackedGuard<'_, T> {
	fn deref_mut(&mut self) -> &mut T {
		&mut self.guard
	}
}

impl<T> Drop for TrackedGuard<'_, T> {
	fn drop(&mut self) {
		self.owner.monitor.record_lock_release(self.owner.id(), &self.owner.name);
	}
}
