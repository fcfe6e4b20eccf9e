use std::sync::Arc;
use std::time::Instant;

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use swapguard_primitives::ThreadTag;

use crate::LockId;

#[derive(Debug, Clone)]
struct HeldLock {
	lock: LockId,
	name: Arc<str>,
	since: Instant,
}

/// Result of recording one acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquireCheck {
	/// A held lock with a higher address than the one just acquired.
	pub inverted_against: Option<(LockId, Arc<str>)>,
	/// Locks held by the thread after this acquisition.
	pub depth: usize,
}

/// Two threads holding the same lock at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadlockFinding {
	pub threads: (ThreadTag, ThreadTag),
	pub shared: Vec<(LockId, Arc<str>)>,
}

type DeadlockKey = (ThreadTag, ThreadTag, SmallVec<[LockId; 4]>);

/// Per-thread stacks of held locks.
///
/// Ordering is checked by raw address: acquiring a lower address while a
/// higher one is held counts as an inversion. Addresses carry no semantic
/// order, so findings are heuristics.
#[derive(Debug, Default)]
pub struct LockOrderTable {
	held: FxHashMap<ThreadTag, SmallVec<[HeldLock; 8]>>,
	reported: FxHashSet<DeadlockKey>,
}

impl LockOrderTable {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn acquire(&mut self, thread: ThreadTag, lock: LockId, name: impl Into<Arc<str>>, at: Instant) -> AcquireCheck {
		let stack = self.held.entry(thread).or_default();
		let inverted_against = stack
			.iter()
			.filter(|held| held.lock > lock)
			.max_by_key(|held| held.lock)
			.map(|held| (held.lock, Arc::clone(&held.name)));
		stack.push(HeldLock {
			lock,
			name: name.into(),
			since: at,
		});
		AcquireCheck {
			inverted_against,
			depth: stack.len(),
		}
	}

	/// Pops the most recent hold of `lock`. Returns false if the thread did not hold it.
	pub fn release(&mut self, thread: ThreadTag, lock: LockId) -> bool {
		let Some(stack) = self.held.get_mut(&thread) else {
			return false;
		};
		let Some(pos) = stack.iter().rposition(|held| held.lock == lock) else {
			return false;
		};
		stack.remove(pos);
		if stack.is_empty() {
			self.held.remove(&thread);
		}
		true
	}

	/// Thread pairs whose held sets intersect and that were not already
	/// reported with the same shared set in the previous call.
	pub fn detect_deadlocks(&mut self) -> Vec<DeadlockFinding> {
		let mut threads: Vec<_> = self.held.keys().copied().collect();
		threads.sort_unstable();

		let mut current = FxHashSet::default();
		let mut findings = Vec::new();
		for (i, &a) in threads.iter().enumerate() {
			for &b in &threads[i + 1..] {
				let shared = self.shared_locks(a, b);
				if shared.is_empty() {
					continue;
				}
				let key: DeadlockKey = (a, b, shared.iter().map(|(lock, _)| *lock).collect());
				if !self.reported.contains(&key) {
					findings.push(DeadlockFinding { threads: (a, b), shared });
				}
				current.insert(key);
			}
		}
		self.reported = current;
		findings
	}

	fn shared_locks(&self, a: ThreadTag, b: ThreadTag) -> Vec<(LockId, Arc<str>)> {
		let (Some(held_a), Some(held_b)) = (self.held.get(&a), self.held.get(&b)) else {
			return Vec::new();
		};
		let mut shared: Vec<_> = held_a
			.iter()
			.filter(|held| held_b.iter().any(|other| other.lock == held.lock))
			.map(|held| (held.lock, Arc::clone(&held.name)))
			.collect();
		shared.sort_unstable_by_key(|(lock, _)| *lock);
		shared.dedup_by_key(|(lock, _)| *lock);
		shared
	}

	pub fn remove_thread(&mut self, thread: ThreadTag) {
		self.held.remove(&thread);
	}

	pub fn held_by(&self, thread: ThreadTag) -> Vec<LockId> {
		self.held.get(&thread).map(|stack| stack.iter().map(|held| held.lock).collect()).unwrap_or_default()
	}

	/// Longest current hold across all threads.
	pub fn oldest_hold(&self, now: Instant) -> Option<(ThreadTag, Arc<str>, std::time::Duration)> {
		self.held
			.iter()
			.flat_map(|(thread, stack)| stack.iter().map(move |held| (*thread, held)))
			.max_by_key(|(_, held)| now.saturating_duration_since(held.since))
			.map(|(thread, held)| (thread, Arc::clone(&held.name), now.saturating_duration_since(held.since)))
	}

	pub fn thread_count(&self) -> usize {
		self.held.len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const T1: ThreadTag = ThreadTag::from_raw(1);
	const T2: ThreadTag = ThreadTag::from_raw(2);
	const T3: ThreadTag = ThreadTag::from_raw(3);

	#[test]
	fn lower_address_after_higher_is_inverted() {
		let mut table = LockOrderTable::new();
		let now = Instant::now();
		assert_eq!(table.acquire(T1, LockId(0x100), "a", now).inverted_against, None);
		assert_eq!(table.acquire(T1, LockId(0x300), "c", now).inverted_against, None);
		let check = table.acquire(T1, LockId(0x200), "b", now);
		assert_eq!(check.inverted_against.map(|(lock, _)| lock), Some(LockId(0x300)));
		assert_eq!(check.depth, 3);
	}

	#[test]
	fn release_of_unheld_lock_is_rejected() {
		let mut table = LockOrderTable::new();
		let now = Instant::now();
		table.acquire(T1, LockId(1), "a", now);
		assert!(!table.release(T2, LockId(1)));
		assert!(!table.release(T1, LockId(2)));
		assert!(table.release(T1, LockId(1)));
		assert_eq!(table.thread_count(), 0);
	}

	#[test]
	fn reentrant_hold_releases_most_recent() {
		let mut table = LockOrderTable::new();
		let now = Instant::now();
		table.acquire(T1, LockId(1), "a", now);
		table.acquire(T1, LockId(2), "b", now);
		table.acquire(T1, LockId(1), "a", now);
		assert!(table.release(T1, LockId(1)));
		assert_eq!(table.held_by(T1), vec![LockId(1), LockId(2)]);
	}

	#[test]
	fn shared_hold_is_reported_once_while_it_persists() {
		let mut table = LockOrderTable::new();
		let now = Instant::now();
		table.acquire(T1, LockId(7), "registry", now);
		table.acquire(T2, LockId(7), "registry", now);
		table.acquire(T3, LockId(9), "other", now);

		let findings = table.detect_deadlocks();
		assert_eq!(findings.len(), 1);
		assert_eq!(findings[0].threads, (T1, T2));
		assert_eq!(findings[0].shared[0].0, LockId(7));
		assert!(table.detect_deadlocks().is_empty());

		table.release(T2, LockId(7));
		assert!(table.detect_deadlocks().is_empty());
		table.acquire(T2, LockId(7), "registry", now);
		assert_eq!(table.detect_deadlocks().len(), 1);
	}
}
