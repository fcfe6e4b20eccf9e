use std::sync::Arc;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use swapguard_primitives::ThreadTag;

#[derive(Debug, Clone)]
pub(crate) struct ThreadInfo {
	pub(crate) name: Arc<str>,
	pub(crate) last_activity: Instant,
}

/// Names and last activity of threads seen by the monitor.
#[derive(Debug, Default)]
pub(crate) struct ThreadTable {
	threads: FxHashMap<ThreadTag, ThreadInfo>,
}

impl ThreadTable {
	pub(crate) fn register(&mut self, thread: ThreadTag, name: Arc<str>, now: Instant) {
		self.threads.insert(thread, ThreadInfo { name, last_activity: now });
	}

	pub(crate) fn unregister(&mut self, thread: ThreadTag) -> bool {
		self.threads.remove(&thread).is_some()
	}

	/// Marks activity, registering the thread under `fallback_name` if unseen.
	pub(crate) fn touch(&mut self, thread: ThreadTag, now: Instant, fallback_name: impl FnOnce() -> Arc<str>) {
		self.threads
			.entry(thread)
			.and_modify(|info| info.last_activity = now)
			.or_insert_with(|| ThreadInfo {
				name: fallback_name(),
				last_activity: now,
			});
	}

	/// Removes threads idle longer than `max_idle` and returns them.
	pub(crate) fn expire_idle(&mut self, now: Instant, max_idle: Duration) -> Vec<ThreadTag> {
		let mut expired = Vec::new();
		self.threads.retain(|thread, info| {
			let keep = now.saturating_duration_since(info.last_activity) <= max_idle;
			if !keep {
				expired.push(*thread);
			}
			keep
		});
		expired
	}

	pub(crate) fn name(&self, thread: ThreadTag) -> Option<Arc<str>> {
		self.threads.get(&thread).map(|info| Arc::clone(&info.name))
	}

	pub(crate) fn snapshot(&self) -> Vec<(ThreadTag, ThreadInfo)> {
		let mut threads: Vec<_> = self.threads.iter().map(|(tag, info)| (*tag, info.clone())).collect();
		threads.sort_unstable_by_key(|(tag, _)| *tag);
		threads
	}

	pub(crate) fn len(&self) -> usize {
		self.threads.len()
	}
}
