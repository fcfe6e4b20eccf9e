use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::TaskClass;

/// Snapshot for one registered background thread.
#[derive(Debug, Clone)]
pub struct WorkerRecord {
	pub name: String,
	pub class: TaskClass,
	pub generation: u64,
	pub cycles: u64,
	pub running: bool,
	pub last_exit: Option<String>,
}

impl WorkerRecord {
	pub fn started(name: impl Into<String>, class: TaskClass, generation: u64) -> Self {
		Self {
			name: name.into(),
			class,
			generation,
			cycles: 0,
			running: true,
			last_exit: None,
		}
	}
}

/// In-memory worker registry for status snapshots.
#[derive(Debug, Default, Clone)]
pub struct WorkerRegistry {
	inner: Arc<RwLock<FxHashMap<String, WorkerRecord>>>,
}

impl WorkerRegistry {
	/// Creates an empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Upserts one record.
	pub fn upsert(&self, record: WorkerRecord) {
		self.inner.write().insert(record.name.clone(), record);
	}

	/// Counts one completed work cycle for `name`.
	pub fn record_cycle(&self, name: &str) {
		if let Some(record) = self.inner.write().get_mut(name) {
			record.cycles = record.cycles.wrapping_add(1);
		}
	}

	/// Marks `name` as stopped with an exit description.
	pub fn mark_exited(&self, name: &str, exit: impl Into<String>) {
		if let Some(record) = self.inner.write().get_mut(name) {
			record.running = false;
			record.last_exit = Some(exit.into());
		}
	}

	/// Returns snapshots sorted by name.
	pub fn snapshots(&self) -> Vec<WorkerRecord> {
		let mut records: Vec<_> = self.inner.read().values().cloned().collect();
		records.sort_by(|a, b| a.name.cmp(&b.name));
		records
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cycles_and_exit_are_tracked() {
		let registry = WorkerRegistry::new();
		registry.upsert(WorkerRecord::started("b-loop", TaskClass::Monitoring, 2));
		registry.upsert(WorkerRecord::started("a-reset", TaskClass::Recovery, 1));
		registry.record_cycle("b-loop");
		registry.record_cycle("b-loop");
		registry.record_cycle("missing");
		registry.mark_exited("b-loop", "stopped");

		let snaps = registry.snapshots();
		assert_eq!(snaps.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(), ["a-reset", "b-loop"]);
		assert_eq!(snaps[1].cycles, 2);
		assert!(!snaps[1].running);
		assert_eq!(snaps[1].last_exit.as_deref(), Some("stopped"));
	}
}
