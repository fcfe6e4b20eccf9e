use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use swapguard_primitives::{AssemblyRef, HandleKind, ManagedHandle, MethodRef};

type Replacements = SmallVec<[MethodRef; 2]>;

/// Loaded assemblies and pending method replacements, keyed by name.
///
/// The two maps sit behind separate locks and no method holds both. Weak
/// handles are re-validated on lookup and pruned once their assembly has been
/// collected.
#[derive(Debug, Default)]
pub struct AssemblyRegistry {
	assemblies: Mutex<FxHashMap<Arc<str>, ManagedHandle<AssemblyRef>>>,
	replacements: Mutex<FxHashMap<Arc<str>, Replacements>>,
}

impl AssemblyRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `handle` under `name`, returning the handle it replaced.
	pub fn register(&self, name: impl Into<Arc<str>>, handle: ManagedHandle<AssemblyRef>) -> Option<ManagedHandle<AssemblyRef>> {
		let name = name.into();
		tracing::debug!(assembly = %name, handle = handle.kind().as_str(), "reload.assembly.register");
		self.assemblies.lock().insert(name, handle)
	}

	pub fn unregister(&self, name: &str) -> bool {
		let removed = self.assemblies.lock().remove(name).is_some();
		if removed {
			tracing::debug!(assembly = name, "reload.assembly.unregister");
		}
		removed
	}

	/// Resolves `name` to a live assembly.
	pub fn get(&self, name: &str) -> Option<Arc<AssemblyRef>> {
		let mut assemblies = self.assemblies.lock();
		let resolved = assemblies.get(name)?.upgrade();
		if resolved.is_none() {
			assemblies.remove(name);
			tracing::debug!(assembly = name, "reload.assembly.collected");
		}
		resolved
	}

	/// Drops every weak entry whose assembly is gone. Returns how many were removed.
	pub fn prune_dead(&self) -> usize {
		let mut assemblies = self.assemblies.lock();
		let before = assemblies.len();
		assemblies.retain(|_, handle| handle.kind() != HandleKind::Weak || handle.is_alive());
		before - assemblies.len()
	}

	/// Records the methods that replace `method` once the reload commits.
	pub fn map_method_replacement(&self, method: impl Into<Arc<str>>, targets: impl IntoIterator<Item = MethodRef>) {
		let targets: Replacements = targets.into_iter().collect();
		let method = method.into();
		tracing::trace!(method = %method, targets = targets.len(), "reload.method.map");
		self.replacements.lock().insert(method, targets);
	}

	pub fn method_replacements(&self, method: &str) -> Vec<MethodRef> {
		self.replacements.lock().get(method).map(|targets| targets.to_vec()).unwrap_or_default()
	}

	pub fn assembly_count(&self) -> usize {
		self.assemblies.lock().len()
	}

	pub fn replacement_count(&self) -> usize {
		self.replacements.lock().len()
	}

	pub(crate) fn clear(&self) {
		self.assemblies.lock().clear();
		self.replacements.lock().clear();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn weak_entries_disappear_with_their_assembly() {
		let registry = AssemblyRegistry::new();
		let owner = ManagedHandle::strong(AssemblyRef::new(1, "Game.Logic"));
		registry.register("Game.Logic", owner.downgrade());
		registry.register("Game.Core", ManagedHandle::pinned(AssemblyRef::new(2, "Game.Core")));

		assert_eq!(registry.get("Game.Logic").map(|a| a.id), Some(1));
		drop(owner);
		assert!(registry.get("Game.Logic").is_none());
		assert_eq!(registry.assembly_count(), 1);
		assert_eq!(registry.prune_dead(), 0);
		assert!(registry.unregister("Game.Core"));
		assert!(!registry.unregister("Game.Core"));
	}

	#[test]
	fn prune_keeps_owning_handles() {
		let registry = AssemblyRegistry::new();
		let owner = ManagedHandle::strong(AssemblyRef::new(3, "Tools"));
		registry.register("Tools.Weak", owner.downgrade());
		registry.register("Tools", owner.clone());
		drop(owner);
		assert_eq!(registry.prune_dead(), 0);
		assert_eq!(registry.assembly_count(), 2);
		registry.unregister("Tools");
		assert_eq!(registry.prune_dead(), 1);
	}

	#[test]
	fn method_replacements_are_overwritten() {
		let registry = AssemblyRegistry::new();
		registry.map_method_replacement("Player::Tick", [MethodRef(10)]);
		registry.map_method_replacement("Player::Tick", [MethodRef(11), MethodRef(12)]);
		assert_eq!(registry.method_replacements("Player::Tick"), vec![MethodRef(11), MethodRef(12)]);
		assert!(registry.method_replacements("Player::Draw").is_empty());
		assert_eq!(registry.replacement_count(), 1);
	}
}
