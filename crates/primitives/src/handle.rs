use std::sync::{Arc, Weak};

/// Ownership discipline of a [`ManagedHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
	/// Keeps the object alive.
	Strong,
	/// Observes the object without keeping it alive.
	Weak,
	/// Keeps the object alive and must not be relocated while held.
	Pinned,
}

impl HandleKind {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Strong => "strong",
			Self::Weak => "weak",
			Self::Pinned => "pinned",
		}
	}
}

/// Handle to an object owned by the managed runtime.
///
/// Weak handles must be re-validated through [`ManagedHandle::upgrade`] before
/// every use; the object may be collected between any two calls.
#[derive(Debug)]
pub enum ManagedHandle<T> {
	Strong(Arc<T>),
	Weak(Weak<T>),
	Pinned(Arc<T>),
}

impl<T> ManagedHandle<T> {
	pub fn strong(value: T) -> Self {
		Self::Strong(Arc::new(value))
	}

	pub fn pinned(value: T) -> Self {
		Self::Pinned(Arc::new(value))
	}

	pub const fn kind(&self) -> HandleKind {
		match self {
			Self::Strong(_) => HandleKind::Strong,
			Self::Weak(_) => HandleKind::Weak,
			Self::Pinned(_) => HandleKind::Pinned,
		}
	}

	/// Returns a strong reference if the object is still alive.
	pub fn upgrade(&self) -> Option<Arc<T>> {
		match self {
			Self::Strong(arc) | Self::Pinned(arc) => Some(Arc::clone(arc)),
			Self::Weak(weak) => weak.upgrade(),
		}
	}

	pub fn is_alive(&self) -> bool {
		match self {
			Self::Strong(_) | Self::Pinned(_) => true,
			Self::Weak(weak) => weak.strong_count() > 0,
		}
	}

	/// Returns a weak handle to the same object.
	pub fn downgrade(&self) -> Self {
		match self {
			Self::Strong(arc) | Self::Pinned(arc) => Self::Weak(Arc::downgrade(arc)),
			Self::Weak(weak) => Self::Weak(weak.clone()),
		}
	}

	/// Address of the referenced allocation, used as a resource identity.
	pub fn addr(&self) -> usize {
		match self {
			Self::Strong(arc) | Self::Pinned(arc) => Arc::as_ptr(arc) as *const () as usize,
			Self::Weak(weak) => weak.as_ptr() as *const () as usize,
		}
	}
}

impl<T> Clone for ManagedHandle<T> {
	fn clone(&self) -> Self {
		match self {
			Self::Strong(arc) => Self::Strong(Arc::clone(arc)),
			Self::Weak(weak) => Self::Weak(weak.clone()),
			Self::Pinned(arc) => Self::Pinned(Arc::clone(arc)),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn weak_handle_dies_with_last_strong() {
		let strong = ManagedHandle::strong(5_u32);
		let weak = strong.downgrade();
		assert_eq!(weak.kind(), HandleKind::Weak);
		assert_eq!(weak.upgrade().as_deref(), Some(&5));
		assert_eq!(weak.addr(), strong.addr());

		drop(strong);
		assert!(!weak.is_alive());
		assert!(weak.upgrade().is_none());
	}

	#[test]
	fn pinned_handle_keeps_object_alive() {
		let pinned = ManagedHandle::pinned(String::from("asm"));
		let clone = pinned.clone();
		drop(pinned);
		assert!(clone.is_alive());
		assert_eq!(clone.kind().as_str(), "pinned");
	}
}
