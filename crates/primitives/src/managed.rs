use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

/// Address of a native (host-side) object handed to the managed runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeRef(usize);

impl NativeRef {
	pub const fn new(addr: usize) -> Self {
		Self(addr)
	}

	pub const fn addr(self) -> usize {
		self.0
	}

	pub const fn is_null(self) -> bool {
		self.0 == 0
	}
}

/// Runtime-assigned type token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeHandle(pub u64);

/// Runtime-assigned method token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodRef(pub u64);

/// Loaded assembly descriptor. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssemblyRef {
	pub id: u64,
	pub name: Arc<str>,
}

impl AssemblyRef {
	pub fn new(id: u64, name: impl Into<Arc<str>>) -> Self {
		Self { id, name: name.into() }
	}
}

impl fmt::Display for AssemblyRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}#{}", self.name, self.id)
	}
}

/// One managed event dispatch: target object, event name and raw argument words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventInvocation {
	pub target: NativeRef,
	pub event: Arc<str>,
	pub args: SmallVec<[usize; 4]>,
}

impl EventInvocation {
	pub fn new(target: NativeRef, event: impl Into<Arc<str>>) -> Self {
		Self {
			target,
			event: event.into(),
			args: SmallVec::new(),
		}
	}

	#[must_use]
	pub fn arg(mut self, word: usize) -> Self {
		self.args.push(word);
		self
	}
}
