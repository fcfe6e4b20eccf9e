use swapguard_primitives::{AssemblyRef, EventInvocation, ManagedHandle, MethodRef, NativeRef, TypeHandle};
use thiserror::Error;

/// Exception or error status raised by the managed runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("managed runtime error {code}: {message}")]
pub struct ForeignError {
	pub code: i32,
	pub message: String,
}

impl ForeignError {
	pub fn new(code: i32, message: impl Into<String>) -> Self {
		Self {
			code,
			message: message.into(),
		}
	}

	pub(crate) fn not_found(what: &str, name: &str) -> Self {
		Self::new(-1, format!("{what} {name} not found"))
	}
}

/// Entry points into the reloadable runtime.
///
/// Implementations are the raw, unguarded calls. They may block, fail, or
/// panic; [`crate::CallbackGateway`] bounds and observes them.
pub trait ManagedRuntime: Send + Sync {
	type Object: Send + Sync;

	fn create_object(&self, ty: TypeHandle) -> Result<ManagedHandle<Self::Object>, ForeignError>;

	/// Wraps an existing native object in a managed proxy.
	fn create_object_wrapper(&self, native: NativeRef, ty: TypeHandle) -> Result<ManagedHandle<Self::Object>, ForeignError>;

	/// Raises a managed event. Returns the runtime status; 0 is success.
	fn invoke_event(&self, event: &EventInvocation) -> Result<i32, ForeignError>;

	fn invoke_delegate(&self, delegate: &ManagedHandle<Self::Object>, args: &[usize]) -> Result<usize, ForeignError>;

	fn lookup_method(&self, ty: TypeHandle, name: &str) -> Result<Option<MethodRef>, ForeignError>;

	fn lookup_type(&self, assembly: &AssemblyRef, name: &str) -> Result<Option<TypeHandle>, ForeignError>;

	fn dispose(&self, object: &ManagedHandle<Self::Object>) -> Result<(), ForeignError>;

	fn free_handle(&self, handle: ManagedHandle<Self::Object>) -> Result<(), ForeignError>;
}
