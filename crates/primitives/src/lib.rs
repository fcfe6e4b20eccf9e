//! Core types shared across the reload pipeline: thread identities, handles into
//! the managed runtime, and lock-free numeric helpers for statistics.

/// Lock-free `f64` cell for running averages and maxima.
pub mod atomic_f64;
/// Ownership-tagged handles to objects living in the managed runtime.
pub mod handle;
/// Opaque descriptors for native objects, types, methods and assemblies.
pub mod managed;
/// Ordered severity levels for diagnostics.
pub mod severity;
/// Stable per-thread identifiers.
pub mod thread_tag;

pub use atomic_f64::AtomicF64;
pub use handle::{HandleKind, ManagedHandle};
pub use managed::{AssemblyRef, EventInvocation, MethodRef, NativeRef, TypeHandle};
pub use severity::Severity;
pub use thread_tag::ThreadTag;
