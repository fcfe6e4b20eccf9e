use std::fmt;
use std::time::Duration;

/// How a gated call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackResult {
	Success,
	Failed,
	/// Completed, but later than the configured ceiling. The value is kept.
	Timeout,
	TooManyConcurrentCalls,
	SystemNotReady,
}

impl CallbackResult {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Success => "success",
			Self::Failed => "failed",
			Self::Timeout => "timeout",
			Self::TooManyConcurrentCalls => "too_many_concurrent_calls",
			Self::SystemNotReady => "system_not_ready",
		}
	}

	/// Whether the call never ran.
	pub const fn is_rejected(self) -> bool {
		matches!(self, Self::TooManyConcurrentCalls | Self::SystemNotReady)
	}
}

impl fmt::Display for CallbackResult {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Operation label for logs, tracking and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
	CreateObject,
	CreateObjectWrapper,
	InvokeEvent,
	InvokeDelegate,
	LookupMethod,
	LookupType,
	Dispose,
	FreeHandle,
	Custom(&'static str),
}

impl CallKind {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::CreateObject => "create_object",
			Self::CreateObjectWrapper => "create_object_wrapper",
			Self::InvokeEvent => "invoke_event",
			Self::InvokeDelegate => "invoke_delegate",
			Self::LookupMethod => "lookup_method",
			Self::LookupType => "lookup_type",
			Self::Dispose => "dispose",
			Self::FreeHandle => "free_handle",
			Self::Custom(name) => name,
		}
	}
}

/// Result of one gated call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome<T> {
	pub result: CallbackResult,
	/// Present for `Success` and `Timeout`.
	pub value: Option<T>,
	/// Zero when the call was rejected.
	pub elapsed: Duration,
}

impl<T> CallOutcome<T> {
	pub(crate) const fn rejected(result: CallbackResult) -> Self {
		Self {
			result,
			value: None,
			elapsed: Duration::ZERO,
		}
	}

	pub fn is_success(&self) -> bool {
		self.result == CallbackResult::Success
	}

	/// The value of a call that completed, late or not.
	pub fn into_value(self) -> Option<T> {
		self.value
	}

	pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CallOutcome<U> {
		CallOutcome {
			result: self.result,
			value: self.value.map(f),
			elapsed: self.elapsed,
		}
	}
}
