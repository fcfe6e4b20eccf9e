use std::fmt;

/// Identifier of one reload session, unique for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub(crate) u64);

impl SessionId {
	pub const fn get(self) -> u64 {
		self.0
	}
}

impl fmt::Display for SessionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "reload#{}", self.0)
	}
}

/// Lifecycle state of the process-wide reload slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReloadState {
	Idle = 0,
	Preparing = 1,
	InProgress = 2,
	Finalizing = 3,
	Failed = 4,
	Cancelled = 5,
}

impl ReloadState {
	pub(crate) const fn from_u8(raw: u8) -> Self {
		match raw {
			1 => Self::Preparing,
			2 => Self::InProgress,
			3 => Self::Finalizing,
			4 => Self::Failed,
			5 => Self::Cancelled,
			_ => Self::Idle,
		}
	}

	/// Whether `self -> to` is an edge of the lifecycle graph.
	///
	/// Emergency stop and re-initialisation force a state without consulting
	/// this table; every other mutation goes through it.
	pub const fn can_transition_to(self, to: Self) -> bool {
		matches!(
			(self, to),
			(Self::Idle, Self::Preparing)
				| (Self::Preparing, Self::InProgress | Self::Failed | Self::Cancelled)
				| (Self::InProgress, Self::Finalizing | Self::Failed | Self::Cancelled)
				| (Self::Finalizing, Self::Idle | Self::Failed)
				| (Self::Failed, Self::Idle)
				| (Self::Cancelled, Self::Idle)
		)
	}

	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Idle => "idle",
			Self::Preparing => "preparing",
			Self::InProgress => "in_progress",
			Self::Finalizing => "finalizing",
			Self::Failed => "failed",
			Self::Cancelled => "cancelled",
		}
	}
}

impl fmt::Display for ReloadState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Granularity of a reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReloadKind {
	/// Every reloadable assembly is replaced.
	Full = 0,
	/// Only assemblies whose sources changed are replaced.
	Incremental = 1,
	/// One named assembly is replaced.
	Assembly = 2,
	/// Individual method bodies are patched in place.
	Method = 3,
}

impl ReloadKind {
	pub(crate) const fn from_u8(raw: u8) -> Self {
		match raw {
			1 => Self::Incremental,
			2 => Self::Assembly,
			3 => Self::Method,
			_ => Self::Full,
		}
	}

	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Full => "full",
			Self::Incremental => "incremental",
			Self::Assembly => "assembly",
			Self::Method => "method",
		}
	}
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionOutcome {
	Succeeded,
	Failed,
	/// The session guard was dropped without an explicit outcome.
	Abandoned,
}

impl SessionOutcome {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Succeeded => "succeeded",
			Self::Failed => "failed",
			Self::Abandoned => "abandoned",
		}
	}
}

/// Platform-specific sub-phase of an in-progress reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PlatformPhase {
	Ready = 0,
	PlatformSpecific = 1,
	DomainSwitching = 2,
	MethodReplacing = 3,
}

impl PlatformPhase {
	pub(crate) const fn from_u8(raw: u8) -> Self {
		match raw {
			1 => Self::PlatformSpecific,
			2 => Self::DomainSwitching,
			3 => Self::MethodReplacing,
			_ => Self::Ready,
		}
	}

	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Ready => "ready",
			Self::PlatformSpecific => "platform_specific",
			Self::DomainSwitching => "domain_switching",
			Self::MethodReplacing => "method_replacing",
		}
	}
}
