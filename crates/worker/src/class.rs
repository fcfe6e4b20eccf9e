/// Execution classes used for thread naming and observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Periodic detection loops that must never block reload progress.
	Monitoring,
	/// One-shot delayed work that restores a component after an emergency stop.
	Recovery,
}

impl TaskClass {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Monitoring => "monitoring",
			Self::Recovery => "recovery",
		}
	}
}
