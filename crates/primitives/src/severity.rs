use std::fmt;

use serde::Deserialize;

/// Ordered severity of a diagnostic finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
	Info,
	Warning,
	Error,
	Critical,
}

impl Severity {
	/// All severities, most severe first.
	pub const DESCENDING: [Self; 4] = [Self::Critical, Self::Error, Self::Warning, Self::Info];

	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Info => "info",
			Self::Warning => "warning",
			Self::Error => "error",
			Self::Critical => "critical",
		}
	}
}

impl fmt::Display for Severity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
