use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use smallvec::SmallVec;
use swapguard_primitives::{Severity, ThreadTag};

use crate::ViolationKind;

/// One detected violation of the concurrency discipline.
#[derive(Debug, Clone)]
pub struct ViolationReport {
	pub kind: ViolationKind,
	pub severity: Severity,
	pub description: String,
	pub resource_name: Option<Arc<str>>,
	pub threads: SmallVec<[ThreadTag; 2]>,
	pub detected_at: Instant,
	pub detected_wall: DateTime<Utc>,
	pub details: Vec<(&'static str, String)>,
}

impl ViolationReport {
	pub fn new(kind: ViolationKind, severity: Severity, description: impl Into<String>) -> Self {
		Self {
			kind,
			severity,
			description: description.into(),
			resource_name: None,
			threads: SmallVec::new(),
			detected_at: Instant::now(),
			detected_wall: Utc::now(),
			details: Vec::new(),
		}
	}

	#[must_use]
	pub fn resource(mut self, name: impl Into<Arc<str>>) -> Self {
		self.resource_name = Some(name.into());
		self
	}

	#[must_use]
	pub fn thread(mut self, thread: ThreadTag) -> Self {
		if !self.threads.contains(&thread) {
			self.threads.push(thread);
		}
		self
	}

	#[must_use]
	pub fn detail(mut self, key: &'static str, value: impl ToString) -> Self {
		self.details.push((key, value.to_string()));
		self
	}
}

/// Bounded store of accepted reports, oldest first.
///
/// When full, the oldest half is evicted in one step so that a burst of
/// violations costs one bulk drain instead of a shift per report.
#[derive(Debug)]
pub(crate) struct ViolationLog {
	reports: VecDeque<ViolationReport>,
	capacity: usize,
}

impl ViolationLog {
	pub(crate) fn new(capacity: usize) -> Self {
		Self {
			reports: VecDeque::with_capacity(capacity.min(1024)),
			capacity: capacity.max(2),
		}
	}

	/// Stores `report`. Returns how many old reports were evicted to make room.
	pub(crate) fn push(&mut self, report: ViolationReport) -> usize {
		let mut evicted = 0;
		if self.reports.len() >= self.capacity {
			evicted = self.reports.len() / 2;
			self.reports.drain(..evicted);
		}
		self.reports.push_back(report);
		evicted
	}

	pub(crate) fn at_least(&self, min: Severity) -> Vec<ViolationReport> {
		self.reports.iter().filter(|r| r.severity >= min).cloned().collect()
	}

	pub(crate) fn has_critical(&self) -> bool {
		self.reports.iter().any(|r| r.severity == Severity::Critical)
	}

	pub(crate) fn len(&self) -> usize {
		self.reports.len()
	}

	pub(crate) fn clear(&mut self) {
		self.reports.clear();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn report(n: usize) -> ViolationReport {
		ViolationReport::new(ViolationKind::ResourceLeak, Severity::Warning, format!("leak {n}"))
	}

	#[test]
	fn full_log_evicts_oldest_half() {
		let mut log = ViolationLog::new(10);
		for n in 0..10 {
			assert_eq!(log.push(report(n)), 0);
		}
		assert_eq!(log.push(report(10)), 5);
		assert_eq!(log.len(), 6);
		let kept = log.at_least(Severity::Info);
		assert_eq!(kept.first().map(|r| r.description.as_str()), Some("leak 5"));
		assert_eq!(kept.last().map(|r| r.description.as_str()), Some("leak 10"));
	}

	#[test]
	fn builder_deduplicates_threads() {
		let tag = ThreadTag::from_raw(3);
		let report = report(0).thread(tag).thread(tag).thread(ThreadTag::from_raw(4)).detail("gap_ms", 12);
		assert_eq!(report.threads.as_slice(), &[tag, ThreadTag::from_raw(4)]);
		assert_eq!(report.details, vec![("gap_ms", "12".to_string())]);
	}
}
