use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use swapguard_primitives::Severity;

use crate::{Result, ensure};

/// Concurrency violation monitor settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
	pub enable_race_detection: bool,
	pub enable_deadlock_detection: bool,
	pub enable_lock_order_validation: bool,
	pub enable_resource_tracking: bool,
	/// Start the background detection thread as soon as the context is built.
	pub start_on_init: bool,
	#[serde(rename = "detection_interval_ms", with = "crate::duration_ms")]
	pub detection_interval: Duration,
	/// Capacity of the violation ring buffer.
	pub max_violation_reports: usize,
	/// Access records kept per resource; the oldest is dropped beyond this.
	pub max_records_per_resource: usize,
	/// Most recent records per resource examined by race detection.
	pub analysis_window: usize,
	/// Overlapping writes closer than this are a race.
	#[serde(rename = "race_window_ms", with = "crate::duration_ms")]
	pub race_window: Duration,
	/// Read/write pairs closer than this are unsafe concurrent access.
	#[serde(rename = "conflict_window_ms", with = "crate::duration_ms")]
	pub conflict_window: Duration,
	/// Same-thread same-pattern accesses closer than this coalesce.
	#[serde(rename = "coalesce_window_ms", with = "crate::duration_ms")]
	pub coalesce_window: Duration,
	#[serde(rename = "resource_leak_timeout_ms", with = "crate::duration_ms")]
	pub resource_leak_timeout: Duration,
	#[serde(rename = "record_expiry_ms", with = "crate::duration_ms")]
	pub record_expiry: Duration,
	#[serde(rename = "thread_idle_expiry_ms", with = "crate::duration_ms")]
	pub thread_idle_expiry: Duration,
	/// Held-lock depth above which acquisition is reported as excessive.
	pub max_held_locks: usize,
	pub min_report_severity: Severity,
	/// Emit a tracing event for every stored violation.
	pub log_violations: bool,
	/// File that receives the violation report on shutdown.
	pub violation_log_path: Option<PathBuf>,
	/// Total violations above which the system is considered unhealthy.
	pub unhealthy_violation_threshold: u64,
}

impl Default for MonitorConfig {
	fn default() -> Self {
		Self {
			enable_race_detection: true,
			enable_deadlock_detection: true,
			enable_lock_order_validation: true,
			enable_resource_tracking: true,
			start_on_init: true,
			detection_interval: Duration::from_secs(1),
			max_violation_reports: 1000,
			max_records_per_resource: 1000,
			analysis_window: 10,
			race_window: Duration::from_millis(50),
			conflict_window: Duration::from_millis(100),
			coalesce_window: Duration::from_millis(100),
			resource_leak_timeout: Duration::from_secs(5),
			record_expiry: Duration::from_secs(5 * 60),
			thread_idle_expiry: Duration::from_secs(10 * 60),
			max_held_locks: 8,
			min_report_severity: Severity::Warning,
			log_violations: true,
			violation_log_path: None,
			unhealthy_violation_threshold: 100,
		}
	}
}

impl MonitorConfig {
	pub(crate) fn validate(&self) -> Result<()> {
		ensure(!self.detection_interval.is_zero(), "monitor.detection_interval_ms", "must be non-zero")?;
		ensure(self.max_violation_reports >= 2, "monitor.max_violation_reports", "must be at least 2")?;
		ensure(self.max_records_per_resource > 0, "monitor.max_records_per_resource", "must be at least 1")?;
		ensure(self.analysis_window >= 2, "monitor.analysis_window", "must cover at least one pair")?;
		ensure(
			self.race_window <= self.conflict_window,
			"monitor.race_window_ms",
			"must not exceed conflict_window_ms",
		)
	}
}
