use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use swapguard_primitives::ThreadTag;

use crate::{AccessPattern, ResourceId, ViolationKind};

/// One (possibly coalesced) run of accesses by a single thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRecord {
	pub thread: ThreadTag,
	pub pattern: AccessPattern,
	pub first_at: Instant,
	pub last_at: Instant,
	pub count: u32,
	/// Ledger-wide sequence number of the first access in the run.
	pub seq: u64,
}

#[derive(Debug)]
struct ResourceEntry {
	name: Arc<str>,
	records: VecDeque<AccessRecord>,
	/// Highest `seq` whose pair with its predecessor was already classified.
	analyzed_through: u64,
	/// Set once the current idle episode was reported; cleared by the next access.
	leak_reported: bool,
}

/// Adjacent pair of accesses that conflicts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaceFinding {
	pub kind: ViolationKind,
	pub resource: ResourceId,
	pub resource_name: Arc<str>,
	pub earlier: (ThreadTag, AccessPattern),
	pub later: (ThreadTag, AccessPattern),
	pub gap: Duration,
}

/// Resource left untouched past the leak timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeakFinding {
	pub resource: ResourceId,
	pub resource_name: Arc<str>,
	pub last_thread: ThreadTag,
	pub idle: Duration,
}

/// Classification thresholds for adjacent access pairs.
#[derive(Debug, Clone, Copy)]
pub struct RaceWindows {
	/// Most recent records per resource that are examined.
	pub analysis_window: usize,
	/// Two writers closer than this race.
	pub race: Duration,
	/// A reader and a writer closer than this conflict.
	pub conflict: Duration,
}

/// Bounded per-resource history of who touched what, and how.
///
/// Not synchronised itself; the monitor keeps it behind one mutex.
#[derive(Debug)]
pub struct ResourceAccessLedger {
	resources: FxHashMap<ResourceId, ResourceEntry>,
	next_seq: u64,
	per_resource_cap: usize,
	coalesce_window: Duration,
}

impl ResourceAccessLedger {
	pub fn new(per_resource_cap: usize, coalesce_window: Duration) -> Self {
		Self {
			resources: FxHashMap::default(),
			next_seq: 0,
			per_resource_cap: per_resource_cap.max(1),
			coalesce_window,
		}
	}

	/// Appends one access, or folds it into the newest record when the same
	/// thread repeats the same pattern within the coalesce window.
	pub fn record(&mut self, resource: ResourceId, name: &str, thread: ThreadTag, pattern: AccessPattern, at: Instant) {
		let entry = self.resources.entry(resource).or_insert_with(|| ResourceEntry {
			name: name.into(),
			records: VecDeque::new(),
			analyzed_through: 0,
			leak_reported: false,
		});
		entry.leak_reported = false;

		if let Some(last) = entry.records.back_mut() {
			if last.thread == thread && last.pattern == pattern && at.saturating_duration_since(last.last_at) < self.coalesce_window {
				last.last_at = last.last_at.max(at);
				last.count = last.count.saturating_add(1);
				return;
			}
		}

		self.next_seq += 1;
		entry.records.push_back(AccessRecord {
			thread,
			pattern,
			first_at: at,
			last_at: at,
			count: 1,
			seq: self.next_seq,
		});
		while entry.records.len() > self.per_resource_cap {
			entry.records.pop_front();
		}
	}

	/// Classifies every adjacent pair that appeared since the previous call.
	///
	/// Pairs from one thread never conflict, and neither do atomic accesses.
	pub fn analyze_races(&mut self, windows: RaceWindows) -> Vec<RaceFinding> {
		let mut findings = Vec::new();
		for (resource, entry) in &mut self.resources {
			let len = entry.records.len();
			if len < 2 {
				continue;
			}
			let start = len.saturating_sub(windows.analysis_window.max(2));
			for i in start..len - 1 {
				let (a, b) = (&entry.records[i], &entry.records[i + 1]);
				if b.seq <= entry.analyzed_through {
					continue;
				}
				if let Some((kind, gap)) = classify(a, b, windows) {
					findings.push(RaceFinding {
						kind,
						resource: resource.clone(),
						resource_name: Arc::clone(&entry.name),
						earlier: (a.thread, a.pattern),
						later: (b.thread, b.pattern),
						gap,
					});
				}
			}
			if let Some(last) = entry.records.back() {
				entry.analyzed_through = last.seq;
			}
		}
		findings
	}

	/// Reports resources idle for longer than `timeout`, once per idle episode.
	pub fn detect_leaks(&mut self, now: Instant, timeout: Duration) -> Vec<LeakFinding> {
		let mut findings = Vec::new();
		for (resource, entry) in &mut self.resources {
			if entry.leak_reported {
				continue;
			}
			let Some(last) = entry.records.back() else {
				continue;
			};
			let idle = now.saturating_duration_since(last.last_at);
			if idle > timeout {
				entry.leak_reported = true;
				findings.push(LeakFinding {
					resource: resource.clone(),
					resource_name: Arc::clone(&entry.name),
					last_thread: last.thread,
					idle,
				});
			}
		}
		findings
	}

	/// Drops records older than `max_age` and resources left without records.
	/// Returns the number of records removed.
	pub fn expire(&mut self, now: Instant, max_age: Duration) -> usize {
		let mut removed = 0;
		self.resources.retain(|_, entry| {
			let before = entry.records.len();
			entry.records.retain(|record| now.saturating_duration_since(record.last_at) <= max_age);
			removed += before - entry.records.len();
			!entry.records.is_empty()
		});
		removed
	}

	pub fn records(&self, resource: &ResourceId) -> Vec<AccessRecord> {
		self.resources.get(resource).map(|entry| entry.records.iter().cloned().collect()).unwrap_or_default()
	}

	pub fn resource_count(&self) -> usize {
		self.resources.len()
	}

	pub fn record_count(&self) -> usize {
		self.resources.values().map(|entry| entry.records.len()).sum()
	}
}

fn classify(a: &AccessRecord, b: &AccessRecord, windows: RaceWindows) -> Option<(ViolationKind, Duration)> {
	if a.thread == b.thread {
		return None;
	}
	let gap = b.first_at.saturating_duration_since(a.last_at);
	let read_write = (a.pattern == AccessPattern::Read && b.pattern.writes()) || (a.pattern.writes() && b.pattern == AccessPattern::Read);
	if a.pattern.writes() && b.pattern.writes() && gap < windows.race {
		Some((ViolationKind::RaceCondition, gap))
	} else if read_write && gap < windows.conflict {
		Some((ViolationKind::UnsafeConcurrentAccess, gap))
	} else {
		None
	}
}

#[cfg(test)]
mod tests {
	use proptest::prelude::*;
	use rstest::rstest;

	use super::*;

	const WINDOWS: RaceWindows = RaceWindows {
		analysis_window: 10,
		race: Duration::from_millis(50),
		conflict: Duration::from_millis(100),
	};

	fn ms(base: Instant, n: u64) -> Instant {
		base + Duration::from_millis(n)
	}

	#[rstest]
	#[case(AccessPattern::Write, AccessPattern::Write, 10, Some(ViolationKind::RaceCondition))]
	#[case(AccessPattern::ReadWrite, AccessPattern::Write, 49, Some(ViolationKind::RaceCondition))]
	#[case(AccessPattern::Write, AccessPattern::Write, 60, None)]
	#[case(AccessPattern::Write, AccessPattern::Write, 200, None)]
	#[case(AccessPattern::Read, AccessPattern::Write, 80, Some(ViolationKind::UnsafeConcurrentAccess))]
	#[case(AccessPattern::ReadWrite, AccessPattern::Read, 10, Some(ViolationKind::UnsafeConcurrentAccess))]
	#[case(AccessPattern::Read, AccessPattern::Write, 150, None)]
	#[case(AccessPattern::Read, AccessPattern::Read, 1, None)]
	#[case(AccessPattern::Atomic, AccessPattern::Write, 1, None)]
	fn classifies_cross_thread_pairs(
		#[case] first: AccessPattern,
		#[case] second: AccessPattern,
		#[case] gap_ms: u64,
		#[case] expected: Option<ViolationKind>,
	) {
		let base = Instant::now();
		let mut ledger = ResourceAccessLedger::new(100, Duration::from_millis(100));
		ledger.record(ResourceId::from("buf"), "buf", ThreadTag::from_raw(1), first, base);
		ledger.record(ResourceId::from("buf"), "buf", ThreadTag::from_raw(2), second, ms(base, gap_ms));
		let kinds: Vec<_> = ledger.analyze_races(WINDOWS).into_iter().map(|f| f.kind).collect();
		assert_eq!(kinds, expected.into_iter().collect::<Vec<_>>());
	}

	#[test]
	fn same_thread_never_races() {
		let base = Instant::now();
		let mut ledger = ResourceAccessLedger::new(100, Duration::from_millis(100));
		let tag = ThreadTag::from_raw(1);
		ledger.record(ResourceId::Addr(0x10), "x", tag, AccessPattern::Write, base);
		ledger.record(ResourceId::Addr(0x10), "x", tag, AccessPattern::Read, ms(base, 1));
		ledger.record(ResourceId::Addr(0x10), "x", tag, AccessPattern::Write, ms(base, 2));
		assert!(ledger.analyze_races(WINDOWS).is_empty());
	}

	#[test]
	fn each_pair_is_reported_once() {
		let base = Instant::now();
		let mut ledger = ResourceAccessLedger::new(100, Duration::from_millis(100));
		ledger.record(ResourceId::from("r"), "r", ThreadTag::from_raw(1), AccessPattern::Write, base);
		ledger.record(ResourceId::from("r"), "r", ThreadTag::from_raw(2), AccessPattern::Write, ms(base, 5));
		assert_eq!(ledger.analyze_races(WINDOWS).len(), 1);
		assert!(ledger.analyze_races(WINDOWS).is_empty());

		ledger.record(ResourceId::from("r"), "r", ThreadTag::from_raw(1), AccessPattern::Write, ms(base, 10));
		let findings = ledger.analyze_races(WINDOWS);
		assert_eq!(findings.len(), 1);
		assert_eq!(findings[0].earlier.0, ThreadTag::from_raw(2));
		assert_eq!(findings[0].later.0, ThreadTag::from_raw(1));
	}

	#[test]
	fn repeated_access_coalesces() {
		let base = Instant::now();
		let mut ledger = ResourceAccessLedger::new(100, Duration::from_millis(100));
		let tag = ThreadTag::from_raw(9);
		for n in 0..5 {
			ledger.record(ResourceId::from("c"), "c", tag, AccessPattern::Read, ms(base, n * 20));
		}
		ledger.record(ResourceId::from("c"), "c", tag, AccessPattern::Read, ms(base, 300));
		let records = ledger.records(&ResourceId::from("c"));
		assert_eq!(records.len(), 2);
		assert_eq!(records[0].count, 5);
		assert_eq!(records[0].last_at, ms(base, 80));
	}

	#[test]
	fn leaks_are_reported_once_per_idle_episode() {
		let base = Instant::now();
		let timeout = Duration::from_secs(5);
		let mut ledger = ResourceAccessLedger::new(100, Duration::from_millis(100));
		let id = ResourceId::from("pool");
		ledger.record(id.clone(), "pool", ThreadTag::from_raw(1), AccessPattern::Write, base);

		assert!(ledger.detect_leaks(ms(base, 4_000), timeout).is_empty());
		let leaks = ledger.detect_leaks(ms(base, 6_000), timeout);
		assert_eq!(leaks.len(), 1);
		assert_eq!(leaks[0].idle, Duration::from_secs(6));
		assert!(ledger.detect_leaks(ms(base, 9_000), timeout).is_empty());

		ledger.record(id, "pool", ThreadTag::from_raw(1), AccessPattern::Read, ms(base, 10_000));
		assert!(ledger.detect_leaks(ms(base, 12_000), timeout).is_empty());
		assert_eq!(ledger.detect_leaks(ms(base, 16_000), timeout).len(), 1);
	}

	#[test]
	fn expiry_drops_old_records_and_empty_resources() {
		let base = Instant::now();
		let mut ledger = ResourceAccessLedger::new(100, Duration::ZERO);
		ledger.record(ResourceId::from("old"), "old", ThreadTag::from_raw(1), AccessPattern::Read, base);
		ledger.record(ResourceId::from("new"), "new", ThreadTag::from_raw(1), AccessPattern::Read, base);
		ledger.record(ResourceId::from("new"), "new", ThreadTag::from_raw(2), AccessPattern::Read, ms(base, 400_000));

		let removed = ledger.expire(ms(base, 400_000), Duration::from_secs(300));
		assert_eq!(removed, 2);
		assert_eq!(ledger.resource_count(), 1);
		assert_eq!(ledger.record_count(), 1);
	}

	proptest! {
		#[test]
		fn history_respects_cap_and_sequence_order(
			accesses in proptest::collection::vec((0u64..4, 0u64..3, 0u64..50), 1..200),
			cap in 1usize..16,
		) {
			let base = Instant::now();
			let mut ledger = ResourceAccessLedger::new(cap, Duration::from_millis(10));
			let mut clock = 0;
			for (thread, resource, step) in accesses {
				clock += step;
				let id = ResourceId::Addr(resource as usize + 1);
				ledger.record(id, "r", ThreadTag::from_raw(thread), AccessPattern::Write, ms(base, clock));
			}
			for resource in 1..=3usize {
				let records = ledger.records(&ResourceId::Addr(resource));
				prop_assert!(records.len() <= cap);
				prop_assert!(records.windows(2).all(|w| w[0].seq < w[1].seq));
			}
		}
	}
}
