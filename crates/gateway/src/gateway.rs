use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};
use rustc_hash::FxHashMap;
use swapguard_config::GatewayConfig;
use swapguard_monitor::{AccessPattern, ConcurrencyMonitor, ResourceId};
use swapguard_primitives::{AssemblyRef, EventInvocation, ManagedHandle, MethodRef, NativeRef, ThreadTag, TypeHandle};
use swapguard_worker::{deadline_after, panic_message, wait_until_deadline};

use crate::stats::{GatewayStats, GatewayStatsSnapshot, TIMEOUT_RATIO_MIN_CALLS};
use crate::{CallKind, CallOutcome, CallbackResult, ForeignError, ManagedRuntime};

const MIN_SUCCESS_RATE: f64 = 0.95;
const MAX_TIMEOUT_RATIO: f64 = 0.10;

#[derive(Debug, Clone, Copy)]
struct CallInfo {
	kind: CallKind,
	thread: ThreadTag,
	started: Instant,
}

/// A call currently inside the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveCall {
	pub id: u64,
	pub kind: CallKind,
	pub thread: ThreadTag,
	pub age: Duration,
}

struct Inner {
	ready: AtomicBool,
	shutting_down: AtomicBool,
	config: RwLock<GatewayConfig>,
	active: AtomicUsize,
	/// Bumped by every forced abandon; guards from older epochs leave the counter alone.
	epoch: AtomicU64,
	next_call: AtomicU64,
	calls: Mutex<FxHashMap<u64, CallInfo>>,
	released_lock: Mutex<()>,
	released: Condvar,
	stats: GatewayStats,
	monitor: RwLock<Option<ConcurrencyMonitor>>,
}

/// Admission control and observation for calls into the reloadable runtime.
///
/// Never blocks on admission: a call either takes a slot immediately or is
/// refused. Calls are never interrupted; the timeout is judged after return.
#[derive(Clone)]
pub struct CallbackGateway {
	inner: Arc<Inner>,
}

impl Default for CallbackGateway {
	fn default() -> Self {
		Self::new()
	}
}

/// Holds one admission slot until dropped, including on unwind.
struct CallGuard<'a> {
	inner: &'a Inner,
	id: u64,
	epoch: u64,
}

impl Drop for CallGuard<'_> {
	fn drop(&mut self) {
		{
			let mut calls = self.inner.calls.lock();
			if self.inner.epoch.load(Ordering::Acquire) == self.epoch {
				calls.remove(&self.id);
				self.inner.active.fetch_sub(1, Ordering::AcqRel);
			}
		}
		let _lock = self.inner.released_lock.lock();
		self.inner.released.notify_all();
	}
}

impl CallbackGateway {
	pub fn new() -> Self {
		Self {
			inner: Arc::new(Inner {
				ready: AtomicBool::new(false),
				shutting_down: AtomicBool::new(false),
				config: RwLock::new(GatewayConfig::default()),
				active: AtomicUsize::new(0),
				epoch: AtomicU64::new(0),
				next_call: AtomicU64::new(0),
				calls: Mutex::new(FxHashMap::default()),
				released_lock: Mutex::new(()),
				released: Condvar::new(),
				stats: GatewayStats::default(),
				monitor: RwLock::new(None),
			}),
		}
	}

	/// Resets statistics and tracking and opens the gateway.
	pub fn initialize(&self, config: GatewayConfig) {
		if self.is_ready() {
			tracing::debug!("gateway.initialize.already_ready");
			return;
		}
		tracing::info!(
			max_concurrent = config.max_concurrent_callbacks,
			timeout_ms = config.callback_timeout.as_millis() as u64,
			"gateway.initialized"
		);
		*self.inner.config.write() = config;
		self.inner.stats.reset();
		{
			let mut calls = self.inner.calls.lock();
			calls.clear();
			self.inner.epoch.fetch_add(1, Ordering::AcqRel);
			self.inner.active.store(0, Ordering::Release);
		}
		self.inner.shutting_down.store(false, Ordering::Release);
		self.inner.ready.store(true, Ordering::Release);
	}

	/// Closes admission, waits for in-flight calls, and abandons the rest.
	///
	/// Returns true if every call drained within the configured budget.
	pub fn shutdown(&self) -> bool {
		if !self.is_ready() || self.inner.shutting_down.swap(true, Ordering::AcqRel) {
			return true;
		}
		let budget = self.inner.config.read().shutdown_drain_timeout;
		tracing::info!(active = self.active_calls_count(), budget_ms = budget.as_millis() as u64, "gateway.shutdown.begin");
		let drained = self.wait_for_drain(budget);
		if !drained {
			let abandoned = self.force_abandon_all();
			tracing::warn!(abandoned, "gateway.shutdown.drain_timeout");
		}
		self.inner.ready.store(false, Ordering::Release);
		self.inner.shutting_down.store(false, Ordering::Release);
		tracing::info!(report = %self.export_diagnostics_report(), "gateway.shutdown.report");
		drained
	}

	/// Forgets every tracked call and zeroes the active counter.
	///
	/// The abandoned calls keep running; their guards see a stale epoch on
	/// exit and do not touch the counter.
	pub fn force_abandon_all(&self) -> usize {
		let abandoned = {
			let mut calls = self.inner.calls.lock();
			let abandoned = calls.len();
			calls.clear();
			self.inner.epoch.fetch_add(1, Ordering::AcqRel);
			self.inner.active.store(0, Ordering::Release);
			abandoned
		};
		let _lock = self.inner.released_lock.lock();
		self.inner.released.notify_all();
		abandoned
	}

	pub fn is_ready(&self) -> bool {
		self.inner.ready.load(Ordering::Acquire)
	}

	pub fn is_shutting_down(&self) -> bool {
		self.inner.shutting_down.load(Ordering::Acquire)
	}

	pub fn active_calls_count(&self) -> usize {
		self.inner.active.load(Ordering::Acquire)
	}

	pub fn config(&self) -> GatewayConfig {
		self.inner.config.read().clone()
	}

	pub fn update_config(&self, config: GatewayConfig) {
		*self.inner.config.write() = config;
	}

	/// Routes handle accesses of the `safe_*` wrappers into `monitor`.
	pub fn attach_monitor(&self, monitor: ConcurrencyMonitor) {
		*self.inner.monitor.write() = Some(monitor);
	}

	pub fn detach_monitor(&self) {
		*self.inner.monitor.write() = None;
	}

	/// Calls in flight, oldest first.
	pub fn active_calls(&self) -> Vec<ActiveCall> {
		let now = Instant::now();
		let mut calls: Vec<_> = self
			.inner
			.calls
			.lock()
			.iter()
			.map(|(id, info)| ActiveCall {
				id: *id,
				kind: info.kind,
				thread: info.thread,
				age: now.saturating_duration_since(info.started),
			})
			.collect();
		calls.sort_unstable_by_key(|call| call.id);
		calls
	}

	/// Blocks until a slot is free or `timeout` passes. Does not reserve the slot.
	pub fn wait_for_callback_slot(&self, timeout: Duration) -> bool {
		if !self.is_ready() || self.is_shutting_down() {
			return false;
		}
		let deadline = deadline_after(timeout);
		let max = self.inner.config.read().max_concurrent_callbacks;
		let mut lock = self.inner.released_lock.lock();
		while self.active_calls_count() >= max {
			if wait_until_deadline(&self.inner.released, &mut lock, deadline) {
				return self.active_calls_count() < max;
			}
		}
		true
	}

	fn wait_for_drain(&self, timeout: Duration) -> bool {
		let deadline = deadline_after(timeout);
		let mut lock = self.inner.released_lock.lock();
		while self.active_calls_count() > 0 {
			if wait_until_deadline(&self.inner.released, &mut lock, deadline) {
				return self.active_calls_count() == 0;
			}
		}
		true
	}

	fn admit(&self, kind: CallKind) -> Result<CallGuard<'_>, CallbackResult> {
		if !self.is_ready() || self.is_shutting_down() {
			return Err(CallbackResult::SystemNotReady);
		}
		let max = self.inner.config.read().max_concurrent_callbacks;
		let mut calls = self.inner.calls.lock();
		let active = self
			.inner
			.active
			.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
			.map_err(|_| CallbackResult::TooManyConcurrentCalls)?;
		let id = self.inner.next_call.fetch_add(1, Ordering::Relaxed) + 1;
		let epoch = self.inner.epoch.load(Ordering::Acquire);
		calls.insert(
			id,
			CallInfo {
				kind,
				thread: ThreadTag::current(),
				started: Instant::now(),
			},
		);
		drop(calls);
		self.inner.stats.observe_concurrency(active + 1);
		Ok(CallGuard {
			inner: &self.inner,
			id,
			epoch,
		})
	}

	/// Runs `f` under admission control, converting errors and panics to `Failed`.
	pub fn execute<T>(&self, kind: CallKind, f: impl FnOnce() -> Result<T, ForeignError>) -> CallOutcome<T> {
		let (enable_timeout, timeout, log_slow, slow_threshold, enable_stats) = {
			let config = self.inner.config.read();
			(
				config.enable_timeout,
				config.callback_timeout,
				config.log_slow_callbacks,
				config.slow_callback_threshold,
				config.enable_statistics,
			)
		};
		let guard = match self.admit(kind) {
			Ok(guard) => guard,
			Err(result) => {
				if enable_stats {
					self.inner.stats.record(result, Duration::ZERO);
				}
				tracing::debug!(kind = kind.as_str(), result = result.as_str(), "gateway.rejected");
				return CallOutcome::rejected(result);
			}
		};

		let started = Instant::now();
		let returned = panic::catch_unwind(AssertUnwindSafe(f));
		let elapsed = started.elapsed();
		let call = guard.id;
		drop(guard);

		let (mut result, value) = match returned {
			Ok(Ok(value)) => (CallbackResult::Success, Some(value)),
			Ok(Err(error)) => {
				tracing::warn!(call, kind = kind.as_str(), code = error.code, %error, "gateway.callback.failed");
				(CallbackResult::Failed, None)
			}
			Err(payload) => {
				let message = panic_message(payload.as_ref()).unwrap_or_else(|| "non-string panic payload".to_string());
				tracing::error!(call, kind = kind.as_str(), panic = %message, "gateway.callback.panicked");
				(CallbackResult::Failed, None)
			}
		};
		if result == CallbackResult::Success && enable_timeout && elapsed > timeout {
			tracing::warn!(
				call,
				kind = kind.as_str(),
				elapsed_ms = elapsed.as_millis() as u64,
				timeout_ms = timeout.as_millis() as u64,
				"gateway.callback.timeout"
			);
			result = CallbackResult::Timeout;
		}
		if log_slow && elapsed > slow_threshold {
			tracing::warn!(call, kind = kind.as_str(), elapsed_ms = elapsed.as_millis() as u64, "gateway.slow_callback");
		}
		if enable_stats {
			self.inner.stats.record(result, elapsed);
		}
		CallOutcome { result, value, elapsed }
	}

	pub fn safe_create_object<R: ManagedRuntime>(&self, runtime: &R, ty: TypeHandle) -> CallOutcome<ManagedHandle<R::Object>> {
		self.execute(CallKind::CreateObject, || runtime.create_object(ty))
	}

	pub fn safe_create_object_wrapper<R: ManagedRuntime>(
		&self,
		runtime: &R,
		native: NativeRef,
		ty: TypeHandle,
	) -> CallOutcome<ManagedHandle<R::Object>> {
		if native.is_null() {
			tracing::warn!("gateway.create_object_wrapper.null_native");
			return self.execute(CallKind::CreateObjectWrapper, || Err(ForeignError::new(-1, "null native reference")));
		}
		self.record_access(ResourceId::Addr(native.addr()), "native object", AccessPattern::Read);
		self.execute(CallKind::CreateObjectWrapper, || runtime.create_object_wrapper(native, ty))
	}

	/// Non-zero status codes from the runtime count as `Failed`.
	pub fn safe_invoke_event<R: ManagedRuntime>(&self, runtime: &R, event: &EventInvocation) -> CallOutcome<i32> {
		self.execute(CallKind::InvokeEvent, || {
			runtime.invoke_event(event).and_then(|status| match status {
				0 => Ok(status),
				code => Err(ForeignError::new(code, format!("event {} returned status {code}", event.event))),
			})
		})
	}

	pub fn safe_invoke_delegate<R: ManagedRuntime>(
		&self,
		runtime: &R,
		delegate: &ManagedHandle<R::Object>,
		args: &[usize],
	) -> CallOutcome<usize> {
		self.record_access(ResourceId::from(delegate), "managed delegate", AccessPattern::Read);
		self.execute(CallKind::InvokeDelegate, || runtime.invoke_delegate(delegate, args))
	}

	/// A missing method counts as `Failed`.
	pub fn safe_lookup_method<R: ManagedRuntime>(&self, runtime: &R, ty: TypeHandle, name: &str) -> CallOutcome<MethodRef> {
		self.execute(CallKind::LookupMethod, || {
			runtime.lookup_method(ty, name)?.ok_or_else(|| ForeignError::not_found("method", name))
		})
	}

	/// A missing type counts as `Failed`.
	pub fn safe_lookup_type<R: ManagedRuntime>(&self, runtime: &R, assembly: &AssemblyRef, name: &str) -> CallOutcome<TypeHandle> {
		self.record_access(ResourceId::Named(Arc::clone(&assembly.name)), &assembly.name, AccessPattern::Read);
		self.execute(CallKind::LookupType, || {
			runtime.lookup_type(assembly, name)?.ok_or_else(|| ForeignError::not_found("type", name))
		})
	}

	pub fn safe_dispose<R: ManagedRuntime>(&self, runtime: &R, object: &ManagedHandle<R::Object>) -> CallOutcome<()> {
		self.record_access(ResourceId::from(object), "managed object", AccessPattern::Write);
		self.execute(CallKind::Dispose, || runtime.dispose(object))
	}

	pub fn safe_free_handle<R: ManagedRuntime>(&self, runtime: &R, handle: ManagedHandle<R::Object>) -> CallOutcome<()> {
		self.record_access(ResourceId::from(&handle), "managed object", AccessPattern::Write);
		self.execute(CallKind::FreeHandle, || runtime.free_handle(handle))
	}

	fn record_access(&self, resource: ResourceId, name: &str, pattern: AccessPattern) {
		let monitor = self.inner.monitor.read().clone();
		if let Some(monitor) = monitor {
			monitor.record_resource_access(resource, name, pattern);
		}
	}

	pub fn statistics(&self) -> GatewayStatsSnapshot {
		self.inner.stats.snapshot(self.active_calls_count())
	}

	pub fn reset_statistics(&self) {
		self.inner.stats.reset();
	}

	/// Ready, not saturated, and completing calls reliably and on time.
	pub fn is_system_healthy(&self) -> bool {
		if !self.is_ready() || self.is_shutting_down() {
			return false;
		}
		let max = self.inner.config.read().max_concurrent_callbacks;
		let stats = self.statistics();
		if stats.active >= max {
			return false;
		}
		if stats.completed() > 0 && stats.success_rate() < MIN_SUCCESS_RATE {
			return false;
		}
		stats.completed() < TIMEOUT_RATIO_MIN_CALLS || stats.timeout_ratio() <= MAX_TIMEOUT_RATIO
	}
}

impl std::fmt::Debug for CallbackGateway {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CallbackGateway")
			.field("ready", &self.is_ready())
			.field("shutting_down", &self.is_shutting_down())
			.field("active", &self.active_calls_count())
			.finish()
	}
}
