use std::sync::atomic::{AtomicU64, Ordering};

/// `f64` stored as raw bits in an [`AtomicU64`].
///
/// Used for statistics that are updated from many threads without a lock.
/// Updates are compare-and-swap loops; readers see either the old or the new
/// value, never a torn one.
#[derive(Debug, Default)]
pub struct AtomicF64 {
	bits: AtomicU64,
}

impl AtomicF64 {
	pub fn new(value: f64) -> Self {
		Self {
			bits: AtomicU64::new(value.to_bits()),
		}
	}

	pub fn load(&self) -> f64 {
		f64::from_bits(self.bits.load(Ordering::Acquire))
	}

	pub fn store(&self, value: f64) {
		self.bits.store(value.to_bits(), Ordering::Release);
	}

	/// Folds `sample` into an exponentially weighted moving average.
	///
	/// `retain` is the weight kept from the previous average. A zero average is
	/// treated as empty and seeded with the sample.
	pub fn fold_ewma(&self, sample: f64, retain: f64) -> f64 {
		self.update(|current| if current == 0.0 { sample } else { current * retain + sample * (1.0 - retain) })
	}

	/// Raises the stored value to `sample` if larger. Returns the new value.
	pub fn fetch_max(&self, sample: f64) -> f64 {
		self.update(|current| current.max(sample))
	}

	fn update(&self, f: impl Fn(f64) -> f64) -> f64 {
		let mut current = self.bits.load(Ordering::Acquire);
		loop {
			let next = f(f64::from_bits(current)).to_bits();
			match self.bits.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
				Ok(_) => return f64::from_bits(next),
				Err(actual) => current = actual,
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use proptest::prelude::*;

	use super::*;

	#[test]
	fn ewma_seeds_with_first_sample() {
		let avg = AtomicF64::default();
		assert_eq!(avg.fold_ewma(40.0, 0.9), 40.0);
		let next = avg.fold_ewma(140.0, 0.9);
		assert!((next - 50.0).abs() < 1e-9, "got {next}");
	}

	#[test]
	fn max_is_monotonic() {
		let max = AtomicF64::new(3.0);
		assert_eq!(max.fetch_max(1.0), 3.0);
		assert_eq!(max.fetch_max(8.5), 8.5);
		assert_eq!(max.load(), 8.5);
	}

	proptest! {
		#[test]
		fn ewma_stays_within_sample_bounds(samples in proptest::collection::vec(1.0f64..10_000.0, 1..64)) {
			let avg = AtomicF64::default();
			for sample in &samples {
				avg.fold_ewma(*sample, 0.9);
			}
			let lo = samples.iter().copied().fold(f64::INFINITY, f64::min);
			let hi = samples.iter().copied().fold(0.0, f64::max);
			let value = avg.load();
			prop_assert!(value >= lo - 1e-6 && value <= hi + 1e-6);
		}
	}
}
