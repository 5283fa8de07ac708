use super::{Distribution, Numeric};
use stampede_core::NumericRange;
use std::sync::atomic::{AtomicU64, Ordering};

/// Sequential distribution emitting `min, min + 1, ..., max` once each,
/// then `max` on every further call.
///
/// Safe to share between threads: concurrent callers collectively receive
/// each value of the range exactly once (in no particular order) before the
/// counter saturates.
#[derive(Debug)]
pub struct UniqueDistribution<T> {
    min: i128,
    max: T,
    /// Number of steps until saturation; `None` when the range is inverted
    span: Option<u64>,
    step: AtomicU64,
}

impl<T: Numeric> UniqueDistribution<T> {
    pub fn new(range: NumericRange<T>) -> Self {
        let min = range.min.to_i128();
        let span = u64::try_from(range.max.to_i128() - min).ok();
        Self {
            min,
            max: range.max,
            span,
            step: AtomicU64::new(0),
        }
    }

    /// Produce the next value through a shared reference.
    pub fn next(&self) -> T {
        let Some(span) = self.span else {
            return self.max;
        };

        let mut current = self.step.load(Ordering::Acquire);
        loop {
            if current >= span {
                return self.max;
            }
            match self.step.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return T::from_i128(self.min + i128::from(current)),
                Err(observed) => current = observed,
            }
        }
    }
}

impl<T: Numeric> Distribution<T> for UniqueDistribution<T> {
    fn next(&mut self) -> T {
        UniqueDistribution::next(self)
    }
}
