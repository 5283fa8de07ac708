use super::{clamp_f64, clamp_to, Distribution, Numeric};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use stampede_core::NumericRange;

/// Normal distribution centered on the middle of `[min, max]`.
///
/// The standard deviation is a sixth of the range width, so about 99.7% of
/// the samples land in range before clamping.
#[derive(Debug, Clone)]
pub struct NormalDistribution<T> {
    rng: ChaCha8Rng,
    range: NumericRange<T>,
    min: f64,
    max: f64,
    mean: f64,
    stddev: f64,
    round: bool,
}

impl<T: Numeric> NormalDistribution<T> {
    pub fn new(seed: u64, range: NumericRange<T>, round: bool) -> Self {
        let min = range.min.to_f64();
        let max = range.max.to_f64();
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            range,
            min,
            max,
            mean: min / 2.0 + max / 2.0,
            stddev: (max - min) / 6.0,
            round,
        }
    }
}

impl<T: Numeric> Distribution<T> for NormalDistribution<T> {
    fn next(&mut self) -> T {
        if self.range.min == self.range.max {
            return self.range.min;
        }
        let z: f64 = self.rng.sample(StandardNormal);
        let mut value = clamp_f64(self.mean + z * self.stddev, self.min, self.max);
        if self.round {
            value = value.round();
        }
        clamp_to(T::from_f64(value), &self.range)
    }
}
