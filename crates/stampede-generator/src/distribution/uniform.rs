use super::{clamp_f64, clamp_to, Distribution, Numeric};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use stampede_core::NumericRange;

/// Flat distribution over `[min, max]`.
#[derive(Debug, Clone)]
pub struct UniformDistribution<T> {
    rng: ChaCha8Rng,
    range: NumericRange<T>,
    min: f64,
    max: f64,
    round: bool,
}

impl<T: Numeric> UniformDistribution<T> {
    pub fn new(seed: u64, range: NumericRange<T>, round: bool) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            range,
            min: range.min.to_f64(),
            max: range.max.to_f64(),
            round,
        }
    }
}

impl<T: Numeric> Distribution<T> for UniformDistribution<T> {
    fn next(&mut self) -> T {
        if self.range.min == self.range.max {
            return self.range.min;
        }
        let sample = self.min + self.rng.gen::<f64>() * (self.max - self.min);
        let mut value = clamp_f64(sample, self.min, self.max);
        if self.round {
            value = value.round();
        }
        clamp_to(T::from_f64(value), &self.range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_stays_in_range() {
        let mut dist = UniformDistribution::new(42, NumericRange::new(-10i32, 10), true);
        for _ in 0..10_000 {
            let v = dist.next();
            assert!((-10..=10).contains(&v), "{v} out of range");
        }

        let mut dist = UniformDistribution::new(42, NumericRange::new(0.5f64, 0.75), false);
        for _ in 0..10_000 {
            let v = dist.next();
            assert!((0.5..=0.75).contains(&v), "{v} out of range");
        }
    }

    #[test]
    fn test_uniform_reaches_both_ends() {
        let mut dist = UniformDistribution::new(7, NumericRange::new(0u32, 3), true);
        let mut seen = [false; 4];
        for _ in 0..10_000 {
            seen[dist.next() as usize] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_uniform_inverted_range_clamps() {
        let mut dist = UniformDistribution::new(3, NumericRange::new(10i64, 5), true);
        for _ in 0..100 {
            assert_eq!(dist.next(), 5);
        }
    }
}
