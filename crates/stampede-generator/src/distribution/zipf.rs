use super::{Distribution, Numeric};
use crate::error::GenerateError;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::Zipf;
use stampede_core::NumericRange;

/// Zipf distribution over the ranks of `[min, max]`.
///
/// Rank 0 maps to `min`; larger skews concentrate more mass on low ranks.
/// Values are always integral offsets from `min`.
#[derive(Debug, Clone)]
pub struct ZipfDistribution<T> {
    rng: ChaCha8Rng,
    zipf: Option<Zipf<f64>>,
    min: i128,
    item_count: u64,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Numeric> ZipfDistribution<T> {
    pub fn new(seed: u64, range: NumericRange<T>, skew: f64) -> Result<Self, GenerateError> {
        if !skew.is_finite() || skew < 0.0 {
            return Err(GenerateError::InvalidSkew(skew));
        }

        let min = range.min.to_i128();
        let span = range.max.to_i128() - min;
        let item_count = u64::try_from(span.saturating_add(1).max(1)).unwrap_or(u64::MAX);

        // A single item needs no sampler
        let zipf = if item_count > 1 {
            Some(Zipf::new(item_count, skew).map_err(|_| GenerateError::InvalidSkew(skew))?)
        } else {
            None
        };

        Ok(Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            zipf,
            min,
            item_count,
            _marker: std::marker::PhantomData,
        })
    }
}

impl<T: Numeric> Distribution<T> for ZipfDistribution<T> {
    fn next(&mut self) -> T {
        let Some(zipf) = &self.zipf else {
            return T::from_i128(self.min);
        };
        // Samples are ranks in [1, item_count]
        let sample: f64 = self.rng.sample(zipf);
        let rank = (sample as u64).saturating_sub(1) % self.item_count;
        T::from_i128(self.min + i128::from(rank))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zipf_stays_in_range() {
        let mut dist = ZipfDistribution::new(1, NumericRange::new(100u64, 199), 1.1).unwrap();
        for _ in 0..10_000 {
            let v = dist.next();
            assert!((100..=199).contains(&v), "{v} out of range");
        }
    }

    #[test]
    fn test_zipf_monotonic_decay() {
        let mut dist = ZipfDistribution::new(42, NumericRange::new(0i64, 9), 1.5).unwrap();
        let mut counts = [0u32; 10];
        for _ in 0..10_000 {
            counts[dist.next() as usize] += 1;
        }
        for i in 0..9 {
            assert!(
                counts[i] >= counts[i + 1],
                "frequency of {i} ({}) below frequency of {} ({})",
                counts[i],
                i + 1,
                counts[i + 1]
            );
        }
    }

    #[test]
    fn test_zipf_rejects_bad_skew() {
        let range = NumericRange::new(0i32, 10);
        assert!(ZipfDistribution::new(1, range, f64::NAN).is_err());
        assert!(ZipfDistribution::new(1, range, -0.5).is_err());
        assert!(ZipfDistribution::new(1, range, 0.0).is_ok());
    }
}
