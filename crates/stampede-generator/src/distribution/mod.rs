//! Seeded numeric distributions.
//!
//! Every distribution samples over an inclusive `[min, max]` range of one of
//! the supported numeric kinds and is fully determined by its seed: two
//! distributions built with the same seed and parameters produce the same
//! sequence.
//!
//! - [`UniformDistribution`] - flat over the range
//! - [`NormalDistribution`] - centered, three standard deviations to each bound
//! - [`ZipfDistribution`] - rank-skewed toward `min`
//! - [`UniqueDistribution`] - every value once, in order, then `max` forever
//!
//! Use [`new_distribution`] to pick one from a rule's distribution descriptor.

mod normal;
mod unique;
mod uniform;
mod zipf;

pub use normal::NormalDistribution;
pub use unique::UniqueDistribution;
pub use uniform::UniformDistribution;
pub use zipf::ZipfDistribution;

use crate::error::GenerateError;
use stampede_core::{DistributionKind, DistributionSpec, NumericRange};
use std::fmt::Debug;

/// A stateful sampler producing one value per call.
pub trait Distribution<T>: Send {
    /// Produce the next value.
    fn next(&mut self) -> T;
}

mod sealed {
    pub trait Sealed {}
}

/// Numeric kinds a distribution can sample over.
///
/// Sampling happens in `f64` (continuous distributions) or `i128` (rank and
/// counter based distributions); conversions back saturate at the bounds of
/// the target type.
pub trait Numeric: Copy + PartialOrd + Debug + Send + Sync + 'static + sealed::Sealed {
    fn to_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;
    fn to_i128(self) -> i128;
    fn from_i128(value: i128) -> Self;
}

macro_rules! impl_numeric_int {
    ($($t:ty),*) => {
        $(
            impl sealed::Sealed for $t {}

            impl Numeric for $t {
                fn to_f64(self) -> f64 {
                    self as f64
                }

                fn from_f64(value: f64) -> Self {
                    value as $t
                }

                fn to_i128(self) -> i128 {
                    i128::from(self)
                }

                fn from_i128(value: i128) -> Self {
                    value.clamp(i128::from(<$t>::MIN), i128::from(<$t>::MAX)) as $t
                }
            }
        )*
    };
}

macro_rules! impl_numeric_float {
    ($($t:ty),*) => {
        $(
            impl sealed::Sealed for $t {}

            impl Numeric for $t {
                fn to_f64(self) -> f64 {
                    f64::from(self)
                }

                fn from_f64(value: f64) -> Self {
                    value as $t
                }

                fn to_i128(self) -> i128 {
                    self as i128
                }

                fn from_i128(value: i128) -> Self {
                    value as $t
                }
            }
        )*
    };
}

impl_numeric_int!(u8, i32, i64, u32, u64);
impl_numeric_float!(f32, f64);

/// Clamp into `[min, max]` without panicking on an inverted range.
pub(crate) fn clamp_f64(value: f64, min: f64, max: f64) -> f64 {
    value.max(min).min(max)
}

/// Clamp a converted sample into `range` in its own type.
///
/// Integers beyond 2^53 do not survive the trip through `f64`, so the
/// bounds are checked again after conversion.
pub(crate) fn clamp_to<T: Numeric>(value: T, range: &NumericRange<T>) -> T {
    let value = if value < range.min { range.min } else { value };
    if value > range.max {
        range.max
    } else {
        value
    }
}

/// Build the distribution a rule asks for.
///
/// Uniqueness overrides the requested kind. Unrecognized kinds fall back to
/// uniform sampling. `round` rounds continuous samples to the nearest
/// integer and is ignored by the rank and counter based kinds.
pub fn new_distribution<T: Numeric>(
    seed: u64,
    range: NumericRange<T>,
    round: bool,
    spec: &DistributionSpec,
    unique: bool,
) -> Result<Box<dyn Distribution<T>>, GenerateError> {
    if unique {
        return Ok(Box::new(UniqueDistribution::new(range)));
    }

    let distribution: Box<dyn Distribution<T>> = match &spec.kind {
        DistributionKind::Uniform => Box::new(UniformDistribution::new(seed, range, round)),
        DistributionKind::Normal => Box::new(NormalDistribution::new(seed, range, round)),
        DistributionKind::Zipf => Box::new(ZipfDistribution::new(seed, range, spec.skew)?),
        DistributionKind::Other(name) => {
            tracing::debug!("Unrecognized distribution '{name}', using uniform");
            Box::new(UniformDistribution::new(seed, range, round))
        }
    };
    Ok(distribution)
}
