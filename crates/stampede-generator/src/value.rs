//! Value generators: the runtime side of a compiled rule.
//!
//! A generator is not thread-safe; build one per task from the same rule
//! and seed when several tasks need values.

use crate::distribution::Distribution;
use crate::error::GenerateError;
use stampede_core::TypedValue;

/// Produces one typed value per call.
pub trait ValueGenerator: Send {
    fn next_value(&mut self) -> Result<TypedValue, GenerateError>;
}

/// Returns the same value on every call.
#[derive(Debug, Clone)]
pub struct ConstantGenerator {
    value: TypedValue,
}

impl ConstantGenerator {
    pub fn new(value: impl Into<TypedValue>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl ValueGenerator for ConstantGenerator {
    fn next_value(&mut self) -> Result<TypedValue, GenerateError> {
        Ok(self.value.clone())
    }
}

/// A distribution followed by a transform into a typed value.
pub struct MappedGenerator<D, F> {
    distribution: Box<dyn Distribution<D>>,
    transform: F,
}

impl<D, F> MappedGenerator<D, F>
where
    F: FnMut(D) -> Result<TypedValue, GenerateError> + Send,
{
    pub fn new(distribution: Box<dyn Distribution<D>>, transform: F) -> Self {
        Self {
            distribution,
            transform,
        }
    }
}

impl<D, F> ValueGenerator for MappedGenerator<D, F>
where
    F: FnMut(D) -> Result<TypedValue, GenerateError> + Send,
{
    fn next_value(&mut self) -> Result<TypedValue, GenerateError> {
        let sample = self.distribution.next();
        (self.transform)(sample)
    }
}

/// Any closure producing values.
pub struct FnGenerator<F>(F);

impl<F> FnGenerator<F>
where
    F: FnMut() -> Result<TypedValue, GenerateError> + Send,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> ValueGenerator for FnGenerator<F>
where
    F: FnMut() -> Result<TypedValue, GenerateError> + Send,
{
    fn next_value(&mut self) -> Result<TypedValue, GenerateError> {
        (self.0)()
    }
}

/// Emits nulls for the first `quota` calls, then delegates.
///
/// The quota is a share of the expected output size, so over exactly that
/// many calls the output holds the requested percentage of nulls, all at
/// the front.
pub struct NullQuota {
    inner: Box<dyn ValueGenerator>,
    remaining: u64,
}

impl NullQuota {
    pub fn new(inner: Box<dyn ValueGenerator>, output_size: u64, null_percentage: u32) -> Self {
        let quota = u128::from(output_size) * u128::from(null_percentage.min(100)) / 100;
        Self {
            inner,
            remaining: u64::try_from(quota).unwrap_or(u64::MAX),
        }
    }

    /// Wrap `inner` when the percentage is non-zero.
    pub fn wrap(
        inner: Box<dyn ValueGenerator>,
        output_size: u64,
        null_percentage: u32,
    ) -> Box<dyn ValueGenerator> {
        if null_percentage == 0 {
            inner
        } else {
            Box::new(Self::new(inner, output_size, null_percentage))
        }
    }
}

impl ValueGenerator for NullQuota {
    fn next_value(&mut self) -> Result<TypedValue, GenerateError> {
        if self.remaining > 0 {
            self.remaining -= 1;
            return Ok(TypedValue::Null);
        }
        self.inner.next_value()
    }
}
