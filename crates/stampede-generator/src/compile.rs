//! Rule compiler: turns a [`GenerationRule`] into a [`ValueGenerator`].

use crate::distribution::{new_distribution, Numeric};
use crate::error::GenerateError;
use crate::randstr::{CharTape, StringGenerator};
use crate::uuid_v4::UuidGenerator;
use crate::value::{ConstantGenerator, FnGenerator, MappedGenerator, NullQuota, ValueGenerator};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use stampede_core::{
    ColumnDescriptor, DateTimeRange, DecimalRange, GenerationRule, NumericRange,
    QueryParamDescriptor, RuleKind, TypedValue,
};
use std::str::FromStr;

/// Something that owns a generation rule and has a name to report errors under.
pub trait Generatable {
    fn entity_name(&self) -> &str;
    fn generation_rule(&self) -> &GenerationRule;
}

impl Generatable for QueryParamDescriptor {
    fn entity_name(&self) -> &str {
        &self.name
    }

    fn generation_rule(&self) -> &GenerationRule {
        &self.generation_rule
    }
}

impl Generatable for ColumnDescriptor {
    fn entity_name(&self) -> &str {
        &self.name
    }

    fn generation_rule(&self) -> &GenerationRule {
        &self.generation_rule
    }
}

/// Compile the rule of a named entity, attributing errors to it.
pub fn compile_named(
    seed: u64,
    output_size: u64,
    entity: &impl Generatable,
) -> Result<Box<dyn ValueGenerator>, GenerateError> {
    compile(seed, output_size, entity.generation_rule())
        .map_err(|e| GenerateError::for_entity(entity.entity_name(), e))
}

/// Compile a rule into a generator.
///
/// `output_size` is the number of values the caller intends to draw; it
/// sizes the null quota. Constants short-circuit the distribution and are
/// never replaced by nulls.
pub fn compile(
    seed: u64,
    output_size: u64,
    rule: &GenerationRule,
) -> Result<Box<dyn ValueGenerator>, GenerateError> {
    if let Some(constant) = constant_of(&rule.kind) {
        return Ok(Box::new(ConstantGenerator::new(constant)));
    }

    let generator: Box<dyn ValueGenerator> = match &rule.kind {
        RuleKind::Int32 { range, .. } => numeric(seed, rule, *range, true, TypedValue::Int32)?,
        RuleKind::Int64 { range, .. } => numeric(seed, rule, *range, true, TypedValue::Int64)?,
        RuleKind::Uint32 { range, .. } => numeric(seed, rule, *range, true, TypedValue::Uint32)?,
        RuleKind::Uint64 { range, .. } => numeric(seed, rule, *range, true, TypedValue::Uint64)?,
        RuleKind::Float32 { range, .. } => {
            numeric(seed, rule, *range, false, TypedValue::Float32)?
        }
        RuleKind::Float64 { range, .. } => {
            numeric(seed, rule, *range, false, TypedValue::Float64)?
        }
        RuleKind::Bool { .. } => numeric(seed, rule, NumericRange::new(0u8, 1), true, |v| {
            TypedValue::Bool(v != 0)
        })?,
        RuleKind::String {
            len_range,
            alphabet,
            ..
        } => {
            let lengths = new_distribution(
                seed,
                *len_range,
                false,
                &rule.distribution,
                rule.unique,
            )?;
            let mut words = StringGenerator::new(lengths, CharTape::new(seed, alphabet)?);
            Box::new(FnGenerator::new(move || {
                Ok(TypedValue::String(words.next_word().to_string()))
            }))
        }
        RuleKind::DateTime { range, .. } => datetime(seed, rule, range)?,
        RuleKind::Uuid { .. } => {
            let mut uuids = UuidGenerator::new(seed);
            Box::new(FnGenerator::new(move || Ok(TypedValue::Uuid(uuids.next_uuid()))))
        }
        RuleKind::Decimal { range, .. } => decimal(seed, rule, range)?,
        RuleKind::Unknown => {
            return Err(GenerateError::UnknownRuleType(rule.kind.name().to_string()))
        }
    };

    tracing::debug!(
        kind = rule.kind.name(),
        distribution = %rule.distribution.kind,
        unique = rule.unique,
        null_percentage = rule.null_percentage,
        "Compiled generation rule"
    );

    Ok(NullQuota::wrap(generator, output_size, rule.null_percentage))
}

fn constant_of(kind: &RuleKind) -> Option<TypedValue> {
    match kind {
        RuleKind::Int32 { constant, .. } => constant.map(TypedValue::Int32),
        RuleKind::Int64 { constant, .. } => constant.map(TypedValue::Int64),
        RuleKind::Uint32 { constant, .. } => constant.map(TypedValue::Uint32),
        RuleKind::Uint64 { constant, .. } => constant.map(TypedValue::Uint64),
        RuleKind::Float32 { constant, .. } => constant.map(TypedValue::Float32),
        RuleKind::Float64 { constant, .. } => constant.map(TypedValue::Float64),
        RuleKind::Bool { constant } => constant.map(TypedValue::Bool),
        RuleKind::String { constant, .. } => constant.clone().map(TypedValue::String),
        RuleKind::DateTime { constant, .. } => constant.map(TypedValue::DateTime),
        RuleKind::Uuid { constant } => constant.map(TypedValue::Uuid),
        RuleKind::Decimal { constant, .. } => constant.map(TypedValue::Decimal),
        RuleKind::Unknown => None,
    }
}

fn numeric<T, F>(
    seed: u64,
    rule: &GenerationRule,
    range: NumericRange<T>,
    round: bool,
    to_value: F,
) -> Result<Box<dyn ValueGenerator>, GenerateError>
where
    T: Numeric,
    F: Fn(T) -> TypedValue + Send + 'static,
{
    let distribution = new_distribution(seed, range, round, &rule.distribution, rule.unique)?;
    Ok(Box::new(MappedGenerator::new(distribution, move |v| {
        Ok(to_value(v))
    })))
}

/// Datetimes are sampled as whole-second offsets from the start of the range.
fn datetime(
    seed: u64,
    rule: &GenerationRule,
    range: &DateTimeRange,
) -> Result<Box<dyn ValueGenerator>, GenerateError> {
    let (start, end) = resolve_datetime_range(range)?;
    let span = end.timestamp().saturating_sub(start.timestamp());
    let distribution = new_distribution(
        seed,
        NumericRange::new(0i64, span),
        true,
        &rule.distribution,
        rule.unique,
    )?;

    let start_secs = start.timestamp();
    let start_nanos = start.timestamp_subsec_nanos();
    Ok(Box::new(MappedGenerator::new(distribution, move |offset: i64| {
        let secs = start_secs.saturating_add(offset);
        DateTime::from_timestamp(secs, start_nanos)
            .map(TypedValue::DateTime)
            .ok_or(GenerateError::TimestampOutOfRange(secs))
    })))
}

fn resolve_datetime_range(
    range: &DateTimeRange,
) -> Result<(DateTime<Utc>, DateTime<Utc>), GenerateError> {
    match range {
        DateTimeRange::Default { min, max } => Ok((*min, *max)),
        DateTimeRange::String { min, max } => Ok((parse_datetime(min)?, parse_datetime(max)?)),
        DateTimeRange::Timestamp { min, max } => Ok((from_epoch(*min, 0)?, from_epoch(*max, 0)?)),
        DateTimeRange::Platform { min, max } => Ok((
            from_epoch(min.seconds, platform_nanos(min.nanos)?)?,
            from_epoch(max.seconds, platform_nanos(max.nanos)?)?,
        )),
    }
}

fn parse_datetime(input: &str) -> Result<DateTime<Utc>, GenerateError> {
    DateTime::parse_from_rfc3339(input)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| GenerateError::Parse {
            what: "datetime",
            input: input.to_string(),
            reason: e.to_string(),
        })
}

fn platform_nanos(nanos: i32) -> Result<u32, GenerateError> {
    u32::try_from(nanos).map_err(|_| GenerateError::Parse {
        what: "timestamp nanos",
        input: nanos.to_string(),
        reason: "must not be negative".to_string(),
    })
}

fn from_epoch(secs: i64, nanos: u32) -> Result<DateTime<Utc>, GenerateError> {
    DateTime::from_timestamp(secs, nanos).ok_or(GenerateError::TimestampOutOfRange(secs))
}

/// Decimals are sampled as `f64` and rebuilt, so digits beyond double
/// precision are not reproduced.
fn decimal(
    seed: u64,
    rule: &GenerationRule,
    range: &DecimalRange,
) -> Result<Box<dyn ValueGenerator>, GenerateError> {
    let (min, max) = resolve_decimal_range(range)?;
    let distribution = new_distribution(
        seed,
        NumericRange::new(min, max),
        false,
        &rule.distribution,
        rule.unique,
    )?;

    Ok(Box::new(MappedGenerator::new(distribution, |v: f64| {
        Decimal::from_f64(v)
            .map(TypedValue::Decimal)
            .ok_or(GenerateError::DecimalOutOfRange(v))
    })))
}

fn resolve_decimal_range(range: &DecimalRange) -> Result<(f64, f64), GenerateError> {
    match range {
        DecimalRange::Default { min, max } => Ok((decimal_to_f64(min)?, decimal_to_f64(max)?)),
        DecimalRange::String { min, max } => Ok((
            decimal_to_f64(&parse_decimal(min)?)?,
            decimal_to_f64(&parse_decimal(max)?)?,
        )),
        DecimalRange::Float { min, max } => Ok((f64::from(*min), f64::from(*max))),
        DecimalRange::Double { min, max } => Ok((*min, *max)),
    }
}

fn parse_decimal(input: &str) -> Result<Decimal, GenerateError> {
    Decimal::from_str(input.trim()).map_err(|e| GenerateError::Parse {
        what: "decimal",
        input: input.to_string(),
        reason: e.to_string(),
    })
}

fn decimal_to_f64(value: &Decimal) -> Result<f64, GenerateError> {
    value.to_f64().ok_or_else(|| GenerateError::Parse {
        what: "decimal",
        input: value.to_string(),
        reason: "not representable as a double".to_string(),
    })
}
