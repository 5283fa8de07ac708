//! Declarative generation rules.
//!
//! A [`GenerationRule`] describes how values for one parameter or column
//! are produced: the primitive kind with its range, the distribution to
//! sample from, uniqueness, the share of nulls and an optional constant.
//!
//! Rules are usually embedded in a step context file:
//!
//! ```yaml
//! generation_rule:
//!   type: int64
//!   range: { min: 1, max: 100000 }
//!   distribution: { kind: zipf, skew: 1.2 }
//!   null_percentage: 5
//! ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inclusive `[min, max]` range over a numeric type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericRange<T> {
    /// Lower bound (inclusive)
    pub min: T,
    /// Upper bound (inclusive)
    pub max: T,
}

impl<T> NumericRange<T> {
    /// Create a new range.
    pub fn new(min: T, max: T) -> Self {
        Self { min, max }
    }
}

/// Distribution kind requested by a rule.
///
/// Unrecognized names are kept as [`DistributionKind::Other`] so that a
/// rule file written for a newer version still loads; the generator falls
/// back to uniform sampling for them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DistributionKind {
    #[default]
    Uniform,
    Normal,
    Zipf,
    Other(String),
}

impl From<String> for DistributionKind {
    fn from(value: String) -> Self {
        match value.to_lowercase().as_str() {
            "uniform" => DistributionKind::Uniform,
            "normal" => DistributionKind::Normal,
            "zipf" => DistributionKind::Zipf,
            _ => DistributionKind::Other(value),
        }
    }
}

impl From<DistributionKind> for String {
    fn from(value: DistributionKind) -> Self {
        value.to_string()
    }
}

impl std::fmt::Display for DistributionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistributionKind::Uniform => write!(f, "uniform"),
            DistributionKind::Normal => write!(f, "normal"),
            DistributionKind::Zipf => write!(f, "zipf"),
            DistributionKind::Other(name) => write!(f, "{name}"),
        }
    }
}

/// Distribution descriptor: kind plus the skew parameter used by Zipf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionSpec {
    /// Distribution kind
    #[serde(default)]
    pub kind: DistributionKind,

    /// Zipf exponent; higher values bias harder toward the low end of the range
    #[serde(default = "default_skew")]
    pub skew: f64,
}

fn default_skew() -> f64 {
    1.0
}

impl Default for DistributionSpec {
    fn default() -> Self {
        Self {
            kind: DistributionKind::Uniform,
            skew: default_skew(),
        }
    }
}

impl DistributionSpec {
    /// Create a descriptor for the given kind with the default skew.
    pub fn new(kind: DistributionKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// Create a Zipf descriptor with the given skew.
    pub fn zipf(skew: f64) -> Self {
        Self {
            kind: DistributionKind::Zipf,
            skew,
        }
    }
}

/// Protobuf-style timestamp (seconds plus nanoseconds since the epoch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformTimestamp {
    pub seconds: i64,
    #[serde(default)]
    pub nanos: i32,
}

/// Range bounds of a datetime rule, in one of the accepted forms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum DateTimeRange {
    /// Calendar datetimes
    Default {
        min: DateTime<Utc>,
        max: DateTime<Utc>,
    },

    /// RFC 3339 / ISO 8601 strings, parsed when the generator is compiled
    String { min: String, max: String },

    /// Seconds since the Unix epoch
    Timestamp { min: i64, max: i64 },

    /// Seconds plus nanoseconds since the Unix epoch
    Platform {
        min: PlatformTimestamp,
        max: PlatformTimestamp,
    },
}

/// Range bounds of a decimal rule, in one of the accepted forms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum DecimalRange {
    /// Decimal values
    Default { min: Decimal, max: Decimal },

    /// Decimal strings, parsed when the generator is compiled
    String { min: String, max: String },

    /// Single precision floats
    Float { min: f32, max: f32 },

    /// Double precision floats
    Double { min: f64, max: f64 },
}

/// Inclusive range of Unicode code points for string generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharRange {
    pub min: u32,
    pub max: u32,
}

impl CharRange {
    /// Create a range from two characters.
    pub fn new(min: char, max: char) -> Self {
        Self {
            min: min as u32,
            max: max as u32,
        }
    }
}

/// The primitive kind of a rule, with its kind-specific range and constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleKind {
    Int32 {
        range: NumericRange<i32>,
        constant: Option<i32>,
    },
    Int64 {
        range: NumericRange<i64>,
        constant: Option<i64>,
    },
    Uint32 {
        range: NumericRange<u32>,
        constant: Option<u32>,
    },
    Uint64 {
        range: NumericRange<u64>,
        constant: Option<u64>,
    },
    Float32 {
        range: NumericRange<f32>,
        constant: Option<f32>,
    },
    Float64 {
        range: NumericRange<f64>,
        constant: Option<f64>,
    },
    Bool {
        constant: Option<bool>,
    },
    String {
        /// Word length range in code points
        len_range: NumericRange<u64>,
        /// Code point ranges to draw from (ASCII letters when empty)
        #[serde(default)]
        alphabet: Vec<CharRange>,
        constant: Option<String>,
    },
    #[serde(rename = "datetime")]
    DateTime {
        range: DateTimeRange,
        constant: Option<DateTime<Utc>>,
    },
    Uuid {
        constant: Option<Uuid>,
    },
    Decimal {
        range: DecimalRange,
        constant: Option<Decimal>,
    },
    /// A rule type this version does not know; compiling it fails.
    #[serde(other)]
    Unknown,
}

impl RuleKind {
    /// Name of the rule kind, used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            RuleKind::Int32 { .. } => "int32",
            RuleKind::Int64 { .. } => "int64",
            RuleKind::Uint32 { .. } => "uint32",
            RuleKind::Uint64 { .. } => "uint64",
            RuleKind::Float32 { .. } => "float32",
            RuleKind::Float64 { .. } => "float64",
            RuleKind::Bool { .. } => "bool",
            RuleKind::String { .. } => "string",
            RuleKind::DateTime { .. } => "datetime",
            RuleKind::Uuid { .. } => "uuid",
            RuleKind::Decimal { .. } => "decimal",
            RuleKind::Unknown => "unknown",
        }
    }
}

/// A complete generation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRule {
    /// Primitive kind, range and constant
    #[serde(flatten)]
    pub kind: RuleKind,

    /// Distribution to sample from
    #[serde(default)]
    pub distribution: DistributionSpec,

    /// Emit every value of the range exactly once (overrides the distribution)
    #[serde(default)]
    pub unique: bool,

    /// Share of nulls in the output, 0-100
    #[serde(default)]
    pub null_percentage: u32,
}

impl GenerationRule {
    /// Create a uniform, non-unique, never-null rule of the given kind.
    pub fn new(kind: RuleKind) -> Self {
        Self {
            kind,
            distribution: DistributionSpec::default(),
            unique: false,
            null_percentage: 0,
        }
    }

    /// Set the distribution.
    pub fn with_distribution(mut self, distribution: DistributionSpec) -> Self {
        self.distribution = distribution;
        self
    }

    /// Set the uniqueness flag.
    pub fn with_unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Set the null percentage.
    pub fn with_null_percentage(mut self, null_percentage: u32) -> Self {
        self.null_percentage = null_percentage;
        self
    }

    /// Parse a rule from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_int_rule() {
        let rule = GenerationRule::from_yaml(
            r#"
type: int64
range: { min: 1, max: 100 }
distribution: { kind: normal }
unique: false
null_percentage: 10
"#,
        )
        .unwrap();

        assert_eq!(
            rule.kind,
            RuleKind::Int64 {
                range: NumericRange::new(1, 100),
                constant: None
            }
        );
        assert_eq!(rule.distribution.kind, DistributionKind::Normal);
        assert_eq!(rule.distribution.skew, 1.0);
        assert_eq!(rule.null_percentage, 10);
    }

    #[test]
    fn test_parse_defaults() {
        let rule = GenerationRule::from_yaml("type: uuid").unwrap();
        assert_eq!(rule.kind, RuleKind::Uuid { constant: None });
        assert_eq!(rule.distribution, DistributionSpec::default());
        assert!(!rule.unique);
        assert_eq!(rule.null_percentage, 0);
    }

    #[test]
    fn test_parse_unknown_rule_type() {
        let rule = GenerationRule::from_yaml("type: geometry").unwrap();
        assert_eq!(rule.kind, RuleKind::Unknown);
        assert_eq!(rule.kind.name(), "unknown");
    }

    #[test]
    fn test_parse_unrecognized_distribution() {
        let rule = GenerationRule::from_yaml(
            r#"
type: int32
range: { min: 0, max: 5 }
distribution: { kind: pareto, skew: 2.0 }
"#,
        )
        .unwrap();
        assert_eq!(
            rule.distribution.kind,
            DistributionKind::Other("pareto".to_string())
        );
    }

    #[test]
    fn test_parse_datetime_forms() {
        let rule = GenerationRule::from_yaml(
            r#"
type: datetime
range:
  format: string
  min: "2024-01-01T00:00:00Z"
  max: "2024-12-31T23:59:59Z"
"#,
        )
        .unwrap();
        assert!(matches!(
            rule.kind,
            RuleKind::DateTime {
                range: DateTimeRange::String { .. },
                ..
            }
        ));

        let rule = GenerationRule::from_yaml(
            r#"
type: datetime
range: { format: timestamp, min: 0, max: 86400 }
"#,
        )
        .unwrap();
        assert_eq!(
            rule.kind,
            RuleKind::DateTime {
                range: DateTimeRange::Timestamp { min: 0, max: 86400 },
                constant: None
            }
        );
    }

    #[test]
    fn test_parse_string_rule_with_alphabet() {
        let rule = GenerationRule::from_yaml(
            r#"
type: string
len_range: { min: 3, max: 8 }
alphabet:
  - { min: 48, max: 57 }
"#,
        )
        .unwrap();

        match rule.kind {
            RuleKind::String {
                len_range,
                alphabet,
                constant,
            } => {
                assert_eq!(len_range, NumericRange::new(3, 8));
                assert_eq!(alphabet, vec![CharRange::new('0', '9')]);
                assert!(constant.is_none());
            }
            other => panic!("Expected string rule, got {other:?}"),
        }
    }

    #[test]
    fn test_distribution_kind_round_trip_name() {
        assert_eq!(String::from(DistributionKind::Zipf), "zipf");
        assert_eq!(DistributionKind::from("ZIPF".to_string()), DistributionKind::Zipf);
    }
}
