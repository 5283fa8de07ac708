//! Error types for value generation.

use thiserror::Error;

/// Errors raised while compiling a rule or generating a value.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// The rule carries no recognized kind
    #[error("Unknown rule type: {0}")]
    UnknownRuleType(String),

    /// A string-form range bound is malformed
    #[error("Failed to parse {what} '{input}': {reason}")]
    Parse {
        what: &'static str,
        input: String,
        reason: String,
    },

    /// Zipf exponent is negative or not finite
    #[error("Invalid zipf skew {0}: must be finite and non-negative")]
    InvalidSkew(f64),

    /// Character range is inverted or not made of valid scalar values
    #[error("Invalid alphabet range [{min}, {max}]")]
    InvalidAlphabet { min: u32, max: u32 },

    /// A sampled value cannot be represented as a decimal
    #[error("Value {0} cannot be represented as a decimal")]
    DecimalOutOfRange(f64),

    /// A sampled offset falls outside the representable datetime range
    #[error("Timestamp {0} is out of range")]
    TimestampOutOfRange(i64),

    /// The unit kind has no data to generate
    #[error("Unit kind '{0}' cannot be built into transactions")]
    UnsupportedUnit(&'static str),

    /// A compile error attributed to the entity that owns the rule
    #[error("Failed to create generator for entity '{entity}': {source}")]
    Entity {
        entity: String,
        #[source]
        source: Box<GenerateError>,
    },
}

impl GenerateError {
    pub(crate) fn for_entity(entity: impl Into<String>, source: GenerateError) -> Self {
        GenerateError::Entity {
            entity: entity.into(),
            source: Box::new(source),
        }
    }
}
