//! Value representation exchanged with drivers.
//!
//! `TypedValue` mirrors the primitive kinds a [`GenerationRule`](crate::GenerationRule)
//! can produce, plus a null marker and the composite list/struct kinds
//! drivers use to pass structured parameters.

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One typed value, the unit exchanged across the driver boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TypedValue {
    /// Null marker
    Null,

    /// Boolean value
    Bool(bool),

    /// 32-bit signed integer
    Int32(i32),

    /// 64-bit signed integer
    Int64(i64),

    /// 32-bit unsigned integer
    Uint32(u32),

    /// 64-bit unsigned integer
    Uint64(u64),

    /// 32-bit floating point
    Float32(f32),

    /// 64-bit floating point
    Float64(f64),

    /// UTF-8 string
    String(String),

    /// Arbitrary precision decimal
    Decimal(Decimal),

    /// UUID value
    Uuid(Uuid),

    /// Date/time in UTC
    DateTime(DateTime<Utc>),

    /// Ordered list of values
    List(Vec<TypedValue>),

    /// Ordered named fields
    Struct(Vec<(String, TypedValue)>),
}

impl TypedValue {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Name of the value kind, used in error messages and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int32(_) => "int32",
            Self::Int64(_) => "int64",
            Self::Uint32(_) => "uint32",
            Self::Uint64(_) => "uint64",
            Self::Float32(_) => "float32",
            Self::Float64(_) => "float64",
            Self::String(_) => "string",
            Self::Decimal(_) => "decimal",
            Self::Uuid(_) => "uuid",
            Self::DateTime(_) => "datetime",
            Self::List(_) => "list",
            Self::Struct(_) => "struct",
        }
    }

    /// Try to get this value as an i64 (any signed or unsigned integer that fits).
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int32(i) => Some(i64::from(*i)),
            Self::Int64(i) => Some(*i),
            Self::Uint32(u) => Some(i64::from(*u)),
            Self::Uint64(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    /// Try to get this value as an f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float32(f) => Some(f64::from(*f)),
            Self::Float64(f) => Some(*f),
            _ => None,
        }
    }

    /// Try to get this value as a string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get this value as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get this value as a UUID.
    pub fn as_uuid(&self) -> Option<&Uuid> {
        match self {
            Self::Uuid(u) => Some(u),
            _ => None,
        }
    }

    /// Try to get this value as a DateTime.
    pub fn as_datetime(&self) -> Option<&DateTime<Utc>> {
        match self {
            Self::DateTime(dt) => Some(dt),
            _ => None,
        }
    }

    /// Try to get this value as a decimal.
    pub fn as_decimal(&self) -> Option<&Decimal> {
        match self {
            Self::Decimal(d) => Some(d),
            _ => None,
        }
    }

    /// Convert to a plain JSON value.
    ///
    /// Decimals become strings to keep their digits, datetimes become
    /// RFC 3339 strings and structs become objects.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;

        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int32(i) => Value::from(*i),
            Self::Int64(i) => Value::from(*i),
            Self::Uint32(u) => Value::from(*u),
            Self::Uint64(u) => Value::from(*u),
            Self::Float32(f) => Value::from(f64::from(*f)),
            Self::Float64(f) => Value::from(*f),
            Self::String(s) => Value::String(s.clone()),
            Self::Decimal(d) => Value::String(d.to_string()),
            Self::Uuid(u) => Value::String(u.to_string()),
            Self::DateTime(dt) => {
                Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Self::List(values) => Value::Array(values.iter().map(TypedValue::to_json).collect()),
            Self::Struct(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for TypedValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for TypedValue {
    fn from(value: i32) -> Self {
        Self::Int32(value)
    }
}

impl From<i64> for TypedValue {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<u32> for TypedValue {
    fn from(value: u32) -> Self {
        Self::Uint32(value)
    }
}

impl From<u64> for TypedValue {
    fn from(value: u64) -> Self {
        Self::Uint64(value)
    }
}

impl From<f32> for TypedValue {
    fn from(value: f32) -> Self {
        Self::Float32(value)
    }
}

impl From<f64> for TypedValue {
    fn from(value: f64) -> Self {
        Self::Float64(value)
    }
}

impl From<String> for TypedValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for TypedValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<Decimal> for TypedValue {
    fn from(value: Decimal) -> Self {
        Self::Decimal(value)
    }
}

impl From<Uuid> for TypedValue {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl From<DateTime<Utc>> for TypedValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::DateTime(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_accessors() {
        assert_eq!(TypedValue::Int32(42).as_i64(), Some(42));
        assert_eq!(TypedValue::Uint64(u64::MAX).as_i64(), None);
        assert_eq!(TypedValue::Float32(1.5).as_f64(), Some(1.5));
        assert_eq!(TypedValue::from("abc").as_str(), Some("abc"));
        assert_eq!(TypedValue::Bool(true).as_bool(), Some(true));
        assert!(TypedValue::Null.is_null());
        assert!(!TypedValue::Int64(0).is_null());
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(TypedValue::Null.kind(), "null");
        assert_eq!(TypedValue::Uint32(1).kind(), "uint32");
        assert_eq!(TypedValue::List(vec![]).kind(), "list");
    }

    #[test]
    fn test_to_json() {
        let dt = DateTime::from_timestamp(0, 0).unwrap();
        let value = TypedValue::Struct(vec![
            ("id".to_string(), TypedValue::Int64(7)),
            ("price".to_string(), TypedValue::Decimal(Decimal::from_str("10.50").unwrap())),
            ("created".to_string(), TypedValue::DateTime(dt)),
            ("deleted".to_string(), TypedValue::Null),
            (
                "tags".to_string(),
                TypedValue::List(vec![TypedValue::from("a"), TypedValue::from("b")]),
            ),
        ]);

        let json = value.to_json();
        assert_eq!(json["id"], 7);
        assert_eq!(json["price"], "10.50");
        assert_eq!(json["created"], "1970-01-01T00:00:00Z");
        assert!(json["deleted"].is_null());
        assert_eq!(json["tags"][1], "b");
    }

    #[test]
    fn test_serde_keeps_integer_width() {
        let encoded = serde_json::to_string(&TypedValue::Uint32(5)).unwrap();
        assert_eq!(encoded, r#"{"type":"uint32","value":5}"#);

        let decoded: TypedValue = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, TypedValue::Uint32(5));

        let null: TypedValue = serde_json::from_str(r#"{"type":"null"}"#).unwrap();
        assert!(null.is_null());
    }
}
