//! Scalar values, SQL column types and the unbound literal tokens produced
//! by auto-parameterization.
use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// SQL column and parameter types understood by the planner.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// Boolean truth value.
    Boolean,
    /// 8-bit signed integer.
    TinyInt,
    /// 16-bit signed integer.
    SmallInt,
    /// 32-bit signed integer.
    Integer,
    /// 64-bit signed integer.
    BigInt,
    /// 64-bit floating point.
    Float,
    /// Variable length UTF-8 string.
    Varchar,
    /// Variable length byte string.
    Varbinary,
    /// Microseconds since the Unix epoch.
    Timestamp,
}

impl ValueType {
    /// Upper-case SQL name.
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Boolean => "BOOLEAN",
            ValueType::TinyInt => "TINYINT",
            ValueType::SmallInt => "SMALLINT",
            ValueType::Integer => "INTEGER",
            ValueType::BigInt => "BIGINT",
            ValueType::Float => "FLOAT",
            ValueType::Varchar => "VARCHAR",
            ValueType::Varbinary => "VARBINARY",
            ValueType::Timestamp => "TIMESTAMP",
        }
    }

    /// Parses a SQL type name, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        let ty = match name.to_ascii_uppercase().as_str() {
            "BOOLEAN" | "BOOL" => ValueType::Boolean,
            "TINYINT" => ValueType::TinyInt,
            "SMALLINT" => ValueType::SmallInt,
            "INTEGER" | "INT" => ValueType::Integer,
            "BIGINT" => ValueType::BigInt,
            "FLOAT" | "DOUBLE" | "DECIMAL" => ValueType::Float,
            "VARCHAR" | "STRING" | "TEXT" => ValueType::Varchar,
            "VARBINARY" | "BYTES" => ValueType::Varbinary,
            "TIMESTAMP" => ValueType::Timestamp,
            _ => return None,
        };
        Some(ty)
    }

    /// True for the fixed-width integer types.
    pub fn is_integral(self) -> bool {
        matches!(
            self,
            ValueType::TinyInt | ValueType::SmallInt | ValueType::Integer | ValueType::BigInt
        )
    }

    /// True for integer and floating point types.
    pub fn is_numeric(self) -> bool {
        self.is_integral() || self == ValueType::Float
    }

    fn integral_range(self) -> Option<(i64, i64)> {
        match self {
            ValueType::TinyInt => Some((i8::MIN as i64, i8::MAX as i64)),
            ValueType::SmallInt => Some((i16::MIN as i64, i16::MAX as i64)),
            ValueType::Integer => Some((i32::MIN as i64, i32::MAX as i64)),
            ValueType::BigInt | ValueType::Timestamp => Some((i64::MIN, i64::MAX)),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Typed value tagged with explicit type information so the wire format
/// remains unambiguous.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Any integral value, whatever its declared width.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Binary payload.
    Bytes(Vec<u8>),
    /// Microseconds since the Unix epoch.
    Timestamp(i64),
}

impl Value {
    /// True for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Natural type of a non-null value.
    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(ValueType::Boolean),
            Value::Int(_) => Some(ValueType::BigInt),
            Value::Float(_) => Some(ValueType::Float),
            Value::String(_) => Some(ValueType::Varchar),
            Value::Bytes(_) => Some(ValueType::Varbinary),
            Value::Timestamp(_) => Some(ValueType::Timestamp),
        }
    }

    /// SQL comparison. `None` when either side is NULL or the types are not
    /// comparable.
    pub fn sql_cmp(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Int(b)) | (Value::Int(b), Value::Timestamp(a)) => {
                let ord = a.cmp(b);
                Some(if matches!(self, Value::Int(_)) { ord.reverse() } else { ord })
            }
            _ => None,
        }
    }

    /// Total order used for sorting: NULL sorts first, then values by
    /// [`sql_cmp`](Self::sql_cmp), then incomparable values by type.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            _ => {}
        }
        self.sql_cmp(other)
            .unwrap_or_else(|| self.type_rank().cmp(&other.type_rank()))
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::String(_) => 3,
            Value::Bytes(_) => 4,
            Value::Timestamp(_) => 5,
        }
    }

    /// Canonical byte encoding used for grouping, deduplication and
    /// partition hashing.
    pub fn key_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(9);
        match self {
            Value::Null => out.push(0),
            Value::Bool(b) => {
                out.push(1);
                out.push(u8::from(*b));
            }
            Value::Int(v) => {
                out.push(2);
                out.extend_from_slice(&v.to_le_bytes());
            }
            Value::Float(v) => {
                let v = if *v == 0.0 { 0.0 } else { *v };
                out.push(3);
                out.extend_from_slice(&v.to_bits().to_le_bytes());
            }
            Value::String(s) => {
                out.push(4);
                out.extend_from_slice(s.as_bytes());
            }
            Value::Bytes(b) => {
                out.push(5);
                out.extend_from_slice(b);
            }
            Value::Timestamp(v) => {
                out.push(6);
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        out
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v:?}"),
            Value::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Value::Bytes(b) => write!(f, "x'{}'", hex::encode(b)),
            Value::Timestamp(v) => write!(f, "TIMESTAMP({v})"),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

/// Lexical class of a literal as it appeared in the statement text.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiteralKind {
    /// Digits with an optional sign.
    Integer,
    /// Number with a fraction or exponent.
    Decimal,
    /// Quoted string.
    String,
    /// `TRUE` / `FALSE`.
    Boolean,
    /// `NULL`.
    Null,
}

impl LiteralKind {
    /// Attribute spelling used in intermediate trees.
    pub fn as_str(self) -> &'static str {
        match self {
            LiteralKind::Integer => "integer",
            LiteralKind::Decimal => "decimal",
            LiteralKind::String => "string",
            LiteralKind::Boolean => "boolean",
            LiteralKind::Null => "null",
        }
    }

    /// Inverse of [`as_str`](Self::as_str).
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "integer" => Some(LiteralKind::Integer),
            "decimal" => Some(LiteralKind::Decimal),
            "string" => Some(LiteralKind::String),
            "boolean" => Some(LiteralKind::Boolean),
            "null" => Some(LiteralKind::Null),
            _ => None,
        }
    }

    /// Type a literal of this kind takes when nothing else constrains it.
    pub fn default_type(self) -> Option<ValueType> {
        match self {
            LiteralKind::Integer => Some(ValueType::BigInt),
            LiteralKind::Decimal => Some(ValueType::Float),
            LiteralKind::String => Some(ValueType::Varchar),
            LiteralKind::Boolean => Some(ValueType::Boolean),
            LiteralKind::Null => None,
        }
    }
}

/// A literal lifted out of a statement: its kind plus its unquoted text,
/// not yet bound to a SQL type.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct LiteralToken {
    /// Lexical class.
    pub kind: LiteralKind,
    /// Source text without quotes.
    pub text: String,
}

impl LiteralToken {
    /// Creates a token.
    pub fn new(kind: LiteralKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    /// Converts the token to a value of its kind's default type.
    pub fn to_value(&self) -> Option<Value> {
        match self.kind.default_type() {
            Some(ty) => self.coerce(ty),
            None => Some(Value::Null),
        }
    }

    /// Converts the token to a value of `ty`, or `None` when the text cannot
    /// represent a value of that type.
    pub fn coerce(&self, ty: ValueType) -> Option<Value> {
        let text = self.text.as_str();
        match self.kind {
            LiteralKind::Null => Some(Value::Null),
            LiteralKind::Boolean => match ty {
                ValueType::Boolean => parse_bool(text).map(Value::Bool),
                _ => None,
            },
            LiteralKind::Integer => coerce_number(text, ty),
            LiteralKind::Decimal => match ty {
                ValueType::Float => text.parse::<f64>().ok().map(Value::Float),
                _ => None,
            },
            LiteralKind::String => match ty {
                ValueType::Varchar => Some(Value::String(text.to_owned())),
                ValueType::Varbinary => hex::decode(text).ok().map(Value::Bytes),
                ValueType::Boolean => parse_bool(text).map(Value::Bool),
                _ if ty.is_numeric() || ty == ValueType::Timestamp => coerce_number(text, ty),
                _ => None,
            },
        }
    }
}

impl fmt::Display for LiteralToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            LiteralKind::String => write!(f, "'{}'", self.text.replace('\'', "''")),
            _ => f.write_str(&self.text),
        }
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    if text.eq_ignore_ascii_case("true") {
        Some(true)
    } else if text.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn coerce_number(text: &str, ty: ValueType) -> Option<Value> {
    if ty == ValueType::Float {
        return text.trim().parse::<f64>().ok().map(Value::Float);
    }
    let (min, max) = ty.integral_range()?;
    let parsed = text.trim().parse::<i64>().ok()?;
    if parsed < min || parsed > max {
        return None;
    }
    Some(if ty == ValueType::Timestamp {
        Value::Timestamp(parsed)
    } else {
        Value::Int(parsed)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_literal_respects_target_width() {
        let token = LiteralToken::new(LiteralKind::Integer, "300");
        assert_eq!(token.coerce(ValueType::Integer), Some(Value::Int(300)));
        assert_eq!(token.coerce(ValueType::TinyInt), None);
        assert_eq!(token.coerce(ValueType::Float), Some(Value::Float(300.0)));
        assert_eq!(token.coerce(ValueType::Varchar), None);
    }

    #[test]
    fn string_literal_parses_into_numeric_targets() {
        let token = LiteralToken::new(LiteralKind::String, "42");
        assert_eq!(token.coerce(ValueType::BigInt), Some(Value::Int(42)));
        assert_eq!(token.coerce(ValueType::Varchar), Some(Value::from("42")));
        let bad = LiteralToken::new(LiteralKind::String, "x");
        assert_eq!(bad.coerce(ValueType::Integer), None);
    }

    #[test]
    fn decimal_only_binds_to_float() {
        let token = LiteralToken::new(LiteralKind::Decimal, "1.5");
        assert_eq!(token.coerce(ValueType::Float), Some(Value::Float(1.5)));
        assert_eq!(token.coerce(ValueType::BigInt), None);
    }

    #[test]
    fn display_quotes_strings() {
        let token = LiteralToken::new(LiteralKind::String, "it's");
        assert_eq!(token.to_string(), "'it''s'");
        assert_eq!(LiteralToken::new(LiteralKind::Integer, "-7").to_string(), "-7");
    }

    #[test]
    fn sort_cmp_puts_null_first_and_mixes_numbers() {
        let mut values = vec![Value::Float(2.5), Value::Null, Value::Int(1), Value::Int(3)];
        values.sort_by(|a, b| a.sort_cmp(b));
        assert_eq!(
            values,
            vec![Value::Null, Value::Int(1), Value::Float(2.5), Value::Int(3)]
        );
        assert_eq!(Value::Null.sql_cmp(&Value::Null), None);
    }

    #[test]
    fn key_bytes_distinguish_types() {
        assert_ne!(Value::Int(1).key_bytes(), Value::Bool(true).key_bytes());
        assert_eq!(Value::Float(-0.0).key_bytes(), Value::Float(0.0).key_bytes());
    }
}
