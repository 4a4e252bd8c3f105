//! Timestamps, cell values, and points.

use crate::error::{Result, StampError};
use std::cmp::Ordering;
use std::fmt;

/// A finite time in seconds with a total order.
///
/// Stores use the timestamp as their only index key, so it must be usable in
/// a `BTreeMap`. Construction rejects NaN and infinities and folds `-0.0`
/// into `0.0` so that equal times compare equal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timestamp(f64);

impl Timestamp {
    /// Creates a timestamp, rejecting non-finite values.
    pub fn new(secs: f64) -> Result<Self> {
        if !secs.is_finite() {
            return Err(StampError::InvalidTimestamp(secs));
        }
        // -0.0 + 0.0 == +0.0
        Ok(Self(secs + 0.0))
    }

    /// Returns the time in seconds.
    pub fn as_secs(self) -> f64 {
        self.0
    }
}

impl Eq for Timestamp {}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing value. Only produced by outer joins.
    Null,
    /// Boolean value.
    Boolean(bool),
    /// Integer input; widened to `Float` when stored.
    Integer(i64),
    /// Floating point value.
    Float(f64),
    /// Text value.
    String(String),
}

impl Value {
    /// Returns true if this value is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Name of the runtime type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
        }
    }

    /// Returns the numeric value of `Float` or `Integer` cells.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Returns the text of `String` cells.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the flag of `Boolean` cells.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Orders two non-null values of the same kind.
    ///
    /// Returns `None` when either side is `Null` or the kinds differ.
    /// Numbers compare by total order, booleans as `false < true`, strings
    /// bytewise.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.as_bytes().cmp(b.as_bytes())),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => Some(x.total_cmp(&y)),
                _ => None,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

/// One logical record: a time and one value per schema column.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    /// Time in seconds.
    pub time: f64,
    /// Values in schema column order.
    pub values: Vec<Value>,
}

impl Point {
    /// Creates a new point.
    ///
    /// # Example
    ///
    /// ```rust
    /// use stampdb::{Point, Value};
    ///
    /// let p = Point::new(0.0, vec![Value::from(23.5), Value::from("moderate")]);
    /// assert_eq!(p.values.len(), 2);
    /// ```
    pub fn new(time: f64, values: Vec<Value>) -> Self {
        Self { time, values }
    }

    /// Returns the validated timestamp of this point.
    pub fn timestamp(&self) -> Result<Timestamp> {
        Timestamp::new(self.time)
    }
}
