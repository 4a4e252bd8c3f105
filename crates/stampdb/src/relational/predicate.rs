//! Selection predicates of the form `column operator literal`.
//!
//! ```text
//! temp > 24
//! humidity == "very high"
//! raining != false
//! ```
//!
//! The literal is typed against the column when the predicate is applied: a
//! Float column needs a number, a Boolean column `true`/`false`, and a String
//! column takes the quoted text or the bare word as written.

use crate::error::{Result, StampError};
use crate::point::Value;
use crate::schema::{ColumnType, Field};
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Comparison operator of a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `>`
    Gt,
    /// `<`
    Lt,
    /// `>=`
    Ge,
    /// `<=`
    Le,
    /// `==`
    Eq,
    /// `!=`
    Ne,
}

impl CompareOp {
    /// Returns the operator as written in a predicate.
    pub fn as_str(self) -> &'static str {
        match self {
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
            CompareOp::Ge => ">=",
            CompareOp::Le => "<=",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
        }
    }

    /// Returns true if `ordering` (cell compared to literal) satisfies the
    /// operator.
    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Ge => ordering != Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
        }
    }
}

impl FromStr for CompareOp {
    type Err = StampError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            ">" => Ok(CompareOp::Gt),
            "<" => Ok(CompareOp::Lt),
            ">=" => Ok(CompareOp::Ge),
            "<=" => Ok(CompareOp::Le),
            "==" => Ok(CompareOp::Eq),
            "!=" => Ok(CompareOp::Ne),
            other => Err(StampError::InvalidPredicate(format!(
                "unknown operator '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed, not yet typed, selection predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    column: String,
    op: CompareOp,
    literal: String,
    quoted: bool,
}

impl Predicate {
    /// Parses `column operator literal`.
    ///
    /// # Errors
    ///
    /// Returns `StampError::InvalidPredicate` if the expression does not have
    /// that shape or the literal is empty.
    pub fn parse(expr: &str) -> Result<Self> {
        static PREDICATE_RE: OnceLock<Regex> = OnceLock::new();
        let re = PREDICATE_RE.get_or_init(|| {
            Regex::new(r"^\s*([^\s<>=!]+)\s*(>=|<=|==|!=|>|<)\s*(.*?)\s*$").expect("valid regex")
        });

        let caps = re
            .captures(expr)
            .ok_or_else(|| StampError::InvalidPredicate(format!("cannot parse '{}'", expr)))?;
        let column = caps[1].to_string();
        let op = caps[2].parse::<CompareOp>()?;
        let raw = &caps[3];
        if raw.is_empty() {
            return Err(StampError::InvalidPredicate(format!(
                "missing literal in '{}'",
                expr
            )));
        }

        let (literal, quoted) = match unquote(raw) {
            Some(inner) => (inner.to_string(), true),
            None => (raw.to_string(), false),
        };
        Ok(Self {
            column,
            op,
            literal,
            quoted,
        })
    }

    /// Returns the column the predicate tests.
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Returns the comparison operator.
    pub fn op(&self) -> CompareOp {
        self.op
    }

    /// Resolves the column position and types the literal for `fields`.
    pub(crate) fn bind(&self, fields: &[Field]) -> Result<(usize, Value)> {
        let index = fields
            .iter()
            .position(|f| f.name == self.column)
            .ok_or_else(|| {
                StampError::InvalidPredicate(format!("unknown column '{}'", self.column))
            })?;
        let column_type = fields[index].column_type;
        let incompatible = || {
            StampError::InvalidPredicate(format!(
                "literal '{}' does not fit {} column '{}'",
                self.literal, column_type, self.column
            ))
        };
        let value = match column_type {
            ColumnType::String => Value::String(self.literal.clone()),
            _ if self.quoted => return Err(incompatible()),
            ColumnType::Float => self
                .literal
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(Value::Float)
                .ok_or_else(incompatible)?,
            ColumnType::Boolean => match self.literal.as_str() {
                "true" => Value::Boolean(true),
                "false" => Value::Boolean(false),
                _ => return Err(incompatible()),
            },
        };
        Ok((index, value))
    }

    /// Tests one row whose columns are described by `fields`.
    ///
    /// Null cells never match.
    pub fn matches(&self, fields: &[Field], row: &[Value]) -> Result<bool> {
        let (index, literal) = self.bind(fields)?;
        Ok(test_cell(self.op, &row[index], &literal))
    }
}

impl FromStr for Predicate {
    type Err = StampError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.quoted {
            write!(f, "{} {} \"{}\"", self.column, self.op, self.literal)
        } else {
            write!(f, "{} {} {}", self.column, self.op, self.literal)
        }
    }
}

/// Compares a cell with a typed literal.
pub(crate) fn test_cell(op: CompareOp, cell: &Value, literal: &Value) -> bool {
    cell.compare(literal).is_some_and(|ord| op.holds(ord))
}

fn unquote(raw: &str) -> Option<&str> {
    ['"', '\''].into_iter().find_map(|q| {
        raw.strip_prefix(q).and_then(|rest| rest.strip_suffix(q))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> Vec<Field> {
        vec![
            Field::new("time", ColumnType::Float),
            Field::new("temp", ColumnType::Float),
            Field::new("humidity", ColumnType::String),
            Field::new("raining", ColumnType::Boolean),
        ]
    }

    fn row(temp: f64, humidity: &str, raining: bool) -> Vec<Value> {
        vec![
            Value::Float(0.0),
            Value::Float(temp),
            Value::from(humidity),
            Value::Boolean(raining),
        ]
    }

    #[test]
    fn test_parse_shapes() {
        let p = Predicate::parse("temp > 24").unwrap();
        assert_eq!(p.column(), "temp");
        assert_eq!(p.op(), CompareOp::Gt);

        let p = Predicate::parse("  temp>=24.5 ").unwrap();
        assert_eq!(p.op(), CompareOp::Ge);

        let p = Predicate::parse("humidity == 'very high'").unwrap();
        assert_eq!(p.to_string(), "humidity == \"very high\"");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for expr in ["temp", "temp = 24", "temp >", "> 24", ""] {
            assert!(
                matches!(Predicate::parse(expr), Err(StampError::InvalidPredicate(_))),
                "{expr:?} should not parse"
            );
        }
    }

    #[test]
    fn test_operators() {
        let fields = fields();
        let r = row(24.0, "moderate", false);
        let cases = [
            ("temp > 24", false),
            ("temp >= 24", true),
            ("temp < 24", false),
            ("temp <= 24", true),
            ("temp == 24", true),
            ("temp != 24", false),
        ];
        for (expr, expected) in cases {
            let p = Predicate::parse(expr).unwrap();
            assert_eq!(p.matches(&fields, &r).unwrap(), expected, "{expr}");
        }
    }

    #[test]
    fn test_string_and_boolean_literals() {
        let fields = fields();
        let r = row(24.0, "moderate", true);

        let bare = Predicate::parse("humidity == moderate").unwrap();
        assert!(bare.matches(&fields, &r).unwrap());
        let quoted = Predicate::parse("humidity < \"n\"").unwrap();
        assert!(quoted.matches(&fields, &r).unwrap());
        let boolean = Predicate::parse("raining > false").unwrap();
        assert!(boolean.matches(&fields, &r).unwrap());
    }

    #[test]
    fn test_literal_type_checks() {
        let fields = fields();
        let r = row(24.0, "moderate", true);
        for expr in ["temp > warm", "temp > '24'", "raining == yes", "pressure > 1"] {
            let p = Predicate::parse(expr).unwrap();
            assert!(
                matches!(p.matches(&fields, &r), Err(StampError::InvalidPredicate(_))),
                "{expr} should be rejected"
            );
        }
    }

    #[test]
    fn test_null_never_matches() {
        let fields = fields();
        let mut r = row(24.0, "moderate", true);
        r[1] = Value::Null;
        for expr in ["temp > 0", "temp != 0", "temp == 0"] {
            let p = Predicate::parse(expr).unwrap();
            assert!(!p.matches(&fields, &r).unwrap());
        }
    }
}
