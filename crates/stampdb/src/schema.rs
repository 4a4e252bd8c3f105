//! Column types, schemas, and the sidecar schema file.
//!
//! A [`Schema`] is the ordered list of typed columns that follow the implicit
//! leading `time` column. It is fixed when a store is created and persisted
//! next to the store file as `<store>.schema`:
//!
//! ```text
//! {
//!   "columns": [
//!     { "name": "temp", "type": "float" },
//!     { "name": "humidity", "type": "string" }
//!   ]
//! }
//! ```
//!
//! Once the sidecar exists it is authoritative: reopening a store with a
//! different schema fails instead of silently reinterpreting the file.

use crate::error::{Result, StampError};
use crate::point::{Point, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Name of the implicit leading column of every store.
pub const TIME_COLUMN: &str = "time";

/// Extension appended to the store path to form the sidecar path.
pub const SCHEMA_EXTENSION: &str = "schema";

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// 64-bit floating point. Accepts integer input.
    Float,
    /// UTF-8 text.
    String,
    /// `true` / `false`.
    Boolean,
}

impl ColumnType {
    /// Returns the lowercase name used in the sidecar file.
    pub fn as_str(self) -> &'static str {
        match self {
            ColumnType::Float => "float",
            ColumnType::String => "string",
            ColumnType::Boolean => "boolean",
        }
    }

    /// Returns true if `value` may be stored in a column of this type.
    pub fn accepts(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (ColumnType::Float, Value::Float(_))
                | (ColumnType::Float, Value::Integer(_))
                | (ColumnType::String, Value::String(_))
                | (ColumnType::Boolean, Value::Boolean(_))
        )
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = StampError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "float" | "f64" | "double" => Ok(ColumnType::Float),
            "string" | "str" | "text" => Ok(ColumnType::String),
            "boolean" | "bool" => Ok(ColumnType::Boolean),
            other => Err(StampError::InvalidSchema(format!(
                "unknown column type '{}'",
                other
            ))),
        }
    }
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    /// Column name.
    pub name: String,
    /// Column type.
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl Field {
    /// Creates a new field.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct SchemaFile {
    columns: Vec<Field>,
}

/// Ordered column declarations of a store, excluding `time`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<Field>,
}

impl Schema {
    /// Creates a schema from `(name, type)` pairs in on-disk order.
    ///
    /// # Errors
    ///
    /// Returns `StampError::InvalidSchema` if the list is empty, a name is
    /// repeated, empty, equal to `time`, or contains a character the store
    /// header cannot carry (`,`, `"`, CR, LF).
    ///
    /// # Example
    ///
    /// ```rust
    /// use stampdb::{ColumnType, Schema};
    ///
    /// let schema = Schema::new([("temp", ColumnType::Float), ("humidity", ColumnType::String)])?;
    /// assert_eq!(schema.header_names(), vec!["time", "temp", "humidity"]);
    /// # Ok::<(), stampdb::StampError>(())
    /// ```
    pub fn new<I, S>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, ColumnType)>,
        S: Into<String>,
    {
        let columns = columns
            .into_iter()
            .map(|(name, column_type)| Field::new(name, column_type))
            .collect();
        Self::from_fields(columns)
    }

    /// Creates a schema from already-built fields.
    pub fn from_fields(columns: Vec<Field>) -> Result<Self> {
        if columns.is_empty() {
            return Err(StampError::InvalidSchema(
                "schema must have at least 1 column".to_string(),
            ));
        }
        for (i, field) in columns.iter().enumerate() {
            let name = field.name.as_str();
            if name.trim().is_empty() {
                return Err(StampError::InvalidSchema(format!(
                    "column {} has an empty name",
                    i
                )));
            }
            if name != name.trim() {
                return Err(StampError::InvalidSchema(format!(
                    "column '{}' has surrounding whitespace",
                    name
                )));
            }
            if name == TIME_COLUMN {
                return Err(StampError::InvalidSchema(format!(
                    "'{}' is reserved for the timestamp column",
                    TIME_COLUMN
                )));
            }
            if name.contains([',', '"', '\r', '\n']) {
                return Err(StampError::InvalidSchema(format!(
                    "column '{}' contains a reserved character",
                    name
                )));
            }
            if columns[..i].iter().any(|f| f.name == field.name) {
                return Err(StampError::InvalidSchema(format!(
                    "duplicate column '{}'",
                    name
                )));
            }
        }
        Ok(Self { columns })
    }

    /// Returns the declared columns in order.
    pub fn fields(&self) -> &[Field] {
        &self.columns
    }

    /// Returns the number of declared columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Always false; schemas have at least one column.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Returns the position of `name` among the declared columns.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|f| f.name == name)
    }

    /// Returns the field called `name`.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.columns.iter().find(|f| f.name == name)
    }

    /// Column names as they appear in the store header, `time` first.
    pub fn header_names(&self) -> Vec<&str> {
        std::iter::once(TIME_COLUMN)
            .chain(self.columns.iter().map(|f| f.name.as_str()))
            .collect()
    }

    /// Checks every value of `point` against its declared column type.
    ///
    /// # Errors
    ///
    /// - `StampError::ArityMismatch` if the value count differs from the
    ///   column count
    /// - `StampError::SchemaViolation` naming the first offending column
    pub fn validate(&self, point: &Point) -> Result<()> {
        if point.values.len() != self.columns.len() {
            return Err(StampError::ArityMismatch {
                expected: self.columns.len(),
                actual: point.values.len(),
            });
        }
        for (value, field) in point.values.iter().zip(self.columns.iter()) {
            if !field.column_type.accepts(value) {
                return Err(StampError::SchemaViolation {
                    column: field.name.clone(),
                    expected: field.column_type,
                    actual: value.type_name(),
                });
            }
        }
        Ok(())
    }

    /// Validates `point` and returns a copy with integers widened to floats.
    pub fn conform(&self, point: &Point) -> Result<Point> {
        self.validate(point)?;
        let values = point
            .values
            .iter()
            .map(|v| match v {
                Value::Integer(i) => Value::Float(*i as f64),
                other => other.clone(),
            })
            .collect();
        Ok(Point::new(point.time, values))
    }

    /// Writes the schema to `path`.
    ///
    /// The file is written to a temporary sibling and renamed into place so a
    /// crash never leaves a torn sidecar.
    pub fn persist(&self, path: &Path) -> Result<()> {
        let doc = SchemaFile {
            columns: self.columns.clone(),
        };
        let json = serde_json::to_vec_pretty(&doc).map_err(std::io::Error::other)?;

        let tmp_path = path.with_extension(format!("{}.tmp", SCHEMA_EXTENSION));
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&json)?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path)?;
        debug!("Persisted schema to {}", path.display());
        Ok(())
    }

    /// Reads a schema previously written by [`Schema::persist`].
    ///
    /// # Errors
    ///
    /// Returns `StampError::SchemaFileCorrupt` if the file cannot be read,
    /// is not valid JSON of the expected shape, or declares an invalid schema.
    pub fn load(path: &Path) -> Result<Self> {
        let corrupt = |reason: String| StampError::SchemaFileCorrupt {
            path: path.to_path_buf(),
            reason,
        };
        let text = fs::read_to_string(path).map_err(|e| corrupt(e.to_string()))?;
        let doc: SchemaFile = serde_json::from_str(&text).map_err(|e| corrupt(e.to_string()))?;
        Self::from_fields(doc.columns).map_err(|e| corrupt(e.to_string()))
    }

    /// Picks the schema for a store whose sidecar lives at `sidecar`.
    ///
    /// The sidecar wins when it exists; a `supplied` schema must then match it
    /// exactly. Without a sidecar, `supplied` is required.
    ///
    /// Returns the schema and whether it came from the sidecar.
    pub fn resolve(sidecar: &Path, supplied: Option<Schema>) -> Result<(Schema, bool)> {
        if sidecar.exists() {
            let loaded = Self::load(sidecar)?;
            if let Some(supplied) = supplied {
                if let Some(reason) = loaded.difference(&supplied) {
                    return Err(StampError::SchemaMismatch {
                        path: sidecar.to_path_buf(),
                        reason,
                    });
                }
            }
            return Ok((loaded, true));
        }
        match supplied {
            Some(schema) => Ok((schema, false)),
            None => Err(StampError::MissingSchema {
                path: sidecar.to_path_buf(),
            }),
        }
    }

    fn difference(&self, other: &Schema) -> Option<String> {
        if self.columns.len() != other.columns.len() {
            return Some(format!(
                "persisted schema has {} columns, supplied has {}",
                self.columns.len(),
                other.columns.len()
            ));
        }
        self.columns
            .iter()
            .zip(other.columns.iter())
            .find(|(a, b)| a != b)
            .map(|(a, b)| {
                format!(
                    "persisted column '{}' ({}) differs from supplied '{}' ({})",
                    a.name, a.column_type, b.name, b.column_type
                )
            })
    }
}

/// Returns the sidecar schema path for a store file.
pub fn sidecar_path(store_path: &Path) -> PathBuf {
    let mut name = store_path.as_os_str().to_os_string();
    name.push(".");
    name.push(SCHEMA_EXTENSION);
    PathBuf::from(name)
}
