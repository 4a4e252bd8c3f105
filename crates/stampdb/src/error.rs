//! Error and Result types for StampDB operations.

use crate::schema::ColumnType;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A convenience `Result` type for StampDB operations.
pub type Result<T> = std::result::Result<T, StampError>;

/// The error type for store and query operations.
#[derive(Debug, Error)]
pub enum StampError {
    /// A point value does not match the declared column type.
    #[error("Schema violation in column '{column}': expected {expected}, got {actual}")]
    SchemaViolation {
        /// Name of the offending column.
        column: String,
        /// Declared column type.
        expected: ColumnType,
        /// Runtime type of the supplied value.
        actual: &'static str,
    },

    /// A point carries the wrong number of values.
    #[error("Arity mismatch: schema has {expected} columns, point has {actual} values")]
    ArityMismatch {
        /// Number of schema columns.
        expected: usize,
        /// Number of supplied values.
        actual: usize,
    },

    /// No sidecar schema exists and none was supplied.
    #[error("Missing schema: no sidecar at {path} and no schema supplied")]
    MissingSchema {
        /// Expected sidecar path.
        path: PathBuf,
    },

    /// The sidecar schema file could not be read or decoded.
    #[error("Schema file {path} is corrupt: {reason}")]
    SchemaFileCorrupt {
        /// Sidecar path.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// The supplied schema differs from the persisted sidecar.
    #[error("Schema mismatch with {path}: {reason}")]
    SchemaMismatch {
        /// Sidecar path.
        path: PathBuf,
        /// First difference found.
        reason: String,
    },

    /// A schema declaration breaks a structural rule.
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// Timestamps must be finite.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(f64),

    /// The store file header does not name the schema columns.
    #[error("Header mismatch in {path}: expected [{expected}], got [{actual}]")]
    HeaderMismatch {
        /// Store file path.
        path: PathBuf,
        /// Header implied by the schema.
        expected: String,
        /// Header found on disk.
        actual: String,
    },

    /// A record line could not be decoded.
    #[error("Corrupt record at {path}:{line}: {reason}")]
    CorruptRecord {
        /// File being read.
        path: PathBuf,
        /// 1-based line number.
        line: u64,
        /// What went wrong.
        reason: String,
    },

    /// A selection predicate could not be parsed or applied.
    #[error("Invalid predicate: {0}")]
    InvalidPredicate(String),

    /// A referenced column does not exist in the table.
    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    /// An aggregation was requested over a non-numeric column.
    #[error("Column '{column}' is not numeric (type {actual})")]
    NonNumericColumn {
        /// Column name.
        column: String,
        /// Declared type of the column.
        actual: ColumnType,
    },

    /// Join key columns have different types.
    #[error("Incompatible join keys: {left} vs {right}")]
    IncompatibleJoinKeys {
        /// Left key column and type.
        left: String,
        /// Right key column and type.
        right: String,
    },

    /// A first/last timestamp query found no live rows.
    #[error("Store has no live rows")]
    EmptyStore,

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
