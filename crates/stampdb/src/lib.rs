//! StampDB - embedded append-only time-series store
//!
//! This crate stores timestamped, schema-typed points in a human-readable
//! text file and answers point, range and full reads. A small set of
//! relational operators works on the resulting tables.
//!
//! # Components
//!
//! - [`Store`]: append-only store with checkpoints and compaction
//! - [`Schema`]: typed column declarations, persisted as a sidecar file
//! - [`Table`]: query results, with column-wise materialization
//! - [`relational`]: select, project, sum, order by and joins
//!
//! # Example
//!
//! ```rust,no_run
//! use stampdb::{relational, ColumnType, Point, Schema, Store, Value};
//!
//! let schema = Schema::new([("temp", ColumnType::Float), ("humidity", ColumnType::String)])?;
//! let mut store = Store::create("weather.csv", schema)?;
//!
//! store.append(&Point::new(0.0, vec![Value::from(23.5), Value::from("moderate")]))?;
//! store.append(&Point::new(1.0, vec![Value::from(24.5), Value::from("high")]))?;
//!
//! let warm = relational::select("temp > 24", &store.read_range(0.0, 10.0)?)?;
//! assert_eq!(warm.len(), 1);
//!
//! store.close()?;
//! # Ok::<(), stampdb::StampError>(())
//! ```

#![deny(missing_docs)]

pub mod codec;
pub mod error;
pub mod point;
pub mod relational;
pub mod schema;
pub mod storage;
pub mod table;

pub use codec::{Record, RecordStatus};
pub use error::{Result, StampError};
pub use point::{Point, Timestamp, Value};
pub use relational::{
    inner_join, join, left_outer_join, order_by, outer_join, project, select, sum, CompareOp,
    JoinKind, Predicate,
};
pub use schema::{ColumnType, Field, Schema};
pub use storage::{Store, StoreOptions, SyncMode};
pub use table::{ColumnData, Table};
