//! Query results.
//!
//! A [`Table`] is an ordered set of rows with named, typed columns. Tables
//! read from a store start with the `time` column followed by the schema
//! columns and hold one row per live timestamp in ascending order. The
//! relational operators take tables in and hand new tables back.

use crate::error::{Result, StampError};
use crate::point::Value;
use crate::schema::{ColumnType, Field, Schema, TIME_COLUMN};
use std::fmt;

/// Column-wise copy of a table column, used to build host-native arrays.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    /// Values of a float column.
    Float(Vec<Option<f64>>),
    /// Values of a string column.
    String(Vec<Option<String>>),
    /// Values of a boolean column.
    Boolean(Vec<Option<bool>>),
}

impl ColumnData {
    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Float(v) => v.len(),
            ColumnData::String(v) => v.len(),
            ColumnData::Boolean(v) => v.len(),
        }
    }

    /// Returns true if the column has no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Rows with named, typed columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    fields: Vec<Field>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Creates a table from fields and rows.
    ///
    /// Every row must have one value per field; cells are either `Null` or
    /// match their column type.
    pub fn new(fields: Vec<Field>, rows: Vec<Vec<Value>>) -> Self {
        debug_assert!(rows.iter().all(|r| r.len() == fields.len()));
        Self { fields, rows }
    }

    /// Creates an empty table with the columns of a store using `schema`.
    pub fn empty(schema: &Schema) -> Self {
        Self::new(Self::store_fields(schema), Vec::new())
    }

    /// Columns of a table read from a store: `time` then the schema columns.
    pub fn store_fields(schema: &Schema) -> Vec<Field> {
        std::iter::once(Field::new(TIME_COLUMN, ColumnType::Float))
            .chain(schema.fields().iter().cloned())
            .collect()
    }

    /// Returns the columns.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Returns the rows.
    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Consumes the table, returning its columns and rows.
    pub fn into_parts(self) -> (Vec<Field>, Vec<Vec<Value>>) {
        (self.fields, self.rows)
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the position of column `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Returns the field for column `name`.
    pub fn field(&self, name: &str) -> Result<&Field> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| StampError::UnknownColumn(name.to_string()))
    }

    /// Returns the cell at `row` in column `name`.
    pub fn value(&self, row: usize, name: &str) -> Option<&Value> {
        let col = self.column_index(name)?;
        self.rows.get(row).map(|r| &r[col])
    }

    /// Copies column `name` out of the table.
    pub fn column(&self, name: &str) -> Result<ColumnData> {
        let col = self
            .column_index(name)
            .ok_or_else(|| StampError::UnknownColumn(name.to_string()))?;
        Ok(self.column_at(col))
    }

    fn column_at(&self, col: usize) -> ColumnData {
        let cells = self.rows.iter().map(|r| &r[col]);
        match self.fields[col].column_type {
            ColumnType::Float => ColumnData::Float(cells.map(Value::as_f64).collect()),
            ColumnType::String => {
                ColumnData::String(cells.map(|v| v.as_str().map(str::to_string)).collect())
            }
            ColumnType::Boolean => ColumnData::Boolean(cells.map(Value::as_bool).collect()),
        }
    }

    /// Materializes every column in order.
    ///
    /// This is the hand-off a binding layer uses to build typed arrays.
    pub fn to_columns(&self) -> Vec<(Field, ColumnData)> {
        self.fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.clone(), self.column_at(i)))
            .collect()
    }

    /// Returns the smallest value of the `time` column.
    ///
    /// # Errors
    ///
    /// - `StampError::EmptyStore` if the table has no rows
    /// - `StampError::UnknownColumn` if there is no `time` column
    pub fn first_time(&self) -> Result<f64> {
        self.time_values()?
            .min_by(|a, b| a.total_cmp(b))
            .ok_or(StampError::EmptyStore)
    }

    /// Returns the largest value of the `time` column.
    ///
    /// # Errors
    ///
    /// Same as [`Table::first_time`].
    pub fn last_time(&self) -> Result<f64> {
        self.time_values()?
            .max_by(|a, b| a.total_cmp(b))
            .ok_or(StampError::EmptyStore)
    }

    fn time_values(&self) -> Result<impl Iterator<Item = f64> + '_> {
        let col = self
            .column_index(TIME_COLUMN)
            .ok_or_else(|| StampError::UnknownColumn(TIME_COLUMN.to_string()))?;
        Ok(self.rows.iter().filter_map(move |r| r[col].as_f64()))
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header: Vec<&str> = self.fields.iter().map(|f| f.name.as_str()).collect();
        writeln!(f, "{}", header.join(", "))?;
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            writeln!(f, "{}", cells.join(", "))?;
        }
        Ok(())
    }
}
