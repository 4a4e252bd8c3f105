//! Relational operators over [`Table`]s.
//!
//! Every operator takes its inputs by reference and returns a new table;
//! nothing is mutated in place.
//!
//! | Operator | Result |
//! |----------|--------|
//! | [`select`] | rows satisfying a predicate such as `"temp > 24"` |
//! | [`project`] | the named columns, in the requested order |
//! | [`sum`] | total of a Float column |
//! | [`order_by`] | rows sorted ascending by one or more columns |
//! | [`inner_join`], [`left_outer_join`], [`outer_join`] | equality joins |

pub mod predicate;

pub use predicate::{CompareOp, Predicate};

use crate::error::{Result, StampError};
use crate::point::Value;
use crate::schema::{ColumnType, Field};
use crate::table::Table;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Suffix appended to right-side join columns whose name is already taken.
pub const JOIN_SUFFIX: &str = "_right";

/// Returns the rows of `table` that satisfy `predicate`.
///
/// # Errors
///
/// Returns `StampError::InvalidPredicate` if the predicate does not parse,
/// names an unknown column or has a literal of the wrong type.
pub fn select(predicate: &str, table: &Table) -> Result<Table> {
    let predicate = Predicate::parse(predicate)?;
    let (index, literal) = predicate.bind(table.fields())?;
    let rows = table
        .rows()
        .iter()
        .filter(|row| predicate::test_cell(predicate.op(), &row[index], &literal))
        .cloned()
        .collect();
    Ok(Table::new(table.fields().to_vec(), rows))
}

fn column_indices<S: AsRef<str>>(table: &Table, columns: &[S]) -> Result<Vec<usize>> {
    columns
        .iter()
        .map(|name| {
            let name = name.as_ref();
            table
                .column_index(name)
                .ok_or_else(|| StampError::UnknownColumn(name.to_string()))
        })
        .collect()
}

/// Returns only `columns` of `table`, in the order given.
pub fn project<S: AsRef<str>>(columns: &[S], table: &Table) -> Result<Table> {
    let indices = column_indices(table, columns)?;
    let fields = indices.iter().map(|&i| table.fields()[i].clone()).collect();
    let rows = table
        .rows()
        .iter()
        .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
        .collect();
    Ok(Table::new(fields, rows))
}

/// Sums a Float column, skipping nulls. An empty table sums to 0.
///
/// # Errors
///
/// - `StampError::UnknownColumn` if the column does not exist
/// - `StampError::NonNumericColumn` if it is not a Float column
pub fn sum(column: &str, table: &Table) -> Result<f64> {
    let field = table.field(column)?;
    if field.column_type != ColumnType::Float {
        return Err(StampError::NonNumericColumn {
            column: column.to_string(),
            actual: field.column_type,
        });
    }
    let index = table
        .column_index(column)
        .ok_or_else(|| StampError::UnknownColumn(column.to_string()))?;
    Ok(table.rows().iter().filter_map(|row| row[index].as_f64()).sum())
}

/// Sorts rows ascending by `columns`, first column most significant.
///
/// The sort is stable and nulls sort after every value.
pub fn order_by<S: AsRef<str>>(columns: &[S], table: &Table) -> Result<Table> {
    let indices = column_indices(table, columns)?;
    let mut rows = table.rows().to_vec();
    rows.sort_by(|a, b| {
        for &i in &indices {
            let cmp = compare_cells(&a[i], &b[i]);
            if cmp != Ordering::Equal {
                return cmp;
            }
        }
        Ordering::Equal
    });
    Ok(Table::new(table.fields().to_vec(), rows))
}

fn compare_cells(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.compare(b).unwrap_or(Ordering::Equal),
    }
}

/// Kind of equality join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// Matching pairs only.
    Inner,
    /// Matching pairs plus unmatched left rows.
    LeftOuter,
    /// Matching pairs plus unmatched rows of both sides.
    FullOuter,
}

/// Hashable form of a non-null join key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum JoinKey {
    Number(u64),
    Text(String),
    Boolean(bool),
}

impl JoinKey {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            // -0.0 and 0.0 are the same key.
            Value::Float(f) => Some(JoinKey::Number((f + 0.0).to_bits())),
            Value::Integer(i) => Some(JoinKey::Number((*i as f64 + 0.0).to_bits())),
            Value::String(s) => Some(JoinKey::Text(s.clone())),
            Value::Boolean(b) => Some(JoinKey::Boolean(*b)),
        }
    }
}

/// Joins `left` and `right` where `left_key` equals `right_key`.
///
/// Output columns are every left column followed by the right columns other
/// than `right_key`; a right column whose name is taken gets [`JOIN_SUFFIX`]
/// appended until it is unique. Rows follow left order, and the matches for
/// one left row follow right order. Null keys never match.
///
/// # Errors
///
/// - `StampError::UnknownColumn` if a key column does not exist
/// - `StampError::IncompatibleJoinKeys` if the key columns differ in type
pub fn join(
    kind: JoinKind,
    left: &Table,
    right: &Table,
    left_key: &str,
    right_key: &str,
) -> Result<Table> {
    let left_field = left.field(left_key)?;
    let right_field = right.field(right_key)?;
    if left_field.column_type != right_field.column_type {
        return Err(StampError::IncompatibleJoinKeys {
            left: format!("{} ({})", left_field.name, left_field.column_type),
            right: format!("{} ({})", right_field.name, right_field.column_type),
        });
    }
    let lk = left
        .column_index(left_key)
        .ok_or_else(|| StampError::UnknownColumn(left_key.to_string()))?;
    let rk = right
        .column_index(right_key)
        .ok_or_else(|| StampError::UnknownColumn(right_key.to_string()))?;

    let fields = joined_fields(left.fields(), right.fields(), rk);
    let right_width = right.fields().len() - 1;

    // Build on the right so matches come out in right order.
    let mut hash_table: HashMap<JoinKey, Vec<usize>> = HashMap::new();
    for (i, row) in right.rows().iter().enumerate() {
        if let Some(key) = JoinKey::from_value(&row[rk]) {
            hash_table.entry(key).or_default().push(i);
        }
    }

    let mut matched_right = vec![false; right.len()];
    let mut rows = Vec::new();
    for left_row in left.rows() {
        let matches = JoinKey::from_value(&left_row[lk]).and_then(|key| hash_table.get(&key));
        match matches {
            Some(indices) => {
                for &i in indices {
                    matched_right[i] = true;
                    rows.push(concat_row(left_row, &right.rows()[i], rk));
                }
            }
            None if kind != JoinKind::Inner => {
                let mut row = left_row.clone();
                row.extend(std::iter::repeat(Value::Null).take(right_width));
                rows.push(row);
            }
            None => {}
        }
    }

    if kind == JoinKind::FullOuter {
        let left_width = left.fields().len();
        for (i, right_row) in right.rows().iter().enumerate() {
            if matched_right[i] {
                continue;
            }
            let mut row = vec![Value::Null; left_width];
            row[lk] = right_row[rk].clone();
            rows.push(concat_row(&row, right_row, rk));
        }
    }

    Ok(Table::new(fields, rows))
}

fn joined_fields(left: &[Field], right: &[Field], right_key: usize) -> Vec<Field> {
    let mut taken: HashSet<String> = left.iter().map(|f| f.name.clone()).collect();
    let mut fields = left.to_vec();
    for (i, field) in right.iter().enumerate() {
        if i == right_key {
            continue;
        }
        let mut name = field.name.clone();
        while taken.contains(&name) {
            name.push_str(JOIN_SUFFIX);
        }
        taken.insert(name.clone());
        fields.push(Field::new(name, field.column_type));
    }
    fields
}

fn concat_row(left: &[Value], right: &[Value], right_key: usize) -> Vec<Value> {
    left.iter()
        .cloned()
        .chain(
            right
                .iter()
                .enumerate()
                .filter(|&(i, _)| i != right_key)
                .map(|(_, v)| v.clone()),
        )
        .collect()
}

/// Inner equality join. See [`join`].
pub fn inner_join(left: &Table, right: &Table, left_key: &str, right_key: &str) -> Result<Table> {
    join(JoinKind::Inner, left, right, left_key, right_key)
}

/// Left outer equality join. See [`join`].
pub fn left_outer_join(
    left: &Table,
    right: &Table,
    left_key: &str,
    right_key: &str,
) -> Result<Table> {
    join(JoinKind::LeftOuter, left, right, left_key, right_key)
}

/// Full outer equality join. See [`join`].
///
/// Unmatched right rows come last, in right order, with their key in the
/// left key column and nulls in the other left columns.
pub fn outer_join(left: &Table, right: &Table, left_key: &str, right_key: &str) -> Result<Table> {
    join(JoinKind::FullOuter, left, right, left_key, right_key)
}
