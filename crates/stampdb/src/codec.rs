//! Line-oriented record codec for store and staging files.
//!
//! # Format
//!
//! ```text
//! time, temp, humidity        <- header: "time" + schema columns
//! 0, 23.5, moderate           <- live record
//! 1, 24.5, "high, rising"     <- text needing protection is quoted
//! 0                           <- tombstone: the timestamp alone
//! ```
//!
//! Fields are separated by `", "`. Floats use the shortest decimal that
//! parses back to the same `f64`, booleans are `true`/`false`, and text is
//! written raw unless it is empty, contains `,`, `"`, CR or LF, or has
//! surrounding whitespace; then it is wrapped in `"` with inner quotes
//! doubled. A schema always has at least one column, so a line with a single
//! field is unambiguously a tombstone.

use crate::error::{Result, StampError};
use crate::point::{Point, Timestamp, Value};
use crate::schema::{ColumnType, Schema};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

/// Field separator used in every line.
pub const FIELD_SEPARATOR: &str = ", ";

/// Status tag of a persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    /// The record carries visible values.
    Live,
    /// The record hides every earlier record at its timestamp.
    Tombstone,
}

/// A point plus its status, as stored on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Record timestamp.
    pub time: Timestamp,
    /// Live or tombstone.
    pub status: RecordStatus,
    /// Values in schema order; empty for tombstones.
    pub values: Vec<Value>,
}

impl Record {
    /// Creates a live record.
    pub fn live(time: Timestamp, values: Vec<Value>) -> Self {
        Self {
            time,
            status: RecordStatus::Live,
            values,
        }
    }

    /// Creates a tombstone for `time`.
    pub fn tombstone(time: Timestamp) -> Self {
        Self {
            time,
            status: RecordStatus::Tombstone,
            values: Vec::new(),
        }
    }

    /// Returns true for live records.
    pub fn is_live(&self) -> bool {
        self.status == RecordStatus::Live
    }

    /// Converts a live record back into a point.
    pub fn to_point(&self) -> Point {
        Point::new(self.time.as_secs(), self.values.clone())
    }
}

/// Encodes the header line for `schema` (no trailing newline).
pub fn encode_header(schema: &Schema) -> String {
    schema.header_names().join(FIELD_SEPARATOR)
}

/// Encodes one record as a line (no trailing newline).
pub fn encode_record(record: &Record) -> String {
    let mut line = record.time.to_string();
    if record.status == RecordStatus::Tombstone {
        return line;
    }
    for value in &record.values {
        line.push_str(FIELD_SEPARATOR);
        encode_value(value, &mut line);
    }
    line
}

fn encode_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => {}
        Value::Boolean(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Integer(i) => out.push_str(&(*i as f64).to_string()),
        Value::Float(f) => out.push_str(&f.to_string()),
        Value::String(s) => {
            if needs_quoting(s) {
                out.push('"');
                out.push_str(&s.replace('"', "\"\""));
                out.push('"');
            } else {
                out.push_str(s);
            }
        }
    }
}

fn needs_quoting(s: &str) -> bool {
    s.is_empty()
        || s.contains([',', '"', '\r', '\n'])
        || s.starts_with(char::is_whitespace)
        || s.ends_with(char::is_whitespace)
}

/// Writes `record` followed by a newline.
pub fn write_record<W: Write>(writer: &mut W, record: &Record) -> Result<()> {
    writer.write_all(encode_record(record).as_bytes())?;
    writer.write_all(b"\n")?;
    Ok(())
}

/// Writes the header line followed by a newline.
pub fn write_header<W: Write>(writer: &mut W, schema: &Schema) -> Result<()> {
    writer.write_all(encode_header(schema).as_bytes())?;
    writer.write_all(b"\n")?;
    Ok(())
}

/// Splits a line into unquoted fields.
///
/// Returns `None` for an unterminated quote or stray characters after a
/// closing quote.
pub fn split_fields(line: &str) -> Option<Vec<String>> {
    let mut fields = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        let mut field = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            loop {
                match chars.next()? {
                    '"' if chars.peek() == Some(&'"') => {
                        chars.next();
                        field.push('"');
                    }
                    '"' => break,
                    c => field.push(c),
                }
            }
            match chars.next() {
                None => {
                    fields.push(field);
                    return Some(fields);
                }
                Some(',') => {}
                Some(_) => return None,
            }
        } else {
            loop {
                match chars.next() {
                    None => {
                        fields.push(field);
                        return Some(fields);
                    }
                    Some(',') => break,
                    Some(c) => field.push(c),
                }
            }
        }
        fields.push(field);
        if chars.peek() == Some(&' ') {
            chars.next();
        }
    }
}

/// Decodes the fields of one line into a record typed by `schema`.
///
/// `path` and `line` only feed error messages.
pub fn decode_record(fields: &[String], schema: &Schema, path: &Path, line: u64) -> Result<Record> {
    let corrupt = |reason: String| StampError::CorruptRecord {
        path: path.to_path_buf(),
        line,
        reason,
    };

    let (time_field, value_fields) = fields
        .split_first()
        .ok_or_else(|| corrupt("empty line".to_string()))?;
    let secs: f64 = time_field
        .trim()
        .parse()
        .map_err(|_| corrupt(format!("invalid timestamp '{}'", time_field)))?;
    let time = Timestamp::new(secs).map_err(|e| corrupt(e.to_string()))?;

    if value_fields.is_empty() {
        return Ok(Record::tombstone(time));
    }
    if value_fields.len() != schema.len() {
        return Err(corrupt(format!(
            "expected {} values, found {}",
            schema.len(),
            value_fields.len()
        )));
    }

    let values = value_fields
        .iter()
        .zip(schema.fields())
        .map(|(raw, field)| {
            decode_value(raw, field.column_type).ok_or_else(|| {
                corrupt(format!(
                    "column '{}': '{}' is not a {}",
                    field.name, raw, field.column_type
                ))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Record::live(time, values))
}

fn decode_value(raw: &str, column_type: ColumnType) -> Option<Value> {
    match column_type {
        ColumnType::Float => raw.trim().parse::<f64>().ok().map(Value::Float),
        ColumnType::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
            "true" => Some(Value::Boolean(true)),
            "false" => Some(Value::Boolean(false)),
            _ => None,
        },
        ColumnType::String => Some(Value::String(raw.to_string())),
    }
}

/// Reads typed records from a store or staging file.
///
/// The first line must be the header for the reader's schema. Blank lines
/// are skipped; any other malformed line is an error.
pub struct RecordReader<'s, R> {
    reader: R,
    schema: &'s Schema,
    path: PathBuf,
    line_no: u64,
    buf: String,
}

impl<'s, R: BufRead> RecordReader<'s, R> {
    /// Wraps `reader`, consuming and checking the header line.
    ///
    /// # Errors
    ///
    /// Returns `StampError::HeaderMismatch` if the header does not name
    /// `time` followed by the schema columns in order.
    pub fn new(mut reader: R, schema: &'s Schema, path: &Path) -> Result<Self> {
        let mut header = String::new();
        reader.read_line(&mut header)?;
        let actual: Vec<String> = split_fields(header.trim_end_matches(['\r', '\n']))
            .unwrap_or_default()
            .into_iter()
            .map(|s| s.trim().to_string())
            .collect();
        let expected = schema.header_names();
        if actual != expected {
            return Err(StampError::HeaderMismatch {
                path: path.to_path_buf(),
                expected: expected.join(FIELD_SEPARATOR),
                actual: actual.join(FIELD_SEPARATOR),
            });
        }
        Ok(Self {
            reader,
            schema,
            path: path.to_path_buf(),
            line_no: 1,
            buf: String::new(),
        })
    }

    /// Reads the next record, or `None` at end of file.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            let start_line = self.line_no;
            // A quoted field may carry line breaks; an odd quote count means
            // the record continues on the next line.
            while self.buf.matches('"').count() % 2 == 1 {
                if self.reader.read_line(&mut self.buf)? == 0 {
                    break;
                }
                self.line_no += 1;
            }
            let line = self.buf.strip_suffix('\n').unwrap_or(&self.buf);
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.trim().is_empty() {
                continue;
            }
            let fields = split_fields(line).ok_or_else(|| StampError::CorruptRecord {
                path: self.path.clone(),
                line: start_line,
                reason: "unbalanced quotes".to_string(),
            })?;
            return decode_record(&fields, self.schema, &self.path, start_line).map(Some);
        }
    }
}

impl<R: BufRead> Iterator for RecordReader<'_, R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn schema() -> Schema {
        Schema::new([
            ("temp", ColumnType::Float),
            ("humidity", ColumnType::String),
            ("raining", ColumnType::Boolean),
        ])
        .unwrap()
    }

    fn ts(secs: f64) -> Timestamp {
        Timestamp::new(secs).unwrap()
    }

    #[test]
    fn test_encode_header() {
        assert_eq!(encode_header(&schema()), "time, temp, humidity, raining");
    }

    #[test]
    fn test_encode_live_and_tombstone() {
        let live = Record::live(
            ts(1.5),
            vec![Value::Float(23.5), Value::from("high"), Value::Boolean(true)],
        );
        assert_eq!(encode_record(&live), "1.5, 23.5, high, true");

        let dead = Record::tombstone(ts(1.5));
        assert_eq!(encode_record(&dead), "1.5");
    }

    #[test]
    fn test_encode_quotes_text_when_needed() {
        let record = Record::live(
            ts(0.0),
            vec![
                Value::Float(1.0),
                Value::from("say \"hi\", twice"),
                Value::Boolean(false),
            ],
        );
        assert_eq!(
            encode_record(&record),
            "0, 1, \"say \"\"hi\"\", twice\", false"
        );
    }

    #[test]
    fn test_split_fields() {
        assert_eq!(
            split_fields("0, 1, \"a, \"\"b\"\"\", c").unwrap(),
            vec!["0", "1", "a, \"b\"", "c"]
        );
        assert_eq!(split_fields("5").unwrap(), vec!["5"]);
        assert_eq!(split_fields("5,6").unwrap(), vec!["5", "6"]);
        assert_eq!(split_fields("5, \"\"").unwrap(), vec!["5", ""]);
        assert!(split_fields("5, \"open").is_none());
        assert!(split_fields("5, \"a\"b").is_none());
    }

    #[test]
    fn test_decode_types_by_schema() {
        let schema = schema();
        let fields: Vec<String> = ["2", "24", "true", "TRUE"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let record = decode_record(&fields, &schema, Path::new("db"), 2).unwrap();
        // A string column keeps "true" as text.
        assert_eq!(
            record.values,
            vec![
                Value::Float(24.0),
                Value::from("true"),
                Value::Boolean(true)
            ]
        );
    }

    #[test]
    fn test_decode_rejects_bad_fields() {
        let schema = schema();
        let bad_float: Vec<String> = ["2", "warm", "x", "true"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(matches!(
            decode_record(&bad_float, &schema, Path::new("db"), 7),
            Err(StampError::CorruptRecord { line: 7, .. })
        ));

        let short: Vec<String> = ["2", "1.0"].iter().map(|s| s.to_string()).collect();
        assert!(decode_record(&short, &schema, Path::new("db"), 3).is_err());

        let bad_time: Vec<String> = ["noon"].iter().map(|s| s.to_string()).collect();
        assert!(decode_record(&bad_time, &schema, Path::new("db"), 3).is_err());
    }

    #[test]
    fn test_reader_roundtrip() {
        let schema = schema();
        let records = vec![
            Record::live(
                ts(0.0),
                vec![Value::Float(23.5), Value::from(" padded "), Value::Boolean(false)],
            ),
            Record::tombstone(ts(0.0)),
            Record::live(
                ts(-2.25),
                vec![Value::Float(-0.125), Value::from(""), Value::Boolean(true)],
            ),
        ];

        let mut buf = Vec::new();
        write_header(&mut buf, &schema).unwrap();
        for r in &records {
            write_record(&mut buf, r).unwrap();
        }
        buf.extend_from_slice(b"\n");

        let reader = RecordReader::new(Cursor::new(buf), &schema, Path::new("db")).unwrap();
        let decoded: Vec<Record> = reader.collect::<Result<_>>().unwrap();
        assert_eq!(decoded, records);
    }

    #[test]
    fn test_reader_multiline_text() {
        let schema = schema();
        let record = Record::live(
            ts(1.0),
            vec![Value::Float(1.0), Value::from("two\r\nlines"), Value::Boolean(true)],
        );
        let mut buf = Vec::new();
        write_header(&mut buf, &schema).unwrap();
        write_record(&mut buf, &record).unwrap();
        buf.extend_from_slice(b"2, oops\n");

        let mut reader = RecordReader::new(Cursor::new(buf), &schema, Path::new("db")).unwrap();
        assert_eq!(reader.next_record().unwrap(), Some(record));
        // Line numbers keep counting physical lines.
        assert!(matches!(
            reader.next_record(),
            Err(StampError::CorruptRecord { line: 4, .. })
        ));
    }

    #[test]
    fn test_reader_header_mismatch() {
        let schema = schema();
        let data = "time, temp, humidity\n0, 1, x\n";
        let result = RecordReader::new(Cursor::new(data), &schema, Path::new("db"));
        assert!(matches!(result, Err(StampError::HeaderMismatch { .. })));
    }
}
