//! Append-only storage engine.
//!
//! A [`Store`] owns one store file, its sidecar schema and an in-memory
//! [`RecordLog`]. Writes never modify existing lines: appends, updates and
//! deletes all add a record, and the newest record per timestamp decides what
//! reads return.
//!
//! # Write path
//!
//! ```text
//! append/update/delete → staging file line → RecordLog push
//!                         (every `checkpoint_threshold` records)
//!                       → checkpoint: sync staging, rename over store file
//! ```
//!
//! Until a checkpoint the store file is untouched; a crash loses at most the
//! records since the last checkpoint, and the next [`Store::open`] can replay
//! them from the staging file.

pub mod file;
pub mod log;

use crate::codec::Record;
use crate::error::{Result, StampError};
use crate::point::{Point, Timestamp, Value};
use crate::schema::{sidecar_path, Schema};
use crate::table::Table;
use self::file::{StagingFile, StagingRecovery};
use self::log::RecordLog;
use std::fs;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default number of records buffered before an automatic checkpoint.
pub const DEFAULT_CHECKPOINT_THRESHOLD: usize = 10;

/// Sync mode for staging and store file writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Fsync before every rename (default, highest durability).
    #[default]
    Fsync,
    /// Use fdatasync (skip metadata update, faster).
    Fdatasync,
    /// No sync (fastest, lowest durability - for testing only).
    None,
}

/// Configuration for a [`Store`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Pending records that trigger an automatic checkpoint (at least 1).
    pub checkpoint_threshold: usize,
    /// How staging and store files are synced.
    pub sync_mode: SyncMode,
    /// Replay a staging file left by a crash instead of discarding it.
    pub recover_staging: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            checkpoint_threshold: DEFAULT_CHECKPOINT_THRESHOLD,
            sync_mode: SyncMode::default(),
            recover_staging: true,
        }
    }
}

impl StoreOptions {
    /// Creates options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the checkpoint threshold; values below 1 are raised to 1.
    pub fn with_checkpoint_threshold(mut self, threshold: usize) -> Self {
        self.checkpoint_threshold = threshold.max(1);
        self
    }

    /// Sets the sync mode.
    pub fn with_sync_mode(mut self, sync_mode: SyncMode) -> Self {
        self.sync_mode = sync_mode;
        self
    }

    /// Enables or disables staging file recovery on open.
    pub fn with_recover_staging(mut self, recover: bool) -> Self {
        self.recover_staging = recover;
        self
    }
}

/// An open time-series store.
///
/// Dropping a store without calling [`Store::close`] still checkpoints
/// pending records, but errors can then only be logged.
#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    schema: Schema,
    options: StoreOptions,
    log: RecordLog,
    staging: Option<StagingFile>,
    schema_persisted: bool,
    closed: bool,
}

impl Store {
    /// Opens the store at `path`, creating it if it does not exist.
    ///
    /// The schema comes from the sidecar `<path>.schema` when present;
    /// otherwise `schema` is required.
    ///
    /// # Errors
    ///
    /// - `StampError::MissingSchema` if there is neither a sidecar nor a
    ///   supplied schema
    /// - `StampError::SchemaMismatch` if the supplied schema differs from the
    ///   sidecar
    /// - `StampError::HeaderMismatch` / `StampError::CorruptRecord` if the
    ///   store file does not decode under the schema
    pub fn open(
        path: impl AsRef<Path>,
        schema: Option<Schema>,
        options: StoreOptions,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (schema, schema_persisted) = Schema::resolve(&sidecar_path(&path), schema)?;

        let recovery = file::recover_staging(&path, &schema, options.recover_staging)?;
        if !path.exists() {
            file::create_store_file(&path, &schema, options.sync_mode)?;
        }
        let records = file::read_records(&path, &schema)?;
        debug!(
            "Opened store {} with {} records",
            path.display(),
            records.len()
        );

        let mut store = Self {
            path,
            schema,
            options: StoreOptions {
                checkpoint_threshold: options.checkpoint_threshold.max(1),
                ..options
            },
            log: RecordLog::from_persisted(records),
            staging: None,
            schema_persisted,
            closed: false,
        };

        if let StagingRecovery::Recovered(recovered) = recovery {
            if !recovered.is_empty() {
                info!(
                    "Recovered {} uncommitted records for {}",
                    recovered.len(),
                    store.path.display()
                );
                for record in recovered {
                    store.log.push(record);
                }
                store.checkpoint()?;
            }
        }
        Ok(store)
    }

    /// Creates or opens the store at `path` with `schema` and default options.
    pub fn create(path: impl AsRef<Path>, schema: Schema) -> Result<Self> {
        Self::open(path, Some(schema), StoreOptions::default())
    }

    /// Opens an existing store using its sidecar schema and default options.
    pub fn open_existing(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(path, None, StoreOptions::default())
    }

    /// Returns the store file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the store schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns the store options.
    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Appends a point.
    ///
    /// Duplicate timestamps are accepted; the newest record wins on read.
    ///
    /// # Errors
    ///
    /// - `StampError::InvalidTimestamp` if `point.time` is not finite
    /// - `StampError::ArityMismatch` / `StampError::SchemaViolation` if the
    ///   values do not fit the schema
    /// - an I/O error from the automatic checkpoint this write triggered; the
    ///   point is applied and visible all the same, and stays pending until a
    ///   later checkpoint succeeds
    pub fn append(&mut self, point: &Point) -> Result<()> {
        let time = point.timestamp()?;
        let conformed = self.schema.conform(point)?;
        self.push(Record::live(time, conformed.values))
    }

    /// Replaces the row at `point.time`, or inserts it.
    ///
    /// Same validation as [`Store::append`].
    pub fn update(&mut self, point: &Point) -> Result<()> {
        self.append(point)
    }

    /// Hides the row at `time`.
    ///
    /// Returns false, and records nothing, if no row is visible at `time`.
    /// A failed automatic checkpoint is reported as for [`Store::append`]:
    /// the row is hidden even though an error is returned.
    pub fn delete(&mut self, time: f64) -> Result<bool> {
        let time = Timestamp::new(time)?;
        if !self.log.is_visible(time) {
            return Ok(false);
        }
        self.push(Record::tombstone(time))?;
        Ok(true)
    }

    fn push(&mut self, record: Record) -> Result<()> {
        if let Err(e) = self.stage(&record) {
            self.discard_staging();
            return Err(e);
        }
        self.log.push(record);
        if self.log.pending_count() >= self.options.checkpoint_threshold {
            if let Err(e) = self.checkpoint() {
                warn!(
                    "Automatic checkpoint of {} failed, {} records stay pending: {}",
                    self.path.display(),
                    self.log.pending_count(),
                    e
                );
                return Err(e);
            }
        }
        Ok(())
    }

    fn stage(&mut self, record: &Record) -> Result<()> {
        let staging = match self.staging.take() {
            Some(staging) => staging,
            None => StagingFile::create(&self.path, self.log.pending())?,
        };
        self.staging.insert(staging).append(record)
    }

    fn discard_staging(&mut self) {
        self.staging = None;
        let path = file::staging_path(&self.path);
        if path.exists() {
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to remove staging file {}: {}", path.display(), e);
            }
        }
    }

    /// Returns the row at `time`, or an empty table.
    pub fn read(&self, time: f64) -> Result<Table> {
        let time = Timestamp::new(time)?;
        Ok(self.table_from(self.log.get(time)))
    }

    /// Returns the rows with `start <= time <= end`, ascending.
    ///
    /// Infinite bounds are open ends, so `read_range(f64::NEG_INFINITY,
    /// f64::INFINITY)` returns every row. An inverted range yields an empty
    /// table.
    ///
    /// # Errors
    ///
    /// Returns `StampError::InvalidTimestamp` if either bound is NaN.
    pub fn read_range(&self, start: f64, end: f64) -> Result<Table> {
        for bound in [start, end] {
            if bound.is_nan() {
                return Err(StampError::InvalidTimestamp(bound));
            }
        }
        if start > end || start == f64::INFINITY || end == f64::NEG_INFINITY {
            return Ok(Table::empty(&self.schema));
        }
        let lower = range_bound(start)?;
        let upper = range_bound(end)?;
        Ok(self.table_from(self.log.live_range((lower, upper))))
    }

    /// Returns every visible row, ascending.
    pub fn read_all(&self) -> Table {
        self.table_from(self.log.live_records())
    }

    /// Returns the smallest visible timestamp.
    ///
    /// # Errors
    ///
    /// Returns `StampError::EmptyStore` if no row is visible.
    pub fn first_time(&self) -> Result<f64> {
        self.log
            .first_live()
            .map(Timestamp::as_secs)
            .ok_or(StampError::EmptyStore)
    }

    /// Returns the largest visible timestamp.
    ///
    /// # Errors
    ///
    /// Returns `StampError::EmptyStore` if no row is visible.
    pub fn last_time(&self) -> Result<f64> {
        self.log
            .last_live()
            .map(Timestamp::as_secs)
            .ok_or(StampError::EmptyStore)
    }

    /// Returns the number of visible rows.
    pub fn len(&self) -> usize {
        self.log.live_count()
    }

    /// Returns true if no row is visible.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of records held, including superseded ones and
    /// tombstones.
    pub fn record_count(&self) -> usize {
        self.log.record_count()
    }

    /// Returns the number of records not yet in the store file.
    pub fn pending_count(&self) -> usize {
        self.log.pending_count()
    }

    fn table_from<'a>(&self, records: impl IntoIterator<Item = &'a Record>) -> Table {
        let rows = records
            .into_iter()
            .map(|r| {
                std::iter::once(Value::Float(r.time.as_secs()))
                    .chain(r.values.iter().cloned())
                    .collect()
            })
            .collect();
        Table::new(Table::store_fields(&self.schema), rows)
    }

    /// Rewrites the store file with only the visible rows and returns them.
    ///
    /// Superseded records and tombstones are dropped. Pending records are
    /// folded in, so nothing is pending afterwards.
    pub fn compact(&mut self) -> Result<Table> {
        // The rewrite goes through the staging path.
        self.staging = None;
        let before = self.log.record_count();
        let live = self.log.reconciled();
        file::write_store_atomically(&self.path, &self.schema, &live, self.options.sync_mode)?;
        let table = self.table_from(&live);
        self.log.replace_with_compacted(live);
        debug!(
            "Compacted {}: {} records -> {} rows",
            self.path.display(),
            before,
            table.len()
        );
        Ok(table)
    }

    /// Moves pending records into the store file.
    ///
    /// Returns false if nothing was pending.
    pub fn checkpoint(&mut self) -> Result<bool> {
        if self.log.pending_count() == 0 {
            return Ok(false);
        }
        let staging = match self.staging.take() {
            Some(staging) => staging,
            None => StagingFile::create(&self.path, self.log.pending())?,
        };
        let lines = staging.commit(&self.path, self.options.sync_mode)?;
        self.log.mark_persisted();
        debug!("Checkpointed {} records into {}", lines, self.path.display());
        Ok(true)
    }

    /// Returns the automatic checkpoint threshold.
    pub fn checkpoint_threshold(&self) -> usize {
        self.options.checkpoint_threshold
    }

    /// Sets the automatic checkpoint threshold; values below 1 are raised
    /// to 1. Takes effect on the next write.
    pub fn set_checkpoint_threshold(&mut self, threshold: usize) {
        self.options.checkpoint_threshold = threshold.max(1);
    }

    /// Checkpoints pending records, persists the sidecar schema and closes
    /// the store.
    pub fn close(mut self) -> Result<()> {
        self.finish()?;
        self.closed = true;
        debug!("Closed store {}", self.path.display());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.checkpoint()?;
        if !self.schema_persisted {
            self.schema.persist(&sidecar_path(&self.path))?;
            self.schema_persisted = true;
        }
        Ok(())
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.finish() {
            warn!(
                "Failed to checkpoint store {} on drop: {}",
                self.path.display(),
                e
            );
        }
    }
}

/// Maps a range end to a timestamp bound; an infinite end is open.
fn range_bound(secs: f64) -> Result<Bound<Timestamp>> {
    if secs.is_infinite() {
        Ok(Bound::Unbounded)
    } else {
        Timestamp::new(secs).map(Bound::Included)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;
    use tempfile::TempDir;

    fn schema() -> Schema {
        Schema::new([("temp", ColumnType::Float)]).unwrap()
    }

    fn options(threshold: usize) -> StoreOptions {
        StoreOptions::new()
            .with_checkpoint_threshold(threshold)
            .with_sync_mode(SyncMode::None)
    }

    fn point(time: f64, temp: f64) -> Point {
        Point::new(time, vec![Value::Float(temp)])
    }

    #[test]
    fn test_options_defaults_and_clamp() {
        let opts = StoreOptions::default();
        assert_eq!(opts.checkpoint_threshold, DEFAULT_CHECKPOINT_THRESHOLD);
        assert_eq!(opts.sync_mode, SyncMode::Fsync);
        assert!(opts.recover_staging);

        assert_eq!(StoreOptions::new().with_checkpoint_threshold(0).checkpoint_threshold, 1);
    }

    #[test]
    fn test_threshold_triggers_checkpoint() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("db.csv");
        let mut store = Store::open(&path, Some(schema()), options(3)).unwrap();

        store.append(&point(0.0, 1.0)).unwrap();
        store.append(&point(1.0, 2.0)).unwrap();
        assert_eq!(store.pending_count(), 2);
        assert!(file::staging_path(&path).exists());
        assert_eq!(fs::read_to_string(&path).unwrap(), "time, temp\n");

        store.append(&point(2.0, 3.0)).unwrap();
        assert_eq!(store.pending_count(), 0);
        assert!(!file::staging_path(&path).exists());
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "time, temp\n0, 1\n1, 2\n2, 3\n"
        );
    }

    #[test]
    fn test_checkpoint_without_pending_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("db.csv");
        let mut store = Store::open(&path, Some(schema()), options(10)).unwrap();
        assert!(!store.checkpoint().unwrap());

        store.append(&point(0.0, 1.0)).unwrap();
        assert!(store.checkpoint().unwrap());
        assert!(!store.checkpoint().unwrap());
    }

    #[test]
    fn test_set_checkpoint_threshold_clamps() {
        let temp_dir = TempDir::new().unwrap();
        let mut store =
            Store::open(temp_dir.path().join("db.csv"), Some(schema()), options(10)).unwrap();
        store.set_checkpoint_threshold(0);
        assert_eq!(store.checkpoint_threshold(), 1);

        store.append(&point(0.0, 1.0)).unwrap();
        assert_eq!(store.pending_count(), 0);
    }

    #[test]
    fn test_failed_auto_checkpoint_keeps_write_pending() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("db.csv");
        let mut store = Store::open(&path, Some(schema()), options(2)).unwrap();

        store.append(&point(0.0, 1.0)).unwrap();
        // Losing the staging file makes the rename in the next checkpoint fail.
        fs::remove_file(file::staging_path(&path)).unwrap();
        assert!(matches!(
            store.append(&point(1.0, 2.0)),
            Err(StampError::Io(_))
        ));

        assert_eq!(store.read(1.0).unwrap().len(), 1);
        assert_eq!(store.pending_count(), 2);
        assert_eq!(fs::read_to_string(&path).unwrap(), "time, temp\n");

        assert!(store.checkpoint().unwrap());
        assert_eq!(store.pending_count(), 0);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "time, temp\n0, 1\n1, 2\n"
        );
    }

    #[test]
    fn test_read_range_with_infinite_bounds() {
        let temp_dir = TempDir::new().unwrap();
        let mut store =
            Store::open(temp_dir.path().join("db.csv"), Some(schema()), options(10)).unwrap();
        store.append(&point(-5.0, 1.0)).unwrap();
        store.append(&point(5.0, 2.0)).unwrap();

        assert_eq!(store.read_range(f64::NEG_INFINITY, f64::INFINITY).unwrap().len(), 2);
        assert_eq!(store.read_range(f64::NEG_INFINITY, 0.0).unwrap().len(), 1);
        assert_eq!(store.read_range(0.0, f64::INFINITY).unwrap().len(), 1);
        assert!(store.read_range(f64::INFINITY, f64::INFINITY).unwrap().is_empty());
        assert!(store
            .read_range(f64::NEG_INFINITY, f64::NEG_INFINITY)
            .unwrap()
            .is_empty());
        assert!(matches!(
            store.read_range(f64::NAN, 1.0),
            Err(StampError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_delete_of_invisible_time_records_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let mut store =
            Store::open(temp_dir.path().join("db.csv"), Some(schema()), options(10)).unwrap();
        assert!(!store.delete(5.0).unwrap());
        assert_eq!(store.record_count(), 0);

        store.append(&point(5.0, 1.0)).unwrap();
        assert!(store.delete(5.0).unwrap());
        assert!(!store.delete(5.0).unwrap());
        assert_eq!(store.record_count(), 2);
    }

    #[test]
    fn test_rejected_point_leaves_store_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let mut store =
            Store::open(temp_dir.path().join("db.csv"), Some(schema()), options(10)).unwrap();

        let err = store
            .append(&Point::new(0.0, vec![Value::from("warm")]))
            .unwrap_err();
        assert!(matches!(err, StampError::SchemaViolation { .. }));
        let err = store.append(&point(f64::NAN, 1.0)).unwrap_err();
        assert!(matches!(err, StampError::InvalidTimestamp(_)));
        assert_eq!(store.record_count(), 0);
    }

    #[test]
    fn test_integer_values_are_widened() {
        let temp_dir = TempDir::new().unwrap();
        let mut store =
            Store::open(temp_dir.path().join("db.csv"), Some(schema()), options(10)).unwrap();
        store.append(&Point::new(0.0, vec![Value::Integer(21)])).unwrap();

        let table = store.read(0.0).unwrap();
        assert_eq!(table.value(0, "temp"), Some(&Value::Float(21.0)));
    }

    #[test]
    fn test_drop_checkpoints_and_persists_schema() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("db.csv");
        {
            let mut store = Store::open(&path, Some(schema()), options(10)).unwrap();
            store.append(&point(0.0, 1.0)).unwrap();
        }
        assert!(sidecar_path(&path).exists());
        assert!(!file::staging_path(&path).exists());

        let store = Store::open(&path, None, options(10)).unwrap();
        assert_eq!(store.len(), 1);
    }
}
