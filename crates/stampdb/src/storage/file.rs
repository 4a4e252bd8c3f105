//! Store and staging file I/O.
//!
//! The store file is only ever replaced whole: new content is written to the
//! staging file `<store>.tmp`, synced, and renamed over the store file. A
//! crash therefore leaves either the previous or the new store file, never a
//! mix.
//!
//! Between checkpoints the staging file is a shadow of the store: a byte
//! copy of the store file followed by the pending record lines. That shape
//! lets [`recover_staging`] tell a usable shadow (it starts with the current
//! store bytes) from a stale one.

use crate::codec::{self, Record, RecordReader};
use crate::error::Result;
use crate::schema::Schema;
use crate::storage::SyncMode;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Extension appended to the store path to form the staging path.
pub const STAGING_EXTENSION: &str = "tmp";

/// Returns the staging file path for a store file.
pub fn staging_path(store_path: &Path) -> PathBuf {
    let mut name = store_path.as_os_str().to_os_string();
    name.push(".");
    name.push(STAGING_EXTENSION);
    PathBuf::from(name)
}

/// Syncs `file` according to `mode`.
pub fn sync_file(file: &File, mode: SyncMode) -> Result<()> {
    match mode {
        SyncMode::Fsync => file.sync_all()?,
        SyncMode::Fdatasync => file.sync_data()?,
        SyncMode::None => {}
    }
    Ok(())
}

/// Makes a rename inside the parent directory of `path` durable.
#[cfg(unix)]
fn sync_parent_dir(path: &Path, mode: SyncMode) -> Result<()> {
    if mode == SyncMode::None {
        return Ok(());
    }
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    File::open(parent)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path, _mode: SyncMode) -> Result<()> {
    Ok(())
}

/// Renames the synced staging file over the store file.
fn swap_into_place(staging: &Path, store: &Path, mode: SyncMode) -> Result<()> {
    fs::rename(staging, store)?;
    sync_parent_dir(store, mode)
}

/// Creates a store file holding only the header for `schema`.
pub fn create_store_file(store: &Path, schema: &Schema, mode: SyncMode) -> Result<()> {
    if let Some(parent) = store.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    write_store_atomically(store, schema, &[], mode)?;
    debug!("Created store file {}", store.display());
    Ok(())
}

/// Reads every record of the store file in file order.
pub fn read_records(store: &Path, schema: &Schema) -> Result<Vec<Record>> {
    let file = File::open(store)?;
    let reader = RecordReader::new(BufReader::new(file), schema, store)?;
    reader.collect()
}

/// Replaces the store file with the header plus `records`.
///
/// Used by compaction and store creation.
pub fn write_store_atomically(
    store: &Path,
    schema: &Schema,
    records: &[Record],
    mode: SyncMode,
) -> Result<()> {
    let staging = staging_path(store);
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&staging)?;
    let mut writer = BufWriter::new(file);
    codec::write_header(&mut writer, schema)?;
    for record in records {
        codec::write_record(&mut writer, record)?;
    }
    writer.flush()?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    sync_file(&file, mode)?;
    drop(file);

    swap_into_place(&staging, store, mode)
}

/// Open shadow of the store file that pending records are appended to.
#[derive(Debug)]
pub struct StagingFile {
    path: PathBuf,
    writer: BufWriter<File>,
    lines: usize,
}

impl StagingFile {
    /// Creates the staging file as a copy of `store`, then appends `pending`.
    ///
    /// Any existing staging file is overwritten.
    pub fn create(store: &Path, pending: &[Record]) -> Result<Self> {
        let path = staging_path(store);
        fs::copy(store, &path)?;
        let file = OpenOptions::new().append(true).open(&path)?;
        let mut staging = Self {
            path,
            writer: BufWriter::new(file),
            lines: 0,
        };
        for record in pending {
            staging.append(record)?;
        }
        Ok(staging)
    }

    /// Appends one record line and hands it to the OS.
    pub fn append(&mut self, record: &Record) -> Result<()> {
        codec::write_record(&mut self.writer, record)?;
        self.writer.flush()?;
        self.lines += 1;
        Ok(())
    }

    /// Returns the staging file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Syncs the staging file and renames it over `store`.
    pub fn commit(mut self, store: &Path, mode: SyncMode) -> Result<usize> {
        self.writer.flush()?;
        let file = self.writer.into_inner().map_err(|e| e.into_error())?;
        sync_file(&file, mode)?;
        drop(file);
        swap_into_place(&self.path, store, mode)?;
        Ok(self.lines)
    }
}

/// Outcome of looking for a staging file left behind by a crash.
#[derive(Debug, PartialEq)]
pub enum StagingRecovery {
    /// No staging file existed.
    Absent,
    /// A staging file existed but could not be trusted and was removed.
    Discarded,
    /// Uncommitted records were read back; the staging file was removed.
    Recovered(Vec<Record>),
}

/// Inspects a staging file left behind by an unclean shutdown.
///
/// The file is usable only if it starts with the exact bytes of the store
/// file. The records after that prefix are decoded in order; a final line
/// without a newline is a torn write and is dropped, and decoding stops at
/// the first record that fails, keeping the ones before it. With
/// `recover == false` the file is always discarded. The staging file is
/// removed in every case.
pub fn recover_staging(store: &Path, schema: &Schema, recover: bool) -> Result<StagingRecovery> {
    let staging = staging_path(store);
    if !staging.exists() {
        return Ok(StagingRecovery::Absent);
    }

    let outcome = if recover {
        match decode_staging_tail(store, &staging, schema) {
            Ok(Some(records)) => StagingRecovery::Recovered(records),
            Ok(None) => {
                warn!(
                    "Staging file {} does not extend the store file; discarding it",
                    staging.display()
                );
                StagingRecovery::Discarded
            }
            Err(e) => {
                warn!(
                    "Staging file {} is unreadable; discarding it: {}",
                    staging.display(),
                    e
                );
                StagingRecovery::Discarded
            }
        }
    } else {
        warn!("Discarding staging file {}", staging.display());
        StagingRecovery::Discarded
    };

    fs::remove_file(&staging)?;
    Ok(outcome)
}

fn decode_staging_tail(store: &Path, staging: &Path, schema: &Schema) -> Result<Option<Vec<Record>>> {
    let store_bytes = if store.exists() {
        fs::read(store)?
    } else {
        return Ok(None);
    };
    let staging_bytes = fs::read(staging)?;
    let Some(tail) = staging_bytes.strip_prefix(store_bytes.as_slice()) else {
        return Ok(None);
    };

    let complete = tail
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |i| i + 1);
    if complete < tail.len() {
        debug!(
            "Dropping {} trailing bytes of a torn line in {}",
            tail.len() - complete,
            staging.display()
        );
    }

    // Re-read the store header so the codec checks the tail with the same
    // schema and line numbering as a full file.
    let header_len = store_bytes
        .iter()
        .position(|&b| b == b'\n')
        .map_or(store_bytes.len(), |i| i + 1);
    let mut framed = store_bytes[..header_len].to_vec();
    framed.extend_from_slice(&tail[..complete]);

    // Replay stops at the first record that does not decode; a torn record
    // can still end in a newline when its quoted text holds a line break.
    let mut reader = RecordReader::new(Cursor::new(framed), schema, staging)?;
    let mut records = Vec::new();
    loop {
        match reader.next_record() {
            Ok(Some(record)) => records.push(record),
            Ok(None) => break,
            Err(e) => {
                warn!(
                    "Stopping replay of {} after {} records: {}",
                    staging.display(),
                    records.len(),
                    e
                );
                break;
            }
        }
    }
    Ok(Some(records))
}
