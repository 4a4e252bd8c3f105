//! RecordLog - in-memory arena of every record a store has seen.
//!
//! Records are kept in append order: everything already in the store file
//! first, then the pending records buffered since the last checkpoint. A
//! `BTreeMap` from timestamp to the arena index of the newest record at that
//! timestamp gives reconciled, time-ordered reads without rescanning the
//! arena.
//!
//! ```text
//! arena:  [t0 live] [t1 live] [t0 live'] [t1 tomb] | [t2 live]   <- pending
//! latest: t0 -> 2, t1 -> 3, t2 -> 4
//! reads:  t0 = live', t2 = live
//! ```
//!
//! Compaction is the arena's garbage collection: it keeps only the records
//! `latest` points at that are live.

use crate::codec::Record;
use crate::point::Timestamp;
use std::collections::BTreeMap;
use std::ops::RangeBounds;

/// Append-ordered record arena with a newest-record index.
#[derive(Debug, Default)]
pub struct RecordLog {
    /// Every record in append order.
    records: Vec<Record>,
    /// Newest record index per timestamp.
    latest: BTreeMap<Timestamp, usize>,
    /// Records before this index are in the store file.
    persisted: usize,
    /// Number of timestamps whose newest record is live.
    live: usize,
}

impl RecordLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a log from records already in the store file.
    pub fn from_persisted(records: Vec<Record>) -> Self {
        let mut log = Self::new();
        for record in records {
            log.push(record);
        }
        log.persisted = log.records.len();
        log
    }

    /// Appends a record; it overrides every earlier record at its timestamp.
    pub fn push(&mut self, record: Record) {
        let index = self.records.len();
        let is_live = record.is_live();
        let previous = self.latest.insert(record.time, index);
        let was_live = previous.is_some_and(|i| self.records[i].is_live());
        match (was_live, is_live) {
            (false, true) => self.live += 1,
            (true, false) => self.live -= 1,
            _ => {}
        }
        self.records.push(record);
    }

    /// Returns the records not yet written to the store file.
    pub fn pending(&self) -> &[Record] {
        &self.records[self.persisted..]
    }

    /// Returns the number of pending records.
    pub fn pending_count(&self) -> usize {
        self.records.len() - self.persisted
    }

    /// Marks every record as written to the store file.
    pub fn mark_persisted(&mut self) {
        self.persisted = self.records.len();
    }

    /// Returns the total number of records, including superseded ones.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Returns the number of visible timestamps.
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Returns the newest live record at `time`.
    pub fn get(&self, time: Timestamp) -> Option<&Record> {
        self.latest
            .get(&time)
            .map(|&i| &self.records[i])
            .filter(|r| r.is_live())
    }

    /// Returns true if `time` currently has a live record.
    pub fn is_visible(&self, time: Timestamp) -> bool {
        self.get(time).is_some()
    }

    /// Iterates the newest live record of every timestamp in `range`,
    /// ascending.
    pub fn live_range<R>(&self, range: R) -> impl Iterator<Item = &Record>
    where
        R: RangeBounds<Timestamp>,
    {
        self.latest
            .range(range)
            .map(move |(_, &i)| &self.records[i])
            .filter(|r| r.is_live())
    }

    /// Iterates the newest live record of every timestamp, ascending.
    pub fn live_records(&self) -> impl Iterator<Item = &Record> {
        self.latest
            .values()
            .map(move |&i| &self.records[i])
            .filter(|r| r.is_live())
    }

    /// Returns the smallest live timestamp.
    pub fn first_live(&self) -> Option<Timestamp> {
        self.live_records().next().map(|r| r.time)
    }

    /// Returns the largest live timestamp.
    pub fn last_live(&self) -> Option<Timestamp> {
        self.latest
            .values()
            .rev()
            .map(|&i| &self.records[i])
            .find(|r| r.is_live())
            .map(|r| r.time)
    }

    /// Returns the reconciled live records, ascending, without changing the
    /// log.
    pub fn reconciled(&self) -> Vec<Record> {
        self.live_records().cloned().collect()
    }

    /// Replaces the arena with exactly `live`, all marked persisted.
    ///
    /// `live` must be the output of [`RecordLog::reconciled`] once it has
    /// been written to the store file.
    pub fn replace_with_compacted(&mut self, live: Vec<Record>) {
        *self = Self::from_persisted(live);
    }
}
