//! # LedgerDB: Persistent Storage Engine
//!
//! Persistence for the host ledger, built on sled's embedded key-value
//! store. Two trees:
//!
//! | Tree       | Key              | Value                  |
//! |------------|------------------|------------------------|
//! | `events`   | `seq` (8B BE)    | `bincode(EventRecord)` |
//! | `metadata` | key (UTF-8)      | value (bytes)          |
//!
//! Sequence numbers are stored big-endian so sled's lexicographic order is
//! journal order and range scans "since seq N" work naturally.
//!
//! ## Atomicity
//!
//! [`LedgerDB::commit`] writes the new journal records and the state
//! snapshot in one multi-tree sled transaction. Either the snapshot and the
//! events that produced it land together, or neither does.

use serde::{de::DeserializeOwned, Serialize};
use sled::transaction::{TransactionError, Transactional};
use sled::{Db, Tree};
use std::path::Path;

use crate::events::{EventJournal, EventRecord, JournalError};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("journal integrity error: {0}")]
    Journal(#[from] JournalError),

    #[error("storage transaction aborted")]
    Aborted,
}

pub type DbResult<T> = Result<T, DbError>;

// ---------------------------------------------------------------------------
// Metadata Keys
// ---------------------------------------------------------------------------

/// Latest bincode-encoded state snapshot.
const META_SNAPSHOT: &[u8] = b"state_snapshot";

/// Number of journal records the snapshot reflects (8B BE).
const META_SNAPSHOT_SEQ: &[u8] = b"state_snapshot_seq";

// ---------------------------------------------------------------------------
// LedgerDB
// ---------------------------------------------------------------------------

/// Persistent storage for the event journal and ledger snapshots.
///
/// Cheap to clone; sled handles are reference counted and thread-safe.
#[derive(Debug, Clone)]
pub struct LedgerDB {
    db: Db,
    events: Tree,
    metadata: Tree,
}

impl LedgerDB {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database that is removed when dropped.
    ///
    /// Used by tests.
    pub fn open_temporary() -> DbResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let events = db.open_tree("events")?;
        let metadata = db.open_tree("metadata")?;
        Ok(Self {
            db,
            events,
            metadata,
        })
    }

    // -- Commit -------------------------------------------------------------

    /// Atomically persist new journal records together with the snapshot
    /// of the state they produced.
    ///
    /// `records` must continue the persisted journal: the first record's
    /// `seq` equals [`event_count`](Self::event_count).
    pub fn commit<S: Serialize>(&self, records: &[EventRecord], snapshot: &S) -> DbResult<()> {
        let mut encoded = Vec::with_capacity(records.len());
        for record in records {
            let bytes = bincode::serialize(record)
                .map_err(|e| DbError::Serialization(e.to_string()))?;
            encoded.push((record.seq.to_be_bytes(), bytes));
        }
        let snapshot_bytes =
            bincode::serialize(snapshot).map_err(|e| DbError::Serialization(e.to_string()))?;
        let snapshot_seq = records
            .last()
            .map(|r| r.seq + 1)
            .unwrap_or(self.event_count() as u64);

        let result: Result<(), TransactionError<()>> = (&self.events, &self.metadata)
            .transaction(|(events, metadata)| {
                for (key, value) in &encoded {
                    events.insert(&key[..], value.as_slice())?;
                }
                metadata.insert(META_SNAPSHOT, snapshot_bytes.as_slice())?;
                metadata.insert(META_SNAPSHOT_SEQ, &snapshot_seq.to_be_bytes()[..])?;
                Ok(())
            });
        result.map_err(|e| match e {
            TransactionError::Storage(e) => DbError::Sled(e),
            TransactionError::Abort(()) => DbError::Aborted,
        })?;

        self.db.flush()?;
        tracing::debug!(records = records.len(), snapshot_seq, "ledger state committed");
        Ok(())
    }

    // -- Reads --------------------------------------------------------------

    /// Load the latest snapshot, if one was ever committed.
    pub fn load_snapshot<S: DeserializeOwned>(&self) -> DbResult<Option<S>> {
        match self.metadata.get(META_SNAPSHOT)? {
            Some(bytes) => {
                let state = bincode::deserialize(&bytes)
                    .map_err(|e| DbError::Serialization(e.to_string()))?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    /// Number of journal records reflected by the stored snapshot.
    pub fn snapshot_seq(&self) -> DbResult<Option<u64>> {
        match self.metadata.get(META_SNAPSHOT_SEQ)? {
            Some(bytes) => {
                let seq = u64::from_be_bytes(
                    bytes
                        .as_ref()
                        .try_into()
                        .map_err(|_| DbError::Serialization("invalid seq bytes".to_string()))?,
                );
                Ok(Some(seq))
            }
            None => Ok(None),
        }
    }

    /// Records with `seq >= from`, oldest first.
    pub fn events_since(&self, from: u64) -> DbResult<Vec<EventRecord>> {
        let mut records = Vec::new();
        for result in self.events.range(from.to_be_bytes()..) {
            let (_key, value) = result?;
            let record: EventRecord = bincode::deserialize(&value)
                .map_err(|e| DbError::Serialization(e.to_string()))?;
            records.push(record);
        }
        Ok(records)
    }

    /// Load and verify the full journal.
    pub fn load_journal(&self) -> DbResult<EventJournal> {
        let records = self.events_since(0)?;
        Ok(EventJournal::from_records(records)?)
    }

    /// Number of persisted journal records.
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Force a flush of all pending writes to disk.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
