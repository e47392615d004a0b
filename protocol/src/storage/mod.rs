//! # Storage Module
//!
//! Persistence for the host ledger. The journal is the source of history;
//! the snapshot is the source of current state. Both are committed in a
//! single sled transaction so a restart never sees one without the other.
//!
//! ```text
//! call → contracts → EventJournal ─┐
//!              │                    ├─► LedgerDB::commit (events + snapshot)
//!              └──── state ─────────┘
//! ```
//!
//! Bincode on disk, JSON on the wire.

pub mod db;

pub use db::{DbError, DbResult, LedgerDB};
