// Copyright (c) 2026 Taconomics. MIT License.
// See LICENSE for details.

//! # Taconomics Protocol: Host Ledger Primitives
//!
//! Everything the Taconomics contracts need from the ledger they run on,
//! and nothing more. The contracts themselves live in `taconomics-contracts`;
//! this crate supplies the ground they stand on:
//!
//! - **auth**: Ed25519 call signing; a caller is whoever holds the key.
//! - **config**: Protocol constants: supply, sale rounds, crunch bounds.
//! - **types**: `Address`, `Amount`, `Timestamp` and their wire encodings.
//! - **clock**: The host's monotonic clock, real or hand-cranked.
//! - **events**: Ledger events and the hash-chained, append-only journal.
//! - **storage**: sled persistence for the journal and state snapshots.
//!
//! ## Design Philosophy
//!
//! 1. The ledger is serialized. Ordering is the host's job, not ours.
//! 2. Amounts are `u128` and every arithmetic step is checked.
//! 3. What happened is recorded before anyone gets to read about it.

pub mod auth;
pub mod clock;
pub mod config;
pub mod events;
pub mod storage;
pub mod types;

pub use auth::{CallSignature, CallerKey};
pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{EventJournal, EventRecord, LedgerEvent};
pub use types::{Address, Amount, Timestamp};
