//! # Ledger Events & the Event Journal
//!
//! Every committed state change on the ledger produces one or more
//! [`LedgerEvent`]s. The host appends them to an [`EventJournal`]: an
//! append-only, hash-chained log where record `n` commits to record `n-1`.
//!
//! ```text
//! hash(n) = BLAKE3( hash(n-1) || seq BE || timestamp BE || bincode(event) )
//! ```
//!
//! The genesis `prev_hash` is all zeroes. Rewriting any record breaks every
//! hash after it, which [`EventJournal::verify`] reports.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{amount_string, Address, Amount, Timestamp};

/// A 32-byte BLAKE3 digest.
pub type Hash = [u8; 32];

/// The all-zero hash that precedes the first record.
pub const GENESIS_HASH: Hash = [0u8; 32];

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Something that happened on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEvent {
    /// Tokens moved between two accounts.
    Transfer {
        from: Address,
        to: Address,
        #[serde(with = "amount_string")]
        amount: Amount,
    },
    /// The reserve was crunched. `amount` left the reserve, `reward` went
    /// to the caller and `burned` left the supply.
    PoolCrunched {
        caller: Address,
        #[serde(with = "amount_string")]
        amount: Amount,
        #[serde(with = "amount_string")]
        reward: Amount,
        #[serde(with = "amount_string")]
        burned: Amount,
    },
    /// The owner handed the pauser role to a new account.
    PauserChanged {
        previous: Address,
        pauser: Address,
    },
    /// The pauser unpaused the token and its role was burned.
    Unpaused { by: Address },
    /// Contract ownership moved.
    OwnershipTransferred {
        contract: String,
        previous: Address,
        owner: Address,
    },
    /// The liquidity reserve account was fixed.
    ReserveSet { reserve: Address },
    /// A crunch parameter changed.
    ParameterUpdated { name: String, value: u64 },
    /// Accounts were added to the Cooks allow-list.
    CooksListUpdated { added: Vec<Address> },
    /// Value was converted into tokens by the sale.
    TokensPurchased {
        buyer: Address,
        round: String,
        #[serde(with = "amount_string")]
        value: Amount,
        #[serde(with = "amount_string")]
        tokens: Amount,
    },
    /// Value beyond a cap was handed back to the sender.
    ValueRefunded {
        to: Address,
        #[serde(with = "amount_string")]
        amount: Amount,
    },
    /// Value was deposited without buying anything.
    ValueDeposited {
        from: Address,
        #[serde(with = "amount_string")]
        amount: Amount,
    },
    /// Raised value and tokens were sent to the reserve and locked.
    LiquidityLocked {
        reserve: Address,
        #[serde(with = "amount_string")]
        value: Amount,
        #[serde(with = "amount_string")]
        tokens: Amount,
    },
    /// A social proof field was updated.
    SocialProofUpdated { field: String, value: String },
}

impl LedgerEvent {
    /// Short, stable name used in logs and metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::Transfer { .. } => "transfer",
            LedgerEvent::PoolCrunched { .. } => "pool_crunched",
            LedgerEvent::PauserChanged { .. } => "pauser_changed",
            LedgerEvent::Unpaused { .. } => "unpaused",
            LedgerEvent::OwnershipTransferred { .. } => "ownership_transferred",
            LedgerEvent::ReserveSet { .. } => "reserve_set",
            LedgerEvent::ParameterUpdated { .. } => "parameter_updated",
            LedgerEvent::CooksListUpdated { .. } => "cooks_list_updated",
            LedgerEvent::TokensPurchased { .. } => "tokens_purchased",
            LedgerEvent::ValueRefunded { .. } => "value_refunded",
            LedgerEvent::ValueDeposited { .. } => "value_deposited",
            LedgerEvent::LiquidityLocked { .. } => "liquidity_locked",
            LedgerEvent::SocialProofUpdated { .. } => "social_proof_updated",
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One entry in the journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Position in the journal, starting at 0.
    pub seq: u64,
    /// Host time of the call that produced the event.
    pub timestamp: Timestamp,
    /// The event itself.
    pub event: LedgerEvent,
    /// Hash of the previous record ([`GENESIS_HASH`] for the first).
    pub prev_hash: Hash,
    /// Hash of this record.
    pub hash: Hash,
}

impl EventRecord {
    fn seal(
        seq: u64,
        timestamp: Timestamp,
        event: LedgerEvent,
        prev_hash: Hash,
    ) -> Result<Self, JournalError> {
        let hash = record_hash(&prev_hash, seq, timestamp, &event)?;
        Ok(Self {
            seq,
            timestamp,
            event,
            prev_hash,
            hash,
        })
    }

    /// Hex-encoded record hash.
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

fn record_hash(
    prev: &Hash,
    seq: u64,
    timestamp: Timestamp,
    event: &LedgerEvent,
) -> Result<Hash, JournalError> {
    let encoded = bincode::serialize(event).map_err(|e| JournalError::Encoding {
        seq,
        reason: e.to_string(),
    })?;
    let mut hasher = blake3::Hasher::new();
    hasher.update(prev);
    hasher.update(&seq.to_be_bytes());
    hasher.update(&timestamp.to_be_bytes());
    hasher.update(&encoded);
    Ok(*hasher.finalize().as_bytes())
}

// ---------------------------------------------------------------------------
// Journal
// ---------------------------------------------------------------------------

/// Errors detected while verifying or extending a journal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JournalError {
    #[error("record {seq} is out of sequence (expected {expected})")]
    OutOfSequence { seq: u64, expected: u64 },

    #[error("record {seq} does not link to its predecessor")]
    BrokenLink { seq: u64 },

    #[error("record {seq} hash does not match its contents")]
    HashMismatch { seq: u64 },

    #[error("record {seq} could not be encoded: {reason}")]
    Encoding { seq: u64, reason: String },
}

/// Append-only, hash-chained event log.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventJournal {
    records: Vec<EventRecord>,
}

impl EventJournal {
    /// Creates an empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a journal from persisted records, verifying the chain.
    pub fn from_records(records: Vec<EventRecord>) -> Result<Self, JournalError> {
        let journal = Self { records };
        journal.verify()?;
        Ok(journal)
    }

    /// Appends an event and returns the sealed record.
    pub fn append(
        &mut self,
        timestamp: Timestamp,
        event: LedgerEvent,
    ) -> Result<&EventRecord, JournalError> {
        let seq = self.records.len() as u64;
        let prev = self.head_hash();
        tracing::trace!(seq, event = event.name(), "journal append");
        let record = EventRecord::seal(seq, timestamp, event, prev)?;
        self.records.push(record);
        Ok(&self.records[self.records.len() - 1])
    }

    /// Appends several events stamped with the same time. Nothing is
    /// appended unless every event seals.
    pub fn append_all(
        &mut self,
        timestamp: Timestamp,
        events: impl IntoIterator<Item = LedgerEvent>,
    ) -> Result<usize, JournalError> {
        let mut seq = self.records.len() as u64;
        let mut prev = self.head_hash();
        let mut sealed = Vec::new();
        for event in events {
            tracing::trace!(seq, event = event.name(), "journal append");
            let record = EventRecord::seal(seq, timestamp, event, prev)?;
            prev = record.hash;
            seq += 1;
            sealed.push(record);
        }
        let appended = sealed.len();
        self.records.extend(sealed);
        Ok(appended)
    }

    /// Hash of the latest record, or [`GENESIS_HASH`] when empty.
    pub fn head_hash(&self) -> Hash {
        self.records.last().map(|r| r.hash).unwrap_or(GENESIS_HASH)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records, oldest first.
    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    /// Records with `seq >= from`.
    pub fn since(&self, from: u64) -> &[EventRecord] {
        let start = (from as usize).min(self.records.len());
        &self.records[start..]
    }

    /// Walks the chain and checks every link and hash.
    pub fn verify(&self) -> Result<(), JournalError> {
        let mut prev = GENESIS_HASH;
        for (i, record) in self.records.iter().enumerate() {
            let expected = i as u64;
            if record.seq != expected {
                return Err(JournalError::OutOfSequence {
                    seq: record.seq,
                    expected,
                });
            }
            if record.prev_hash != prev {
                return Err(JournalError::BrokenLink { seq: record.seq });
            }
            if record_hash(&prev, record.seq, record.timestamp, &record.event)? != record.hash {
                return Err(JournalError::HashMismatch { seq: record.seq });
            }
            prev = record.hash;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    fn transfer(amount: Amount) -> LedgerEvent {
        LedgerEvent::Transfer {
            from: addr("alice"),
            to: addr("bob"),
            amount,
        }
    }

    #[test]
    fn first_record_links_to_genesis() {
        let mut journal = EventJournal::new();
        let record = journal.append(10, transfer(5)).unwrap().clone();
        assert_eq!(record.seq, 0);
        assert_eq!(record.prev_hash, GENESIS_HASH);
        assert_eq!(journal.head_hash(), record.hash);
    }

    #[test]
    fn records_chain_and_verify() {
        let mut journal = EventJournal::new();
        journal.append(10, transfer(5)).unwrap();
        journal.append(11, transfer(6)).unwrap();
        journal.append(12, LedgerEvent::Unpaused { by: addr("alice") }).unwrap();

        assert_eq!(journal.len(), 3);
        assert_eq!(journal.records()[2].prev_hash, journal.records()[1].hash);
        assert!(journal.verify().is_ok());
        assert_eq!(journal.since(1).len(), 2);
        assert!(journal.since(99).is_empty());
    }

    #[test]
    fn tampering_is_detected() {
        let mut journal = EventJournal::new();
        journal.append(10, transfer(5)).unwrap();
        journal.append(11, transfer(6)).unwrap();

        let mut records = journal.records().to_vec();
        records[0].event = transfer(500);
        assert_eq!(
            EventJournal::from_records(records).unwrap_err(),
            JournalError::HashMismatch { seq: 0 }
        );
    }

    #[test]
    fn reordering_is_detected() {
        let mut journal = EventJournal::new();
        journal.append(10, transfer(5)).unwrap();
        journal.append(11, transfer(6)).unwrap();

        let mut records = journal.records().to_vec();
        records.swap(0, 1);
        assert!(matches!(
            EventJournal::from_records(records),
            Err(JournalError::OutOfSequence { .. })
        ));
    }

    #[test]
    fn events_round_trip_through_bincode() {
        let mut journal = EventJournal::new();
        let record = journal
            .append(
                7,
                LedgerEvent::PoolCrunched {
                    caller: addr("taquero"),
                    amount: 1 << 100,
                    reward: 3,
                    burned: (1 << 100) - 3,
                },
            )
            .unwrap()
            .clone();
        let bytes = bincode::serialize(&record).unwrap();
        let back: EventRecord = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn append_all_chains_like_single_appends() {
        let mut one_by_one = EventJournal::new();
        one_by_one.append(10, transfer(5)).unwrap();
        one_by_one.append(10, transfer(6)).unwrap();

        let mut batched = EventJournal::new();
        let appended = batched.append_all(10, vec![transfer(5), transfer(6)]).unwrap();

        assert_eq!(appended, 2);
        assert_eq!(batched.records(), one_by_one.records());
        assert!(batched.verify().is_ok());
    }

    #[test]
    fn hash_commits_to_the_binary_encoding() {
        let mut journal = EventJournal::new();
        let record = journal.append(10, transfer(5)).unwrap().clone();

        let mut hasher = blake3::Hasher::new();
        hasher.update(&GENESIS_HASH);
        hasher.update(&0u64.to_be_bytes());
        hasher.update(&10u64.to_be_bytes());
        hasher.update(&bincode::serialize(&transfer(5)).unwrap());
        assert_eq!(record.hash, *hasher.finalize().as_bytes());
    }
}
