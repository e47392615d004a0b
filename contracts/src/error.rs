//! # Contract Errors
//!
//! One error type for every Taconomics contract. Each variant belongs to
//! exactly one [`ErrorKind`] and has a stable [`code`](ContractError::code)
//! that clients match on. Messages may change; codes do not.
//!
//! Every rejection happens before any state is touched, so a caller that
//! gets an error back can assume nothing moved.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use taconomics_protocol::events::JournalError;
use taconomics_protocol::types::Amount;

/// Broad class of a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed input or an out-of-range value.
    Validation,
    /// The caller does not hold the required role.
    Authorization,
    /// The contract is not in a state that allows the call.
    State,
    /// Internal bookkeeping is inconsistent. Signals corrupted setup, not a
    /// user mistake.
    Invariant,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Authorization => write!(f, "authorization"),
            ErrorKind::State => write!(f, "state"),
            ErrorKind::Invariant => write!(f, "invariant"),
        }
    }
}

/// Errors returned by contract entry points.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    // -- Validation -------------------------------------------------------
    /// A parameter setter received a value outside its inclusive bounds.
    #[error("{name} must be at least {min} and at most {max}, got {value}")]
    InvalidParameter {
        name: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    /// The sender does not hold enough tokens.
    #[error("insufficient balance: account has {balance}, tried to move {amount}")]
    InsufficientBalance { balance: Amount, amount: Amount },

    /// The sender does not hold enough native value to send.
    #[error("insufficient value: account holds {balance}, tried to send {amount}")]
    InsufficientValue { balance: Amount, amount: Amount },

    /// A purchase was below the minimum contribution.
    #[error("contribution {amount} is smaller than the minimum contribution {minimum}")]
    BelowMinimumContribution { amount: Amount, minimum: Amount },

    /// A sale schedule whose starts or caps are not strictly increasing.
    #[error("invalid sale schedule: {0}")]
    InvalidSchedule(String),

    /// The sale controller sent value to itself.
    #[error("the crowdsale cannot buy from itself")]
    SelfPurchase,

    // -- Authorization ----------------------------------------------------
    /// Only the contract owner may call this.
    #[error("caller is not the owner")]
    OwnerOnly,

    /// Only the current pauser may call this.
    #[error("only the pauser can call this function")]
    PauserOnly,

    /// A signed call reused a nonce the account has already spent.
    #[error("nonce {nonce} is not above the last accepted nonce {last}")]
    StaleNonce { nonce: u64, last: u64 },

    // -- State ------------------------------------------------------------
    /// Transfers and crunches are blocked while paused.
    #[error("contract is paused")]
    Paused,

    /// The pauser role was burned on unpause and cannot be reassigned.
    #[error("pauser rights have been burnt")]
    PauserBurned,

    /// The reserve account can only be set once.
    #[error("reserve pool already created")]
    ReserveAlreadySet,

    /// Crunching needs a reserve to draw from.
    #[error("reserve pool has not been created")]
    ReserveNotSet,

    /// The sale has not started yet.
    #[error("sale did not start yet")]
    SaleNotOpen,

    /// The hard cap has been reached.
    #[error("sale is over")]
    SaleEnded,

    /// The caller is not on the allow-list of the current round.
    #[error("address not allowed for the {round} round")]
    NotEligibleForRound { round: String },

    /// The caller has already contributed the per-address maximum.
    #[error("individual cap has been filled")]
    AddressCapFilled,

    /// The cumulative cap of the current round has been reached.
    #[error("the cap for the {round} round has been filled")]
    RoundCapFilled { round: String },

    /// Liquidity can only be added once the hard cap is reached.
    #[error("can only send liquidity once hardcap is reached")]
    SaleNotEnded,

    /// Liquidity has already been added and locked.
    #[error("liquidity already added and locked")]
    LiquidityAlreadyLocked,

    // -- Invariant --------------------------------------------------------
    /// Internal bookkeeping does not add up.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Checked arithmetic overflowed.
    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),
}

impl ContractError {
    /// The class this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        use ContractError::*;
        match self {
            InvalidParameter { .. }
            | InsufficientBalance { .. }
            | InsufficientValue { .. }
            | BelowMinimumContribution { .. }
            | InvalidSchedule(_)
            | SelfPurchase => ErrorKind::Validation,
            OwnerOnly | PauserOnly | StaleNonce { .. } => ErrorKind::Authorization,
            Paused
            | PauserBurned
            | ReserveAlreadySet
            | ReserveNotSet
            | SaleNotOpen
            | SaleEnded
            | NotEligibleForRound { .. }
            | AddressCapFilled
            | RoundCapFilled { .. }
            | SaleNotEnded
            | LiquidityAlreadyLocked => ErrorKind::State,
            InvariantViolation(_) | Overflow(_) => ErrorKind::Invariant,
        }
    }

    /// Stable machine-readable reason.
    pub fn code(&self) -> &'static str {
        use ContractError::*;
        match self {
            InvalidParameter { .. } => "INVALID_PARAMETER",
            InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            InsufficientValue { .. } => "INSUFFICIENT_VALUE",
            BelowMinimumContribution { .. } => "BELOW_MINIMUM_CONTRIBUTION",
            InvalidSchedule(_) => "INVALID_SCHEDULE",
            SelfPurchase => "SELF_PURCHASE",
            OwnerOnly => "OWNER_ONLY",
            PauserOnly => "PAUSER_ONLY",
            StaleNonce { .. } => "STALE_NONCE",
            Paused => "PAUSED",
            PauserBurned => "PAUSER_BURNED",
            ReserveAlreadySet => "RESERVE_ALREADY_SET",
            ReserveNotSet => "RESERVE_NOT_SET",
            SaleNotOpen => "SALE_NOT_OPEN",
            SaleEnded => "SALE_ENDED",
            NotEligibleForRound { .. } => "NOT_ELIGIBLE_FOR_ROUND",
            AddressCapFilled => "ADDRESS_CAP_FILLED",
            RoundCapFilled { .. } => "ROUND_CAP_FILLED",
            SaleNotEnded => "SALE_NOT_ENDED",
            LiquidityAlreadyLocked => "LIQUIDITY_ALREADY_LOCKED",
            InvariantViolation(_) => "INVARIANT_VIOLATION",
            Overflow(_) => "OVERFLOW",
        }
    }
}

impl From<JournalError> for ContractError {
    fn from(e: JournalError) -> Self {
        ContractError::InvariantViolation(format!("journal: {e}"))
    }
}

/// Result alias for contract calls.
pub type ContractResult<T> = Result<T, ContractError>;
