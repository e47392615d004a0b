// Copyright (c) 2026 Taconomics. MIT License.
// See LICENSE for details.

//! # Taconomics Contracts
//!
//! The $TACO game as two coupled state machines over one serialized ledger:
//!
//! - **TacoToken**: balances, supply and the time-gated *crunch* that
//!   burns from the liquidity reserve and rewards whoever triggers it.
//! - **Access Gate**: owner and pauser roles; the pauser is burned on
//!   unpause and never comes back.
//! - **TacosCrowdsale**: three allow-listed, capped rounds that turn native
//!   value into $TACO.
//! - **Allow-lists**: a stored Cooks list and a delegated Karma query.
//! - **Liquidity Finalizer**: one-shot hand-off of the proceeds to the
//!   reserve pool once the hard cap is reached.
//! - **Host**: composes all of the above with the clock, the collaborators
//!   and the event journal.
//!
//! ## Design Principles
//!
//! 1. All monetary operations check for overflow. `u128` is wide, not
//!    infinite.
//! 2. State transitions are explicit: enum variants, not boolean flags.
//! 3. Every call validates completely before it mutates anything.
//! 4. Every public type is serializable (serde) for wire transport and
//!    persistent storage.

pub mod access;
pub mod allowlist;
pub mod crowdsale;
pub mod error;
pub mod host;
pub mod liquidity;
pub mod taco_token;

pub use access::{AccessGate, PauserState};
pub use allowlist::{AllowlistRegistry, Eligibility, KarmaPolicy, ReputationOracle, StaticReputation};
pub use crowdsale::{Purchase, Receipt, Round, RoundSchedule, SaleConfig, TacosCrowdsale};
pub use error::{ContractError, ContractResult, ErrorKind};
pub use host::{GenesisConfig, LedgerState, OwnedContract, SharedTaconomics, Taconomics, ValueAllocation};
pub use liquidity::{LiquidityDeposit, LiquidityFinalizer, LockedPool, PoolError, ReservePool};
pub use taco_token::{AccountInfo, CrunchOutcome, CrunchParameters, LeaderboardOrder, TacoToken, TaqueroStat};
