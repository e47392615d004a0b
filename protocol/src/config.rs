//! # Protocol Configuration & Constants
//!
//! Every magic number in Taconomics lives here. The contracts read their
//! defaults from this module and the node's genesis config overrides them
//! when a deployment needs something different.
//!
//! Amounts are in the smallest unit: 18 decimals for both the native value
//! and $TACO, so `1 * UNIT` is one whole coin.

use crate::types::{Amount, Timestamp};

// ---------------------------------------------------------------------------
// Units & Time
// ---------------------------------------------------------------------------

/// One whole coin in smallest units (18 decimals).
pub const UNIT: Amount = 1_000_000_000_000_000_000;

/// Seconds in a day. The crunch rate is expressed "per day".
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Protocol version reported by the node.
pub const PROTOCOL_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Supply
// ---------------------------------------------------------------------------

/// Total $TACO minted at genesis: 15,624,000.
pub const TOTAL_SUPPLY: Amount = 15_624_000 * UNIT;

/// Circulating allocation seeded into the crowdsale: 14,530,320 (93%).
///
/// Half of it is sold, the other half becomes the liquidity reserve.
pub const CIRCULATING_SUPPLY: Amount = 14_530_320 * UNIT;

// ---------------------------------------------------------------------------
// Crunch Parameters
// ---------------------------------------------------------------------------

/// Default share of the reserve crunched per day, in percent.
pub const DEFAULT_CRUNCH_RATE: u64 = 4;

/// Inclusive bounds for the crunch rate.
pub const CRUNCH_RATE_BOUNDS: (u64, u64) = (1, 10);

/// Default caller reward, in percent of the crunched amount.
pub const DEFAULT_REWARD_FOR_TAQUERO: u64 = 1;

/// Inclusive bounds for the caller reward.
pub const REWARD_FOR_TAQUERO_BOUNDS: (u64, u64) = (1, 10);

/// Default taco-day reward multiplier, in tenths (20 = x2.0).
pub const DEFAULT_TACO_TUESDAY_MULTIPLIER: u64 = 20;

/// Inclusive bounds for the taco-day multiplier, in tenths.
pub const TACO_TUESDAY_MULTIPLIER_BOUNDS: (u64, u64) = (10, 30);

/// Multiplier applied on every other day of the week (x1.0).
pub const BASE_REWARD_MULTIPLIER: u64 = 10;

// ---------------------------------------------------------------------------
// Crowdsale
// ---------------------------------------------------------------------------

/// $TACO credited per unit of native value.
pub const TACOS_PER_UNIT: Amount = 34_596;

/// Maximum cumulative contribution per address: 12 units.
pub const CAP_PER_ADDRESS: Amount = 12 * UNIT;

/// Minimum single contribution: 0.1 units.
pub const MIN_CONTRIBUTION: Amount = UNIT / 10;

/// Cooks round opens 2020-08-09 06:00:00 UTC.
pub const COOKS_ROUND_START: Timestamp = 1_596_952_800;

/// Karma round opens 2020-08-10 16:00:00 UTC.
pub const KARMA_ROUND_START: Timestamp = 1_597_075_200;

/// Public round opens 2020-08-11 18:00:00 UTC.
pub const PUBLIC_ROUND_START: Timestamp = 1_597_168_800;

/// Cumulative raise allowed by the end of the Cooks round.
pub const COOKS_ROUND_CAP: Amount = 70 * UNIT;

/// Cumulative raise allowed by the end of the Karma round.
pub const KARMA_ROUND_CAP: Amount = 140 * UNIT;

/// Hard cap. Reaching it ends the sale.
pub const PUBLIC_ROUND_CAP: Amount = 210 * UNIT;

// ---------------------------------------------------------------------------
// Contract Accounts
// ---------------------------------------------------------------------------

/// Label the sale controller's address is derived from.
pub const CROWDSALE_ACCOUNT_LABEL: &str = "taconomics/crowdsale";

/// Label the liquidity reserve's address is derived from.
pub const RESERVE_ACCOUNT_LABEL: &str = "taconomics/reserve";
