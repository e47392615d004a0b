//! # TacoToken
//!
//! The $TACO ledger: balances, total supply, and the *crunch*.
//!
//! A crunch takes a slice of the liquidity reserve proportional to the time
//! since the previous crunch. A small share of that slice goes to whoever
//! called it (the *taquero*) and the rest is burned:
//!
//! ```text
//! raw    = reserve * crunch_rate * elapsed / 100 / 86400
//! reward = raw * reward_for_taquero * multiplier / 1000
//! burn   = raw - reward
//! ```
//!
//! The multiplier is `taco_tuesday_multiplier` on the taco day and
//! [`BASE_REWARD_MULTIPLIER`] on every other day. Divisions truncate and are
//! applied left to right, so results match the reference figures exactly.
//!
//! Every crunch removes `burn` from the total supply. Nothing ever mints.

use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use taconomics_protocol::config::{
    BASE_REWARD_MULTIPLIER, CRUNCH_RATE_BOUNDS, DEFAULT_CRUNCH_RATE, DEFAULT_REWARD_FOR_TAQUERO,
    DEFAULT_TACO_TUESDAY_MULTIPLIER, REWARD_FOR_TAQUERO_BOUNDS, SECONDS_PER_DAY,
    TACO_TUESDAY_MULTIPLIER_BOUNDS,
};
use taconomics_protocol::types::{amount_string, Address, Amount, Timestamp};

use crate::access::AccessGate;
use crate::error::{ContractError, ContractResult};

// ---------------------------------------------------------------------------
// Social proofs
// ---------------------------------------------------------------------------

pub const TWITTER_HANDLE: &str = "Taconomics101";
pub const TELEGRAM_HANDLE: &str = "TacoGram";
pub const WEBSITE: &str = "taconomics.io";
pub const GITHUB_HANDLE: &str = "taconomics";

/// Public handles plus the two proofs the owner can publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialProofs {
    pub twitter: String,
    pub telegram: String,
    pub website: String,
    pub github: String,
    /// Id of the tweet announcing the contract. 0 until set.
    pub twitter_proof: u64,
    /// Hex-encoded signed commit proving repository ownership.
    pub github_proof: String,
}

impl Default for SocialProofs {
    fn default() -> Self {
        Self {
            twitter: TWITTER_HANDLE.to_string(),
            telegram: TELEGRAM_HANDLE.to_string(),
            website: WEBSITE.to_string(),
            github: GITHUB_HANDLE.to_string(),
            twitter_proof: 0,
            github_proof: "0x".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Tunable crunch settings plus the crunch checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrunchParameters {
    /// Percent of the reserve crunched per day. 1..=10.
    pub crunch_rate: u64,
    /// Percent of each crunch paid to the caller. 1..=10.
    pub reward_for_taquero: u64,
    /// Taco-day multiplier in tenths. 10..=30.
    pub taco_tuesday_multiplier: u64,
    /// Time of the last crunch (or of the unpause). Never moves backwards.
    pub last_crunch: Timestamp,
    /// Day of the week the multiplier applies on.
    pub taco_day: Weekday,
}

impl CrunchParameters {
    pub fn new(now: Timestamp) -> Self {
        Self {
            crunch_rate: DEFAULT_CRUNCH_RATE,
            reward_for_taquero: DEFAULT_REWARD_FOR_TAQUERO,
            taco_tuesday_multiplier: DEFAULT_TACO_TUESDAY_MULTIPLIER,
            last_crunch: now,
            taco_day: Weekday::Tue,
        }
    }
}

/// Lifetime crunch record of one caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaqueroStat {
    pub times_crunched: u64,
    #[serde(with = "amount_string")]
    pub tacos_crunched: Amount,
}

/// What a crunch did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrunchOutcome {
    pub caller: Address,
    /// Taken from the reserve.
    #[serde(with = "amount_string")]
    pub amount: Amount,
    /// Paid to the caller.
    #[serde(with = "amount_string")]
    pub reward: Amount,
    /// Removed from the total supply.
    #[serde(with = "amount_string")]
    pub burned: Amount,
    /// Seconds since the previous crunch.
    pub elapsed: u64,
}

/// How [`TacoToken::leaderboard`] ranks taqueros.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaderboardOrder {
    #[default]
    TacosCrunched,
    TimesCrunched,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub address: Address,
    #[serde(flatten)]
    pub stat: TaqueroStat,
}

/// Everything a dashboard needs about one account, read in one go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub address: Address,
    #[serde(with = "amount_string")]
    pub balance: Amount,
    #[serde(with = "amount_string")]
    pub reserve_balance: Amount,
    #[serde(with = "amount_string")]
    pub crunchable: Amount,
    #[serde(with = "amount_string")]
    pub total_supply: Amount,
    #[serde(with = "amount_string")]
    pub total_crunched: Amount,
    pub last_crunch: Timestamp,
    pub is_taco_tuesday: bool,
    pub taquero: TaqueroStat,
}

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

/// The $TACO ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TacoToken {
    gate: AccessGate,
    balances: HashMap<Address, Amount>,
    total_supply: Amount,
    /// Liquidity reserve the crunch draws from. Set once.
    reserve: Option<Address>,
    params: CrunchParameters,
    /// Cumulative amount taken from the reserve by every crunch.
    total_crunched: Amount,
    /// Taqueros in order of their first crunch.
    taqueros: Vec<Address>,
    stats: HashMap<Address, TaqueroStat>,
    social: SocialProofs,
}

impl TacoToken {
    /// Mints `total_supply` to `deployer`, paused, with `deployer` as owner
    /// and pauser. The crunch clock starts at `now`.
    pub fn new(deployer: Address, total_supply: Amount, now: Timestamp) -> Self {
        let mut balances = HashMap::new();
        if total_supply > 0 {
            balances.insert(deployer.clone(), total_supply);
        }
        tracing::info!(%deployer, total_supply, "taco token created");
        Self {
            gate: AccessGate::new(deployer),
            balances,
            total_supply,
            reserve: None,
            params: CrunchParameters::new(now),
            total_crunched: 0,
            taqueros: Vec::new(),
            stats: HashMap::new(),
            social: SocialProofs::default(),
        }
    }

    // -- Reads ------------------------------------------------------------

    pub fn gate(&self) -> &AccessGate {
        &self.gate
    }

    pub fn owner(&self) -> &Address {
        self.gate.owner()
    }

    pub fn pauser(&self) -> Option<&Address> {
        self.gate.pauser()
    }

    pub fn is_paused(&self) -> bool {
        self.gate.is_paused()
    }

    pub fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    /// Sum of every balance. Equals [`total_supply`](Self::total_supply)
    /// after every committed call.
    pub fn sum_of_balances(&self) -> Amount {
        self.balances.values().sum()
    }

    pub fn reserve(&self) -> Option<&Address> {
        self.reserve.as_ref()
    }

    pub fn parameters(&self) -> &CrunchParameters {
        &self.params
    }

    pub fn crunch_rate(&self) -> u64 {
        self.params.crunch_rate
    }

    pub fn reward_for_taquero(&self) -> u64 {
        self.params.reward_for_taquero
    }

    pub fn taco_tuesday_multiplier(&self) -> u64 {
        self.params.taco_tuesday_multiplier
    }

    pub fn last_crunch_time(&self) -> Timestamp {
        self.params.last_crunch
    }

    pub fn total_crunched(&self) -> Amount {
        self.total_crunched
    }

    pub fn social_proofs(&self) -> &SocialProofs {
        &self.social
    }

    /// Stats for `account`; all zero if it never crunched.
    pub fn taquero_stats(&self, account: &Address) -> TaqueroStat {
        self.stats.get(account).copied().unwrap_or_default()
    }

    /// Every account that ever crunched, in order of first crunch.
    pub fn taqueros(&self) -> &[Address] {
        &self.taqueros
    }

    /// Taqueros ranked by `order`, best first. Ties keep first-crunch order.
    pub fn leaderboard(&self, order: LeaderboardOrder, limit: usize) -> Vec<LeaderboardEntry> {
        let mut ranked: Vec<(&Address, TaqueroStat)> = self
            .taqueros
            .iter()
            .map(|a| (a, self.taquero_stats(a)))
            .collect();
        match order {
            LeaderboardOrder::TacosCrunched => {
                ranked.sort_by(|a, b| b.1.tacos_crunched.cmp(&a.1.tacos_crunched))
            }
            LeaderboardOrder::TimesCrunched => {
                ranked.sort_by(|a, b| b.1.times_crunched.cmp(&a.1.times_crunched))
            }
        }
        ranked
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(i, (address, stat))| LeaderboardEntry {
                rank: i + 1,
                address: address.clone(),
                stat,
            })
            .collect()
    }

    /// Returns `true` if `now` falls on the configured taco day (UTC).
    pub fn is_taco_tuesday(&self, now: Timestamp) -> bool {
        weekday_from_monday(now) == self.params.taco_day.num_days_from_monday()
    }

    /// Reward multiplier in tenths that applies at `now`.
    pub fn reward_multiplier(&self, now: Timestamp) -> u64 {
        if self.is_taco_tuesday(now) {
            self.params.taco_tuesday_multiplier
        } else {
            BASE_REWARD_MULTIPLIER
        }
    }

    /// What a crunch at `now` would take from the reserve.
    ///
    /// Zero while paused, without a reserve or when no time has passed.
    pub fn crunch_amount(&self, now: Timestamp) -> Amount {
        if self.is_paused() {
            return 0;
        }
        let Some(reserve) = &self.reserve else {
            return 0;
        };
        if now <= self.params.last_crunch {
            return 0;
        }
        let elapsed = now - self.params.last_crunch;
        let reserve_balance = self.balance_of(reserve);
        raw_crunch(reserve_balance, self.params.crunch_rate, elapsed)
            .map(|raw| raw.min(reserve_balance))
            .unwrap_or(0)
    }

    pub fn info_for(&self, account: &Address, now: Timestamp) -> AccountInfo {
        AccountInfo {
            address: account.clone(),
            balance: self.balance_of(account),
            reserve_balance: self.reserve.as_ref().map(|r| self.balance_of(r)).unwrap_or(0),
            crunchable: self.crunch_amount(now),
            total_supply: self.total_supply,
            total_crunched: self.total_crunched,
            last_crunch: self.params.last_crunch,
            is_taco_tuesday: self.is_taco_tuesday(now),
            taquero: self.taquero_stats(account),
        }
    }

    // -- Transfers --------------------------------------------------------

    /// Moves `amount` from `from` to `to`.
    ///
    /// # Errors
    ///
    /// - [`ContractError::Paused`] while paused, unless `from` is the pauser.
    /// - [`ContractError::InsufficientBalance`] if `from` holds less than `amount`.
    pub fn transfer(&mut self, from: &Address, to: &Address, amount: Amount) -> ContractResult<()> {
        self.gate.ensure_can_transfer(from)?;

        let from_balance = self.balance_of(from);
        if from_balance < amount {
            return Err(ContractError::InsufficientBalance {
                balance: from_balance,
                amount,
            });
        }
        if from == to || amount == 0 {
            return Ok(());
        }
        let to_balance = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(ContractError::Overflow("transfer"))?;

        self.set_balance(from, from_balance - amount);
        self.set_balance(to, to_balance);
        tracing::debug!(%from, %to, amount, "tacos transferred");
        Ok(())
    }

    fn set_balance(&mut self, account: &Address, balance: Amount) {
        if balance == 0 {
            self.balances.remove(account);
        } else {
            self.balances.insert(account.clone(), balance);
        }
    }

    // -- Crunch -----------------------------------------------------------

    /// Crunches the reserve on behalf of `caller`.
    ///
    /// Returns `Ok(None)` when no time has passed since the last crunch; in
    /// that case nothing changes.
    ///
    /// # Errors
    ///
    /// [`ContractError::Paused`] while paused, [`ContractError::ReserveNotSet`]
    /// before the reserve exists.
    pub fn crunch(&mut self, caller: &Address, now: Timestamp) -> ContractResult<Option<CrunchOutcome>> {
        self.gate.ensure_not_paused()?;
        let reserve = self.reserve.clone().ok_or(ContractError::ReserveNotSet)?;

        if now <= self.params.last_crunch {
            tracing::debug!(%caller, now, last_crunch = self.params.last_crunch, "nothing to crunch");
            return Ok(None);
        }
        let elapsed = now - self.params.last_crunch;

        let reserve_balance = self.balance_of(&reserve);
        // A long enough pause would crunch more than the reserve holds.
        let raw = raw_crunch(reserve_balance, self.params.crunch_rate, elapsed)?.min(reserve_balance);
        let reward = raw
            .checked_mul(Amount::from(self.params.reward_for_taquero))
            .and_then(|v| v.checked_mul(Amount::from(self.reward_multiplier(now))))
            .map(|v| v / 1000)
            .ok_or(ContractError::Overflow("crunch reward"))?;
        let burned = raw
            .checked_sub(reward)
            .ok_or_else(|| ContractError::InvariantViolation("crunch reward exceeds crunched amount".into()))?;

        let caller_balance = self
            .balance_of(caller)
            .checked_add(reward)
            .ok_or(ContractError::Overflow("crunch reward"))?;
        let total_supply = self
            .total_supply
            .checked_sub(burned)
            .ok_or_else(|| ContractError::InvariantViolation("burn exceeds total supply".into()))?;
        let total_crunched = self
            .total_crunched
            .checked_add(raw)
            .ok_or(ContractError::Overflow("total crunched"))?;

        // All checks done; from here on nothing can fail.
        self.set_balance(&reserve, reserve_balance - raw);
        let caller_balance = if caller == &reserve {
            caller_balance - raw
        } else {
            caller_balance
        };
        self.set_balance(caller, caller_balance);
        self.total_supply = total_supply;
        self.total_crunched = total_crunched;
        self.params.last_crunch = now;

        if !self.stats.contains_key(caller) {
            self.taqueros.push(caller.clone());
        }
        let stat = self.stats.entry(caller.clone()).or_default();
        stat.times_crunched += 1;
        stat.tacos_crunched = stat.tacos_crunched.saturating_add(reward);

        tracing::info!(%caller, amount = raw, reward, burned, elapsed, "pool crunched");
        Ok(Some(CrunchOutcome {
            caller: caller.clone(),
            amount: raw,
            reward,
            burned,
            elapsed,
        }))
    }

    // -- Owner ------------------------------------------------------------

    /// Fixes the liquidity reserve. Only once.
    pub fn set_reserve(&mut self, caller: &Address, reserve: Address) -> ContractResult<()> {
        self.gate.ensure_owner(caller)?;
        if self.reserve.is_some() {
            return Err(ContractError::ReserveAlreadySet);
        }
        tracing::info!(%reserve, "liquidity reserve set");
        self.reserve = Some(reserve);
        Ok(())
    }

    pub fn set_crunch_rate(&mut self, caller: &Address, value: u64) -> ContractResult<()> {
        self.gate.ensure_owner(caller)?;
        check_bounds("crunchRate", value, CRUNCH_RATE_BOUNDS)?;
        self.params.crunch_rate = value;
        tracing::info!(value, "crunch rate updated");
        Ok(())
    }

    pub fn set_reward_for_taquero(&mut self, caller: &Address, value: u64) -> ContractResult<()> {
        self.gate.ensure_owner(caller)?;
        check_bounds("rewardForTaquero", value, REWARD_FOR_TAQUERO_BOUNDS)?;
        self.params.reward_for_taquero = value;
        tracing::info!(value, "reward for taquero updated");
        Ok(())
    }

    pub fn set_taco_tuesday_multiplier(&mut self, caller: &Address, value: u64) -> ContractResult<()> {
        self.gate.ensure_owner(caller)?;
        check_bounds("tacoTuesdayRewardMultiplier", value, TACO_TUESDAY_MULTIPLIER_BOUNDS)?;
        self.params.taco_tuesday_multiplier = value;
        tracing::info!(value, "taco tuesday multiplier updated");
        Ok(())
    }

    /// Moves the taco day. Genesis-only knob; the host calls it before any
    /// crunch can happen.
    pub fn set_taco_day(&mut self, caller: &Address, day: Weekday) -> ContractResult<()> {
        self.gate.ensure_owner(caller)?;
        self.params.taco_day = day;
        Ok(())
    }

    pub fn set_twitter_proof(&mut self, caller: &Address, tweet_id: u64) -> ContractResult<()> {
        self.gate.ensure_owner(caller)?;
        self.social.twitter_proof = tweet_id;
        Ok(())
    }

    pub fn set_github_proof(&mut self, caller: &Address, proof: String) -> ContractResult<()> {
        self.gate.ensure_owner(caller)?;
        self.social.github_proof = proof;
        Ok(())
    }

    pub fn transfer_ownership(&mut self, caller: &Address, new_owner: Address) -> ContractResult<Address> {
        self.gate.transfer_ownership(caller, new_owner)
    }

    // -- Pauser -----------------------------------------------------------

    /// Reassigns the pauser. Returns the previous one.
    pub fn set_pauser(&mut self, caller: &Address, new_pauser: Address) -> ContractResult<Address> {
        let previous = self.gate.set_pauser(caller, new_pauser)?;
        tracing::info!(%previous, pauser = ?self.gate.pauser(), "pauser changed");
        Ok(previous)
    }

    /// Unpauses for good and restarts the crunch clock at `now`, so nothing
    /// accrues for the time spent paused.
    pub fn unpause(&mut self, caller: &Address, now: Timestamp) -> ContractResult<()> {
        self.gate.unpause(caller)?;
        self.params.last_crunch = self.params.last_crunch.max(now);
        tracing::info!(by = %caller, now, "token unpaused, pauser burned");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `reserve * rate * elapsed / 100 / 86400`, truncating left to right.
pub fn raw_crunch(reserve: Amount, rate: u64, elapsed: u64) -> ContractResult<Amount> {
    reserve
        .checked_mul(Amount::from(rate))
        .and_then(|v| v.checked_mul(Amount::from(elapsed)))
        .map(|v| v / 100 / Amount::from(SECONDS_PER_DAY))
        .ok_or(ContractError::Overflow("crunch amount"))
}

/// Day of the week for a unix timestamp, 0 = Monday. 1970-01-01 was a
/// Thursday.
fn weekday_from_monday(ts: Timestamp) -> u32 {
    ((ts / SECONDS_PER_DAY + 3) % 7) as u32
}

fn check_bounds(name: &'static str, value: u64, (min, max): (u64, u64)) -> ContractResult<()> {
    if value < min || value > max {
        return Err(ContractError::InvalidParameter {
            name,
            value,
            min,
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Wednesday 2020-08-12 00:00:00 UTC.
    const WEDNESDAY: Timestamp = 1_597_190_400;
    /// Tuesday 2020-08-11 12:00:00 UTC.
    const TUESDAY_NOON: Timestamp = 1_597_147_200;

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    #[test]
    fn weekday_arithmetic() {
        assert_eq!(weekday_from_monday(0), 3); // thursday
        assert_eq!(weekday_from_monday(WEDNESDAY), 2);
        assert_eq!(weekday_from_monday(TUESDAY_NOON), 1);
    }

    #[test]
    fn taco_tuesday_uses_the_multiplier() {
        let token = TacoToken::new(addr("deployer"), 1_000, WEDNESDAY);
        assert!(token.is_taco_tuesday(TUESDAY_NOON));
        assert!(!token.is_taco_tuesday(WEDNESDAY));
        assert_eq!(token.reward_multiplier(TUESDAY_NOON), 20);
        assert_eq!(token.reward_multiplier(WEDNESDAY), 10);
    }

    #[test]
    fn taco_day_can_move() {
        let mut token = TacoToken::new(addr("deployer"), 1_000, WEDNESDAY);
        token.set_taco_day(&addr("deployer"), Weekday::Wed).unwrap();
        assert!(token.is_taco_tuesday(WEDNESDAY));
        assert!(!token.is_taco_tuesday(TUESDAY_NOON));
    }

    #[test]
    fn raw_crunch_truncates_in_order() {
        // 1000 * 4 * 300 = 1_200_000; /100 = 12_000; /86400 = 0
        assert_eq!(raw_crunch(1_000, 4, 300).unwrap(), 0);
        assert_eq!(raw_crunch(1_000_000_000, 4, 300).unwrap(), 138_888);
        assert!(raw_crunch(Amount::MAX, 10, 10).is_err());
    }

    #[test]
    fn bounds_are_inclusive() {
        assert!(check_bounds("x", 1, (1, 10)).is_ok());
        assert!(check_bounds("x", 10, (1, 10)).is_ok());
        assert!(check_bounds("x", 0, (1, 10)).is_err());
        assert!(check_bounds("x", 11, (1, 10)).is_err());
    }

    #[test]
    fn transfer_to_self_is_a_no_op() {
        let mut token = TacoToken::new(addr("deployer"), 1_000, WEDNESDAY);
        token.transfer(&addr("deployer"), &addr("deployer"), 400).unwrap();
        assert_eq!(token.balance_of(&addr("deployer")), 1_000);
        assert_eq!(
            token.transfer(&addr("deployer"), &addr("deployer"), 4_000),
            Err(ContractError::InsufficientBalance {
                balance: 1_000,
                amount: 4_000
            })
        );
    }

    #[test]
    fn reserve_crunching_itself_conserves_supply() {
        let mut token = TacoToken::new(addr("deployer"), 1_000_000_000_000, WEDNESDAY);
        token.set_reserve(&addr("deployer"), addr("reserve")).unwrap();
        token
            .transfer(&addr("deployer"), &addr("reserve"), 900_000_000_000)
            .unwrap();
        token.unpause(&addr("deployer"), WEDNESDAY).unwrap();

        let outcome = token
            .crunch(&addr("reserve"), WEDNESDAY + 3_600)
            .unwrap()
            .unwrap();
        assert!(outcome.amount > 0);
        assert_eq!(token.sum_of_balances(), token.total_supply());
        assert_eq!(
            token.balance_of(&addr("reserve")),
            900_000_000_000 - outcome.amount + outcome.reward
        );
    }
}
