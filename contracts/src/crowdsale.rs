//! # TacosCrowdsale
//!
//! Three-round primary sale. Native value goes in, $TACO comes out at a
//! fixed rate, subject to:
//!
//! - a round schedule: Cooks, then Karma, then Public, each opening at a
//!   fixed time;
//! - per-round eligibility (see [`crate::allowlist`]);
//! - a cumulative cap per round (`C1 < C2 < C3`, where `C3` is the hard cap);
//! - a per-address cap across all rounds and a minimum contribution.
//!
//! A contribution that would overshoot a cap is trimmed: the accepted part
//! buys tokens and the remainder is refunded. Only the accepted part ever
//! leaves the buyer's account.
//!
//! ```text
//!            cooks_start     karma_start     public_start
//! ──closed───────┼──Cooks≤C1─────┼──Karma≤C2─────┼──Public≤C3──► ended (raised == C3)
//! ```
//!
//! The controller holds the tokens it sells and, until liquidity is locked,
//! the pauser role on the token, which lets it hand tokens out while
//! everyone else is still frozen.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use taconomics_protocol::config::{
    CAP_PER_ADDRESS, COOKS_ROUND_CAP, COOKS_ROUND_START, KARMA_ROUND_CAP, KARMA_ROUND_START,
    MIN_CONTRIBUTION, PUBLIC_ROUND_CAP, PUBLIC_ROUND_START, TACOS_PER_UNIT,
};
use taconomics_protocol::types::{amount_string, Address, Amount, Timestamp};

use crate::allowlist::{AllowlistRegistry, Eligibility, KarmaPolicy, ReputationOracle};
use crate::error::{ContractError, ContractResult};
use crate::taco_token::TacoToken;

// ---------------------------------------------------------------------------
// Rounds
// ---------------------------------------------------------------------------

/// A sale round, in schedule order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Round {
    Cooks,
    Karma,
    Public,
}

impl Round {
    /// Who may buy in this round.
    pub fn eligibility(&self, karma_policy: KarmaPolicy) -> Eligibility {
        match self {
            Round::Cooks => Eligibility::ListMembership,
            Round::Karma => Eligibility::DelegatedQuery(karma_policy),
            Round::Public => Eligibility::Open,
        }
    }
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Round::Cooks => write!(f, "Cooks"),
            Round::Karma => write!(f, "Karma"),
            Round::Public => write!(f, "Public"),
        }
    }
}

/// Round start times and cumulative caps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSchedule {
    pub cooks_start: Timestamp,
    pub karma_start: Timestamp,
    pub public_start: Timestamp,
    #[serde(with = "amount_string")]
    pub cooks_cap: Amount,
    #[serde(with = "amount_string")]
    pub karma_cap: Amount,
    /// `C3`. Reaching it ends the sale.
    #[serde(with = "amount_string")]
    pub hardcap: Amount,
}

impl Default for RoundSchedule {
    fn default() -> Self {
        Self {
            cooks_start: COOKS_ROUND_START,
            karma_start: KARMA_ROUND_START,
            public_start: PUBLIC_ROUND_START,
            cooks_cap: COOKS_ROUND_CAP,
            karma_cap: KARMA_ROUND_CAP,
            hardcap: PUBLIC_ROUND_CAP,
        }
    }
}

impl RoundSchedule {
    /// Starts and caps must both be strictly increasing.
    pub fn validate(&self) -> ContractResult<()> {
        if !(self.cooks_start < self.karma_start && self.karma_start < self.public_start) {
            return Err(ContractError::InvalidSchedule(format!(
                "round starts must be strictly increasing, got {} / {} / {}",
                self.cooks_start, self.karma_start, self.public_start
            )));
        }
        if !(self.cooks_cap < self.karma_cap && self.karma_cap < self.hardcap) {
            return Err(ContractError::InvalidSchedule(format!(
                "round caps must be strictly increasing, got {} / {} / {}",
                self.cooks_cap, self.karma_cap, self.hardcap
            )));
        }
        Ok(())
    }

    /// The round running at `now`, or `None` before the sale opens.
    pub fn round_at(&self, now: Timestamp) -> Option<Round> {
        if now >= self.public_start {
            Some(Round::Public)
        } else if now >= self.karma_start {
            Some(Round::Karma)
        } else if now >= self.cooks_start {
            Some(Round::Cooks)
        } else {
            None
        }
    }

    /// Cumulative cap of `round`.
    pub fn cap_of(&self, round: Round) -> Amount {
        match round {
            Round::Cooks => self.cooks_cap,
            Round::Karma => self.karma_cap,
            Round::Public => self.hardcap,
        }
    }
}

/// Everything that shapes a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleConfig {
    #[serde(default)]
    pub schedule: RoundSchedule,
    /// Max cumulative contribution per address.
    #[serde(with = "amount_string", default = "default_cap_per_address")]
    pub cap_per_address: Amount,
    #[serde(with = "amount_string", default = "default_min_contribution")]
    pub min_contribution: Amount,
    /// Tokens per unit of native value.
    #[serde(with = "amount_string", default = "default_tacos_per_unit")]
    pub tacos_per_unit: Amount,
    #[serde(default)]
    pub karma_policy: KarmaPolicy,
}

fn default_cap_per_address() -> Amount {
    CAP_PER_ADDRESS
}

fn default_min_contribution() -> Amount {
    MIN_CONTRIBUTION
}

fn default_tacos_per_unit() -> Amount {
    TACOS_PER_UNIT
}

impl Default for SaleConfig {
    fn default() -> Self {
        Self {
            schedule: RoundSchedule::default(),
            cap_per_address: CAP_PER_ADDRESS,
            min_contribution: MIN_CONTRIBUTION,
            tacos_per_unit: TACOS_PER_UNIT,
            karma_policy: KarmaPolicy::default(),
        }
    }
}

impl SaleConfig {
    pub fn validate(&self) -> ContractResult<()> {
        self.schedule.validate()?;
        if self.tacos_per_unit == 0 {
            return Err(ContractError::InvalidSchedule("tacos_per_unit must be positive".into()));
        }
        if self.cap_per_address == 0 || self.min_contribution > self.cap_per_address {
            return Err(ContractError::InvalidSchedule(format!(
                "min contribution {} must not exceed a positive cap per address {}",
                self.min_contribution, self.cap_per_address
            )));
        }
        Ok(())
    }

    /// Tokens needed to cover the whole hard cap.
    pub fn tokens_for_hardcap(&self) -> ContractResult<Amount> {
        self.schedule
            .hardcap
            .checked_mul(self.tacos_per_unit)
            .ok_or(ContractError::Overflow("tokens for hardcap"))
    }
}

// ---------------------------------------------------------------------------
// Receipts
// ---------------------------------------------------------------------------

/// A completed purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    pub buyer: Address,
    pub round: Round,
    /// What the buyer sent.
    #[serde(with = "amount_string")]
    pub sent: Amount,
    /// What the sale kept.
    #[serde(with = "amount_string")]
    pub accepted: Amount,
    /// `sent - accepted`, never debited.
    #[serde(with = "amount_string")]
    pub refunded: Amount,
    #[serde(with = "amount_string")]
    pub tokens: Amount,
}

/// What happened to value sent to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Receipt {
    /// The owner topped up the controller. No tokens, no counters.
    Deposited {
        from: Address,
        #[serde(with = "amount_string")]
        amount: Amount,
    },
    Purchased(Purchase),
}

impl Receipt {
    /// Native value that leaves the sender.
    pub fn debited(&self) -> Amount {
        match self {
            Receipt::Deposited { amount, .. } => *amount,
            Receipt::Purchased(p) => p.accepted,
        }
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// The sale controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TacosCrowdsale {
    /// The controller's own account on the token and value ledgers.
    address: Address,
    owner: Address,
    config: SaleConfig,
    allowlist: AllowlistRegistry,
    wei_raised: Amount,
    contributions: HashMap<Address, Amount>,
}

impl TacosCrowdsale {
    pub fn new(address: Address, owner: Address, config: SaleConfig) -> ContractResult<Self> {
        config.validate()?;
        tracing::info!(%address, %owner, hardcap = config.schedule.hardcap, "crowdsale created");
        Ok(Self {
            address,
            owner,
            config,
            allowlist: AllowlistRegistry::new(),
            wei_raised: 0,
            contributions: HashMap::new(),
        })
    }

    // -- Reads ------------------------------------------------------------

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn owner(&self) -> &Address {
        &self.owner
    }

    pub fn config(&self) -> &SaleConfig {
        &self.config
    }

    pub fn allowlist(&self) -> &AllowlistRegistry {
        &self.allowlist
    }

    pub fn wei_raised(&self) -> Amount {
        self.wei_raised
    }

    pub fn tacos_per_unit(&self) -> Amount {
        self.config.tacos_per_unit
    }

    pub fn hardcap(&self) -> Amount {
        self.config.schedule.hardcap
    }

    pub fn current_round(&self, now: Timestamp) -> Option<Round> {
        self.config.schedule.round_at(now)
    }

    pub fn is_open(&self, now: Timestamp) -> bool {
        now >= self.config.schedule.cooks_start && self.wei_raised < self.hardcap()
    }

    /// The sale ends when the hard cap is reached, never by time alone.
    pub fn has_ended(&self) -> bool {
        self.wei_raised >= self.hardcap()
    }

    pub fn public_sale_started(&self, now: Timestamp) -> bool {
        now >= self.config.schedule.public_start
    }

    pub fn contribution_of(&self, account: &Address) -> Amount {
        self.contributions.get(account).copied().unwrap_or(0)
    }

    /// How much more `account` may contribute before hitting its cap.
    pub fn remaining_allowance(&self, account: &Address) -> Amount {
        self.config
            .cap_per_address
            .saturating_sub(self.contribution_of(account))
    }

    pub fn contributors(&self) -> usize {
        self.contributions.len()
    }

    /// Whether `account` may buy in `round`.
    pub fn is_eligible(
        &self,
        round: Round,
        account: &Address,
        oracle: &dyn ReputationOracle,
    ) -> bool {
        self.allowlist
            .is_eligible(round.eligibility(self.config.karma_policy), account, oracle)
    }

    // -- Owner ------------------------------------------------------------

    /// Adds accounts to the Cooks list. Returns the newly added ones.
    pub fn set_cooks_list(
        &mut self,
        caller: &Address,
        accounts: impl IntoIterator<Item = Address>,
    ) -> ContractResult<Vec<Address>> {
        self.ensure_owner(caller)?;
        let added = self.allowlist.add_cooks(accounts);
        tracing::info!(added = added.len(), total = self.allowlist.len(), "cooks list updated");
        Ok(added)
    }

    pub fn transfer_ownership(&mut self, caller: &Address, new_owner: Address) -> ContractResult<Address> {
        self.ensure_owner(caller)?;
        Ok(std::mem::replace(&mut self.owner, new_owner))
    }

    fn ensure_owner(&self, caller: &Address) -> ContractResult<()> {
        if caller != &self.owner {
            return Err(ContractError::OwnerOnly);
        }
        Ok(())
    }

    // -- Purchase ---------------------------------------------------------

    /// Handles `amount` of native value sent by `sender`.
    ///
    /// Value from the owner is a plain deposit. Anything else is a
    /// [`purchase`](Self::purchase). The controller cannot send to itself.
    pub fn receive_value(
        &mut self,
        token: &mut TacoToken,
        sender: &Address,
        amount: Amount,
        now: Timestamp,
        oracle: &dyn ReputationOracle,
    ) -> ContractResult<Receipt> {
        if sender == &self.address {
            return Err(ContractError::SelfPurchase);
        }
        if sender == &self.owner {
            tracing::debug!(%sender, amount, "owner deposit");
            return Ok(Receipt::Deposited {
                from: sender.clone(),
                amount,
            });
        }
        self.purchase(token, sender, amount, now, oracle)
            .map(Receipt::Purchased)
    }

    /// Converts `amount` of native value from `buyer` into tokens.
    ///
    /// # Errors
    ///
    /// In check order: [`SelfPurchase`](ContractError::SelfPurchase),
    /// [`SaleNotOpen`](ContractError::SaleNotOpen),
    /// [`SaleEnded`](ContractError::SaleEnded),
    /// [`NotEligibleForRound`](ContractError::NotEligibleForRound),
    /// [`BelowMinimumContribution`](ContractError::BelowMinimumContribution),
    /// [`AddressCapFilled`](ContractError::AddressCapFilled),
    /// [`RoundCapFilled`](ContractError::RoundCapFilled). An
    /// [`InvariantViolation`](ContractError::InvariantViolation) means the
    /// controller could not deliver the tokens it sold.
    pub fn purchase(
        &mut self,
        token: &mut TacoToken,
        buyer: &Address,
        amount: Amount,
        now: Timestamp,
        oracle: &dyn ReputationOracle,
    ) -> ContractResult<Purchase> {
        if buyer == &self.address {
            return Err(ContractError::SelfPurchase);
        }
        let round = self.current_round(now).ok_or(ContractError::SaleNotOpen)?;
        if self.has_ended() {
            return Err(ContractError::SaleEnded);
        }
        if !self.is_eligible(round, buyer, oracle) {
            return Err(ContractError::NotEligibleForRound {
                round: round.to_string(),
            });
        }
        if amount < self.config.min_contribution {
            return Err(ContractError::BelowMinimumContribution {
                amount,
                minimum: self.config.min_contribution,
            });
        }

        let contributed = self.contribution_of(buyer);
        let room_address = self.config.cap_per_address.saturating_sub(contributed);
        if room_address == 0 {
            return Err(ContractError::AddressCapFilled);
        }
        let room_round = self
            .config
            .schedule
            .cap_of(round)
            .saturating_sub(self.wei_raised);

        let accepted = amount.min(room_address).min(room_round);
        if accepted == 0 {
            return Err(ContractError::RoundCapFilled {
                round: round.to_string(),
            });
        }
        let refunded = amount - accepted;

        let tokens = accepted
            .checked_mul(self.config.tacos_per_unit)
            .ok_or(ContractError::Overflow("purchased tokens"))?;
        let wei_raised = self
            .wei_raised
            .checked_add(accepted)
            .ok_or(ContractError::Overflow("wei raised"))?;
        let contribution = contributed
            .checked_add(accepted)
            .ok_or(ContractError::Overflow("contribution"))?;

        // The token move is the only step that can still fail. Running out
        // of tokens means the sale was seeded short of its hardcap.
        token
            .transfer(&self.address, buyer, tokens)
            .map_err(|e| match e {
                ContractError::InsufficientBalance { .. } => {
                    let err = ContractError::InvariantViolation(format!(
                        "crowdsale cannot deliver {tokens} tacos: {e}"
                    ));
                    tracing::error!(error = %err, "purchase aborted");
                    err
                }
                other => other,
            })?;

        self.wei_raised = wei_raised;
        self.contributions.insert(buyer.clone(), contribution);

        tracing::info!(%buyer, %round, accepted, refunded, tokens, wei_raised, "tokens purchased");
        if self.has_ended() {
            tracing::info!(wei_raised, "hardcap reached, sale ended");
        }

        Ok(Purchase {
            buyer: buyer.clone(),
            round,
            sent: amount,
            accepted,
            refunded,
            tokens,
        })
    }
}
