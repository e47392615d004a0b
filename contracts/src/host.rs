//! # Host
//!
//! [`Taconomics`] is the one place where the contracts meet the outside
//! world. It owns:
//!
//! - the contract state ([`LedgerState`]): token, sale, finalizer and the
//!   native-value ledger;
//! - the [`Clock`] every call reads "now" from, once, at entry;
//! - the collaborators: a [`ReputationOracle`] for the Karma round and a
//!   [`ReservePool`] that hears about crunches and the liquidity deposit;
//! - the [`EventJournal`] every committed call appends to.
//!
//! Each entry point validates fully before it mutates, so a rejected call
//! leaves no trace. Pool notifications happen only after the state change
//! has been made, and a failing pool never undoes it.
//!
//! Callers share a host as [`SharedTaconomics`]; holding the lock for the
//! duration of a call is what serializes the ledger.

use chrono::Weekday;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use taconomics_protocol::clock::Clock;
use taconomics_protocol::config::{
    CIRCULATING_SUPPLY, CROWDSALE_ACCOUNT_LABEL, RESERVE_ACCOUNT_LABEL, TOTAL_SUPPLY,
};
use taconomics_protocol::events::{EventJournal, EventRecord, LedgerEvent};
use taconomics_protocol::storage::{DbResult, LedgerDB};
use taconomics_protocol::types::{amount_string, Address, Amount, Timestamp};

use crate::allowlist::{ReputationOracle, StaticReputation};
use crate::crowdsale::{Receipt, SaleConfig, TacosCrowdsale};
use crate::error::{ContractError, ContractResult, ErrorKind};
use crate::liquidity::{LiquidityDeposit, LiquidityFinalizer, ReservePool};
use crate::taco_token::{CrunchOutcome, TacoToken};

/// A host shared between request handlers.
pub type SharedTaconomics = Arc<Mutex<Taconomics>>;

// ---------------------------------------------------------------------------
// Genesis
// ---------------------------------------------------------------------------

/// Native value credited to an account at genesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueAllocation {
    pub account: Address,
    #[serde(with = "amount_string")]
    pub amount: Amount,
}

/// Everything needed to deploy a fresh ledger.
///
/// Every field has a mainnet default, so an empty document is a valid
/// genesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisConfig {
    /// Deployer: owner of both contracts and first pauser.
    #[serde(default = "default_owner")]
    pub owner: Address,
    #[serde(with = "amount_string", default = "default_total_supply")]
    pub total_supply: Amount,
    /// Seeded into the sale controller.
    #[serde(with = "amount_string", default = "default_circulating_supply")]
    pub circulating_supply: Amount,
    #[serde(default = "default_taco_day")]
    pub taco_day: Weekday,
    #[serde(default)]
    pub sale: SaleConfig,
    /// Initial Cooks allow-list.
    #[serde(default)]
    pub cooks: Vec<Address>,
    /// Karma round members and holders.
    #[serde(default)]
    pub reputation: StaticReputation,
    #[serde(default)]
    pub allocations: Vec<ValueAllocation>,
}

fn default_owner() -> Address {
    Address::derive("taconomics/deployer")
}

fn default_total_supply() -> Amount {
    TOTAL_SUPPLY
}

fn default_circulating_supply() -> Amount {
    CIRCULATING_SUPPLY
}

fn default_taco_day() -> Weekday {
    Weekday::Tue
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            total_supply: TOTAL_SUPPLY,
            circulating_supply: CIRCULATING_SUPPLY,
            taco_day: Weekday::Tue,
            sale: SaleConfig::default(),
            cooks: Vec::new(),
            reputation: StaticReputation::default(),
            allocations: Vec::new(),
        }
    }
}

impl GenesisConfig {
    pub fn validate(&self) -> ContractResult<()> {
        self.sale.validate()?;
        if self.circulating_supply > self.total_supply {
            return Err(ContractError::InvalidSchedule(format!(
                "circulating supply {} exceeds total supply {}",
                self.circulating_supply, self.total_supply
            )));
        }
        let needed = self.sale.tokens_for_hardcap()?;
        if needed > self.circulating_supply {
            return Err(ContractError::InvalidSchedule(format!(
                "selling the hardcap needs {needed} tacos but only {} are seeded",
                self.circulating_supply
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Native value ledger
// ---------------------------------------------------------------------------

/// Balances of the host's native currency, the thing the sale is paid in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NativeLedger {
    balances: HashMap<Address, Amount>,
}

impl NativeLedger {
    pub fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn total(&self) -> Amount {
        self.balances.values().sum()
    }

    fn credit(&mut self, account: &Address, amount: Amount) -> ContractResult<()> {
        let balance = self
            .balance_of(account)
            .checked_add(amount)
            .ok_or(ContractError::Overflow("native credit"))?;
        self.balances.insert(account.clone(), balance);
        Ok(())
    }

    fn ensure_covers(&self, account: &Address, amount: Amount) -> ContractResult<()> {
        let balance = self.balance_of(account);
        if balance < amount {
            return Err(ContractError::InsufficientValue { balance, amount });
        }
        Ok(())
    }

    /// Moves value, checking both ends before touching either.
    fn move_value(&mut self, from: &Address, to: &Address, amount: Amount) -> ContractResult<()> {
        self.ensure_covers(from, amount)?;
        if from == to || amount == 0 {
            return Ok(());
        }
        let to_balance = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(ContractError::Overflow("native transfer"))?;
        let from_balance = self.balance_of(from) - amount;
        if from_balance == 0 {
            self.balances.remove(from);
        } else {
            self.balances.insert(from.clone(), from_balance);
        }
        self.balances.insert(to.clone(), to_balance);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Ledger state
// ---------------------------------------------------------------------------

/// Everything that is persisted between restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerState {
    pub token: TacoToken,
    pub sale: TacosCrowdsale,
    pub finalizer: LiquidityFinalizer,
    pub native: NativeLedger,
    /// Highest signed-call nonce accepted per account.
    pub nonces: BTreeMap<Address, u64>,
}

/// Which contract an ownership transfer targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnedContract {
    Token,
    Crowdsale,
}

impl fmt::Display for OwnedContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnedContract::Token => write!(f, "token"),
            OwnedContract::Crowdsale => write!(f, "crowdsale"),
        }
    }
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

/// The Taconomics ledger host.
pub struct Taconomics {
    state: LedgerState,
    journal: EventJournal,
    /// Journal records already handed to storage.
    persisted: u64,
    clock: Arc<dyn Clock>,
    oracle: Arc<dyn ReputationOracle>,
    pool: Arc<dyn ReservePool>,
}

impl fmt::Debug for Taconomics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Taconomics")
            .field("events", &self.journal.len())
            .field("persisted", &self.persisted)
            .field("now", &self.clock.now())
            .finish_non_exhaustive()
    }
}

impl Taconomics {
    /// Deploys a fresh ledger from `genesis`.
    ///
    /// Mirrors the original deployment: mint the supply to the owner, fix
    /// the reserve, create the sale, seed it with the circulating
    /// allocation and make it the pauser.
    pub fn deploy(
        genesis: &GenesisConfig,
        clock: Arc<dyn Clock>,
        oracle: Arc<dyn ReputationOracle>,
        pool: Arc<dyn ReservePool>,
    ) -> ContractResult<Self> {
        genesis.validate()?;
        let now = clock.now();
        let owner = genesis.owner.clone();
        let reserve = Address::derive(RESERVE_ACCOUNT_LABEL);
        let sale_address = Address::derive(CROWDSALE_ACCOUNT_LABEL);

        let mut journal = EventJournal::new();
        let mut token = TacoToken::new(owner.clone(), genesis.total_supply, now);
        journal.append(
            now,
            LedgerEvent::Transfer {
                from: Address::zero(),
                to: owner.clone(),
                amount: genesis.total_supply,
            },
        )?;
        token.set_taco_day(&owner, genesis.taco_day)?;

        token.set_reserve(&owner, reserve.clone())?;
        journal.append(now, LedgerEvent::ReserveSet { reserve })?;

        let mut sale = TacosCrowdsale::new(sale_address.clone(), owner.clone(), genesis.sale.clone())?;
        let added = sale.set_cooks_list(&owner, genesis.cooks.iter().cloned())?;
        if !added.is_empty() {
            journal.append(now, LedgerEvent::CooksListUpdated { added })?;
        }

        token.transfer(&owner, &sale_address, genesis.circulating_supply)?;
        journal.append(
            now,
            LedgerEvent::Transfer {
                from: owner.clone(),
                to: sale_address.clone(),
                amount: genesis.circulating_supply,
            },
        )?;
        let previous = token.set_pauser(&owner, sale_address.clone())?;
        journal.append(
            now,
            LedgerEvent::PauserChanged {
                previous,
                pauser: sale_address,
            },
        )?;

        let mut native = NativeLedger::default();
        for allocation in &genesis.allocations {
            native.credit(&allocation.account, allocation.amount)?;
            journal.append(
                now,
                LedgerEvent::ValueDeposited {
                    from: allocation.account.clone(),
                    amount: allocation.amount,
                },
            )?;
        }

        tracing::info!(
            %owner,
            total_supply = genesis.total_supply,
            events = journal.len(),
            "taconomics deployed"
        );
        Ok(Self {
            state: LedgerState {
                token,
                sale,
                finalizer: LiquidityFinalizer::Armed,
                native,
                nonces: BTreeMap::new(),
            },
            journal,
            persisted: 0,
            clock,
            oracle,
            pool,
        })
    }

    /// Rebuilds a host from persisted state. The journal is taken as
    /// already persisted.
    pub fn restore(
        state: LedgerState,
        journal: EventJournal,
        clock: Arc<dyn Clock>,
        oracle: Arc<dyn ReputationOracle>,
        pool: Arc<dyn ReservePool>,
    ) -> Self {
        let persisted = journal.len() as u64;
        tracing::info!(events = persisted, "taconomics restored");
        Self {
            state,
            journal,
            persisted,
            clock,
            oracle,
            pool,
        }
    }

    /// Wraps the host for sharing between threads.
    pub fn shared(self) -> SharedTaconomics {
        Arc::new(Mutex::new(self))
    }

    // -- Reads ------------------------------------------------------------

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn token(&self) -> &TacoToken {
        &self.state.token
    }

    pub fn sale(&self) -> &TacosCrowdsale {
        &self.state.sale
    }

    pub fn finalizer(&self) -> &LiquidityFinalizer {
        &self.state.finalizer
    }

    pub fn native_balance(&self, account: &Address) -> Amount {
        self.state.native.balance_of(account)
    }

    /// Whether `account` may buy in the round that is open right now.
    pub fn is_eligible_now(&self, account: &Address) -> bool {
        let sale = &self.state.sale;
        sale.current_round(self.now())
            .is_some_and(|round| sale.is_eligible(round, account, self.oracle.as_ref()))
    }

    /// Last call nonce accepted from `account`, 0 before its first call.
    pub fn nonce_of(&self, account: &Address) -> u64 {
        self.state.nonces.get(account).copied().unwrap_or(0)
    }

    /// Rejects `nonce` unless it is above the last one `account` used.
    pub fn check_nonce(&self, account: &Address, nonce: u64) -> ContractResult<()> {
        let last = self.nonce_of(account);
        if nonce <= last {
            return Err(self.rejected(
                "check_nonce",
                account,
                ContractError::StaleNonce { nonce, last },
            ));
        }
        Ok(())
    }

    /// Marks `nonce` as used by `account`. Call after the call it signed
    /// has committed.
    pub fn record_nonce(&mut self, account: &Address, nonce: u64) {
        let last = self.state.nonces.entry(account.clone()).or_insert(0);
        *last = (*last).max(nonce);
    }

    pub fn journal(&self) -> &EventJournal {
        &self.journal
    }

    /// Records appended since the last [`persist`](Self::persist).
    pub fn unpersisted(&self) -> &[EventRecord] {
        self.journal.since(self.persisted)
    }

    /// Commits new journal records and the current state to `db`.
    /// Returns how many records were written.
    pub fn persist(&mut self, db: &LedgerDB) -> DbResult<usize> {
        let records = self.journal.since(self.persisted);
        let written = records.len();
        db.commit(records, &self.state)?;
        self.persisted = self.journal.len() as u64;
        Ok(written)
    }

    /// Checks the cross-contract invariants.
    pub fn verify_invariants(&self) -> ContractResult<()> {
        let token = &self.state.token;
        if token.sum_of_balances() != token.total_supply() {
            return Err(ContractError::InvariantViolation(format!(
                "balances sum to {} but total supply is {}",
                token.sum_of_balances(),
                token.total_supply()
            )));
        }
        let sale = &self.state.sale;
        if sale.wei_raised() > sale.hardcap() {
            return Err(ContractError::InvariantViolation(format!(
                "raised {} beyond the hardcap {}",
                sale.wei_raised(),
                sale.hardcap()
            )));
        }
        Ok(())
    }

    // -- Token entry points -----------------------------------------------

    pub fn transfer(&mut self, caller: &Address, to: &Address, amount: Amount) -> ContractResult<()> {
        let now = self.now();
        let result = self.state.token.transfer(caller, to, amount);
        self.settle("transfer", result, |_| {
            vec![LedgerEvent::Transfer {
                from: caller.clone(),
                to: to.clone(),
                amount,
            }]
        }, now)
    }

    /// Crunches the reserve. `Ok(None)` means no time has passed.
    pub fn crunch(&mut self, caller: &Address) -> ContractResult<Option<CrunchOutcome>> {
        let now = self.now();
        let result = self.state.token.crunch(caller, now);
        let outcome = self.settle("crunch", result, |outcome| {
            outcome
                .iter()
                .map(|o| LedgerEvent::PoolCrunched {
                    caller: o.caller.clone(),
                    amount: o.amount,
                    reward: o.reward,
                    burned: o.burned,
                })
                .collect()
        }, now)?;

        if outcome.is_some() {
            if let Some(reserve) = self.state.token.reserve() {
                self.pool.sync(self.state.token.balance_of(reserve));
            }
        }
        Ok(outcome)
    }

    /// What a crunch right now would take from the reserve.
    pub fn crunch_amount(&self) -> Amount {
        self.state.token.crunch_amount(self.now())
    }

    pub fn set_pauser(&mut self, caller: &Address, new_pauser: Address) -> ContractResult<Address> {
        let now = self.now();
        let result = self.state.token.set_pauser(caller, new_pauser.clone());
        self.settle("set_pauser", result, |previous| {
            vec![LedgerEvent::PauserChanged {
                previous: previous.clone(),
                pauser: new_pauser.clone(),
            }]
        }, now)
    }

    pub fn unpause(&mut self, caller: &Address) -> ContractResult<()> {
        let now = self.now();
        let result = self.state.token.unpause(caller, now);
        self.settle("unpause", result, |_| {
            vec![LedgerEvent::Unpaused { by: caller.clone() }]
        }, now)
    }

    pub fn set_crunch_rate(&mut self, caller: &Address, value: u64) -> ContractResult<()> {
        let now = self.now();
        let result = self.state.token.set_crunch_rate(caller, value);
        self.settle("set_crunch_rate", result, |_| parameter("crunch_rate", value), now)
    }

    pub fn set_reward_for_taquero(&mut self, caller: &Address, value: u64) -> ContractResult<()> {
        let now = self.now();
        let result = self.state.token.set_reward_for_taquero(caller, value);
        self.settle("set_reward_for_taquero", result, |_| parameter("reward_for_taquero", value), now)
    }

    pub fn set_taco_tuesday_multiplier(&mut self, caller: &Address, value: u64) -> ContractResult<()> {
        let now = self.now();
        let result = self.state.token.set_taco_tuesday_multiplier(caller, value);
        self.settle(
            "set_taco_tuesday_multiplier",
            result,
            |_| parameter("taco_tuesday_multiplier", value),
            now,
        )
    }

    pub fn set_twitter_proof(&mut self, caller: &Address, tweet_id: u64) -> ContractResult<()> {
        let now = self.now();
        let result = self.state.token.set_twitter_proof(caller, tweet_id);
        self.settle("set_twitter_proof", result, |_| {
            vec![LedgerEvent::SocialProofUpdated {
                field: "twitter_proof".into(),
                value: tweet_id.to_string(),
            }]
        }, now)
    }

    pub fn set_github_proof(&mut self, caller: &Address, proof: String) -> ContractResult<()> {
        let now = self.now();
        let result = self.state.token.set_github_proof(caller, proof.clone());
        self.settle("set_github_proof", result, |_| {
            vec![LedgerEvent::SocialProofUpdated {
                field: "github_proof".into(),
                value: proof.clone(),
            }]
        }, now)
    }

    pub fn transfer_ownership(
        &mut self,
        caller: &Address,
        contract: OwnedContract,
        new_owner: Address,
    ) -> ContractResult<Address> {
        let now = self.now();
        let result = match contract {
            OwnedContract::Token => self.state.token.transfer_ownership(caller, new_owner.clone()),
            OwnedContract::Crowdsale => self.state.sale.transfer_ownership(caller, new_owner.clone()),
        };
        self.settle("transfer_ownership", result, |previous| {
            vec![LedgerEvent::OwnershipTransferred {
                contract: contract.to_string(),
                previous: previous.clone(),
                owner: new_owner.clone(),
            }]
        }, now)
    }

    // -- Sale entry points ------------------------------------------------

    /// `sender` sends `amount` of native value to the sale controller.
    ///
    /// Only the accepted part is debited; a trimmed contribution never
    /// leaves the sender, which is how the refund is realized.
    pub fn send_value(&mut self, sender: &Address, amount: Amount) -> ContractResult<Receipt> {
        let now = self.now();
        let sale_address = self.state.sale.address().clone();
        let result = self
            .state
            .native
            .ensure_covers(sender, amount)
            .and_then(|()| {
                self.state
                    .native
                    .balance_of(&sale_address)
                    .checked_add(amount)
                    .ok_or(ContractError::Overflow("crowdsale value"))
            })
            .and_then(|_| {
                self.state.sale.receive_value(
                    &mut self.state.token,
                    sender,
                    amount,
                    now,
                    self.oracle.as_ref(),
                )
            });
        let receipt = self.settle("send_value", result, receipt_events, now)?;

        // Covered and overflow-checked above.
        self.state
            .native
            .move_value(sender, &sale_address, receipt.debited())?;
        Ok(receipt)
    }

    pub fn set_cooks_list(
        &mut self,
        caller: &Address,
        accounts: Vec<Address>,
    ) -> ContractResult<Vec<Address>> {
        let now = self.now();
        let result = self.state.sale.set_cooks_list(caller, accounts);
        self.settle("set_cooks_list", result, |added| {
            if added.is_empty() {
                Vec::new()
            } else {
                vec![LedgerEvent::CooksListUpdated {
                    added: added.clone(),
                }]
            }
        }, now)
    }

    /// Sends the sale proceeds to the reserve, unpauses the token and locks
    /// the deposit in the pool. Anyone may call it, once, after the hard
    /// cap is reached.
    pub fn add_and_lock_liquidity(&mut self, caller: &Address) -> ContractResult<LiquidityDeposit> {
        let now = self.now();
        let sale_address = self.state.sale.address().clone();
        let controller_value = self.state.native.balance_of(&sale_address);
        let prepared = self.state.finalizer.prepare(
            &self.state.sale,
            &self.state.token,
            controller_value,
            now,
        );
        let deposit = match prepared {
            Ok(deposit) => deposit,
            Err(e) => return Err(self.rejected("add_and_lock_liquidity", caller, e)),
        };
        let reserve_value = self
            .state
            .native
            .balance_of(&deposit.reserve)
            .checked_add(deposit.value);
        if reserve_value.is_none() {
            return Err(self.rejected(
                "add_and_lock_liquidity",
                caller,
                ContractError::Overflow("reserve value"),
            ));
        }

        // Everything below was checked by `prepare`.
        self.state
            .token
            .transfer(&sale_address, &deposit.reserve, deposit.tokens)?;
        self.state
            .native
            .move_value(&sale_address, &deposit.reserve, deposit.value)?;
        let was_paused = self.state.token.is_paused();
        if was_paused {
            self.state.token.unpause(&sale_address, now)?;
        }
        self.state.finalizer.mark_spent(deposit.clone());

        let mut events = vec![LedgerEvent::Transfer {
            from: sale_address.clone(),
            to: deposit.reserve.clone(),
            amount: deposit.tokens,
        }];
        if was_paused {
            events.push(LedgerEvent::Unpaused { by: sale_address });
        }
        events.push(LedgerEvent::LiquidityLocked {
            reserve: deposit.reserve.clone(),
            value: deposit.value,
            tokens: deposit.tokens,
        });
        self.journal
            .append_all(now, events)
            .map_err(|e| self.rejected("add_and_lock_liquidity", caller, e.into()))?;
        tracing::info!(
            %caller,
            reserve = %deposit.reserve,
            value = deposit.value,
            tokens = deposit.tokens,
            "liquidity added and locked"
        );

        if let Err(e) = self.pool.deposit_and_lock(&deposit) {
            tracing::warn!(error = %e, "reserve pool did not accept the deposit");
        }
        Ok(deposit)
    }

    // -- Internals --------------------------------------------------------

    /// Journals the events of a successful call, or logs the rejection.
    fn settle<T>(
        &mut self,
        op: &'static str,
        result: ContractResult<T>,
        events: impl FnOnce(&T) -> Vec<LedgerEvent>,
        now: Timestamp,
    ) -> ContractResult<T> {
        match result {
            Ok(value) => {
                let events = events(&value);
                for event in &events {
                    tracing::debug!(op, event = event.name(), "event recorded");
                }
                if let Err(e) = self.journal.append_all(now, events) {
                    let err = ContractError::from(e);
                    tracing::error!(op, error = %err, code = err.code(), "journal append failed");
                    return Err(err);
                }
                Ok(value)
            }
            Err(e) => {
                if e.kind() == ErrorKind::Invariant {
                    tracing::error!(op, error = %e, code = e.code(), "call failed");
                } else {
                    tracing::warn!(op, error = %e, code = e.code(), "call rejected");
                }
                Err(e)
            }
        }
    }

    fn rejected(&self, op: &'static str, caller: &Address, e: ContractError) -> ContractError {
        if e.kind() == ErrorKind::Invariant {
            tracing::error!(op, %caller, error = %e, code = e.code(), "call failed");
        } else {
            tracing::warn!(op, %caller, error = %e, code = e.code(), "call rejected");
        }
        e
    }
}

fn parameter(name: &str, value: u64) -> Vec<LedgerEvent> {
    vec![LedgerEvent::ParameterUpdated {
        name: name.to_string(),
        value,
    }]
}

fn receipt_events(receipt: &Receipt) -> Vec<LedgerEvent> {
    match receipt {
        Receipt::Deposited { from, amount } => vec![LedgerEvent::ValueDeposited {
            from: from.clone(),
            amount: *amount,
        }],
        Receipt::Purchased(p) => {
            let mut events = vec![LedgerEvent::TokensPurchased {
                buyer: p.buyer.clone(),
                round: p.round.to_string(),
                value: p.accepted,
                tokens: p.tokens,
            }];
            if p.refunded > 0 {
                events.push(LedgerEvent::ValueRefunded {
                    to: p.buyer.clone(),
                    amount: p.refunded,
                });
            }
            events
        }
    }
}
