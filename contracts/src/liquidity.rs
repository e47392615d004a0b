//! # Liquidity Finalizer
//!
//! Once the hard cap is reached the sale's proceeds seed the reserve pool:
//! every raised unit of native value plus `wei_raised * tacos_per_unit`
//! tokens move to the reserve, the token is unpaused and the pool locks the
//! deposit. This can happen exactly once.
//!
//! The pool itself (an exchange pair in the original deployment) is not part
//! of this crate. It sits behind [`ReservePool`] and only ever hears about a
//! deposit after the ledger has committed it.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use taconomics_protocol::types::{amount_string, Address, Amount, Timestamp};

use crate::crowdsale::TacosCrowdsale;
use crate::error::{ContractError, ContractResult};
use crate::taco_token::TacoToken;

// ---------------------------------------------------------------------------
// Reserve pool collaborator
// ---------------------------------------------------------------------------

/// Errors reported by a [`ReservePool`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("pool rejected the deposit: {0}")]
    Rejected(String),

    #[error("pool already holds a locked deposit")]
    AlreadyLocked,
}

/// External liquidity pool the reserve account feeds.
pub trait ReservePool: Send + Sync + fmt::Debug {
    /// Add `deposit` as liquidity and lock it.
    fn deposit_and_lock(&self, deposit: &LiquidityDeposit) -> Result<(), PoolError>;

    /// The reserve's token balance changed underneath the pool; re-read it.
    fn sync(&self, reserve_balance: Amount);
}

/// Value and tokens handed to the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityDeposit {
    pub reserve: Address,
    #[serde(with = "amount_string")]
    pub value: Amount,
    #[serde(with = "amount_string")]
    pub tokens: Amount,
    pub locked_at: Timestamp,
}

#[derive(Debug, Default)]
struct PoolState {
    locked: Option<LiquidityDeposit>,
    synced_balance: Amount,
    syncs: u64,
}

/// In-process pool that records what it is told. Used by the node when no
/// external pool is wired in, and by tests.
#[derive(Debug, Default)]
pub struct LockedPool {
    state: Mutex<PoolState>,
}

impl LockedPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn locked(&self) -> Option<LiquidityDeposit> {
        self.state.lock().locked.clone()
    }

    /// Last reserve balance reported by [`ReservePool::sync`].
    pub fn synced_balance(&self) -> Amount {
        self.state.lock().synced_balance
    }

    pub fn sync_count(&self) -> u64 {
        self.state.lock().syncs
    }
}

impl ReservePool for LockedPool {
    fn deposit_and_lock(&self, deposit: &LiquidityDeposit) -> Result<(), PoolError> {
        let mut state = self.state.lock();
        if state.locked.is_some() {
            return Err(PoolError::AlreadyLocked);
        }
        tracing::info!(reserve = %deposit.reserve, value = deposit.value, tokens = deposit.tokens, "liquidity locked in pool");
        state.locked = Some(deposit.clone());
        state.synced_balance = deposit.tokens;
        Ok(())
    }

    fn sync(&self, reserve_balance: Amount) {
        let mut state = self.state.lock();
        state.synced_balance = reserve_balance;
        state.syncs += 1;
    }
}

// ---------------------------------------------------------------------------
// Finalizer
// ---------------------------------------------------------------------------

/// Single-shot switch guarding the liquidity step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiquidityFinalizer {
    #[default]
    Armed,
    Spent(LiquidityDeposit),
}

impl LiquidityFinalizer {
    pub fn is_spent(&self) -> bool {
        matches!(self, LiquidityFinalizer::Spent(_))
    }

    pub fn deposit(&self) -> Option<&LiquidityDeposit> {
        match self {
            LiquidityFinalizer::Spent(deposit) => Some(deposit),
            LiquidityFinalizer::Armed => None,
        }
    }

    /// Works out the deposit without touching anything.
    ///
    /// `controller_value` is the native value currently held by the sale
    /// controller, all of which goes to the reserve.
    ///
    /// # Errors
    ///
    /// - [`ContractError::LiquidityAlreadyLocked`] once spent.
    /// - [`ContractError::SaleNotEnded`] before the hard cap is reached.
    /// - [`ContractError::ReserveNotSet`] if the token has no reserve.
    /// - [`ContractError::PauserOnly`] if the token is still paused and the
    ///   controller no longer holds the pauser role.
    /// - [`ContractError::InvariantViolation`] if the controller holds fewer
    ///   tokens than the deposit needs.
    pub fn prepare(
        &self,
        sale: &TacosCrowdsale,
        token: &TacoToken,
        controller_value: Amount,
        now: Timestamp,
    ) -> ContractResult<LiquidityDeposit> {
        if self.is_spent() {
            return Err(ContractError::LiquidityAlreadyLocked);
        }
        if !sale.has_ended() {
            return Err(ContractError::SaleNotEnded);
        }
        let reserve = token.reserve().cloned().ok_or(ContractError::ReserveNotSet)?;
        if token.is_paused() && !token.gate().is_pauser(sale.address()) {
            return Err(ContractError::PauserOnly);
        }

        let tokens = sale
            .wei_raised()
            .checked_mul(sale.tacos_per_unit())
            .ok_or(ContractError::Overflow("liquidity tokens"))?;
        let held = token.balance_of(sale.address());
        if held < tokens {
            let err = ContractError::InvariantViolation(format!(
                "crowdsale holds {held} tacos but liquidity needs {tokens}"
            ));
            tracing::error!(error = %err, "liquidity aborted");
            return Err(err);
        }

        Ok(LiquidityDeposit {
            reserve,
            value: controller_value,
            tokens,
            locked_at: now,
        })
    }

    /// Disarms the finalizer for good.
    pub fn mark_spent(&mut self, deposit: LiquidityDeposit) {
        *self = LiquidityFinalizer::Spent(deposit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deposit() -> LiquidityDeposit {
        LiquidityDeposit {
            reserve: Address::new("reserve").unwrap(),
            value: 210,
            tokens: 210 * 34_596,
            locked_at: 1,
        }
    }

    #[test]
    fn pool_locks_once() {
        let pool = LockedPool::new();
        pool.deposit_and_lock(&deposit()).unwrap();
        assert_eq!(pool.locked(), Some(deposit()));
        assert_eq!(pool.deposit_and_lock(&deposit()), Err(PoolError::AlreadyLocked));
    }

    #[test]
    fn pool_tracks_syncs() {
        let pool = LockedPool::new();
        pool.sync(10);
        pool.sync(7);
        assert_eq!(pool.synced_balance(), 7);
        assert_eq!(pool.sync_count(), 2);
    }

    #[test]
    fn finalizer_is_single_shot() {
        let mut finalizer = LiquidityFinalizer::default();
        assert!(!finalizer.is_spent());
        finalizer.mark_spent(deposit());
        assert!(finalizer.is_spent());
        assert_eq!(finalizer.deposit(), Some(&deposit()));
    }
}
