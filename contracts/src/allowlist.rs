//! # Allow-lists
//!
//! Who may buy in each sale round:
//!
//! | Round  | Eligibility                                     |
//! |--------|-------------------------------------------------|
//! | Cooks  | [`Eligibility::ListMembership`], a stored set   |
//! | Karma  | [`Eligibility::DelegatedQuery`], asks an oracle |
//! | Public | [`Eligibility::Open`], anyone                   |
//!
//! The Karma oracle is an external, read-only reputation service. Whether a
//! *holder* (as opposed to a *member*) also qualifies is a deployment choice
//! captured by [`KarmaPolicy`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use taconomics_protocol::types::Address;

// ---------------------------------------------------------------------------
// Reputation oracle
// ---------------------------------------------------------------------------

/// Read-only reputation collaborator queried for the Karma round.
pub trait ReputationOracle: Send + Sync + fmt::Debug {
    /// Account is a registered community member.
    fn is_member(&self, account: &Address) -> bool;
    /// Account holds the community's reputation token.
    fn is_holder(&self, account: &Address) -> bool;
}

/// Fixed member and holder sets, loaded from genesis config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticReputation {
    #[serde(default)]
    pub members: BTreeSet<Address>,
    #[serde(default)]
    pub holders: BTreeSet<Address>,
}

impl StaticReputation {
    pub fn new(
        members: impl IntoIterator<Item = Address>,
        holders: impl IntoIterator<Item = Address>,
    ) -> Self {
        Self {
            members: members.into_iter().collect(),
            holders: holders.into_iter().collect(),
        }
    }
}

impl ReputationOracle for StaticReputation {
    fn is_member(&self, account: &Address) -> bool {
        self.members.contains(account)
    }

    fn is_holder(&self, account: &Address) -> bool {
        self.holders.contains(account)
    }
}

/// Which reputation answers admit an account to the Karma round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KarmaPolicy {
    /// Members only.
    #[default]
    MemberOnly,
    /// Members or holders.
    MemberOrHolder,
}

impl KarmaPolicy {
    pub fn admits(&self, oracle: &dyn ReputationOracle, account: &Address) -> bool {
        match self {
            KarmaPolicy::MemberOnly => oracle.is_member(account),
            KarmaPolicy::MemberOrHolder => oracle.is_member(account) || oracle.is_holder(account),
        }
    }
}

// ---------------------------------------------------------------------------
// Eligibility
// ---------------------------------------------------------------------------

/// How a round decides who may buy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Eligibility {
    /// Must be on the stored list.
    ListMembership,
    /// Must satisfy the reputation oracle under the given policy.
    DelegatedQuery(KarmaPolicy),
    /// No gate.
    Open,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// The stored Cooks list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllowlistRegistry {
    cooks: BTreeSet<Address>,
}

impl AllowlistRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `accounts` to the Cooks list. Accounts already present are left
    /// alone. Returns the ones that were actually added.
    pub fn add_cooks(&mut self, accounts: impl IntoIterator<Item = Address>) -> Vec<Address> {
        accounts
            .into_iter()
            .filter(|a| self.cooks.insert(a.clone()))
            .collect()
    }

    pub fn is_cook(&self, account: &Address) -> bool {
        self.cooks.contains(account)
    }

    pub fn cooks(&self) -> impl Iterator<Item = &Address> {
        self.cooks.iter()
    }

    pub fn len(&self) -> usize {
        self.cooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cooks.is_empty()
    }

    /// Whether `account` passes `rule`.
    pub fn is_eligible(
        &self,
        rule: Eligibility,
        account: &Address,
        oracle: &dyn ReputationOracle,
    ) -> bool {
        match rule {
            Eligibility::ListMembership => self.is_cook(account),
            Eligibility::DelegatedQuery(policy) => policy.admits(oracle, account),
            Eligibility::Open => true,
        }
    }
}
