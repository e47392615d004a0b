//! # Access Gate
//!
//! Owner and pauser roles for the token.
//!
//! The token starts paused, with the deployer as pauser. The pauser (and
//! only the pauser) may move tokens while paused, which is how the sale
//! controller hands out tokens before trading opens. When the pauser
//! unpauses, the role is burned:
//!
//! ```text
//!   Active(pauser) ──unpause()──► Burned
//!        │  ▲
//!        └──┘ set_pauser() (owner only)
//! ```
//!
//! There is no path from `Burned` back to `Active`, and no `pause()`. The
//! pause flag is not stored separately: `Active` means paused and `Burned`
//! means unpaused, so "unpaused but someone still holds the pauser role"
//! cannot be represented.

use serde::{Deserialize, Serialize};

use taconomics_protocol::types::Address;

use crate::error::{ContractError, ContractResult};

/// Who holds the pauser role, if anyone still can.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PauserState {
    /// Paused; this account may unpause and may transfer while paused.
    Active(Address),
    /// Unpaused for good. Nobody holds the role and nobody ever will.
    Burned,
}

/// Owner + pauser roles with their guard functions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessGate {
    owner: Address,
    pauser: PauserState,
}

impl AccessGate {
    /// Paused, with `deployer` as both owner and pauser.
    pub fn new(deployer: Address) -> Self {
        Self {
            pauser: PauserState::Active(deployer.clone()),
            owner: deployer,
        }
    }

    pub fn owner(&self) -> &Address {
        &self.owner
    }

    /// Current pauser, or `None` once burned.
    pub fn pauser(&self) -> Option<&Address> {
        match &self.pauser {
            PauserState::Active(pauser) => Some(pauser),
            PauserState::Burned => None,
        }
    }

    pub fn pauser_state(&self) -> &PauserState {
        &self.pauser
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.pauser, PauserState::Active(_))
    }

    pub fn is_burned(&self) -> bool {
        matches!(self.pauser, PauserState::Burned)
    }

    /// Returns `true` if `account` is the current pauser.
    pub fn is_pauser(&self, account: &Address) -> bool {
        self.pauser() == Some(account)
    }

    // -- Guards -----------------------------------------------------------

    /// Fails with [`ContractError::OwnerOnly`] unless `caller` is the owner.
    pub fn ensure_owner(&self, caller: &Address) -> ContractResult<()> {
        if caller != &self.owner {
            return Err(ContractError::OwnerOnly);
        }
        Ok(())
    }

    /// Fails with [`ContractError::Paused`] while paused.
    pub fn ensure_not_paused(&self) -> ContractResult<()> {
        if self.is_paused() {
            return Err(ContractError::Paused);
        }
        Ok(())
    }

    /// Fails with [`ContractError::Paused`] if `sender` may not move tokens
    /// right now. The pauser always may.
    pub fn ensure_can_transfer(&self, sender: &Address) -> ContractResult<()> {
        if self.is_paused() && !self.is_pauser(sender) {
            return Err(ContractError::Paused);
        }
        Ok(())
    }

    // -- Transitions ------------------------------------------------------

    /// Hands the pauser role to `new_pauser`. Returns the previous pauser.
    ///
    /// # Errors
    ///
    /// [`ContractError::OwnerOnly`] if `caller` is not the owner,
    /// [`ContractError::PauserBurned`] once the role has been burned.
    pub fn set_pauser(&mut self, caller: &Address, new_pauser: Address) -> ContractResult<Address> {
        self.ensure_owner(caller)?;
        match &mut self.pauser {
            PauserState::Active(current) => Ok(std::mem::replace(current, new_pauser)),
            PauserState::Burned => Err(ContractError::PauserBurned),
        }
    }

    /// Unpauses and burns the pauser role.
    ///
    /// # Errors
    ///
    /// [`ContractError::PauserBurned`] if already unpaused,
    /// [`ContractError::PauserOnly`] if `caller` is not the pauser.
    pub fn unpause(&mut self, caller: &Address) -> ContractResult<()> {
        match &self.pauser {
            PauserState::Burned => Err(ContractError::PauserBurned),
            PauserState::Active(pauser) if pauser != caller => Err(ContractError::PauserOnly),
            PauserState::Active(_) => {
                self.pauser = PauserState::Burned;
                Ok(())
            }
        }
    }

    /// Moves ownership to `new_owner`. Returns the previous owner.
    pub fn transfer_ownership(
        &mut self,
        caller: &Address,
        new_owner: Address,
    ) -> ContractResult<Address> {
        self.ensure_owner(caller)?;
        Ok(std::mem::replace(&mut self.owner, new_owner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    #[test]
    fn starts_paused_with_deployer_as_pauser() {
        let gate = AccessGate::new(addr("deployer"));
        assert!(gate.is_paused());
        assert_eq!(gate.pauser(), Some(&addr("deployer")));
        assert_eq!(gate.owner(), &addr("deployer"));
    }

    #[test]
    fn only_pauser_transfers_while_paused() {
        let gate = AccessGate::new(addr("deployer"));
        assert!(gate.ensure_can_transfer(&addr("deployer")).is_ok());
        assert_eq!(
            gate.ensure_can_transfer(&addr("alice")),
            Err(ContractError::Paused)
        );
    }

    #[test]
    fn owner_can_reassign_pauser_even_when_not_pauser() {
        let mut gate = AccessGate::new(addr("deployer"));
        let previous = gate.set_pauser(&addr("deployer"), addr("alice")).unwrap();
        assert_eq!(previous, addr("deployer"));
        gate.set_pauser(&addr("deployer"), addr("deployer")).unwrap();
        assert_eq!(gate.pauser(), Some(&addr("deployer")));
    }

    #[test]
    fn pauser_cannot_reassign_itself() {
        let mut gate = AccessGate::new(addr("deployer"));
        gate.set_pauser(&addr("deployer"), addr("alice")).unwrap();
        assert_eq!(
            gate.set_pauser(&addr("alice"), addr("bob")),
            Err(ContractError::OwnerOnly)
        );
    }

    #[test]
    fn non_pauser_cannot_unpause() {
        let mut gate = AccessGate::new(addr("deployer"));
        assert_eq!(gate.unpause(&addr("alice")), Err(ContractError::PauserOnly));
        assert!(gate.is_paused());
    }

    #[test]
    fn unpause_burns_the_pauser_for_good() {
        let mut gate = AccessGate::new(addr("deployer"));
        gate.unpause(&addr("deployer")).unwrap();

        assert!(!gate.is_paused());
        assert!(gate.is_burned());
        assert_eq!(gate.pauser(), None);
        assert_eq!(
            gate.set_pauser(&addr("deployer"), addr("deployer")),
            Err(ContractError::PauserBurned)
        );
        assert_eq!(gate.unpause(&addr("deployer")), Err(ContractError::PauserBurned));
        assert!(gate.ensure_can_transfer(&addr("anyone")).is_ok());
    }

    #[test]
    fn ownership_moves() {
        let mut gate = AccessGate::new(addr("deployer"));
        gate.transfer_ownership(&addr("deployer"), addr("dao")).unwrap();
        assert_eq!(gate.owner(), &addr("dao"));
        assert_eq!(
            gate.transfer_ownership(&addr("deployer"), addr("x")),
            Err(ContractError::OwnerOnly)
        );
    }
}
