//! Single-owner access control
//!
//! Every mutating registry operation goes through [`Ownable::ensure_owner`]
//! before touching state. Renouncing sets the owner to the zero address,
//! after which no caller can pass the gate again.

use tracing::info;

use crate::error::RegistryError;
use crate::events::Notification;
use crate::types::EvmAddress;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ownable {
    owner: EvmAddress,
}

impl Ownable {
    /// Ownership held by the deploying account
    pub fn new(owner: EvmAddress) -> Self {
        Self { owner }
    }

    /// The notification a fresh deployment emits: `OwnershipTransferred(0, owner)`
    pub fn deployment_notification(&self) -> Notification {
        Notification::OwnershipTransferred {
            previous_owner: EvmAddress::ZERO,
            new_owner: self.owner,
        }
    }

    pub fn owner(&self) -> EvmAddress {
        self.owner
    }

    /// Whether `account` is the current owner. Always false once renounced.
    pub fn is_owner(&self, account: &EvmAddress) -> bool {
        !self.owner.is_zero() && *account == self.owner
    }

    pub fn ensure_owner(&self, caller: &EvmAddress) -> Result<(), RegistryError> {
        if !self.is_owner(caller) {
            return Err(RegistryError::Unauthorized { caller: *caller });
        }
        Ok(())
    }

    pub fn transfer_ownership(
        &mut self,
        caller: &EvmAddress,
        new_owner: EvmAddress,
    ) -> Result<Notification, RegistryError> {
        self.ensure_owner(caller)?;
        if new_owner.is_zero() {
            return Err(RegistryError::invalid("new owner is the zero address"));
        }

        Ok(self.replace_owner(new_owner))
    }

    pub fn renounce_ownership(&mut self, caller: &EvmAddress) -> Result<Notification, RegistryError> {
        self.ensure_owner(caller)?;
        Ok(self.replace_owner(EvmAddress::ZERO))
    }

    fn replace_owner(&mut self, new_owner: EvmAddress) -> Notification {
        let previous_owner = std::mem::replace(&mut self.owner, new_owner);
        info!(
            previous_owner = %previous_owner,
            new_owner = %new_owner,
            "Ownership transferred"
        );
        Notification::OwnershipTransferred {
            previous_owner,
            new_owner,
        }
    }
}
