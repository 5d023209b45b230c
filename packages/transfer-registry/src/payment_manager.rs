//! PaymentManager transfer lifecycle
//!
//! ```text
//!              submitPending              submitSuccess
//!   Unknown ─────────────────▶ Pending ─────────────────▶ Success ─┐
//!      ▲                          │                                │
//!      │                          │ submitFailed                   │
//!      │                          ▼                                │
//!      │                        Failed ────────────────────────────┤
//!      │                                                           │
//!      └──────────────────────── requestRetry ◀────────────────────┘
//! ```
//!
//! `requestRetry` wipes the record back to the zero value, so the same
//! local hash can be submitted as pending again.
//!
//! Each successful operation returns the single notification it emits;
//! a rejected operation leaves state untouched and emits nothing.

use tracing::{debug, info};

use crate::error::RegistryError;
use crate::events::Notification;
use crate::ownership::Ownable;
use crate::store::RecordStore;
use crate::types::{Bytes32, EvmAddress, PaymentRecord, TransferState};

/// Version reported by `version()` unless overridden
pub const DEFAULT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone)]
pub struct PaymentManager {
    ownership: Ownable,
    transfers: RecordStore<PaymentRecord>,
    version: String,
}

impl PaymentManager {
    pub fn new(owner: EvmAddress) -> Self {
        Self::with_version(owner, DEFAULT_VERSION)
    }

    pub fn with_version(owner: EvmAddress, version: impl Into<String>) -> Self {
        Self {
            ownership: Ownable::new(owner),
            transfers: RecordStore::new(),
            version: version.into(),
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn owner(&self) -> EvmAddress {
        self.ownership.owner()
    }

    pub fn is_owner(&self, account: &EvmAddress) -> bool {
        self.ownership.is_owner(account)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// `transfers(bytes32)`: the stored record verbatim (zero if never submitted)
    pub fn transfers(&self, hash: &Bytes32) -> PaymentRecord {
        self.transfers.get(hash)
    }

    pub fn ownership(&self) -> &Ownable {
        &self.ownership
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    pub fn submit_pending(
        &mut self,
        caller: &EvmAddress,
        signer: EvmAddress,
        nonce: u64,
        local: Bytes32,
        foreign: Bytes32,
    ) -> Result<Notification, RegistryError> {
        self.ownership.ensure_owner(caller)?;
        validate_hashes(&local, &foreign)?;
        if signer.is_zero() {
            return Err(RegistryError::invalid("invalid address"));
        }

        let current = self.transfers.get(&local);
        if current.state != TransferState::Unknown {
            return Err(RegistryError::AlreadyExists { hash: local });
        }

        self.transfers.put(
            local,
            PaymentRecord {
                hash: local,
                signer,
                nonce,
                state: TransferState::Pending,
            },
        );

        info!(
            local = %local,
            foreign = %foreign,
            signer = %signer,
            nonce = nonce,
            "Transfer pending"
        );

        Ok(Notification::PendingTransfer {
            signer,
            nonce,
            tx_hash: local,
        })
    }

    pub fn submit_success(
        &mut self,
        caller: &EvmAddress,
        local: Bytes32,
        foreign: Bytes32,
    ) -> Result<Notification, RegistryError> {
        self.complete(caller, local, foreign, TransferState::Success)?;
        Ok(Notification::TxSuccess { local, foreign })
    }

    pub fn submit_failed(
        &mut self,
        caller: &EvmAddress,
        local: Bytes32,
        foreign: Bytes32,
    ) -> Result<Notification, RegistryError> {
        self.complete(caller, local, foreign, TransferState::Failed)?;
        Ok(Notification::TxFailed { local, foreign })
    }

    /// Reopen a terminal record so it can be submitted again
    pub fn request_retry(
        &mut self,
        caller: &EvmAddress,
        tx_hash: Bytes32,
    ) -> Result<Notification, RegistryError> {
        self.ownership.ensure_owner(caller)?;
        if tx_hash.is_zero() {
            return Err(RegistryError::invalid("invalid tx hash"));
        }

        let current = self.transfers.get(&tx_hash);
        if !current.state.is_terminal() {
            return Err(RegistryError::InvalidState {
                hash: tx_hash,
                state: current.state,
            });
        }

        let previous = self.transfers.clear(&tx_hash);
        info!(
            tx_hash = %tx_hash,
            previous_state = %previous.state,
            "Transfer reset for retry"
        );

        Ok(Notification::Retry { tx_hash })
    }

    pub fn transfer_ownership(
        &mut self,
        caller: &EvmAddress,
        new_owner: EvmAddress,
    ) -> Result<Notification, RegistryError> {
        self.ownership.transfer_ownership(caller, new_owner)
    }

    pub fn renounce_ownership(&mut self, caller: &EvmAddress) -> Result<Notification, RegistryError> {
        self.ownership.renounce_ownership(caller)
    }

    /// Pending → Success / Failed
    fn complete(
        &mut self,
        caller: &EvmAddress,
        local: Bytes32,
        foreign: Bytes32,
        outcome: TransferState,
    ) -> Result<(), RegistryError> {
        self.ownership.ensure_owner(caller)?;
        validate_hashes(&local, &foreign)?;

        let mut record = self.transfers.get(&local);
        if record.state != TransferState::Pending {
            return Err(RegistryError::InvalidState {
                hash: local,
                state: record.state,
            });
        }

        record.state = outcome;
        record.hash = local;
        self.transfers.put(local, record);

        debug!(local = %local, foreign = %foreign, state = %outcome, "Transfer completed");
        Ok(())
    }
}

fn validate_hashes(local: &Bytes32, foreign: &Bytes32) -> Result<(), RegistryError> {
    if local.is_zero() {
        return Err(RegistryError::invalid("invalid local tx hash"));
    }
    if foreign.is_zero() {
        return Err(RegistryError::invalid("invalid foreign tx hash"));
    }
    Ok(())
}
