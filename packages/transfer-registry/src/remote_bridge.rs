//! RemoteBridge registry
//!
//! Write-once records keyed by the local transfer hash, plus the block
//! checkpoint the relayer advances after every scan.

use tracing::{debug, info};

use crate::error::RegistryError;
use crate::events::Notification;
use crate::ownership::Ownable;
use crate::payment_manager::DEFAULT_VERSION;
use crate::store::RecordStore;
use crate::types::{BridgeRecord, Bytes32, EvmAddress};

#[derive(Debug, Clone)]
pub struct RemoteBridge {
    ownership: Ownable,
    transfers: RecordStore<BridgeRecord>,
    last_block: u64,
    version: String,
}

impl RemoteBridge {
    pub fn new(owner: EvmAddress) -> Self {
        Self::with_version(owner, DEFAULT_VERSION)
    }

    pub fn with_version(owner: EvmAddress, version: impl Into<String>) -> Self {
        Self {
            ownership: Ownable::new(owner),
            transfers: RecordStore::new(),
            last_block: 0,
            version: version.into(),
        }
    }

    pub fn owner(&self) -> EvmAddress {
        self.ownership.owner()
    }

    pub fn is_owner(&self, account: &EvmAddress) -> bool {
        self.ownership.is_owner(account)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn transfers(&self, local: &Bytes32) -> BridgeRecord {
        self.transfers.get(local)
    }

    pub fn get_last_block(&self) -> u64 {
        self.last_block
    }

    pub fn ownership(&self) -> &Ownable {
        &self.ownership
    }

    pub fn register(
        &mut self,
        caller: &EvmAddress,
        local: Bytes32,
        remote: Bytes32,
        signer: EvmAddress,
        nonce: u64,
    ) -> Result<Notification, RegistryError> {
        self.ownership.ensure_owner(caller)?;
        if self.transfers.get(&local).exist {
            return Err(RegistryError::AlreadyExists { hash: local });
        }

        self.transfers.put(
            local,
            BridgeRecord {
                hash: local,
                signer,
                nonce,
                exist: true,
            },
        );

        info!(
            local = %local,
            remote = %remote,
            signer = %signer,
            nonce = nonce,
            "Transfer registered"
        );

        Ok(Notification::TransferRegistered {
            hash: local,
            signer,
            nonce,
        })
    }

    /// Point an existing record at its remote counterpart.
    ///
    /// The emitted notification carries the signer and nonce captured at
    /// registration, not anything supplied here.
    pub fn update(
        &mut self,
        caller: &EvmAddress,
        local: Bytes32,
        remote: Bytes32,
    ) -> Result<Notification, RegistryError> {
        self.ownership.ensure_owner(caller)?;

        let mut record = self.transfers.get(&local);
        if !record.exist {
            return Err(RegistryError::RecordNotFound { hash: local });
        }

        record.hash = remote;
        self.transfers.put(local, record);

        info!(local = %local, remote = %remote, "Transfer updated");

        Ok(Notification::TransferRegistered {
            hash: local,
            signer: record.signer,
            nonce: record.nonce,
        })
    }

    /// Store the relayer checkpoint. Emits nothing.
    pub fn set_last_block(&mut self, caller: &EvmAddress, block: u64) -> Result<(), RegistryError> {
        self.ownership.ensure_owner(caller)?;
        if block < self.last_block {
            debug!(current = self.last_block, new = block, "Checkpoint moved backwards");
        }
        self.last_block = block;
        Ok(())
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
}
