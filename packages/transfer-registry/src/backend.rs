//! Contract backend traits
//!
//! The registries are driven through these traits so the same caller code
//! runs against the in-process [`crate::local::LocalChain`] and a live EVM
//! node. Every mutating call returns a [`PendingTx`]: the submission has
//! been accepted, and the receipt arrives whenever the chain includes it.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::{BackendError, BackendResult};
use crate::events::{EventFilter, LoggedEvent};
use crate::subscription::EventSubscription;
use crate::types::{BlockRange, BridgeRecord, Bytes32, EvmAddress, PaymentRecord};

/// Inclusion proof of a submitted call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: Bytes32,
    pub block_number: u64,
}

/// Handle to a submitted, not yet confirmed transaction
pub struct PendingTx {
    tx_hash: Bytes32,
    receipt: BoxFuture<'static, BackendResult<TxReceipt>>,
}

impl PendingTx {
    pub fn new(
        tx_hash: Bytes32,
        receipt: impl std::future::Future<Output = BackendResult<TxReceipt>> + Send + 'static,
    ) -> Self {
        Self {
            tx_hash,
            receipt: receipt.boxed(),
        }
    }

    /// A transaction that is already included
    pub fn confirmed(receipt: TxReceipt) -> Self {
        Self::new(receipt.tx_hash, futures::future::ready(Ok(receipt)))
    }

    pub fn tx_hash(&self) -> Bytes32 {
        self.tx_hash
    }

    /// Wait for inclusion, however long it takes
    pub async fn confirm(self) -> BackendResult<TxReceipt> {
        self.receipt.await
    }

    /// Wait for inclusion for at most `timeout`
    pub async fn confirm_within(self, timeout: Duration) -> BackendResult<TxReceipt> {
        match tokio::time::timeout(timeout, self.receipt).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(timeout)),
        }
    }
}

impl fmt::Debug for PendingTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTx")
            .field("tx_hash", &self.tx_hash)
            .finish_non_exhaustive()
    }
}

/// Historical and live access to a contract's notifications
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Current head block
    async fn block_number(&self) -> BackendResult<u64>;

    /// Notifications emitted by this contract inside `range`, in chain order
    async fn get_logs(&self, filter: &EventFilter, range: BlockRange)
        -> BackendResult<Vec<LoggedEvent>>;

    /// Live notifications from this contract emitted after the call
    async fn subscribe(&self, filter: EventFilter) -> BackendResult<EventSubscription>;
}

/// Reads and writes shared by both contracts
#[async_trait]
pub trait OwnableBackend: EventSource {
    /// The account this handle sends transactions from
    fn account(&self) -> EvmAddress;

    async fn owner(&self) -> BackendResult<EvmAddress>;

    /// `isOwner()` as seen from [`OwnableBackend::account`]
    async fn is_owner(&self) -> BackendResult<bool> {
        let owner = self.owner().await?;
        Ok(!owner.is_zero() && owner == self.account())
    }

    async fn version(&self) -> BackendResult<String>;

    async fn transfer_ownership(&self, new_owner: EvmAddress) -> BackendResult<PendingTx>;

    async fn renounce_ownership(&self) -> BackendResult<PendingTx>;
}

#[async_trait]
pub trait PaymentManagerBackend: OwnableBackend {
    async fn transfers(&self, hash: Bytes32) -> BackendResult<PaymentRecord>;

    async fn submit_pending(
        &self,
        signer: EvmAddress,
        nonce: u64,
        local: Bytes32,
        foreign: Bytes32,
    ) -> BackendResult<PendingTx>;

    async fn submit_success(&self, local: Bytes32, foreign: Bytes32) -> BackendResult<PendingTx>;

    async fn submit_failed(&self, local: Bytes32, foreign: Bytes32) -> BackendResult<PendingTx>;

    async fn request_retry(&self, tx_hash: Bytes32) -> BackendResult<PendingTx>;
}

#[async_trait]
pub trait RemoteBridgeBackend: OwnableBackend {
    async fn transfers(&self, local: Bytes32) -> BackendResult<BridgeRecord>;

    async fn get_last_block(&self) -> BackendResult<u64>;

    async fn register(
        &self,
        local: Bytes32,
        remote: Bytes32,
        signer: EvmAddress,
        nonce: u64,
    ) -> BackendResult<PendingTx>;

    async fn update(&self, local: Bytes32, remote: Bytes32) -> BackendResult<PendingTx>;

    async fn set_last_block(&self, block: u64) -> BackendResult<PendingTx>;
}
