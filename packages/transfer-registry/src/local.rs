//! In-process chain hosting both registries
//!
//! `LocalChain` is the serializing authority: every call takes the same
//! lock, and a successful mutating call mines exactly one block holding at
//! most one notification. Rejected calls mine nothing and emit nothing.
//!
//! Handles returned by [`LocalChain::payment_manager`] and
//! [`LocalChain::remote_bridge`] are bound to a caller address and
//! implement the backend traits, so they are interchangeable with the EVM
//! backends.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::backend::{
    EventSource, OwnableBackend, PaymentManagerBackend, PendingTx, RemoteBridgeBackend, TxReceipt,
};
use crate::emitter::EventLog;
use crate::error::{BackendResult, RegistryError};
use crate::events::{ContractKind, EventFilter, LoggedEvent, Notification};
use crate::hash::keccak256;
use crate::payment_manager::PaymentManager;
use crate::remote_bridge::RemoteBridge;
use crate::subscription::{relay_broadcast, EventSubscription, SUBSCRIPTION_BUFFER};
use crate::types::{BlockRange, BridgeRecord, Bytes32, EvmAddress, PaymentRecord};

#[derive(Debug)]
struct ChainState {
    block_number: u64,
    payment: PaymentManager,
    bridge: RemoteBridge,
    log: EventLog,
}

#[derive(Debug, Clone)]
pub struct LocalChain {
    state: Arc<Mutex<ChainState>>,
}

impl LocalChain {
    /// Deploy both contracts from `deployer`
    pub fn new(deployer: EvmAddress) -> Self {
        Self::with_owners(deployer, deployer)
    }

    /// Deploy each contract from a different account. Deployment events
    /// land in the genesis block.
    pub fn with_owners(payment_owner: EvmAddress, bridge_owner: EvmAddress) -> Self {
        let payment = PaymentManager::new(payment_owner);
        let bridge = RemoteBridge::new(bridge_owner);
        let mut log = EventLog::new();

        log.emit(
            ContractKind::PaymentManager,
            payment.ownership().deployment_notification(),
            0,
            deployment_hash(ContractKind::PaymentManager, &payment_owner),
        );
        log.emit(
            ContractKind::RemoteBridge,
            bridge.ownership().deployment_notification(),
            0,
            deployment_hash(ContractKind::RemoteBridge, &bridge_owner),
        );

        Self {
            state: Arc::new(Mutex::new(ChainState {
                block_number: 0,
                payment,
                bridge,
                log,
            })),
        }
    }

    pub fn payment_manager(&self, caller: EvmAddress) -> LocalPaymentManager {
        LocalPaymentManager {
            chain: self.clone(),
            caller,
        }
    }

    pub fn remote_bridge(&self, caller: EvmAddress) -> LocalRemoteBridge {
        LocalRemoteBridge {
            chain: self.clone(),
            caller,
        }
    }

    pub async fn head(&self) -> u64 {
        self.state.lock().await.block_number
    }

    /// Mine `count` empty blocks
    pub async fn advance(&self, count: u64) -> u64 {
        let mut state = self.state.lock().await;
        state.block_number += count;
        state.block_number
    }

    /// Total number of notifications logged so far
    pub async fn log_len(&self) -> usize {
        self.state.lock().await.log.len()
    }

    async fn execute<F>(
        &self,
        contract: ContractKind,
        caller: &EvmAddress,
        call: F,
    ) -> BackendResult<PendingTx>
    where
        F: FnOnce(&mut ChainState) -> Result<Option<Notification>, RegistryError>,
    {
        let mut state = self.state.lock().await;
        let notification = call(&mut *state)?;

        state.block_number += 1;
        let block_number = state.block_number;
        let tx_hash = tx_hash(contract, caller, block_number);

        if let Some(notification) = notification {
            state.log.emit(contract, notification, block_number, tx_hash);
        }

        debug!(
            contract = %contract,
            caller = %caller,
            block = block_number,
            tx_hash = %tx_hash,
            "Local transaction mined"
        );

        Ok(PendingTx::confirmed(TxReceipt {
            tx_hash,
            block_number,
        }))
    }

    async fn logs(
        &self,
        contract: ContractKind,
        filter: &EventFilter,
        range: BlockRange,
    ) -> Vec<LoggedEvent> {
        let Some(scoped) = scope_filter(contract, filter) else {
            return Vec::new();
        };
        let state = self.state.lock().await;
        state.log.query(&scoped, range).cloned().collect()
    }

    async fn watch(&self, contract: ContractKind, filter: EventFilter) -> EventSubscription {
        // Taking the feed under the lock: nothing emitted after this call is missed
        let source = self.state.lock().await.log.subscribe_raw();
        let scoped = scope_filter(contract, &filter);
        EventSubscription::spawn(SUBSCRIPTION_BUFFER, move |sink, cancel| async move {
            if let Some(scoped) = scoped {
                relay_broadcast(source, scoped, sink, cancel).await;
            }
        })
    }
}

/// Restrict `filter` to `contract`, or `None` if it targets another one
fn scope_filter(contract: ContractKind, filter: &EventFilter) -> Option<EventFilter> {
    match filter.contract {
        Some(other) if other != contract => None,
        _ => Some(filter.clone().contract(contract)),
    }
}

fn tx_hash(contract: ContractKind, caller: &EvmAddress, block_number: u64) -> Bytes32 {
    let mut preimage = Vec::with_capacity(64);
    preimage.extend_from_slice(contract.as_str().as_bytes());
    preimage.extend_from_slice(caller.as_bytes());
    preimage.extend_from_slice(&block_number.to_be_bytes());
    Bytes32(keccak256(&preimage))
}

fn deployment_hash(contract: ContractKind, deployer: &EvmAddress) -> Bytes32 {
    let mut preimage = b"deploy".to_vec();
    preimage.extend_from_slice(contract.as_str().as_bytes());
    preimage.extend_from_slice(deployer.as_bytes());
    Bytes32(keccak256(&preimage))
}

// =============================================================================
// PaymentManager handle
// =============================================================================

#[derive(Debug, Clone)]
pub struct LocalPaymentManager {
    chain: LocalChain,
    caller: EvmAddress,
}

impl LocalPaymentManager {
    /// Same contract, different sender
    pub fn as_caller(&self, caller: EvmAddress) -> Self {
        Self {
            chain: self.chain.clone(),
            caller,
        }
    }

    pub fn chain(&self) -> &LocalChain {
        &self.chain
    }
}

#[async_trait]
impl EventSource for LocalPaymentManager {
    async fn block_number(&self) -> BackendResult<u64> {
        Ok(self.chain.head().await)
    }

    async fn get_logs(
        &self,
        filter: &EventFilter,
        range: BlockRange,
    ) -> BackendResult<Vec<LoggedEvent>> {
        Ok(self
            .chain
            .logs(ContractKind::PaymentManager, filter, range)
            .await)
    }

    async fn subscribe(&self, filter: EventFilter) -> BackendResult<EventSubscription> {
        Ok(self.chain.watch(ContractKind::PaymentManager, filter).await)
    }
}

#[async_trait]
impl OwnableBackend for LocalPaymentManager {
    fn account(&self) -> EvmAddress {
        self.caller
    }

    async fn owner(&self) -> BackendResult<EvmAddress> {
        Ok(self.chain.state.lock().await.payment.owner())
    }

    async fn version(&self) -> BackendResult<String> {
        Ok(self.chain.state.lock().await.payment.version().to_string())
    }

    async fn transfer_ownership(&self, new_owner: EvmAddress) -> BackendResult<PendingTx> {
        let caller = self.caller;
        self.chain
            .execute(ContractKind::PaymentManager, &caller, |s| {
                s.payment.transfer_ownership(&caller, new_owner).map(Some)
            })
            .await
    }

    async fn renounce_ownership(&self) -> BackendResult<PendingTx> {
        let caller = self.caller;
        self.chain
            .execute(ContractKind::PaymentManager, &caller, |s| {
                s.payment.renounce_ownership(&caller).map(Some)
            })
            .await
    }
}

#[async_trait]
impl PaymentManagerBackend for LocalPaymentManager {
    async fn transfers(&self, hash: Bytes32) -> BackendResult<PaymentRecord> {
        Ok(self.chain.state.lock().await.payment.transfers(&hash))
    }

    async fn submit_pending(
        &self,
        signer: EvmAddress,
        nonce: u64,
        local: Bytes32,
        foreign: Bytes32,
    ) -> BackendResult<PendingTx> {
        let caller = self.caller;
        self.chain
            .execute(ContractKind::PaymentManager, &caller, |s| {
                s.payment
                    .submit_pending(&caller, signer, nonce, local, foreign)
                    .map(Some)
            })
            .await
    }

    async fn submit_success(&self, local: Bytes32, foreign: Bytes32) -> BackendResult<PendingTx> {
        let caller = self.caller;
        self.chain
            .execute(ContractKind::PaymentManager, &caller, |s| {
                s.payment.submit_success(&caller, local, foreign).map(Some)
            })
            .await
    }

    async fn submit_failed(&self, local: Bytes32, foreign: Bytes32) -> BackendResult<PendingTx> {
        let caller = self.caller;
        self.chain
            .execute(ContractKind::PaymentManager, &caller, |s| {
                s.payment.submit_failed(&caller, local, foreign).map(Some)
            })
            .await
    }

    async fn request_retry(&self, tx_hash: Bytes32) -> BackendResult<PendingTx> {
        let caller = self.caller;
        self.chain
            .execute(ContractKind::PaymentManager, &caller, |s| {
                s.payment.request_retry(&caller, tx_hash).map(Some)
            })
            .await
    }
}

// =============================================================================
// RemoteBridge handle
// =============================================================================

#[derive(Debug, Clone)]
pub struct LocalRemoteBridge {
    chain: LocalChain,
    caller: EvmAddress,
}

impl LocalRemoteBridge {
    pub fn as_caller(&self, caller: EvmAddress) -> Self {
        Self {
            chain: self.chain.clone(),
            caller,
        }
    }

    pub fn chain(&self) -> &LocalChain {
        &self.chain
    }
}

#[async_trait]
impl EventSource for LocalRemoteBridge {
    async fn block_number(&self) -> BackendResult<u64> {
        Ok(self.chain.head().await)
    }

    async fn get_logs(
        &self,
        filter: &EventFilter,
        range: BlockRange,
    ) -> BackendResult<Vec<LoggedEvent>> {
        Ok(self
            .chain
            .logs(ContractKind::RemoteBridge, filter, range)
            .await)
    }

    async fn subscribe(&self, filter: EventFilter) -> BackendResult<EventSubscription> {
        Ok(self.chain.watch(ContractKind::RemoteBridge, filter).await)
    }
}

#[async_trait]
impl OwnableBackend for LocalRemoteBridge {
    fn account(&self) -> EvmAddress {
        self.caller
    }

    async fn owner(&self) -> BackendResult<EvmAddress> {
        Ok(self.chain.state.lock().await.bridge.owner())
    }

    async fn version(&self) -> BackendResult<String> {
        Ok(self.chain.state.lock().await.bridge.version().to_string())
    }

    async fn transfer_ownership(&self, new_owner: EvmAddress) -> BackendResult<PendingTx> {
        let caller = self.caller;
        self.chain
            .execute(ContractKind::RemoteBridge, &caller, |s| {
                s.bridge.transfer_ownership(&caller, new_owner).map(Some)
            })
            .await
    }

    async fn renounce_ownership(&self) -> BackendResult<PendingTx> {
        let caller = self.caller;
        self.chain
            .execute(ContractKind::RemoteBridge, &caller, |s| {
                s.bridge.renounce_ownership(&caller).map(Some)
            })
            .await
    }
}

#[async_trait]
impl RemoteBridgeBackend for LocalRemoteBridge {
    async fn transfers(&self, local: Bytes32) -> BackendResult<BridgeRecord> {
        Ok(self.chain.state.lock().await.bridge.transfers(&local))
    }

    async fn get_last_block(&self) -> BackendResult<u64> {
        Ok(self.chain.state.lock().await.bridge.get_last_block())
    }

    async fn register(
        &self,
        local: Bytes32,
        remote: Bytes32,
        signer: EvmAddress,
        nonce: u64,
    ) -> BackendResult<PendingTx> {
        let caller = self.caller;
        self.chain
            .execute(ContractKind::RemoteBridge, &caller, |s| {
                s.bridge
                    .register(&caller, local, remote, signer, nonce)
                    .map(Some)
            })
            .await
    }

    async fn update(&self, local: Bytes32, remote: Bytes32) -> BackendResult<PendingTx> {
        let caller = self.caller;
        self.chain
            .execute(ContractKind::RemoteBridge, &caller, |s| {
                s.bridge.update(&caller, local, remote).map(Some)
            })
            .await
    }

    async fn set_last_block(&self, block: u64) -> BackendResult<PendingTx> {
        let caller = self.caller;
        self.chain
            .execute(ContractKind::RemoteBridge, &caller, |s| {
                s.bridge.set_last_block(&caller, block).map(|()| None)
            })
            .await
    }
}
