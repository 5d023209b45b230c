//! PaymentManager over JSON-RPC

use alloy::network::Ethereum;
use alloy::primitives::Address;
use alloy::providers::PendingTransactionBuilder;
use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use tracing::debug;

use super::client::{log_position, track, EvmClient};
use super::contracts::PaymentManager as Contract;
use super::revert::{call_error, read_error, CallContext};
use super::topic0s;
use crate::backend::{EventSource, OwnableBackend, PaymentManagerBackend, PendingTx};
use crate::error::{BackendError, BackendResult, RegistryError};
use crate::events::{ContractKind, EventFilter, LoggedEvent, Notification};
use crate::subscription::EventSubscription;
use crate::types::{BlockRange, Bytes32, EvmAddress, PaymentRecord, TransferState};

#[derive(Debug, Clone)]
pub struct EvmPaymentManager {
    client: EvmClient,
    address: Address,
}

impl EvmPaymentManager {
    pub fn new(client: EvmClient, address: EvmAddress) -> Self {
        Self {
            client,
            address: address.into(),
        }
    }

    pub fn address(&self) -> EvmAddress {
        self.address.into()
    }

    fn ctx(&self, hash: Bytes32) -> CallContext {
        CallContext::new(ContractKind::PaymentManager, self.client.account(), hash)
    }

    /// Revert strings do not carry the record state; read it
    async fn with_current_state(&self, err: BackendError) -> BackendError {
        if let BackendError::Rejected(RegistryError::InvalidState { hash, .. }) = err {
            if let Ok(record) = PaymentManagerBackend::transfers(self, hash).await {
                return RegistryError::InvalidState {
                    hash,
                    state: record.state,
                }
                .into();
            }
        }
        err
    }

    async fn submitted<E: std::fmt::Display + Send>(
        &self,
        sent: Result<PendingTransactionBuilder<Http<Client>, Ethereum>, E>,
        hash: Bytes32,
        op: &'static str,
    ) -> BackendResult<PendingTx> {
        match sent {
            Ok(pending) => Ok(track(pending, op)),
            Err(e) => {
                let err = call_error(e, &self.ctx(hash));
                debug!(operation = op, error = %err, "Submission rejected");
                Err(self.with_current_state(err).await)
            }
        }
    }
}

/// Decode a PaymentManager log. Unknown topics yield `Ok(None)`.
pub fn decode_log(log: &Log) -> BackendResult<Option<LoggedEvent>> {
    let Some(topic0) = log.topic0().copied() else {
        return Ok(None);
    };

    let notification = if topic0 == Contract::PendingTransfer::SIGNATURE_HASH {
        let e = decode::<Contract::PendingTransfer>(log)?;
        Notification::PendingTransfer {
            signer: e.signer.into(),
            nonce: e.nonce,
            tx_hash: e.txHash.into(),
        }
    } else if topic0 == Contract::TxSuccess::SIGNATURE_HASH {
        let e = decode::<Contract::TxSuccess>(log)?;
        Notification::TxSuccess {
            local: e.local.into(),
            foreign: e.foreign.into(),
        }
    } else if topic0 == Contract::TxFailed::SIGNATURE_HASH {
        let e = decode::<Contract::TxFailed>(log)?;
        Notification::TxFailed {
            local: e.local.into(),
            foreign: e.foreign.into(),
        }
    } else if topic0 == Contract::Retry::SIGNATURE_HASH {
        let e = decode::<Contract::Retry>(log)?;
        Notification::Retry {
            tx_hash: e.txHash.into(),
        }
    } else if topic0 == Contract::OwnershipTransferred::SIGNATURE_HASH {
        let e = decode::<Contract::OwnershipTransferred>(log)?;
        Notification::OwnershipTransferred {
            previous_owner: e.previousOwner.into(),
            new_owner: e.newOwner.into(),
        }
    } else {
        return Ok(None);
    };

    let (block_number, log_index, tx_hash) = log_position(log)?;
    Ok(Some(LoggedEvent {
        contract: ContractKind::PaymentManager,
        notification,
        block_number,
        log_index,
        tx_hash,
    }))
}

pub(crate) fn decode<E: SolEvent>(log: &Log) -> BackendResult<E> {
    log.log_decode::<E>()
        .map(|decoded| decoded.inner.data)
        .map_err(|e| BackendError::Decode(format!("{}: {}", E::SIGNATURE, e)))
}

#[async_trait]
impl EventSource for EvmPaymentManager {
    async fn block_number(&self) -> BackendResult<u64> {
        self.client.block_number().await
    }

    async fn get_logs(
        &self,
        filter: &EventFilter,
        range: BlockRange,
    ) -> BackendResult<Vec<LoggedEvent>> {
        let topics = topic0s(ContractKind::PaymentManager, filter);
        self.client
            .logs(self.address, topics, filter, range, decode_log)
            .await
    }

    async fn subscribe(&self, filter: EventFilter) -> BackendResult<EventSubscription> {
        let topics = topic0s(ContractKind::PaymentManager, &filter);
        self.client
            .poll_subscription(self.address, topics, filter, decode_log)
            .await
    }
}

#[async_trait]
impl OwnableBackend for EvmPaymentManager {
    fn account(&self) -> EvmAddress {
        self.client.account()
    }

    async fn owner(&self) -> BackendResult<EvmAddress> {
        let provider = self.client.reader();
        let contract = Contract::new(self.address, &provider);
        let owner = contract.owner().call().await.map_err(read_error)?;
        Ok(owner._0.into())
    }

    async fn is_owner(&self) -> BackendResult<bool> {
        let provider = self.client.reader();
        let contract = Contract::new(self.address, &provider);
        let result = contract
            .isOwner()
            .from(self.client.account().into())
            .call()
            .await
            .map_err(read_error)?;
        Ok(result._0)
    }

    async fn version(&self) -> BackendResult<String> {
        let provider = self.client.reader();
        let contract = Contract::new(self.address, &provider);
        let version = contract.version().call().await.map_err(read_error)?;
        Ok(version._0)
    }

    async fn transfer_ownership(&self, new_owner: EvmAddress) -> BackendResult<PendingTx> {
        let provider = self.client.writer();
        let contract = Contract::new(self.address, &provider);
        let sent = contract.transferOwnership(new_owner.into()).send().await;
        self.submitted(sent, Bytes32::ZERO, "transferOwnership").await
    }

    async fn renounce_ownership(&self) -> BackendResult<PendingTx> {
        let provider = self.client.writer();
        let contract = Contract::new(self.address, &provider);
        let sent = contract.renounceOwnership().send().await;
        self.submitted(sent, Bytes32::ZERO, "renounceOwnership").await
    }
}

#[async_trait]
impl PaymentManagerBackend for EvmPaymentManager {
    async fn transfers(&self, hash: Bytes32) -> BackendResult<PaymentRecord> {
        let provider = self.client.reader();
        let contract = Contract::new(self.address, &provider);
        let record = contract
            .transfers(hash.into())
            .call()
            .await
            .map_err(read_error)?;

        let state = TransferState::from_u8(record.state)
            .ok_or_else(|| BackendError::Decode(format!("unknown transfer state {}", record.state)))?;

        Ok(PaymentRecord {
            hash: record.hash.into(),
            signer: record.signer.into(),
            nonce: record.nonce,
            state,
        })
    }

    async fn submit_pending(
        &self,
        signer: EvmAddress,
        nonce: u64,
        local: Bytes32,
        foreign: Bytes32,
    ) -> BackendResult<PendingTx> {
        let provider = self.client.writer();
        let contract = Contract::new(self.address, &provider);
        let sent = contract
            .submitPending(signer.into(), nonce, local.into(), foreign.into())
            .send()
            .await;
        self.submitted(sent, local, "submitPending").await
    }

    async fn submit_success(&self, local: Bytes32, foreign: Bytes32) -> BackendResult<PendingTx> {
        let provider = self.client.writer();
        let contract = Contract::new(self.address, &provider);
        let sent = contract
            .submitSuccess(local.into(), foreign.into())
            .send()
            .await;
        self.submitted(sent, local, "submitSuccess").await
    }

    async fn submit_failed(&self, local: Bytes32, foreign: Bytes32) -> BackendResult<PendingTx> {
        let provider = self.client.writer();
        let contract = Contract::new(self.address, &provider);
        let sent = contract
            .submitFailed(local.into(), foreign.into())
            .send()
            .await;
        self.submitted(sent, local, "submitFailed").await
    }

    async fn request_retry(&self, tx_hash: Bytes32) -> BackendResult<PendingTx> {
        let provider = self.client.writer();
        let contract = Contract::new(self.address, &provider);
        let sent = contract.requestRetry(tx_hash.into()).send().await;
        self.submitted(sent, tx_hash, "requestRetry").await
    }
}
