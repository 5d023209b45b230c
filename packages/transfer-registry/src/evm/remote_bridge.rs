//! RemoteBridge over JSON-RPC

use alloy::network::Ethereum;
use alloy::primitives::{Address, U256};
use alloy::providers::PendingTransactionBuilder;
use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use tracing::debug;

use super::client::{log_position, track, EvmClient};
use super::contracts::RemoteBridge as Contract;
use super::payment_manager::decode;
use super::revert::{call_error, read_error, CallContext};
use super::topic0s;
use crate::backend::{EventSource, OwnableBackend, PendingTx, RemoteBridgeBackend};
use crate::error::{BackendError, BackendResult};
use crate::events::{ContractKind, EventFilter, LoggedEvent, Notification};
use crate::subscription::EventSubscription;
use crate::types::{BlockRange, BridgeRecord, Bytes32, EvmAddress};

#[derive(Debug, Clone)]
pub struct EvmRemoteBridge {
    client: EvmClient,
    address: Address,
}

impl EvmRemoteBridge {
    pub fn new(client: EvmClient, address: EvmAddress) -> Self {
        Self {
            client,
            address: address.into(),
        }
    }

    pub fn address(&self) -> EvmAddress {
        self.address.into()
    }

    fn submitted<E: std::fmt::Display>(
        &self,
        sent: Result<PendingTransactionBuilder<Http<Client>, Ethereum>, E>,
        hash: Bytes32,
        op: &'static str,
    ) -> BackendResult<PendingTx> {
        match sent {
            Ok(pending) => Ok(track(pending, op)),
            Err(e) => {
                let ctx = CallContext::new(ContractKind::RemoteBridge, self.client.account(), hash);
                let err = call_error(e, &ctx);
                debug!(operation = op, error = %err, "Submission rejected");
                Err(err)
            }
        }
    }
}

/// Decode a RemoteBridge log. Unknown topics yield `Ok(None)`.
pub fn decode_log(log: &Log) -> BackendResult<Option<LoggedEvent>> {
    let Some(topic0) = log.topic0().copied() else {
        return Ok(None);
    };

    let notification = if topic0 == Contract::TransferRegistered::SIGNATURE_HASH {
        let e = decode::<Contract::TransferRegistered>(log)?;
        Notification::TransferRegistered {
            hash: e.hash.into(),
            signer: e.signer.into(),
            nonce: e.nonce,
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
        contract: ContractKind::RemoteBridge,
        notification,
        block_number,
        log_index,
        tx_hash,
    }))
}

#[async_trait]
impl EventSource for EvmRemoteBridge {
    async fn block_number(&self) -> BackendResult<u64> {
        self.client.block_number().await
    }

    async fn get_logs(
        &self,
        filter: &EventFilter,
        range: BlockRange,
    ) -> BackendResult<Vec<LoggedEvent>> {
        let topics = topic0s(ContractKind::RemoteBridge, filter);
        self.client
            .logs(self.address, topics, filter, range, decode_log)
            .await
    }

    async fn subscribe(&self, filter: EventFilter) -> BackendResult<EventSubscription> {
        let topics = topic0s(ContractKind::RemoteBridge, &filter);
        self.client
            .poll_subscription(self.address, topics, filter, decode_log)
            .await
    }
}

#[async_trait]
impl OwnableBackend for EvmRemoteBridge {
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
        self.submitted(sent, Bytes32::ZERO, "transferOwnership")
    }

    async fn renounce_ownership(&self) -> BackendResult<PendingTx> {
        let provider = self.client.writer();
        let contract = Contract::new(self.address, &provider);
        let sent = contract.renounceOwnership().send().await;
        self.submitted(sent, Bytes32::ZERO, "renounceOwnership")
    }
}

#[async_trait]
impl RemoteBridgeBackend for EvmRemoteBridge {
    async fn transfers(&self, local: Bytes32) -> BackendResult<BridgeRecord> {
        let provider = self.client.reader();
        let contract = Contract::new(self.address, &provider);
        let record = contract
            .transfers(local.into())
            .call()
            .await
            .map_err(read_error)?;

        Ok(BridgeRecord {
            hash: record.hash.into(),
            signer: record.signer.into(),
            nonce: record.nonce,
            exist: record.exist,
        })
    }

    async fn get_last_block(&self) -> BackendResult<u64> {
        let provider = self.client.reader();
        let contract = Contract::new(self.address, &provider);
        let last = contract.getLastBlock().call().await.map_err(read_error)?;
        u64::try_from(last._0)
            .map_err(|_| BackendError::Decode(format!("last block {} exceeds u64", last._0)))
    }

    async fn register(
        &self,
        local: Bytes32,
        remote: Bytes32,
        signer: EvmAddress,
        nonce: u64,
    ) -> BackendResult<PendingTx> {
        let provider = self.client.writer();
        let contract = Contract::new(self.address, &provider);
        let sent = contract
            .register(local.into(), remote.into(), signer.into(), nonce)
            .send()
            .await;
        self.submitted(sent, local, "register")
    }

    async fn update(&self, local: Bytes32, remote: Bytes32) -> BackendResult<PendingTx> {
        let provider = self.client.writer();
        let contract = Contract::new(self.address, &provider);
        let sent = contract.update(local.into(), remote.into()).send().await;
        self.submitted(sent, local, "update")
    }

    async fn set_last_block(&self, block: u64) -> BackendResult<PendingTx> {
        let provider = self.client.writer();
        let contract = Contract::new(self.address, &provider);
        let sent = contract.setLastBlock(U256::from(block)).send().await;
        self.submitted(sent, Bytes32::ZERO, "setLastBlock")
    }
}
