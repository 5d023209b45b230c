//! Shared RPC plumbing for the EVM backends
//!
//! Reads go through a plain HTTP provider. Writes build a signing provider
//! with `with_recommended_fillers()` so nonce, gas and fees are populated.

use std::fmt;
use std::time::Duration;

use alloy::network::{Ethereum, EthereumWallet};
use alloy::primitives::{Address, B256};
use alloy::providers::{PendingTransactionBuilder, Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::{Filter, Log};
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::{Client, Http};
use tracing::{debug, info, warn};
use url::Url;

use super::revert::read_error;
use crate::backend::{PendingTx, TxReceipt};
use crate::error::{BackendError, BackendResult};
use crate::events::{EventFilter, LoggedEvent};
use crate::subscription::{EventSubscription, SUBSCRIPTION_BUFFER};
use crate::types::{BlockRange, Bytes32, EvmAddress};

/// Turns a raw log into a notification, `Ok(None)` for foreign events
pub type LogDecoder = fn(&Log) -> BackendResult<Option<LoggedEvent>>;

#[derive(Clone)]
pub struct EvmClientConfig {
    pub rpc_url: String,
    pub private_key: String,
    /// Largest block span per `eth_getLogs` request
    pub max_block_range: u64,
    /// How often live subscriptions poll for new blocks
    pub poll_interval: Duration,
}

impl EvmClientConfig {
    pub fn new(rpc_url: impl Into<String>, private_key: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            private_key: private_key.into(),
            max_block_range: 10_000,
            poll_interval: Duration::from_secs(2),
        }
    }
}

impl fmt::Debug for EvmClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvmClientConfig")
            .field("rpc_url", &self.rpc_url)
            .field("private_key", &"<redacted>")
            .field("max_block_range", &self.max_block_range)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

#[derive(Clone)]
pub struct EvmClient {
    rpc_url: Url,
    signer: PrivateKeySigner,
    max_block_range: u64,
    poll_interval: Duration,
}

impl EvmClient {
    pub fn new(config: &EvmClientConfig) -> BackendResult<Self> {
        let rpc_url = Url::parse(&config.rpc_url)
            .map_err(|e| BackendError::Config(format!("Invalid RPC URL: {}", e)))?;
        let signer: PrivateKeySigner = config
            .private_key
            .parse()
            .map_err(|e| BackendError::Config(format!("Invalid private key: {}", e)))?;

        let client = Self {
            rpc_url,
            signer,
            max_block_range: config.max_block_range.max(1),
            poll_interval: config.poll_interval,
        };

        info!(
            account = %client.signer.address(),
            rpc_url = %client.rpc_url,
            "EVM client initialized"
        );
        Ok(client)
    }

    pub fn account(&self) -> EvmAddress {
        self.signer.address().into()
    }

    pub fn reader(&self) -> RootProvider<Http<Client>> {
        ProviderBuilder::new().on_http(self.rpc_url.clone())
    }

    pub fn writer(&self) -> impl Provider<Http<Client>> + Clone {
        let wallet = EthereumWallet::from(self.signer.clone());
        ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(wallet)
            .on_http(self.rpc_url.clone())
    }

    pub async fn block_number(&self) -> BackendResult<u64> {
        self.reader().get_block_number().await.map_err(read_error)
    }

    pub async fn chain_id(&self) -> BackendResult<u64> {
        self.reader().get_chain_id().await.map_err(read_error)
    }

    /// Raw logs for `address`, split into `max_block_range` sized requests
    pub async fn raw_logs(
        &self,
        address: Address,
        topic0: Vec<B256>,
        filter: &EventFilter,
        range: BlockRange,
    ) -> BackendResult<Vec<Log>> {
        if range.is_empty() || topic0.is_empty() {
            return Ok(Vec::new());
        }

        let provider = self.reader();
        let [t1, t2, t3] = filter.topics.clone().map(to_b256s);
        let mut logs = Vec::new();

        for chunk in range.chunks(self.max_block_range) {
            let query = Filter::new()
                .address(address)
                .event_signature(topic0.clone())
                .topic1(t1.clone())
                .topic2(t2.clone())
                .topic3(t3.clone())
                .from_block(chunk.from)
                .to_block(chunk.to);

            let mut batch = provider.get_logs(&query).await.map_err(read_error)?;
            debug!(
                from_block = chunk.from,
                to_block = chunk.to,
                count = batch.len(),
                "Fetched logs"
            );
            logs.append(&mut batch);
        }

        Ok(logs)
    }

    /// Fetch, decode and filter logs
    pub async fn logs(
        &self,
        address: Address,
        topic0: Vec<B256>,
        filter: &EventFilter,
        range: BlockRange,
        decode: LogDecoder,
    ) -> BackendResult<Vec<LoggedEvent>> {
        let raw = self.raw_logs(address, topic0, filter, range).await?;
        Ok(decode_all(&raw, filter, decode))
    }

    /// Poll for new blocks and stream matching notifications until cancelled
    pub async fn poll_subscription(
        &self,
        address: Address,
        topic0: Vec<B256>,
        filter: EventFilter,
        decode: LogDecoder,
    ) -> BackendResult<EventSubscription> {
        let start = self.block_number().await? + 1;
        let client = self.clone();

        Ok(EventSubscription::spawn(
            SUBSCRIPTION_BUFFER,
            move |sink, cancel| async move {
                let mut next = start;
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(client.poll_interval) => {}
                    }

                    let head = match client.block_number().await {
                        Ok(head) => head,
                        Err(e) => {
                            warn!(error = %e, "Subscription poll failed");
                            continue;
                        }
                    };
                    if head < next {
                        continue;
                    }

                    let range = BlockRange::new(next, head);
                    let events = match client.logs(address, topic0.clone(), &filter, range, decode).await {
                        Ok(events) => events,
                        Err(e) => {
                            warn!(error = %e, from_block = next, to_block = head, "Subscription log query failed");
                            continue;
                        }
                    };

                    for event in events {
                        tokio::select! {
                            _ = cancel.cancelled() => return,
                            sent = sink.send(event) => {
                                if sent.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    next = head + 1;
                }
            },
        ))
    }
}

impl fmt::Debug for EvmClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvmClient")
            .field("rpc_url", &self.rpc_url)
            .field("account", &self.signer.address())
            .field("max_block_range", &self.max_block_range)
            .finish_non_exhaustive()
    }
}

/// Wrap an alloy pending transaction, checking the receipt status
pub fn track(pending: PendingTransactionBuilder<Http<Client>, Ethereum>, op: &'static str) -> PendingTx {
    let tx_hash = Bytes32::from(*pending.tx_hash());
    info!(tx_hash = %tx_hash, operation = op, "Transaction sent");

    PendingTx::new(tx_hash, async move {
        let receipt = pending.get_receipt().await.map_err(read_error)?;
        if !receipt.status() {
            return Err(BackendError::Reverted {
                reason: format!("{} transaction {} reverted", op, tx_hash),
            });
        }
        let block_number = receipt
            .block_number
            .ok_or_else(|| BackendError::Decode("receipt without block number".to_string()))?;
        Ok(TxReceipt {
            tx_hash,
            block_number,
        })
    })
}

fn decode_all(raw: &[Log], filter: &EventFilter, decode: LogDecoder) -> Vec<LoggedEvent> {
    raw.iter()
        .filter_map(|log| match decode(log) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    error = %e,
                    tx_hash = ?log.transaction_hash,
                    "Skipping undecodable log"
                );
                None
            }
        })
        .filter(|event| filter.matches(event))
        .collect()
}

fn to_b256s(values: Vec<Bytes32>) -> Vec<B256> {
    values.into_iter().map(B256::from).collect()
}

/// Position fields every decoder needs
pub fn log_position(log: &Log) -> BackendResult<(u64, u64, Bytes32)> {
    let block_number = log
        .block_number
        .ok_or_else(|| BackendError::Decode("log without block number".to_string()))?;
    let log_index = log
        .log_index
        .ok_or_else(|| BackendError::Decode("log without index".to_string()))?;
    let tx_hash = log
        .transaction_hash
        .map(Bytes32::from)
        .unwrap_or(Bytes32::ZERO);
    Ok((block_number, log_index, tx_hash))
}
