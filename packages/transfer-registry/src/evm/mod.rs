//! EVM backends
//!
//! [`EvmPaymentManager`] and [`EvmRemoteBridge`] implement the backend
//! traits against deployed contracts over HTTP JSON-RPC. Writes are signed
//! by the configured private key; live subscriptions poll `eth_getLogs`.

pub mod client;
pub mod contracts;
pub mod payment_manager;
pub mod remote_bridge;
pub mod revert;

pub use client::{EvmClient, EvmClientConfig};
pub use payment_manager::EvmPaymentManager;
pub use remote_bridge::EvmRemoteBridge;

use alloy::primitives::{Address, B256};

use crate::events::{ContractKind, EventFilter};
use crate::types::{Bytes32, EvmAddress};

impl From<Address> for EvmAddress {
    fn from(address: Address) -> Self {
        EvmAddress(address.0 .0)
    }
}

impl From<EvmAddress> for Address {
    fn from(address: EvmAddress) -> Self {
        Address::from(address.0)
    }
}

impl From<B256> for Bytes32 {
    fn from(hash: B256) -> Self {
        Bytes32(hash.0)
    }
}

impl From<Bytes32> for B256 {
    fn from(hash: Bytes32) -> Self {
        B256::from(hash.0)
    }
}

/// topic0 values to request for `filter` on `contract`; empty if the filter
/// cannot match anything this contract emits
pub(crate) fn topic0s(contract: ContractKind, filter: &EventFilter) -> Vec<B256> {
    if filter.contract.is_some_and(|c| c != contract) {
        return Vec::new();
    }
    filter
        .kinds_for(contract)
        .iter()
        .map(|kind| B256::from(kind.topic0()))
        .collect()
}
