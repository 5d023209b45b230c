//! Registry notifications
//!
//! Typed counterparts of the events declared by both contracts, plus the
//! filter used for historical queries and live subscriptions.
//!
//! Event signatures (topic0 is keccak256 of these):
//! - `OwnershipTransferred(address,address)`: both contracts
//! - `PendingTransfer(address,uint64,bytes32)`: PaymentManager
//! - `TxSuccess(bytes32,bytes32)`: PaymentManager
//! - `TxFailed(bytes32,bytes32)`: PaymentManager
//! - `Retry(bytes32)`: PaymentManager
//! - `TransferRegistered(bytes32,address,uint64)`: RemoteBridge

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::hash::{address_topic, event_topic, u64_topic};
use crate::types::{Bytes32, EvmAddress};

/// Which contract emitted a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractKind {
    PaymentManager,
    RemoteBridge,
}

impl ContractKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractKind::PaymentManager => "payment_manager",
            ContractKind::RemoteBridge => "remote_bridge",
        }
    }
}

impl fmt::Display for ContractKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    OwnershipTransferred,
    PendingTransfer,
    TxSuccess,
    TxFailed,
    Retry,
    TransferRegistered,
}

impl EventKind {
    /// Canonical ABI signature
    pub fn signature(&self) -> &'static str {
        match self {
            EventKind::OwnershipTransferred => "OwnershipTransferred(address,address)",
            EventKind::PendingTransfer => "PendingTransfer(address,uint64,bytes32)",
            EventKind::TxSuccess => "TxSuccess(bytes32,bytes32)",
            EventKind::TxFailed => "TxFailed(bytes32,bytes32)",
            EventKind::Retry => "Retry(bytes32)",
            EventKind::TransferRegistered => "TransferRegistered(bytes32,address,uint64)",
        }
    }

    /// topic0 of the event
    pub fn topic0(&self) -> Bytes32 {
        event_topic(self.signature())
    }

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::OwnershipTransferred => "OwnershipTransferred",
            EventKind::PendingTransfer => "PendingTransfer",
            EventKind::TxSuccess => "TxSuccess",
            EventKind::TxFailed => "TxFailed",
            EventKind::Retry => "Retry",
            EventKind::TransferRegistered => "TransferRegistered",
        }
    }

    /// Events a contract can emit
    pub fn emitted_by(contract: ContractKind) -> &'static [EventKind] {
        match contract {
            ContractKind::PaymentManager => &[
                EventKind::OwnershipTransferred,
                EventKind::PendingTransfer,
                EventKind::TxSuccess,
                EventKind::TxFailed,
                EventKind::Retry,
            ],
            ContractKind::RemoteBridge => {
                &[EventKind::OwnershipTransferred, EventKind::TransferRegistered]
            }
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Decoded event payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notification {
    OwnershipTransferred {
        previous_owner: EvmAddress,
        new_owner: EvmAddress,
    },
    PendingTransfer {
        signer: EvmAddress,
        nonce: u64,
        tx_hash: Bytes32,
    },
    TxSuccess {
        local: Bytes32,
        foreign: Bytes32,
    },
    TxFailed {
        local: Bytes32,
        foreign: Bytes32,
    },
    Retry {
        tx_hash: Bytes32,
    },
    /// `nonce` is the only non-indexed field of any registry event
    TransferRegistered {
        hash: Bytes32,
        signer: EvmAddress,
        nonce: u64,
    },
}

impl Notification {
    pub fn kind(&self) -> EventKind {
        match self {
            Notification::OwnershipTransferred { .. } => EventKind::OwnershipTransferred,
            Notification::PendingTransfer { .. } => EventKind::PendingTransfer,
            Notification::TxSuccess { .. } => EventKind::TxSuccess,
            Notification::TxFailed { .. } => EventKind::TxFailed,
            Notification::Retry { .. } => EventKind::Retry,
            Notification::TransferRegistered { .. } => EventKind::TransferRegistered,
        }
    }

    /// Indexed parameters as topics 1..=3, in declaration order
    pub fn indexed_topics(&self) -> Vec<Bytes32> {
        match self {
            Notification::OwnershipTransferred {
                previous_owner,
                new_owner,
            } => vec![address_topic(previous_owner), address_topic(new_owner)],
            Notification::PendingTransfer {
                signer,
                nonce,
                tx_hash,
            } => vec![address_topic(signer), u64_topic(*nonce), *tx_hash],
            Notification::TxSuccess { local, foreign } | Notification::TxFailed { local, foreign } => {
                vec![*local, *foreign]
            }
            Notification::Retry { tx_hash } => vec![*tx_hash],
            Notification::TransferRegistered { hash, signer, .. } => {
                vec![*hash, address_topic(signer)]
            }
        }
    }

    /// The transfer hash this notification is about, if any
    pub fn transfer_hash(&self) -> Option<Bytes32> {
        match self {
            Notification::OwnershipTransferred { .. } => None,
            Notification::PendingTransfer { tx_hash, .. } | Notification::Retry { tx_hash } => {
                Some(*tx_hash)
            }
            Notification::TxSuccess { local, .. } | Notification::TxFailed { local, .. } => {
                Some(*local)
            }
            Notification::TransferRegistered { hash, .. } => Some(*hash),
        }
    }
}

/// A notification together with its position in the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedEvent {
    pub contract: ContractKind,
    pub notification: Notification,
    /// Block number where the event was emitted
    pub block_number: u64,
    /// Log index within the block
    pub log_index: u64,
    /// Transaction hash
    pub tx_hash: Bytes32,
}

impl LoggedEvent {
    pub fn kind(&self) -> EventKind {
        self.notification.kind()
    }
}

/// Selects notifications by contract, event kind and indexed fields
///
/// Empty lists match anything. Each indexed position holds alternatives,
/// so `topic(1, vec![a, b])` matches events whose first indexed field is
/// `a` or `b`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    pub contract: Option<ContractKind>,
    pub kinds: Vec<EventKind>,
    pub topics: [Vec<Bytes32>; 3],
}

impl EventFilter {
    /// Filter matching every notification
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter matching a single event kind
    pub fn for_kind(kind: EventKind) -> Self {
        Self::new().kind(kind)
    }

    pub fn contract(mut self, contract: ContractKind) -> Self {
        self.contract = Some(contract);
        self
    }

    pub fn kind(mut self, kind: EventKind) -> Self {
        if !self.kinds.contains(&kind) {
            self.kinds.push(kind);
        }
        self
    }

    /// Restrict indexed position `position` (1..=3) to `values`
    pub fn topic(mut self, position: usize, values: Vec<Bytes32>) -> Self {
        if (1..=3).contains(&position) {
            self.topics[position - 1] = values;
        }
        self
    }

    pub fn matches_notification(&self, notification: &Notification) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&notification.kind()) {
            return false;
        }

        let indexed = notification.indexed_topics();
        self.topics.iter().enumerate().all(|(i, wanted)| {
            wanted.is_empty()
                || indexed
                    .get(i)
                    .map(|topic| wanted.contains(topic))
                    .unwrap_or(false)
        })
    }

    pub fn matches(&self, event: &LoggedEvent) -> bool {
        if let Some(contract) = self.contract {
            if contract != event.contract {
                return false;
            }
        }
        self.matches_notification(&event.notification)
    }

    /// Kinds this filter can match on `contract`
    pub fn kinds_for(&self, contract: ContractKind) -> Vec<EventKind> {
        EventKind::emitted_by(contract)
            .iter()
            .copied()
            .filter(|k| self.kinds.is_empty() || self.kinds.contains(k))
            .collect()
    }
}
