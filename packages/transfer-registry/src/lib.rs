//! Transfer Registry: client-side mirror of the PaymentManager and
//! RemoteBridge contracts
//!
//! - **Types** - 32-byte hashes, addresses, transfer records, block ranges
//! - **State machines** - [`PaymentManager`] lifecycle and [`RemoteBridge`]
//!   write-once registry, both behind a single-owner gate
//! - **Events** - typed notifications, filters, history and live streams
//! - **Backends** - one trait surface over the in-process [`LocalChain`] and
//!   deployed contracts (`evm` module)
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! transfer-registry = { path = "../transfer-registry" }
//! ```
//!
//! ## Feature Flags
//!
//! - `evm` - alloy-backed JSON-RPC backends (default)

// Core modules (always available)
pub mod backend;
pub mod emitter;
pub mod error;
pub mod events;
pub mod hash;
pub mod local;
pub mod ownership;
pub mod payment_manager;
pub mod remote_bridge;
pub mod retry;
pub mod store;
pub mod subscription;
pub mod types;

#[cfg(feature = "evm")]
pub mod evm;

// Re-export commonly used items at the crate root
pub use backend::{
    EventSource, OwnableBackend, PaymentManagerBackend, PendingTx, RemoteBridgeBackend, TxReceipt,
};
pub use error::{BackendError, BackendResult, RegistryError};
pub use events::{ContractKind, EventFilter, EventKind, LoggedEvent, Notification};
pub use local::{LocalChain, LocalPaymentManager, LocalRemoteBridge};
pub use payment_manager::PaymentManager;
pub use remote_bridge::RemoteBridge;
pub use retry::{with_retry, RetryConfig};
pub use subscription::EventSubscription;
pub use types::{BlockRange, BridgeRecord, Bytes32, EvmAddress, PaymentRecord, TransferState};
