//! Error types for the transfer registries
//!
//! Two classes are kept apart:
//! - [`RegistryError`]: the contract rejected the operation. Terminal: inspect
//!   current state with a read before deciding what to do next.
//! - [`BackendError`]: anything that went wrong getting the operation to or
//!   from the contract. Only transport failures and timeouts are retryable.

use std::time::Duration;
use thiserror::Error;

use crate::types::{Bytes32, EvmAddress, TransferState};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unauthorized: {caller} is not the owner")]
    Unauthorized { caller: EvmAddress },

    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("Record already exists: {hash}")]
    AlreadyExists { hash: Bytes32 },

    #[error("Invalid state for {hash}: transition not permitted from {state}")]
    InvalidState { hash: Bytes32, state: TransferState },

    #[error("Record not found: {hash}")]
    RecordNotFound { hash: Bytes32 },
}

impl RegistryError {
    pub(crate) fn invalid(reason: &str) -> Self {
        RegistryError::InvalidArgument {
            reason: reason.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum BackendError {
    /// The contract logic refused the call
    #[error("Rejected: {0}")]
    Rejected(#[from] RegistryError),

    /// The transaction was mined but reverted for a reason we could not classify
    #[error("Transaction reverted: {reason}")]
    Reverted { reason: String },

    /// Network / RPC failure
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// A log or return value could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Bad endpoint, key or address
    #[error("Configuration error: {0}")]
    Config(String),

    /// The subscription or backend has shut down
    #[error("Backend closed")]
    Closed,
}

impl BackendError {
    /// Only transport-level failures may be retried blindly
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::Transport(_) | BackendError::Timeout(_))
    }

    /// The logic-level rejection, if this is one
    pub fn rejection(&self) -> Option<&RegistryError> {
        match self {
            BackendError::Rejected(e) => Some(e),
            _ => None,
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;
