//! Map contract revert reasons back to registry errors
//!
//! Gas estimation surfaces a revert as an RPC error whose message contains
//! the `require` string. Known strings become [`RegistryError`] variants so
//! callers see the same errors as with the local backend.

use std::fmt::Display;

use crate::error::{BackendError, RegistryError};
use crate::events::ContractKind;
use crate::retry::transport_or_revert;
use crate::types::{Bytes32, EvmAddress, TransferState};

/// What the failing call was about, to fill in error fields
#[derive(Debug, Clone, Copy)]
pub struct CallContext {
    pub contract: ContractKind,
    pub caller: EvmAddress,
    pub hash: Bytes32,
}

impl CallContext {
    pub fn new(contract: ContractKind, caller: EvmAddress, hash: Bytes32) -> Self {
        Self {
            contract,
            caller,
            hash,
        }
    }
}

const ARGUMENT_REASONS: &[&str] = &[
    "invalid local tx hash",
    "invalid foreign tx hash",
    "invalid tx hash",
    "invalid address",
    "new owner is the zero address",
];

/// Classify a revert message, or `None` if it is not a known rejection
pub fn classify_revert(message: &str, ctx: &CallContext) -> Option<RegistryError> {
    let lower = message.to_lowercase();

    if lower.contains("caller is not the owner") {
        return Some(RegistryError::Unauthorized { caller: ctx.caller });
    }

    if let Some(reason) = ARGUMENT_REASONS.iter().find(|r| lower.contains(*r)) {
        return Some(RegistryError::InvalidArgument {
            reason: reason.to_string(),
        });
    }

    if lower.contains("already exists") || lower.contains("already registered") {
        return Some(RegistryError::AlreadyExists { hash: ctx.hash });
    }

    let missing = lower.contains("record is uninitialized")
        || lower.contains("does not exist")
        || lower.contains("not found");
    if missing {
        return Some(match ctx.contract {
            ContractKind::PaymentManager => RegistryError::InvalidState {
                hash: ctx.hash,
                state: TransferState::Unknown,
            },
            ContractKind::RemoteBridge => RegistryError::RecordNotFound { hash: ctx.hash },
        });
    }

    if lower.contains("only failed records") || lower.contains("invalid state") {
        // Actual state is filled in by the caller after a read
        return Some(RegistryError::InvalidState {
            hash: ctx.hash,
            state: TransferState::Unknown,
        });
    }

    None
}

/// Error from a mutating call
pub fn call_error(error: impl Display, ctx: &CallContext) -> BackendError {
    let message = error.to_string();
    match classify_revert(&message, ctx) {
        Some(rejection) => BackendError::Rejected(rejection),
        None => transport_or_revert(message),
    }
}

/// Error from a read or log query
pub fn read_error(error: impl Display) -> BackendError {
    transport_or_revert(error.to_string())
}
