//! Common types for the transfer registries
//!
//! Hashes and addresses are fixed-width byte arrays, mirroring the `bytes32`
//! and `address` ABI types used by the PaymentManager and RemoteBridge
//! contracts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RegistryError;

// ============================================================================
// Bytes32
// ============================================================================

/// A 32-byte value (transfer hash, log topic, transaction hash)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Bytes32(pub [u8; 32]);

impl Bytes32 {
    /// The all-zero value, rejected wherever a hash is required
    pub const ZERO: Bytes32 = Bytes32([0u8; 32]);

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Bytes32(bytes)
    }

    /// Create from hex string (with or without 0x prefix)
    pub fn from_hex(hex: &str) -> Result<Self, RegistryError> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let bytes = hex::decode(hex).map_err(|e| RegistryError::InvalidArgument {
            reason: format!("invalid hex: {}", e),
        })?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
            RegistryError::InvalidArgument {
                reason: format!("Bytes32 must be 32 bytes, got {}", b.len()),
            }
        })?;
        Ok(Bytes32(bytes))
    }

    /// Build a value whose every byte is `byte` (handy for fixtures: 0x0101..01)
    pub fn repeat_byte(byte: u8) -> Self {
        Bytes32([byte; 32])
    }

    /// Whether every byte is zero
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string with 0x prefix
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Bytes32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Bytes32 {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Bytes32::from_hex(s)
    }
}

impl From<[u8; 32]> for Bytes32 {
    fn from(bytes: [u8; 32]) -> Self {
        Bytes32(bytes)
    }
}

// ============================================================================
// EvmAddress
// ============================================================================

/// EVM address (20 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct EvmAddress(pub [u8; 20]);

impl EvmAddress {
    /// The zero address (a renounced owner, an unset signer)
    pub const ZERO: EvmAddress = EvmAddress([0u8; 20]);

    /// Create from hex string (with or without 0x prefix)
    ///
    /// Accepts both 20-byte addresses (40 hex chars) and 32-byte padded addresses
    /// (64 hex chars). For 32-byte addresses, the first 12 bytes must be zeros.
    pub fn from_hex(hex: &str) -> Result<Self, RegistryError> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let bytes = hex::decode(hex).map_err(|e| RegistryError::InvalidArgument {
            reason: format!("invalid hex: {}", e),
        })?;

        match bytes.len() {
            20 => {
                let mut result = [0u8; 20];
                result.copy_from_slice(&bytes);
                Ok(EvmAddress(result))
            }
            32 => {
                if bytes[..12].iter().any(|&b| b != 0) {
                    return Err(RegistryError::InvalidArgument {
                        reason: "32-byte address has non-zero padding".to_string(),
                    });
                }
                let mut result = [0u8; 20];
                result.copy_from_slice(&bytes[12..]);
                Ok(EvmAddress(result))
            }
            len => Err(RegistryError::InvalidArgument {
                reason: format!("EvmAddress must be 20 or 32 bytes, got {} bytes", len),
            }),
        }
    }

    /// Build an address whose every byte is `byte` (fixtures: 0xAAAA..AA)
    pub fn repeat_byte(byte: u8) -> Self {
        EvmAddress([byte; 20])
    }

    /// Whether this is the zero address
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Convert to hex string with 0x prefix
    pub fn as_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Convert to bytes32 (left-padded with zeros), the ABI topic encoding
    pub fn as_bytes32(&self) -> Bytes32 {
        let mut result = [0u8; 32];
        result[12..].copy_from_slice(&self.0);
        Bytes32(result)
    }

    /// Create from bytes32 (extract last 20 bytes)
    pub fn from_bytes32(bytes: &Bytes32) -> Self {
        let mut result = [0u8; 20];
        result.copy_from_slice(&bytes.0[12..]);
        EvmAddress(result)
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for EvmAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_hex())
    }
}

impl FromStr for EvmAddress {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EvmAddress::from_hex(s)
    }
}

impl From<[u8; 20]> for EvmAddress {
    fn from(bytes: [u8; 20]) -> Self {
        EvmAddress(bytes)
    }
}

// ============================================================================
// Transfer State
// ============================================================================

/// Lifecycle state of a PaymentManager transfer record
///
/// Discriminants match the contract's `uint8` enum encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum TransferState {
    #[default]
    Unknown = 0,
    Pending = 1,
    Success = 2,
    Failed = 3,
}

impl TransferState {
    /// Decode the contract's `uint8` representation
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(TransferState::Unknown),
            1 => Some(TransferState::Pending),
            2 => Some(TransferState::Success),
            3 => Some(TransferState::Failed),
            _ => None,
        }
    }

    /// The contract's `uint8` representation
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Success and Failed are terminal; only `requestRetry` leaves them
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferState::Success | TransferState::Failed)
    }

    /// Get the state as a lowercase string
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferState::Unknown => "unknown",
            TransferState::Pending => "pending",
            TransferState::Success => "success",
            TransferState::Failed => "failed",
        }
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Records
// ============================================================================

/// PaymentManager `transfers(bytes32)` record
///
/// The zero value (`Default`) is what an unsubmitted hash reads as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub hash: Bytes32,
    pub signer: EvmAddress,
    pub nonce: u64,
    pub state: TransferState,
}

/// RemoteBridge `transfers(bytes32)` record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BridgeRecord {
    /// Local hash on registration, the remote counterpart after `update`
    pub hash: Bytes32,
    pub signer: EvmAddress,
    pub nonce: u64,
    pub exist: bool,
}

/// Inclusive block range for historical queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRange {
    pub from: u64,
    pub to: u64,
}

impl BlockRange {
    pub fn new(from: u64, to: u64) -> Self {
        Self { from, to }
    }

    /// Whether `block` lies inside the range
    pub fn contains(&self, block: u64) -> bool {
        block >= self.from && block <= self.to
    }

    pub fn is_empty(&self) -> bool {
        self.from > self.to
    }

    /// Split into consecutive sub-ranges of at most `max_len` blocks
    pub fn chunks(&self, max_len: u64) -> Vec<BlockRange> {
        let max_len = max_len.max(1);
        let mut chunks = Vec::new();
        let mut from = self.from;
        while from <= self.to {
            let to = from.saturating_add(max_len - 1).min(self.to);
            chunks.push(BlockRange { from, to });
            if to == u64::MAX {
                break;
            }
            from = to + 1;
        }
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes32_hex() {
        let hash = Bytes32::from_hex(
            "0x0000000000000000000000000000000000000000000000000000000000000001",
        )
        .unwrap();
        assert_eq!(hash.0[31], 1);
        assert!(!hash.is_zero());
        assert!(Bytes32::ZERO.is_zero());
        assert_eq!(hash.to_hex().len(), 66);

        assert!(Bytes32::from_hex("0x01").is_err());
        assert!(Bytes32::from_hex("zz").is_err());
    }

    #[test]
    fn test_evm_address_from_hex() {
        let addr = EvmAddress::from_hex("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266").unwrap();
        assert_eq!(addr.as_hex(), "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266");

        let padded = EvmAddress::from_hex(
            "0x000000000000000000000000f39fd6e51aad88f6f4ce6ab8827279cfffb92266",
        )
        .unwrap();
        assert_eq!(addr, padded);

        let bad_padding = EvmAddress::from_hex(
            "0x010000000000000000000000f39fd6e51aad88f6f4ce6ab8827279cfffb92266",
        );
        assert!(bad_padding.is_err());
    }

    #[test]
    fn test_address_bytes32_topic() {
        let addr = EvmAddress::repeat_byte(0xAA);
        let topic = addr.as_bytes32();
        assert_eq!(&topic.0[..12], &[0u8; 12]);
        assert_eq!(EvmAddress::from_bytes32(&topic), addr);
    }

    #[test]
    fn test_transfer_state_encoding() {
        for value in 0u8..=3 {
            let state = TransferState::from_u8(value).unwrap();
            assert_eq!(state.as_u8(), value);
        }
        assert!(TransferState::from_u8(4).is_none());
        assert!(TransferState::Success.is_terminal());
        assert!(TransferState::Failed.is_terminal());
        assert!(!TransferState::Pending.is_terminal());
        assert_eq!(TransferState::default(), TransferState::Unknown);
    }

    #[test]
    fn test_zero_records() {
        let record = PaymentRecord::default();
        assert_eq!(record.state, TransferState::Unknown);
        assert!(record.hash.is_zero());

        let record = BridgeRecord::default();
        assert!(!record.exist);
    }

    #[test]
    fn test_block_range_chunks() {
        let range = BlockRange::new(1, 25);
        let chunks = range.chunks(10);
        assert_eq!(
            chunks,
            vec![
                BlockRange::new(1, 10),
                BlockRange::new(11, 20),
                BlockRange::new(21, 25)
            ]
        );
        assert!(BlockRange::new(5, 4).chunks(10).is_empty());
        assert!(range.contains(25));
        assert!(!range.contains(26));
    }

    #[test]
    fn test_record_json() {
        let record = PaymentRecord {
            hash: Bytes32::repeat_byte(0x01),
            signer: EvmAddress::repeat_byte(0xAA),
            nonce: 7,
            state: TransferState::Pending,
        };
        let json = serde_json::to_value(record).unwrap();
        assert_eq!(json["state"], "Pending");
        assert_eq!(json["nonce"], 7);

        let decoded: PaymentRecord = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, record);
    }
}
