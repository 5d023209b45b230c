//! Keccak hashing and ABI topic encoding
//!
//! Indexed event parameters are stored as 32-byte topics. The encodings here
//! follow the Solidity ABI so the local log and the EVM log agree on what a
//! filter matches:
//! - `address` is left-padded with 12 zero bytes
//! - `uint64` is big-endian, right-aligned
//! - `bytes32` is used verbatim

use tiny_keccak::{Hasher, Keccak};

use crate::types::{Bytes32, EvmAddress};

/// Compute keccak256 hash of data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// topic0 for a canonical event signature, e.g. `Retry(bytes32)`
pub fn event_topic(signature: &str) -> Bytes32 {
    Bytes32(keccak256(signature.as_bytes()))
}

/// Topic encoding of an indexed `address`
pub fn address_topic(address: &EvmAddress) -> Bytes32 {
    address.as_bytes32()
}

/// Topic encoding of an indexed `uint64`
pub fn u64_topic(value: u64) -> Bytes32 {
    let mut out = [0u8; 32];
    out[24..].copy_from_slice(&value.to_be_bytes());
    Bytes32(out)
}

/// Decode an indexed `uint64` topic, rejecting values that overflow 64 bits
pub fn topic_to_u64(topic: &Bytes32) -> Option<u64> {
    if topic.0[..24].iter().any(|&b| b != 0) {
        return None;
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&topic.0[24..]);
    Some(u64::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak256_empty() {
        // keccak256("") is a well-known constant
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_ownership_transferred_topic() {
        // Same topic0 as OpenZeppelin's Ownable
        assert_eq!(
            event_topic("OwnershipTransferred(address,address)").to_hex(),
            "0x8be0079c531659141344cd1fd0a4f28419497f9722a3daafe3b4186f6b6457e0"
        );
    }

    #[test]
    fn test_u64_topic() {
        let topic = u64_topic(1023);
        assert_eq!(topic.0[30], 0x03);
        assert_eq!(topic.0[31], 0xff);
        assert_eq!(topic_to_u64(&topic), Some(1023));
        assert_eq!(topic_to_u64(&Bytes32::repeat_byte(1)), None);
    }
}
