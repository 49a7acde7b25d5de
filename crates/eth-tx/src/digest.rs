//! Packed encoding and message digests
//!
//! `ethers::abi::encode_packed` sizes integers by value because `Token` does not
//! carry a bit width, so uint256 packing is done here with explicit widths.

use ethers::types::{Address, H256, U256};
use ethers::utils::keccak256;

/// Prefix the signer adds before hashing a 32-byte message
pub const PERSONAL_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

/// Builder for `abi.encodePacked`-style byte strings with fixed widths
#[derive(Debug, Default, Clone)]
pub struct PackedEncoder {
    buf: Vec<u8>,
}

impl PackedEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 20 bytes
    pub fn address(mut self, address: Address) -> Self {
        self.buf.extend_from_slice(address.as_bytes());
        self
    }

    /// 32 bytes, big-endian
    pub fn uint256(mut self, value: U256) -> Self {
        let mut word = [0u8; 32];
        value.to_big_endian(&mut word);
        self.buf.extend_from_slice(&word);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn keccak(&self) -> H256 {
        H256::from(keccak256(&self.buf))
    }
}

/// `keccak256(PERSONAL_MESSAGE_PREFIX ‖ hash)`
pub fn personal_digest(hash: H256) -> H256 {
    let mut message = Vec::with_capacity(PERSONAL_MESSAGE_PREFIX.len() + 32);
    message.extend_from_slice(PERSONAL_MESSAGE_PREFIX);
    message.extend_from_slice(hash.as_bytes());
    H256::from(keccak256(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_widths() {
        let packed = PackedEncoder::new()
            .address(Address::repeat_byte(0x11))
            .uint256(U256::from(1u64))
            .into_bytes();
        assert_eq!(packed.len(), 20 + 32);
        assert_eq!(&packed[..20], &[0x11; 20]);
        // small integers are left-padded to a full word
        assert_eq!(&packed[20..51], &[0u8; 31]);
        assert_eq!(packed[51], 1);
    }

    #[test]
    fn test_personal_digest_matches_ethers_hash_message() {
        let hash = H256::repeat_byte(0x42);
        let expected = ethers::utils::hash_message(hash.as_bytes());
        assert_eq!(personal_digest(hash), expected);
    }

    #[test]
    fn test_prefix_length() {
        assert_eq!(PERSONAL_MESSAGE_PREFIX.len(), 28);
    }
}
