//! ABI calldata encoding and output decoding

use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::id;
use wrangler_core::NodeError;

/// A call to a contract function identified by its canonical signature
#[derive(Debug, Clone)]
pub struct ContractCall {
    pub to: Address,
    pub signature: &'static str,
    pub args: Vec<Token>,
}

impl ContractCall {
    pub fn new(to: Address, signature: &'static str, args: Vec<Token>) -> Self {
        Self {
            to,
            signature,
            args,
        }
    }

    /// 4-byte selector followed by the ABI-encoded arguments
    pub fn calldata(&self) -> Bytes {
        encode_call(self.signature, &self.args)
    }
}

/// Encode calldata for `signature` (e.g. `"balanceOf(address)"`)
pub fn encode_call(signature: &str, args: &[Token]) -> Bytes {
    let mut data = id(signature).to_vec();
    data.extend(abi::encode(args));
    Bytes::from(data)
}

/// Decode return data against the expected output types
pub fn decode_output(types: &[ParamType], data: &[u8]) -> Result<Vec<Token>, NodeError> {
    abi::decode(types, data).map_err(|e| NodeError::ParseError(format!("ABI decode: {}", e)))
}

pub fn decode_uint(data: &[u8]) -> Result<U256, NodeError> {
    match decode_output(&[ParamType::Uint(256)], data)?.pop() {
        Some(Token::Uint(value)) => Ok(value),
        other => Err(unexpected("uint256", other)),
    }
}

pub fn decode_bool(data: &[u8]) -> Result<bool, NodeError> {
    match decode_output(&[ParamType::Bool], data)?.pop() {
        Some(Token::Bool(value)) => Ok(value),
        other => Err(unexpected("bool", other)),
    }
}

pub fn decode_bytes32(data: &[u8]) -> Result<H256, NodeError> {
    match decode_output(&[ParamType::FixedBytes(32)], data)?.pop() {
        Some(Token::FixedBytes(bytes)) if bytes.len() == 32 => Ok(H256::from_slice(&bytes)),
        other => Err(unexpected("bytes32", other)),
    }
}

/// Extract a uint from an already-decoded token
pub fn token_to_uint(token: &Token) -> Result<U256, NodeError> {
    token
        .clone()
        .into_uint()
        .ok_or_else(|| unexpected("uint256", Some(token.clone())))
}

pub fn token_to_address(token: &Token) -> Result<Address, NodeError> {
    token
        .clone()
        .into_address()
        .ok_or_else(|| unexpected("address", Some(token.clone())))
}

fn unexpected(expected: &str, got: Option<Token>) -> NodeError {
    NodeError::ParseError(format!("expected {}, got {:?}", expected, got))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_of_calldata() {
        let owner = Address::repeat_byte(0xab);
        let data = encode_call("balanceOf(address)", &[Token::Address(owner)]);
        // keccak("balanceOf(address)")[..4]
        assert_eq!(&data[..4], &[0x70, 0xa0, 0x82, 0x31]);
        assert_eq!(data.len(), 4 + 32);
        assert_eq!(&data[16..36], owner.as_bytes());
    }

    #[test]
    fn test_contract_call_matches_encode_call() {
        let call = ContractCall::new(
            Address::zero(),
            "allowance(address,address)",
            vec![
                Token::Address(Address::repeat_byte(1)),
                Token::Address(Address::repeat_byte(2)),
            ],
        );
        assert_eq!(&call.calldata()[..4], &[0xdd, 0x62, 0xed, 0x3e]);
        assert_eq!(call.calldata().len(), 4 + 64);
    }

    #[test]
    fn test_decode_scalars() {
        let encoded = abi::encode(&[Token::Uint(U256::from(42u64))]);
        assert_eq!(decode_uint(&encoded).unwrap(), U256::from(42u64));

        let encoded = abi::encode(&[Token::Bool(true)]);
        assert!(decode_bool(&encoded).unwrap());

        let hash = H256::repeat_byte(0x5a);
        let encoded = abi::encode(&[Token::FixedBytes(hash.as_bytes().to_vec())]);
        assert_eq!(decode_bytes32(&encoded).unwrap(), hash);
    }

    #[test]
    fn test_decode_short_data_fails() {
        assert!(matches!(decode_uint(&[0u8; 4]), Err(NodeError::ParseError(_))));
    }
}
