//! Digest and transaction signing with a locally held key

use std::str::FromStr;

use ethers::abi::Token;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Signature, TransactionRequest, H256, U256};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};
use wrangler_core::TxError;

/// ECDSA signature split the way contracts take it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureParts {
    pub v: u64,
    pub r: H256,
    pub s: H256,
}

impl SignatureParts {
    /// `uint256[3]` as `[v, r, s]`
    pub fn to_token(&self) -> Token {
        Token::FixedArray(vec![
            Token::Uint(U256::from(self.v)),
            Token::Uint(U256::from_big_endian(self.r.as_bytes())),
            Token::Uint(U256::from_big_endian(self.s.as_bytes())),
        ])
    }

    pub fn to_signature(&self) -> Signature {
        Signature {
            r: U256::from_big_endian(self.r.as_bytes()),
            s: U256::from_big_endian(self.s.as_bytes()),
            v: self.v,
        }
    }
}

impl From<&Signature> for SignatureParts {
    fn from(sig: &Signature) -> Self {
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        sig.r.to_big_endian(&mut r);
        sig.s.to_big_endian(&mut s);
        Self {
            v: sig.v,
            r: H256::from(r),
            s: H256::from(s),
        }
    }
}

/// Parse a 65-byte `r ‖ s ‖ v` hex signature
pub fn parse_signature(hex_sig: &str) -> Result<SignatureParts, TxError> {
    let sig = Signature::from_str(hex_sig).map_err(|e| TxError::SigningFailed {
        message: format!("invalid signature encoding: {}", e),
    })?;
    Ok(SignatureParts::from(&sig))
}

/// Parse a hex private key into a wallet. The key never appears in the error.
pub fn wallet_from_key(private_key: &str) -> Result<LocalWallet, TxError> {
    let key = private_key.trim().trim_start_matches("0x");
    LocalWallet::from_str(key).map_err(|_| TxError::SigningFailed {
        message: "private key is not a valid secp256k1 key".to_string(),
    })
}

/// Sign a 32-byte digest as-is (no further prefixing)
pub fn sign_digest(wallet: &LocalWallet, digest: H256) -> Result<SignatureParts, TxError> {
    let sig = wallet.sign_hash(digest).map_err(|e| TxError::SigningFailed {
        message: e.to_string(),
    })?;
    Ok(SignatureParts::from(&sig))
}

/// Recover the address that produced `sig` over `digest`
pub fn recover_signer(sig: &SignatureParts, digest: H256) -> Result<Address, TxError> {
    sig.to_signature()
        .recover(digest)
        .map_err(|e| TxError::SigningFailed {
            message: format!("recovery failed: {}", e),
        })
}

/// A signed, RLP-encoded transaction ready for `eth_sendRawTransaction`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub raw: Bytes,
    pub tx_hash: H256,
    pub from: Address,
    pub to: Address,
    pub nonce: U256,
    pub gas: U256,
    pub gas_price: U256,
    pub chain_id: u64,
}

/// Sign a legacy transaction with EIP-155 replay protection
pub fn sign_transaction(
    wallet: &LocalWallet,
    chain_id: u64,
    request: TransactionRequest,
) -> Result<SignedTransaction, TxError> {
    if chain_id == 0 {
        return Err(TxError::ChainIdUnset);
    }

    let wallet = wallet.clone().with_chain_id(chain_id);
    let request = request.from(wallet.address()).chain_id(chain_id);

    let to = match &request.to {
        Some(ethers::types::NameOrAddress::Address(addr)) => *addr,
        _ => {
            return Err(TxError::BuildFailed {
                message: "transaction target must be an address".to_string(),
            })
        }
    };
    let nonce = request.nonce.ok_or_else(|| TxError::BuildFailed {
        message: "nonce not set".to_string(),
    })?;
    let gas = request.gas.ok_or_else(|| TxError::BuildFailed {
        message: "gas limit not set".to_string(),
    })?;
    let gas_price = request.gas_price.unwrap_or_default();

    let typed: TypedTransaction = request.into();
    let sig = wallet
        .sign_transaction_sync(&typed)
        .map_err(|e| TxError::SigningFailed {
            message: e.to_string(),
        })?;
    let raw = typed.rlp_signed(&sig);
    let tx_hash = H256::from(keccak256(&raw));

    Ok(SignedTransaction {
        raw,
        tx_hash,
        from: wallet.address(),
        to,
        nonce,
        gas,
        gas_price,
        chain_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::personal_digest;

    // Well-known development key (anvil/hardhat account #0)
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const DEV_ADDRESS: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

    #[test]
    fn test_wallet_from_key() {
        let wallet = wallet_from_key(DEV_KEY).unwrap();
        assert_eq!(wallet.address(), DEV_ADDRESS.parse::<Address>().unwrap());
        assert!(wallet_from_key("zz").is_err());
    }

    #[test]
    fn test_sign_and_recover_digest() {
        let wallet = wallet_from_key(DEV_KEY).unwrap();
        let digest = personal_digest(H256::repeat_byte(7));
        let sig = sign_digest(&wallet, digest).unwrap();
        assert!(sig.v == 27 || sig.v == 28);
        assert_eq!(recover_signer(&sig, digest).unwrap(), wallet.address());
    }

    #[test]
    fn test_signing_is_deterministic() {
        let wallet = wallet_from_key(DEV_KEY).unwrap();
        let digest = H256::repeat_byte(9);
        assert_eq!(
            sign_digest(&wallet, digest).unwrap(),
            sign_digest(&wallet, digest).unwrap()
        );
    }

    #[test]
    fn test_parse_signature_roundtrips_parts() {
        let wallet = wallet_from_key(DEV_KEY).unwrap();
        let parts = sign_digest(&wallet, H256::repeat_byte(3)).unwrap();
        let hex_sig = parts.to_signature().to_string();
        assert_eq!(parse_signature(&hex_sig).unwrap(), parts);
        assert_eq!(parse_signature(&format!("0x{}", hex_sig)).unwrap(), parts);
        assert!(parse_signature("0x1234").is_err());
    }

    #[test]
    fn test_sign_transaction_requires_chain_id() {
        let wallet = wallet_from_key(DEV_KEY).unwrap();
        let request = TransactionRequest::new()
            .to(Address::repeat_byte(1))
            .nonce(0u64)
            .gas(21_000u64)
            .gas_price(1u64);
        assert!(matches!(
            sign_transaction(&wallet, 0, request),
            Err(TxError::ChainIdUnset)
        ));
    }

    #[test]
    fn test_sign_transaction() {
        let wallet = wallet_from_key(DEV_KEY).unwrap();
        let request = TransactionRequest::new()
            .to(Address::repeat_byte(1))
            .data(vec![0xde, 0xad])
            .nonce(5u64)
            .gas(100_000u64)
            .gas_price(2_000_000_000u64);
        let signed = sign_transaction(&wallet, 42, request).unwrap();
        assert_eq!(signed.chain_id, 42);
        assert_eq!(signed.nonce, U256::from(5u64));
        assert_eq!(signed.from, wallet.address());
        assert_eq!(signed.tx_hash, H256::from(keccak256(&signed.raw)));
        // RLP list prefix
        assert!(signed.raw[0] >= 0xc0);
    }
}
