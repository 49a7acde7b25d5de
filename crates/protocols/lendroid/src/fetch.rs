//! Lendroid State Fetching from the Ledger
//!
//! Typed reads of the settlement contract, token contracts and price feed.
//! Every read is a simulated call against the latest block. The `*_call`
//! builders are public so tests can program a mock ledger with the exact
//! calldata these reads produce.

use eth_node_client::Ledger;
use eth_tx::call::{decode_bool, decode_bytes32, decode_output, decode_uint, token_to_address, token_to_uint, ContractCall};
use ethers::abi::{ParamType, Token};
use ethers::types::{Address, Bytes, H256, U256};
use wrangler_core::{NodeError, PositionIndex, UnixTimestamp};

use crate::constants::{erc20, price_feed, protocol};
use crate::state::Position;

/// Which position book to walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanScope {
    /// Every position recorded by the contract
    All,
    /// Positions approved by one wrangler
    Wrangler(Address),
    /// Positions one wrangler approved for a single creator
    CreatorWrangler { creator: Address, wrangler: Address },
}

async fn read(ledger: &dyn Ledger, call: &ContractCall) -> Result<Bytes, NodeError> {
    ledger.call(call.to, call.calldata()).await
}

fn uint(value: u64) -> Token {
    Token::Uint(U256::from(value))
}

fn bytes32(hash: H256) -> Token {
    Token::FixedBytes(hash.as_bytes().to_vec())
}

fn as_u64(value: U256, what: &str) -> Result<u64, NodeError> {
    if value > U256::from(u64::MAX) {
        return Err(NodeError::ParseError(format!("{} out of range: {}", what, value)));
    }
    Ok(value.as_u64())
}

// =============================================================================
// Call builders
// =============================================================================

pub fn wranglers_call(protocol_addr: Address, wrangler: Address) -> ContractCall {
    ContractCall::new(protocol_addr, protocol::WRANGLERS, vec![Token::Address(wrangler)])
}

pub fn supported_token_call(protocol_addr: Address, token: Address) -> ContractCall {
    ContractCall::new(protocol_addr, protocol::SUPPORTED_TOKENS, vec![Token::Address(token)])
}

pub fn nonce_call(protocol_addr: Address, wrangler: Address, creator: Address) -> ContractCall {
    ContractCall::new(
        protocol_addr,
        protocol::NONCES,
        vec![Token::Address(wrangler), Token::Address(creator)],
    )
}

pub fn owed_value_call(
    protocol_addr: Address,
    filled: U256,
    daily_rate: U256,
    duration_secs: u64,
) -> ContractCall {
    ContractCall::new(
        protocol_addr,
        protocol::OWED_VALUE,
        vec![Token::Uint(filled), Token::Uint(daily_rate), uint(duration_secs)],
    )
}

pub fn balance_call(token: Address, owner: Address) -> ContractCall {
    ContractCall::new(token, erc20::BALANCE_OF, vec![Token::Address(owner)])
}

pub fn allowance_call(token: Address, owner: Address, spender: Address) -> ContractCall {
    ContractCall::new(
        token,
        erc20::ALLOWANCE,
        vec![Token::Address(owner), Token::Address(spender)],
    )
}

pub fn price_feed_call(feed: Address) -> ContractCall {
    ContractCall::new(feed, price_feed::READ, vec![])
}

pub fn last_position_index_call(protocol_addr: Address, scope: ScanScope) -> ContractCall {
    match scope {
        ScanScope::All => ContractCall::new(protocol_addr, protocol::LAST_POSITION_INDEX, vec![]),
        ScanScope::Wrangler(wrangler) => ContractCall::new(
            protocol_addr,
            protocol::LAST_WRANGLER_POSITION_INDEX,
            vec![Token::Address(wrangler)],
        ),
        ScanScope::CreatorWrangler { creator, wrangler } => ContractCall::new(
            protocol_addr,
            protocol::LAST_CREATOR_WRANGLER_POSITION_INDEX,
            vec![Token::Address(creator), Token::Address(wrangler)],
        ),
    }
}

pub fn position_hash_call(protocol_addr: Address, scope: ScanScope, index: PositionIndex) -> ContractCall {
    match scope {
        ScanScope::All => ContractCall::new(protocol_addr, protocol::POSITION_HASH, vec![uint(index)]),
        ScanScope::Wrangler(wrangler) => ContractCall::new(
            protocol_addr,
            protocol::WRANGLER_POSITION_HASH,
            vec![Token::Address(wrangler), uint(index)],
        ),
        ScanScope::CreatorWrangler { creator, wrangler } => ContractCall::new(
            protocol_addr,
            protocol::CREATOR_WRANGLER_POSITION_HASH,
            vec![Token::Address(creator), Token::Address(wrangler), uint(index)],
        ),
    }
}

pub fn position_expiry_call(protocol_addr: Address, hash: H256) -> ContractCall {
    ContractCall::new(protocol_addr, protocol::POSITION_EXPIRY, vec![bytes32(hash)])
}

pub fn position_status_call(protocol_addr: Address, hash: H256) -> ContractCall {
    ContractCall::new(protocol_addr, protocol::POSITION_STATUS, vec![bytes32(hash)])
}

pub fn position_call(protocol_addr: Address, hash: H256) -> ContractCall {
    ContractCall::new(protocol_addr, protocol::POSITION, vec![bytes32(hash)])
}

// =============================================================================
// Reads
// =============================================================================

pub async fn is_wrangler_registered(
    ledger: &dyn Ledger,
    protocol_addr: Address,
    wrangler: Address,
) -> Result<bool, NodeError> {
    decode_bool(&read(ledger, &wranglers_call(protocol_addr, wrangler)).await?)
}

pub async fn is_token_supported(
    ledger: &dyn Ledger,
    protocol_addr: Address,
    token: Address,
) -> Result<bool, NodeError> {
    decode_bool(&read(ledger, &supported_token_call(protocol_addr, token)).await?)
}

/// Last nonce the contract consumed for `(wrangler, creator)`
pub async fn consumed_nonce(
    ledger: &dyn Ledger,
    protocol_addr: Address,
    wrangler: Address,
    creator: Address,
) -> Result<U256, NodeError> {
    decode_uint(&read(ledger, &nonce_call(protocol_addr, wrangler, creator)).await?)
}

/// Principal plus interest, as the contract computes it
pub async fn owed_value(
    ledger: &dyn Ledger,
    protocol_addr: Address,
    filled: U256,
    daily_rate: U256,
    duration_secs: u64,
) -> Result<U256, NodeError> {
    let call = owed_value_call(protocol_addr, filled, daily_rate, duration_secs);
    decode_uint(&read(ledger, &call).await?)
}

pub async fn token_balance(ledger: &dyn Ledger, token: Address, owner: Address) -> Result<U256, NodeError> {
    decode_uint(&read(ledger, &balance_call(token, owner)).await?)
}

pub async fn token_allowance(
    ledger: &dyn Ledger,
    token: Address,
    owner: Address,
    spender: Address,
) -> Result<U256, NodeError> {
    decode_uint(&read(ledger, &allowance_call(token, owner, spender)).await?)
}

/// Raw feed value, 18 decimals. Zero means the feed is unset.
pub async fn price_feed_value(ledger: &dyn Ledger, feed: Address) -> Result<U256, NodeError> {
    decode_uint(&read(ledger, &price_feed_call(feed)).await?)
}

pub async fn last_position_index(
    ledger: &dyn Ledger,
    protocol_addr: Address,
    scope: ScanScope,
) -> Result<PositionIndex, NodeError> {
    let value = decode_uint(&read(ledger, &last_position_index_call(protocol_addr, scope)).await?)?;
    as_u64(value, "last position index")
}

/// Zero hash means the slot is empty
pub async fn position_hash(
    ledger: &dyn Ledger,
    protocol_addr: Address,
    scope: ScanScope,
    index: PositionIndex,
) -> Result<H256, NodeError> {
    decode_bytes32(&read(ledger, &position_hash_call(protocol_addr, scope, index)).await?)
}

pub async fn position_expiry(
    ledger: &dyn Ledger,
    protocol_addr: Address,
    hash: H256,
) -> Result<UnixTimestamp, NodeError> {
    let value = decode_uint(&read(ledger, &position_expiry_call(protocol_addr, hash)).await?)?;
    as_u64(value, "position expiry")
}

pub async fn position_status(ledger: &dyn Ledger, protocol_addr: Address, hash: H256) -> Result<u64, NodeError> {
    let value = decode_uint(&read(ledger, &position_status_call(protocol_addr, hash)).await?)?;
    as_u64(value, "position status")
}

pub async fn position(ledger: &dyn Ledger, protocol_addr: Address, hash: H256) -> Result<Position, NodeError> {
    let data = read(ledger, &position_call(protocol_addr, hash)).await?;
    let tokens = decode_output(
        &[
            ParamType::Address,
            ParamType::Address,
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::Uint(256),
            ParamType::FixedBytes(32),
        ],
        &data,
    )?;

    let stored_hash = match &tokens[6] {
        Token::FixedBytes(bytes) if bytes.len() == 32 => H256::from_slice(bytes),
        other => return Err(NodeError::ParseError(format!("expected bytes32, got {:?}", other))),
    };

    Ok(Position {
        hash: stored_hash,
        lend_token: token_to_address(&tokens[0])?,
        collateral_token: token_to_address(&tokens[1])?,
        lend_filled: token_to_uint(&tokens[2])?,
        collateral_amount: token_to_uint(&tokens[3])?,
        expires_at: as_u64(token_to_uint(&tokens[4])?, "position expiry")?,
        status: as_u64(token_to_uint(&tokens[5])?, "position status")?,
    })
}

/// Whether `tx_hash` was sent by `prover` to the settlement contract
pub async fn is_protocol_transaction_sender(
    ledger: &dyn Ledger,
    protocol_addr: Address,
    prover: Address,
    tx_hash: H256,
) -> Result<bool, NodeError> {
    match ledger.transaction(tx_hash).await? {
        Some(tx) => Ok(tx.from == prover && tx.to == Some(protocol_addr)),
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eth_node_client::{MockLedger, TxSummary};
    use ethers::abi;

    const PROTOCOL: Address = Address::repeat_byte(0xaa);

    fn program(ledger: &MockLedger, call: &ContractCall, output: &[Token]) {
        ledger.set_call(call.to, call.calldata().to_vec(), abi::encode(output));
    }

    #[tokio::test]
    async fn test_registered_wrangler() {
        let ledger = MockLedger::new(0);
        let wrangler = Address::repeat_byte(1);
        program(&ledger, &wranglers_call(PROTOCOL, wrangler), &[Token::Bool(true)]);

        assert!(is_wrangler_registered(&ledger, PROTOCOL, wrangler).await.unwrap());
        // unprogrammed call reverts
        assert!(is_wrangler_registered(&ledger, PROTOCOL, Address::repeat_byte(2))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_position_decoding() {
        let ledger = MockLedger::new(0);
        let hash = H256::repeat_byte(0x77);
        program(
            &ledger,
            &position_call(PROTOCOL, hash),
            &[
                Token::Address(Address::repeat_byte(3)),
                Token::Address(Address::repeat_byte(4)),
                Token::Uint(U256::exp10(18)),
                Token::Uint(U256::exp10(15)),
                Token::Uint(U256::from(1_700_000_000u64)),
                Token::Uint(U256::one()),
                Token::FixedBytes(hash.as_bytes().to_vec()),
            ],
        );

        let position = position(&ledger, PROTOCOL, hash).await.unwrap();
        assert_eq!(position.hash, hash);
        assert_eq!(position.lend_token, Address::repeat_byte(3));
        assert_eq!(position.lend_filled, U256::exp10(18));
        assert_eq!(position.expires_at, 1_700_000_000);
        assert!(position.is_open());
    }

    #[tokio::test]
    async fn test_scoped_position_books_use_different_calls() {
        let wrangler = Address::repeat_byte(5);
        let all = position_hash_call(PROTOCOL, ScanScope::All, 3);
        let scoped = position_hash_call(PROTOCOL, ScanScope::Wrangler(wrangler), 3);
        assert_ne!(all.calldata(), scoped.calldata());
        assert_eq!(scoped.signature, protocol::WRANGLER_POSITION_HASH);
    }

    #[tokio::test]
    async fn test_protocol_transaction_sender() {
        let ledger = MockLedger::new(0);
        let prover = Address::repeat_byte(6);
        let tx_hash = H256::repeat_byte(0x10);
        ledger.add_transaction(TxSummary {
            tx_hash,
            from: prover,
            to: Some(PROTOCOL),
        });

        assert!(is_protocol_transaction_sender(&ledger, PROTOCOL, prover, tx_hash).await.unwrap());
        assert!(!is_protocol_transaction_sender(&ledger, PROTOCOL, Address::repeat_byte(7), tx_hash)
            .await
            .unwrap());
        assert!(!is_protocol_transaction_sender(&ledger, Address::repeat_byte(8), prover, tx_hash)
            .await
            .unwrap());
        assert!(!is_protocol_transaction_sender(&ledger, PROTOCOL, prover, H256::repeat_byte(0x11))
            .await
            .unwrap());
    }
}
