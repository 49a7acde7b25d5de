//! In-memory ledger for tests
//!
//! Answers simulated calls from a table keyed by `(contract, calldata)`,
//! records submitted raw transactions and mines them instantly unless told not to.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::keccak256;
use wrangler_core::{NodeError, UnixTimestamp};

use crate::{Ledger, Result, TxReceipt, TxSummary};

struct MockState {
    calls: HashMap<(Address, Vec<u8>), Vec<u8>>,
    timestamp: UnixTimestamp,
    block_number: u64,
    chain_id: u64,
    gas_estimate: std::result::Result<U256, String>,
    gas_price: U256,
    tx_counts: HashMap<Address, U256>,
    submitted: Vec<Bytes>,
    auto_mine: bool,
    receipts: HashMap<H256, TxReceipt>,
    transactions: HashMap<H256, TxSummary>,
}

/// Mock ledger with a programmable state table
pub struct MockLedger {
    state: RwLock<MockState>,
}

impl MockLedger {
    /// Create an empty ledger whose latest block has the given timestamp
    pub fn new(timestamp: UnixTimestamp) -> Self {
        Self {
            state: RwLock::new(MockState {
                calls: HashMap::new(),
                timestamp,
                block_number: 1,
                chain_id: 42,
                gas_estimate: Ok(U256::from(250_000u64)),
                gas_price: U256::from(1_000_000_000u64),
                tx_counts: HashMap::new(),
                submitted: Vec::new(),
                auto_mine: true,
                receipts: HashMap::new(),
                transactions: HashMap::new(),
            }),
        }
    }

    /// Answer `call(to, data)` with `response`
    pub fn set_call(&self, to: Address, data: impl Into<Vec<u8>>, response: impl Into<Vec<u8>>) {
        let mut state = self.state.write().unwrap();
        state.calls.insert((to, data.into()), response.into());
    }

    /// Whether `call(to, data)` has a programmed answer
    pub fn has_call(&self, to: Address, data: impl Into<Vec<u8>>) -> bool {
        self.state.read().unwrap().calls.contains_key(&(to, data.into()))
    }

    pub fn set_timestamp(&self, timestamp: UnixTimestamp) {
        self.state.write().unwrap().timestamp = timestamp;
    }

    pub fn set_chain_id(&self, chain_id: u64) {
        self.state.write().unwrap().chain_id = chain_id;
    }

    /// Make every gas estimation revert with the given reason
    pub fn fail_gas_estimate(&self, reason: impl Into<String>) {
        self.state.write().unwrap().gas_estimate = Err(reason.into());
    }

    pub fn set_gas_estimate(&self, gas: U256) {
        self.state.write().unwrap().gas_estimate = Ok(gas);
    }

    pub fn set_transaction_count(&self, address: Address, count: U256) {
        self.state.write().unwrap().tx_counts.insert(address, count);
    }

    /// When disabled, submitted transactions stay pending until `mine` is called
    pub fn set_auto_mine(&self, auto_mine: bool) {
        self.state.write().unwrap().auto_mine = auto_mine;
    }

    pub fn mine(&self, tx_hash: H256) {
        let mut state = self.state.write().unwrap();
        state.block_number += 1;
        let block_number = state.block_number;
        state.receipts.insert(
            tx_hash,
            TxReceipt {
                tx_hash,
                block_number: Some(block_number),
                success: true,
            },
        );
    }

    pub fn add_transaction(&self, summary: TxSummary) {
        let mut state = self.state.write().unwrap();
        state.transactions.insert(summary.tx_hash, summary);
    }

    /// Raw transactions submitted so far, in order
    pub fn submitted(&self) -> Vec<Bytes> {
        self.state.read().unwrap().submitted.clone()
    }
}

#[async_trait]
impl Ledger for MockLedger {
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let state = self.state.read().unwrap();
        state
            .calls
            .get(&(to, data.to_vec()))
            .map(|r| Bytes::from(r.clone()))
            .ok_or_else(|| NodeError::Reverted {
                message: format!("execution reverted: no state for call to {:?}", to),
            })
    }

    async fn estimate_gas(&self, _from: Address, _to: Address, _data: Bytes) -> Result<U256> {
        let state = self.state.read().unwrap();
        state
            .gas_estimate
            .clone()
            .map_err(|reason| NodeError::Reverted {
                message: format!("execution reverted: {}", reason),
            })
    }

    async fn gas_price(&self) -> Result<U256> {
        Ok(self.state.read().unwrap().gas_price)
    }

    async fn block_timestamp(&self) -> Result<UnixTimestamp> {
        Ok(self.state.read().unwrap().timestamp)
    }

    async fn block_number(&self) -> Result<u64> {
        Ok(self.state.read().unwrap().block_number)
    }

    async fn chain_id(&self) -> Result<u64> {
        Ok(self.state.read().unwrap().chain_id)
    }

    async fn transaction_count(&self, address: Address) -> Result<U256> {
        let state = self.state.read().unwrap();
        Ok(state.tx_counts.get(&address).copied().unwrap_or_default())
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256> {
        let tx_hash = H256::from(keccak256(&raw));
        let auto_mine = {
            let mut state = self.state.write().unwrap();
            state.submitted.push(raw);
            state.auto_mine
        };
        if auto_mine {
            self.mine(tx_hash);
        }
        Ok(tx_hash)
    }

    async fn transaction_receipt(&self, tx_hash: H256) -> Result<Option<TxReceipt>> {
        Ok(self.state.read().unwrap().receipts.get(&tx_hash).cloned())
    }

    async fn transaction(&self, tx_hash: H256) -> Result<Option<TxSummary>> {
        Ok(self.state.read().unwrap().transactions.get(&tx_hash).cloned())
    }
}
