//! eth-node-client: Ledger capabilities over an Ethereum JSON-RPC node
//!
//! The wrangler never talks to the node directly. Everything it needs from the
//! chain goes through the [`Ledger`] trait: simulated calls, gas estimation,
//! block time, account nonces, raw transaction submission and receipts.
//! [`NodeClient`] implements it over `ethers` and [`MockLedger`] in memory.

pub mod capabilities;
pub mod mock;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, BlockNumber, Bytes, TransactionRequest, H256, U256};
use serde::{Deserialize, Serialize};
use wrangler_core::{NodeConfig, NodeError, UnixTimestamp};

pub use capabilities::{detect_capabilities, NodeCapabilities};
pub use mock::MockLedger;

/// Default timeout for node API calls (30 seconds).
const NODE_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Result type for node client operations
pub type Result<T> = std::result::Result<T, NodeError>;

/// Outcome of a mined transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: H256,
    pub block_number: Option<u64>,
    /// False when the transaction was mined but reverted
    pub success: bool,
}

/// Sender and target of a known transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSummary {
    pub tx_hash: H256,
    pub from: Address,
    pub to: Option<Address>,
}

/// What the wrangler needs from the chain
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Read contract state through a simulated call against the latest block
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes>;

    /// Estimate gas for a prospective state-changing call. Reverts surface as `NodeError::Reverted`.
    async fn estimate_gas(&self, from: Address, to: Address, data: Bytes) -> Result<U256>;

    async fn gas_price(&self) -> Result<U256>;

    /// Timestamp of the latest block
    async fn block_timestamp(&self) -> Result<UnixTimestamp>;

    async fn block_number(&self) -> Result<u64>;

    async fn chain_id(&self) -> Result<u64>;

    /// Next transaction sequence number for an account, pending transactions included
    async fn transaction_count(&self, address: Address) -> Result<U256>;

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256>;

    async fn transaction_receipt(&self, tx_hash: H256) -> Result<Option<TxReceipt>>;

    async fn transaction(&self, tx_hash: H256) -> Result<Option<TxSummary>>;
}

/// Ledger client backed by an `ethers` HTTP provider
#[derive(Clone)]
pub struct NodeClient {
    inner: Arc<Provider<Http>>,
    config: NodeConfig,
}

impl NodeClient {
    /// Create a client for the configured node. The connection is lazy.
    pub fn new(config: NodeConfig) -> Result<Self> {
        let provider = Provider::<Http>::try_from(config.url.as_str()).map_err(|e| {
            NodeError::Unreachable {
                url: format!("{}: {}", config.url, e),
            }
        })?;

        Ok(Self {
            inner: Arc::new(provider),
            config,
        })
    }

    /// Get the underlying provider (for advanced usage)
    pub fn inner(&self) -> &Provider<Http> {
        &self.inner
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }
}

fn call_request(from: Option<Address>, to: Address, data: Bytes) -> TypedTransaction {
    let mut request = TransactionRequest::new().to(to).data(data);
    if let Some(from) = from {
        request = request.from(from);
    }
    request.into()
}

#[async_trait]
impl Ledger for NodeClient {
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let tx = call_request(None, to, data);
        timed_request(self.inner.call(&tx, None)).await
    }

    async fn estimate_gas(&self, from: Address, to: Address, data: Bytes) -> Result<U256> {
        let tx = call_request(Some(from), to, data);
        timed_request(self.inner.estimate_gas(&tx, None)).await
    }

    async fn gas_price(&self) -> Result<U256> {
        timed_request(self.inner.get_gas_price()).await
    }

    async fn block_timestamp(&self) -> Result<UnixTimestamp> {
        let block = timed_request(self.inner.get_block(BlockNumber::Latest))
            .await?
            .ok_or_else(|| NodeError::ApiError {
                message: "Latest block not available".to_string(),
            })?;
        Ok(block.timestamp.low_u64())
    }

    async fn block_number(&self) -> Result<u64> {
        Ok(timed_request(self.inner.get_block_number()).await?.as_u64())
    }

    async fn chain_id(&self) -> Result<u64> {
        Ok(timed_request(self.inner.get_chainid()).await?.low_u64())
    }

    async fn transaction_count(&self, address: Address) -> Result<U256> {
        timed_request(
            self.inner
                .get_transaction_count(address, Some(BlockNumber::Pending.into())),
        )
        .await
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256> {
        let pending = tokio::time::timeout(
            NODE_REQUEST_TIMEOUT,
            self.inner.send_raw_transaction(raw),
        )
        .await
        .map_err(|_| NodeError::Timeout {
            secs: NODE_REQUEST_TIMEOUT.as_secs(),
        })?
        .map_err(classify_provider_error)?;
        Ok(pending.tx_hash())
    }

    async fn transaction_receipt(&self, tx_hash: H256) -> Result<Option<TxReceipt>> {
        let receipt = timed_request(self.inner.get_transaction_receipt(tx_hash)).await?;
        Ok(receipt.map(|r| TxReceipt {
            tx_hash: r.transaction_hash,
            block_number: r.block_number.map(|n| n.as_u64()),
            success: r.status.map(|s| s.as_u64() == 1).unwrap_or(false),
        }))
    }

    async fn transaction(&self, tx_hash: H256) -> Result<Option<TxSummary>> {
        let tx = timed_request(self.inner.get_transaction(tx_hash)).await?;
        Ok(tx.map(|t| TxSummary {
            tx_hash: t.hash,
            from: t.from,
            to: t.to,
        }))
    }
}

/// Wrap a node API call with a timeout. Converts both timeout and API errors to NodeError.
async fn timed_request<T, E: std::fmt::Display>(
    fut: impl std::future::Future<Output = std::result::Result<T, E>>,
) -> Result<T> {
    tokio::time::timeout(NODE_REQUEST_TIMEOUT, fut)
        .await
        .map_err(|_| NodeError::Timeout {
            secs: NODE_REQUEST_TIMEOUT.as_secs(),
        })?
        .map_err(classify_provider_error)
}

/// Reverts are reported by nodes as JSON-RPC errors; keep them distinguishable.
fn classify_provider_error<E: std::fmt::Display>(err: E) -> NodeError {
    let message = err.to_string();
    if message.to_lowercase().contains("revert") {
        NodeError::Reverted { message }
    } else {
        NodeError::ApiError { message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert_eq!(config.url, "http://127.0.0.1:8545");
        let client = NodeClient::new(config).unwrap();
        assert_eq!(client.config().url, "http://127.0.0.1:8545");
    }

    #[test]
    fn test_invalid_url_is_unreachable() {
        let result = NodeClient::new(NodeConfig {
            url: "not a url".to_string(),
        });
        assert!(matches!(result, Err(NodeError::Unreachable { .. })));
    }

    #[test]
    fn test_revert_classification() {
        let err = classify_provider_error("(code: 3, message: execution reverted: bad nonce)");
        assert!(matches!(err, NodeError::Reverted { .. }));

        let err = classify_provider_error("connection refused");
        assert!(matches!(err, NodeError::ApiError { .. }));
    }

    #[tokio::test]
    async fn test_timed_request_passes_value_through() {
        let value = timed_request(async { Ok::<_, String>(7u64) }).await.unwrap();
        assert_eq!(value, 7);
    }
}
