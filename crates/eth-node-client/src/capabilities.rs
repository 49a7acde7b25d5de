//! Node capability detection
//!
//! Probes whether the node answers and whether it serves the chain the
//! wrangler is configured for.

use serde::{Deserialize, Serialize};

use crate::Ledger;

/// Node capabilities detected through probing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeCapabilities {
    /// Node is reachable and responding
    pub is_online: bool,

    /// Chain id reported by the node
    pub chain_id: Option<u64>,

    pub latest_block: u64,

    pub latest_block_timestamp: u64,

    /// `Some(false)` when the node serves a different chain than configured
    pub chain_id_matches: Option<bool>,
}

impl NodeCapabilities {
    fn offline() -> Self {
        Self {
            is_online: false,
            chain_id: None,
            latest_block: 0,
            latest_block_timestamp: 0,
            chain_id_matches: None,
        }
    }

    /// Safe to underwrite against: online and on the expected chain
    pub fn is_usable(&self) -> bool {
        self.is_online && self.chain_id_matches != Some(false)
    }
}

/// Detect node capabilities by probing the ledger
pub async fn detect_capabilities(
    ledger: &dyn Ledger,
    expected_chain_id: Option<u64>,
) -> NodeCapabilities {
    let latest_block = match ledger.block_number().await {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!(error = %e, "Node did not answer block number probe");
            return NodeCapabilities::offline();
        }
    };

    let latest_block_timestamp = ledger.block_timestamp().await.unwrap_or(0);
    let chain_id = ledger.chain_id().await.ok();

    let chain_id_matches = match (chain_id, expected_chain_id) {
        (Some(actual), Some(expected)) => {
            if actual != expected {
                tracing::warn!(actual, expected, "Node serves an unexpected chain");
            }
            Some(actual == expected)
        }
        _ => None,
    };

    NodeCapabilities {
        is_online: true,
        chain_id,
        latest_block,
        latest_block_timestamp,
        chain_id_matches,
    }
}
