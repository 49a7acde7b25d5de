//! Core type definitions for the wrangler

use serde::{Deserialize, Serialize};
use std::fmt;

/// Network the wrangler is deployed against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Kovan,
    Local,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Kovan => "kovan",
            Self::Local => "local",
        }
    }

    /// EIP-155 chain id for public networks. Local chains must be configured explicitly.
    pub fn default_chain_id(&self) -> Option<u64> {
        match self {
            Self::Mainnet => Some(1),
            Self::Kovan => Some(42),
            Self::Local => None,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Seconds since the unix epoch, as reported by the ledger
pub type UnixTimestamp = u64;

/// Position index on the settlement ledger
pub type PositionIndex = u64;

/// Constants
pub mod constants {
    /// Token amounts and rates are 18-decimal fixed point
    pub const TOKEN_DECIMALS: u32 = 18;

    /// Position status values reported by the settlement contract
    pub const POSITION_STATUS_OPEN: u64 = 1;
    pub const POSITION_STATUS_CLOSED: u64 = 2;
    pub const POSITION_STATUS_LIQUIDATED: u64 = 3;

    /// Symbols the wrangler requires in its asset table
    pub const WRAPPED_NATIVE_SYMBOL: &str = "WETH";
    pub const STABLE_SYMBOL: &str = "DAI";
    pub const PROTOCOL_TOKEN_SYMBOL: &str = "LST";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_display() {
        assert_eq!(Network::Mainnet.as_str(), "mainnet");
        assert_eq!(Network::Kovan.to_string(), "kovan");
    }

    #[test]
    fn test_default_chain_ids() {
        assert_eq!(Network::Mainnet.default_chain_id(), Some(1));
        assert_eq!(Network::Kovan.default_chain_id(), Some(42));
        assert_eq!(Network::Local.default_chain_id(), None);
    }

    #[test]
    fn test_network_serde() {
        let net: Network = serde_json::from_str("\"kovan\"").unwrap();
        assert_eq!(net, Network::Kovan);
    }
}
