//! Configuration types for the wrangler

use std::collections::BTreeMap;
use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Error, Network};

/// Ledger node connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// JSON-RPC URL (e.g., "http://127.0.0.1:8545")
    pub url: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8545".to_string(),
        }
    }
}

/// Identity and underwriting policy of this wrangler
#[derive(Clone, Serialize, Deserialize)]
pub struct WranglerConfig {
    /// Address the wrangler signs approvals with
    pub address: String,

    /// Hex private key. Normally supplied through `WRANGLER_PRIVATE_KEY`.
    #[serde(default, skip_serializing)]
    pub private_key: String,

    /// Other identities a fill request may name as its wrangler (e.g. "Lendroid")
    #[serde(default)]
    pub accepted_names: Vec<String>,

    /// How long a wrangler approval stays valid on-chain
    #[serde(default = "default_approval_ttl_secs")]
    pub approval_ttl_secs: u64,

    /// Required over-collateralization multiplier
    #[serde(default = "default_margin_factor")]
    pub margin_factor: Decimal,

    /// Broadcast the signed settlement transaction instead of only returning it
    #[serde(default)]
    pub submit_settlement: bool,
}

// The private key must never reach a log line.
impl std::fmt::Debug for WranglerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WranglerConfig")
            .field("address", &self.address)
            .field("private_key", &"<redacted>")
            .field("accepted_names", &self.accepted_names)
            .field("approval_ttl_secs", &self.approval_ttl_secs)
            .field("margin_factor", &self.margin_factor)
            .field("submit_settlement", &self.submit_settlement)
            .finish()
    }
}

fn default_approval_ttl_secs() -> u64 {
    120
}

fn default_margin_factor() -> Decimal {
    Decimal::new(15, 1)
}

/// Contract addresses on the configured network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractsConfig {
    /// Settlement (protocol) contract
    pub protocol: String,

    /// On-chain price feed for the wrapped-native/stable pair
    #[serde(default)]
    pub price_feed: Option<String>,
}

/// External market data endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Fallback for the canonical pair. `{ticker}` is replaced by the stable asset ticker.
    #[serde(default = "default_market_data_url")]
    pub market_data_url: String,

    /// Spot price endpoint used for every other pair
    #[serde(default = "default_spot_price_url")]
    pub spot_price_url: String,

    #[serde(default = "default_oracle_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_market_data_url() -> String {
    "https://api.coinmarketcap.com/v1/ticker/{ticker}/?convert=ETH".to_string()
}

fn default_spot_price_url() -> String {
    "https://min-api.cryptocompare.com/data/price".to_string()
}

fn default_oracle_timeout_secs() -> u64 {
    10
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            market_data_url: default_market_data_url(),
            spot_price_url: default_spot_price_url(),
            request_timeout_secs: default_oracle_timeout_secs(),
        }
    }
}

/// Position monitor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Pause between two full scans of the position book
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,

    /// First delay between two receipt polls; doubles up to the maximum
    #[serde(default = "default_receipt_poll_interval_secs")]
    pub receipt_poll_interval_secs: u64,

    #[serde(default = "default_receipt_max_poll_interval_secs")]
    pub receipt_max_poll_interval_secs: u64,

    /// Give up waiting for a liquidation receipt after this long
    #[serde(default = "default_receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_scan_interval_secs() -> u64 {
    60
}

fn default_receipt_poll_interval_secs() -> u64 {
    2
}

fn default_receipt_max_poll_interval_secs() -> u64 {
    30
}

fn default_receipt_timeout_secs() -> u64 {
    600
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scan_interval_secs: default_scan_interval_secs(),
            receipt_poll_interval_secs: default_receipt_poll_interval_secs(),
            receipt_max_poll_interval_secs: default_receipt_max_poll_interval_secs(),
            receipt_timeout_secs: default_receipt_timeout_secs(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Network (mainnet, kovan or local)
    pub network: Network,

    /// Overrides the network's default chain id
    #[serde(default)]
    pub chain_id: Option<u64>,

    /// Node connection settings
    #[serde(default)]
    pub node: NodeConfig,

    pub wrangler: WranglerConfig,

    pub contracts: ContractsConfig,

    /// Token symbol -> token address
    pub assets: BTreeMap<String, String>,

    #[serde(default)]
    pub oracle: OracleConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default = "default_api_host")]
    pub api_host: String,

    /// API server port
    #[serde(default = "default_api_port")]
    pub api_port: u16,
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    5000
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, Error> {
        serde_json::from_str(raw).map_err(|e| Error::Config(format!("invalid config: {}", e)))
    }

    /// Chain id used for replay protection. `None` means it is unset.
    pub fn resolved_chain_id(&self) -> Option<u64> {
        self.chain_id
            .or_else(|| self.network.default_chain_id())
            .filter(|id| *id != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const MINIMAL: &str = r#"{
        "network": "kovan",
        "wrangler": { "address": "0x71f1b38fa1e9bc2e7a4e0b2e3b5d6f1c7c52fd1a" },
        "contracts": { "protocol": "0x2c8a6b2cd2f4b8f1d21e6f7ac63c0e9c5a6c7d8e" },
        "assets": {
            "WETH": "0xd0a1e359811322d97991e03f863a0c30c2cf029c",
            "DAI": "0xc4375b7de8af5a38a93548eb8453a498222c4ff2",
            "LST": "0x3f5b5c1c8d0b6f7e4a1a5e2b3c4d5e6f7a8b9c0d"
        }
    }"#;

    #[test]
    fn test_minimal_config_defaults() {
        let config = AppConfig::from_json(MINIMAL).unwrap();
        assert_eq!(config.network, Network::Kovan);
        assert_eq!(config.node.url, "http://127.0.0.1:8545");
        assert_eq!(config.wrangler.approval_ttl_secs, 120);
        assert_eq!(config.wrangler.margin_factor, dec!(1.5));
        assert!(!config.wrangler.submit_settlement);
        assert!(config.monitor.enabled);
        assert_eq!(config.api_port, 5000);
        assert_eq!(config.resolved_chain_id(), Some(42));
    }

    #[test]
    fn test_chain_id_override_and_unset() {
        let mut config = AppConfig::from_json(MINIMAL).unwrap();
        config.chain_id = Some(1337);
        assert_eq!(config.resolved_chain_id(), Some(1337));

        config.network = Network::Local;
        config.chain_id = None;
        assert_eq!(config.resolved_chain_id(), None);

        config.chain_id = Some(0);
        assert_eq!(config.resolved_chain_id(), None);
    }

    #[test]
    fn test_private_key_never_serialized() {
        let mut config = AppConfig::from_json(MINIMAL).unwrap();
        config.wrangler.private_key = "deadbeef".to_string();
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("deadbeef"));
        assert!(!format!("{:?}", config).contains("deadbeef"));
    }

    #[test]
    fn test_invalid_config_is_config_error() {
        let err = AppConfig::from_json("{ \"network\": \"ropsten\" }").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
