//! Wrangler context
//!
//! Typed settings resolved once from [`AppConfig`] and the handles every
//! operation needs: ledger, rate oracle, signing key and nonce book.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use eth_node_client::Ledger;
use eth_tx::units::checksum;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use rust_decimal::Decimal;
use wrangler_core::constants::{PROTOCOL_TOKEN_SYMBOL, STABLE_SYMBOL, WRAPPED_NATIVE_SYMBOL};
use wrangler_core::{AppConfig, Error, MonitorConfig, Network, ProtocolError};

use crate::nonce::NonceBook;
use crate::rates::RateOracle;

fn parse_address(raw: &str, what: &str) -> Result<Address, Error> {
    Address::from_str(raw.trim())
        .map_err(|_| Error::Config(format!("{} is not a valid address: {:?}", what, raw)))
}

/// Token symbol <-> address table for the configured network
#[derive(Debug, Clone, Default)]
pub struct AssetBook {
    by_symbol: BTreeMap<String, Address>,
}

impl AssetBook {
    pub fn from_symbols(symbols: &BTreeMap<String, String>) -> Result<Self, Error> {
        let mut by_symbol = BTreeMap::new();
        for (symbol, raw) in symbols {
            let address = parse_address(raw, &format!("asset {}", symbol))?;
            by_symbol.insert(symbol.to_uppercase(), address);
        }
        Ok(Self { by_symbol })
    }

    pub fn address_of(&self, symbol: &str) -> Option<Address> {
        self.by_symbol.get(&symbol.to_uppercase()).copied()
    }

    pub fn symbol_of(&self, address: Address) -> Option<&str> {
        self.by_symbol
            .iter()
            .find(|(_, a)| **a == address)
            .map(|(symbol, _)| symbol.as_str())
    }

    /// Symbol for `address`, or `UnknownAsset`
    pub fn require_symbol(&self, address: Address) -> Result<&str, ProtocolError> {
        self.symbol_of(address).ok_or_else(|| ProtocolError::UnknownAsset {
            address: checksum(&address),
        })
    }

    pub fn wrapped_native(&self) -> Option<Address> {
        self.address_of(WRAPPED_NATIVE_SYMBOL)
    }

    pub fn stable(&self) -> Option<Address> {
        self.address_of(STABLE_SYMBOL)
    }

    pub fn protocol_token(&self) -> Option<Address> {
        self.address_of(PROTOCOL_TOKEN_SYMBOL)
    }
}

/// Settings the workflow reads on every request
#[derive(Debug, Clone)]
pub struct Settings {
    pub network: Network,
    /// `None` when neither the config nor the network supplies one
    pub chain_id: Option<u64>,
    pub wrangler: Address,
    /// Lowercased names a request may use instead of the wrangler address
    pub accepted_names: Vec<String>,
    pub approval_ttl_secs: u64,
    pub margin_factor: Decimal,
    pub submit_settlement: bool,
    pub protocol: Address,
    pub price_feed: Option<Address>,
    /// Token the protocol fees are paid in
    pub protocol_token: Address,
    pub assets: AssetBook,
    pub monitor: MonitorConfig,
}

impl Settings {
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        if config.wrangler.margin_factor <= Decimal::ZERO {
            return Err(Error::Config("wrangler.margin_factor must be positive".to_string()));
        }

        let assets = AssetBook::from_symbols(&config.assets)?;
        let protocol_token = assets.protocol_token().ok_or_else(|| {
            Error::Config(format!(
                "assets must include the protocol token {}",
                PROTOCOL_TOKEN_SYMBOL
            ))
        })?;

        let price_feed = config
            .contracts
            .price_feed
            .as_deref()
            .map(|raw| parse_address(raw, "contracts.price_feed"))
            .transpose()?;

        Ok(Self {
            network: config.network,
            chain_id: config.resolved_chain_id(),
            wrangler: parse_address(&config.wrangler.address, "wrangler.address")?,
            accepted_names: config
                .wrangler
                .accepted_names
                .iter()
                .map(|name| name.trim().to_lowercase())
                .collect(),
            approval_ttl_secs: config.wrangler.approval_ttl_secs,
            margin_factor: config.wrangler.margin_factor,
            submit_settlement: config.wrangler.submit_settlement,
            protocol: parse_address(&config.contracts.protocol, "contracts.protocol")?,
            price_feed,
            protocol_token,
            assets,
            monitor: config.monitor.clone(),
        })
    }

    /// Whether a request naming `identity` as its wrangler is addressed to us
    pub fn is_own_identity(&self, identity: &str) -> bool {
        let identity = identity.trim();
        if let Ok(address) = Address::from_str(identity) {
            return address == self.wrangler;
        }
        let identity = identity.to_lowercase();
        self.accepted_names.iter().any(|name| *name == identity)
    }
}

/// Shared handles for the underwriting and monitoring workflows
#[derive(Clone)]
pub struct WranglerContext {
    pub settings: Arc<Settings>,
    pub ledger: Arc<dyn Ledger>,
    pub oracle: Arc<dyn RateOracle>,
    pub nonces: Arc<NonceBook>,
    signer: LocalWallet,
}

impl WranglerContext {
    /// The signing key must belong to the configured wrangler address
    pub fn new(
        settings: Settings,
        ledger: Arc<dyn Ledger>,
        oracle: Arc<dyn RateOracle>,
        signer: LocalWallet,
    ) -> Result<Self, Error> {
        if signer.address() != settings.wrangler {
            return Err(Error::Config(format!(
                "private key belongs to {}, not to the configured wrangler {}",
                checksum(&signer.address()),
                checksum(&settings.wrangler)
            )));
        }

        Ok(Self {
            settings: Arc::new(settings),
            ledger,
            oracle,
            nonces: Arc::new(NonceBook::new()),
            signer,
        })
    }

    pub fn signer(&self) -> &LocalWallet {
        &self.signer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn test_settings_from_config() {
        let settings = Settings::from_config(&testing::app_config()).unwrap();
        assert_eq!(settings.network, Network::Kovan);
        assert_eq!(settings.chain_id, Some(42));
        assert_eq!(settings.wrangler, testing::wrangler_address());
        assert_eq!(settings.assets.address_of("weth"), Some(testing::weth()));
        assert_eq!(settings.assets.symbol_of(testing::dai()), Some("DAI"));
        assert!(settings.price_feed.is_some());
    }

    #[test]
    fn test_bad_address_is_config_error() {
        let mut config = testing::app_config();
        config.contracts.protocol = "not-an-address".to_string();
        assert!(matches!(Settings::from_config(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_own_identity() {
        let settings = Settings::from_config(&testing::app_config()).unwrap();
        assert!(settings.is_own_identity("lendroid"));
        assert!(settings.is_own_identity("Lendroid"));
        assert!(settings.is_own_identity(&format!("{:?}", testing::wrangler_address())));
        assert!(!settings.is_own_identity("SomeoneElse"));
        assert!(!settings.is_own_identity("0x1111111111111111111111111111111111111111"));
    }

    #[test]
    fn test_signer_must_match_wrangler() {
        let mut settings = Settings::from_config(&testing::app_config()).unwrap();
        settings.wrangler = Address::repeat_byte(0x99);
        let ledger = Arc::new(eth_node_client::MockLedger::new(0));
        let oracle = Arc::new(crate::FixedRateOracle::new());
        assert!(matches!(
            WranglerContext::new(settings, ledger, oracle, testing::wrangler_wallet()),
            Err(Error::Config(_))
        ));
    }
}
