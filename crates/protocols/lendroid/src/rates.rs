//! Rate Oracle
//!
//! Exchange rates between a lend asset and a collateral asset, expressed as
//! collateral units per one lend unit.
//!
//! The wrapped-native/stable pair is read from the on-chain price feed, with
//! the market data API as fallback while the feed is unset. Every other pair
//! comes from the spot price API. There is no default rate: a pair that
//! cannot be priced is `RateUnavailable`.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use eth_node_client::Ledger;
use eth_tx::units::{checksum, wei_to_units};
use ethers::types::Address;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use wrangler_core::constants::{STABLE_SYMBOL, WRAPPED_NATIVE_SYMBOL};
use wrangler_core::{Error, OracleConfig, ProtocolError};

use crate::context::{AssetBook, Settings};
use crate::fetch;

/// Lend and collateral asset of a loan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AssetPair {
    pub lend: Address,
    pub collateral: Address,
}

impl AssetPair {
    pub fn new(lend: Address, collateral: Address) -> Self {
        Self { lend, collateral }
    }

    fn describe(&self, assets: &AssetBook) -> String {
        let name = |a: Address| {
            assets
                .symbol_of(a)
                .map(str::to_string)
                .unwrap_or_else(|| checksum(&a))
        };
        format!("{}/{}", name(self.lend), name(self.collateral))
    }
}

/// Source of lend -> collateral exchange rates
#[async_trait]
pub trait RateOracle: Send + Sync {
    /// Collateral units per one lend unit. Always strictly positive.
    async fn rate(&self, pair: &AssetPair) -> Result<Decimal, ProtocolError>;
}

/// Rate for the canonical pair given the feed's stable-per-native price
pub fn canonical_rate(lend_is_stable: bool, stable_per_native: Decimal) -> Option<Decimal> {
    if stable_per_native <= Decimal::ZERO {
        return None;
    }
    if lend_is_stable {
        Decimal::ONE.checked_div(stable_per_native)
    } else {
        Some(stable_per_native)
    }
}

/// Ticker the market APIs use for a token symbol
fn market_ticker(symbol: &str) -> &str {
    if symbol.eq_ignore_ascii_case(WRAPPED_NATIVE_SYMBOL) {
        "ETH"
    } else {
        symbol
    }
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

/// `[{"price_eth": "0.0005", ...}]` -> native units per stable unit
pub fn parse_market_data(body: &Value) -> Option<Decimal> {
    match body.get(0)?.get("price_eth")? {
        Value::String(s) => parse_decimal(s),
        Value::Number(n) => n.as_f64().and_then(Decimal::from_f64),
        _ => None,
    }
}

/// `{"ETH": 0.0005}` -> the quote for `ticker`
pub fn parse_spot_price(body: &Value, ticker: &str) -> Option<Decimal> {
    match body.get(ticker)? {
        Value::Number(n) => n.as_f64().and_then(Decimal::from_f64),
        Value::String(s) => parse_decimal(s),
        _ => None,
    }
}

/// Production oracle backed by the price feed contract and public market APIs
pub struct MarketRateOracle {
    ledger: Arc<dyn Ledger>,
    price_feed: Option<Address>,
    assets: AssetBook,
    http: reqwest::Client,
    config: OracleConfig,
}

impl MarketRateOracle {
    pub fn new(ledger: Arc<dyn Ledger>, settings: &Settings, config: OracleConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("lendroid-wrangler/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            ledger,
            price_feed: settings.price_feed,
            assets: settings.assets.clone(),
            http,
            config,
        })
    }

    fn unavailable(&self, pair: &AssetPair, reason: impl Into<String>) -> ProtocolError {
        ProtocolError::RateUnavailable {
            pair: pair.describe(&self.assets),
            reason: reason.into(),
        }
    }

    /// Stable units per wrapped-native unit
    async fn stable_per_native(&self, pair: &AssetPair) -> Result<Decimal, ProtocolError> {
        if let Some(feed) = self.price_feed {
            match fetch::price_feed_value(self.ledger.as_ref(), feed).await {
                Ok(value) if !value.is_zero() => return Ok(wei_to_units(value)?),
                Ok(_) => tracing::debug!(feed = %checksum(&feed), "Price feed unset, using market data"),
                Err(e) => tracing::warn!(
                    feed = %checksum(&feed),
                    error = %e,
                    "Price feed read failed, using market data"
                ),
            }
        }

        let native_per_stable = self.market_data(pair).await?;
        Decimal::ONE
            .checked_div(native_per_stable)
            .ok_or_else(|| self.unavailable(pair, "market data price is zero"))
    }

    async fn get_json(&self, request: reqwest::RequestBuilder) -> Result<Value, reqwest::Error> {
        request.send().await?.error_for_status()?.json::<Value>().await
    }

    async fn market_data(&self, pair: &AssetPair) -> Result<Decimal, ProtocolError> {
        let url = self
            .config
            .market_data_url
            .replace("{ticker}", &STABLE_SYMBOL.to_lowercase());
        let body = self
            .get_json(self.http.get(&url))
            .await
            .map_err(|e| self.unavailable(pair, format!("market data request failed: {}", e)))?;

        parse_market_data(&body)
            .filter(|price| *price > Decimal::ZERO)
            .ok_or_else(|| self.unavailable(pair, "market data response has no usable price_eth"))
    }

    async fn spot_price(
        &self,
        pair: &AssetPair,
        lend_symbol: &str,
        collateral_symbol: &str,
    ) -> Result<Decimal, ProtocolError> {
        let from = market_ticker(lend_symbol);
        let to = market_ticker(collateral_symbol);
        let request = self
            .http
            .get(&self.config.spot_price_url)
            .query(&[("fsym", from), ("tsyms", to)]);
        let body = self
            .get_json(request)
            .await
            .map_err(|e| self.unavailable(pair, format!("spot price request failed: {}", e)))?;

        parse_spot_price(&body, to)
            .ok_or_else(|| self.unavailable(pair, format!("spot price response has no {} quote", to)))
    }
}

#[async_trait]
impl RateOracle for MarketRateOracle {
    async fn rate(&self, pair: &AssetPair) -> Result<Decimal, ProtocolError> {
        let lend_symbol = self.assets.require_symbol(pair.lend)?.to_string();
        let collateral_symbol = self.assets.require_symbol(pair.collateral)?.to_string();

        let stable = self.assets.stable();
        let native = self.assets.wrapped_native();
        let canonical = |a: Address, b: Address| Some(a) == stable && Some(b) == native;

        let rate = if canonical(pair.lend, pair.collateral) || canonical(pair.collateral, pair.lend) {
            let stable_per_native = self.stable_per_native(pair).await?;
            canonical_rate(Some(pair.lend) == stable, stable_per_native)
                .ok_or_else(|| self.unavailable(pair, "price feed value is not positive"))?
        } else {
            self.spot_price(pair, &lend_symbol, &collateral_symbol).await?
        };

        if rate <= Decimal::ZERO {
            return Err(self.unavailable(pair, format!("non-positive rate {}", rate)));
        }

        tracing::debug!(
            lend = %lend_symbol,
            collateral = %collateral_symbol,
            rate = %rate,
            "Resolved exchange rate"
        );
        Ok(rate)
    }
}

/// Oracle with rates set programmatically
#[derive(Debug, Default)]
pub struct FixedRateOracle {
    rates: RwLock<HashMap<AssetPair, Decimal>>,
}

impl FixedRateOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(self, pair: AssetPair, rate: Decimal) -> Self {
        self.set_rate(pair, rate);
        self
    }

    pub fn set_rate(&self, pair: AssetPair, rate: Decimal) {
        if let Ok(mut rates) = self.rates.write() {
            rates.insert(pair, rate);
        }
    }

    pub fn remove_rate(&self, pair: &AssetPair) {
        if let Ok(mut rates) = self.rates.write() {
            rates.remove(pair);
        }
    }
}

#[async_trait]
impl RateOracle for FixedRateOracle {
    async fn rate(&self, pair: &AssetPair) -> Result<Decimal, ProtocolError> {
        let rate = self
            .rates
            .read()
            .ok()
            .and_then(|rates| rates.get(pair).copied());
        match rate {
            Some(rate) if rate > Decimal::ZERO => Ok(rate),
            _ => Err(ProtocolError::RateUnavailable {
                pair: format!("{}/{}", checksum(&pair.lend), checksum(&pair.collateral)),
                reason: "no rate configured".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use eth_node_client::MockLedger;
    use ethers::abi::{self, Token};
    use ethers::types::U256;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_canonical_rate_orientation() {
        // 2000 DAI per WETH
        assert_eq!(canonical_rate(true, dec!(2000)), Some(dec!(0.0005)));
        assert_eq!(canonical_rate(false, dec!(2000)), Some(dec!(2000)));
        assert_eq!(canonical_rate(true, Decimal::ZERO), None);
    }

    #[test]
    fn test_parse_market_data() {
        assert_eq!(
            parse_market_data(&json!([{ "id": "dai", "price_eth": "0.0005" }])),
            Some(dec!(0.0005))
        );
        assert_eq!(parse_market_data(&json!([{ "price_eth": "5e-4" }])), Some(dec!(0.0005)));
        assert_eq!(parse_market_data(&json!([])), None);
        assert_eq!(parse_market_data(&json!({ "error": "id not found" })), None);
    }

    #[test]
    fn test_parse_spot_price() {
        assert_eq!(parse_spot_price(&json!({ "ETH": 0.25 }), "ETH"), Some(dec!(0.25)));
        assert_eq!(parse_spot_price(&json!({ "Response": "Error" }), "ETH"), None);
    }

    #[test]
    fn test_wrapped_native_uses_eth_ticker() {
        assert_eq!(market_ticker("WETH"), "ETH");
        assert_eq!(market_ticker("LST"), "LST");
    }

    fn oracle_with_feed(ledger: Arc<MockLedger>) -> MarketRateOracle {
        let settings = Settings::from_config(&testing::app_config()).unwrap();
        MarketRateOracle::new(ledger, &settings, OracleConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_canonical_pair_reads_price_feed() {
        let ledger = Arc::new(MockLedger::new(0));
        let call = fetch::price_feed_call(testing::price_feed());
        let value = U256::from(2000u64) * U256::exp10(18);
        ledger.set_call(call.to, call.calldata().to_vec(), abi::encode(&[Token::Uint(value)]));
        let oracle = oracle_with_feed(ledger);

        let borrow_dai = AssetPair::new(testing::dai(), testing::weth());
        assert_eq!(oracle.rate(&borrow_dai).await.unwrap(), dec!(0.0005));

        let borrow_weth = AssetPair::new(testing::weth(), testing::dai());
        assert_eq!(oracle.rate(&borrow_weth).await.unwrap(), dec!(2000));
    }

    #[tokio::test]
    async fn test_unknown_asset_is_rejected() {
        let oracle = oracle_with_feed(Arc::new(MockLedger::new(0)));
        let pair = AssetPair::new(Address::repeat_byte(0xee), testing::weth());
        assert!(matches!(
            oracle.rate(&pair).await,
            Err(ProtocolError::UnknownAsset { .. })
        ));
    }

    #[tokio::test]
    async fn test_fixed_oracle_has_no_default() {
        let pair = AssetPair::new(testing::dai(), testing::weth());
        let oracle = FixedRateOracle::new();
        assert!(matches!(
            oracle.rate(&pair).await,
            Err(ProtocolError::RateUnavailable { .. })
        ));

        oracle.set_rate(pair, dec!(0.001));
        assert_eq!(oracle.rate(&pair).await.unwrap(), dec!(0.001));

        oracle.set_rate(pair, Decimal::ZERO);
        assert!(oracle.rate(&pair).await.is_err());
    }
}
