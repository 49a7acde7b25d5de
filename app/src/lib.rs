//! Wrangler service entry point
//!
//! Loads configuration, connects to the node, starts the position monitor
//! when enabled and serves the HTTP API until interrupted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use eth_node_client::{detect_capabilities, NodeClient};
use eth_tx::signing::wallet_from_key;
use eth_tx::units::checksum;
use lendroid::{Liquidator, MarketRateOracle, ScanScope, Settings, WranglerContext};
use tokio::sync::watch;
use wrangler_api::{start_server, AppState};
use wrangler_core::AppConfig;

/// Path of the JSON config file
pub const CONFIG_PATH_ENV: &str = "WRANGLER_CONFIG";
/// Hex private key of the wrangler account; overrides the config file
pub const PRIVATE_KEY_ENV: &str = "WRANGLER_PRIVATE_KEY";

const DEFAULT_CONFIG_PATH: &str = "wrangler.json";

pub fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wrangler=debug".parse()?)
                .add_directive("lendroid=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("cannot start async runtime")?;

    runtime.block_on(serve(load_config()?))
}

/// Read the config file and apply environment overrides
pub fn load_config() -> anyhow::Result<AppConfig> {
    let path = std::env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = AppConfig::from_file(&path)?;
    apply_env(&mut config, std::env::var(PRIVATE_KEY_ENV).ok());
    Ok(config)
}

fn apply_env(config: &mut AppConfig, private_key: Option<String>) {
    if let Some(key) = private_key.filter(|k| !k.trim().is_empty()) {
        config.wrangler.private_key = key;
    }
}

/// Build the wrangler context against the configured node and market data
pub fn build_context(config: &AppConfig) -> anyhow::Result<WranglerContext> {
    let settings = Settings::from_config(config)?;
    if config.wrangler.private_key.trim().is_empty() {
        anyhow::bail!("no private key configured; set {}", PRIVATE_KEY_ENV);
    }
    let signer = wallet_from_key(&config.wrangler.private_key)?;

    let ledger = Arc::new(NodeClient::new(config.node.clone())?);
    let oracle = Arc::new(MarketRateOracle::new(
        ledger.clone(),
        &settings,
        config.oracle.clone(),
    )?);

    Ok(WranglerContext::new(settings, ledger, oracle, signer)?)
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let ctx = build_context(&config)?;
    let settings = ctx.settings.clone();

    tracing::info!(
        network = %settings.network,
        wrangler = %checksum(&settings.wrangler),
        protocol = %checksum(&settings.protocol),
        node = %config.node.url,
        "Starting wrangler"
    );

    if settings.chain_id.is_none() {
        tracing::warn!("No chain id configured; settlement transactions will not be signed");
    }

    let caps = detect_capabilities(ctx.ledger.as_ref(), settings.chain_id).await;
    if !caps.is_usable() {
        tracing::warn!(
            online = caps.is_online,
            chain_id = ?caps.chain_id,
            "Node is not usable yet; requests will fail until it is"
        );
    }

    let (stop_tx, stop_rx) = watch::channel(false);

    let monitor = if settings.monitor.enabled {
        let liquidator = Liquidator::new(ctx.clone(), stop_rx);
        let interval = Duration::from_secs(settings.monitor.scan_interval_secs);
        Some(tokio::spawn(
            liquidator.run(ScanScope::Wrangler(settings.wrangler), interval),
        ))
    } else {
        tracing::info!("Position monitor disabled");
        None
    };

    let state = AppState::new(ctx, config.node.url.clone());
    let served = start_server(state, &config.api_host, config.api_port, shutdown_signal()).await;

    let _ = stop_tx.send(true);
    if let Some(monitor) = monitor {
        if let Err(e) = monitor.await {
            tracing::error!(error = %e, "Position monitor task failed");
        }
    }

    served.context("API server failed")?;
    tracing::info!("Wrangler stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lendroid::testing;

    #[test]
    fn test_env_key_overrides_config() {
        let mut config = testing::app_config();
        apply_env(&mut config, Some(testing::WRANGLER_KEY.to_string()));
        assert_eq!(config.wrangler.private_key, testing::WRANGLER_KEY);

        apply_env(&mut config, Some("  ".to_string()));
        assert_eq!(config.wrangler.private_key, testing::WRANGLER_KEY);
    }

    #[test]
    fn test_context_requires_a_key() {
        let config = testing::app_config();
        let err = build_context(&config).err().unwrap();
        assert!(err.to_string().contains(PRIVATE_KEY_ENV));
    }

    #[tokio::test]
    async fn test_context_from_config() {
        let mut config = testing::app_config();
        apply_env(&mut config, Some(testing::WRANGLER_KEY.to_string()));
        let ctx = build_context(&config).unwrap();
        assert_eq!(ctx.settings.wrangler, testing::wrangler_address());
    }
}
