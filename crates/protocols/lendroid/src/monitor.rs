//! Position monitor and liquidator
//!
//! Walks a position book from the last recorded index down to zero and
//! liquidates every open position whose expiry has passed in ledger time.
//! One failed liquidation never stops the scan; failures are reported in the
//! [`ScanReport`]. Receipt waits are bounded and stop when the shutdown signal
//! fires.

use std::time::Duration;

use eth_node_client::TxReceipt;
use ethers::types::H256;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use wrangler_core::{Error, MonitorConfig, PositionIndex, TxError, UnixTimestamp};

use crate::context::WranglerContext;
use crate::fetch;
use crate::state::is_liquidatable;
use crate::tx_builder;

pub use crate::fetch::ScanScope;

// ─── Types ───────────────────────────────────────────────────────────────────

/// How long and how often to poll for a receipt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub timeout: Duration,
}

impl From<&MonitorConfig> for ReceiptPolicy {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            initial_interval: Duration::from_secs(config.receipt_poll_interval_secs.max(1)),
            max_interval: Duration::from_secs(config.receipt_max_poll_interval_secs.max(1)),
            timeout: Duration::from_secs(config.receipt_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Liquidation {
    pub index: PositionIndex,
    pub position_hash: H256,
    pub tx_hash: H256,
    /// False when the liquidation was mined but reverted
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanFailure {
    pub index: PositionIndex,
    pub position_hash: Option<H256>,
    pub error: String,
}

/// Outcome of one pass over a position book
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    /// Non-empty slots looked at
    pub inspected: u64,
    pub liquidated: Vec<Liquidation>,
    pub failures: Vec<ScanFailure>,
    /// True when the scan stopped early on shutdown
    pub interrupted: bool,
}

/// Resolves once `true` has been sent. Never resolves if the sender is gone.
async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

// ─── Liquidator ──────────────────────────────────────────────────────────────

pub struct Liquidator {
    ctx: WranglerContext,
    policy: ReceiptPolicy,
    shutdown: watch::Receiver<bool>,
}

impl Liquidator {
    pub fn new(ctx: WranglerContext, shutdown: watch::Receiver<bool>) -> Self {
        let policy = ReceiptPolicy::from(&ctx.settings.monitor);
        Self {
            ctx,
            policy,
            shutdown,
        }
    }

    pub fn with_policy(mut self, policy: ReceiptPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn stopping(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// One pass over `scope`. Only the initial index and clock reads are fatal.
    pub async fn scan(&self, scope: ScanScope) -> Result<ScanReport, Error> {
        let ledger = self.ctx.ledger.as_ref();
        let protocol = self.ctx.settings.protocol;

        let (last_index, now) = tokio::try_join!(
            fetch::last_position_index(ledger, protocol, scope),
            ledger.block_timestamp()
        )?;

        let mut report = ScanReport::default();
        for index in (0..=last_index).rev() {
            if self.stopping() {
                report.interrupted = true;
                break;
            }

            let hash = match fetch::position_hash(ledger, protocol, scope, index).await {
                Ok(hash) if hash.is_zero() => continue,
                Ok(hash) => hash,
                Err(e) => {
                    report.failures.push(ScanFailure {
                        index,
                        position_hash: None,
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            report.inspected += 1;

            match self.inspect(index, hash, now).await {
                Ok(Some(liquidation)) => report.liquidated.push(liquidation),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(index, position = ?hash, error = %e, "Liquidation failed");
                    report.failures.push(ScanFailure {
                        index,
                        position_hash: Some(hash),
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            inspected = report.inspected,
            liquidated = report.liquidated.len(),
            failed = report.failures.len(),
            "Position scan complete"
        );
        Ok(report)
    }

    async fn inspect(&self, index: PositionIndex, hash: H256, now: UnixTimestamp) -> Result<Option<Liquidation>, Error> {
        let ledger = self.ctx.ledger.as_ref();
        let protocol = self.ctx.settings.protocol;

        let (expires_at, status) = tokio::try_join!(
            fetch::position_expiry(ledger, protocol, hash),
            fetch::position_status(ledger, protocol, hash)
        )?;

        if !is_liquidatable(status, expires_at, now) {
            return Ok(None);
        }

        tracing::info!(index, position = ?hash, expires_at, "Liquidating expired position");
        let receipt = self.liquidate(hash).await?;
        if receipt.success {
            tracing::info!(index, tx_hash = ?receipt.tx_hash, "Liquidation confirmed");
        } else {
            tracing::warn!(index, tx_hash = ?receipt.tx_hash, "Liquidation reverted");
        }
        Ok(Some(Liquidation {
            index,
            position_hash: hash,
            tx_hash: receipt.tx_hash,
            success: receipt.success,
        }))
    }

    /// Sign, submit and wait for a `liquidate_position` transaction
    pub async fn liquidate(&self, position_hash: H256) -> Result<TxReceipt, Error> {
        let call = tx_builder::liquidation_call(&self.ctx, position_hash);
        let signed = tx_builder::build_signed_call(&self.ctx, &call).await?;
        let tx_hash = tx_builder::submit(&self.ctx, &signed).await?;
        Ok(self.wait_for_receipt(tx_hash).await?)
    }

    /// Poll for a receipt with doubling intervals until the policy timeout
    pub async fn wait_for_receipt(&self, tx_hash: H256) -> Result<TxReceipt, TxError> {
        let mut shutdown = self.shutdown.clone();
        let deadline = Instant::now() + self.policy.timeout;
        let mut interval = self.policy.initial_interval;

        loop {
            match self.ctx.ledger.transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => {}
                Err(e) => tracing::debug!(tx_hash = ?tx_hash, error = %e, "Receipt poll failed"),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(TxError::ReceiptTimeout {
                    tx_hash: format!("{:?}", tx_hash),
                    secs: self.policy.timeout.as_secs(),
                });
            }

            let pause = interval.min(deadline - now);
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = stop_requested(&mut shutdown) => {
                    return Err(TxError::Cancelled {
                        tx_hash: format!("{:?}", tx_hash),
                    });
                }
            }
            interval = (interval * 2).min(self.policy.max_interval);
        }
    }

    /// Scan every `scan_interval` until shutdown
    pub async fn run(self, scope: ScanScope, scan_interval: Duration) {
        let mut shutdown = self.shutdown.clone();
        tracing::info!(?scope, interval_secs = scan_interval.as_secs(), "Position monitor started");

        loop {
            if let Err(e) = self.scan(scope).await {
                tracing::error!(error = %e, "Position scan failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(scan_interval) => {}
                _ = stop_requested(&mut shutdown) => break,
            }
        }

        tracing::info!("Position monitor stopped");
    }
}
