//! Application state shared across API handlers

use std::sync::Arc;
use std::time::Instant;

use lendroid::WranglerContext;
use wrangler_core::Network;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    context: WranglerContext,
    node_url: String,
    started_at: Instant,
}

impl AppState {
    pub fn new(context: WranglerContext, node_url: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                context,
                node_url: node_url.into(),
                started_at: Instant::now(),
            }),
        }
    }

    /// Ledger, oracle and signing handles of this wrangler
    pub fn context(&self) -> &WranglerContext {
        &self.inner.context
    }

    pub fn node_url(&self) -> &str {
        &self.inner.node_url
    }

    pub fn network(&self) -> Network {
        self.inner.context.settings.network
    }

    pub fn uptime_secs(&self) -> u64 {
        self.inner.started_at.elapsed().as_secs()
    }
}
