//! Node status endpoint

use axum::{extract::State, routing::get, Json, Router};
use eth_node_client::detect_capabilities;
use eth_tx::units::checksum;

use crate::dto::NodeStatusResponse;
use crate::AppState;

/// Create node routes
pub fn router() -> Router<AppState> {
    Router::new().route("/status", get(get_status))
}

/// GET /node/status - Reachability and chain of the configured node
pub async fn get_status(State(state): State<AppState>) -> Json<NodeStatusResponse> {
    let ctx = state.context();
    let expected_chain_id = ctx.settings.chain_id;
    let caps = detect_capabilities(ctx.ledger.as_ref(), expected_chain_id).await;

    Json(NodeStatusResponse {
        connected: caps.is_online,
        url: state.node_url().to_string(),
        network: state.network().as_str().to_string(),
        wrangler: checksum(&ctx.settings.wrangler),
        chain_id: caps.chain_id,
        expected_chain_id,
        chain_id_matches: caps.chain_id_matches,
        latest_block: caps.latest_block,
        latest_block_timestamp: caps.latest_block_timestamp,
        uptime_secs: state.uptime_secs(),
    })
}
