//! API route handlers

pub mod health;
pub mod loans;
pub mod node;

use axum::{http::StatusCode, routing::get, Json, Router};

use crate::dto::ApiError;
use crate::AppState;

/// Create the API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .nest("/node", node::router())
        .merge(loans::router())
        .fallback(not_found)
        .with_state(state)
}

async fn not_found() -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::NOT_FOUND,
        Json(ApiError::not_found("Sorry, nothing at this URL.")),
    )
}
