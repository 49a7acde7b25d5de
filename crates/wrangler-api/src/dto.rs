//! Data Transfer Objects for API requests and responses

use lendroid::{Approval, LoanHealth, LoanObject, Settlement, ValidationError};
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Node status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatusResponse {
    pub connected: bool,
    pub url: String,
    pub network: String,
    pub wrangler: String,
    pub chain_id: Option<u64>,
    pub expected_chain_id: Option<u64>,
    pub chain_id_matches: Option<bool>,
    pub latest_block: u64,
    pub latest_block_timestamp: u64,
    pub uptime_secs: u64,
}

/// Generic API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }
}

/// An approved fill: the synthesized terms, the signed approval and, when it
/// could be built, the settlement transaction
#[derive(Debug, Clone, Serialize)]
pub struct LoanRequestResponse {
    pub data: LoanObject,
    pub approval: Approval,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<Settlement>,
}

/// A rejected fill
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorResponse {
    pub error: Vec<ValidationError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoanHealthResponse {
    pub data: LoanHealth,
}

/// Whether a transaction to the settlement contract came from the prover
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderCheckResponse {
    pub data: bool,
}
