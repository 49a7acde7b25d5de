//! Error types for the wrangler

use thiserror::Error;

/// Core errors that can occur in the wrangler
#[derive(Debug, Error)]
pub enum Error {
    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TxError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Ledger node connection and query errors
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Node unreachable at {url}")]
    Unreachable { url: String },

    #[error("Node returned error: {message}")]
    ApiError { message: String },

    #[error("Call reverted: {message}")]
    Reverted { message: String },

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Node request timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// Loan workflow errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed request: field `{field}` {reason}")]
    MalformedRequest { field: String, reason: String },

    #[error("Unknown asset: {address}")]
    UnknownAsset { address: String },

    #[error("Rate unavailable for {pair}: {reason}")]
    RateUnavailable { pair: String, reason: String },

    #[error("Invalid amount: {message}")]
    InvalidAmount { message: String },

    #[error("Arithmetic overflow while computing {what}")]
    ArithmeticOverflow { what: String },

    #[error("Position {index} not found")]
    PositionNotFound { index: u64 },

    #[error("Position {index} has no filled amount")]
    NoFilledAmount { index: u64 },

    #[error("Ledger state unavailable: {reason}")]
    StateUnavailable { reason: String },
}

/// Transaction building and submission errors
#[derive(Debug, Error)]
pub enum TxError {
    #[error("Failed to build transaction: {message}")]
    BuildFailed { message: String },

    #[error("Failed to sign: {message}")]
    SigningFailed { message: String },

    #[error("Chain id is not configured; refusing to sign a replayable transaction")]
    ChainIdUnset,

    #[error("Transaction submission failed: {message}")]
    SubmissionFailed { message: String },

    #[error("No receipt for {tx_hash} after {secs}s")]
    ReceiptTimeout { tx_hash: String, secs: u64 },

    #[error("Cancelled while waiting for {tx_hash}")]
    Cancelled { tx_hash: String },
}

/// Result type alias for wrangler operations
pub type Result<T> = std::result::Result<T, Error>;

impl ProtocolError {
    /// Get an HTTP-friendly error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MalformedRequest { .. } => "malformed_request",
            Self::UnknownAsset { .. } => "unknown_asset",
            Self::RateUnavailable { .. } => "rate_unavailable",
            Self::InvalidAmount { .. } => "invalid_amount",
            Self::ArithmeticOverflow { .. } => "arithmetic_overflow",
            Self::PositionNotFound { .. } => "position_not_found",
            Self::NoFilledAmount { .. } => "no_filled_amount",
            Self::StateUnavailable { .. } => "state_unavailable",
        }
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MalformedRequest { .. } | Self::InvalidAmount { .. } => 400,
            Self::UnknownAsset { .. } | Self::ArithmeticOverflow { .. } => 400,
            Self::PositionNotFound { .. } | Self::NoFilledAmount { .. } => 400,
            Self::RateUnavailable { .. } => 502,
            Self::StateUnavailable { .. } => 503,
        }
    }
}

impl Error {
    /// Error code exposed to API callers
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Protocol(e) => e.error_code(),
            _ => "internal_error",
        }
    }

    /// HTTP status for API callers. Anything that is not a protocol error is opaque.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Protocol(e) => e.status_code(),
            _ => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_codes() {
        let err = ProtocolError::MalformedRequest {
            field: "creatorSalt".into(),
            reason: "is required".into(),
        };
        assert_eq!(err.error_code(), "malformed_request");
        assert_eq!(err.status_code(), 400);
        assert_eq!(
            err.to_string(),
            "Malformed request: field `creatorSalt` is required"
        );

        let err = ProtocolError::RateUnavailable {
            pair: "DAI/WETH".into(),
            reason: "timeout".into(),
        };
        assert_eq!(err.error_code(), "rate_unavailable");
        assert_eq!(err.status_code(), 502);
    }

    #[test]
    fn test_non_protocol_errors_are_opaque() {
        let err: Error = TxError::ChainIdUnset.into();
        assert_eq!(err.error_code(), "internal_error");
        assert_eq!(err.status_code(), 500);

        let err: Error = NodeError::Timeout { secs: 30 }.into();
        assert_eq!(err.status_code(), 500);
    }
}
