//! Fill underwriting, loan health and settlement sender endpoints

use std::str::FromStr;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ethers::types::{Address, H256};
use lendroid::{LoanRequest, RawLoanRequest, ValidationError};
use wrangler_core::{Error, PositionIndex};

use crate::dto::{
    ApiError, LoanHealthResponse, LoanRequestResponse, SenderCheckResponse,
    ValidationErrorResponse,
};
use crate::AppState;

/// Create loan routes
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/loan_requests", post(create_loan_request))
        .route("/loan_health/:position_index", get(get_loan_health))
        .route(
            "/is_valid_protocol_transaction_sender/:prover/:tx_hash",
            get(check_protocol_transaction_sender),
        )
}

// =============================================================================
// Errors
// =============================================================================

/// Why a fill request produced no approval
#[derive(Debug)]
pub enum LoanRequestRejection {
    /// The request was understood but failed validation
    Invalid(Vec<ValidationError>),
    Failed(StatusCode, ApiError),
}

impl IntoResponse for LoanRequestRejection {
    fn into_response(self) -> Response {
        match self {
            Self::Invalid(error) => (
                StatusCode::BAD_REQUEST,
                Json(ValidationErrorResponse { error }),
            )
                .into_response(),
            Self::Failed(status, error) => (status, Json(error)).into_response(),
        }
    }
}

impl From<(StatusCode, Json<ApiError>)> for LoanRequestRejection {
    fn from((status, Json(error)): (StatusCode, Json<ApiError>)) -> Self {
        Self::Failed(status, error)
    }
}

/// Map a workflow error to its HTTP form. Only protocol errors carry their
/// message to the caller.
fn error_to_api(error: Error) -> (StatusCode, Json<ApiError>) {
    let status =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let body = match &error {
        Error::Protocol(e) => ApiError::new(e.error_code(), e.to_string()),
        _ => ApiError::internal("The request could not be processed"),
    };

    if status.is_server_error() {
        tracing::error!(error = %error, "Request failed");
    } else {
        tracing::debug!(error = %error, "Request refused");
    }

    (status, Json(body))
}

fn malformed(message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiError::new("malformed_request", message)),
    )
}

// =============================================================================
// Handlers
// =============================================================================

/// POST /loan_requests - Underwrite a fill of a posted offer
pub async fn create_loan_request(
    State(state): State<AppState>,
    payload: Result<Json<RawLoanRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<LoanRequestResponse>), LoanRequestRejection> {
    let Json(raw) = payload.map_err(|rejection| malformed(rejection.body_text()))?;
    let request = LoanRequest::try_from(raw).map_err(|e| error_to_api(e.into()))?;

    let underwriting = lendroid::approve_loan(state.context(), request)
        .await
        .map_err(error_to_api)?;

    if !underwriting.is_approved() {
        return Err(LoanRequestRejection::Invalid(underwriting.errors));
    }

    Ok((
        StatusCode::CREATED,
        Json(LoanRequestResponse {
            data: underwriting.loan,
            approval: underwriting.approval,
            transaction: underwriting.settlement,
        }),
    ))
}

/// GET /loan_health/:position_index - Health of a recorded position
pub async fn get_loan_health(
    State(state): State<AppState>,
    Path(position_index): Path<String>,
) -> Result<(StatusCode, Json<LoanHealthResponse>), (StatusCode, Json<ApiError>)> {
    let index: PositionIndex = position_index
        .parse()
        .map_err(|_| malformed(format!("`{}` is not a position index", position_index)))?;

    match lendroid::loan_health(state.context(), index).await {
        Ok(data) => Ok((StatusCode::CREATED, Json(LoanHealthResponse { data }))),
        Err(e) => {
            let (_, body) = error_to_api(e);
            Err((StatusCode::BAD_REQUEST, body))
        }
    }
}

/// GET /is_valid_protocol_transaction_sender/:prover/:tx_hash
pub async fn check_protocol_transaction_sender(
    State(state): State<AppState>,
    Path((prover, tx_hash)): Path<(String, String)>,
) -> Result<(StatusCode, Json<SenderCheckResponse>), (StatusCode, Json<ApiError>)> {
    let prover = Address::from_str(prover.trim())
        .map_err(|_| malformed(format!("`{}` is not an address", prover)))?;
    let tx_hash = H256::from_str(tx_hash.trim())
        .map_err(|_| malformed(format!("`{}` is not a transaction hash", tx_hash)))?;

    let valid = lendroid::is_valid_protocol_transaction_sender(state.context(), prover, tx_hash)
        .await
        .map_err(|e| {
            let (_, body) = error_to_api(e);
            (StatusCode::BAD_REQUEST, body)
        })?;

    let status = if valid {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    Ok((status, Json(SenderCheckResponse { data: valid })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wrangler_core::{NodeError, ProtocolError, TxError};

    #[test]
    fn test_protocol_errors_keep_their_message() {
        let (status, Json(body)) = error_to_api(
            ProtocolError::RateUnavailable {
                pair: "DAI/WETH".into(),
                reason: "feed offline".into(),
            }
            .into(),
        );
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body.code, "rate_unavailable");
        assert!(body.message.contains("feed offline"));
    }

    #[test]
    fn test_internal_errors_are_opaque() {
        let (status, Json(body)) = error_to_api(
            TxError::SigningFailed {
                message: "key material".into(),
            }
            .into(),
        );
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.code, "internal_error");
        assert!(!body.message.contains("key material"));

        let (status, _) = error_to_api(NodeError::Timeout { secs: 30 }.into());
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
