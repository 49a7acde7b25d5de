//! Loan Terms Calculator
//!
//! Pure functions. Ledger reads (owed value, nonce, block time) and the
//! exchange rate are resolved by the caller and passed in.

use eth_tx::units::{decimal_to_u256, u256_to_decimal};
use ethers::types::{Address, U256};
use rust_decimal::Decimal;
use serde::Serialize;
use wrangler_core::{PositionIndex, ProtocolError, UnixTimestamp};

use crate::state::{LoanObject, LoanRequest, Position};

/// Decimal places kept in a reported health figure
const HEALTH_DECIMALS: u32 = 4;

fn overflow(what: &str) -> ProtocolError {
    ProtocolError::ArithmeticOverflow {
        what: what.to_string(),
    }
}

/// Collateral required for `fill` lend units at `rate` collateral per lend,
/// scaled by `margin_factor`. Truncated to an integer amount.
pub fn collateral_amount(fill: U256, rate: Decimal, margin_factor: Decimal) -> Result<U256, ProtocolError> {
    let fill = u256_to_decimal(fill, 0)?;
    let required = fill
        .checked_mul(rate)
        .and_then(|v| v.checked_mul(margin_factor))
        .ok_or_else(|| overflow("collateral amount"))?;
    decimal_to_u256(required)
}

/// Ledger-derived inputs to term synthesis
#[derive(Debug, Clone, Copy)]
pub struct TermInputs {
    pub rate: Decimal,
    pub margin_factor: Decimal,
    pub owed_value: U256,
    pub ledger_timestamp: UnixTimestamp,
    pub nonce: U256,
    pub wrangler: Address,
}

/// Build the loan terms for `request`. The zero-address side of the offer is
/// taken by the filler.
pub fn compute_loan_terms(request: &LoanRequest, inputs: &TermInputs) -> Result<LoanObject, ProtocolError> {
    let (lender, borrower) = if request.is_creator_lender() {
        (request.lender, request.filler)
    } else {
        (request.filler, request.borrower)
    };

    let expires_at_timestamp = inputs
        .ledger_timestamp
        .checked_add(request.loan_duration)
        .ok_or_else(|| overflow("expiry timestamp"))?;

    Ok(LoanObject {
        lender,
        borrower,
        collateral_token: request.collateral_token,
        loan_token: request.loan_token,
        collateral_amount: collateral_amount(request.fill_loan_amount, inputs.rate, inputs.margin_factor)?,
        loan_amount_filled: request.fill_loan_amount,
        loan_amount_owed: inputs.owed_value,
        expires_at_timestamp,
        relayer: request.relayer,
        wrangler: inputs.wrangler,
        relayer_fee_lst: request.relayer_fee_lst,
        monitoring_fee_lst: request.monitoring_fee_lst,
        rollover_fee_lst: request.rollover_fee_lst,
        closure_fee_lst: request.closure_fee_lst,
        nonce: inputs.nonce,
    })
}

/// Collateral converted into lend units at `rate`
pub fn collateral_value_in_lend(collateral: U256, rate: Decimal) -> Result<Decimal, ProtocolError> {
    if rate <= Decimal::ZERO {
        return Err(ProtocolError::InvalidAmount {
            message: format!("rate must be positive, got {}", rate),
        });
    }
    u256_to_decimal(collateral, 0)?
        .checked_div(rate)
        .ok_or_else(|| overflow("collateral value"))
}

/// Health of a position as a percentage of the required margin.
///
/// `health = collateral value in lend units * 100 / margin_factor / filled`.
/// 100 means exactly at the required margin; below 100 is under-collateralized.
pub fn loan_health(
    index: PositionIndex,
    position: &Position,
    rate: Decimal,
    margin_factor: Decimal,
) -> Result<Decimal, ProtocolError> {
    if position.lend_filled.is_zero() {
        return Err(ProtocolError::NoFilledAmount { index });
    }
    if margin_factor <= Decimal::ZERO {
        return Err(ProtocolError::InvalidAmount {
            message: format!("margin factor must be positive, got {}", margin_factor),
        });
    }

    let value = collateral_value_in_lend(position.collateral_amount, rate)?;
    let filled = u256_to_decimal(position.lend_filled, 0)?;
    let health = value
        .checked_div(filled)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .and_then(|pct| pct.checked_div(margin_factor))
        .ok_or_else(|| overflow("loan health"))?;

    Ok(health.round_dp(HEALTH_DECIMALS))
}

/// Coarse classification of a health figure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// At or above the required margin
    Healthy,
    /// Collateral still covers the loan but not the margin
    Warning,
    /// Collateral is worth less than the loan
    Undercollateralized,
}

pub fn health_status(health: Decimal, margin_factor: Decimal) -> HealthStatus {
    if health >= Decimal::ONE_HUNDRED {
        HealthStatus::Healthy
    } else if margin_factor > Decimal::ZERO && health * margin_factor >= Decimal::ONE_HUNDRED {
        HealthStatus::Warning
    } else {
        HealthStatus::Undercollateralized
    }
}
