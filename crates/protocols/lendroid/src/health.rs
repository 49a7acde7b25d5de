//! Loan health for a recorded position

use eth_tx::units::checksum;
use ethers::types::H256;
use rust_decimal::Decimal;
use serde::Serialize;
use wrangler_core::{Error, NodeError, PositionIndex, ProtocolError};

use crate::calculator::{self, HealthStatus};
use crate::context::WranglerContext;
use crate::fetch::{self, ScanScope};
use crate::rates::AssetPair;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanHealth {
    pub position_index: PositionIndex,
    pub position_hash: H256,
    /// Percentage of the required margin; 100 is exactly at margin
    pub health: Decimal,
    pub status: HealthStatus,
    pub rate: Decimal,
}

fn state_unavailable(e: NodeError) -> Error {
    ProtocolError::StateUnavailable {
        reason: e.to_string(),
    }
    .into()
}

/// Health of the position at `index` in the contract's global book, at the current rate
pub async fn loan_health(ctx: &WranglerContext, index: PositionIndex) -> Result<LoanHealth, Error> {
    let ledger = ctx.ledger.as_ref();
    let protocol = ctx.settings.protocol;

    let hash = fetch::position_hash(ledger, protocol, ScanScope::All, index)
        .await
        .map_err(state_unavailable)?;
    if hash.is_zero() {
        return Err(ProtocolError::PositionNotFound { index }.into());
    }

    let position = fetch::position(ledger, protocol, hash)
        .await
        .map_err(state_unavailable)?;
    if position.lend_filled.is_zero() {
        return Err(ProtocolError::NoFilledAmount { index }.into());
    }

    let pair = AssetPair::new(position.lend_token, position.collateral_token);
    let rate = ctx.oracle.rate(&pair).await?;
    let margin = ctx.settings.margin_factor;
    let health = calculator::loan_health(index, &position, rate, margin)?;

    tracing::debug!(
        index,
        lend = %checksum(&position.lend_token),
        collateral = %checksum(&position.collateral_token),
        health = %health,
        "Computed loan health"
    );

    Ok(LoanHealth {
        position_index: index,
        position_hash: hash,
        health,
        status: calculator::health_status(health, margin),
        rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Position;
    use crate::testing::{self, Scenario};
    use ethers::types::U256;
    use rust_decimal_macros::dec;

    fn position(filled: U256) -> Position {
        Position {
            hash: H256::repeat_byte(0x31),
            lend_token: testing::dai(),
            collateral_token: testing::weth(),
            lend_filled: filled,
            collateral_amount: U256::from(1_500_000_000_000_000u64),
            expires_at: testing::NOW + 86_400,
            status: 1,
        }
    }

    #[tokio::test]
    async fn test_health_of_recorded_position() {
        let scenario = Scenario::funded();
        scenario.add_position(4, &position(U256::exp10(18)));

        let health = loan_health(&scenario.ctx, 4).await.unwrap();
        assert_eq!(health.health, dec!(100));
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.position_hash, H256::repeat_byte(0x31));
    }

    #[tokio::test]
    async fn test_zero_fill_is_an_error() {
        let scenario = Scenario::funded();
        scenario.add_position(2, &position(U256::zero()));
        let err = loan_health(&scenario.ctx, 2).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::NoFilledAmount { index: 2 })));
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_empty_slot_is_not_found() {
        let scenario = Scenario::funded();
        let err = loan_health(&scenario.ctx, 0).await.unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::PositionNotFound { index: 0 })));
    }

    #[tokio::test]
    async fn test_missing_rate_is_fatal() {
        let scenario = Scenario::funded();
        scenario.add_position(1, &position(U256::exp10(18)));
        scenario.oracle.remove_rate(&AssetPair::new(testing::dai(), testing::weth()));
        let err = loan_health(&scenario.ctx, 1).await.unwrap_err();
        assert_eq!(err.error_code(), "rate_unavailable");
    }
}
