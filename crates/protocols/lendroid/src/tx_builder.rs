//! Lendroid Transaction Builder
//!
//! Turns a signed approval (or a liquidation target) into a signed, replay
//! protected transaction from the wrangler account:
//!
//! 1. encode the contract call
//! 2. simulate it for a gas estimate
//! 3. resolve the chain id (unset aborts)
//! 4. read the account nonce and gas price
//! 5. sign

use eth_tx::call::ContractCall;
use eth_tx::signing::{sign_transaction, SignedTransaction};
use ethers::types::{TransactionRequest, H256};
use thiserror::Error;
use wrangler_core::{Error, TxError};

use crate::constants::protocol;
use crate::context::WranglerContext;
use crate::state::Approval;

/// Why a transaction could not be produced
#[derive(Debug, Error)]
pub enum BuildError {
    /// The call reverted in simulation. For a fill this means the approval's
    /// parameters are not acceptable to the contract.
    #[error("simulation failed: {0}")]
    Simulation(String),

    #[error(transparent)]
    Fatal(#[from] Error),
}

impl From<TxError> for BuildError {
    fn from(e: TxError) -> Self {
        Self::Fatal(e.into())
    }
}

impl From<BuildError> for Error {
    fn from(e: BuildError) -> Self {
        match e {
            BuildError::Simulation(message) => TxError::BuildFailed { message }.into(),
            BuildError::Fatal(e) => e,
        }
    }
}

pub fn fill_call(ctx: &WranglerContext, approval: &Approval) -> Result<ContractCall, TxError> {
    Ok(ContractCall::new(
        ctx.settings.protocol,
        protocol::FILL_KERNEL,
        approval.to_tokens()?,
    ))
}

pub fn liquidation_call(ctx: &WranglerContext, position_hash: H256) -> ContractCall {
    ContractCall::new(
        ctx.settings.protocol,
        protocol::LIQUIDATE_POSITION,
        vec![ethers::abi::Token::FixedBytes(position_hash.as_bytes().to_vec())],
    )
}

/// Simulate, price and sign `call` from the wrangler account
pub async fn build_signed_call(ctx: &WranglerContext, call: &ContractCall) -> Result<SignedTransaction, BuildError> {
    let wrangler = ctx.settings.wrangler;
    let data = call.calldata();

    let gas = ctx
        .ledger
        .estimate_gas(wrangler, call.to, data.clone())
        .await
        .map_err(|e| BuildError::Simulation(e.to_string()))?;

    let chain_id = ctx.settings.chain_id.ok_or(TxError::ChainIdUnset)?;

    let (nonce, gas_price) = tokio::try_join!(
        ctx.ledger.transaction_count(wrangler),
        ctx.ledger.gas_price()
    )
    .map_err(Error::from)?;

    let request = TransactionRequest::new()
        .to(call.to)
        .data(data)
        .gas(gas)
        .gas_price(gas_price)
        .nonce(nonce);

    let signed = sign_transaction(ctx.signer(), chain_id, request)?;

    tracing::debug!(
        function = call.signature,
        tx_hash = ?signed.tx_hash,
        nonce = %signed.nonce,
        gas = %signed.gas,
        chain_id = signed.chain_id,
        "Signed transaction"
    );
    Ok(signed)
}

/// Signed `fill_kernel` transaction for a wrangler-signed approval
pub async fn build_settlement(ctx: &WranglerContext, approval: &Approval) -> Result<SignedTransaction, BuildError> {
    let call = fill_call(ctx, approval)?;
    build_signed_call(ctx, &call).await
}

/// Broadcast a signed transaction
pub async fn submit(ctx: &WranglerContext, signed: &SignedTransaction) -> Result<H256, Error> {
    let tx_hash = ctx
        .ledger
        .send_raw_transaction(signed.raw.clone())
        .await
        .map_err(|e| TxError::SubmissionFailed {
            message: e.to_string(),
        })?;
    tracing::info!(tx_hash = ?tx_hash, nonce = %signed.nonce, "Submitted transaction");
    Ok(tx_hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::{build_approval, sign_approval};
    use crate::testing::{self, Scenario};
    use ethers::types::U256;
    use ethers::utils::id;

    fn signed_approval() -> Approval {
        let loan = testing::loan_object();
        let mut approval = build_approval(&testing::loan_request(), &loan, testing::NOW + 120);
        sign_approval(&mut approval, loan.loan_amount_owed, &testing::wrangler_wallet()).unwrap();
        approval
    }

    #[tokio::test]
    async fn test_settlement_is_signed_for_the_protocol() {
        let scenario = Scenario::funded();
        scenario.ledger.set_transaction_count(testing::wrangler_address(), U256::from(9u64));

        let signed = build_settlement(&scenario.ctx, &signed_approval()).await.unwrap();
        assert_eq!(signed.to, testing::protocol());
        assert_eq!(signed.from, testing::wrangler_address());
        assert_eq!(signed.nonce, U256::from(9u64));
        assert_eq!(signed.chain_id, 42);
        assert_eq!(signed.gas, U256::from(250_000u64));
    }

    #[tokio::test]
    async fn test_fill_calldata_selector() {
        let scenario = Scenario::funded();
        let call = fill_call(&scenario.ctx, &signed_approval()).unwrap();
        assert_eq!(&call.calldata()[..4], &id(protocol::FILL_KERNEL)[..]);
    }

    #[tokio::test]
    async fn test_unsigned_approval_cannot_settle() {
        let scenario = Scenario::funded();
        let loan = testing::loan_object();
        let approval = build_approval(&testing::loan_request(), &loan, testing::NOW + 120);
        assert!(matches!(
            build_settlement(&scenario.ctx, &approval).await,
            Err(BuildError::Fatal(Error::Transaction(TxError::BuildFailed { .. })))
        ));
    }

    #[tokio::test]
    async fn test_revert_in_simulation() {
        let scenario = Scenario::funded();
        scenario.ledger.fail_gas_estimate("bad approval");
        match build_settlement(&scenario.ctx, &signed_approval()).await {
            Err(BuildError::Simulation(message)) => assert!(message.contains("bad approval")),
            other => panic!("expected simulation failure, got {:?}", other.map(|s| s.tx_hash)),
        }
    }

    #[tokio::test]
    async fn test_unset_chain_id_refuses_to_sign() {
        let scenario = Scenario::with_settings(|settings| settings.chain_id = None);
        assert!(matches!(
            build_settlement(&scenario.ctx, &signed_approval()).await,
            Err(BuildError::Fatal(Error::Transaction(TxError::ChainIdUnset)))
        ));
    }

    #[tokio::test]
    async fn test_submit_records_raw_transaction() {
        let scenario = Scenario::funded();
        let signed = build_settlement(&scenario.ctx, &signed_approval()).await.unwrap();
        submit(&scenario.ctx, &signed).await.unwrap();
        assert_eq!(scenario.ledger.submitted(), vec![signed.raw]);
    }
}
