//! Fill underwriting
//!
//! Runs a fill request through pre-checks, term synthesis, post-checks,
//! approval signing and settlement building. Validation failures are data:
//! they come back in [`Underwriting::errors`] alongside whatever was built.
//! Only infrastructure failures (rates, ledger, signing) are `Err`.

use eth_tx::signing::SignedTransaction;
use eth_tx::units::checksum;
use ethers::types::H256;
use serde::Serialize;
use wrangler_core::{Error, NodeError, ProtocolError};

use crate::approval::{build_approval, sign_approval};
use crate::calculator::{compute_loan_terms, TermInputs};
use crate::constants::labels;
use crate::context::WranglerContext;
use crate::fetch;
use crate::rates::AssetPair;
use crate::state::{Approval, LoanObject, LoanRequest, ValidationError};
use crate::tx_builder::{self, BuildError};
use crate::validate;

/// Signed settlement transaction, and its hash if it was broadcast
#[derive(Debug, Clone, Serialize)]
pub struct Settlement {
    #[serde(flatten)]
    pub transaction: SignedTransaction,
    pub submitted_tx_hash: Option<H256>,
}

/// Result of underwriting one fill request
#[derive(Debug, Clone)]
pub struct Underwriting {
    pub loan: LoanObject,
    /// Carries the wrangler signature only when `errors` is empty
    pub approval: Approval,
    pub settlement: Option<Settlement>,
    pub errors: Vec<ValidationError>,
}

impl Underwriting {
    pub fn is_approved(&self) -> bool {
        self.errors.is_empty()
    }
}

fn state_unavailable(what: &str, e: NodeError) -> Error {
    ProtocolError::StateUnavailable {
        reason: format!("{}: {}", what, e),
    }
    .into()
}

/// Underwrite a fill of `request` on behalf of this wrangler
pub async fn approve_loan(ctx: &WranglerContext, request: LoanRequest) -> Result<Underwriting, Error> {
    let settings = ctx.settings.as_ref();
    let ledger = ctx.ledger.as_ref();

    let now = ledger
        .block_timestamp()
        .await
        .map_err(|e| state_unavailable("block timestamp", e))?;

    let mut errors = validate::pre_validate(ctx, &request, now).await;

    // Terms are synthesized even when pre-checks failed, so the caller sees them.
    let pair = AssetPair::new(request.loan_token, request.collateral_token);
    let rate = ctx.oracle.rate(&pair).await?;

    let owed_value = fetch::owed_value(
        ledger,
        settings.protocol,
        request.fill_loan_amount,
        request.interest_rate_per_day,
        request.loan_duration,
    )
    .await
    .map_err(|e| state_unavailable("owed value", e))?;

    // Held until the approval is signed; a rejected request hands the nonce back.
    let creator = request.offer_creator();
    let reservation = ctx
        .nonces
        .reserve(settings.wrangler, creator, || {
            fetch::consumed_nonce(ledger, settings.protocol, settings.wrangler, creator)
        })
        .await
        .map_err(|e| state_unavailable("wrangler nonce", e))?;
    let nonce = reservation.nonce();

    let loan = compute_loan_terms(
        &request,
        &TermInputs {
            rate,
            margin_factor: settings.margin_factor,
            owed_value,
            ledger_timestamp: now,
            nonce,
            wrangler: settings.wrangler,
        },
    )?;

    errors.extend(validate::post_validate(ctx, &loan).await);

    let approval_expiry = now.saturating_add(settings.approval_ttl_secs);
    let mut approval = build_approval(&request, &loan, approval_expiry);

    let mut settlement = None;
    if errors.is_empty() {
        sign_approval(&mut approval, loan.loan_amount_owed, ctx.signer())?;

        match tx_builder::build_settlement(ctx, &approval).await {
            Ok(transaction) => {
                let submitted_tx_hash = if settings.submit_settlement {
                    Some(tx_builder::submit(ctx, &transaction).await?)
                } else {
                    None
                };
                settlement = Some(Settlement {
                    transaction,
                    submitted_tx_hash,
                });
            }
            Err(BuildError::Simulation(reason)) => {
                tracing::warn!(reason = %reason, "Settlement simulation reverted");
                approval.wrangler_signature = None;
                errors.push(ValidationError::new(
                    labels::INVALID_PARAMETERS,
                    format!("settlement simulation failed: {}", reason),
                ));
            }
            Err(BuildError::Fatal(e)) => return Err(e),
        }
    }

    if errors.is_empty() {
        reservation.commit();
        tracing::info!(
            creator = %checksum(&creator),
            nonce = %loan.nonce,
            collateral = %loan.collateral_amount,
            submitted = settlement.as_ref().map_or(false, |s| s.submitted_tx_hash.is_some()),
            "Approved fill"
        );
    } else {
        let labels: Vec<&str> = errors.iter().map(|e| e.label.as_str()).collect();
        tracing::warn!(
            creator = %checksum(&creator),
            labels = ?labels,
            "Rejected fill"
        );
    }

    Ok(Underwriting {
        loan,
        approval,
        settlement,
        errors,
    })
}

/// Whether `tx_hash` was sent by `prover` to the settlement contract
pub async fn is_valid_protocol_transaction_sender(
    ctx: &WranglerContext,
    prover: ethers::types::Address,
    tx_hash: H256,
) -> Result<bool, Error> {
    fetch::is_protocol_transaction_sender(ctx.ledger.as_ref(), ctx.settings.protocol, prover, tx_hash)
        .await
        .map_err(|e| state_unavailable("transaction lookup", e))
}
