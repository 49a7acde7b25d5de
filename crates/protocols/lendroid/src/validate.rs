//! Validation Pipeline
//!
//! Independent checks that each contribute at most one [`ValidationError`].
//! Pre-checks only need the request; post-checks need the synthesized terms.
//! Checks within a phase run concurrently and every failure is reported.
//! A ledger read that fails inside a check is reported under that check's label.

use eth_node_client::Ledger;
use eth_tx::units::checksum;
use ethers::types::{Address, U256};
use wrangler_core::{NodeError, UnixTimestamp};

use crate::constants::labels;
use crate::context::{Settings, WranglerContext};
use crate::fetch;
use crate::state::{LoanObject, LoanRequest, ValidationError};

fn read_failed(label: &str, what: &str, error: &NodeError) -> ValidationError {
    tracing::warn!(label = %label, error = %error, "Ledger read failed during validation");
    ValidationError::new(label, format!("could not read {}: {}", what, error))
}

// =============================================================================
// Pre-checks
// =============================================================================

pub fn check_wrangler_identity(settings: &Settings, request: &LoanRequest) -> Option<ValidationError> {
    if settings.is_own_identity(&request.wrangler) {
        None
    } else {
        Some(ValidationError::new(
            labels::INVALID_WRANGLER,
            format!("{} is not handled by this wrangler", request.wrangler),
        ))
    }
}

pub async fn check_wrangler_registered(ledger: &dyn Ledger, settings: &Settings) -> Option<ValidationError> {
    let label = labels::WRANGLER_NOT_REGISTERED;
    match fetch::is_wrangler_registered(ledger, settings.protocol, settings.wrangler).await {
        Ok(true) => None,
        Ok(false) => Some(ValidationError::new(
            label,
            format!("{} is not a registered wrangler", checksum(&settings.wrangler)),
        )),
        Err(e) => Some(read_failed(label, "wrangler registry", &e)),
    }
}

pub async fn check_token_supported(
    ledger: &dyn Ledger,
    settings: &Settings,
    token: Address,
    label: &str,
) -> Option<ValidationError> {
    match fetch::is_token_supported(ledger, settings.protocol, token).await {
        Ok(true) => None,
        Ok(false) => Some(ValidationError::new(
            label,
            format!("{} is not supported by the protocol", checksum(&token)),
        )),
        Err(e) => Some(read_failed(label, "token registry", &e)),
    }
}

pub fn check_offer_expiry(request: &LoanRequest, now: UnixTimestamp) -> Option<ValidationError> {
    if request.offer_expiry > now {
        None
    } else {
        Some(ValidationError::new(
            labels::ORDER_EXPIRED,
            format!("offer expired at {}, ledger time is {}", request.offer_expiry, now),
        ))
    }
}

pub async fn pre_validate(ctx: &WranglerContext, request: &LoanRequest, now: UnixTimestamp) -> Vec<ValidationError> {
    let ledger = ctx.ledger.as_ref();
    let settings = ctx.settings.as_ref();

    let (registered, loan_token, collateral_token) = tokio::join!(
        check_wrangler_registered(ledger, settings),
        check_token_supported(ledger, settings, request.loan_token, labels::UNSUPPORTED_LOAN_TOKEN),
        check_token_supported(
            ledger,
            settings,
            request.collateral_token,
            labels::UNSUPPORTED_COLLATERAL_TOKEN
        ),
    );

    [
        check_wrangler_identity(settings, request),
        registered,
        loan_token,
        collateral_token,
        check_offer_expiry(request, now),
    ]
    .into_iter()
    .flatten()
    .collect()
}

// =============================================================================
// Post-checks
// =============================================================================

pub async fn check_balance(
    ledger: &dyn Ledger,
    token: Address,
    owner: Address,
    required: U256,
    label: &str,
) -> Option<ValidationError> {
    if required.is_zero() {
        return None;
    }
    match fetch::token_balance(ledger, token, owner).await {
        Ok(balance) if balance >= required => None,
        Ok(balance) => Some(ValidationError::new(
            label,
            format!(
                "{} holds {} of {}, needs {}",
                checksum(&owner),
                balance,
                checksum(&token),
                required
            ),
        )),
        Err(e) => Some(read_failed(label, "token balance", &e)),
    }
}

pub async fn check_allowance(
    ledger: &dyn Ledger,
    token: Address,
    owner: Address,
    spender: Address,
    required: U256,
    label: &str,
) -> Option<ValidationError> {
    if required.is_zero() {
        return None;
    }
    match fetch::token_allowance(ledger, token, owner, spender).await {
        Ok(allowance) if allowance >= required => None,
        Ok(allowance) => Some(ValidationError::new(
            label,
            format!(
                "{} allows the protocol {} of {}, needs {}",
                checksum(&owner),
                allowance,
                checksum(&token),
                required
            ),
        )),
        Err(e) => Some(read_failed(label, "token allowance", &e)),
    }
}

pub async fn post_validate(ctx: &WranglerContext, loan: &LoanObject) -> Vec<ValidationError> {
    let ledger = ctx.ledger.as_ref();
    let protocol = ctx.settings.protocol;
    let fee_token = ctx.settings.protocol_token;

    let results = tokio::join!(
        check_balance(
            ledger,
            loan.loan_token,
            loan.lender,
            loan.loan_amount_filled,
            labels::LEND_CURRENCY_BALANCE
        ),
        check_allowance(
            ledger,
            loan.loan_token,
            loan.lender,
            protocol,
            loan.loan_amount_filled,
            labels::LEND_CURRENCY_ALLOWANCE
        ),
        check_balance(
            ledger,
            loan.collateral_token,
            loan.borrower,
            loan.collateral_amount,
            labels::BORROW_CURRENCY_BALANCE
        ),
        check_allowance(
            ledger,
            loan.collateral_token,
            loan.borrower,
            protocol,
            loan.collateral_amount,
            labels::BORROW_CURRENCY_ALLOWANCE
        ),
        check_balance(
            ledger,
            fee_token,
            loan.lender,
            loan.monitoring_fee_lst,
            labels::PROTOCOL_CURRENCY_BALANCE
        ),
        check_allowance(
            ledger,
            fee_token,
            loan.lender,
            protocol,
            loan.monitoring_fee_lst,
            labels::PROTOCOL_CURRENCY_ALLOWANCE
        ),
    );

    [results.0, results.1, results.2, results.3, results.4, results.5]
        .into_iter()
        .flatten()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, Scenario};

    fn labels_of(errors: &[ValidationError]) -> Vec<&str> {
        errors.iter().map(|e| e.label.as_str()).collect()
    }

    #[tokio::test]
    async fn test_funded_request_passes_both_phases() {
        let scenario = Scenario::funded();
        let request = testing::loan_request();
        assert!(pre_validate(&scenario.ctx, &request, testing::NOW).await.is_empty());
        assert!(post_validate(&scenario.ctx, &testing::loan_object()).await.is_empty());
    }

    #[tokio::test]
    async fn test_foreign_wrangler_is_invalid() {
        let scenario = Scenario::funded();
        let mut request = testing::loan_request();
        request.wrangler = "SomeoneElse".to_string();
        let errors = pre_validate(&scenario.ctx, &request, testing::NOW).await;
        assert_eq!(labels_of(&errors), vec![labels::INVALID_WRANGLER]);
    }

    #[tokio::test]
    async fn test_expired_offer() {
        let scenario = Scenario::funded();
        let mut request = testing::loan_request();
        request.offer_expiry = testing::NOW;
        let errors = pre_validate(&scenario.ctx, &request, testing::NOW).await;
        assert_eq!(labels_of(&errors), vec![labels::ORDER_EXPIRED]);
    }

    #[tokio::test]
    async fn test_every_failure_is_reported() {
        let scenario = Scenario::funded();
        scenario.set_token_supported(testing::dai(), false);
        scenario.set_token_supported(testing::weth(), false);
        let mut request = testing::loan_request();
        request.offer_expiry = 0;
        let errors = pre_validate(&scenario.ctx, &request, testing::NOW).await;
        assert_eq!(
            labels_of(&errors),
            vec![
                labels::UNSUPPORTED_LOAN_TOKEN,
                labels::UNSUPPORTED_COLLATERAL_TOKEN,
                labels::ORDER_EXPIRED
            ]
        );
    }

    #[tokio::test]
    async fn test_unreadable_registry_reports_its_label() {
        let scenario = Scenario::empty();
        let request = testing::loan_request();
        let errors = pre_validate(&scenario.ctx, &request, testing::NOW).await;
        let labels = labels_of(&errors);
        assert!(labels.contains(&labels::WRANGLER_NOT_REGISTERED));
        assert!(errors[0].message.starts_with("could not read"));
    }

    #[tokio::test]
    async fn test_short_balances_and_allowances() {
        let scenario = Scenario::funded();
        let loan = testing::loan_object();
        scenario.set_balance(loan.loan_token, loan.lender, U256::one());
        scenario.set_allowance(loan.collateral_token, loan.borrower, U256::zero());
        scenario.set_balance(testing::lst(), loan.lender, U256::zero());

        let errors = post_validate(&scenario.ctx, &loan).await;
        assert_eq!(
            labels_of(&errors),
            vec![
                labels::LEND_CURRENCY_BALANCE,
                labels::BORROW_CURRENCY_ALLOWANCE,
                labels::PROTOCOL_CURRENCY_BALANCE
            ]
        );
    }

    #[tokio::test]
    async fn test_zero_fee_skips_fee_checks() {
        let scenario = Scenario::funded();
        let mut loan = testing::loan_object();
        loan.monitoring_fee_lst = U256::zero();
        scenario.set_balance(testing::lst(), loan.lender, U256::zero());
        assert!(post_validate(&scenario.ctx, &loan).await.is_empty());
    }
}
