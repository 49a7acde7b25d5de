//! Canonical hash and wrangler signature
//!
//! The settlement contract recomputes the hash below from `fill_kernel`
//! arguments and checks both signatures against it, so the packing order and
//! widths are fixed:
//!
//! ```text
//! keccak256(
//!     lender ‖ borrower ‖ relayer ‖ wrangler ‖ collateralToken ‖ loanToken   (20 bytes each)
//!     ‖ collateralAmount ‖ loanAmountOffered ‖ relayerFeeLST ‖ monitoringFeeLST
//!     ‖ rolloverFeeLST ‖ closureFeeLST ‖ loanAmountFilled ‖ owedValue ‖ nonce  (32 bytes each)
//! )
//! ```
//!
//! The wrangler signs the personal-message digest of that hash.

use eth_tx::digest::{personal_digest, PackedEncoder};
use eth_tx::signing::{recover_signer, sign_digest, SignatureParts};
use ethers::abi::Token;
use ethers::signers::LocalWallet;
use ethers::types::{Address, H256, U256};
use wrangler_core::{TxError, UnixTimestamp};

use crate::constants::{APPROVAL_ADDRESS_COUNT, APPROVAL_VALUE_COUNT};
use crate::state::{Approval, LoanObject, LoanRequest};

pub fn approval_addresses(loan: &LoanObject) -> [Address; APPROVAL_ADDRESS_COUNT] {
    [
        loan.lender,
        loan.borrower,
        loan.relayer,
        loan.wrangler,
        loan.collateral_token,
        loan.loan_token,
    ]
}

pub fn approval_values(request: &LoanRequest, loan: &LoanObject) -> [U256; APPROVAL_VALUE_COUNT] {
    [
        loan.collateral_amount,
        request.loan_amount_offered,
        loan.relayer_fee_lst,
        loan.monitoring_fee_lst,
        loan.rollover_fee_lst,
        loan.closure_fee_lst,
        loan.loan_amount_filled,
    ]
}

pub fn canonical_hash(
    addresses: &[Address; APPROVAL_ADDRESS_COUNT],
    values: &[U256; APPROVAL_VALUE_COUNT],
    owed_value: U256,
    nonce: U256,
) -> H256 {
    let encoder = addresses
        .iter()
        .fold(PackedEncoder::new(), |enc, address| enc.address(*address));
    values
        .iter()
        .fold(encoder, |enc, value| enc.uint256(*value))
        .uint256(owed_value)
        .uint256(nonce)
        .keccak()
}

/// Assemble the unsigned approval for `loan`
pub fn build_approval(request: &LoanRequest, loan: &LoanObject, approval_expiry: UnixTimestamp) -> Approval {
    Approval {
        addresses: approval_addresses(loan),
        values: approval_values(request, loan),
        nonce: loan.nonce,
        kernel_daily_interest_rate: request.interest_rate_per_day,
        is_creator_lender: request.is_creator_lender(),
        timestamps: [request.offer_expiry, approval_expiry],
        position_duration_in_seconds: request.loan_duration,
        kernel_creator_salt: request.creator_salt,
        creator_signature: request.creator_signature,
        wrangler_signature: None,
    }
}

impl Approval {
    /// Hash the contract verifies both signatures against
    pub fn canonical_hash(&self, owed_value: U256) -> H256 {
        canonical_hash(&self.addresses, &self.values, owed_value, self.nonce)
    }

    /// `fill_kernel` arguments, in order. The approval must carry the wrangler signature.
    pub fn to_tokens(&self) -> Result<Vec<Token>, TxError> {
        let wrangler_signature = self.wrangler_signature.ok_or_else(|| TxError::BuildFailed {
            message: "approval has no wrangler signature".to_string(),
        })?;

        Ok(vec![
            Token::FixedArray(self.addresses.iter().copied().map(Token::Address).collect()),
            Token::FixedArray(self.values.iter().copied().map(Token::Uint).collect()),
            Token::Uint(self.nonce),
            Token::Uint(self.kernel_daily_interest_rate),
            Token::Bool(self.is_creator_lender),
            Token::FixedArray(
                self.timestamps
                    .iter()
                    .map(|t| Token::Uint(U256::from(*t)))
                    .collect(),
            ),
            Token::Uint(U256::from(self.position_duration_in_seconds)),
            Token::FixedBytes(self.kernel_creator_salt.as_bytes().to_vec()),
            Token::FixedArray(vec![
                self.creator_signature.to_token(),
                wrangler_signature.to_token(),
            ]),
        ])
    }
}

/// Sign the approval's digest with the wrangler key
pub fn sign_approval(approval: &mut Approval, owed_value: U256, wallet: &LocalWallet) -> Result<(), TxError> {
    let digest = personal_digest(approval.canonical_hash(owed_value));
    approval.wrangler_signature = Some(sign_digest(wallet, digest)?);
    Ok(())
}

/// Address that produced `signature` over the approval's digest
pub fn approval_signer(
    approval: &Approval,
    owed_value: U256,
    signature: &SignatureParts,
) -> Result<Address, TxError> {
    recover_signer(signature, personal_digest(approval.canonical_hash(owed_value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use ethers::signers::Signer;

    fn loan() -> LoanObject {
        testing::loan_object()
    }

    #[test]
    fn test_packed_layout_length() {
        let loan = loan();
        let request = testing::loan_request();
        let addresses = approval_addresses(&loan);
        let values = approval_values(&request, &loan);
        let encoded = addresses
            .iter()
            .fold(PackedEncoder::new(), |enc, a| enc.address(*a));
        let encoded = values.iter().fold(encoded, |enc, v| enc.uint256(*v));
        let encoded = encoded.uint256(loan.loan_amount_owed).uint256(loan.nonce);
        assert_eq!(encoded.len(), 6 * 20 + 9 * 32);
        assert_eq!(
            encoded.keccak(),
            canonical_hash(&addresses, &values, loan.loan_amount_owed, loan.nonce)
        );
    }

    #[test]
    fn test_hash_changes_with_any_field() {
        let loan = loan();
        let request = testing::loan_request();
        let addresses = approval_addresses(&loan);
        let values = approval_values(&request, &loan);
        let base = canonical_hash(&addresses, &values, loan.loan_amount_owed, loan.nonce);

        let mut other_values = values;
        other_values[6] += U256::one();
        assert_ne!(base, canonical_hash(&addresses, &other_values, loan.loan_amount_owed, loan.nonce));
        assert_ne!(
            base,
            canonical_hash(&addresses, &values, loan.loan_amount_owed, loan.nonce + 1)
        );

        let mut swapped = addresses;
        swapped.swap(0, 1);
        assert_ne!(base, canonical_hash(&swapped, &values, loan.loan_amount_owed, loan.nonce));
    }

    #[test]
    fn test_signature_recovers_wrangler() {
        let wallet = testing::wrangler_wallet();
        let loan = loan();
        let mut approval = build_approval(&testing::loan_request(), &loan, 1_700_000_120);
        assert!(!approval.is_signed());

        sign_approval(&mut approval, loan.loan_amount_owed, &wallet).unwrap();
        let signature = approval.wrangler_signature.unwrap();
        assert_eq!(
            approval_signer(&approval, loan.loan_amount_owed, &signature).unwrap(),
            wallet.address()
        );
    }

    #[test]
    fn test_approval_fields() {
        let request = testing::loan_request();
        let loan = loan();
        let approval = build_approval(&request, &loan, 1_700_000_120);
        assert_eq!(approval.addresses[0], loan.lender);
        assert_eq!(approval.addresses[3], testing::wrangler_address());
        assert_eq!(approval.values[0], loan.collateral_amount);
        assert_eq!(approval.values[1], request.loan_amount_offered);
        assert_eq!(approval.values[6], loan.loan_amount_filled);
        assert_eq!(approval.offer_expiry(), request.offer_expiry);
        assert_eq!(approval.approval_expiry(), 1_700_000_120);
        assert_eq!(approval.kernel_creator_salt, request.creator_salt);
    }

    #[test]
    fn test_tokens_require_wrangler_signature() {
        let loan = loan();
        let mut approval = build_approval(&testing::loan_request(), &loan, 1_700_000_120);
        assert!(approval.to_tokens().is_err());

        sign_approval(&mut approval, loan.loan_amount_owed, &testing::wrangler_wallet()).unwrap();
        let tokens = approval.to_tokens().unwrap();
        assert_eq!(tokens.len(), 9);
    }
}
