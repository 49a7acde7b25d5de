//! Lendroid State Types
//!
//! Fill requests, synthesized loan terms, wrangler approvals and positions.

use std::str::FromStr;

use eth_tx::signing::{parse_signature, SignatureParts};
use eth_tx::units::{checksum, checksummed, checksummed_seq, parse_u256_str, parse_u256_value, u256_dec, u256_dec_seq};
use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use wrangler_core::constants::POSITION_STATUS_OPEN;
use wrangler_core::{ProtocolError, UnixTimestamp};

use crate::constants::{APPROVAL_ADDRESS_COUNT, APPROVAL_VALUE_COUNT};

/// Fill request exactly as it arrives on the wire. Every field is optional here
/// so that missing fields are reported by name instead of by serde position.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLoanRequest {
    pub lender: Option<String>,
    pub borrower: Option<String>,
    pub relayer: Option<String>,
    pub wrangler: Option<String>,
    pub filler: Option<String>,
    pub loan_token: Option<String>,
    pub collateral_token: Option<String>,

    pub loan_amount_offered: Option<Value>,
    pub fill_loan_amount: Option<Value>,
    pub interest_rate_per_day: Option<Value>,
    pub loan_duration: Option<Value>,
    #[serde(rename = "relayerFeeLST")]
    pub relayer_fee_lst: Option<Value>,
    #[serde(rename = "monitoringFeeLST")]
    pub monitoring_fee_lst: Option<Value>,
    #[serde(rename = "rolloverFeeLST")]
    pub rollover_fee_lst: Option<Value>,
    #[serde(rename = "closureFeeLST")]
    pub closure_fee_lst: Option<Value>,
    pub offer_expiry: Option<Value>,
    pub creator_salt: Option<Value>,

    /// 65-byte `r ‖ s ‖ v` hex signature of the offer creator
    pub ec_signature_creator: Option<String>,
    pub v_creator: Option<Value>,
    pub r_creator: Option<String>,
    pub s_creator: Option<String>,
}

/// A parsed fill request. Exactly one of `lender`/`borrower` is the zero
/// address; that side is taken by the filler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanRequest {
    pub lender: Address,
    pub borrower: Address,
    pub relayer: Address,
    /// Wrangler identity as named by the request (address or registered name)
    pub wrangler: String,
    pub filler: Address,
    pub loan_token: Address,
    pub collateral_token: Address,

    pub loan_amount_offered: U256,
    pub fill_loan_amount: U256,
    /// Daily interest rate in 18-decimal fixed point
    pub interest_rate_per_day: U256,
    /// Seconds
    pub loan_duration: u64,
    pub relayer_fee_lst: U256,
    pub monitoring_fee_lst: U256,
    pub rollover_fee_lst: U256,
    pub closure_fee_lst: U256,
    pub offer_expiry: UnixTimestamp,
    pub creator_salt: H256,
    pub creator_signature: SignatureParts,
}

impl LoanRequest {
    /// True when the offer was posted by a lender and the filler borrows
    pub fn is_creator_lender(&self) -> bool {
        !self.lender.is_zero()
    }

    pub fn offer_creator(&self) -> Address {
        if self.is_creator_lender() {
            self.lender
        } else {
            self.borrower
        }
    }
}

fn malformed(field: &str, reason: impl Into<String>) -> ProtocolError {
    ProtocolError::MalformedRequest {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn required<'a, T>(value: &'a Option<T>, field: &str) -> Result<&'a T, ProtocolError> {
    value.as_ref().ok_or_else(|| malformed(field, "is required"))
}

fn address_field(value: &Option<String>, field: &str) -> Result<Address, ProtocolError> {
    let raw = required(value, field)?;
    Address::from_str(raw.trim()).map_err(|_| malformed(field, "is not a valid address"))
}

fn uint_field(value: &Option<Value>, field: &str) -> Result<U256, ProtocolError> {
    parse_u256_value(required(value, field)?).map_err(|reason| malformed(field, reason))
}

fn u64_field(value: &Option<Value>, field: &str) -> Result<u64, ProtocolError> {
    let parsed = uint_field(value, field)?;
    if parsed > U256::from(u64::MAX) {
        return Err(malformed(field, "is out of range"));
    }
    Ok(parsed.as_u64())
}

/// Salt arrives either as a 32-byte hex word or as an integer
fn salt_field(value: &Option<Value>) -> Result<H256, ProtocolError> {
    const FIELD: &str = "creatorSalt";
    match required(value, FIELD)? {
        Value::String(s) if s.len() == 66 && s.starts_with("0x") => {
            H256::from_str(s).map_err(|_| malformed(FIELD, "is not a valid bytes32"))
        }
        other => {
            let salt = parse_u256_value(other).map_err(|reason| malformed(FIELD, reason))?;
            let mut word = [0u8; 32];
            salt.to_big_endian(&mut word);
            Ok(H256::from(word))
        }
    }
}

fn word_field(value: &Option<String>, field: &str) -> Result<H256, ProtocolError> {
    let word = parse_u256_str(required(value, field)?).map_err(|reason| malformed(field, reason))?;
    let mut bytes = [0u8; 32];
    word.to_big_endian(&mut bytes);
    Ok(H256::from(bytes))
}

fn creator_signature(raw: &RawLoanRequest) -> Result<SignatureParts, ProtocolError> {
    if let Some(sig) = &raw.ec_signature_creator {
        return parse_signature(sig).map_err(|e| malformed("ecSignatureCreator", e.to_string()));
    }
    if raw.v_creator.is_none() && raw.r_creator.is_none() && raw.s_creator.is_none() {
        return Err(malformed("ecSignatureCreator", "is required"));
    }
    Ok(SignatureParts {
        v: u64_field(&raw.v_creator, "vCreator")?,
        r: word_field(&raw.r_creator, "rCreator")?,
        s: word_field(&raw.s_creator, "sCreator")?,
    })
}

/// Addresses are kept in checksummed form; names pass through trimmed
fn normalize_wrangler(raw: &str) -> String {
    let raw = raw.trim();
    match Address::from_str(raw) {
        Ok(address) => checksum(&address),
        Err(_) => raw.to_string(),
    }
}

impl TryFrom<RawLoanRequest> for LoanRequest {
    type Error = ProtocolError;

    fn try_from(raw: RawLoanRequest) -> Result<Self, Self::Error> {
        let lender = address_field(&raw.lender, "lender")?;
        let borrower = address_field(&raw.borrower, "borrower")?;
        if lender.is_zero() == borrower.is_zero() {
            return Err(malformed(
                "lender",
                "exactly one of lender and borrower must be the zero address",
            ));
        }

        let wrangler = required(&raw.wrangler, "wrangler")?;
        if wrangler.trim().is_empty() {
            return Err(malformed("wrangler", "is empty"));
        }

        Ok(Self {
            lender,
            borrower,
            relayer: address_field(&raw.relayer, "relayer")?,
            wrangler: normalize_wrangler(wrangler),
            filler: address_field(&raw.filler, "filler")?,
            loan_token: address_field(&raw.loan_token, "loanToken")?,
            collateral_token: address_field(&raw.collateral_token, "collateralToken")?,
            loan_amount_offered: uint_field(&raw.loan_amount_offered, "loanAmountOffered")?,
            fill_loan_amount: uint_field(&raw.fill_loan_amount, "fillLoanAmount")?,
            interest_rate_per_day: uint_field(&raw.interest_rate_per_day, "interestRatePerDay")?,
            loan_duration: u64_field(&raw.loan_duration, "loanDuration")?,
            relayer_fee_lst: uint_field(&raw.relayer_fee_lst, "relayerFeeLST")?,
            monitoring_fee_lst: uint_field(&raw.monitoring_fee_lst, "monitoringFeeLST")?,
            rollover_fee_lst: uint_field(&raw.rollover_fee_lst, "rolloverFeeLST")?,
            closure_fee_lst: uint_field(&raw.closure_fee_lst, "closureFeeLST")?,
            offer_expiry: u64_field(&raw.offer_expiry, "offerExpiry")?,
            creator_salt: salt_field(&raw.creator_salt)?,
            creator_signature: creator_signature(&raw)?,
        })
    }
}

/// Concrete terms of a fill, as the settlement contract will record them
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanObject {
    #[serde(with = "checksummed")]
    pub lender: Address,
    #[serde(with = "checksummed")]
    pub borrower: Address,
    #[serde(with = "checksummed")]
    pub collateral_token: Address,
    #[serde(with = "checksummed")]
    pub loan_token: Address,
    #[serde(with = "u256_dec")]
    pub collateral_amount: U256,
    #[serde(with = "u256_dec")]
    pub loan_amount_filled: U256,
    #[serde(with = "u256_dec")]
    pub loan_amount_owed: U256,
    pub expires_at_timestamp: UnixTimestamp,
    #[serde(with = "checksummed")]
    pub relayer: Address,
    #[serde(with = "checksummed")]
    pub wrangler: Address,
    #[serde(rename = "relayerFeeLST", with = "u256_dec")]
    pub relayer_fee_lst: U256,
    #[serde(rename = "monitoringFeeLST", with = "u256_dec")]
    pub monitoring_fee_lst: U256,
    #[serde(rename = "rolloverFeeLST", with = "u256_dec")]
    pub rollover_fee_lst: U256,
    #[serde(rename = "closureFeeLST", with = "u256_dec")]
    pub closure_fee_lst: U256,
    #[serde(with = "u256_dec")]
    pub nonce: U256,
}

/// Everything the settlement contract needs to accept a fill. The wrangler
/// signature is only present when the fill passed every check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Approval {
    /// `[lender, borrower, relayer, wrangler, collateralToken, loanToken]`
    #[serde(rename = "_addresses", serialize_with = "checksummed_seq::serialize")]
    pub addresses: [Address; APPROVAL_ADDRESS_COUNT],
    /// `[collateralAmount, loanAmountOffered, relayerFeeLST, monitoringFeeLST,
    /// rolloverFeeLST, closureFeeLST, loanAmountFilled]`
    #[serde(rename = "_values", serialize_with = "u256_dec_seq::serialize")]
    pub values: [U256; APPROVAL_VALUE_COUNT],
    #[serde(rename = "_nonce", serialize_with = "u256_dec::serialize")]
    pub nonce: U256,
    #[serde(rename = "_kernel_daily_interest_rate", serialize_with = "u256_dec::serialize")]
    pub kernel_daily_interest_rate: U256,
    #[serde(rename = "_is_creator_lender")]
    pub is_creator_lender: bool,
    /// `[offerExpiry, approvalExpiry]`
    #[serde(rename = "_timestamps")]
    pub timestamps: [UnixTimestamp; 2],
    #[serde(rename = "_position_duration_in_seconds")]
    pub position_duration_in_seconds: u64,
    #[serde(rename = "_kernel_creator_salt")]
    pub kernel_creator_salt: H256,
    #[serde(rename = "_creator_signature")]
    pub creator_signature: SignatureParts,
    #[serde(rename = "_wrangler_signature")]
    pub wrangler_signature: Option<SignatureParts>,
}

impl Approval {
    pub fn offer_expiry(&self) -> UnixTimestamp {
        self.timestamps[0]
    }

    pub fn approval_expiry(&self) -> UnixTimestamp {
        self.timestamps[1]
    }

    pub fn is_signed(&self) -> bool {
        self.wrangler_signature.is_some()
    }
}

/// A single validation failure, reported to the caller as `{label, message}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub label: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(label: &str, message: impl Into<String>) -> Self {
        Self {
            label: label.to_string(),
            message: message.into(),
        }
    }
}

/// A position recorded by the settlement contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub hash: H256,
    #[serde(with = "checksummed")]
    pub lend_token: Address,
    #[serde(with = "checksummed")]
    pub collateral_token: Address,
    #[serde(with = "u256_dec")]
    pub lend_filled: U256,
    #[serde(with = "u256_dec")]
    pub collateral_amount: U256,
    pub expires_at: UnixTimestamp,
    pub status: u64,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.status == POSITION_STATUS_OPEN
    }
}

/// An open position whose expiry is at or before `now` may be liquidated
pub fn is_liquidatable(status: u64, expires_at: UnixTimestamp, now: UnixTimestamp) -> bool {
    status == POSITION_STATUS_OPEN && expires_at <= now
}
