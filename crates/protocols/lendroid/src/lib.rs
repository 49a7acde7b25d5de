//! Lendroid Wrangler Workflow
//!
//! Underwrites fills of peer-to-peer lending offers and watches the
//! resulting positions.
//!
//! # Flow
//!
//! A fill request is parsed into a [`LoanRequest`], checked against the
//! settlement ledger, turned into concrete [`LoanObject`] terms, counter-signed
//! into an [`Approval`] the settlement contract can verify, and packaged as a
//! signed settlement transaction. The [`monitor`] liquidates expired positions.

pub mod approval;
pub mod calculator;
pub mod constants;
pub mod context;
pub mod fetch;
pub mod health;
pub mod monitor;
pub mod nonce;
pub mod rates;
pub mod state;
pub mod tx_builder;
pub mod underwrite;
pub mod validate;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-exports
pub use context::*;
pub use health::{loan_health, LoanHealth};
pub use monitor::{Liquidator, ReceiptPolicy, ScanReport, ScanScope};
pub use rates::{AssetPair, FixedRateOracle, MarketRateOracle, RateOracle};
pub use state::*;
pub use underwrite::{approve_loan, is_valid_protocol_transaction_sender, Settlement, Underwriting};
