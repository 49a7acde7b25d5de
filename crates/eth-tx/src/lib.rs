//! eth-tx: Transaction building utilities for Ethereum
//!
//! Provides utilities for:
//! - ABI calldata encoding and typed output decoding
//! - Fixed-width packed encoding and personal-message digests
//! - Digest and transaction signing with a local key
//! - Conversions between on-chain integers and decimals

pub mod call;
pub mod digest;
pub mod signing;
pub mod units;

pub use call::*;
pub use digest::*;
pub use signing::*;
pub use units::*;
