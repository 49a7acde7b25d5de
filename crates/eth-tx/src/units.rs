//! Conversions between on-chain integers and decimals, and serde helpers
//! for the wire representation of amounts and addresses.

use ethers::types::{Address, U256};
use ethers::utils::to_checksum;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use wrangler_core::constants::TOKEN_DECIMALS;
use wrangler_core::ProtocolError;

/// `Decimal` holds a 96-bit mantissa
const DECIMAL_MANTISSA_BITS: usize = 96;

fn overflow(what: &str) -> ProtocolError {
    ProtocolError::ArithmeticOverflow {
        what: what.to_string(),
    }
}

/// Integer on-chain value to a decimal with the given scale (0 keeps it integral)
pub fn u256_to_decimal(value: U256, scale: u32) -> Result<Decimal, ProtocolError> {
    if value.bits() > DECIMAL_MANTISSA_BITS {
        return Err(overflow("decimal conversion"));
    }
    Decimal::try_from_i128_with_scale(value.as_u128() as i128, scale)
        .map_err(|_| overflow("decimal conversion"))
}

/// Truncate a non-negative decimal to an on-chain integer
pub fn decimal_to_u256(value: Decimal) -> Result<U256, ProtocolError> {
    if value.is_sign_negative() {
        return Err(ProtocolError::InvalidAmount {
            message: format!("negative amount {}", value),
        });
    }
    value
        .trunc()
        .to_u128()
        .map(U256::from)
        .ok_or_else(|| overflow("integer conversion"))
}

/// 18-decimal fixed point integer to whole units
pub fn wei_to_units(value: U256) -> Result<Decimal, ProtocolError> {
    u256_to_decimal(value, TOKEN_DECIMALS)
}

/// Canonical EIP-55 form
pub fn checksum(address: &Address) -> String {
    to_checksum(address, None)
}

/// Serialize `U256` as a decimal string; accept decimal strings, hex strings or JSON integers
pub mod u256_dec {
    use ethers::types::U256;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        super::parse_u256_value(&value).map_err(de::Error::custom)
    }
}

/// Serialize a list of `U256` as decimal strings
pub mod u256_dec_seq {
    use ethers::types::U256;
    use serde::ser::SerializeSeq;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(values: &[U256], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for value in values {
            seq.serialize_element(&value.to_string())?;
        }
        seq.end()
    }
}

/// Serialize `Address` in checksummed form
pub mod checksummed {
    use ethers::types::Address;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(address: &Address, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::checksum(address))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Address, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Serialize a list of `Address` in checksummed form
pub mod checksummed_seq {
    use ethers::types::Address;
    use serde::ser::SerializeSeq;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(
        addresses: &[Address],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(addresses.len()))?;
        for address in addresses {
            seq.serialize_element(&super::checksum(address))?;
        }
        seq.end()
    }
}

/// Parse an integer amount carried as a decimal string, `0x` hex string or JSON integer
pub fn parse_u256_value(value: &serde_json::Value) -> Result<U256, String> {
    match value {
        serde_json::Value::String(s) => parse_u256_str(s),
        serde_json::Value::Number(n) => n
            .as_u64()
            .map(U256::from)
            .ok_or_else(|| format!("{} is not a non-negative integer", n)),
        other => Err(format!("expected an integer, got {}", other)),
    }
}

pub fn parse_u256_str(s: &str) -> Result<U256, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty integer".to_string());
    }
    if let Some(hex_digits) = s.strip_prefix("0x") {
        U256::from_str_radix(hex_digits, 16).map_err(|e| format!("invalid hex integer: {}", e))
    } else {
        U256::from_dec_str(s).map_err(|e| format!("invalid integer {:?}: {}", s, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_wei_to_units() {
        assert_eq!(wei_to_units(U256::exp10(18)).unwrap(), dec!(1));
        assert_eq!(wei_to_units(U256::from(1_500_000_000_000_000u64)).unwrap(), dec!(0.0015));
    }

    #[test]
    fn test_decimal_to_u256_truncates() {
        assert_eq!(decimal_to_u256(dec!(10.99)).unwrap(), U256::from(10u64));
        assert!(decimal_to_u256(dec!(-1)).is_err());
    }

    #[test]
    fn test_too_large_for_decimal() {
        let huge = U256::MAX;
        assert!(matches!(
            u256_to_decimal(huge, 0),
            Err(ProtocolError::ArithmeticOverflow { .. })
        ));
    }

    #[test]
    fn test_parse_u256_forms() {
        assert_eq!(
            parse_u256_value(&serde_json::json!("1000000000000000000")).unwrap(),
            U256::exp10(18)
        );
        assert_eq!(
            parse_u256_value(&serde_json::json!("0x10")).unwrap(),
            U256::from(16u64)
        );
        assert_eq!(
            parse_u256_value(&serde_json::json!(86400)).unwrap(),
            U256::from(86_400u64)
        );
        assert!(parse_u256_value(&serde_json::json!(-1)).is_err());
        assert!(parse_u256_value(&serde_json::json!("1.5")).is_err());
        assert!(parse_u256_value(&serde_json::json!(null)).is_err());
    }

    #[test]
    fn test_checksum() {
        let address: Address = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".parse().unwrap();
        assert_eq!(checksum(&address), "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
    }
}
