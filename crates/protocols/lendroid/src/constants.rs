//! Lendroid Protocol Constants
//!
//! Contract function signatures and validation labels. Signatures are the
//! canonical forms the 4-byte selectors are derived from.

/// Settlement (protocol) contract functions
pub mod protocol {
    pub const WRANGLERS: &str = "wranglers(address)";
    pub const SUPPORTED_TOKENS: &str = "supported_tokens(address)";
    /// `(wrangler, creator) -> last consumed nonce`
    pub const NONCES: &str = "nonces(address,address)";
    /// `(filled, daily rate, duration seconds) -> owed`
    pub const OWED_VALUE: &str = "owed_value(uint256,uint256,uint256)";

    pub const LAST_POSITION_INDEX: &str = "last_position_index()";
    pub const POSITION_HASH: &str = "position_hash(uint256)";
    pub const LAST_WRANGLER_POSITION_INDEX: &str = "last_wrangler_position_index(address)";
    pub const WRANGLER_POSITION_HASH: &str = "wrangler_position_hash(address,uint256)";
    pub const LAST_CREATOR_WRANGLER_POSITION_INDEX: &str =
        "last_creator_wrangler_position_index(address,address)";
    pub const CREATOR_WRANGLER_POSITION_HASH: &str =
        "creator_wrangler_position_hash(address,address,uint256)";

    pub const POSITION_EXPIRY: &str = "position_expiry(bytes32)";
    pub const POSITION_STATUS: &str = "position_status(bytes32)";
    /// `(lendToken, collateralToken, lendFilled, collateralAmount, expiresAt, status, hash)`
    pub const POSITION: &str = "position(bytes32)";

    pub const FILL_KERNEL: &str = "fill_kernel(address[6],uint256[7],uint256,uint256,bool,uint256[2],uint256,bytes32,uint256[3][2])";
    pub const LIQUIDATE_POSITION: &str = "liquidate_position(bytes32)";
}

/// ERC-20 token functions
pub mod erc20 {
    pub const BALANCE_OF: &str = "balanceOf(address)";
    pub const ALLOWANCE: &str = "allowance(address,address)";
}

/// Price feed for the wrapped-native/stable pair
pub mod price_feed {
    /// Stable units per wrapped-native unit, 18 decimals, zero when unset
    pub const READ: &str = "read()";
}

/// Stable labels for validation errors
pub mod labels {
    pub const INVALID_WRANGLER: &str = "invalid_wrangler";
    pub const WRANGLER_NOT_REGISTERED: &str = "wrangler_not_registered";
    pub const UNSUPPORTED_LOAN_TOKEN: &str = "unsupported_loan_token";
    pub const UNSUPPORTED_COLLATERAL_TOKEN: &str = "unsupported_collateral_token";
    pub const ORDER_EXPIRED: &str = "order_expired";

    pub const LEND_CURRENCY_BALANCE: &str = "lend_currency_balance";
    pub const LEND_CURRENCY_ALLOWANCE: &str = "lend_currency_allowance";
    pub const BORROW_CURRENCY_BALANCE: &str = "borrow_currency_balance";
    pub const BORROW_CURRENCY_ALLOWANCE: &str = "borrow_currency_allowance";
    pub const PROTOCOL_CURRENCY_BALANCE: &str = "protocol_currency_balance";
    pub const PROTOCOL_CURRENCY_ALLOWANCE: &str = "protocol_currency_allowance";

    pub const INVALID_PARAMETERS: &str = "invalid_parameters";
}

/// Number of entries in the approval's address and value lists
pub const APPROVAL_ADDRESS_COUNT: usize = 6;
pub const APPROVAL_VALUE_COUNT: usize = 7;
