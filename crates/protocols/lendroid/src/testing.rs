//! Test fixtures: a funded fill scenario over an in-memory ledger
//!
//! The wrangler key is the well-known development account #0. The offer in
//! [`loan_request`] is posted by a borrower and filled by a lender; with the
//! DAI/WETH rate at 0.001 and a 1.5 margin, filling 1 DAI needs 0.0015 WETH.

use std::sync::{Arc, Mutex};

use eth_node_client::MockLedger;
use eth_tx::call::ContractCall;
use eth_tx::signing::{wallet_from_key, SignatureParts};
use ethers::abi::{self, Token};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, H256, U256};
use rust_decimal::Decimal;
use wrangler_core::{AppConfig, PositionIndex, UnixTimestamp};

use crate::calculator::{compute_loan_terms, TermInputs};
use crate::context::{Settings, WranglerContext};
use crate::fetch::{self, ScanScope};
use crate::rates::{AssetPair, FixedRateOracle};
use crate::state::{LoanObject, LoanRequest, Position};

/// Ledger time of the scenario
pub const NOW: UnixTimestamp = 1_700_000_000;

pub const WRANGLER_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub fn wrangler_address() -> Address {
    wrangler_wallet().address()
}

pub fn wrangler_wallet() -> LocalWallet {
    wallet_from_key(WRANGLER_KEY).expect("development key is valid")
}

pub fn protocol() -> Address {
    Address::repeat_byte(0xa1)
}

pub fn price_feed() -> Address {
    Address::repeat_byte(0xa2)
}

pub fn weth() -> Address {
    Address::repeat_byte(0xb1)
}

pub fn dai() -> Address {
    Address::repeat_byte(0xb2)
}

pub fn lst() -> Address {
    Address::repeat_byte(0xb3)
}

/// Posted the offer (as borrower)
pub fn creator_address() -> Address {
    Address::repeat_byte(0xc1)
}

/// Fills the offer (as lender)
pub fn filler_address() -> Address {
    Address::repeat_byte(0xc2)
}

pub fn rate() -> Decimal {
    Decimal::new(1, 3)
}

pub fn owed_value() -> U256 {
    U256::from(1_001_000_000_000_000_000u128)
}

pub fn app_config() -> AppConfig {
    let json = format!(
        r#"{{
            "network": "kovan",
            "wrangler": {{
                "address": "{wrangler:?}",
                "accepted_names": ["Lendroid"]
            }},
            "contracts": {{ "protocol": "{protocol:?}", "price_feed": "{feed:?}" }},
            "assets": {{ "WETH": "{weth:?}", "DAI": "{dai:?}", "LST": "{lst:?}" }},
            "monitor": {{ "enabled": false }}
        }}"#,
        wrangler = wrangler_address(),
        protocol = protocol(),
        feed = price_feed(),
        weth = weth(),
        dai = dai(),
        lst = lst(),
    );
    AppConfig::from_json(&json).expect("fixture config parses")
}

pub fn loan_request() -> LoanRequest {
    LoanRequest {
        lender: Address::zero(),
        borrower: creator_address(),
        relayer: Address::zero(),
        wrangler: "Lendroid".to_string(),
        filler: filler_address(),
        loan_token: dai(),
        collateral_token: weth(),
        loan_amount_offered: U256::exp10(18) * 2,
        fill_loan_amount: U256::exp10(18),
        interest_rate_per_day: U256::exp10(15),
        loan_duration: 86_400,
        relayer_fee_lst: U256::zero(),
        monitoring_fee_lst: U256::exp10(18),
        rollover_fee_lst: U256::zero(),
        closure_fee_lst: U256::zero(),
        offer_expiry: NOW + 600,
        creator_salt: H256::from_low_u64_be(42),
        creator_signature: SignatureParts {
            v: 27,
            r: H256::repeat_byte(0x01),
            s: H256::repeat_byte(0x02),
        },
    }
}

/// Terms [`loan_request`] produces in a funded scenario with nonce 1
pub fn loan_object() -> LoanObject {
    compute_loan_terms(
        &loan_request(),
        &TermInputs {
            rate: rate(),
            margin_factor: Decimal::new(15, 1),
            owed_value: owed_value(),
            ledger_timestamp: NOW,
            nonce: U256::one(),
            wrangler: wrangler_address(),
        },
    )
    .expect("fixture terms compute")
}

fn program(ledger: &MockLedger, call: &ContractCall, output: &[Token]) {
    ledger.set_call(call.to, call.calldata().to_vec(), abi::encode(output));
}

/// Context over a programmable ledger and oracle
pub struct Scenario {
    pub ctx: WranglerContext,
    pub ledger: Arc<MockLedger>,
    pub oracle: Arc<FixedRateOracle>,
    last_index: Mutex<PositionIndex>,
}

impl Scenario {
    /// Nothing programmed on the ledger; the DAI/WETH rate is set
    pub fn empty() -> Self {
        Self::build(Settings::from_config(&app_config()).expect("fixture settings"))
    }

    /// Everything [`loan_request`] needs to pass validation
    pub fn funded() -> Self {
        let scenario = Self::empty();
        scenario.fund();
        scenario
    }

    /// Funded scenario with adjusted settings
    pub fn with_settings(adjust: impl FnOnce(&mut Settings)) -> Self {
        let mut settings = Settings::from_config(&app_config()).expect("fixture settings");
        adjust(&mut settings);
        let scenario = Self::build(settings);
        scenario.fund();
        scenario
    }

    fn build(settings: Settings) -> Self {
        let ledger = Arc::new(MockLedger::new(NOW));
        let oracle = Arc::new(FixedRateOracle::new().with_rate(AssetPair::new(dai(), weth()), rate()));
        let ctx = WranglerContext::new(settings, ledger.clone(), oracle.clone(), wrangler_wallet())
            .expect("fixture context");
        Self {
            ctx,
            ledger,
            oracle,
            last_index: Mutex::new(0),
        }
    }

    fn fund(&self) {
        let plenty = U256::exp10(21);
        let loan = loan_object();
        let request = loan_request();

        self.set_wrangler_registered(true);
        self.set_token_supported(dai(), true);
        self.set_token_supported(weth(), true);
        self.set_consumed_nonce(creator_address(), U256::zero());
        program(
            &self.ledger,
            &fetch::owed_value_call(
                protocol(),
                request.fill_loan_amount,
                request.interest_rate_per_day,
                request.loan_duration,
            ),
            &[Token::Uint(owed_value())],
        );

        for (token, owner) in [
            (loan.loan_token, loan.lender),
            (loan.collateral_token, loan.borrower),
            (lst(), loan.lender),
        ] {
            self.set_balance(token, owner, plenty);
            self.set_allowance(token, owner, plenty);
        }

        for scope in self.scopes() {
            program(
                &self.ledger,
                &fetch::last_position_index_call(protocol(), scope),
                &[Token::Uint(U256::zero())],
            );
            program(
                &self.ledger,
                &fetch::position_hash_call(protocol(), scope, 0),
                &[Token::FixedBytes(H256::zero().as_bytes().to_vec())],
            );
        }
    }

    fn scopes(&self) -> [ScanScope; 3] {
        [
            ScanScope::All,
            ScanScope::Wrangler(wrangler_address()),
            ScanScope::CreatorWrangler {
                creator: creator_address(),
                wrangler: wrangler_address(),
            },
        ]
    }

    pub fn set_wrangler_registered(&self, registered: bool) {
        program(
            &self.ledger,
            &fetch::wranglers_call(protocol(), wrangler_address()),
            &[Token::Bool(registered)],
        );
    }

    pub fn set_token_supported(&self, token: Address, supported: bool) {
        program(
            &self.ledger,
            &fetch::supported_token_call(protocol(), token),
            &[Token::Bool(supported)],
        );
    }

    pub fn set_consumed_nonce(&self, creator: Address, nonce: U256) {
        program(
            &self.ledger,
            &fetch::nonce_call(protocol(), wrangler_address(), creator),
            &[Token::Uint(nonce)],
        );
    }

    pub fn set_balance(&self, token: Address, owner: Address, amount: U256) {
        program(&self.ledger, &fetch::balance_call(token, owner), &[Token::Uint(amount)]);
    }

    /// Allowance granted to the settlement contract
    pub fn set_allowance(&self, token: Address, owner: Address, amount: U256) {
        program(
            &self.ledger,
            &fetch::allowance_call(token, owner, protocol()),
            &[Token::Uint(amount)],
        );
    }

    /// Record `position` at `index` in the global, wrangler and creator/wrangler books
    pub fn add_position(&self, index: PositionIndex, position: &Position) {
        let hash = position.hash;
        let last = {
            let mut last = self.last_index.lock().expect("fixture lock");
            *last = (*last).max(index);
            *last
        };

        for scope in self.scopes() {
            program(
                &self.ledger,
                &fetch::last_position_index_call(protocol(), scope),
                &[Token::Uint(U256::from(last))],
            );
            program(
                &self.ledger,
                &fetch::position_hash_call(protocol(), scope, index),
                &[Token::FixedBytes(hash.as_bytes().to_vec())],
            );
            // slots below `index` that were never filled read as empty
            for empty in 0..index {
                let call = fetch::position_hash_call(protocol(), scope, empty);
                if !self.is_programmed(&call) {
                    program(&self.ledger, &call, &[Token::FixedBytes(vec![0u8; 32])]);
                }
            }
        }

        program(
            &self.ledger,
            &fetch::position_expiry_call(protocol(), hash),
            &[Token::Uint(U256::from(position.expires_at))],
        );
        program(
            &self.ledger,
            &fetch::position_status_call(protocol(), hash),
            &[Token::Uint(U256::from(position.status))],
        );
        program(
            &self.ledger,
            &fetch::position_call(protocol(), hash),
            &[
                Token::Address(position.lend_token),
                Token::Address(position.collateral_token),
                Token::Uint(position.lend_filled),
                Token::Uint(position.collateral_amount),
                Token::Uint(U256::from(position.expires_at)),
                Token::Uint(U256::from(position.status)),
                Token::FixedBytes(hash.as_bytes().to_vec()),
            ],
        );
    }

    fn is_programmed(&self, call: &ContractCall) -> bool {
        self.ledger.has_call(call.to, call.calldata().to_vec())
    }
}
