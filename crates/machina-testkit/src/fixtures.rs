//! Ready-made test environments.

use crate::chain::{SimulatedChain, SimulatedWallet};
use crate::time::InstantTime;
use alloy_primitives::Address;
use machina_core::{
    LayeredConfig, MachinaConfig, MachinaEffects, MachineEncoding, PaymentMode, TokenAmount,
    PEAQ_CHAIN_ID,
};
use std::sync::Arc;

pub const REGISTRY: Address = Address::repeat_byte(0xaa);
pub const PAYMENT_TOKEN: Address = Address::repeat_byte(0xbb);
pub const USER: Address = Address::repeat_byte(0x11);
pub const OPERATOR: Address = Address::repeat_byte(0x0e);

/// Operator float large enough for any test airdrop.
pub fn operator_float() -> TokenAmount {
    TokenAmount::from_tokens(1_000)
}

/// Parse a decimal amount in test code.
#[allow(clippy::expect_used)]
pub fn amount(value: &str) -> TokenAmount {
    TokenAmount::parse(value).expect("valid test amount")
}

/// A simulated chain plus everything needed to build clients against it.
#[derive(Debug, Clone)]
pub struct TestEnv {
    pub config: MachinaConfig,
    pub chain: SimulatedChain,
    pub user: SimulatedWallet,
    pub operator: SimulatedWallet,
    pub time: InstantTime,
}

impl TestEnv {
    /// Native payment mode, struct encoding, funded operator.
    pub fn native() -> Self {
        Self::build(PaymentMode::Native, MachineEncoding::Struct)
    }

    /// Token-approval payment mode with a funded operator token balance.
    pub fn token_approval() -> Self {
        Self::build(PaymentMode::TokenApproval, MachineEncoding::Struct)
    }

    #[allow(clippy::expect_used)]
    pub fn build(mode: PaymentMode, encoding: MachineEncoding) -> Self {
        let mut config = MachinaConfig::default();
        config.contracts.machine_manager = Some(REGISTRY);
        config.contracts.payment_token = Some(PAYMENT_TOKEN);
        config.contracts.machine_encoding = encoding;
        config.payment.mode = mode;
        config.validate().expect("fixture config is valid");

        let chain = SimulatedChain::new(REGISTRY, PAYMENT_TOKEN, PEAQ_CHAIN_ID).with_encoding(encoding);
        chain.set_native_balance(OPERATOR, operator_float());
        chain.set_token_balance(OPERATOR, operator_float());

        Self {
            user: chain.wallet(USER),
            operator: chain.wallet(OPERATOR),
            config,
            chain,
            time: InstantTime::new(),
        }
    }

    /// Replace the user wallet, e.g. with a disconnected one.
    pub fn with_user_wallet(mut self, wallet: SimulatedWallet) -> Self {
        self.user = wallet;
        self
    }

    pub fn effects(&self) -> MachinaEffects {
        MachinaEffects {
            chain: Arc::new(self.chain.clone()),
            receipts: Arc::new(self.chain.clone()),
            wallet: Arc::new(self.user.clone()),
            operator: Arc::new(self.operator.clone()),
            time: Arc::new(self.time.clone()),
        }
    }
}
