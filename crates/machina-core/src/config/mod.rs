//! Client configuration.
//!
//! Contract addresses and the operator credential are deployment inputs:
//! addresses come from the config file or environment, and the credential is
//! only ever read from the environment variable named by
//! [`OperatorConfig::credential_env`].

mod traits;

pub use traits::LayeredConfig;

use crate::amount::TokenAmount;
use crate::errors::{MachinaError, MachinaResult};
use crate::machine::IdFallback;
use crate::reliability::RetryPolicy;
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Chain id of the peaq network.
pub const PEAQ_CHAIN_ID: u64 = 3338;

pub const DEFAULT_RPC_URL: &str = "https://peaq.api.onfinality.io/public";

pub const DEFAULT_CREDENTIAL_ENV: &str = "MACHINA_OPERATOR_CREDENTIAL";

/// How the machine price is paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    /// Price attached as native value to `useMachine`.
    #[default]
    Native,
    /// Price pulled by the registry from an approved ERC-20 allowance.
    TokenApproval,
}

impl FromStr for PaymentMode {
    type Err = MachinaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "native" => Ok(PaymentMode::Native),
            "token_approval" | "token-approval" => Ok(PaymentMode::TokenApproval),
            other => Err(MachinaError::config(format!("Unknown payment mode: {other}"))),
        }
    }
}

/// Return layout of the registry's machine accessor in the deployed ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineEncoding {
    /// A single `MachineInfo` struct.
    #[default]
    Struct,
    /// Positional return values.
    Tuple,
}

impl FromStr for MachineEncoding {
    type Err = MachinaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "struct" => Ok(MachineEncoding::Struct),
            "tuple" => Ok(MachineEncoding::Tuple),
            other => Err(MachinaError::config(format!("Unknown machine encoding: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub rpc_url: String,
    /// Upper bound on waiting for a receipt.
    pub confirmation_timeout_secs: u64,
    pub receipt_poll_interval_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            chain_id: PEAQ_CHAIN_ID,
            rpc_url: DEFAULT_RPC_URL.to_string(),
            confirmation_timeout_secs: 300,
            receipt_poll_interval_ms: 2_000,
        }
    }
}

impl NetworkConfig {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractsConfig {
    pub machine_manager: Option<Address>,
    /// Required in token-approval mode.
    pub payment_token: Option<Address>,
    pub machine_encoding: MachineEncoding,
    /// Lowest registry index in use.
    pub first_machine_id: u64,
}

impl Default for ContractsConfig {
    fn default() -> Self {
        Self {
            machine_manager: None,
            payment_token: None,
            machine_encoding: MachineEncoding::Struct,
            first_machine_id: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total submissions per step, including the first.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::exponential()
            .with_max_attempts(self.max_attempts)
            .with_initial_delay(Duration::from_millis(self.base_delay_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentConfig {
    pub mode: PaymentMode,
    /// Added on top of the price when airdropping to a first-time user.
    pub gas_buffer: TokenAmount,
    pub id_fallback: IdFallback,
    pub retry: RetryConfig,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            mode: PaymentMode::Native,
            gas_buffer: TokenAmount::from_base_units(alloy_primitives::U256::from(
                10_000_000_000_000_000u64,
            )),
            id_fallback: IdFallback::Strict,
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    /// JSON-RPC endpoint of the signer holding the operator account.
    pub signer_url: Option<String>,
    /// Name of the environment variable holding the operator credential.
    pub credential_env: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            signer_url: None,
            credential_env: DEFAULT_CREDENTIAL_ENV.to_string(),
        }
    }
}

/// Complete client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MachinaConfig {
    pub network: NetworkConfig,
    pub contracts: ContractsConfig,
    pub payment: PaymentConfig,
    pub operator: OperatorConfig,
}

impl MachinaConfig {
    /// Defaults, then `path` if given, then the environment; validated.
    pub fn load(path: Option<&Path>) -> MachinaResult<Self> {
        Self::load_with_overrides::<&str>(path, &[])
    }

    /// Like [`MachinaConfig::load`], with `key=value` assignments applied
    /// last.
    pub fn load_with_overrides<S: AsRef<str>>(
        path: Option<&Path>,
        overrides: &[S],
    ) -> MachinaResult<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.merge_with_env()?;
        for assignment in overrides {
            config.apply_override(assignment.as_ref())?;
        }
        config.validate()?;
        Ok(config)
    }

    /// The registry address; required by every chain operation.
    pub fn machine_manager(&self) -> MachinaResult<Address> {
        self.contracts
            .machine_manager
            .ok_or_else(|| MachinaError::config("contracts.machine_manager is not set"))
    }

    pub fn payment_token(&self) -> MachinaResult<Address> {
        self.contracts
            .payment_token
            .ok_or_else(|| MachinaError::config("contracts.payment_token is not set"))
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> MachinaResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| MachinaError::config(format!("Invalid value for {key}: {e}")))
}

fn parse_optional_address(key: &str, value: &str) -> MachinaResult<Option<Address>> {
    if value.is_empty() {
        Ok(None)
    } else {
        parse_value::<Address>(key, value).map(Some)
    }
}

impl LayeredConfig for MachinaConfig {
    const KEYS: &'static [&'static str] = &[
        "network.chain_id",
        "network.rpc_url",
        "network.confirmation_timeout_secs",
        "network.receipt_poll_interval_ms",
        "contracts.machine_manager",
        "contracts.payment_token",
        "contracts.machine_encoding",
        "contracts.first_machine_id",
        "payment.mode",
        "payment.gas_buffer",
        "payment.id_fallback",
        "payment.retry.max_attempts",
        "payment.retry.base_delay_ms",
        "operator.signer_url",
        "operator.credential_env",
    ];

    fn validate(&self) -> MachinaResult<()> {
        if self.network.chain_id == 0 {
            return Err(MachinaError::config("network.chain_id cannot be 0"));
        }
        if self.network.rpc_url.is_empty() {
            return Err(MachinaError::config("network.rpc_url cannot be empty"));
        }
        if self.network.confirmation_timeout_secs == 0 {
            return Err(MachinaError::config(
                "network.confirmation_timeout_secs cannot be 0",
            ));
        }
        if self.network.receipt_poll_interval_ms == 0 {
            return Err(MachinaError::config(
                "network.receipt_poll_interval_ms cannot be 0",
            ));
        }
        self.machine_manager()?;
        if self.payment.mode == PaymentMode::TokenApproval {
            self.payment_token().map_err(|_| {
                MachinaError::config("contracts.payment_token is required in token_approval mode")
            })?;
        }
        if self.payment.retry.max_attempts == 0 {
            return Err(MachinaError::config(
                "payment.retry.max_attempts must be at least 1",
            ));
        }
        if self.operator.credential_env.is_empty() {
            return Err(MachinaError::config("operator.credential_env cannot be empty"));
        }
        Ok(())
    }

    fn set_from_string(&mut self, key: &str, value: &str) -> MachinaResult<()> {
        match key {
            "network.chain_id" => self.network.chain_id = parse_value(key, value)?,
            "network.rpc_url" => self.network.rpc_url = value.to_string(),
            "network.confirmation_timeout_secs" => {
                self.network.confirmation_timeout_secs = parse_value(key, value)?
            }
            "network.receipt_poll_interval_ms" => {
                self.network.receipt_poll_interval_ms = parse_value(key, value)?
            }
            "contracts.machine_manager" => {
                self.contracts.machine_manager = parse_optional_address(key, value)?
            }
            "contracts.payment_token" => {
                self.contracts.payment_token = parse_optional_address(key, value)?
            }
            "contracts.machine_encoding" => self.contracts.machine_encoding = value.parse()?,
            "contracts.first_machine_id" => {
                self.contracts.first_machine_id = parse_value(key, value)?
            }
            "payment.mode" => self.payment.mode = value.parse()?,
            "payment.gas_buffer" => self.payment.gas_buffer = TokenAmount::parse(value)?,
            "payment.id_fallback" => {
                self.payment.id_fallback = match value {
                    "strict" => IdFallback::Strict,
                    "legacy" => IdFallback::Legacy,
                    other => {
                        return Err(MachinaError::config(format!(
                            "Unknown id fallback policy: {other}"
                        )))
                    }
                }
            }
            "payment.retry.max_attempts" => {
                self.payment.retry.max_attempts = parse_value(key, value)?
            }
            "payment.retry.base_delay_ms" => {
                self.payment.retry.base_delay_ms = parse_value(key, value)?
            }
            "operator.signer_url" => {
                self.operator.signer_url = (!value.is_empty()).then(|| value.to_string())
            }
            "operator.credential_env" => self.operator.credential_env = value.to_string(),
            _ => {
                return Err(MachinaError::config(format!(
                    "Unknown configuration key: {key}"
                )))
            }
        }
        Ok(())
    }
}
