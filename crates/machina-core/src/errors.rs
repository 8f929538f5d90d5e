//! Unified error system for Machina
//!
//! One error type for every operation in the client. Raw provider errors are
//! translated into this taxonomy once, at the handler boundary (see
//! [`crate::classify`]); nothing above that boundary matches on error strings.

use crate::amount::TokenAmount;
use crate::machine::MachineIndex;
use crate::transaction::TxSlot;
use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which half of a chain read failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadFailure {
    /// Transport or node failure; transient.
    Rpc,
    /// The returned bytes do not match the pinned ABI. Indicates a deployed
    /// contract/ABI version mismatch and is never retried.
    Decode,
}

impl fmt::Display for ReadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadFailure::Rpc => f.write_str("rpc"),
            ReadFailure::Decode => f.write_str("decode"),
        }
    }
}

/// Whether a failed step may be submitted again automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryEligibility {
    /// Transient; retry with backoff.
    Retry,
    /// Permanent within this attempt; surface to the user.
    Never,
    /// A transaction with this nonce is already in flight. Resubmitting
    /// before it confirms would double-submit.
    AfterConfirmation,
}

/// Raw error as reported by a wallet or JSON-RPC provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderError {
    /// Provider error code (EIP-1193 / JSON-RPC), when one was reported.
    pub code: Option<i64>,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: Option<i64>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Error without a provider code (transport failures, local faults).
    pub fn message(message: impl Into<String>) -> Self {
        Self::new(None, message)
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "[{code}] {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Closed set of transaction failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxErrorKind {
    AlreadyKnown,
    InsufficientFunds,
    UserRejected,
    Gas,
    Unknown,
}

impl TxErrorKind {
    pub fn retry_eligibility(&self) -> RetryEligibility {
        match self {
            TxErrorKind::AlreadyKnown => RetryEligibility::AfterConfirmation,
            TxErrorKind::InsufficientFunds | TxErrorKind::UserRejected => RetryEligibility::Never,
            TxErrorKind::Gas | TxErrorKind::Unknown => RetryEligibility::Retry,
        }
    }

    /// Fixed user-facing text; `None` for [`TxErrorKind::Unknown`], whose
    /// text comes from the raw message.
    pub fn fixed_message(&self) -> Option<&'static str> {
        match self {
            TxErrorKind::AlreadyKnown => Some(
                "Transaction already pending. Please wait for confirmation or check your wallet.",
            ),
            TxErrorKind::InsufficientFunds => Some("Insufficient funds. Please check your balance."),
            TxErrorKind::UserRejected => Some("Transaction was rejected."),
            TxErrorKind::Gas => {
                Some("Gas estimation failed. Please try again or adjust gas settings.")
            }
            TxErrorKind::Unknown => None,
        }
    }
}

impl fmt::Display for TxErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TxErrorKind::AlreadyKnown => "already known",
            TxErrorKind::InsufficientFunds => "insufficient funds",
            TxErrorKind::UserRejected => "user rejected",
            TxErrorKind::Gas => "gas error",
            TxErrorKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A classified transaction failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("Transaction failed ({kind}): {raw}")]
pub struct TransactionError {
    pub kind: TxErrorKind,
    /// The provider's original message.
    pub raw: String,
}

impl TransactionError {
    pub const GENERIC_MESSAGE: &'static str = "An unexpected error occurred.";

    pub fn new(kind: TxErrorKind, raw: impl Into<String>) -> Self {
        Self {
            kind,
            raw: raw.into(),
        }
    }

    pub fn user_message(&self) -> String {
        match self.kind.fixed_message() {
            Some(text) => text.to_string(),
            None if self.raw.trim().is_empty() => Self::GENERIC_MESSAGE.to_string(),
            None => self.raw.clone(),
        }
    }
}

/// Unified error type for all Machina operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum MachinaError {
    /// A contract query failed
    #[error("Chain read failed ({failure}): {message}")]
    ChainRead {
        failure: ReadFailure,
        message: String,
    },

    /// No wallet account is connected
    #[error("No wallet connected")]
    NoWallet,

    /// The wallet is connected to a different account than the flow's user
    #[error("Connected account {connected} does not match requested user {requested}")]
    WrongAccount {
        connected: Address,
        requested: Address,
    },

    /// Pre-flight balance check failed
    #[error("Insufficient balance: have {balance}, need {required}")]
    InsufficientBalance {
        balance: TokenAmount,
        required: TokenAmount,
    },

    /// A submitted or attempted transaction failed
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// The transaction was mined but reverted
    #[error("Transaction {hash} reverted")]
    Reverted { hash: B256 },

    /// No receipt arrived within the confirmation timeout
    #[error("Timed out waiting for confirmation of {hash}")]
    ConfirmationTimeout { hash: B256 },

    /// The registry reports the machine as non-existent
    #[error("Machine {index} does not exist")]
    MachineNotFound { index: MachineIndex },

    /// An app-level machine id could not be mapped to a registry index
    #[error("Invalid machine id: {input:?}")]
    InvalidMachineId { input: String },

    /// A decimal amount could not be parsed exactly
    #[error("Invalid amount {input:?}: {reason}")]
    InvalidAmount { input: String, reason: String },

    /// Another payment flow for the same user and machine is running
    #[error("A payment for machine {machine} by {user} is already in progress")]
    FlowInProgress {
        user: Address,
        machine: MachineIndex,
    },

    /// The transaction slot already has a pending transaction
    #[error("Transaction slot {slot} already has a pending transaction")]
    SlotBusy { slot: TxSlot },

    /// Invalid or missing configuration
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Internal system error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl MachinaError {
    /// Create an RPC read error
    pub fn chain_rpc(message: impl Into<String>) -> Self {
        Self::ChainRead {
            failure: ReadFailure::Rpc,
            message: message.into(),
        }
    }

    /// Create an ABI decode error
    pub fn chain_decode(message: impl Into<String>) -> Self {
        Self::ChainRead {
            failure: ReadFailure::Decode,
            message: message.into(),
        }
    }

    /// Create an invalid amount error
    pub fn invalid_amount(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAmount {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn retry_eligibility(&self) -> RetryEligibility {
        match self {
            MachinaError::ChainRead {
                failure: ReadFailure::Rpc,
                ..
            } => RetryEligibility::Retry,
            MachinaError::Transaction(err) => err.kind.retry_eligibility(),
            MachinaError::ConfirmationTimeout { .. } => RetryEligibility::AfterConfirmation,
            _ => RetryEligibility::Never,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.retry_eligibility() == RetryEligibility::Retry
    }

    /// Transaction category, when this is a classified transaction failure.
    pub fn tx_kind(&self) -> Option<TxErrorKind> {
        match self {
            MachinaError::Transaction(err) => Some(err.kind),
            _ => None,
        }
    }

    /// Short human-readable text for display.
    pub fn user_message(&self) -> String {
        match self {
            MachinaError::ChainRead {
                failure: ReadFailure::Rpc,
                ..
            } => "Could not reach the network. Please try again.".to_string(),
            MachinaError::ChainRead {
                failure: ReadFailure::Decode,
                ..
            } => "Machine data could not be read. Please update the app.".to_string(),
            MachinaError::NoWallet => "Please connect your wallet.".to_string(),
            MachinaError::WrongAccount { .. } => {
                "Your wallet is connected to a different account.".to_string()
            }
            MachinaError::InsufficientBalance { balance, required } => {
                format!("Insufficient balance: you have {balance} but need {required}.")
            }
            MachinaError::Transaction(err) => err.user_message(),
            MachinaError::Reverted { .. } => "The transaction was reverted on-chain.".to_string(),
            MachinaError::ConfirmationTimeout { .. } => {
                "The transaction is taking longer than expected. Check your wallet for its status."
                    .to_string()
            }
            MachinaError::MachineNotFound { .. } => "This machine is not available.".to_string(),
            MachinaError::FlowInProgress { .. } => {
                "A payment for this machine is already in progress.".to_string()
            }
            MachinaError::SlotBusy { .. } => {
                "Please wait for the pending transaction to finish.".to_string()
            }
            MachinaError::InvalidMachineId { .. }
            | MachinaError::InvalidAmount { .. }
            | MachinaError::Config { .. }
            | MachinaError::Internal { .. } => TransactionError::GENERIC_MESSAGE.to_string(),
        }
    }
}

/// Standard Result type for Machina operations
pub type MachinaResult<T> = std::result::Result<T, MachinaError>;

impl From<std::io::Error> for MachinaError {
    fn from(err: std::io::Error) -> Self {
        Self::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = MachinaError::chain_decode("short return data");
        assert!(matches!(
            err,
            MachinaError::ChainRead {
                failure: ReadFailure::Decode,
                ..
            }
        ));
        assert_eq!(err.to_string(), "Chain read failed (decode): short return data");
    }

    #[test]
    fn insufficient_balance_names_both_figures() {
        let err = MachinaError::InsufficientBalance {
            balance: TokenAmount::parse("0.05").unwrap(),
            required: TokenAmount::parse("0.1").unwrap(),
        };
        let text = err.user_message();
        assert!(text.contains("0.05"), "{text}");
        assert!(text.contains("0.1"), "{text}");
        assert!(err.to_string().contains("0.05"));
    }

    #[test]
    fn retry_eligibility_follows_taxonomy() {
        assert!(MachinaError::chain_rpc("timeout").is_retryable());
        assert!(!MachinaError::chain_decode("bad abi").is_retryable());
        assert!(!MachinaError::NoWallet.is_retryable());

        let rejected = MachinaError::from(TransactionError::new(TxErrorKind::UserRejected, ""));
        assert_eq!(rejected.retry_eligibility(), RetryEligibility::Never);

        let broke = MachinaError::from(TransactionError::new(TxErrorKind::InsufficientFunds, ""));
        assert_eq!(broke.retry_eligibility(), RetryEligibility::Never);
        assert!(!broke.is_retryable());

        let known = MachinaError::from(TransactionError::new(TxErrorKind::AlreadyKnown, ""));
        assert_eq!(known.retry_eligibility(), RetryEligibility::AfterConfirmation);
        assert!(!known.is_retryable());

        let gas = MachinaError::from(TransactionError::new(TxErrorKind::Gas, "out of gas"));
        assert!(gas.is_retryable());
    }

    #[test]
    fn unknown_errors_fall_back_to_raw_or_generic_text() {
        let raw = TransactionError::new(TxErrorKind::Unknown, "execution reverted: paused");
        assert_eq!(raw.user_message(), "execution reverted: paused");

        let empty = TransactionError::new(TxErrorKind::Unknown, "  ");
        assert_eq!(empty.user_message(), TransactionError::GENERIC_MESSAGE);
    }

    #[test]
    fn provider_error_display_includes_code() {
        let err = ProviderError::new(Some(4001), "User rejected the request.");
        assert_eq!(err.to_string(), "[4001] User rejected the request.");
        assert_eq!(ProviderError::message("boom").to_string(), "boom");
    }
}
