//! Provider error classification.
//!
//! Wallets and nodes report failures as loosely shaped `{ code, message }`
//! objects. Handlers call [`ErrorClassifier::classify`] exactly once when a
//! submission fails, and everything above the handler works with the closed
//! [`TxErrorKind`] set.
//!
//! Rules are checked in order and the first match wins. Message rules match
//! case-insensitively on substrings. Both message rules for duplicate nonces
//! and for missing funds come before the EIP-1193 rejection code, so an error
//! carrying `4001` together with "insufficient funds" is `InsufficientFunds`.

use crate::errors::{ProviderError, TransactionError, TxErrorKind};

/// EIP-1193 "user rejected request".
pub const USER_REJECTED_CODE: i64 = 4001;

const ALREADY_KNOWN_PATTERNS: &[&str] = &["already known", "known transaction", "nonce too low"];
const INSUFFICIENT_FUNDS_PATTERNS: &[&str] = &["insufficient funds", "insufficient balance"];
const USER_REJECTED_PATTERNS: &[&str] = &["user rejected", "user denied", "rejected the request"];
const GAS_PATTERNS: &[&str] = &["gas"];

/// Maps raw provider errors onto [`TxErrorKind`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn classify(err: &ProviderError) -> TransactionError {
        TransactionError::new(Self::kind_of(err), err.message.clone())
    }

    pub fn kind_of(err: &ProviderError) -> TxErrorKind {
        let message = err.message.to_lowercase();
        let contains_any = |patterns: &[&str]| patterns.iter().any(|p| message.contains(p));

        if contains_any(ALREADY_KNOWN_PATTERNS) {
            TxErrorKind::AlreadyKnown
        } else if contains_any(INSUFFICIENT_FUNDS_PATTERNS) {
            TxErrorKind::InsufficientFunds
        } else if err.code == Some(USER_REJECTED_CODE) || contains_any(USER_REJECTED_PATTERNS) {
            TxErrorKind::UserRejected
        } else if contains_any(GAS_PATTERNS) {
            TxErrorKind::Gas
        } else {
            TxErrorKind::Unknown
        }
    }
}
