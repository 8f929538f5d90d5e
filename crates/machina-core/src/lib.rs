//! Machina Core - foundation of the machine-economy payment client
//!
//! Types, the error taxonomy and the effect interfaces shared by every other
//! crate. Nothing here talks to a network; handlers live in `machina-rpc`
//! (production) and `machina-testkit` (simulation).
//!
//! # Architecture Layers
//!
//! ## Domain Types
//! - `TokenAmount`: exact 18-decimal fixed-point amounts
//! - `MachineIndex`, `Machine`: registry identifiers and records
//! - `TransactionTracker`: per-slot transaction lifecycle
//!
//! ## Effect Interfaces (Pure Signatures)
//! - `ChainReadEffects`: `call`, `native_balance`
//! - `WalletEffects`: `connected_account`, `chain_id`, `switch_chain`, `send_transaction`
//! - `ReceiptEffects`: `wait_for_receipt`
//! - `TimeEffects`: `sleep`
//!
//! ## Errors
//! - `MachinaError`: unified error type
//! - `ErrorClassifier`: provider error text to `TxErrorKind`, applied once at
//!   the handler boundary

#![allow(missing_docs)]
#![forbid(unsafe_code)]

/// Exact decimal token amounts
pub mod amount;

/// Provider error classification
pub mod classify;

/// Layered client configuration
pub mod config;

/// Pure effect interfaces (no implementations)
pub mod effects;

/// Unified error handling
pub mod errors;

/// Machine identifiers and records
pub mod machine;

/// Retry and backoff
pub mod reliability;

/// Operator credential
pub mod secret;

/// Transaction slot state machine
pub mod transaction;

pub use amount::{TokenAmount, TOKEN_DECIMALS};
pub use classify::ErrorClassifier;
pub use config::{
    LayeredConfig, MachinaConfig, MachineEncoding, PaymentMode, DEFAULT_CREDENTIAL_ENV,
    PEAQ_CHAIN_ID,
};
pub use effects::{
    ChainReadEffects, MachinaEffects, ReceiptEffects, TimeEffects, TxReceipt, TxRequest,
    WalletEffects,
};
pub use errors::{
    MachinaError, MachinaResult, ProviderError, ReadFailure, RetryEligibility, TransactionError,
    TxErrorKind,
};
pub use machine::{IdFallback, Machine, MachineIndex};
pub use reliability::RetryPolicy;
pub use secret::OperatorCredential;
pub use transaction::{
    TransactionSnapshot, TransactionState, TransactionTracker, TxSlot, TxStatus,
};

/// Re-exported so downstream crates share one primitive-types version.
pub use alloy_primitives::{Address, Bytes, B256, U256};
