//! Chain read and receipt effects.

use crate::errors::{MachinaResult, ProviderError};
use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Read-only access to contract state.
#[async_trait]
pub trait ChainReadEffects: Send + Sync {
    /// Execute a read-only call against `to` and return the raw ABI output.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ProviderError>;

    /// Native currency balance of `account`, in base units.
    async fn native_balance(&self, account: Address) -> Result<U256, ProviderError>;
}

/// Outcome of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub hash: B256,
    /// `false` when the transaction reverted.
    pub success: bool,
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
}

/// Waiting for submitted transactions.
#[async_trait]
pub trait ReceiptEffects: Send + Sync {
    /// Resolve once `hash` is mined.
    ///
    /// Handlers translate their own failures: transport errors become
    /// `ChainRead { Rpc }`, an expired wait becomes `ConfirmationTimeout`.
    /// A reverted transaction is a successful wait with `success == false`.
    async fn wait_for_receipt(&self, hash: B256) -> MachinaResult<TxReceipt>;
}
