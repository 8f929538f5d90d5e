//! Wallet effects.

use crate::errors::ProviderError;
use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A transaction for the wallet to sign and submit from its own account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRequest {
    pub to: Address,
    pub data: Bytes,
    /// Native value attached to the call.
    pub value: U256,
}

impl TxRequest {
    /// Contract call without attached value.
    pub fn call(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            to,
            data: data.into(),
            value: U256::ZERO,
        }
    }

    /// Plain native-currency transfer.
    pub fn transfer(to: Address, value: U256) -> Self {
        Self {
            to,
            data: Bytes::new(),
            value,
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

/// Signing capability of one account.
///
/// Errors are returned raw; the caller classifies them once.
#[async_trait]
pub trait WalletEffects: Send + Sync {
    /// The account this wallet signs for, if one is connected.
    async fn connected_account(&self) -> Option<Address>;

    async fn chain_id(&self) -> Result<u64, ProviderError>;

    /// Ask the wallet to move to `chain_id`.
    async fn switch_chain(&self, chain_id: u64) -> Result<(), ProviderError>;

    /// Sign and submit, returning the transaction hash once accepted.
    async fn send_transaction(&self, request: TxRequest) -> Result<B256, ProviderError>;
}
