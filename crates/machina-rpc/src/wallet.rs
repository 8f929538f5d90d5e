//! Wallet backed by a JSON-RPC signer.
//!
//! The signer holds the key and exposes the standard account methods
//! (`eth_accounts`, `eth_sendTransaction`, `wallet_switchEthereumChain`).
//! This client never sees key material.

use crate::transport::{call, RpcTransport};
use alloy_primitives::{Address, B256, U64};
use async_trait::async_trait;
use machina_core::{MachinaError, MachinaResult, ProviderError, TxRequest, WalletEffects};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct RpcWallet {
    transport: Arc<dyn RpcTransport>,
    account: Option<Address>,
}

impl std::fmt::Debug for RpcWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcWallet")
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

impl RpcWallet {
    /// Wallet for a known account.
    pub fn new(transport: Arc<dyn RpcTransport>, account: Option<Address>) -> Self {
        Self { transport, account }
    }

    /// Ask the signer which accounts it manages and bind to `expected`, or
    /// to the first one when no account is requested.
    pub async fn connect(
        transport: Arc<dyn RpcTransport>,
        expected: Option<Address>,
    ) -> MachinaResult<Self> {
        let accounts: Vec<Address> = call(transport.as_ref(), "eth_accounts", json!([]))
            .await
            .map_err(|e| MachinaError::chain_rpc(e.to_string()))?;

        let account = match expected {
            Some(expected) => accounts.iter().copied().find(|a| *a == expected),
            None => accounts.first().copied(),
        };
        match account {
            Some(account) => info!(account = %account, "wallet connected"),
            None => debug!(available = accounts.len(), "signer has no matching account"),
        }
        Ok(Self::new(transport, account))
    }

    pub fn account(&self) -> Option<Address> {
        self.account
    }
}

#[async_trait]
impl WalletEffects for RpcWallet {
    async fn connected_account(&self) -> Option<Address> {
        self.account
    }

    async fn chain_id(&self) -> Result<u64, ProviderError> {
        let id: U64 = call(self.transport.as_ref(), "eth_chainId", json!([])).await?;
        Ok(id.to::<u64>())
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), ProviderError> {
        self.transport
            .request(
                "wallet_switchEthereumChain",
                json!([{ "chainId": format!("{chain_id:#x}") }]),
            )
            .await?;
        Ok(())
    }

    async fn send_transaction(&self, request: TxRequest) -> Result<B256, ProviderError> {
        let from = self
            .account
            .ok_or_else(|| ProviderError::new(Some(4100), "no account is connected"))?;
        let mut tx = json!({
            "from": from,
            "to": request.to,
            "value": request.value,
        });
        if !request.data.is_empty() {
            tx["data"] = json!(request.data);
        }
        call(self.transport.as_ref(), "eth_sendTransaction", json!([tx])).await
    }
}
