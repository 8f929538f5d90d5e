//! Contract reads through `eth_call` and `eth_getBalance`.

use crate::transport::{call, RpcTransport};
use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use machina_core::{ChainReadEffects, ProviderError};
use serde_json::json;
use std::sync::Arc;

/// Block tag used for every read.
const LATEST: &str = "latest";

#[derive(Clone)]
pub struct RpcChainReader {
    transport: Arc<dyn RpcTransport>,
}

impl std::fmt::Debug for RpcChainReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcChainReader").finish_non_exhaustive()
    }
}

impl RpcChainReader {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl ChainReadEffects for RpcChainReader {
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ProviderError> {
        call(
            self.transport.as_ref(),
            "eth_call",
            json!([{ "to": to, "data": data }, LATEST]),
        )
        .await
    }

    async fn native_balance(&self, account: Address) -> Result<U256, ProviderError> {
        call(
            self.transport.as_ref(),
            "eth_getBalance",
            json!([account, LATEST]),
        )
        .await
    }
}
