//! Receipt polling.

use crate::transport::{call, RpcTransport};
use alloy_primitives::{B256, U64};
use async_trait::async_trait;
use machina_core::{MachinaError, MachinaResult, ReceiptEffects, TimeEffects, TxReceipt};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Receipt fields the client uses.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcReceipt {
    pub transaction_hash: B256,
    /// `0x1` on success. Absent on pre-Byzantium chains.
    #[serde(default)]
    pub status: Option<U64>,
    #[serde(default)]
    pub block_number: Option<U64>,
    #[serde(default)]
    pub gas_used: Option<U64>,
}

impl From<RpcReceipt> for TxReceipt {
    fn from(receipt: RpcReceipt) -> Self {
        TxReceipt {
            hash: receipt.transaction_hash,
            success: receipt.status.map_or(true, |s| s == U64::from(1)),
            block_number: receipt.block_number.map(|n| n.to::<u64>()),
            gas_used: receipt.gas_used.map(|n| n.to::<u64>()),
        }
    }
}

/// Polls `eth_getTransactionReceipt` until the receipt appears or the
/// confirmation timeout passes.
#[derive(Clone)]
pub struct ReceiptPoller {
    transport: Arc<dyn RpcTransport>,
    time: Arc<dyn TimeEffects>,
    timeout: Duration,
    interval: Duration,
}

impl std::fmt::Debug for ReceiptPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiptPoller")
            .field("timeout", &self.timeout)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl ReceiptPoller {
    pub fn new(
        transport: Arc<dyn RpcTransport>,
        time: Arc<dyn TimeEffects>,
        timeout: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            transport,
            time,
            timeout,
            interval,
        }
    }
}

#[async_trait]
impl ReceiptEffects for ReceiptPoller {
    async fn wait_for_receipt(&self, hash: B256) -> MachinaResult<TxReceipt> {
        let mut waited = Duration::ZERO;
        loop {
            match call::<Option<RpcReceipt>>(
                self.transport.as_ref(),
                "eth_getTransactionReceipt",
                json!([hash]),
            )
            .await
            {
                Ok(Some(receipt)) => {
                    let receipt = TxReceipt::from(receipt);
                    debug!(
                        hash = %hash,
                        success = receipt.success,
                        block = ?receipt.block_number,
                        "receipt received"
                    );
                    return Ok(receipt);
                }
                Ok(None) => {}
                // Node errors are retried until the timeout.
                Err(err) => warn!(hash = %hash, error = %err, "receipt poll failed"),
            }

            if waited >= self.timeout {
                warn!(hash = %hash, waited_secs = waited.as_secs(), "confirmation timed out");
                return Err(MachinaError::ConfirmationTimeout { hash });
            }
            self.time.sleep(self.interval).await;
            waited += self.interval;
        }
    }
}
