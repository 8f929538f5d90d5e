//! Machina RPC - production effect handlers
//!
//! Implements the `machina-core` effect traits over JSON-RPC:
//!
//! - [`RpcChainReader`]: `eth_call` and `eth_getBalance` against the node
//! - [`RpcWallet`]: account methods of a signer endpoint
//! - [`ReceiptPoller`]: `eth_getTransactionReceipt` with a confirmation timeout
//! - [`RealTime`]: tokio timer
//!
//! [`connect`] assembles them into [`MachinaEffects`] from configuration. The
//! operator signer is authenticated with the credential read from the
//! configured environment variable.

#![allow(missing_docs)]
#![forbid(unsafe_code)]

pub mod chain;
pub mod receipts;
pub mod time;
pub mod transport;
pub mod wallet;

pub use chain::RpcChainReader;
pub use receipts::{ReceiptPoller, RpcReceipt};
pub use time::RealTime;
pub use transport::{parse_response, HttpTransport, RpcTransport};
pub use wallet::RpcWallet;

use alloy_primitives::Address;
use machina_core::{MachinaConfig, MachinaEffects, MachinaError, MachinaResult, OperatorCredential};
use std::sync::Arc;
use tracing::info;

/// Reader for the configured node, for read-only use.
pub fn chain_reader(config: &MachinaConfig) -> MachinaResult<RpcChainReader> {
    Ok(RpcChainReader::new(
        HttpTransport::new(&config.network.rpc_url)?.shared(),
    ))
}

/// Build the full effect set.
///
/// The user wallet signs through the node at `network.rpc_url` for `user`
/// (or the node's first account). The operator wallet signs through
/// `operator.signer_url`, which is required.
pub async fn connect(
    config: &MachinaConfig,
    user: Option<Address>,
) -> MachinaResult<MachinaEffects> {
    let node = HttpTransport::new(&config.network.rpc_url)?.shared();

    let signer_url = config
        .operator
        .signer_url
        .as_deref()
        .ok_or_else(|| MachinaError::config("operator.signer_url is required to submit"))?;
    let credential = OperatorCredential::from_env(&config.operator.credential_env)?;
    let signer = HttpTransport::new(signer_url)?
        .with_credential(credential)
        .shared();

    let wallet = RpcWallet::connect(node.clone(), user).await?;
    let operator = RpcWallet::connect(signer, None).await?;
    if operator.account().is_none() {
        return Err(MachinaError::config("operator signer exposes no account"));
    }

    let time = Arc::new(RealTime);
    let receipts = ReceiptPoller::new(
        node.clone(),
        time.clone(),
        config.network.confirmation_timeout(),
        config.network.receipt_poll_interval(),
    );
    info!(rpc = %config.network.rpc_url, chain_id = config.network.chain_id, "connected effects");

    Ok(MachinaEffects {
        chain: Arc::new(RpcChainReader::new(node)),
        receipts: Arc::new(receipts),
        wallet: Arc::new(wallet),
        operator: Arc::new(operator),
        time,
    })
}
