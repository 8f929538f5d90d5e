//! Effect handlers against a scripted JSON-RPC transport.

use alloy_primitives::{Address, Bytes, B256, U256};
use assert_matches::assert_matches;
use async_trait::async_trait;
use machina_core::{
    ChainReadEffects, MachinaError, ProviderError, ReceiptEffects, TxRequest, WalletEffects,
};
use machina_rpc::{ReceiptPoller, RpcChainReader, RpcTransport, RpcWallet};
use machina_testkit::InstantTime;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<Value, ProviderError>>>,
    requests: Mutex<Vec<(String, Value)>>,
}

impl ScriptedTransport {
    fn new(responses: Vec<Result<Value, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl RpcTransport for ScriptedTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        self.requests.lock().push((method.to_string(), params));
        self.responses.lock().pop_front().unwrap_or(Ok(Value::Null))
    }
}

const ACCOUNT: Address = Address::repeat_byte(0x11);
const CONTRACT: Address = Address::repeat_byte(0xaa);

fn receipt_json(hash: B256, status: &str) -> Value {
    json!({
        "transactionHash": hash,
        "status": status,
        "blockNumber": "0x10",
        "gasUsed": "0x5208",
    })
}

#[tokio::test]
async fn eth_call_targets_latest_block() {
    let transport = ScriptedTransport::new(vec![Ok(json!("0x0102"))]);
    let reader = RpcChainReader::new(transport.clone());

    let result = reader
        .call(CONTRACT, Bytes::from(vec![0xde, 0xad]))
        .await
        .unwrap();

    assert_eq!(result, Bytes::from(vec![0x01, 0x02]));
    let (method, params) = &transport.requests()[0];
    assert_eq!(method, "eth_call");
    assert_eq!(params[1], json!("latest"));
    assert_eq!(params[0]["data"], json!("0xdead"));
}

#[tokio::test]
async fn balance_is_parsed_from_quantity() {
    let transport = ScriptedTransport::new(vec![Ok(json!("0xde0b6b3a7640000"))]);
    let reader = RpcChainReader::new(transport);

    let balance = reader.native_balance(ACCOUNT).await.unwrap();
    assert_eq!(balance, U256::from(1_000_000_000_000_000_000u128));
}

#[tokio::test]
async fn read_errors_pass_through_unclassified() {
    let transport = ScriptedTransport::new(vec![Err(ProviderError::new(
        Some(-32000),
        "execution reverted",
    ))]);
    let reader = RpcChainReader::new(transport);

    let err = reader.call(CONTRACT, Bytes::new()).await.unwrap_err();
    assert_eq!(err.code, Some(-32000));
}

#[tokio::test]
async fn wallet_binds_requested_account() {
    let other = Address::repeat_byte(0x22);
    let transport = ScriptedTransport::new(vec![
        Ok(json!([other, ACCOUNT])),
        Ok(json!([other])),
    ]);

    let wallet = RpcWallet::connect(transport.clone(), Some(ACCOUNT))
        .await
        .unwrap();
    assert_eq!(wallet.connected_account().await, Some(ACCOUNT));

    let missing = RpcWallet::connect(transport, Some(ACCOUNT)).await.unwrap();
    assert_eq!(missing.connected_account().await, None);
}

#[tokio::test]
async fn wallet_chain_methods() {
    let transport = ScriptedTransport::new(vec![Ok(json!("0xd0a")), Ok(Value::Null)]);
    let wallet = RpcWallet::new(transport.clone(), Some(ACCOUNT));

    assert_eq!(wallet.chain_id().await.unwrap(), 3338);
    wallet.switch_chain(3338).await.unwrap();

    let (method, params) = &transport.requests()[1];
    assert_eq!(method, "wallet_switchEthereumChain");
    assert_eq!(params[0]["chainId"], json!("0xd0a"));
}

#[tokio::test]
async fn transfer_is_sent_without_data() {
    let hash = B256::repeat_byte(0x42);
    let transport = ScriptedTransport::new(vec![Ok(json!(hash))]);
    let wallet = RpcWallet::new(transport.clone(), Some(ACCOUNT));

    let sent = wallet
        .send_transaction(TxRequest::transfer(CONTRACT, U256::from(16u64)))
        .await
        .unwrap();

    assert_eq!(sent, hash);
    let (method, params) = &transport.requests()[0];
    assert_eq!(method, "eth_sendTransaction");
    assert_eq!(params[0]["value"], json!("0x10"));
    assert!(params[0].get("data").is_none());
}

#[tokio::test]
async fn disconnected_wallet_refuses_to_send() {
    let transport = ScriptedTransport::new(vec![]);
    let wallet = RpcWallet::new(transport.clone(), None);

    let err = wallet
        .send_transaction(TxRequest::call(CONTRACT, Bytes::new()))
        .await
        .unwrap_err();
    assert_eq!(err.code, Some(4100));
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn poller_waits_for_receipt() {
    let hash = B256::repeat_byte(0x01);
    let transport = ScriptedTransport::new(vec![
        Ok(Value::Null),
        Err(ProviderError::message("connection reset")),
        Ok(receipt_json(hash, "0x1")),
    ]);
    let time = InstantTime::new();
    let poller = ReceiptPoller::new(
        transport,
        Arc::new(time.clone()),
        Duration::from_secs(300),
        Duration::from_secs(2),
    );

    let receipt = poller.wait_for_receipt(hash).await.unwrap();

    assert!(receipt.success);
    assert_eq!(receipt.block_number, Some(16));
    assert_eq!(receipt.gas_used, Some(21_000));
    assert_eq!(time.sleeps(), vec![Duration::from_secs(2); 2]);
}

#[tokio::test]
async fn failed_status_is_reported() {
    let hash = B256::repeat_byte(0x02);
    let transport = ScriptedTransport::new(vec![Ok(receipt_json(hash, "0x0"))]);
    let poller = ReceiptPoller::new(
        transport,
        Arc::new(InstantTime::new()),
        Duration::from_secs(300),
        Duration::from_secs(2),
    );

    assert!(!poller.wait_for_receipt(hash).await.unwrap().success);
}

#[tokio::test]
async fn poller_gives_up_after_timeout() {
    let hash = B256::repeat_byte(0x03);
    let transport = ScriptedTransport::new(vec![]);
    let time = InstantTime::new();
    let poller = ReceiptPoller::new(
        transport,
        Arc::new(time.clone()),
        Duration::from_secs(10),
        Duration::from_secs(2),
    );

    assert_matches!(
        poller.wait_for_receipt(hash).await,
        Err(MachinaError::ConfirmationTimeout { hash: h }) if h == hash
    );
    assert_eq!(time.elapsed(), Duration::from_secs(10));
}
