//! JSON-RPC 2.0 transport.
//!
//! Every failure surfaces as a [`ProviderError`]: error objects returned by
//! the node keep their `{code, message}`, transport and decoding faults carry
//! no code.

use async_trait::async_trait;
use machina_core::{MachinaError, MachinaResult, OperatorCredential, ProviderError};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Default per-request HTTP timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends one JSON-RPC request and returns its `result`.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError>;
}

/// Typed call over any transport.
pub async fn call<R: DeserializeOwned>(
    transport: &dyn RpcTransport,
    method: &str,
    params: Value,
) -> Result<R, ProviderError> {
    let result = transport.request(method, params).await?;
    serde_json::from_value(result)
        .map_err(|e| ProviderError::message(format!("malformed {method} result: {e}")))
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

/// Extract the `result` of a response body, or its error object.
///
/// Nodes often put the revert reason in `error.data`; it is appended to the
/// message so classification sees it.
pub fn parse_response(body: Value) -> Result<Value, ProviderError> {
    let response: RpcResponse = serde_json::from_value(body)
        .map_err(|e| ProviderError::message(format!("invalid JSON-RPC response: {e}")))?;

    if let Some(error) = response.error {
        let detail = match &error.data {
            Some(Value::String(data)) => Some(data.clone()),
            Some(Value::Object(data)) => data
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        };
        let message = match detail {
            Some(detail) if !error.message.contains(&detail) => {
                format!("{}: {detail}", error.message)
            }
            _ => error.message,
        };
        return Err(ProviderError::new(Some(error.code), message));
    }

    Ok(response.result.unwrap_or(Value::Null))
}

/// JSON-RPC over HTTP POST.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    credential: Option<OperatorCredential>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("url", &self.url)
            .field("authenticated", &self.credential.is_some())
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    pub fn new(url: impl Into<String>) -> MachinaResult<Self> {
        Self::with_timeout(url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> MachinaResult<Self> {
        let url = url.into();
        if url.is_empty() {
            return Err(MachinaError::config("JSON-RPC endpoint URL cannot be empty"));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MachinaError::config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            url,
            credential: None,
            next_id: AtomicU64::new(1),
        })
    }

    /// Send `credential` as a bearer token on every request.
    pub fn with_credential(mut self, credential: OperatorCredential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn shared(self) -> Arc<dyn RpcTransport> {
        Arc::new(self)
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        trace!(id, method, url = %self.url, "JSON-RPC request");

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(credential) = &self.credential {
            request = request.bearer_auth(credential.expose());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::message(format!("{method} request failed: {e}")))?;
        let status = response.status();
        let body: Value = response.json().await.map_err(|e| {
            ProviderError::message(format!("{method} returned unreadable body ({status}): {e}"))
        })?;

        let result = parse_response(body);
        if let Err(err) = &result {
            debug!(id, method, error = %err, "JSON-RPC error");
        }
        result
    }
}
