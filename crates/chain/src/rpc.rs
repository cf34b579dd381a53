//! JSON-RPC 2.0 backend over HTTP.
//!
//! Talks to a node fronted by a decoding gateway: the `gateway_*` methods
//! serve storage as JSON, encode calls and report signing parameters and
//! transaction status. The node's own `system_*`, `rpc_*`, `oracle_*` and
//! `author_*` methods pass through unchanged. Endpoints that do not serve
//! the gateway methods are skipped at connect time. WebSocket endpoints are
//! rewritten to their HTTP equivalents.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::backend::{ChainBackend, StorageEntry, StorageQuery, TxStatus, TxSubscription};
use crate::error::{ChainError, Result};
use crate::extrinsic::{Extrinsic, SigningParams};
use crate::types::{AccountId, Call, StorageKey, H256};

/// Default interval between transaction status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Methods an endpoint must serve to be usable.
pub const REQUIRED_METHODS: &[&str] = &[
    "gateway_storage",
    "gateway_storageEntries",
    "gateway_storagePaged",
    "gateway_encodeCall",
    "gateway_signingParams",
    "gateway_txStatus",
    "author_submitExtrinsic",
];

#[derive(Debug, Deserialize)]
struct RpcMethods {
    methods: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

/// Rewrite `ws://` and `wss://` to `http://` and `https://`.
pub fn http_url(endpoint: &str) -> String {
    if let Some(rest) = endpoint.strip_prefix("wss://") {
        format!("https://{rest}")
    } else if let Some(rest) = endpoint.strip_prefix("ws://") {
        format!("http://{rest}")
    } else {
        endpoint.to_string()
    }
}

/// HTTP JSON-RPC connection to a single endpoint.
#[derive(Debug)]
pub struct HttpBackend {
    client: reqwest::Client,
    endpoint: String,
    url: String,
    chain: String,
    next_id: AtomicU64,
    poll_interval: Duration,
}

impl HttpBackend {
    /// Connect to the first endpoint that answers `system_chain` and serves
    /// every method in [`REQUIRED_METHODS`].
    pub async fn connect(endpoints: &[String]) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ChainError::Connection(e.to_string()))?;
        Self::connect_with(client, endpoints).await
    }

    /// [`HttpBackend::connect`] over a caller-built HTTP client.
    #[instrument(skip_all, fields(count = endpoints.len()))]
    pub async fn connect_with(client: reqwest::Client, endpoints: &[String]) -> Result<Self> {
        for endpoint in endpoints {
            let mut backend = Self {
                client: client.clone(),
                endpoint: endpoint.clone(),
                url: http_url(endpoint),
                chain: String::new(),
                next_id: AtomicU64::new(1),
                poll_interval: DEFAULT_POLL_INTERVAL,
            };
            match backend.handshake().await {
                Ok(chain) => {
                    backend.chain = chain;
                    info!(endpoint = %endpoint, chain = %backend.chain, "Connected");
                    return Ok(backend);
                }
                Err(e) => warn!(endpoint = %endpoint, error = %e, "Endpoint unavailable, trying next"),
            }
        }
        Err(ChainError::Connection(format!(
            "none of {} endpoints answered with the gateway methods",
            endpoints.len()
        )))
    }

    /// Health check: chain name, then the method list.
    async fn handshake(&self) -> Result<String> {
        let chain = self.request("system_chain", json!([])).await?;
        let methods: RpcMethods = Self::decode("rpc_methods", self.request("rpc_methods", json!([])).await?)?;
        let missing: Vec<&str> = REQUIRED_METHODS
            .iter()
            .copied()
            .filter(|m| !methods.methods.iter().any(|have| have == m))
            .collect();
        if !missing.is_empty() {
            return Err(ChainError::Connection(format!(
                "not a gateway endpoint, missing {}",
                missing.join(", ")
            )));
        }
        Ok(chain.as_str().unwrap_or_default().to_string())
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Chain name reported by the node.
    pub fn chain(&self) -> &str {
        &self.chain
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        debug!(method, id, "RPC request");

        let response: RpcResponse = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match (response.result, response.error) {
            (_, Some(e)) => Err(ChainError::Rpc { code: e.code, message: e.message }),
            (Some(result), None) => Ok(result),
            (None, None) => Ok(Value::Null),
        }
    }

    fn decode<T: serde::de::DeserializeOwned>(method: &str, value: Value) -> Result<T> {
        serde_json::from_value(value).map_err(|e| ChainError::Decode(format!("{method}: {e}")))
    }
}

#[async_trait]
impl ChainBackend for HttpBackend {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn storage(&self, query: &StorageQuery) -> Result<Option<Value>> {
        let result = self
            .request("gateway_storage", json!([query.pallet, query.item, query.keys]))
            .await?;
        Ok(match result {
            Value::Null => None,
            v => Some(v),
        })
    }

    async fn storage_entries(&self, query: &StorageQuery) -> Result<Vec<StorageEntry>> {
        let result = self
            .request("gateway_storageEntries", json!([query.pallet, query.item, query.keys]))
            .await?;
        Self::decode("gateway_storageEntries", result)
    }

    async fn storage_entries_paged(
        &self,
        query: &StorageQuery,
        page_size: u32,
        start_key: Option<&StorageKey>,
    ) -> Result<Vec<StorageEntry>> {
        let result = self
            .request(
                "gateway_storagePaged",
                json!([query.pallet, query.item, query.keys, page_size, start_key]),
            )
            .await?;
        Self::decode("gateway_storagePaged", result)
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Value> {
        self.request(method, params).await
    }

    async fn encode_call(&self, call: &Call) -> Result<Vec<u8>> {
        let result = self.request("gateway_encodeCall", json!([call])).await?;
        let encoded: String = Self::decode("gateway_encodeCall", result)?;
        hex::decode(encoded.trim_start_matches("0x"))
            .map_err(|e| ChainError::Decode(format!("gateway_encodeCall: {e}")))
    }

    async fn signing_params(&self, signer: &AccountId) -> Result<SigningParams> {
        let result = self.request("gateway_signingParams", json!([signer])).await?;
        Self::decode("gateway_signingParams", result)
    }

    async fn submit_and_watch(&self, extrinsic: &Extrinsic) -> Result<TxSubscription> {
        let result = self
            .request("author_submitExtrinsic", json!([extrinsic.to_hex()]))
            .await
            .map_err(|e| match e {
                ChainError::Rpc { code, message } => ChainError::Submission(format!("{code}: {message}")),
                other => other,
            })?;
        let hash: H256 = Self::decode("author_submitExtrinsic", result)?;
        if hash != extrinsic.hash() {
            warn!(%hash, local = %extrinsic.hash(), "Node reported a different extrinsic hash");
        }

        let statuses = poll_statuses(
            self.client.clone(),
            self.url.clone(),
            hash,
            self.poll_interval,
        );
        Ok(TxSubscription { hash, nonce: extrinsic.nonce(), statuses })
    }
}

async fn fetch_status(client: &reqwest::Client, url: &str, hash: H256) -> Result<RpcResponse> {
    let body = json!({"jsonrpc": "2.0", "id": 1, "method": "gateway_txStatus", "params": [hash]});
    Ok(client.post(url).json(&body).send().await?.json().await?)
}

/// Poll `gateway_txStatus`, yielding each status once when it changes and
/// ending after a failure or `Finalized`.
fn poll_statuses(
    client: reqwest::Client,
    url: String,
    hash: H256,
    interval: Duration,
) -> futures::stream::BoxStream<'static, Result<TxStatus>> {
    struct Poll {
        client: reqwest::Client,
        url: String,
        last: Option<TxStatus>,
        done: bool,
    }

    let init = Poll { client, url, last: None, done: false };
    stream::unfold(init, move |mut state| async move {
        if state.done {
            return None;
        }
        loop {
            let fetched = fetch_status(&state.client, &state.url, hash).await;

            let status = match fetched {
                Ok(RpcResponse { error: Some(e), .. }) => {
                    state.done = true;
                    return Some((Err(ChainError::Rpc { code: e.code, message: e.message }), state));
                }
                Ok(RpcResponse { result, .. }) => result.filter(|v| !v.is_null()),
                Err(e) => {
                    state.done = true;
                    return Some((Err(e), state));
                }
            };

            if let Some(raw) = status {
                let status: TxStatus = match serde_json::from_value(raw) {
                    Ok(s) => s,
                    Err(e) => {
                        state.done = true;
                        return Some((Err(e.into()), state));
                    }
                };
                if state.last.as_ref() != Some(&status) {
                    state.done = status.is_terminal_failure() || status.is_finalized();
                    state.last = Some(status.clone());
                    return Some((Ok(status), state));
                }
            }
            tokio::time::sleep(interval).await;
        }
    })
    .boxed()
}
