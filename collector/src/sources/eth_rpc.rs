//! Ethereum JSON-RPC client and the sources built on it.
//!
//! Only two methods are needed, both returning hex-encoded quantities:
//!
//! ```json
//! { "jsonrpc": "2.0", "id": 1, "method": "eth_blockNumber", "params": [] }
//!
//! Response:
//! { "jsonrpc": "2.0", "id": 1, "result": "0x121eac8" }
//! ```
//!
//! The request is POSTed for `http(s)://` endpoints and sent as a text frame
//! over a short-lived WebSocket connection for `ws(s)://` endpoints.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::{Source, WEI_DECIMALS, ensure_success, scale_down};
use crate::error::SourceError;

/// How requests reach the node.
enum Transport {
    Http(Client),
    /// One connection per call, bounded by `timeout`.
    WebSocket { timeout: Duration },
}

/// Minimal async JSON-RPC client for an Ethereum node.
pub struct EthRpcClient {
    url: String,
    transport: Transport,
    next_id: AtomicU64,
}

impl EthRpcClient {
    /// Constructs a client for the node at `url` (HTTP or HTTPS).
    pub fn new(url: impl Into<String>, client: Client) -> Self {
        Self::with_transport(url.into(), Transport::Http(client))
    }

    /// Constructs a client for a `ws://` or `wss://` node endpoint.
    pub fn websocket(url: impl Into<String>, timeout: Duration) -> Self {
        Self::with_transport(url.into(), Transport::WebSocket { timeout })
    }

    /// Picks the transport from the URL scheme.
    pub fn for_url(url: impl Into<String>, client: Client, timeout: Duration) -> Self {
        let url = url.into();
        if is_websocket_url(&url) {
            Self::websocket(url, timeout)
        } else {
            Self::new(url, client)
        }
    }

    fn with_transport(url: String, transport: Transport) -> Self {
        Self {
            url,
            transport,
            next_id: AtomicU64::new(1),
        }
    }

    /// `eth_blockNumber`
    pub async fn block_number(&self) -> Result<u64, SourceError> {
        let raw = self.call("eth_blockNumber", json!([])).await?;
        let height = parse_quantity(&raw)?;
        u64::try_from(height)
            .map_err(|_| SourceError::Data(format!("block number {raw} does not fit in u64")))
    }

    /// `eth_getBalance(address, "latest")`, in wei.
    pub async fn balance(&self, address: &str) -> Result<u128, SourceError> {
        let raw = self
            .call("eth_getBalance", json!([address, "latest"]))
            .await?;
        parse_quantity(&raw)
    }

    async fn call(&self, method: &str, params: Value) -> Result<String, SourceError> {
        let req = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let body = match &self.transport {
            Transport::Http(client) => self.call_http(client, &req).await?,
            Transport::WebSocket { timeout } => self.call_ws(*timeout, &req).await?,
        };

        if let Some(err) = body.error {
            return Err(SourceError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        body.result
            .ok_or_else(|| SourceError::Data(format!("{method} response has no result")))
    }

    async fn call_http(
        &self,
        client: &Client,
        req: &RpcRequest<'_>,
    ) -> Result<RpcResponse, SourceError> {
        let resp = client
            .post(&self.url)
            .json(req)
            .send()
            .await
            .map_err(|e| {
                SourceError::Transport(format!("{} via {} failed: {e}", req.method, self.url))
            })?;
        Ok(ensure_success(resp, &self.url)?.json().await?)
    }

    async fn call_ws(
        &self,
        timeout: Duration,
        req: &RpcRequest<'_>,
    ) -> Result<RpcResponse, SourceError> {
        let payload = serde_json::to_string(req)
            .map_err(|e| SourceError::Data(format!("failed to encode {}: {e}", req.method)))?;
        let transport_err = |e: tokio_tungstenite::tungstenite::Error| {
            SourceError::Transport(format!("{} via {} failed: {e}", req.method, self.url))
        };

        let exchange = async {
            let (mut ws, _) = connect_async(self.url.as_str()).await.map_err(transport_err)?;
            ws.send(Message::Text(payload)).await.map_err(transport_err)?;

            while let Some(msg) = ws.next().await {
                match msg.map_err(transport_err)? {
                    Message::Text(text) => {
                        let resp: RpcResponse = serde_json::from_str(&text).map_err(|e| {
                            SourceError::Data(format!("malformed {} response: {e}", req.method))
                        })?;
                        // Skip anything that is not the answer to this request.
                        if resp.id == Some(req.id) {
                            let _ = ws.close(None).await;
                            return Ok(resp);
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Err(SourceError::Transport(format!(
                "{} closed before answering {}",
                self.url, req.method
            )))
        };

        tokio::time::timeout(timeout, exchange).await.map_err(|_| {
            SourceError::Transport(format!(
                "{} via {} timed out after {}s",
                req.method,
                self.url,
                timeout.as_secs()
            ))
        })?
    }
}

/// True for `ws://` and `wss://` URLs.
pub fn is_websocket_url(url: &str) -> bool {
    url.starts_with("ws://") || url.starts_with("wss://")
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    id: Option<u64>,
    result: Option<String>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Parses a `0x`-prefixed hex quantity.
fn parse_quantity(raw: &str) -> Result<u128, SourceError> {
    let digits = raw
        .strip_prefix("0x")
        .ok_or_else(|| SourceError::Data(format!("quantity {raw:?} is not 0x-prefixed")))?;
    u128::from_str_radix(digits, 16)
        .map_err(|e| SourceError::Data(format!("quantity {raw:?} is not valid hex: {e}")))
}

/// Current block height of a node.
pub struct BlockHeight {
    client: Arc<EthRpcClient>,
}

impl BlockHeight {
    pub fn new(client: Arc<EthRpcClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Source for BlockHeight {
    async fn fetch(&self) -> Result<f64, SourceError> {
        Ok(self.client.block_number().await? as f64)
    }
}

/// Balance of an account, converted from wei to ether.
pub struct EthBalance {
    client: Arc<EthRpcClient>,
    address: String,
}

impl EthBalance {
    pub fn new(client: Arc<EthRpcClient>, address: impl Into<String>) -> Self {
        Self {
            client,
            address: address.into(),
        }
    }
}

#[async_trait]
impl Source for EthBalance {
    async fn fetch(&self) -> Result<f64, SourceError> {
        let wei = self.client.balance(&self.address).await?;
        Ok(scale_down(wei, WEI_DECIMALS))
    }
}
