//! The minimal HTTP surface the transaction builder and upload engine call
//! on their network collaborator.
//!
//! Grounded on `race-transport::TransportT`, the workspace's other
//! async-trait network-collaborator interface (RPC verbs over an on-chain
//! transport rather than HTTP, but the same "trait object standing in for a
//! live service" shape), and on `race-storage::arweave::Arweave`, which
//! builds its HTTP calls directly on `reqwest`.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Recommended source of the `last_tx` anchor for format-2 transactions.
const ANCHOR_PATH: &str = "tx_anchor";

/// Base URL and per-call timeout for a [`NetworkAdapter`] implementation.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://arweave.net/".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// A response the core reasons about directly: a status code plus the raw
/// response body. Callers parse JSON bodies themselves, since the shape
/// differs per endpoint.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Parses the body as JSON and reads its `error` key as a string, per
    /// the fatal-chunk-error detection rule: a field access on a parsed
    /// response body, not a raw string comparison.
    pub fn error_code(&self) -> Option<String> {
        let parsed: Value = serde_json::from_slice(&self.body).ok()?;
        parsed.get("error")?.as_str().map(str::to_owned)
    }
}

/// The network calls the transaction builder and upload engine need from
/// their collaborator. Implementations may be backed by a live HTTP client
/// or, in tests, by a fake that returns scripted responses.
#[async_trait]
pub trait NetworkAdapter: Send + Sync {
    /// `GET /tx_anchor` — opaque base64 string used as `last_tx`.
    async fn get_anchor(&self) -> Result<String>;

    /// `GET /price/{bytes}[/{target}]` — winston decimal string.
    async fn get_price(&self, bytes: u64, target: Option<&str>) -> Result<String>;

    /// `POST /tx` with a JSON body.
    async fn post_tx(&self, body: &Value) -> Result<HttpResponse>;

    /// `POST /chunk` with a JSON body.
    async fn post_chunk(&self, body: &Value) -> Result<HttpResponse>;

    /// `GET /tx/{id}` — the format-2 wire JSON of a previously-submitted
    /// transaction.
    async fn get_tx(&self, id: &str) -> Result<Value>;

    /// `GET /tx/{id}/status`.
    async fn get_tx_status(&self, id: &str) -> Result<HttpResponse>;

    /// `GET /tx/{id}/offset`.
    async fn get_tx_offset(&self, id: &str) -> Result<HttpResponse>;

    /// `GET /chunk/{offset}`.
    async fn get_chunk(&self, offset: u64) -> Result<HttpResponse>;
}

/// [`NetworkAdapter`] backed by a real `reqwest` client.
pub struct ReqwestAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestAdapter {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, base_url: config.base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn get(&self, path: &str) -> Result<HttpResponse> {
        let resp = self.client.get(self.url(path)).send().await.map_err(map_transport_err)?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(map_transport_err)?.to_vec();
        Ok(HttpResponse { status, body })
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<HttpResponse> {
        let resp = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(map_transport_err)?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(map_transport_err)?.to_vec();
        Ok(HttpResponse { status, body })
    }
}

/// DNS, connect, TLS, and timeout failures are all surfaced as the same
/// retryable `Transport` kind — the upload engine backs off and retries
/// regardless of which one occurred.
fn map_transport_err(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Transport("timeout".to_string())
    } else {
        Error::Transport(e.to_string())
    }
}

#[async_trait]
impl NetworkAdapter for ReqwestAdapter {
    async fn get_anchor(&self) -> Result<String> {
        let resp = self.get(ANCHOR_PATH).await?;
        Ok(resp.body_str())
    }

    async fn get_price(&self, bytes: u64, target: Option<&str>) -> Result<String> {
        let path = match target {
            Some(t) => format!("price/{bytes}/{t}"),
            None => format!("price/{bytes}"),
        };
        let resp = self.get(&path).await?;
        Ok(resp.body_str())
    }

    async fn post_tx(&self, body: &Value) -> Result<HttpResponse> {
        self.post_json("tx", body).await
    }

    async fn post_chunk(&self, body: &Value) -> Result<HttpResponse> {
        self.post_json("chunk", body).await
    }

    async fn get_tx(&self, id: &str) -> Result<Value> {
        let resp = self.get(&format!("tx/{id}")).await?;
        Ok(serde_json::from_slice(&resp.body)?)
    }

    async fn get_tx_status(&self, id: &str) -> Result<HttpResponse> {
        self.get(&format!("tx/{id}/status")).await
    }

    async fn get_tx_offset(&self, id: &str) -> Result<HttpResponse> {
        self.get(&format!("tx/{id}/offset")).await
    }

    async fn get_chunk(&self, offset: u64) -> Result<HttpResponse> {
        self.get(&format!("chunk/{offset}")).await
    }
}
