//! HTTP implementations of the transport traits, built on `reqwest`.
//!
//! Every request carries the client-wide timeout, so no call can hang a
//! broadcast or reconciliation pass.

use async_trait::async_trait;
use std::time::Duration;

use super::peer::{Peer, PeerInfo};
use super::transport::{ChainResponse, PeerRegistry, PeerTransport, TransportError, TransportResult};
use crate::ledger::block::Block;

pub const RECEIVE_BLOCK_PATH: &str = "/api/p2p/receive-block";
pub const GET_CHAIN_PATH: &str = "/api/p2p/get-chain";
pub const HEALTH_PATH: &str = "/api/health";

fn build_client(timeout: Duration) -> TransportResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| TransportError::Network(format!("HTTP client error: {}", e)))
}

fn classify(timeout: Duration) -> impl Fn(reqwest::Error) -> TransportError {
    move |e| {
        if e.is_timeout() {
            TransportError::Timeout(timeout.as_millis() as u64)
        } else if e.is_decode() {
            TransportError::Decode(e.to_string())
        } else {
            TransportError::Network(e.to_string())
        }
    }
}

fn ensure_success(response: &reqwest::Response) -> TransportResult<()> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(TransportError::Status(status.as_u16()))
    }
}

/// Node-to-node transport over the peers' HTTP adapters.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> TransportResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            timeout,
        })
    }
}

#[async_trait]
impl PeerTransport for HttpTransport {
    async fn push_block(&self, peer: &Peer, block: &Block) -> TransportResult<()> {
        let url = format!("{}{}", peer.base_url(), RECEIVE_BLOCK_PATH);
        let response = self
            .client
            .post(&url)
            .json(block)
            .send()
            .await
            .map_err(classify(self.timeout))?;
        ensure_success(&response)
    }

    async fn fetch_chain(&self, peer: &Peer) -> TransportResult<Vec<Block>> {
        let url = format!("{}{}", peer.base_url(), GET_CHAIN_PATH);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(classify(self.timeout))?;
        ensure_success(&response)?;

        let body: ChainResponse = response.json().await.map_err(classify(self.timeout))?;
        Ok(body.chain)
    }

    async fn probe(&self, peer: &Peer) -> TransportResult<()> {
        let url = format!("{}{}", peer.base_url(), HEALTH_PATH);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(classify(self.timeout))?;
        ensure_success(&response)
    }
}

/// Discovery registry client.
///
/// Paths: `POST {base}/register`, `GET {base}/peers`,
/// `DELETE {base}/unregister/{id}`.
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpRegistry {
    pub fn new(base_url: &str, timeout: Duration) -> TransportResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl PeerRegistry for HttpRegistry {
    async fn register(&self, info: &PeerInfo) -> TransportResult<()> {
        let response = self
            .client
            .post(format!("{}/register", self.base_url))
            .json(info)
            .send()
            .await
            .map_err(classify(self.timeout))?;
        ensure_success(&response)
    }

    async fn list_peers(&self) -> TransportResult<Vec<PeerInfo>> {
        let response = self
            .client
            .get(format!("{}/peers", self.base_url))
            .send()
            .await
            .map_err(classify(self.timeout))?;
        ensure_success(&response)?;
        response.json().await.map_err(classify(self.timeout))
    }

    async fn unregister(&self, id: &str) -> TransportResult<()> {
        let response = self
            .client
            .delete(format!("{}/unregister/{}", self.base_url, id))
            .send()
            .await
            .map_err(classify(self.timeout))?;
        ensure_success(&response)
    }
}
