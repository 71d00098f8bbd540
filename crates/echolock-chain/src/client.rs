//! HTTP client for the chain-explorer REST interface.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use echolock_primitives::kind::ErrorKind;

#[derive(Error, Debug)]
pub enum ExplorerError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("explorer returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response shape: {0}")]
    Decode(String),
}

impl ExplorerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExplorerError::Request(_) => ErrorKind::Transient,
            ExplorerError::Status { status, .. } if *status >= 500 => ErrorKind::Transient,
            ExplorerError::Status { .. } => ErrorKind::Permanent,
            ExplorerError::Decode(_) => ErrorKind::Permanent,
        }
    }

    /// Explorer error strings the spec calls out as non-retryable:
    /// the broadcast can never succeed by trying again.
    pub fn is_non_retryable_broadcast_rejection(&self) -> bool {
        if let ExplorerError::Status { body, .. } = self {
            let lower = body.to_lowercase();
            return lower.contains("missing inputs")
                || lower.contains("already spent")
                || lower.contains("already in mempool")
                || lower.contains("conflict");
        }
        false
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxStatusResponse {
    pub confirmed: bool,
    pub block_height: Option<u32>,
    pub block_hash: Option<String>,
    pub block_time: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TxInfo {
    pub status: TxStatusResponse,
    pub fee: u64,
    pub size: u64,
    pub weight: u64,
}

pub struct ExplorerClient {
    base_url: String,
    http: reqwest::Client,
    timeout: Duration,
}

impl ExplorerClient {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// `POST /tx` with the raw transaction hex as body. Returns the TXID
    /// string on success.
    pub async fn broadcast(&self, tx_hex: &str) -> Result<String, ExplorerError> {
        let url = format!("{}/tx", self.base_url);
        let resp = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .body(tx_hex.to_string())
            .send()
            .await
            .map_err(|e| ExplorerError::Request(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ExplorerError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(ExplorerError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(body.trim().to_string())
    }

    /// `GET /tx/{txid}` confirmation and fee detail.
    pub async fn get_tx(&self, txid: &str) -> Result<TxInfo, ExplorerError> {
        let url = format!("{}/tx/{}", self.base_url, txid);
        let resp = self
            .http
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ExplorerError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ExplorerError::Status {
                status: status.as_u16(),
                body,
            });
        }

        resp.json::<TxInfo>()
            .await
            .map_err(|e| ExplorerError::Decode(e.to_string()))
    }

    /// `GET /blocks/tip/height` current chain tip.
    pub async fn tip_height(&self) -> Result<u32, ExplorerError> {
        let url = format!("{}/blocks/tip/height", self.base_url);
        let resp = self
            .http
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ExplorerError::Request(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ExplorerError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(ExplorerError::Status {
                status: status.as_u16(),
                body,
            });
        }

        body.trim()
            .parse::<u32>()
            .map_err(|e| ExplorerError::Decode(e.to_string()))
    }
}
