//! Relay client
//!
//! JSON-RPC transport to the block-builder relay: `sendBundle` to submit and
//! `getBundleStatuses` to poll. The trait seam exists so the coordinator and
//! the integration tests can run against [`MockRelay`] without a network.
//!
//! Submission goes to the primary relay; mirror relays receive a best-effort
//! copy whose failures are logged and otherwise ignored. Only the primary's
//! receipt drives bundle state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use sentinel_config::RelayConfig;
use sentinel_types::{BundleId, RelayError};

/// Opaque relay-side identifier returned by a successful submission.
pub type ReceiptId = String;

/// Relay-reported disposition of a submitted bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayStatus {
    /// Known to the relay, not yet landed.
    Pending,
    /// Landed in the given slot.
    Included { slot: u64 },
    /// Definitively rejected.
    Rejected { reason: String },
}

/// Wire form of a bundle: opaque signed payloads, hex-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayBundle {
    pub id: BundleId,
    pub payloads: Vec<String>,
    pub target_slot: u64,
    pub tip: u64,
}

#[async_trait]
pub trait RelayClient: Send + Sync {
    /// Submit a bundle; returns the relay's receipt id.
    async fn submit_bundle(&self, bundle: &RelayBundle) -> Result<ReceiptId, RelayError>;

    /// Poll the disposition of a previously submitted bundle.
    async fn poll_status(&self, receipt: &ReceiptId) -> Result<RelayStatus, RelayError>;
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// reqwest-backed relay client.
pub struct HttpRelayClient {
    client: reqwest::Client,
    primary_url: String,
    mirror_urls: Vec<String>,
    request_timeout_ms: u64,
    request_id: AtomicU64,
}

impl HttpRelayClient {
    pub fn new(config: &RelayConfig) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| RelayError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            primary_url: config.primary_url.clone(),
            mirror_urls: config.mirror_urls.clone(),
            request_timeout_ms: config.request_timeout_ms,
            request_id: AtomicU64::new(1),
        })
    }

    async fn rpc(
        &self,
        url: &str,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, RelayError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": self.request_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RelayError::Timeout {
                        millis: self.request_timeout_ms,
                    }
                } else {
                    RelayError::Transport(e.to_string())
                }
            })?;
        let parsed: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| RelayError::MalformedResponse(e.to_string()))?;
        if let Some(err) = parsed.error {
            return Err(RelayError::Rejected {
                reason: format!("rpc error {}: {}", err.code, err.message),
            });
        }
        parsed
            .result
            .ok_or_else(|| RelayError::MalformedResponse("missing result".to_string()))
    }
}

#[async_trait]
impl RelayClient for HttpRelayClient {
    async fn submit_bundle(&self, bundle: &RelayBundle) -> Result<ReceiptId, RelayError> {
        let params = json!([{
            "transactions": bundle.payloads,
            "targetSlot": bundle.target_slot,
            "tip": bundle.tip,
        }]);

        // Mirrors are fire-and-forget; a mirror outage must not delay the
        // primary submission.
        for mirror in &self.mirror_urls {
            if let Err(e) = self.rpc(mirror, "sendBundle", params.clone()).await {
                warn!("⚠️ Mirror relay {} rejected bundle {}: {}", mirror, bundle.id, e);
            }
        }

        let result = self.rpc(&self.primary_url, "sendBundle", params).await?;
        let receipt = result
            .as_str()
            .map(str::to_string)
            .or_else(|| {
                result
                    .get("bundleId")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            })
            .ok_or_else(|| {
                RelayError::MalformedResponse("sendBundle result has no bundle id".to_string())
            })?;
        debug!("📦 Bundle {} accepted by relay, receipt {}", bundle.id, receipt);
        Ok(receipt)
    }

    async fn poll_status(&self, receipt: &ReceiptId) -> Result<RelayStatus, RelayError> {
        let params = json!([[receipt]]);
        let result = self
            .rpc(&self.primary_url, "getBundleStatuses", params)
            .await?;
        let entry = result
            .get("value")
            .and_then(|v| v.as_array())
            .and_then(|v| v.first())
            .ok_or_else(|| {
                RelayError::MalformedResponse("getBundleStatuses returned no entries".to_string())
            })?;
        let status = entry
            .get("status")
            .and_then(|v| v.as_str())
            .ok_or_else(|| RelayError::MalformedResponse("entry missing status".to_string()))?;
        match status {
            "pending" | "processed" => Ok(RelayStatus::Pending),
            "landed" | "included" => {
                let slot = entry.get("slot").and_then(|v| v.as_u64()).unwrap_or(0);
                Ok(RelayStatus::Included { slot })
            }
            "failed" | "rejected" | "dropped" => Ok(RelayStatus::Rejected {
                reason: entry
                    .get("error")
                    .and_then(|v| v.as_str())
                    .unwrap_or("dropped by relay")
                    .to_string(),
            }),
            other => Err(RelayError::MalformedResponse(format!(
                "unknown bundle status '{other}'"
            ))),
        }
    }
}

/// In-memory relay double. Tests script the status each receipt reports via
/// [`MockRelay::set_status`]; submissions are recorded for assertion.
#[derive(Default)]
pub struct MockRelay {
    submitted: Mutex<Vec<RelayBundle>>,
    statuses: Mutex<HashMap<ReceiptId, RelayStatus>>,
    fail_submissions: Mutex<bool>,
}

impl MockRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the status returned for a receipt.
    pub fn set_status(&self, receipt: impl Into<ReceiptId>, status: RelayStatus) {
        self.statuses.lock().insert(receipt.into(), status);
    }

    /// Make every subsequent submission fail with a transport error.
    pub fn fail_submissions(&self, fail: bool) {
        *self.fail_submissions.lock() = fail;
    }

    pub fn submissions(&self) -> Vec<RelayBundle> {
        self.submitted.lock().clone()
    }
}

#[async_trait]
impl RelayClient for MockRelay {
    async fn submit_bundle(&self, bundle: &RelayBundle) -> Result<ReceiptId, RelayError> {
        if *self.fail_submissions.lock() {
            return Err(RelayError::Transport("mock relay offline".to_string()));
        }
        let receipt = format!("receipt-{}", bundle.id);
        self.submitted.lock().push(bundle.clone());
        self.statuses
            .lock()
            .entry(receipt.clone())
            .or_insert(RelayStatus::Pending);
        Ok(receipt)
    }

    async fn poll_status(&self, receipt: &ReceiptId) -> Result<RelayStatus, RelayError> {
        self.statuses
            .lock()
            .get(receipt)
            .cloned()
            .ok_or_else(|| RelayError::Rejected {
                reason: format!("unknown receipt {receipt}"),
            })
    }
}
