//! JSON-RPC Transport
//!
//! Minimal JSON-RPC 2.0 client for the local test chain (Hardhat / Anvil style nodes).
//!
//! # Features
//! - Generic `rpc_call()` returning any deserializable result
//! - Network configuration support (localhost/custom)
//! - Structured errors that separate transport failures from contract reverts
//! - Revert data decoding (`Error(string)` and `Panic(uint256)`)

use alloy_primitives::Bytes;
use alloy_sol_types::{Panic, Revert, SolError};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// JSON-RPC error code used by geth-compatible nodes for `execution reverted`.
const EXECUTION_REVERTED_CODE: i64 = 3;

/// Network configuration for the chain endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// RPC endpoint URL (e.g., "http://127.0.0.1:8545")
    pub rpc_url: String,
}

impl NetworkConfig {
    /// Default local development node
    pub fn localhost() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".to_string(),
        }
    }

    /// Create a custom network configuration
    pub fn custom(rpc_url: String) -> Self {
        Self { rpc_url }
    }
}

/// Retry configuration for receipt polling
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 10000,
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("RPC error {code}: {message}")]
    RpcError { code: i64, message: String },
    #[error("Transaction reverted: {}", .reason.as_deref().unwrap_or("<no reason>"))]
    Reverted {
        reason: Option<String>,
        data: Bytes,
    },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("ABI decode error: {0}")]
    DecodeError(#[from] alloy_sol_types::Error),
    #[error("Retry limit exceeded")]
    RetryLimitExceeded,
}

impl ChainError {
    /// Build a revert error from raw revert data, decoding the reason when possible.
    pub fn reverted(data: Bytes) -> Self {
        let reason = decode_revert_reason(&data);
        ChainError::Reverted { reason, data }
    }

    pub fn is_revert(&self) -> bool {
        matches!(self, ChainError::Reverted { .. })
    }

    /// Human-readable revert reason, if this error is a revert that carried one.
    pub fn revert_reason(&self) -> Option<&str> {
        match self {
            ChainError::Reverted { reason, .. } => reason.as_deref(),
            _ => None,
        }
    }
}

/// RPC request/response types
#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)] // Envelope fields used for deserialization from RPC response
struct RpcResponse {
    jsonrpc: String,
    id: u64,
    #[serde(flatten)]
    result: RpcResult,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RpcResult {
    Success { result: serde_json::Value },
    Error { error: RpcErrorObject },
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

impl RpcErrorObject {
    /// Revert payload, either a bare hex string (geth/anvil) or nested under
    /// `data.data` (hardhat).
    fn revert_data(&self) -> Option<Bytes> {
        let raw = match self.data.as_ref()? {
            serde_json::Value::String(hex) => hex.as_str(),
            serde_json::Value::Object(map) => map.get("data")?.as_str()?,
            _ => return None,
        };
        raw.parse::<Bytes>().ok()
    }

    fn looks_like_revert(&self) -> bool {
        self.code == EXECUTION_REVERTED_CODE || self.message.contains("revert")
    }

    fn into_chain_error(self) -> ChainError {
        if !self.looks_like_revert() {
            return ChainError::RpcError {
                code: self.code,
                message: self.message,
            };
        }

        let data = self.revert_data().unwrap_or_default();
        let reason = decode_revert_reason(&data).or_else(|| reason_from_message(&self.message));
        ChainError::Reverted { reason, data }
    }
}

/// Decode a revert reason from ABI-encoded revert data.
///
/// Returns `None` for empty data and for custom errors this crate knows nothing about.
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    if data.is_empty() {
        return None;
    }

    if let Ok(revert) = Revert::abi_decode(data, true) {
        return Some(revert.reason);
    }

    if let Ok(panic) = Panic::abi_decode(data, true) {
        return Some(format!("panic code {}", panic.code));
    }

    None
}

/// Fallback for nodes that only report the reason inside the error message.
fn reason_from_message(message: &str) -> Option<String> {
    const HARDHAT_PREFIX: &str = "reverted with reason string '";
    const GETH_PREFIX: &str = "execution reverted: ";

    if let Some(start) = message.find(HARDHAT_PREFIX) {
        let rest = &message[start + HARDHAT_PREFIX.len()..];
        return rest.rfind('\'').map(|end| rest[..end].to_string());
    }

    message
        .split_once(GETH_PREFIX)
        .map(|(_, reason)| reason.trim().to_string())
        .filter(|reason| !reason.is_empty())
}

/// One JSON-RPC round trip, with the result left as raw JSON
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn request(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value, ChainError>;
}

/// JSON-RPC client. Cloning shares the request id counter.
#[derive(Clone)]
pub struct JsonRpcClient {
    network: NetworkConfig,
    client: reqwest::Client,
    next_id: Arc<AtomicU64>,
}

impl JsonRpcClient {
    pub fn new(network: NetworkConfig) -> Self {
        Self {
            network,
            client: reqwest::Client::new(),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    /// Make an RPC call to the configured endpoint
    pub async fn rpc_call<T>(&self, method: &str, params: serde_json::Value) -> Result<T, ChainError>
    where
        T: DeserializeOwned,
    {
        let result = self.request(method, params).await?;
        serde_json::from_value(result).map_err(ChainError::SerializationError)
    }
}

#[async_trait]
impl RpcTransport for JsonRpcClient {
    async fn request(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value, ChainError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        debug!(method = method, id = request.id, "Sending RPC request");

        let response = self
            .client
            .post(&self.network.rpc_url)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ChainError::RpcError {
                code: i64::from(status.as_u16()),
                message: text,
            });
        }

        let rpc_response: RpcResponse = serde_json::from_str(&text)?;

        match rpc_response.result {
            RpcResult::Success { result } => Ok(result),
            RpcResult::Error { error } => Err(error.into_chain_error()),
        }
    }
}
