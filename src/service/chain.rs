//! Chain Control
//!
//! The privileged interface of a local test chain: account impersonation, balance
//! overrides, manual mining and block-time control, plus plain calls and
//! transactions. Production chains reject the privileged half of this trait.
//!
//! Signers are plain addresses: the node signs for its unlocked accounts and for
//! any account currently impersonated.

use alloy_primitives::{Address, Bytes, B256, U256, U64};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::rpc::{ChainError, JsonRpcClient, NetworkConfig, RetryConfig, RpcTransport};
use crate::error::{ProposalError, Result};

/// A call or transaction from `from` to `to`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallRequest {
    pub from: Address,
    pub to: Address,
    #[serde(skip_serializing_if = "U256::is_zero")]
    pub value: U256,
    pub data: Bytes,
}

impl CallRequest {
    pub fn new(from: Address, to: Address, data: Bytes) -> Self {
        Self {
            from,
            to,
            value: U256::ZERO,
            data,
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub number: u64,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxReceipt {
    pub transaction_hash: B256,
    pub block_number: Option<u64>,
    pub success: bool,
}

#[async_trait]
pub trait ChainControl: Send + Sync {
    async fn impersonate(&self, account: Address) -> Result<(), ChainError>;

    async fn stop_impersonating(&self, account: Address) -> Result<(), ChainError>;

    async fn set_balance(&self, account: Address, amount: U256) -> Result<(), ChainError>;

    /// Mine a single block, optionally pinning its timestamp
    async fn mine_block(&self, timestamp: Option<u64>) -> Result<(), ChainError>;

    async fn set_automine(&self, enabled: bool) -> Result<(), ChainError>;

    async fn latest_block(&self) -> Result<BlockInfo, ChainError>;

    /// Execute a read-only call against the pending block, so transactions
    /// sent while automine is off are visible
    async fn call(&self, request: &CallRequest) -> Result<Bytes, ChainError>;

    /// Submit a transaction signed by the node on behalf of `request.from`.
    ///
    /// Reverts are reported here, before submission, so callers never hold a
    /// hash for a transaction that was known to fail.
    async fn send_transaction(&self, request: &CallRequest) -> Result<B256, ChainError>;

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<TxReceipt>, ChainError>;

    /// Poll until the transaction is mined
    async fn wait_for_receipt(&self, hash: B256) -> Result<TxReceipt, ChainError>;

    async fn mine_blocks(&self, count: u64) -> Result<(), ChainError> {
        for _ in 0..count {
            self.mine_block(None).await?;
        }
        Ok(())
    }
}

/// Wait for `hash` to be mined and require a successful status
pub async fn confirm(chain: &dyn ChainControl, hash: B256) -> Result<TxReceipt> {
    let receipt = chain.wait_for_receipt(hash).await?;
    if !receipt.success {
        return Err(ProposalError::TransactionFailed { hash });
    }
    Ok(receipt)
}

#[derive(Debug, Serialize)]
struct GasLimitedRequest<'a> {
    #[serde(flatten)]
    request: &'a CallRequest,
    gas: U64,
}

#[derive(Debug, Deserialize)]
struct RpcBlock {
    number: U64,
    timestamp: U64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: B256,
    block_number: Option<U64>,
    status: Option<U64>,
}

impl From<RpcReceipt> for TxReceipt {
    fn from(receipt: RpcReceipt) -> Self {
        Self {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number.map(|n| n.to::<u64>()),
            success: receipt.status == Some(U64::from(1)),
        }
    }
}

/// [`ChainControl`] over JSON-RPC against a Hardhat-compatible node
#[derive(Clone)]
pub struct HardhatChain {
    rpc: Arc<dyn RpcTransport>,
    retry_config: RetryConfig,
}

impl HardhatChain {
    pub fn new(network: NetworkConfig) -> Self {
        Self::with_retry_config(network, RetryConfig::default())
    }

    pub fn with_retry_config(network: NetworkConfig, retry_config: RetryConfig) -> Self {
        Self::with_transport(Arc::new(JsonRpcClient::new(network)), retry_config)
    }

    pub fn with_transport(rpc: Arc<dyn RpcTransport>, retry_config: RetryConfig) -> Self {
        Self { rpc, retry_config }
    }

    async fn rpc_call<T>(&self, method: &str, params: serde_json::Value) -> Result<T, ChainError>
    where
        T: DeserializeOwned,
    {
        let result = self.rpc.request(method, params).await?;
        serde_json::from_value(result).map_err(ChainError::SerializationError)
    }

    async fn ack(&self, method: &str, params: serde_json::Value) -> Result<(), ChainError> {
        self.rpc.request(method, params).await?;
        Ok(())
    }
}

#[async_trait]
impl ChainControl for HardhatChain {
    async fn impersonate(&self, account: Address) -> Result<(), ChainError> {
        debug!(account = %account, "Impersonating account");
        self.ack("hardhat_impersonateAccount", serde_json::json!([account]))
            .await
    }

    async fn stop_impersonating(&self, account: Address) -> Result<(), ChainError> {
        debug!(account = %account, "Releasing impersonated account");
        self.ack("hardhat_stopImpersonatingAccount", serde_json::json!([account]))
            .await
    }

    async fn set_balance(&self, account: Address, amount: U256) -> Result<(), ChainError> {
        self.ack("hardhat_setBalance", serde_json::json!([account, amount]))
            .await
    }

    async fn mine_block(&self, timestamp: Option<u64>) -> Result<(), ChainError> {
        let params = match timestamp {
            Some(timestamp) => serde_json::json!([timestamp]),
            None => serde_json::json!([]),
        };
        self.ack("evm_mine", params).await
    }

    async fn set_automine(&self, enabled: bool) -> Result<(), ChainError> {
        debug!(enabled = enabled, "Setting automine");
        self.ack("evm_setAutomine", serde_json::json!([enabled]))
            .await
    }

    async fn latest_block(&self) -> Result<BlockInfo, ChainError> {
        let block: Option<RpcBlock> = self
            .rpc_call("eth_getBlockByNumber", serde_json::json!(["latest", false]))
            .await?;
        let block =
            block.ok_or_else(|| ChainError::InvalidResponse("latest block missing".to_string()))?;

        Ok(BlockInfo {
            number: block.number.to::<u64>(),
            timestamp: block.timestamp.to::<u64>(),
        })
    }

    async fn call(&self, request: &CallRequest) -> Result<Bytes, ChainError> {
        self.rpc_call("eth_call", serde_json::json!([request, "pending"]))
            .await
    }

    async fn send_transaction(&self, request: &CallRequest) -> Result<B256, ChainError> {
        // Estimation executes the call, so a revert surfaces with its data here
        let gas: U64 = self
            .rpc_call("eth_estimateGas", serde_json::json!([request]))
            .await?;

        let limited = GasLimitedRequest { request, gas };
        let hash: B256 = self
            .rpc_call("eth_sendTransaction", serde_json::json!([limited]))
            .await?;

        info!(
            tx_hash = %hash,
            from = %request.from,
            to = %request.to,
            "Transaction submitted"
        );
        Ok(hash)
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<TxReceipt>, ChainError> {
        let receipt: Option<RpcReceipt> = self
            .rpc_call("eth_getTransactionReceipt", serde_json::json!([hash]))
            .await?;
        Ok(receipt.map(TxReceipt::from))
    }

    async fn wait_for_receipt(&self, hash: B256) -> Result<TxReceipt, ChainError> {
        let mut attempt = 0;
        let mut delay = self.retry_config.initial_delay_ms;

        loop {
            match self.transaction_receipt(hash).await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => {
                    if attempt >= self.retry_config.max_retries {
                        return Err(ChainError::RetryLimitExceeded);
                    }
                }
                Err(e) => {
                    warn!(
                        tx_hash = %hash,
                        attempt = attempt,
                        error = %e,
                        "Error fetching transaction receipt"
                    );
                    if attempt >= self.retry_config.max_retries {
                        return Err(e);
                    }
                }
            }

            attempt += 1;
            debug!(
                tx_hash = %hash,
                attempt = attempt,
                delay_ms = delay,
                "Waiting before retry"
            );

            tokio::time::sleep(Duration::from_millis(delay)).await;

            // Exponential backoff
            delay = (delay as f64 * self.retry_config.backoff_multiplier) as u64;
            delay = delay.min(self.retry_config.max_delay_ms);
        }
    }
}
