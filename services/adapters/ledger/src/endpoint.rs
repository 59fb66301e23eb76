//! Single-endpoint ledger access
//!
//! `LedgerEndpoint` is the seam between the router and a concrete transport
//! (HTTP JSON-RPC in production, `MockLedger` in tests). `EndpointClient`
//! wraps one endpoint with the per-call deadline.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rebalancer_types::{Address, H256, U256};

use crate::error::ClassifiedError;

/// Mined transaction outcome, reduced to what the monitor needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: H256,
    /// `Some(1)` success, `Some(0)` reverted; `None` on pre-byzantium chains.
    pub status: Option<u64>,
    pub gas_used: Option<U256>,
    pub effective_gas_price: Option<U256>,
    pub block_number: Option<u64>,
}

impl TxReceipt {
    pub fn succeeded(&self) -> bool {
        self.status == Some(1)
    }
}

/// `eth_getLogs` query over an inclusive block range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub addresses: Vec<Address>,
    /// Accepted values for topic0.
    pub topics: Vec<H256>,
    pub from_block: u64,
    pub to_block: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLogEntry {
    pub address: Address,
    pub topics: Vec<H256>,
    pub data: Vec<u8>,
    pub block_number: Option<u64>,
    pub log_index: Option<u64>,
}

#[async_trait]
pub trait LedgerEndpoint: Send + Sync {
    /// Identifies the endpoint in logs and errors.
    fn url(&self) -> &str;

    /// `eth_chainId`
    async fn chain_id(&self) -> Result<u64, ClassifiedError>;

    /// `eth_call` against the latest block.
    async fn call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>, ClassifiedError>;

    async fn get_code(&self, address: Address) -> Result<Vec<u8>, ClassifiedError>;

    async fn gas_price(&self) -> Result<U256, ClassifiedError>;

    async fn estimate_gas(&self, to: Address, data: Vec<u8>) -> Result<U256, ClassifiedError>;

    async fn send_transaction(
        &self,
        to: Address,
        data: Vec<u8>,
        gas_price: Option<U256>,
    ) -> Result<H256, ClassifiedError>;

    async fn transaction_receipt(&self, hash: H256) -> Result<Option<TxReceipt>, ClassifiedError>;

    async fn block_number(&self) -> Result<u64, ClassifiedError>;

    async fn get_logs(&self, query: &LogQuery) -> Result<Vec<RawLogEntry>, ClassifiedError>;
}

/// One endpoint plus its per-call deadline.
#[derive(Clone)]
pub struct EndpointClient {
    endpoint: Arc<dyn LedgerEndpoint>,
    timeout: Duration,
}

impl EndpointClient {
    pub fn new(endpoint: Arc<dyn LedgerEndpoint>, timeout: Duration) -> Self {
        Self { endpoint, timeout }
    }

    pub fn url(&self) -> &str {
        self.endpoint.url()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `operation` against this endpoint; exceeding the deadline yields
    /// `ErrorKind::Timeout`.
    pub async fn call<T, F, Fut>(&self, operation: F) -> Result<T, ClassifiedError>
    where
        F: FnOnce(Arc<dyn LedgerEndpoint>) -> Fut,
        Fut: Future<Output = Result<T, ClassifiedError>>,
    {
        match tokio::time::timeout(self.timeout, operation(Arc::clone(&self.endpoint))).await {
            Ok(result) => result,
            Err(_) => Err(ClassifiedError::timeout(self.endpoint.url(), self.timeout)),
        }
    }
}

impl std::fmt::Debug for EndpointClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointClient")
            .field("url", &self.endpoint.url())
            .field("timeout", &self.timeout)
            .finish()
    }
}
