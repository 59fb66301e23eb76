//! JSON-RPC over HTTP via ethers `Provider<Http>`
//!
//! All endpoints share one pooled `reqwest` client. Transactions are sent with
//! `eth_sendTransaction` from a node-managed account; nothing is signed here.

use std::time::Duration;

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider, ProviderError, RpcError};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Filter, TransactionRequest, ValueOrArray};
use rebalancer_types::{Address, H256, U256};
use url::Url;

use crate::endpoint::{LedgerEndpoint, LogQuery, RawLogEntry, TxReceipt};
use crate::error::{classify_rpc_error, ClassifiedError, ErrorKind, RouterError};

/// Shared HTTP client with connection pooling; the per-call deadline is
/// enforced by `EndpointClient`, this timeout only bounds stuck sockets.
pub fn pooled_client(request_timeout: Duration) -> Result<reqwest::Client, RouterError> {
    reqwest::Client::builder()
        .pool_idle_timeout(Duration::from_secs(60))
        .pool_max_idle_per_host(5)
        .timeout(request_timeout)
        .tcp_keepalive(Duration::from_secs(60))
        .tcp_nodelay(true)
        .build()
        .map_err(|e| RouterError::InvalidEndpoint {
            url: "<http client>".to_string(),
            reason: e.to_string(),
        })
}

pub struct HttpEndpoint {
    url: String,
    provider: Provider<Http>,
    sender: Option<Address>,
}

impl HttpEndpoint {
    pub fn new(
        url: &str,
        client: reqwest::Client,
        sender: Option<Address>,
    ) -> Result<Self, RouterError> {
        let parsed: Url = url.parse().map_err(|e: url::ParseError| RouterError::InvalidEndpoint {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let provider = Provider::new(Http::new_with_client(parsed, client));
        Ok(Self {
            url: url.to_string(),
            provider,
            sender,
        })
    }

    fn classify(&self, error: ProviderError) -> ClassifiedError {
        let kind = classify_provider_error(&error);
        ClassifiedError::new(kind, self.url.clone(), error.to_string())
    }

    fn request(&self, to: Address, data: Vec<u8>) -> TransactionRequest {
        let mut request = TransactionRequest::new().to(to).data(data);
        if let Some(sender) = self.sender {
            request = request.from(sender);
        }
        request
    }
}

/// Map an ethers provider error onto the retry taxonomy.
pub fn classify_provider_error(error: &ProviderError) -> ErrorKind {
    match error {
        ProviderError::JsonRpcClientError(inner) => {
            if let Some(response) = inner.as_error_response() {
                return classify_rpc_error(Some(response.code), &response.message);
            }
            let message = inner.to_string();
            match classify_rpc_error(None, &message) {
                ErrorKind::Connection if inner.as_serde_error().is_some() => {
                    ErrorKind::InvalidResponse
                }
                kind => kind,
            }
        }
        ProviderError::HTTPError(e) => {
            if e.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) {
                ErrorKind::RateLimited
            } else {
                ErrorKind::Connection
            }
        }
        ProviderError::SerdeJson(_) | ProviderError::HexError(_) => ErrorKind::InvalidResponse,
        other => classify_rpc_error(None, &other.to_string()),
    }
}

#[async_trait]
impl LedgerEndpoint for HttpEndpoint {
    fn url(&self) -> &str {
        &self.url
    }

    async fn chain_id(&self) -> Result<u64, ClassifiedError> {
        self.provider
            .get_chainid()
            .await
            .map(|id| id.low_u64())
            .map_err(|e| self.classify(e))
    }

    async fn call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>, ClassifiedError> {
        let tx: TypedTransaction = self.request(to, data).into();
        self.provider
            .call(&tx, None)
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|e| self.classify(e))
    }

    async fn get_code(&self, address: Address) -> Result<Vec<u8>, ClassifiedError> {
        self.provider
            .get_code(address, None)
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|e| self.classify(e))
    }

    async fn gas_price(&self) -> Result<U256, ClassifiedError> {
        self.provider.get_gas_price().await.map_err(|e| self.classify(e))
    }

    async fn estimate_gas(&self, to: Address, data: Vec<u8>) -> Result<U256, ClassifiedError> {
        let tx: TypedTransaction = self.request(to, data).into();
        self.provider
            .estimate_gas(&tx, None)
            .await
            .map_err(|e| self.classify(e))
    }

    async fn send_transaction(
        &self,
        to: Address,
        data: Vec<u8>,
        gas_price: Option<U256>,
    ) -> Result<H256, ClassifiedError> {
        if self.sender.is_none() {
            return Err(ClassifiedError::new(
                ErrorKind::Unsupported,
                self.url.clone(),
                "no sender account configured for eth_sendTransaction",
            ));
        }
        let mut request = self.request(to, data);
        if let Some(price) = gas_price {
            request = request.gas_price(price);
        }
        let pending = self
            .provider
            .send_transaction(request, None)
            .await
            .map_err(|e| self.classify(e))?;
        Ok(pending.tx_hash())
    }

    async fn transaction_receipt(&self, hash: H256) -> Result<Option<TxReceipt>, ClassifiedError> {
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| self.classify(e))?;

        Ok(receipt.map(|r| TxReceipt {
            tx_hash: r.transaction_hash,
            status: r.status.map(|s| s.as_u64()),
            gas_used: r.gas_used,
            effective_gas_price: r.effective_gas_price,
            block_number: r.block_number.map(|b| b.as_u64()),
        }))
    }

    async fn block_number(&self) -> Result<u64, ClassifiedError> {
        self.provider
            .get_block_number()
            .await
            .map(|n| n.as_u64())
            .map_err(|e| self.classify(e))
    }

    async fn get_logs(&self, query: &LogQuery) -> Result<Vec<RawLogEntry>, ClassifiedError> {
        let topics: Vec<Option<H256>> = query.topics.iter().copied().map(Some).collect();
        let filter = Filter::new()
            .address(ValueOrArray::Array(query.addresses.clone()))
            .topic0(ValueOrArray::Array(topics))
            .from_block(query.from_block)
            .to_block(query.to_block);

        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|e| self.classify(e))?;

        Ok(logs
            .into_iter()
            .map(|log| RawLogEntry {
                address: log.address,
                topics: log.topics,
                data: log.data.to_vec(),
                block_number: log.block_number.map(|b| b.as_u64()),
                log_index: log.log_index.map(|i| i.as_u64()),
            })
            .collect())
    }
}
