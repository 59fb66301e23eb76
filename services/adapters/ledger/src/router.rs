//! Failover across an ordered list of ledger endpoints
//!
//! Each logical operation is attempted on at most `min(len, max_retries + 1)`
//! endpoints. Retryable failures advance to the next endpoint, a fatal
//! failure stops immediately. The endpoint that last succeeded is tried
//! first by the next operation; the list order applies from there, wrapping.
//!
//! State-changing requests go through `submit`, which only fails over when
//! the endpoint proved it did not accept the request.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rebalancer_config::LedgerConfig;
use tracing::{debug, info, warn};

use crate::endpoint::{EndpointClient, LedgerEndpoint};
use crate::error::{ClassifiedError, RouterError};
use crate::http::{pooled_client, HttpEndpoint};

#[derive(Debug)]
pub struct FailoverRouter {
    clients: Vec<EndpointClient>,
    max_retries: u32,
    preferred: AtomicUsize,
}

impl FailoverRouter {
    pub fn new(
        endpoints: Vec<Arc<dyn LedgerEndpoint>>,
        call_timeout: Duration,
        max_retries: u32,
    ) -> Result<Self, RouterError> {
        if endpoints.is_empty() {
            return Err(RouterError::NoEndpoints);
        }
        let clients = endpoints
            .into_iter()
            .map(|endpoint| EndpointClient::new(endpoint, call_timeout))
            .collect();
        Ok(Self {
            clients,
            max_retries,
            preferred: AtomicUsize::new(0),
        })
    }

    /// HTTP endpoints for every configured URL, sharing one pooled client.
    pub fn from_config(config: &LedgerConfig) -> Result<Self, RouterError> {
        // Socket-level timeout sits above the per-call deadline
        let client = pooled_client(config.call_timeout() * 3)?;
        let endpoints = config
            .endpoints
            .iter()
            .map(|url| {
                HttpEndpoint::new(url, client.clone(), config.sender)
                    .map(|endpoint| Arc::new(endpoint) as Arc<dyn LedgerEndpoint>)
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            "🔌 Ledger router ready: {} endpoints, {} attempts per call, {}ms call timeout",
            endpoints.len(),
            config.endpoints.len().min(config.max_retries as usize + 1),
            config.call_timeout_ms
        );
        Self::new(endpoints, config.call_timeout(), config.max_retries)
    }

    pub fn endpoint_count(&self) -> usize {
        self.clients.len()
    }

    /// Endpoints tried per operation before giving up.
    pub fn attempt_limit(&self) -> usize {
        self.clients
            .len()
            .min((self.max_retries as usize).saturating_add(1))
    }

    /// URL of the endpoint the next operation starts with.
    pub fn preferred_endpoint(&self) -> &str {
        self.clients[self.preferred_index()].url()
    }

    fn preferred_index(&self) -> usize {
        self.preferred.load(Ordering::Relaxed) % self.clients.len()
    }

    /// Ask every endpoint which chain it serves. Any endpoint on another
    /// chain rejects the whole list; one that cannot be reached is logged and
    /// left in place.
    pub async fn verify_chain_id(&self, expected: u64) -> Result<(), RouterError> {
        for client in &self.clients {
            match client.call(|endpoint| async move { endpoint.chain_id().await }).await {
                Ok(chain_id) if chain_id == expected => {
                    debug!(endpoint = client.url(), chain_id, "Chain id verified");
                }
                Ok(chain_id) => {
                    return Err(RouterError::InvalidEndpoint {
                        url: client.url().to_string(),
                        reason: format!("serves chain {chain_id}, expected {expected}"),
                    });
                }
                Err(error) => {
                    warn!(endpoint = client.url(), "Could not verify chain id: {}", error);
                }
            }
        }
        Ok(())
    }

    /// Drive `operation` across endpoints until one succeeds, one fails
    /// fatally, or the attempt limit is reached.
    pub async fn execute<T, F, Fut>(&self, operation_name: &str, operation: F) -> Result<T, RouterError>
    where
        F: Fn(Arc<dyn LedgerEndpoint>) -> Fut,
        Fut: Future<Output = Result<T, ClassifiedError>>,
    {
        self.run(operation_name, operation, true).await
    }

    /// `execute` for requests that must not be applied twice. A failure that
    /// may hide an accepted request (timeout, broken transport, garbled
    /// answer) ends the operation with `RouterError::Unconfirmed`.
    pub async fn submit<T, F, Fut>(&self, operation_name: &str, operation: F) -> Result<T, RouterError>
    where
        F: Fn(Arc<dyn LedgerEndpoint>) -> Fut,
        Fut: Future<Output = Result<T, ClassifiedError>>,
    {
        self.run(operation_name, operation, false).await
    }

    async fn run<T, F, Fut>(
        &self,
        operation_name: &str,
        operation: F,
        replayable: bool,
    ) -> Result<T, RouterError>
    where
        F: Fn(Arc<dyn LedgerEndpoint>) -> Fut,
        Fut: Future<Output = Result<T, ClassifiedError>>,
    {
        let start = self.preferred_index();
        let limit = self.attempt_limit();
        let mut last_error: Option<ClassifiedError> = None;

        for attempt in 0..limit {
            let index = (start + attempt) % self.clients.len();
            let client = &self.clients[index];

            match client.call(|endpoint| operation(endpoint)).await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(
                            operation = operation_name,
                            endpoint = client.url(),
                            attempt,
                            "Operation succeeded after failover"
                        );
                    }
                    self.preferred.store(index, Ordering::Relaxed);
                    return Ok(value);
                }
                Err(error) if error.is_fatal() => {
                    debug!(
                        operation = operation_name,
                        endpoint = client.url(),
                        kind = %error.kind,
                        "Fatal ledger error, not retrying"
                    );
                    return Err(RouterError::Fatal {
                        operation: operation_name.to_string(),
                        source: error,
                    });
                }
                Err(error) if !replayable && error.kind.may_have_applied() => {
                    warn!(
                        operation = operation_name,
                        endpoint = client.url(),
                        kind = %error.kind,
                        "Outcome unknown, not replaying on another endpoint: {}",
                        error.message
                    );
                    return Err(RouterError::Unconfirmed {
                        operation: operation_name.to_string(),
                        source: error,
                    });
                }
                Err(error) => {
                    warn!(
                        operation = operation_name,
                        endpoint = client.url(),
                        kind = %error.kind,
                        "Endpoint failed: {}",
                        error.message
                    );
                    last_error = Some(error);
                }
            }
        }

        match last_error {
            Some(last) => Err(RouterError::Exhausted {
                operation: operation_name.to_string(),
                attempted: limit,
                last,
            }),
            None => Err(RouterError::NoEndpoints),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::mock::{FailWhen, MockLedger};
    use rebalancer_types::{Address, H256};

    const TIMEOUT: Duration = Duration::from_millis(100);

    fn slow(url: &str) -> MockLedger {
        let ledger = MockLedger::new(url);
        ledger.set_latency(Duration::from_secs(60));
        ledger
    }

    fn router(endpoints: &[&MockLedger], max_retries: u32) -> FailoverRouter {
        FailoverRouter::new(
            endpoints.iter().map(|e| e.endpoint()).collect(),
            TIMEOUT,
            max_retries,
        )
        .unwrap()
    }

    async fn block(router: &FailoverRouter) -> Result<u64, RouterError> {
        router
            .execute("blockNumber", |endpoint| async move { endpoint.block_number().await })
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_fails_over_past_timeouts() {
        let e1 = slow("e1");
        let e2 = slow("e2");
        let e3 = MockLedger::new("e3");
        e3.set_block_number(42);

        let router = router(&[&e1, &e2, &e3], 5);
        assert_eq!(block(&router).await.unwrap(), 42);
        assert_eq!(router.preferred_endpoint(), "e3");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_stops_failover() {
        let e1 = slow("e1");
        let e2 = MockLedger::new("e2");
        e2.fail(FailWhen::Always, ErrorKind::Revert, None);
        let e3 = MockLedger::new("e3");

        let router = router(&[&e1, &e2, &e3], 5);
        let err = block(&router).await.unwrap_err();

        assert!(err.is_fatal());
        assert_eq!(err.last_error().map(|e| e.endpoint.as_str()), Some("e2"));
        assert_eq!(e3.total_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_timeouts_exhaust_bounded_attempts() {
        let endpoints: Vec<MockLedger> = (0..4).map(|i| slow(&format!("e{i}"))).collect();
        let refs: Vec<&MockLedger> = endpoints.iter().collect();
        let router = router(&refs, 1);

        let err = block(&router).await.unwrap_err();
        assert_eq!(err.endpoints_exhausted(), 2);
        assert_eq!(err.last_error().map(|e| e.kind), Some(ErrorKind::Timeout));
        assert_eq!(endpoints[2].total_calls(), 0);
        assert_eq!(endpoints[3].total_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sticky_endpoint_preferred_next_time() {
        let e1 = MockLedger::new("e1");
        e1.fail(FailWhen::Always, ErrorKind::Connection, Some(1));
        let e2 = MockLedger::new("e2");

        let router = router(&[&e1, &e2], 3);
        block(&router).await.unwrap();
        block(&router).await.unwrap();

        assert_eq!(e1.total_calls(), 1);
        assert_eq!(e2.total_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sticky_start_wraps_around() {
        let e1 = MockLedger::new("e1");
        let e2 = MockLedger::new("e2");
        let router = router(&[&e1, &e2], 3);

        e1.fail(FailWhen::Always, ErrorKind::RateLimited, Some(1));
        block(&router).await.unwrap();
        e2.fail(FailWhen::Always, ErrorKind::Connection, Some(1));
        block(&router).await.unwrap();

        assert_eq!(router.preferred_endpoint(), "e1");
    }

    async fn send(router: &FailoverRouter) -> Result<H256, RouterError> {
        router
            .submit("sendTransaction", |endpoint| async move {
                endpoint.send_transaction(Address::zero(), Vec::new(), None).await
            })
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_not_replayed_after_timeout() {
        let e1 = slow("e1");
        let e2 = MockLedger::new("e2");

        let router = router(&[&e1, &e2], 3);
        let err = send(&router).await.unwrap_err();

        assert!(matches!(err, RouterError::Unconfirmed { .. }));
        assert_eq!(err.last_error().map(|e| e.kind), Some(ErrorKind::Timeout));
        assert_eq!(e2.total_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_fails_over_past_rate_limit() {
        let e1 = MockLedger::new("e1");
        e1.fail(FailWhen::Always, ErrorKind::RateLimited, Some(1));
        let e2 = MockLedger::new("e2");

        let router = router(&[&e1, &e2], 3);
        send(&router).await.unwrap();

        assert_eq!(e2.sent_transactions().len(), 1);
        assert_eq!(router.preferred_endpoint(), "e2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_chain_id_mismatch_rejects_endpoints() {
        let e1 = MockLedger::new("e1");
        let e2 = MockLedger::new("e2");
        e2.set_chain_id(1);

        let router = router(&[&e1, &e2], 3);
        let err = router.verify_chain_id(137).await.unwrap_err();
        assert!(matches!(err, RouterError::InvalidEndpoint { ref url, .. } if url == "e2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_endpoint_skipped_by_chain_check() {
        let e1 = slow("e1");
        let e2 = MockLedger::new("e2");

        let router = router(&[&e1, &e2], 3);
        router.verify_chain_id(137).await.unwrap();
        assert_eq!(e2.call_count("eth_chainId"), 1);
    }

    #[test]
    fn test_empty_endpoint_list_rejected() {
        assert!(matches!(
            FailoverRouter::new(Vec::new(), TIMEOUT, 3),
            Err(RouterError::NoEndpoints)
        ));
    }
}
