//! `RebalanceService`, the API-facing facade
//!
//! Wires the reader, store, discovery, estimator and monitors together and
//! exposes the operations the UI calls. Every error maps to a
//! `ServiceError` with a category.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use ledger_adapter::{FailoverRouter, LedgerReader};
use pool_state::PoolStore;
use rebalancer_config::RebalancerConfig;
use rebalancer_types::{
    ratio_to_bps, Address, DashboardStats, Pool, PoolMetrics, RebalanceEstimate, RebalanceEvent,
    Timeframe, H256, U256,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::discovery::{DiscoveryReport, PairDiscovery};
use crate::error::ServiceError;
use crate::estimator::{validate_slippage, validate_target_ratio, RebalanceEstimator};
use crate::events::{LedgerUpdate, LogPoller, UpdateFunnel};
use crate::logging::LogEmoji;
use crate::monitor::{MonitorSupervisor, TransactionMonitor};

/// Slippage recorded on a submission when the caller gives none.
pub const DEFAULT_SLIPPAGE_PCT: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct SubmitRequest {
    pub pool: Address,
    pub target_ratio: f64,
    /// Reject the submission if the current gas price is above this.
    pub max_gas_price: Option<U256>,
    pub slippage: Option<f64>,
    /// Skip the cooldown gate.
    pub force: bool,
}

impl SubmitRequest {
    pub fn new(pool: Address, target_ratio: f64) -> Self {
        Self {
            pool,
            target_ratio,
            max_gas_price: None,
            slippage: None,
            force: false,
        }
    }
}

pub struct RebalanceService {
    config: RebalancerConfig,
    reader: LedgerReader,
    store: Arc<PoolStore>,
    discovery: Arc<PairDiscovery>,
    estimator: RebalanceEstimator,
    monitors: MonitorSupervisor,
}

impl RebalanceService {
    pub fn new(config: RebalancerConfig, router: Arc<FailoverRouter>, store: Arc<PoolStore>) -> Self {
        let reader = LedgerReader::new(router);
        let discovery = Arc::new(PairDiscovery::new(
            reader.clone(),
            Arc::clone(&store),
            config.discovery.clone(),
        ));
        let estimator = RebalanceEstimator::new(
            reader.clone(),
            Arc::clone(&store),
            config.estimator.clone(),
            config.ledger.rebalancer_contract,
        );
        let monitor = Arc::new(TransactionMonitor::new(reader.clone(), config.monitor.clone()));
        let monitors = MonitorSupervisor::new(monitor, Arc::clone(&store));

        Self {
            config,
            reader,
            store,
            discovery,
            estimator,
            monitors,
        }
    }

    /// Build the HTTP router from `config.ledger` and start with an empty store.
    pub fn from_config(config: RebalancerConfig) -> Result<Self, ServiceError> {
        let router = Arc::new(FailoverRouter::from_config(&config.ledger)?);
        Ok(Self::new(config, router, Arc::new(PoolStore::new())))
    }

    /// Reject the endpoint list if any endpoint serves a chain other than
    /// `ledger.chain_id`.
    pub async fn verify_chain(&self) -> Result<(), ServiceError> {
        let expected = self.config.ledger.chain_id;
        self.reader.router().verify_chain_id(expected).await?;
        info!("{} Ledger endpoints on chain {}", LogEmoji::SUCCESS, expected);
        Ok(())
    }

    pub fn store(&self) -> &Arc<PoolStore> {
        &self.store
    }

    pub fn config(&self) -> &RebalancerConfig {
        &self.config
    }

    async fn with_deadline<T, F>(&self, operation: &'static str, future: F) -> Result<T, ServiceError>
    where
        F: Future<Output = Result<T, ServiceError>>,
    {
        let deadline = self.config.service.operation_deadline();
        match tokio::time::timeout(deadline, future).await {
            Ok(result) => result,
            Err(_) => {
                error!("{} {} exceeded {:?}", LogEmoji::CLOCK, operation, deadline);
                Err(ServiceError::DeadlineExceeded {
                    operation,
                    deadline_ms: self.config.service.operation_deadline_ms,
                })
            }
        }
    }

    pub async fn discover_pairs(&self, factory: Address) -> Result<DiscoveryReport, ServiceError> {
        self.with_deadline("discover_pairs", self.discovery.discover(factory))
            .await
    }

    pub fn get_pool(&self, address: Address) -> Result<Pool, ServiceError> {
        self.store
            .get_pool(&address)
            .ok_or(ServiceError::PoolNotFound(address))
    }

    pub fn list_pools(&self) -> Vec<Pool> {
        self.store.list_pools()
    }

    pub fn get_pool_metrics(&self, address: Address, timeframe: Timeframe) -> Result<PoolMetrics, ServiceError> {
        Ok(self.store.get_pool_metrics(&address, timeframe, Utc::now())?)
    }

    pub async fn estimate_rebalance(
        &self,
        pool: Address,
        target_ratio: f64,
        slippage: f64,
    ) -> Result<RebalanceEstimate, ServiceError> {
        self.with_deadline(
            "estimate_rebalance",
            self.estimator.estimate(pool, target_ratio, slippage),
        )
        .await
    }

    /// Send a rebalance transaction and start monitoring it. The returned
    /// hash is pending; poll `get_transaction_status` for the outcome.
    ///
    /// Checks before the send run under the operation deadline; the send and
    /// its bookkeeping do not, so a broadcast transaction is always recorded.
    pub async fn submit_rebalance(&self, request: SubmitRequest) -> Result<H256, ServiceError> {
        validate_target_ratio(request.target_ratio)?;
        let slippage = request.slippage.unwrap_or(DEFAULT_SLIPPAGE_PCT);
        validate_slippage(slippage)?;
        let pool = self.get_pool(request.pool)?;
        let contract = self
            .config
            .ledger
            .rebalancer_contract
            .ok_or(ServiceError::MissingConfig("ledger.rebalancer_contract"))?;

        let (gas_price, estimate) = self
            .with_deadline(
                "submit_rebalance",
                self.prepare_submission(&request, &pool, contract, slippage),
            )
            .await?;

        let tx_hash = self
            .reader
            .submit_rebalance(
                contract,
                pool.address,
                ratio_to_bps(request.target_ratio),
                Some(gas_price),
            )
            .await?;

        let from_ratio = estimate
            .as_ref()
            .map(|estimate| estimate.current_ratio)
            .unwrap_or(pool.current_ratio);
        let mut event = RebalanceEvent::pending(
            tx_hash,
            pool.address,
            from_ratio,
            request.target_ratio,
            Utc::now(),
        );
        event.slippage = slippage;
        event.gas_price = Some(gas_price);
        if let Some(estimate) = &estimate {
            event.swap_amount_a = estimate.swap_amount_a;
            event.swap_amount_b = estimate.swap_amount_b;
        }

        // Already sent: the hash is returned even if recording fails.
        match self.store.add_rebalance_event(event) {
            Ok(()) => self.monitors.spawn(tx_hash, pool.address),
            Err(e) => error!(tx = %tx_hash, "Rebalance sent but not recorded: {}", e),
        }

        info!(
            "{} Submitted rebalance of {:#x} toward {:.4}: {:#x}",
            LogEmoji::EXECUTE,
            pool.address,
            request.target_ratio,
            tx_hash
        );
        Ok(tx_hash)
    }

    async fn prepare_submission(
        &self,
        request: &SubmitRequest,
        pool: &Pool,
        contract: Address,
        slippage: f64,
    ) -> Result<(U256, Option<RebalanceEstimate>), ServiceError> {
        if !request.force {
            self.check_cooldown(contract, pool.address).await?;
        }

        let gas_price = self.estimator.gas_price().await;
        if let Some(limit) = request.max_gas_price {
            if gas_price > limit {
                info!("{} Gas price {} above limit {}, not submitting", LogEmoji::GAS, gas_price, limit);
                return Err(ServiceError::GasPriceAboveLimit {
                    current: gas_price,
                    limit,
                });
            }
        }

        let estimate = match self.estimator.estimate(pool.address, request.target_ratio, slippage).await {
            Ok(estimate) => Some(estimate),
            Err(e) => {
                debug!(pool = %pool.address, "Pre-submit estimate unavailable: {}", e);
                None
            }
        };
        Ok((gas_price, estimate))
    }

    async fn check_cooldown(&self, contract: Address, pool: Address) -> Result<(), ServiceError> {
        let (last, cooldown) = tokio::try_join!(
            self.reader.last_rebalance(contract, pool),
            self.reader.cooldown(contract),
        )?;
        let ready_at_secs = last.saturating_add(cooldown);
        let now_secs = U256::from(Utc::now().timestamp().max(0) as u64);

        if now_secs <= ready_at_secs {
            let ready_at = if ready_at_secs > U256::from(i64::MAX as u64) {
                None
            } else {
                Utc.timestamp_opt(ready_at_secs.low_u64() as i64, 0).single()
            }
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
            info!("{} Pool {:#x} in cooldown until {}", LogEmoji::CLOCK, pool, ready_at);
            return Err(ServiceError::CooldownActive { ready_at });
        }
        Ok(())
    }

    pub fn get_transaction_status(&self, tx_hash: H256) -> Result<RebalanceEvent, ServiceError> {
        self.store
            .get_rebalance_event(&tx_hash)
            .ok_or(ServiceError::TransactionNotFound(tx_hash))
    }

    pub fn dashboard_stats(&self) -> DashboardStats {
        self.store.get_dashboard_stats()
    }

    pub fn monitors_in_flight(&self) -> usize {
        self.monitors.in_flight()
    }

    /// Start an `UpdateFunnel` task and return the sender that feeds it.
    pub fn spawn_update_funnel(&self) -> (mpsc::Sender<LedgerUpdate>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(self.config.events.channel_capacity);
        let funnel = UpdateFunnel::new(
            Arc::clone(&self.discovery),
            self.reader.clone(),
            Arc::clone(&self.store),
        );
        (tx, tokio::spawn(funnel.run(rx)))
    }

    /// Start a `LogPoller` for `factory` feeding `tx`.
    pub fn spawn_log_poller(&self, factory: Address, tx: mpsc::Sender<LedgerUpdate>) -> JoinHandle<()> {
        let poller = LogPoller::new(
            self.reader.clone(),
            factory,
            self.config.ledger.rebalancer_contract,
            self.config.events.clone(),
        );
        tokio::spawn(poller.run(tx))
    }

    /// Drain in-flight monitors, waiting at most `monitor.shutdown_grace_ms`.
    pub async fn shutdown(&self) {
        self.shutdown_within(self.config.monitor.shutdown_grace()).await
    }

    pub async fn shutdown_within(&self, grace: Duration) {
        info!("Shutting down, {} monitors in flight", self.monitors.in_flight());
        self.monitors.shutdown(grace).await;
    }
}
