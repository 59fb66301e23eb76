//! Process-wide pool cache
//!
//! One `RwLock` guards pools, metrics, rebalance events and the cached
//! `DashboardStats`. Every mutation that changes the pool set recomputes the
//! stats before releasing the write guard, so readers never see stats that
//! belong to a different pool set.
//!
//! State is process memory only and is lost on restart.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rebalancer_types::{
    Address, DashboardStats, HistoricalSample, Pool, PoolMetrics, PoolUpdate, RebalanceEvent,
    RebalanceEventUpdate, RebalanceStatus, Timeframe, H256, MAX_HISTORY_SAMPLES, U256,
};
use tracing::{debug, info};

use crate::aggregates::{effective_time, insert_sample, performance_summary};
use crate::error::StoreError;

/// Swap fee charged by the pairs, in basis points (0.3%).
pub const SWAP_FEE_BPS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Created,
    /// Already tracked; ledger-derived fields were refreshed.
    Refreshed,
}

/// Terminal outcome written by a transaction monitor.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Confirmed {
        /// Fresh `(reserveA, reserveB)`, when the post-confirmation read worked.
        reserves: Option<(U256, U256)>,
        gas_used: Option<U256>,
        gas_price: Option<U256>,
        block_number: Option<u64>,
        at: DateTime<Utc>,
    },
    Failed {
        reason: String,
        at: DateTime<Utc>,
    },
}

/// Pools and stats read under a single guard.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSnapshot {
    pub pools: Vec<Pool>,
    pub stats: DashboardStats,
}

#[derive(Debug, Default)]
struct StoreInner {
    pools: HashMap<Address, Pool>,
    metrics: HashMap<Address, PoolMetrics>,
    events: HashMap<H256, RebalanceEvent>,
    stats: DashboardStats,
}

impl StoreInner {
    fn recompute_stats(&mut self) {
        self.stats = DashboardStats::from_pools(self.pools.values());
    }

    fn sorted_pools(&self) -> Vec<Pool> {
        let mut pools: Vec<Pool> = self.pools.values().cloned().collect();
        pools.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.address.cmp(&b.address)));
        pools
    }

    fn append_history(&mut self, event: &RebalanceEvent) {
        if let Some(metrics) = self.metrics.get_mut(&event.pool_address) {
            metrics.rebalance_history.push(event.clone());
        }
    }
}

#[derive(Debug, Default)]
pub struct PoolStore {
    inner: RwLock<StoreInner>,
}

impl PoolStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `pool`, creating empty metrics on first sight. A pool that is
    /// already tracked only has its ledger-derived fields refreshed; its
    /// metrics are never touched.
    pub fn add_pool(&self, pool: Pool) -> AddOutcome {
        let mut inner = self.inner.write();
        let address = pool.address;

        let outcome = match inner.pools.get_mut(&address) {
            Some(existing) => {
                existing.refresh_from(&pool);
                AddOutcome::Refreshed
            }
            None => {
                inner.pools.insert(address, pool);
                AddOutcome::Created
            }
        };
        inner
            .metrics
            .entry(address)
            .or_insert_with(|| PoolMetrics::empty(address));
        inner.recompute_stats();

        debug!(pool = %address, ?outcome, "Pool stored");
        outcome
    }

    pub fn get_pool(&self, address: &Address) -> Option<Pool> {
        self.inner.read().pools.get(address).cloned()
    }

    pub fn contains_pool(&self, address: &Address) -> bool {
        self.inner.read().pools.contains_key(address)
    }

    /// All pools, oldest first.
    pub fn list_pools(&self) -> Vec<Pool> {
        self.inner.read().sorted_pools()
    }

    pub fn pool_count(&self) -> usize {
        self.inner.read().pools.len()
    }

    /// Apply a partial update; derived fields are recomputed.
    pub fn update_pool(&self, address: &Address, update: &PoolUpdate) -> Result<Pool, StoreError> {
        let mut inner = self.inner.write();
        let pool = inner
            .pools
            .get_mut(address)
            .ok_or(StoreError::PoolNotFound(*address))?;
        pool.apply(update);
        let updated = pool.clone();
        inner.recompute_stats();
        Ok(updated)
    }

    /// Remove the pool and its metrics. Rebalance events stay queryable.
    pub fn remove_pool(&self, address: &Address) -> Option<Pool> {
        let mut inner = self.inner.write();
        let removed = inner.pools.remove(address);
        if removed.is_some() {
            inner.metrics.remove(address);
            inner.recompute_stats();
            info!(pool = %address, "Pool removed from store");
        }
        removed
    }

    pub fn add_historical_sample(&self, address: &Address, sample: HistoricalSample) -> Result<(), StoreError> {
        if !sample.ratio.is_finite() {
            return Err(StoreError::InvalidSample {
                reason: format!("non-finite ratio {}", sample.ratio),
            });
        }
        let mut inner = self.inner.write();
        let metrics = inner
            .metrics
            .get_mut(address)
            .ok_or(StoreError::PoolNotFound(*address))?;
        insert_sample(&mut metrics.historical, sample, MAX_HISTORY_SAMPLES);
        Ok(())
    }

    /// Record a new event. Terminal events go straight into the pool's
    /// history.
    pub fn add_rebalance_event(&self, event: RebalanceEvent) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if !inner.pools.contains_key(&event.pool_address) {
            return Err(StoreError::PoolNotFound(event.pool_address));
        }
        if inner.events.contains_key(&event.tx_hash) {
            return Err(StoreError::DuplicateEvent(event.tx_hash));
        }
        if event.status.is_terminal() {
            inner.append_history(&event);
        }
        debug!(tx = %event.tx_hash, pool = %event.pool_address, status = ?event.status, "Rebalance event recorded");
        inner.events.insert(event.tx_hash, event);
        Ok(())
    }

    /// Apply a partial update. Returns `Ok(false)` without changing anything
    /// when the event already reached a terminal status.
    pub fn update_rebalance_event(
        &self,
        tx_hash: &H256,
        update: &RebalanceEventUpdate,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write();
        let event = inner
            .events
            .get_mut(tx_hash)
            .ok_or(StoreError::EventNotFound(*tx_hash))?;
        if !event.apply(update) {
            debug!(tx = %tx_hash, "Ignoring update to terminal rebalance event");
            return Ok(false);
        }
        if event.status.is_terminal() {
            let event = event.clone();
            inner.append_history(&event);
        }
        Ok(true)
    }

    /// Single atomic terminal write for a submitted rebalance.
    ///
    /// Confirmed: event fields, and, while the pool is still tracked,
    /// `lastRebalance`, `rebalanceCount + 1`, fresh reserves and a sample when
    /// given. Failed: event fields only. Both append to the pool history.
    /// Returns `Ok(false)` if the event was already terminal.
    pub fn resolve_rebalance(&self, tx_hash: &H256, resolution: Resolution) -> Result<bool, StoreError> {
        let mut inner = self.inner.write();
        let event = inner
            .events
            .get(tx_hash)
            .ok_or(StoreError::EventNotFound(*tx_hash))?;
        if event.status.is_terminal() {
            return Ok(false);
        }
        let pool_address = event.pool_address;
        let swap_volume = event.swap_amount_a.saturating_add(event.swap_amount_b);

        let update = match resolution {
            Resolution::Failed { reason, at } => RebalanceEventUpdate {
                status: Some(RebalanceStatus::Failed),
                failure_reason: Some(reason),
                resolved_at: Some(at),
                ..Default::default()
            },
            Resolution::Confirmed {
                reserves,
                gas_used,
                gas_price,
                block_number,
                at,
            } => {
                let mut to_ratio = None;
                let mut sample = None;

                if let Some(pool) = inner.pools.get_mut(&pool_address) {
                    let mut pool_update = PoolUpdate {
                        last_rebalance: Some(at),
                        rebalance_count: Some(pool.rebalance_count + 1),
                        ..Default::default()
                    };
                    if let Some((reserve_a, reserve_b)) = reserves {
                        pool_update.reserve_a = Some(reserve_a);
                        pool_update.reserve_b = Some(reserve_b);
                    }
                    pool.apply(&pool_update);

                    if reserves.is_some() {
                        to_ratio = Some(pool.current_ratio);
                        sample = Some(HistoricalSample {
                            timestamp: at,
                            ratio: pool.current_ratio,
                            tvl: pool.tvl,
                            volume: swap_volume,
                            fees: swap_volume.saturating_mul(U256::from(SWAP_FEE_BPS))
                                / U256::from(10_000u64),
                        });
                    }
                }

                if let (Some(sample), Some(metrics)) = (sample, inner.metrics.get_mut(&pool_address)) {
                    insert_sample(&mut metrics.historical, sample, MAX_HISTORY_SAMPLES);
                }
                inner.recompute_stats();

                RebalanceEventUpdate {
                    status: Some(RebalanceStatus::Confirmed),
                    to_ratio,
                    gas_used,
                    gas_price,
                    block_number,
                    resolved_at: Some(at),
                    ..Default::default()
                }
            }
        };

        let resolved = match inner.events.get_mut(tx_hash) {
            Some(event) => {
                event.apply(&update);
                event.clone()
            }
            None => return Err(StoreError::EventNotFound(*tx_hash)),
        };
        inner.append_history(&resolved);

        info!(tx = %tx_hash, pool = %pool_address, status = ?resolved.status, "Rebalance resolved");
        Ok(true)
    }

    pub fn get_rebalance_event(&self, tx_hash: &H256) -> Option<RebalanceEvent> {
        self.inner.read().events.get(tx_hash).cloned()
    }

    pub fn pending_events(&self) -> Vec<RebalanceEvent> {
        self.inner
            .read()
            .events
            .values()
            .filter(|event| !event.status.is_terminal())
            .cloned()
            .collect()
    }

    /// Metrics restricted to `timeframe` ending at `now`, with the
    /// performance summary computed over that window.
    pub fn get_pool_metrics(
        &self,
        address: &Address,
        timeframe: Timeframe,
        now: DateTime<Utc>,
    ) -> Result<PoolMetrics, StoreError> {
        let inner = self.inner.read();
        let metrics = inner
            .metrics
            .get(address)
            .ok_or(StoreError::PoolNotFound(*address))?;
        let start = timeframe.start(now);
        let in_window = |at: DateTime<Utc>| start.map_or(true, |start| at >= start);

        let historical = metrics
            .historical
            .iter()
            .filter(|sample| in_window(sample.timestamp))
            .cloned()
            .collect();
        let rebalance_history: Vec<RebalanceEvent> = metrics
            .rebalance_history
            .iter()
            .filter(|event| in_window(effective_time(event)))
            .cloned()
            .collect();

        let mut windowed = PoolMetrics {
            pool_address: *address,
            historical,
            rebalance_history,
            performance: Default::default(),
        };
        windowed.performance = performance_summary(&windowed.historical, &windowed.rebalance_history);
        Ok(windowed)
    }

    pub fn get_dashboard_stats(&self) -> DashboardStats {
        self.inner.read().stats.clone()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let inner = self.inner.read();
        StoreSnapshot {
            pools: inner.sorted_pools(),
            stats: inner.stats.clone(),
        }
    }
}
