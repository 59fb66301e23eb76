//! Push updates from the ledger
//!
//! `LogPoller` turns factory and rebalancer logs into `LedgerUpdate`s on an
//! mpsc channel; `UpdateFunnel` applies them to the store. Updates are applied
//! in the order they were received.

use std::sync::Arc;

use chrono::Utc;
use dex::{decode_log, pair_created_topic, rebalance_topic, LedgerLog};
use ledger_adapter::{LedgerReader, LogQuery, RouterError};
use pool_state::{AddOutcome, PoolStore};
use rebalancer_config::EventsConfig;
use rebalancer_types::{ratio_from_bps, Address, HistoricalSample, PoolUpdate, U256};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::discovery::PairDiscovery;
use crate::error::ServiceError;
use crate::logging::LogEmoji;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerUpdate {
    PairCreated {
        token0: Address,
        token1: Address,
        pair: Address,
        index: u64,
    },
    Rebalance {
        pair: Address,
        old_ratio_bps: U256,
        new_ratio_bps: U256,
        target_ratio_bps: U256,
    },
}

impl From<LedgerLog> for LedgerUpdate {
    fn from(log: LedgerLog) -> Self {
        match log {
            LedgerLog::PairCreated(created) => LedgerUpdate::PairCreated {
                token0: created.token0,
                token1: created.token1,
                pair: created.pair,
                index: created.index.low_u64(),
            },
            LedgerLog::Rebalance(rebalance) => LedgerUpdate::Rebalance {
                pair: rebalance.pair,
                old_ratio_bps: rebalance.old_ratio_bps,
                new_ratio_bps: rebalance.new_ratio_bps,
                target_ratio_bps: rebalance.target_ratio_bps,
            },
        }
    }
}

/// Applies pushed updates to the store.
pub struct UpdateFunnel {
    discovery: Arc<PairDiscovery>,
    reader: LedgerReader,
    store: Arc<PoolStore>,
}

impl UpdateFunnel {
    pub fn new(discovery: Arc<PairDiscovery>, reader: LedgerReader, store: Arc<PoolStore>) -> Self {
        Self {
            discovery,
            reader,
            store,
        }
    }

    pub async fn apply(&self, update: LedgerUpdate) -> Result<(), ServiceError> {
        match update {
            LedgerUpdate::PairCreated { pair, index, .. } => {
                let pool = self.discovery.expand_pair(pair).await?;
                let symbols = format!("{}/{}", pool.token_a.symbol, pool.token_b.symbol);
                if self.store.add_pool(pool) == AddOutcome::Created {
                    info!("{} New pair {} at index {}: {:#x}", LogEmoji::POOL, symbols, index, pair);
                }
            }
            LedgerUpdate::Rebalance {
                pair,
                target_ratio_bps,
                ..
            } => {
                if !self.store.contains_pool(&pair) {
                    debug!(pair = %pair, "Rebalance log for untracked pair ignored");
                    return Ok(());
                }
                let (reserve_a, reserve_b) = self.reader.reserves(pair).await?;
                let pool = self.store.update_pool(
                    &pair,
                    &PoolUpdate {
                        target_ratio: Some(ratio_from_bps(target_ratio_bps)),
                        ..PoolUpdate::reserves(reserve_a, reserve_b)
                    },
                )?;
                self.store.add_historical_sample(
                    &pair,
                    HistoricalSample {
                        timestamp: Utc::now(),
                        ratio: pool.current_ratio,
                        tvl: pool.tvl,
                        volume: U256::zero(),
                        fees: U256::zero(),
                    },
                )?;
                debug!(pair = %pair, ratio = pool.current_ratio, "Pool refreshed from rebalance log");
            }
        }
        Ok(())
    }

    /// Consume updates until every sender is dropped.
    pub async fn run(self, mut rx: mpsc::Receiver<LedgerUpdate>) {
        while let Some(update) = rx.recv().await {
            if let Err(e) = self.apply(update.clone()).await {
                warn!(?update, "Failed to apply ledger update: {}", e);
            }
        }
        debug!("Update channel closed, funnel stopping");
    }
}

/// Polls `eth_getLogs` for PairCreated and Rebalance logs.
pub struct LogPoller {
    reader: LedgerReader,
    factory: Address,
    rebalancer: Option<Address>,
    config: EventsConfig,
    next_block: Option<u64>,
}

impl LogPoller {
    pub fn new(
        reader: LedgerReader,
        factory: Address,
        rebalancer: Option<Address>,
        config: EventsConfig,
    ) -> Self {
        Self {
            reader,
            factory,
            rebalancer,
            config,
            next_block: None,
        }
    }

    /// Start from `block` instead of the chain head on the first poll.
    pub fn starting_at(mut self, block: u64) -> Self {
        self.next_block = Some(block);
        self
    }

    pub fn next_block(&self) -> Option<u64> {
        self.next_block
    }

    /// Fetch one block range and forward its updates. Returns how many
    /// updates were sent.
    pub async fn poll_once(&mut self, tx: &mpsc::Sender<LedgerUpdate>) -> Result<usize, RouterError> {
        let head = self.reader.block_number().await?;
        let from_block = self.next_block.unwrap_or(head);
        if from_block > head {
            return Ok(0);
        }
        let to_block = head.min(from_block.saturating_add(self.config.max_block_range - 1));

        let mut addresses = vec![self.factory];
        addresses.extend(self.rebalancer);
        let query = LogQuery {
            addresses,
            topics: vec![pair_created_topic(), rebalance_topic()],
            from_block,
            to_block,
        };

        let mut logs = self.reader.logs(&query).await?;
        logs.sort_by_key(|log| (log.block_number, log.log_index));

        let mut sent = 0;
        for log in logs {
            let update = match decode_log(&log.topics, &log.data) {
                Ok(decoded) => LedgerUpdate::from(decoded),
                Err(e) => {
                    warn!(address = %log.address, block = ?log.block_number, "Skipping undecodable log: {}", e);
                    continue;
                }
            };
            if tx.send(update).await.is_err() {
                debug!("Update channel closed mid-batch");
                break;
            }
            sent += 1;
        }

        self.next_block = Some(to_block + 1);
        debug!(from_block, to_block, sent, "Polled ledger logs");
        Ok(sent)
    }

    /// Poll until the receiving side goes away.
    pub async fn run(mut self, tx: mpsc::Sender<LedgerUpdate>) {
        info!("{} Watching logs for factory {:#x}", LogEmoji::SEARCH, self.factory);
        while !tx.is_closed() {
            if let Err(e) = self.poll_once(&tx).await {
                warn!("Log poll failed, retrying next interval: {}", e);
            }
            sleep(self.config.poll_interval()).await;
        }
        debug!("Log poller stopping");
    }
}
