//! Pair discovery by bounded index probing
//!
//! The factory only exposes `allPairs(i)`, so indexes are probed in order
//! until one of the termination rules fires:
//!
//! - `allPairs(i)` returns the zero address
//! - `allPairs(i)` fails fatally (treated as index out of range)
//! - `MAX_PAIR_PROBES` indexes have been probed
//! - the discovery budget runs out
//! - every endpoint failed with retryable errors
//!
//! Found pairs are then expanded into `Pool` records with bounded
//! concurrency. A pair that cannot be read is recorded and skipped.

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use ledger_adapter::{LedgerReader, RouterError};
use pool_state::{AddOutcome, PoolStore};
use rebalancer_config::DiscoveryConfig;
use rebalancer_types::{Address, Pool, TokenInfo};
use serde::Serialize;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::error::ServiceError;
use crate::log_search;

/// Hard upper bound on `allPairs` probes per discovery run.
pub const MAX_PAIR_PROBES: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Termination {
    ZeroAddress,
    IndexOutOfRange,
    ProbeLimit,
    BudgetExhausted,
    EndpointsExhausted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairFailure {
    pub index: u64,
    pub pair: Address,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryReport {
    pub factory: Address,
    /// Store view of every pair expanded in this run, in index order.
    pub pools: Vec<Pool>,
    pub failures: Vec<PairFailure>,
    pub termination: Termination,
    /// Number of `allPairs` calls issued.
    pub probed: u64,
    pub created: usize,
}

pub struct PairDiscovery {
    reader: LedgerReader,
    store: Arc<PoolStore>,
    config: DiscoveryConfig,
}

impl PairDiscovery {
    pub fn new(reader: LedgerReader, store: Arc<PoolStore>, config: DiscoveryConfig) -> Self {
        Self {
            reader,
            store,
            config,
        }
    }

    pub async fn discover(&self, factory: Address) -> Result<DiscoveryReport, ServiceError> {
        if factory.is_zero() {
            return Err(ServiceError::InvalidAddress {
                address: factory,
                reason: "zero address".to_string(),
            });
        }
        let deadline = Instant::now() + self.config.budget();

        let code = self.reader.get_code(factory).await?;
        if code.is_empty() {
            return Err(ServiceError::InvalidAddress {
                address: factory,
                reason: "no contract code".to_string(),
            });
        }

        log_search!("Discovering pairs from factory {:#x}", factory);
        let (found, termination, probed) = self.probe(factory, deadline).await;
        debug!(factory = %factory, found = found.len(), ?termination, probed, "Probing finished");

        let expansions: Vec<(u64, Address, Option<Result<Pool, RouterError>>)> = stream::iter(found)
            .map(|(index, pair)| async move {
                let result = timeout_at(deadline, self.expand_pair(pair)).await.ok();
                (index, pair, result)
            })
            .buffered(self.config.max_concurrent_expansions.max(1))
            .collect()
            .await;

        let mut report = DiscoveryReport {
            factory,
            pools: Vec::new(),
            failures: Vec::new(),
            termination,
            probed,
            created: 0,
        };

        for (index, pair, result) in expansions {
            match result {
                Some(Ok(pool)) => {
                    if self.store.add_pool(pool) == AddOutcome::Created {
                        report.created += 1;
                    }
                    if let Some(stored) = self.store.get_pool(&pair) {
                        report.pools.push(stored);
                    }
                }
                Some(Err(e)) => {
                    warn!(index, pair = %pair, "Skipping pair: {}", e);
                    report.failures.push(PairFailure {
                        index,
                        pair,
                        error: e.to_string(),
                    });
                }
                None => {
                    warn!(index, pair = %pair, "Discovery budget exhausted before pair was read");
                    report.termination = Termination::BudgetExhausted;
                    report.failures.push(PairFailure {
                        index,
                        pair,
                        error: "discovery budget exhausted".to_string(),
                    });
                }
            }
        }

        log_search!(
            "Discovered {} pools ({} new, {} skipped) from {:#x}, stopped on {:?} after {} probes",
            report.pools.len(),
            report.created,
            report.failures.len(),
            factory,
            report.termination,
            report.probed
        );
        Ok(report)
    }

    async fn probe(&self, factory: Address, deadline: Instant) -> (Vec<(u64, Address)>, Termination, u64) {
        let mut found = Vec::new();

        for index in 0..MAX_PAIR_PROBES {
            let outcome = match timeout_at(deadline, self.reader.all_pairs(factory, index)).await {
                Ok(outcome) => outcome,
                Err(_) => return (found, Termination::BudgetExhausted, index + 1),
            };
            match outcome {
                Ok(pair) if pair.is_zero() => return (found, Termination::ZeroAddress, index + 1),
                Ok(pair) => found.push((index, pair)),
                Err(e) if e.is_fatal() => {
                    debug!(index, "allPairs rejected, treating as end of registry: {}", e);
                    return (found, Termination::IndexOutOfRange, index + 1);
                }
                Err(e) => {
                    warn!(index, "Stopping discovery, endpoints exhausted: {}", e);
                    return (found, Termination::EndpointsExhausted, index + 1);
                }
            }
        }
        (found, Termination::ProbeLimit, MAX_PAIR_PROBES)
    }

    /// Read one pair into a fresh `Pool`. Symbol reads degrade to the
    /// placeholder; every other read must succeed.
    pub async fn expand_pair(&self, pair: Address) -> Result<Pool, RouterError> {
        let (token0, token1, (reserve0, reserve1), total_supply) = tokio::try_join!(
            self.reader.token0(pair),
            self.reader.token1(pair),
            self.reader.reserves(pair),
            self.reader.total_supply(pair),
        )?;
        let (symbol0, symbol1) = tokio::join!(self.symbol_or_placeholder(token0), self.symbol_or_placeholder(token1));

        Ok(Pool::new(
            pair,
            TokenInfo::new(token0, symbol0),
            TokenInfo::new(token1, symbol1),
            reserve0,
            reserve1,
            total_supply,
            self.config.default_target_ratio,
            Utc::now(),
        ))
    }

    async fn symbol_or_placeholder(&self, token: Address) -> String {
        match self.reader.symbol(token).await {
            Ok(symbol) => symbol,
            Err(e) => {
                debug!(token = %token, "symbol() unreadable, using placeholder: {}", e);
                self.config.placeholder_symbol.clone()
            }
        }
    }
}
