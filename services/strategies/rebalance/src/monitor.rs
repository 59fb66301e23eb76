//! Transaction monitoring
//!
//! Each submitted rebalance gets a worker task that polls for its receipt
//! and decides the outcome, and a supervising task that writes that outcome
//! to the store. If the worker panics or is aborted the supervisor still
//! writes `Failed`, so no event stays pending once its monitor has started.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use ledger_adapter::{LedgerReader, TxReceipt};
use pool_state::{PoolStore, Resolution};
use rebalancer_config::MonitorConfig;
use rebalancer_types::{Address, H256};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, error, info, warn};

use crate::logging::LogEmoji;

pub struct TransactionMonitor {
    reader: LedgerReader,
    config: MonitorConfig,
}

impl TransactionMonitor {
    pub fn new(reader: LedgerReader, config: MonitorConfig) -> Self {
        Self { reader, config }
    }

    /// Wait for `tx_hash` to be mined and decide its terminal outcome.
    pub async fn resolve(&self, tx_hash: H256, pool: Address) -> Resolution {
        let deadline = Instant::now() + self.config.confirmation_timeout();

        loop {
            match self.reader.receipt(tx_hash).await {
                Ok(Some(receipt)) => return self.on_receipt(receipt, pool).await,
                Ok(None) => {}
                Err(e) => {
                    warn!(tx = %tx_hash, "Receipt lookup failed: {}", e);
                    return Resolution::Failed {
                        reason: format!("receipt lookup failed: {e}"),
                        at: Utc::now(),
                    };
                }
            }

            if Instant::now() >= deadline {
                warn!(tx = %tx_hash, "Transaction not mined before confirmation timeout");
                return Resolution::Failed {
                    reason: format!(
                        "not mined within {}s",
                        self.config.confirmation_timeout().as_secs()
                    ),
                    at: Utc::now(),
                };
            }
            sleep(self.config.poll_interval()).await;
        }
    }

    async fn on_receipt(&self, receipt: TxReceipt, pool: Address) -> Resolution {
        if !receipt.succeeded() {
            return Resolution::Failed {
                reason: match receipt.block_number {
                    Some(block) => format!("reverted in block {block}"),
                    None => "reverted".to_string(),
                },
                at: Utc::now(),
            };
        }

        // The transaction is mined either way; a failed read only skips the
        // reserve write.
        let reserves = match self.reader.reserves(pool).await {
            Ok(reserves) => Some(reserves),
            Err(e) => {
                warn!(tx = %receipt.tx_hash, pool = %pool, "Post-confirmation reserve read failed: {}", e);
                None
            }
        };

        Resolution::Confirmed {
            reserves,
            gas_used: receipt.gas_used,
            gas_price: receipt.effective_gas_price,
            block_number: receipt.block_number,
            at: Utc::now(),
        }
    }
}

struct MonitorHandle {
    worker: AbortHandle,
    supervisor: JoinHandle<()>,
}

/// Tracks in-flight monitors so shutdown can drain them.
pub struct MonitorSupervisor {
    monitor: Arc<TransactionMonitor>,
    store: Arc<PoolStore>,
    handles: DashMap<H256, MonitorHandle>,
}

impl MonitorSupervisor {
    pub fn new(monitor: Arc<TransactionMonitor>, store: Arc<PoolStore>) -> Self {
        Self {
            monitor,
            store,
            handles: DashMap::new(),
        }
    }

    /// Start monitoring `tx_hash`. Fire-and-forget: outcomes are only logged
    /// and written to the store.
    pub fn spawn(&self, tx_hash: H256, pool: Address) {
        self.handles.retain(|_, handle| !handle.supervisor.is_finished());

        let monitor = Arc::clone(&self.monitor);
        let worker = tokio::spawn(async move { monitor.resolve(tx_hash, pool).await });
        let worker_abort = worker.abort_handle();

        let store = Arc::clone(&self.store);
        let supervisor = tokio::spawn(async move {
            let resolution = match worker.await {
                Ok(resolution) => resolution,
                Err(e) => {
                    let reason = if e.is_cancelled() {
                        "monitor cancelled"
                    } else {
                        "monitor panicked"
                    };
                    error!(tx = %tx_hash, "{} {}, marking rebalance failed", LogEmoji::ERROR, reason);
                    Resolution::Failed {
                        reason: reason.to_string(),
                        at: Utc::now(),
                    }
                }
            };

            match store.resolve_rebalance(&tx_hash, resolution) {
                Ok(true) => {
                    let status = store.get_rebalance_event(&tx_hash).map(|event| event.status);
                    info!(tx = %tx_hash, pool = %pool, ?status, "Rebalance monitor finished");
                }
                Ok(false) => debug!(tx = %tx_hash, "Rebalance already resolved"),
                Err(e) => error!(tx = %tx_hash, "Could not record rebalance outcome: {}", e),
            }
        });

        self.handles.insert(
            tx_hash,
            MonitorHandle {
                worker: worker_abort,
                supervisor,
            },
        );
    }

    pub fn in_flight(&self) -> usize {
        self.handles
            .iter()
            .filter(|entry| !entry.value().supervisor.is_finished())
            .count()
    }

    /// Wait up to `grace` for running monitors, then abort the rest; their
    /// events are marked failed by the supervisors.
    pub async fn shutdown(&self, grace: Duration) {
        let hashes: Vec<H256> = self.handles.iter().map(|entry| *entry.key()).collect();
        let deadline = Instant::now() + grace;
        let mut aborted = 0usize;

        for hash in hashes {
            let Some((_, handle)) = self.handles.remove(&hash) else {
                continue;
            };
            let MonitorHandle {
                worker,
                mut supervisor,
            } = handle;

            if timeout_at(deadline, &mut supervisor).await.is_err() {
                worker.abort();
                aborted += 1;
                if let Err(e) = supervisor.await {
                    error!(tx = %hash, "Monitor supervisor failed: {}", e);
                }
            }
        }

        if aborted > 0 {
            warn!("{} Aborted {} rebalance monitors at shutdown", LogEmoji::WARNING, aborted);
        }
    }
}
