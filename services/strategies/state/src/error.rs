use rebalancer_types::{Address, H256};
use thiserror::Error;

/// Pool store errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("pool {0:#x} is not tracked")]
    PoolNotFound(Address),

    #[error("rebalance event {0:#x} not found")]
    EventNotFound(H256),

    #[error("rebalance event {0:#x} already recorded")]
    DuplicateEvent(H256),

    #[error("invalid sample: {reason}")]
    InvalidSample { reason: String },
}
