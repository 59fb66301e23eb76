use chrono::{DateTime, Utc};
use ledger_adapter::RouterError;
use pool_state::StoreError;
use rebalancer_types::{Address, H256, U256};
use thiserror::Error;

/// What the caller should do about a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Transient ledger trouble; retrying later may succeed.
    Network,
    /// The request names something invalid; retrying will not help.
    Validation,
    /// The ledger rejected the operation itself.
    Fatal,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("pool {0:#x} is not tracked")]
    PoolNotFound(Address),

    #[error("invalid address {address:#x}: {reason}")]
    InvalidAddress { address: Address, reason: String },

    #[error("target ratio must be a positive finite number, got {0}")]
    InvalidTargetRatio(f64),

    #[error("slippage tolerance must be within [0, 100] percent, got {0}")]
    InvalidSlippage(f64),

    #[error("missing configuration: {0}")]
    MissingConfig(&'static str),

    #[error("rebalance cooldown active until {ready_at}")]
    CooldownActive { ready_at: DateTime<Utc> },

    #[error("gas price {current} wei exceeds limit {limit} wei")]
    GasPriceAboveLimit { current: U256, limit: U256 },

    #[error("transaction {0:#x} not found")]
    TransactionNotFound(H256),

    #[error("{operation} exceeded its {deadline_ms}ms deadline")]
    DeadlineExceeded {
        operation: &'static str,
        deadline_ms: u64,
    },

    #[error(transparent)]
    Ledger(#[from] RouterError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ServiceError::PoolNotFound(_)
            | ServiceError::InvalidAddress { .. }
            | ServiceError::InvalidTargetRatio(_)
            | ServiceError::InvalidSlippage(_)
            | ServiceError::MissingConfig(_)
            | ServiceError::CooldownActive { .. }
            | ServiceError::GasPriceAboveLimit { .. }
            | ServiceError::TransactionNotFound(_) => ErrorCategory::Validation,
            ServiceError::DeadlineExceeded { .. } => ErrorCategory::Network,
            ServiceError::Ledger(e) => match e {
                RouterError::Exhausted { .. } | RouterError::Unconfirmed { .. } => {
                    ErrorCategory::Network
                }
                RouterError::Fatal { .. } => ErrorCategory::Fatal,
                RouterError::NoEndpoints | RouterError::InvalidEndpoint { .. } => {
                    ErrorCategory::Validation
                }
            },
            ServiceError::Store(e) => match e {
                StoreError::DuplicateEvent(_) => ErrorCategory::Fatal,
                _ => ErrorCategory::Validation,
            },
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Network
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_adapter::{ClassifiedError, ErrorKind};

    #[test]
    fn test_ledger_errors_split_by_disposition() {
        let last = ClassifiedError::new(ErrorKind::Timeout, "http://a", "slow");
        let exhausted = ServiceError::from(RouterError::Exhausted {
            operation: "reserve0".into(),
            attempted: 2,
            last,
        });
        assert_eq!(exhausted.category(), ErrorCategory::Network);
        assert!(exhausted.is_retryable());

        let fatal = ServiceError::from(RouterError::Fatal {
            operation: "rebalance".into(),
            source: ClassifiedError::new(ErrorKind::Revert, "http://a", "execution reverted"),
        });
        assert_eq!(fatal.category(), ErrorCategory::Fatal);
    }

    #[test]
    fn test_validation_errors() {
        assert_eq!(
            ServiceError::PoolNotFound(Address::zero()).category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            ServiceError::Store(StoreError::PoolNotFound(Address::zero())).category(),
            ErrorCategory::Validation
        );
    }
}
