//! # Rebalance Strategy
//!
//! Keeps a local, consistent view of the pairs a factory has created and
//! drives rebalance transactions against them.
//!
//! ## Architecture
//!
//! ```text
//! RebalanceService
//!   ├── PairDiscovery       allPairs(i) probing, bounded expansion
//!   ├── RebalanceEstimator  swap sizing, constant-product output, gas
//!   ├── MonitorSupervisor   one TransactionMonitor task per submission
//!   └── UpdateFunnel        applies LedgerUpdates from LogPoller
//!          │
//!          ▼
//!   PoolStore (pool-state)  ◄── every write lands here
//!          ▲
//!   LedgerReader / FailoverRouter (ledger-adapter)
//! ```
//!
//! State lives in process memory and is rebuilt by discovery on restart.

#[macro_use]
pub mod logging;

pub mod discovery;
pub mod error;
pub mod estimator;
pub mod events;
pub mod monitor;
pub mod service;

pub use discovery::{DiscoveryReport, PairDiscovery, PairFailure, Termination, MAX_PAIR_PROBES};
pub use error::{ErrorCategory, ServiceError};
pub use estimator::RebalanceEstimator;
pub use events::{LedgerUpdate, LogPoller, UpdateFunnel};
pub use logging::init_tracing;
pub use monitor::{MonitorSupervisor, TransactionMonitor};
pub use service::{RebalanceService, SubmitRequest, DEFAULT_SLIPPAGE_PCT};
