//! # Rebalancer Types
//!
//! Shared data model for the pool synchronization and rebalance services.
//!
//! ## Design Philosophy
//!
//! - **No Precision Loss On Amounts**: reserves, supplies, TVL and swap amounts
//!   are `U256` and serialize as decimal strings
//! - **Floats Only For Ratios**: `currentRatio`, `targetRatio`, price impact and
//!   APY are plain `f64` values, never used to carry token amounts
//! - **Derived Fields Stay Derived**: `Pool::refresh_derived` is the only place
//!   `currentRatio`, `needsRebalancing` and `tvl` are written
//!
//! ## Quick Start
//!
//! ```rust
//! use rebalancer_types::{needs_rebalancing, ratio_of};
//! use rebalancer_types::U256;
//!
//! let ratio = ratio_of(U256::from(120u64), U256::from(100u64));
//! assert!(needs_rebalancing(ratio, 1.0));
//! ```

pub mod metrics;
pub mod numeric;
pub mod pool;
pub mod rebalance;
pub mod serde_helpers;
pub mod stats;

pub use metrics::{
    HistoricalSample, PerformanceSummary, PoolMetrics, Timeframe, TimeframeParseError,
};
pub use numeric::{f64_to_u256, ratio_from_bps, ratio_of, ratio_to_bps, u256_to_f64};
pub use pool::{needs_rebalancing, Pool, PoolUpdate, TokenInfo, REBALANCE_THRESHOLD};
pub use rebalance::{
    RebalanceEstimate, RebalanceEvent, RebalanceEventUpdate, RebalanceStatus, SwapDirection,
};
pub use stats::DashboardStats;

/// Re-exported so downstream crates agree on one set of ledger primitives.
pub use ethers_core::types::{Address, H256, U256, U512};

/// Maximum number of historical samples retained per pool.
pub const MAX_HISTORY_SAMPLES: usize = 1_000;

/// Ratios are encoded on-ledger as basis points of 1.0.
pub const RATIO_BPS_SCALE: u64 = 10_000;
