//! # Pool State
//!
//! In-memory store for tracked pools, their metrics and submitted rebalance
//! transactions, with `DashboardStats` kept as a cache of a pure fold over the
//! pool set.
//!
//! ```text
//! PairDiscovery ─┐
//! UpdateFunnel  ─┼─► PoolStore (single RwLock) ─► API reads / snapshot()
//! TxMonitor     ─┘     pools · metrics · events · stats
//! ```
//!
//! The store is injected as `Arc<PoolStore>`; it holds no global state and
//! nothing survives a restart.

pub mod aggregates;
pub mod error;
pub mod store;

pub use error::StoreError;
pub use store::{AddOutcome, PoolStore, Resolution, StoreSnapshot, SWAP_FEE_BPS};
