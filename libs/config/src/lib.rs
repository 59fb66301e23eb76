//! # Rebalancer Configuration
//!
//! Layered configuration for the rebalancer services: a base TOML file, an
//! optional per-environment overlay, then `REBALANCER__SECTION__KEY`
//! environment variables.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rebalancer_config::RebalancerConfig;
//!
//! let config = RebalancerConfig::load(None, Some("staging"))?;
//! println!("{} ledger endpoints", config.ledger.endpoints.len());
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod defaults;
pub mod rebalancer_config;

pub use rebalancer_config::{
    DiscoveryConfig, EstimatorConfig, EventsConfig, LedgerConfig, MonitorConfig,
    RebalancerConfig, ServiceSettings,
};
