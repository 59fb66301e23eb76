//! Rebalancer Configuration Module
//!
//! Loads configuration from TOML files with environment-specific overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use config_rs::{Config, Environment, File, FileFormat};
use rebalancer_types::Address;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::defaults;

/// Main configuration structure. Every section has defaults, so an empty
/// file is valid apart from `ledger.endpoints`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RebalancerConfig {
    pub ledger: LedgerConfig,
    pub discovery: DiscoveryConfig,
    pub estimator: EstimatorConfig,
    pub monitor: MonitorConfig,
    pub events: EventsConfig,
    pub service: ServiceSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Ordered candidate RPC endpoints; the first is preferred.
    pub endpoints: Vec<String>,

    pub chain_id: u64,

    pub call_timeout_ms: u64,

    pub max_retries: u32,

    /// Node-managed account used as `from` for `eth_sendTransaction`.
    pub sender: Option<Address>,

    /// Contract exposing `rebalance`, `lastRebalance` and `cooldown`.
    pub rebalancer_contract: Option<Address>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub budget_ms: u64,
    pub max_concurrent_expansions: usize,
    pub default_target_ratio: f64,
    pub placeholder_symbol: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    pub default_gas_units: u64,
    pub default_gas_price_wei: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub poll_interval_ms: u64,
    pub confirmation_timeout_ms: u64,
    pub shutdown_grace_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub enabled: bool,
    pub poll_interval_ms: u64,
    pub max_block_range: u64,
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    pub operation_deadline_ms: u64,

    /// Factory used by `watch` and by `estimate` when none is given.
    pub factory: Option<Address>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            chain_id: defaults::ledger::CHAIN_ID,
            call_timeout_ms: defaults::ledger::CALL_TIMEOUT_MS,
            max_retries: defaults::ledger::MAX_RETRIES,
            sender: None,
            rebalancer_contract: None,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            budget_ms: defaults::discovery::BUDGET_MS,
            max_concurrent_expansions: defaults::discovery::MAX_CONCURRENT_EXPANSIONS,
            default_target_ratio: defaults::discovery::DEFAULT_TARGET_RATIO,
            placeholder_symbol: defaults::discovery::PLACEHOLDER_SYMBOL.to_string(),
        }
    }
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            default_gas_units: defaults::estimator::DEFAULT_GAS_UNITS,
            default_gas_price_wei: defaults::estimator::DEFAULT_GAS_PRICE_WEI,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::monitor::POLL_INTERVAL_MS,
            confirmation_timeout_ms: defaults::monitor::CONFIRMATION_TIMEOUT_MS,
            shutdown_grace_ms: defaults::monitor::SHUTDOWN_GRACE_MS,
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: defaults::events::POLL_INTERVAL_MS,
            max_block_range: defaults::events::MAX_BLOCK_RANGE,
            channel_capacity: defaults::events::CHANNEL_CAPACITY,
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            operation_deadline_ms: defaults::service::OPERATION_DEADLINE_MS,
            factory: None,
        }
    }
}

impl LedgerConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

impl DiscoveryConfig {
    pub fn budget(&self) -> Duration {
        Duration::from_millis(self.budget_ms)
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl EventsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl ServiceSettings {
    pub fn operation_deadline(&self) -> Duration {
        Duration::from_millis(self.operation_deadline_ms)
    }
}

impl RebalancerConfig {
    /// Load configuration from files with environment overrides
    pub fn load(base_path: Option<&Path>, environment: Option<&str>) -> Result<Self> {
        let base = base_path.unwrap_or(Path::new("config/rebalancer.toml"));

        let mut builder = Config::builder().add_source(File::from(base).required(true));

        // Add environment-specific overrides if specified
        if let Some(env) = environment {
            let env_file = PathBuf::from("config/environments").join(format!("{env}.toml"));

            if env_file.exists() {
                info!("Loading environment config: {:?}", env_file);
                builder = builder.add_source(File::from(env_file));
            } else {
                warn!("Environment config not found: {:?}", env_file);
            }
        }

        // Override with environment variables (REBALANCER__ prefix)
        builder = builder.add_source(
            Environment::with_prefix("REBALANCER")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("ledger.endpoints")
                .try_parsing(true),
        );

        let config: Self = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.finish()
    }

    /// Parse a TOML document without touching the filesystem or environment.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.finish()
    }

    fn finish(mut self) -> Result<Self> {
        self.expand_env_vars()?;
        self.validate()?;
        Ok(self)
    }

    /// Expand `${VAR}` references in endpoint URLs
    pub fn expand_env_vars(&mut self) -> Result<()> {
        for endpoint in &mut self.ledger.endpoints {
            let expanded =
                shellexpand::env(endpoint.as_str()).context("Failed to expand RPC URL")?;
            *endpoint = expanded.into_owned();
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.ledger.endpoints.is_empty() {
            bail!("ledger.endpoints must list at least one RPC endpoint");
        }
        if self.ledger.call_timeout_ms == 0 {
            bail!("ledger.call_timeout_ms must be positive");
        }
        if self.discovery.budget_ms == 0 {
            bail!("discovery.budget_ms must be positive");
        }
        if self.discovery.max_concurrent_expansions == 0 {
            bail!("discovery.max_concurrent_expansions must be positive");
        }
        if !(self.discovery.default_target_ratio.is_finite()
            && self.discovery.default_target_ratio > 0.0)
        {
            bail!("discovery.default_target_ratio must be a positive number");
        }
        if self.monitor.poll_interval_ms == 0 || self.events.poll_interval_ms == 0 {
            bail!("poll intervals must be positive");
        }
        if self.events.max_block_range == 0 || self.events.channel_capacity == 0 {
            bail!("events.max_block_range and events.channel_capacity must be positive");
        }
        Ok(())
    }

    /// Render the effective configuration, used by `rebalancer --print-config`.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_base_config() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("rebalancer.toml");

        let config_content = r#"
[ledger]
endpoints = ["https://rpc-a.example", "https://rpc-b.example"]
max_retries = 1
rebalancer_contract = "0x00000000000000000000000000000000000000aa"

[discovery]
default_target_ratio = 1.5

[monitor]
poll_interval_ms = 250
"#;

        fs::write(&config_path, config_content).unwrap();

        let config = RebalancerConfig::load(Some(&config_path), None).unwrap();

        assert_eq!(config.ledger.endpoints.len(), 2);
        assert_eq!(config.ledger.max_retries, 1);
        assert_eq!(
            config.ledger.rebalancer_contract,
            Some(Address::from_low_u64_be(0xaa))
        );
        assert_eq!(config.discovery.default_target_ratio, 1.5);
        assert_eq!(config.monitor.poll_interval(), Duration::from_millis(250));
        // untouched sections keep defaults
        assert_eq!(
            config.estimator.default_gas_units,
            defaults::estimator::DEFAULT_GAS_UNITS
        );
    }

    #[test]
    fn test_missing_endpoints_rejected() {
        let err = RebalancerConfig::from_toml_str("[discovery]\nbudget_ms = 10\n").unwrap_err();
        assert!(err.to_string().contains("ledger.endpoints"));
    }

    #[test]
    fn test_endpoint_env_expansion() {
        std::env::set_var("REBALANCER_TEST_RPC_HOST", "rpc.internal");
        let config = RebalancerConfig::from_toml_str(
            "[ledger]\nendpoints = [\"https://${REBALANCER_TEST_RPC_HOST}/v1\"]\n",
        )
        .unwrap();
        assert_eq!(config.ledger.endpoints[0], "https://rpc.internal/v1");
    }

    #[test]
    fn test_round_trips_through_toml() {
        let config = RebalancerConfig::from_toml_str(
            "[ledger]\nendpoints = [\"http://localhost:8545\"]\n",
        )
        .unwrap();
        let rendered = config.to_toml_string().unwrap();
        let reparsed = RebalancerConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(reparsed.ledger.endpoints, config.ledger.endpoints);
        assert_eq!(reparsed.monitor.poll_interval_ms, config.monitor.poll_interval_ms);
    }
}
