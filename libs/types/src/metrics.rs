//! Per-pool history and performance summary.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use ethers_core::types::{Address, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rebalance::RebalanceEvent;
use crate::serde_helpers::u256_dec;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalSample {
    pub timestamp: DateTime<Utc>,
    pub ratio: f64,
    #[serde(with = "u256_dec")]
    pub tvl: U256,
    #[serde(with = "u256_dec")]
    pub volume: U256,
    #[serde(with = "u256_dec")]
    pub fees: U256,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSummary {
    pub total_rebalances: u64,
    /// Mean gap between consecutive confirmed rebalances, in seconds.
    pub average_rebalance_interval_secs: f64,
    #[serde(with = "u256_dec")]
    pub total_volume: U256,
    #[serde(with = "u256_dec")]
    pub total_fees: U256,
    /// Percentage; negative values are losses versus holding.
    pub impermanent_loss: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolMetrics {
    pub pool_address: Address,
    /// Timestamp-ascending, oldest first.
    pub historical: VecDeque<HistoricalSample>,
    /// Append-only log of resolved rebalances.
    pub rebalance_history: Vec<RebalanceEvent>,
    pub performance: PerformanceSummary,
}

impl PoolMetrics {
    pub fn empty(pool_address: Address) -> Self {
        Self {
            pool_address,
            historical: VecDeque::new(),
            rebalance_history: Vec::new(),
            performance: PerformanceSummary::default(),
        }
    }
}

/// Window selector for `GetPoolMetrics`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "24h")]
    OneDay,
    #[serde(rename = "7d")]
    OneWeek,
    #[serde(rename = "30d")]
    OneMonth,
    #[serde(rename = "all")]
    All,
}

impl Timeframe {
    pub fn window(self) -> Option<Duration> {
        match self {
            Timeframe::OneHour => Some(Duration::hours(1)),
            Timeframe::OneDay => Some(Duration::hours(24)),
            Timeframe::OneWeek => Some(Duration::days(7)),
            Timeframe::OneMonth => Some(Duration::days(30)),
            Timeframe::All => None,
        }
    }

    /// Earliest timestamp included in the window ending at `now`.
    pub fn start(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.window().map(|window| now - window)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Timeframe::OneHour => "1h",
            Timeframe::OneDay => "24h",
            Timeframe::OneWeek => "7d",
            Timeframe::OneMonth => "30d",
            Timeframe::All => "all",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown timeframe '{0}', expected one of 1h, 24h, 7d, 30d, all")]
pub struct TimeframeParseError(pub String);

impl FromStr for Timeframe {
    type Err = TimeframeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1h" => Ok(Timeframe::OneHour),
            "24h" | "1d" => Ok(Timeframe::OneDay),
            "7d" | "1w" => Ok(Timeframe::OneWeek),
            "30d" => Ok(Timeframe::OneMonth),
            "all" => Ok(Timeframe::All),
            other => Err(TimeframeParseError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeframe_parse() {
        assert_eq!("24h".parse::<Timeframe>(), Ok(Timeframe::OneDay));
        assert_eq!(" ALL ".parse::<Timeframe>(), Ok(Timeframe::All));
        assert!("2y".parse::<Timeframe>().is_err());
    }

    #[test]
    fn test_timeframe_start() {
        let now = Utc::now();
        assert_eq!(Timeframe::OneHour.start(now), Some(now - Duration::hours(1)));
        assert_eq!(Timeframe::All.start(now), None);
    }
}
