//! Log markers and subscriber setup for the rebalancer

use tracing_subscriber::EnvFilter;

/// Emoji prefixes for operator-facing info lines
pub struct LogEmoji;

impl LogEmoji {
    pub const SUCCESS: &'static str = "✅";
    pub const ERROR: &'static str = "❌";
    pub const WARNING: &'static str = "⚠️";

    pub const SEARCH: &'static str = "🔍"; // Discovery
    pub const CHART: &'static str = "📊"; // Dashboard stats
    pub const EXECUTE: &'static str = "⚡"; // Submission
    pub const POOL: &'static str = "🏊"; // Pool updates
    pub const GAS: &'static str = "⛽"; // Gas price/costs
    pub const CLOCK: &'static str = "⏱️"; // Deadlines, cooldowns
}

#[macro_export]
macro_rules! log_success {
    ($($arg:tt)*) => {
        tracing::info!("{} {}", $crate::logging::LogEmoji::SUCCESS, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_search {
    ($($arg:tt)*) => {
        tracing::info!("{} {}", $crate::logging::LogEmoji::SEARCH, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_metrics {
    ($($arg:tt)*) => {
        tracing::info!("{} {}", $crate::logging::LogEmoji::CHART, format!($($arg)*))
    };
}

const DEFAULT_DIRECTIVES: &str =
    "info,rebalance_strategy=debug,ledger_adapter=info,pool_state=info";

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}
