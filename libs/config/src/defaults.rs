//! Default configuration values shared by the rebalancer services.

/// Ledger access defaults
pub mod ledger {
    /// Per-call deadline (milliseconds)
    pub const CALL_TIMEOUT_MS: u64 = 10_000;

    /// Extra endpoints tried after the first; attempts are `max_retries + 1`
    pub const MAX_RETRIES: u32 = 3;

    /// Polygon mainnet
    pub const CHAIN_ID: u64 = 137;
}

/// Pair discovery defaults
pub mod discovery {
    /// Wall-clock budget for a whole discovery run (milliseconds)
    pub const BUDGET_MS: u64 = 120_000;

    pub const MAX_CONCURRENT_EXPANSIONS: usize = 5;

    pub const DEFAULT_TARGET_RATIO: f64 = 1.0;

    /// Symbol recorded when a token's `symbol()` cannot be read
    pub const PLACEHOLDER_SYMBOL: &str = "UNKNOWN";
}

/// Rebalance estimation defaults
pub mod estimator {
    /// Gas units assumed when simulating `rebalance` fails
    pub const DEFAULT_GAS_UNITS: u64 = 200_000;

    /// 30 gwei, used when the fee data read fails
    pub const DEFAULT_GAS_PRICE_WEI: u64 = 30_000_000_000;
}

/// Transaction monitor defaults
pub mod monitor {
    pub const POLL_INTERVAL_MS: u64 = 2_000;

    /// 5 minutes max wait for a receipt
    pub const CONFIRMATION_TIMEOUT_MS: u64 = 300_000;

    pub const SHUTDOWN_GRACE_MS: u64 = 10_000;
}

/// Ledger event polling defaults
pub mod events {
    pub const POLL_INTERVAL_MS: u64 = 4_000;

    /// Widest block span requested in one `eth_getLogs` call
    pub const MAX_BLOCK_RANGE: u64 = 2_000;

    pub const CHANNEL_CAPACITY: usize = 1_024;
}

/// API facade defaults
pub mod service {
    /// Overall deadline for discovery and estimation requests (milliseconds)
    pub const OPERATION_DEADLINE_MS: u64 = 150_000;
}
