//! Pool snapshot and partial-update types.

use chrono::{DateTime, Utc};
use ethers_core::types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::numeric::ratio_of;
use crate::serde_helpers::{option_u256_dec, u256_dec};

/// Absolute ratio deviation above which a pool is considered imbalanced.
pub const REBALANCE_THRESHOLD: f64 = 0.10;

/// `|current - target| > REBALANCE_THRESHOLD`
pub fn needs_rebalancing(current_ratio: f64, target_ratio: f64) -> bool {
    (current_ratio - target_ratio).abs() > REBALANCE_THRESHOLD
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub address: Address,
    pub symbol: String,
}

impl TokenInfo {
    pub fn new(address: Address, symbol: impl Into<String>) -> Self {
        Self {
            address,
            symbol: symbol.into(),
        }
    }
}

/// Locally cached snapshot of one trading pair.
///
/// Token A is the pair's `token0`, token B its `token1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    pub address: Address,
    pub token_a: TokenInfo,
    pub token_b: TokenInfo,
    #[serde(with = "u256_dec")]
    pub reserve_a: U256,
    #[serde(with = "u256_dec")]
    pub reserve_b: U256,
    #[serde(with = "u256_dec")]
    pub total_supply: U256,
    pub current_ratio: f64,
    pub target_ratio: f64,
    pub needs_rebalancing: bool,
    /// Both reserves non-zero.
    pub is_active: bool,
    pub last_rebalance: Option<DateTime<Utc>>,
    pub rebalance_count: u64,
    pub created_at: DateTime<Utc>,
    /// Sum of both reserves, valuing each token 1:1.
    #[serde(with = "u256_dec")]
    pub tvl: U256,
    #[serde(default, with = "option_u256_dec")]
    pub volume_24h: Option<U256>,
    #[serde(default, with = "option_u256_dec")]
    pub fees_24h: Option<U256>,
    #[serde(default)]
    pub apy: Option<f64>,
}

impl Pool {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        address: Address,
        token_a: TokenInfo,
        token_b: TokenInfo,
        reserve_a: U256,
        reserve_b: U256,
        total_supply: U256,
        target_ratio: f64,
        created_at: DateTime<Utc>,
    ) -> Self {
        let mut pool = Self {
            address,
            token_a,
            token_b,
            reserve_a,
            reserve_b,
            total_supply,
            current_ratio: 0.0,
            target_ratio,
            needs_rebalancing: false,
            is_active: false,
            last_rebalance: None,
            rebalance_count: 0,
            created_at,
            tvl: U256::zero(),
            volume_24h: None,
            fees_24h: None,
            apy: None,
        };
        pool.refresh_derived();
        pool
    }

    /// Recompute every derived field from reserves and target.
    pub fn refresh_derived(&mut self) {
        self.current_ratio = ratio_of(self.reserve_a, self.reserve_b);
        self.needs_rebalancing = needs_rebalancing(self.current_ratio, self.target_ratio);
        self.is_active = !self.reserve_a.is_zero() && !self.reserve_b.is_zero();
        self.tvl = self.reserve_a.saturating_add(self.reserve_b);
    }

    /// Apply a partial update and re-derive.
    pub fn apply(&mut self, update: &PoolUpdate) {
        if let Some(reserve_a) = update.reserve_a {
            self.reserve_a = reserve_a;
        }
        if let Some(reserve_b) = update.reserve_b {
            self.reserve_b = reserve_b;
        }
        if let Some(total_supply) = update.total_supply {
            self.total_supply = total_supply;
        }
        if let Some(target_ratio) = update.target_ratio {
            self.target_ratio = target_ratio;
        }
        if let Some(last_rebalance) = update.last_rebalance {
            self.last_rebalance = Some(last_rebalance);
        }
        if let Some(rebalance_count) = update.rebalance_count {
            self.rebalance_count = rebalance_count;
        }
        if update.volume_24h.is_some() {
            self.volume_24h = update.volume_24h;
        }
        if update.fees_24h.is_some() {
            self.fees_24h = update.fees_24h;
        }
        if update.apy.is_some() {
            self.apy = update.apy;
        }
        self.refresh_derived();
    }

    /// Overwrite the ledger-derived fields from a fresh read, keeping the
    /// fields this process owns (target, rebalance bookkeeping, enrichment).
    pub fn refresh_from(&mut self, fresh: &Pool) {
        self.token_a = fresh.token_a.clone();
        self.token_b = fresh.token_b.clone();
        self.reserve_a = fresh.reserve_a;
        self.reserve_b = fresh.reserve_b;
        self.total_supply = fresh.total_supply;
        self.refresh_derived();
    }
}

/// Partial field set for `PoolStore::update_pool`. Derived fields are not
/// settable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolUpdate {
    pub reserve_a: Option<U256>,
    pub reserve_b: Option<U256>,
    pub total_supply: Option<U256>,
    pub target_ratio: Option<f64>,
    pub last_rebalance: Option<DateTime<Utc>>,
    pub rebalance_count: Option<u64>,
    pub volume_24h: Option<U256>,
    pub fees_24h: Option<U256>,
    pub apy: Option<f64>,
}

impl PoolUpdate {
    pub fn reserves(reserve_a: U256, reserve_b: U256) -> Self {
        Self {
            reserve_a: Some(reserve_a),
            reserve_b: Some(reserve_b),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pool(reserve_a: u64, reserve_b: u64, target: f64) -> Pool {
        Pool::new(
            Address::from_low_u64_be(1),
            TokenInfo::new(Address::from_low_u64_be(2), "AAA"),
            TokenInfo::new(Address::from_low_u64_be(3), "BBB"),
            U256::from(reserve_a),
            U256::from(reserve_b),
            U256::from(1_000u64),
            target,
            Utc::now(),
        )
    }

    #[test]
    fn test_imbalanced_pool_scenario() {
        let pool = pool(120, 100, 1.0);
        assert_eq!(pool.current_ratio, 1.2);
        assert!(pool.needs_rebalancing);
        assert_eq!(pool.tvl, U256::from(220u64));
    }

    #[test]
    fn test_small_deviation_is_balanced() {
        let pool = pool(105, 100, 1.0);
        assert!(!pool.needs_rebalancing);
    }

    #[test]
    fn test_apply_keeps_unset_fields() {
        let mut pool = pool(120, 100, 1.0);
        pool.apply(&PoolUpdate {
            target_ratio: Some(1.2),
            ..Default::default()
        });
        assert_eq!(pool.reserve_a, U256::from(120u64));
        assert!(!pool.needs_rebalancing);

        pool.apply(&PoolUpdate::reserves(U256::from(100u64), U256::from(100u64)));
        assert_eq!(pool.current_ratio, 1.0);
        assert!(pool.needs_rebalancing);
    }

    #[test]
    fn test_liquidity_arrival_activates_pool() {
        let mut pool = pool(0, 0, 1.0);
        assert!(!pool.is_active);

        pool.apply(&PoolUpdate::reserves(U256::from(120u64), U256::from(100u64)));
        assert!(pool.is_active);

        let mut drained = pool.clone();
        drained.reserve_b = U256::zero();
        pool.refresh_from(&drained);
        assert!(!pool.is_active);
    }

    #[test]
    fn test_reserves_serialize_as_decimal_strings() {
        let pool = pool(120, 100, 1.0);
        let json = serde_json::to_value(&pool).unwrap();
        assert_eq!(json["reserveA"], "120");
        assert_eq!(json["tvl"], "220");
        assert!(json["volume24h"].is_null());

        let back: Pool = serde_json::from_value(json).unwrap();
        assert_eq!(back, pool);
    }

    proptest! {
        #[test]
        fn prop_needs_rebalancing_matches_deviation(
            reserve_a in 0u64..1_000_000,
            reserve_b in 0u64..1_000_000,
            target in 0.01f64..10.0,
            new_a in proptest::option::of(0u64..1_000_000),
            new_target in proptest::option::of(0.01f64..10.0),
        ) {
            let mut pool = pool(reserve_a, reserve_b, target);
            prop_assert_eq!(
                pool.needs_rebalancing,
                (pool.current_ratio - pool.target_ratio).abs() > REBALANCE_THRESHOLD
            );

            pool.apply(&PoolUpdate {
                reserve_a: new_a.map(U256::from),
                target_ratio: new_target,
                ..Default::default()
            });
            prop_assert_eq!(
                pool.needs_rebalancing,
                (pool.current_ratio - pool.target_ratio).abs() > REBALANCE_THRESHOLD
            );
            prop_assert_eq!(
                pool.is_active,
                !pool.reserve_a.is_zero() && !pool.reserve_b.is_zero()
            );
        }
    }
}
