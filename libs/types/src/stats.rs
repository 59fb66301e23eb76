//! Dashboard aggregate, a pure fold over the pool set.

use ethers_core::types::U256;
use serde::{Deserialize, Serialize};

use crate::pool::Pool;
use crate::serde_helpers::u256_dec;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_pools: usize,
    #[serde(rename = "totalTVL", with = "u256_dec")]
    pub total_tvl: U256,
    #[serde(with = "u256_dec")]
    pub total_volume_24h: U256,
    /// Mean over pools that report an APY; `0.0` when none do.
    #[serde(rename = "averageAPY")]
    pub average_apy: f64,
    pub active_pools: usize,
    pub imbalanced_pools: usize,
}

impl DashboardStats {
    /// Deterministic for a given pool set regardless of iteration order,
    /// except for float rounding in `average_apy`.
    pub fn from_pools<'a, I>(pools: I) -> Self
    where
        I: IntoIterator<Item = &'a Pool>,
    {
        let mut stats = DashboardStats::default();
        let mut apy_sum = 0.0;
        let mut apy_count = 0usize;

        for pool in pools {
            stats.total_pools += 1;
            stats.total_tvl = stats.total_tvl.saturating_add(pool.tvl);
            stats.total_volume_24h = stats
                .total_volume_24h
                .saturating_add(pool.volume_24h.unwrap_or_default());
            if let Some(apy) = pool.apy {
                apy_sum += apy;
                apy_count += 1;
            }
            if pool.is_active {
                stats.active_pools += 1;
            }
            if pool.needs_rebalancing {
                stats.imbalanced_pools += 1;
            }
        }

        if apy_count > 0 {
            stats.average_apy = apy_sum / apy_count as f64;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{PoolUpdate, TokenInfo};
    use chrono::Utc;
    use ethers_core::types::Address;

    fn pool(id: u64, reserve_a: u64, reserve_b: u64) -> Pool {
        Pool::new(
            Address::from_low_u64_be(id),
            TokenInfo::new(Address::from_low_u64_be(100), "AAA"),
            TokenInfo::new(Address::from_low_u64_be(101), "BBB"),
            U256::from(reserve_a),
            U256::from(reserve_b),
            U256::zero(),
            1.0,
            Utc::now(),
        )
    }

    #[test]
    fn test_empty_fold() {
        assert_eq!(DashboardStats::from_pools(std::iter::empty::<&Pool>()), DashboardStats::default());
    }

    #[test]
    fn test_fold_counts_and_sums() {
        let mut balanced = pool(1, 50, 50);
        balanced.apply(&PoolUpdate {
            apy: Some(10.0),
            volume_24h: Some(U256::from(7u64)),
            ..Default::default()
        });
        let mut imbalanced = pool(2, 120, 100);
        imbalanced.apply(&PoolUpdate {
            apy: Some(20.0),
            ..Default::default()
        });
        let empty = pool(3, 0, 0);

        let stats = DashboardStats::from_pools(&[balanced, imbalanced, empty]);
        assert_eq!(stats.total_pools, 3);
        assert_eq!(stats.total_tvl, U256::from(320u64));
        assert_eq!(stats.total_volume_24h, U256::from(7u64));
        assert_eq!(stats.average_apy, 15.0);
        assert_eq!(stats.active_pools, 2);
        // The empty pool reads as ratio 0.0 against a 1.0 target.
        assert_eq!(stats.imbalanced_pools, 2);
    }
}
