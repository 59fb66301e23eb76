//! Rebalance estimation
//!
//! Given a tracked pool and a target ratio, work out which side to sell, how
//! much, what it should return under constant-product pricing, and what the
//! transaction will cost. Reserves are always re-read from the ledger.

use std::sync::Arc;

use ledger_adapter::LedgerReader;
use pool_state::PoolStore;
use rebalancer_config::EstimatorConfig;
use rebalancer_types::{
    f64_to_u256, ratio_of, ratio_to_bps, u256_to_f64, Address, PoolUpdate, RebalanceEstimate,
    SwapDirection, U256, U512,
};
use tracing::{debug, warn};

use crate::error::ServiceError;

/// Ratio deviations at or below this need no swap.
pub const NO_SWAP_TOLERANCE: f64 = 0.001;

/// Fraction of the excess side sold in one rebalance.
const SWAP_FRACTION: f64 = 0.5;

const BPS_DENOMINATOR: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapPlan {
    pub direction: SwapDirection,
    pub amount_a: U256,
    pub amount_b: U256,
}

/// Amounts to sell for `reserves` to move toward `target_ratio`.
pub fn plan_swap(reserve_a: U256, reserve_b: U256, target_ratio: f64) -> SwapPlan {
    let current = ratio_of(reserve_a, reserve_b);
    let deviation = current - target_ratio;

    if deviation.abs() <= NO_SWAP_TOLERANCE {
        return SwapPlan {
            direction: SwapDirection::None,
            amount_a: U256::zero(),
            amount_b: U256::zero(),
        };
    }

    if deviation > 0.0 {
        SwapPlan {
            direction: SwapDirection::AToB,
            amount_a: f64_to_u256(deviation * u256_to_f64(reserve_a) * SWAP_FRACTION),
            amount_b: U256::zero(),
        }
    } else {
        SwapPlan {
            direction: SwapDirection::BToA,
            amount_a: U256::zero(),
            amount_b: f64_to_u256(-deviation * u256_to_f64(reserve_b) * SWAP_FRACTION),
        }
    }
}

/// `amount_in * reserve_out / (reserve_in + amount_in)`, exact.
pub fn expected_output(amount_in: U256, reserve_in: U256, reserve_out: U256) -> U256 {
    let denominator = U512::from(reserve_in) + U512::from(amount_in);
    if denominator.is_zero() {
        return U256::zero();
    }
    let quotient = amount_in.full_mul(reserve_out) / denominator;
    U256::try_from(quotient).unwrap_or(U256::MAX)
}

/// `expected_out * (100 - slippage) / 100`, with slippage applied in bps.
pub fn minimum_received(expected_out: U256, slippage_pct: f64) -> U256 {
    let slippage_bps = (slippage_pct * 100.0).round().clamp(0.0, BPS_DENOMINATOR as f64) as u64;
    let keep = U256::from(BPS_DENOMINATOR - slippage_bps);
    let quotient = expected_out.full_mul(keep) / U512::from(BPS_DENOMINATOR);
    U256::try_from(quotient).unwrap_or(U256::MAX)
}

/// Percent of the input-side reserve consumed by the swap.
///
/// This is amount-over-reserve and ignores `reserve_out`, unlike
/// `minimum_received`. Left as-is until the intended definition is settled.
pub fn price_impact(amount_in: U256, reserve_in: U256) -> f64 {
    if reserve_in.is_zero() {
        return 0.0;
    }
    u256_to_f64(amount_in) * 100.0 / u256_to_f64(reserve_in)
}

pub fn validate_target_ratio(target_ratio: f64) -> Result<(), ServiceError> {
    if target_ratio.is_finite() && target_ratio > 0.0 {
        Ok(())
    } else {
        Err(ServiceError::InvalidTargetRatio(target_ratio))
    }
}

pub fn validate_slippage(slippage_pct: f64) -> Result<(), ServiceError> {
    if slippage_pct.is_finite() && (0.0..=100.0).contains(&slippage_pct) {
        Ok(())
    } else {
        Err(ServiceError::InvalidSlippage(slippage_pct))
    }
}

pub struct RebalanceEstimator {
    reader: LedgerReader,
    store: Arc<PoolStore>,
    config: EstimatorConfig,
    rebalancer: Option<Address>,
}

impl RebalanceEstimator {
    pub fn new(
        reader: LedgerReader,
        store: Arc<PoolStore>,
        config: EstimatorConfig,
        rebalancer: Option<Address>,
    ) -> Self {
        Self {
            reader,
            store,
            config,
            rebalancer,
        }
    }

    pub async fn estimate(
        &self,
        pool_address: Address,
        target_ratio: f64,
        slippage_pct: f64,
    ) -> Result<RebalanceEstimate, ServiceError> {
        validate_target_ratio(target_ratio)?;
        validate_slippage(slippage_pct)?;
        let pool = self
            .store
            .get_pool(&pool_address)
            .ok_or(ServiceError::PoolNotFound(pool_address))?;

        let (reserve_a, reserve_b) = self.reader.reserves(pool_address).await?;
        if (reserve_a, reserve_b) != (pool.reserve_a, pool.reserve_b) {
            // Pool may have been removed concurrently; the estimate still stands.
            if let Err(e) = self
                .store
                .update_pool(&pool_address, &PoolUpdate::reserves(reserve_a, reserve_b))
            {
                debug!(pool = %pool_address, "Reserve refresh skipped: {}", e);
            }
        }

        let plan = plan_swap(reserve_a, reserve_b, target_ratio);
        let (amount_in, reserve_in, reserve_out) = match plan.direction {
            SwapDirection::AToB => (plan.amount_a, reserve_a, reserve_b),
            SwapDirection::BToA => (plan.amount_b, reserve_b, reserve_a),
            SwapDirection::None => (U256::zero(), reserve_a, reserve_b),
        };

        let (expected, impact) = if plan.direction == SwapDirection::None {
            (U256::zero(), 0.0)
        } else {
            (
                expected_output(amount_in, reserve_in, reserve_out),
                price_impact(amount_in, reserve_in),
            )
        };

        let (gas_estimate, gas_estimate_is_fallback) =
            self.estimate_gas(pool_address, target_ratio).await;
        let gas_price = self.gas_price().await;

        Ok(RebalanceEstimate {
            pool_address,
            current_ratio: ratio_of(reserve_a, reserve_b),
            target_ratio,
            direction: plan.direction,
            swap_amount_a: plan.amount_a,
            swap_amount_b: plan.amount_b,
            expected_output: expected,
            minimum_received: minimum_received(expected, slippage_pct),
            price_impact: impact,
            gas_estimate,
            gas_estimate_is_fallback,
            gas_price,
            estimated_cost: gas_estimate.saturating_mul(gas_price),
            slippage_tolerance: slippage_pct,
        })
    }

    /// Simulated gas for `rebalance`, or the configured default. Never fails.
    async fn estimate_gas(&self, pool_address: Address, target_ratio: f64) -> (U256, bool) {
        let fallback = U256::from(self.config.default_gas_units);
        let Some(contract) = self.rebalancer else {
            return (fallback, true);
        };
        match self
            .reader
            .estimate_rebalance_gas(contract, pool_address, ratio_to_bps(target_ratio))
            .await
        {
            Ok(gas) => (gas, false),
            Err(e) => {
                debug!(pool = %pool_address, "Gas simulation failed, using default: {}", e);
                (fallback, true)
            }
        }
    }

    pub async fn gas_price(&self) -> U256 {
        match self.reader.gas_price().await {
            Ok(price) => price,
            Err(e) => {
                warn!("⛽ Gas price read failed, using default: {}", e);
                U256::from(self.config.default_gas_price_wei)
            }
        }
    }
}
