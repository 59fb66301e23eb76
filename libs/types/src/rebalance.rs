//! Rebalance transaction lifecycle and estimation results.

use chrono::{DateTime, Utc};
use ethers_core::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

use crate::serde_helpers::{option_u256_dec, u256_dec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RebalanceStatus {
    Pending,
    Confirmed,
    Failed,
}

impl RebalanceStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RebalanceStatus::Pending)
    }
}

/// One submitted rebalance transaction, keyed by its hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalanceEvent {
    pub tx_hash: H256,
    pub pool_address: Address,
    pub from_ratio: f64,
    pub to_ratio: Option<f64>,
    pub target_ratio: f64,
    #[serde(default, with = "option_u256_dec")]
    pub gas_used: Option<U256>,
    #[serde(default, with = "option_u256_dec")]
    pub gas_price: Option<U256>,
    pub status: RebalanceStatus,
    #[serde(with = "u256_dec")]
    pub swap_amount_a: U256,
    #[serde(with = "u256_dec")]
    pub swap_amount_b: U256,
    /// Slippage tolerance in percent.
    pub slippage: f64,
    pub submitted_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub block_number: Option<u64>,
    pub failure_reason: Option<String>,
}

impl RebalanceEvent {
    pub fn pending(
        tx_hash: H256,
        pool_address: Address,
        from_ratio: f64,
        target_ratio: f64,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            tx_hash,
            pool_address,
            from_ratio,
            to_ratio: None,
            target_ratio,
            gas_used: None,
            gas_price: None,
            status: RebalanceStatus::Pending,
            swap_amount_a: U256::zero(),
            swap_amount_b: U256::zero(),
            slippage: 0.0,
            submitted_at,
            resolved_at: None,
            block_number: None,
            failure_reason: None,
        }
    }

    /// Apply `update` unless the event already reached a terminal status.
    /// Returns whether anything was applied.
    pub fn apply(&mut self, update: &RebalanceEventUpdate) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if update.to_ratio.is_some() {
            self.to_ratio = update.to_ratio;
        }
        if update.gas_used.is_some() {
            self.gas_used = update.gas_used;
        }
        if update.gas_price.is_some() {
            self.gas_price = update.gas_price;
        }
        if update.block_number.is_some() {
            self.block_number = update.block_number;
        }
        if update.failure_reason.is_some() {
            self.failure_reason = update.failure_reason.clone();
        }
        if update.resolved_at.is_some() {
            self.resolved_at = update.resolved_at;
        } else if self.status.is_terminal() {
            self.resolved_at = Some(Utc::now());
        }
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RebalanceEventUpdate {
    pub status: Option<RebalanceStatus>,
    pub to_ratio: Option<f64>,
    pub gas_used: Option<U256>,
    pub gas_price: Option<U256>,
    pub block_number: Option<u64>,
    pub failure_reason: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl RebalanceEventUpdate {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: Some(RebalanceStatus::Failed),
            failure_reason: Some(reason.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapDirection {
    /// Sell token A for token B (current ratio above target).
    AToB,
    /// Sell token B for token A (current ratio below target).
    BToA,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebalanceEstimate {
    pub pool_address: Address,
    pub current_ratio: f64,
    pub target_ratio: f64,
    pub direction: SwapDirection,
    #[serde(with = "u256_dec")]
    pub swap_amount_a: U256,
    #[serde(with = "u256_dec")]
    pub swap_amount_b: U256,
    #[serde(with = "u256_dec")]
    pub expected_output: U256,
    #[serde(with = "u256_dec")]
    pub minimum_received: U256,
    /// Percent of the input-side reserve consumed by the swap.
    pub price_impact: f64,
    #[serde(with = "u256_dec")]
    pub gas_estimate: U256,
    pub gas_estimate_is_fallback: bool,
    #[serde(with = "u256_dec")]
    pub gas_price: U256,
    #[serde(with = "u256_dec")]
    pub estimated_cost: U256,
    pub slippage_tolerance: f64,
}

impl RebalanceEstimate {
    pub fn needs_swap(&self) -> bool {
        self.direction != SwapDirection::None
    }

    /// The amount sold into the pool, whichever side it is.
    pub fn amount_in(&self) -> U256 {
        match self.direction {
            SwapDirection::AToB => self.swap_amount_a,
            SwapDirection::BToA => self.swap_amount_b,
            SwapDirection::None => U256::zero(),
        }
    }
}
