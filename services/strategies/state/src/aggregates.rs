//! Pure folds over pool history
//!
//! Nothing here touches the store lock; the store calls these while holding
//! its own guard.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use rebalancer_types::{HistoricalSample, PerformanceSummary, RebalanceEvent, RebalanceStatus, U256};

/// Insert keeping timestamp order, then evict oldest samples beyond `cap`.
/// Samples with equal timestamps keep insertion order.
pub fn insert_sample(samples: &mut VecDeque<HistoricalSample>, sample: HistoricalSample, cap: usize) {
    let position = samples.partition_point(|s| s.timestamp <= sample.timestamp);
    samples.insert(position, sample);
    while samples.len() > cap {
        samples.pop_front();
    }
}

/// When a confirmed rebalance took effect.
pub fn effective_time(event: &RebalanceEvent) -> DateTime<Utc> {
    event.resolved_at.unwrap_or(event.submitted_at)
}

/// Mean gap in seconds between consecutive timestamps; 0 with fewer than two.
pub fn average_interval_secs(timestamps: &[DateTime<Utc>]) -> f64 {
    if timestamps.len() < 2 {
        return 0.0;
    }
    let mut sorted = timestamps.to_vec();
    sorted.sort();
    let span = sorted[sorted.len() - 1] - sorted[0];
    span.num_milliseconds() as f64 / 1_000.0 / (sorted.len() - 1) as f64
}

/// Loss of a 50/50 position versus holding, in percent (≤ 0), for a price
/// ratio change of `last / first`.
pub fn impermanent_loss(first_ratio: f64, last_ratio: f64) -> f64 {
    if !(first_ratio.is_finite() && last_ratio.is_finite()) || first_ratio <= 0.0 || last_ratio <= 0.0 {
        return 0.0;
    }
    let k = last_ratio / first_ratio;
    (2.0 * k.sqrt() / (1.0 + k) - 1.0) * 100.0
}

pub fn performance_summary<'a>(
    samples: impl IntoIterator<Item = &'a HistoricalSample>,
    history: &[RebalanceEvent],
) -> PerformanceSummary {
    let mut total_volume = U256::zero();
    let mut total_fees = U256::zero();
    let mut first_ratio = None;
    let mut last_ratio = None;
    let mut count = 0usize;

    for sample in samples {
        total_volume = total_volume.saturating_add(sample.volume);
        total_fees = total_fees.saturating_add(sample.fees);
        if first_ratio.is_none() {
            first_ratio = Some(sample.ratio);
        }
        last_ratio = Some(sample.ratio);
        count += 1;
    }

    let confirmed: Vec<DateTime<Utc>> = history
        .iter()
        .filter(|event| event.status == RebalanceStatus::Confirmed)
        .map(effective_time)
        .collect();

    let impermanent_loss = match (first_ratio, last_ratio) {
        (Some(first), Some(last)) if count >= 2 => impermanent_loss(first, last),
        _ => 0.0,
    };

    PerformanceSummary {
        total_rebalances: confirmed.len() as u64,
        average_rebalance_interval_secs: average_interval_secs(&confirmed),
        total_volume,
        total_fees,
        impermanent_loss,
    }
}
