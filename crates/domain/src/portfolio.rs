//! Point-in-time portfolio valuation.

use crate::entities::pool::PoolId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Valuation input for one pool before shares are computed.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolValuation {
    pub pool_id: PoolId,
    pub value: Decimal,
    pub target_pct: Decimal,
    pub unclaimed_fees: Decimal,
    pub unclaimed_rewards: Decimal,
    /// Set when the value comes from cached amounts because the live read failed.
    pub stale: bool,
}

/// Share of the portfolio held by one pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationEntry {
    pub pool_id: PoolId,
    pub value: Decimal,
    pub observed_pct: Decimal,
    pub target_pct: Decimal,
    /// `observed_pct - target_pct`.
    pub drift_pct: Decimal,
    pub stale: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub id: Uuid,
    pub taken_at: DateTime<Utc>,
    pub total_value: Decimal,
    pub entries: Vec<AllocationEntry>,
    pub total_unclaimed_fees: Decimal,
    pub total_unclaimed_rewards: Decimal,
    pub tolerance_pct: Decimal,
    /// True when any pool drifted past the tolerance. Reported only, never acted on.
    pub needs_attention: bool,
}

impl PortfolioSnapshot {
    /// Computes shares and drift from per-pool valuations.
    ///
    /// An empty portfolio (total value zero) reports every observed share as zero.
    pub fn compute(
        valuations: Vec<PoolValuation>,
        tolerance_pct: Decimal,
        taken_at: DateTime<Utc>,
    ) -> Self {
        let hundred = Decimal::ONE_HUNDRED;
        let total_value: Decimal = valuations.iter().map(|v| v.value).sum();
        let total_unclaimed_fees = valuations.iter().map(|v| v.unclaimed_fees).sum();
        let total_unclaimed_rewards = valuations.iter().map(|v| v.unclaimed_rewards).sum();

        let entries: Vec<AllocationEntry> = valuations
            .into_iter()
            .map(|v| {
                let observed_pct = if total_value.is_zero() {
                    Decimal::ZERO
                } else {
                    v.value / total_value * hundred
                };
                AllocationEntry {
                    pool_id: v.pool_id,
                    value: v.value,
                    observed_pct,
                    target_pct: v.target_pct,
                    drift_pct: observed_pct - v.target_pct,
                    stale: v.stale,
                }
            })
            .collect();

        let needs_attention = entries.iter().any(|e| e.drift_pct.abs() > tolerance_pct);

        Self {
            id: Uuid::new_v4(),
            taken_at,
            total_value,
            entries,
            total_unclaimed_fees,
            total_unclaimed_rewards,
            tolerance_pct,
            needs_attention,
        }
    }

    pub fn entry(&self, pool_id: &PoolId) -> Option<&AllocationEntry> {
        self.entries.iter().find(|e| &e.pool_id == pool_id)
    }

    /// Entries whose drift exceeds the tolerance.
    pub fn drifted(&self) -> impl Iterator<Item = &AllocationEntry> {
        self.entries
            .iter()
            .filter(move |e| e.drift_pct.abs() > self.tolerance_pct)
    }
}
