//! Drift detection against the last acted-upon reference index.

use clmm_keeper_domain::prelude::*;
use serde::Serialize;

/// Result of a drift check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DriftResult {
    /// Reference index seen this tick.
    pub current_index: i32,
    /// Price steps moved since the position was last acted upon.
    pub bins_moved: u32,
    /// Whether the move exceeds the pool's threshold.
    pub needs_rebalance: bool,
    /// Whether the current index still falls inside the position's range.
    pub in_range: bool,
}

/// Decides when a position has drifted far enough to be re-centred.
#[derive(Debug, Clone, Copy)]
pub struct PositionTracker {
    threshold: u32,
    kind: PoolKind,
}

impl PositionTracker {
    /// Creates a tracker for a concentrated-liquidity pool.
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            kind: PoolKind::ConcentratedLiquidity,
        }
    }

    /// Creates a tracker using the pool's threshold and kind.
    pub fn for_pool(config: &PoolConfig) -> Self {
        Self {
            threshold: config.rebalance_threshold,
            kind: config.kind,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Compares `current_index` with the index recorded at the last action.
    ///
    /// The reference is only updated through [`Self::mark_observed`], so small
    /// moves accumulate across ticks until they cross the threshold.
    pub fn check_drift(&self, position: &ManagedPosition, current_index: i32) -> DriftResult {
        let bins_moved = current_index.abs_diff(position.last_observed_index);
        DriftResult {
            current_index,
            bins_moved,
            needs_rebalance: self.kind.has_range() && bins_moved > self.threshold,
            in_range: position.range.contains(current_index),
        }
    }

    /// Records that the caller acted on `index`.
    pub fn mark_observed(&self, position: &mut ManagedPosition, index: i32) {
        position.last_observed_index = index;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn position_at(reference: i32) -> ManagedPosition {
        ManagedPosition::opened(
            PoolId::new("pool"),
            PositionId::new("pos"),
            TickRange::centered(reference, 10),
            reference,
            TokenAmounts::new(dec!(1), dec!(1)),
            Utc::now(),
        )
    }

    #[test]
    fn test_fresh_position_does_not_drift() {
        let tracker = PositionTracker::new(5);
        let drift = tracker.check_drift(&position_at(100), 100);
        assert_eq!(drift.bins_moved, 0);
        assert!(!drift.needs_rebalance);
        assert!(drift.in_range);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let tracker = PositionTracker::new(5);
        let position = position_at(100);

        assert!(!tracker.check_drift(&position, 104).needs_rebalance);
        assert!(!tracker.check_drift(&position, 105).needs_rebalance);
        assert!(tracker.check_drift(&position, 106).needs_rebalance);
        assert!(tracker.check_drift(&position, 94).needs_rebalance);
    }

    #[test]
    fn test_drift_is_monotonic_in_distance() {
        let tracker = PositionTracker::new(5);
        let position = position_at(0);
        let mut flagged = false;
        for index in 0..20 {
            let drift = tracker.check_drift(&position, index);
            // Once flagged, further moves stay flagged.
            assert!(!flagged || drift.needs_rebalance);
            flagged = drift.needs_rebalance;
        }
        assert!(flagged);
    }

    #[test]
    fn test_small_moves_accumulate_until_marked() {
        let tracker = PositionTracker::new(5);
        let mut position = position_at(100);

        for index in [102, 104, 106] {
            let drift = tracker.check_drift(&position, index);
            if drift.needs_rebalance {
                tracker.mark_observed(&mut position, index);
            }
        }
        assert_eq!(position.last_observed_index, 106);
    }

    #[test]
    fn test_constant_product_never_rebalances() {
        let config = PoolConfig::concentrated(
            "amm",
            dec!(50),
            10,
            5,
            TokenAmounts::new(dec!(1), dec!(1)),
        )
        .with_kind(PoolKind::ConstantProduct);
        let tracker = PositionTracker::for_pool(&config);

        let drift = tracker.check_drift(&position_at(100), 500);
        assert_eq!(drift.bins_moved, 400);
        assert!(!drift.needs_rebalance);
    }
}
