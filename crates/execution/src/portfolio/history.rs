//! Append-only record of portfolio snapshots.

use chrono::{DateTime, Utc};
use clmm_keeper_domain::prelude::*;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::VecDeque;

/// Change between the first snapshot ever taken and the latest one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioTrend {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub start_value: Decimal,
    pub end_value: Decimal,
    pub value_change: Decimal,
    /// `None` when the start value is zero.
    pub value_change_pct: Option<Decimal>,
    /// Snapshots recorded since the first one, including those no longer retained.
    pub snapshots: usize,
}

/// Snapshot history, oldest first.
///
/// A bounded history only limits the retained window; the first snapshot is
/// kept aside so the trend always starts from it.
#[derive(Debug, Clone, Default)]
pub struct SnapshotHistory {
    first: Option<PortfolioSnapshot>,
    snapshots: VecDeque<PortfolioSnapshot>,
    max_len: Option<usize>,
    recorded: usize,
}

impl SnapshotHistory {
    /// Creates an unbounded history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a history that retains at most `max_len` snapshots, dropping the oldest.
    #[must_use]
    pub fn bounded(max_len: usize) -> Self {
        Self {
            max_len: Some(max_len.max(1)),
            ..Self::default()
        }
    }

    pub fn push(&mut self, snapshot: PortfolioSnapshot) {
        if self.first.is_none() {
            self.first = Some(snapshot.clone());
        }
        self.recorded += 1;
        self.snapshots.push_back(snapshot);
        if let Some(max_len) = self.max_len {
            while self.snapshots.len() > max_len {
                self.snapshots.pop_front();
            }
        }
    }

    /// The first snapshot recorded, even when it has left the retained window.
    pub fn first(&self) -> Option<&PortfolioSnapshot> {
        self.first.as_ref()
    }

    pub fn latest(&self) -> Option<&PortfolioSnapshot> {
        self.snapshots.back()
    }

    /// Number of retained snapshots.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PortfolioSnapshot> {
        self.snapshots.iter()
    }

    /// Compares the first snapshot ever recorded with the latest one.
    pub fn trend(&self) -> Option<PortfolioTrend> {
        let first = self.first()?;
        let last = self.latest()?;
        let value_change = last.total_value - first.total_value;
        let value_change_pct = if first.total_value.is_zero() {
            None
        } else {
            Some(value_change / first.total_value * Decimal::ONE_HUNDRED)
        };
        Some(PortfolioTrend {
            from: first.taken_at,
            to: last.taken_at,
            start_value: first.total_value,
            end_value: last.total_value,
            value_change,
            value_change_pct,
            snapshots: self.recorded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snapshot(value: Decimal, at: DateTime<Utc>) -> PortfolioSnapshot {
        PortfolioSnapshot::compute(
            vec![PoolValuation {
                pool_id: PoolId::new("pool"),
                value,
                target_pct: dec!(100),
                unclaimed_fees: Decimal::ZERO,
                unclaimed_rewards: Decimal::ZERO,
                stale: false,
            }],
            dec!(5),
            at,
        )
    }

    #[test]
    fn test_trend_first_vs_latest() {
        let start = Utc::now();
        let mut history = SnapshotHistory::new();
        assert!(history.trend().is_none());

        history.push(snapshot(dec!(100), start));
        history.push(snapshot(dec!(90), start + chrono::Duration::seconds(60)));
        history.push(snapshot(dec!(110), start + chrono::Duration::seconds(120)));

        let trend = history.trend().unwrap();
        assert_eq!(trend.value_change, dec!(10));
        assert_eq!(trend.value_change_pct, Some(dec!(10)));
        assert_eq!(trend.snapshots, 3);
        assert_eq!(trend.from, start);
    }

    #[test]
    fn test_bounded_history_drops_oldest() {
        let start = Utc::now();
        let mut history = SnapshotHistory::bounded(2);
        for i in 0..5 {
            history.push(snapshot(Decimal::from(i), start));
        }
        assert_eq!(history.len(), 2);
        assert_eq!(history.iter().next().unwrap().total_value, dec!(3));
        assert_eq!(history.latest().unwrap().total_value, dec!(4));
    }

    #[test]
    fn test_bounded_trend_starts_from_first_snapshot() {
        let start = Utc::now();
        let mut history = SnapshotHistory::bounded(3);
        for i in 0..5 {
            history.push(snapshot(
                dec!(101) + Decimal::from(i * 5),
                start + chrono::Duration::seconds(i * 60),
            ));
        }

        let trend = history.trend().unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(trend.start_value, dec!(101));
        assert_eq!(trend.end_value, dec!(121));
        assert_eq!(trend.from, start);
        assert_eq!(trend.snapshots, 5);
    }

    #[test]
    fn test_zero_start_has_no_percentage() {
        let start = Utc::now();
        let mut history = SnapshotHistory::new();
        history.push(snapshot(Decimal::ZERO, start));
        history.push(snapshot(dec!(50), start));
        assert_eq!(history.trend().unwrap().value_change_pct, None);
    }
}
