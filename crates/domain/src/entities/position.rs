use crate::entities::pool::PoolId;
use crate::value_objects::amount::TokenAmounts;
use crate::value_objects::tick_range::TickRange;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque position handle issued by the pool client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionId(pub String);

impl PositionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// On-chain view of a position as reported by the pool client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionState {
    pub range: TickRange,
    pub deposited: TokenAmounts,
    pub accrued_fees: TokenAmounts,
    pub accrued_rewards: Decimal,
}

/// Liquidity withdrawn by a rebalance whose re-deposit has not landed yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingDeposit {
    pub target_range: TickRange,
    pub center: i32,
    pub amounts: TokenAmounts,
    pub since: DateTime<Utc>,
}

/// A liquidity position owned and driven by one control loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedPosition {
    pub pool_id: PoolId,
    pub position_id: PositionId,
    pub range: TickRange,
    pub last_observed_index: i32,
    pub deposited: TokenAmounts,
    pub accrued_fees: TokenAmounts,
    pub accrued_rewards: Decimal,
    pub last_fee_claim_at: DateTime<Utc>,
    pub last_reward_claim_at: DateTime<Utc>,
    #[serde(default)]
    pub pending_deposit: Option<PendingDeposit>,
    pub opened_at: DateTime<Utc>,
}

impl ManagedPosition {
    /// Builds the record for a position just created around `reference_index`.
    pub fn opened(
        pool_id: PoolId,
        position_id: PositionId,
        range: TickRange,
        reference_index: i32,
        deposited: TokenAmounts,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            pool_id,
            position_id,
            range,
            last_observed_index: reference_index,
            deposited,
            accrued_fees: TokenAmounts::ZERO,
            accrued_rewards: Decimal::ZERO,
            last_fee_claim_at: now,
            last_reward_claim_at: now,
            pending_deposit: None,
            opened_at: now,
        }
    }

    /// Adopts a position that already existed before the keeper started.
    pub fn adopted(
        pool_id: PoolId,
        position_id: PositionId,
        state: &PositionState,
        now: DateTime<Utc>,
    ) -> Self {
        let mut position = Self::opened(
            pool_id,
            position_id,
            state.range,
            state.range.center(),
            state.deposited,
            now,
        );
        position.accrued_fees = state.accrued_fees;
        position.accrued_rewards = state.accrued_rewards;
        position
    }

    /// Overwrites the locally cached amounts with a fresh read from the pool client.
    ///
    /// The range is only taken over while no deposit is pending: during a partial
    /// rebalance the on-chain range is the old, emptied one.
    pub fn refresh(&mut self, state: &PositionState) {
        if self.pending_deposit.is_none() {
            self.range = state.range;
        }
        self.deposited = state.deposited;
        self.accrued_fees = state.accrued_fees;
        self.accrued_rewards = state.accrued_rewards;
    }

    pub fn has_pending_deposit(&self) -> bool {
        self.pending_deposit.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn state(range: TickRange) -> PositionState {
        PositionState {
            range,
            deposited: TokenAmounts::new(dec!(1), dec!(100)),
            accrued_fees: TokenAmounts::new(dec!(0.01), dec!(0.5)),
            accrued_rewards: dec!(3),
        }
    }

    #[test]
    fn test_adopted_position_centers_reference() {
        let now = Utc::now();
        let position = ManagedPosition::adopted(
            PoolId::new("pool"),
            PositionId::new("pos"),
            &state(TickRange::new(80, 120)),
            now,
        );
        assert_eq!(position.last_observed_index, 100);
        assert_eq!(position.accrued_rewards, dec!(3));
        assert_eq!(position.last_fee_claim_at, now);
    }

    #[test]
    fn test_refresh_keeps_range_while_deposit_pending() {
        let now = Utc::now();
        let mut position = ManagedPosition::opened(
            PoolId::new("pool"),
            PositionId::new("pos"),
            TickRange::new(90, 110),
            100,
            TokenAmounts::ZERO,
            now,
        );
        position.pending_deposit = Some(PendingDeposit {
            target_range: TickRange::new(96, 116),
            center: 106,
            amounts: TokenAmounts::new(dec!(1), dec!(1)),
            since: now,
        });

        position.refresh(&state(TickRange::new(0, 10)));
        assert_eq!(position.range, TickRange::new(90, 110));
        assert_eq!(position.deposited, TokenAmounts::new(dec!(1), dec!(100)));

        position.pending_deposit = None;
        position.refresh(&state(TickRange::new(0, 10)));
        assert_eq!(position.range, TickRange::new(0, 10));
    }

    #[test]
    fn test_position_serde_roundtrip() {
        let position = ManagedPosition::opened(
            PoolId::new("pool"),
            PositionId::new("pos"),
            TickRange::new(90, 110),
            100,
            TokenAmounts::new(dec!(2), dec!(3)),
            Utc::now(),
        );
        let json = serde_json::to_string(&position).unwrap();
        let back: ManagedPosition = serde_json::from_str(&json).unwrap();
        assert_eq!(back, position);
    }
}
