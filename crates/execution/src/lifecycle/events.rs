//! Lifecycle events for managed positions.

use chrono::{DateTime, Utc};
use clmm_keeper_domain::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Type of lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEventType {
    /// Position was created by the keeper.
    PositionOpened,
    /// An existing position was taken over at startup.
    PositionAdopted,
    /// Range was moved.
    Rebalanced,
    /// Liquidity was withdrawn but the re-deposit failed.
    RebalanceInterrupted,
    /// A pending re-deposit landed.
    DepositResumed,
    /// Trading fees were claimed.
    FeesClaimed,
    /// Incentive rewards were claimed.
    RewardsClaimed,
}

/// A lifecycle event for a position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// Event ID.
    pub id: String,
    /// Event type.
    pub event_type: LifecycleEventType,
    /// Position handle.
    pub position: PositionId,
    /// Pool the position lives in.
    pub pool: PoolId,
    /// When the event happened.
    pub timestamp: DateTime<Utc>,
    /// Event-specific data.
    pub data: EventData,
}

impl LifecycleEvent {
    /// Creates a new lifecycle event.
    pub fn new(
        event_type: LifecycleEventType,
        position: PositionId,
        pool: PoolId,
        data: EventData,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type,
            position,
            pool,
            timestamp,
            data,
        }
    }
}

/// Event-specific data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventData {
    /// Position opened or adopted.
    Opened(PositionOpenedData),
    /// Range moved.
    Rebalance(RebalanceData),
    /// Withdrawn liquidity awaiting re-deposit.
    Interrupted(InterruptedRebalanceData),
    /// Fees claimed.
    Fees(TokenAmounts),
    /// Rewards claimed.
    Rewards(Decimal),
}

/// Data for position opened event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionOpenedData {
    /// Initial range.
    pub range: TickRange,
    /// Reference index at creation.
    pub reference_index: i32,
    /// Deposited amounts.
    pub deposited: TokenAmounts,
}

/// Data for rebalance event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceData {
    /// Range before the move.
    pub old_range: TickRange,
    /// Range after the move.
    pub new_range: TickRange,
    /// Amounts moved between the ranges.
    pub moved: TokenAmounts,
}

/// Data for an interrupted rebalance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterruptedRebalanceData {
    /// Range the liquidity should land in.
    pub target_range: TickRange,
    /// Withdrawn, not yet re-deposited.
    pub withdrawn: TokenAmounts,
    /// Error from the failed deposit.
    pub error: String,
}
