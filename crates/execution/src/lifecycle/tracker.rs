//! Lifecycle tracker for position history.

use super::{
    EventData, InterruptedRebalanceData, LifecycleEvent, LifecycleEventType, PositionOpenedData,
    RebalanceData,
};
use chrono::{DateTime, Utc};
use clmm_keeper_domain::prelude::*;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Summary of a position's lifecycle.
#[derive(Debug, Clone, Serialize)]
pub struct PositionSummary {
    /// Position handle.
    pub position: PositionId,
    /// Pool the position lives in.
    pub pool: PoolId,
    /// When the keeper started managing the position.
    pub opened_at: DateTime<Utc>,
    /// Last completed rebalance.
    pub last_rebalance_at: Option<DateTime<Utc>>,
    /// Completed rebalances.
    pub rebalance_count: u32,
    /// Rebalances that stopped between withdraw and deposit.
    pub interrupted_count: u32,
    /// Total fees claimed.
    pub fees_claimed: TokenAmounts,
    /// Total rewards claimed.
    pub rewards_claimed: Decimal,
}

/// Tracks lifecycle events for all positions.
pub struct LifecycleTracker {
    /// Events by position.
    events: Arc<RwLock<HashMap<PositionId, Vec<LifecycleEvent>>>>,
    /// Position summaries.
    summaries: Arc<RwLock<HashMap<PositionId, PositionSummary>>>,
}

impl LifecycleTracker {
    /// Creates a new lifecycle tracker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(HashMap::new())),
            summaries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Records a position the keeper created or adopted.
    pub async fn record_position_opened(
        &self,
        position: &ManagedPosition,
        adopted: bool,
        at: DateTime<Utc>,
    ) {
        let event_type = if adopted {
            LifecycleEventType::PositionAdopted
        } else {
            LifecycleEventType::PositionOpened
        };
        let data = PositionOpenedData {
            range: position.range,
            reference_index: position.last_observed_index,
            deposited: position.deposited,
        };
        let event = LifecycleEvent::new(
            event_type,
            position.position_id.clone(),
            position.pool_id.clone(),
            EventData::Opened(data),
            at,
        );
        self.add_event(event).await;

        self.summaries.write().await.insert(
            position.position_id.clone(),
            PositionSummary {
                position: position.position_id.clone(),
                pool: position.pool_id.clone(),
                opened_at: at,
                last_rebalance_at: None,
                rebalance_count: 0,
                interrupted_count: 0,
                fees_claimed: TokenAmounts::ZERO,
                rewards_claimed: Decimal::ZERO,
            },
        );

        info!(
            pool = %position.pool_id,
            position = %position.position_id,
            range = %position.range,
            adopted,
            "Position opened"
        );
    }

    /// Starts tracking a position loaded from the store. No event is emitted;
    /// counters of an already tracked position are left as they are.
    pub async fn register_restored(&self, position: &ManagedPosition) {
        self.summaries
            .write()
            .await
            .entry(position.position_id.clone())
            .or_insert_with(|| PositionSummary {
                position: position.position_id.clone(),
                pool: position.pool_id.clone(),
                opened_at: position.opened_at,
                last_rebalance_at: None,
                rebalance_count: 0,
                interrupted_count: 0,
                fees_claimed: TokenAmounts::ZERO,
                rewards_claimed: Decimal::ZERO,
            });
        debug!(
            pool = %position.pool_id,
            position = %position.position_id,
            "Restored position registered"
        );
    }

    /// Records a completed rebalance.
    pub async fn record_rebalance(
        &self,
        position: &ManagedPosition,
        data: RebalanceData,
        at: DateTime<Utc>,
    ) {
        info!(
            pool = %position.pool_id,
            position = %position.position_id,
            old_range = %data.old_range,
            new_range = %data.new_range,
            moved = %data.moved,
            "Position rebalanced"
        );

        self.add_event(LifecycleEvent::new(
            LifecycleEventType::Rebalanced,
            position.position_id.clone(),
            position.pool_id.clone(),
            EventData::Rebalance(data),
            at,
        ))
        .await;

        if let Some(summary) = self.summaries.write().await.get_mut(&position.position_id) {
            summary.rebalance_count += 1;
            summary.last_rebalance_at = Some(at);
        }
    }

    /// Records a rebalance that withdrew liquidity but failed to re-deposit it.
    pub async fn record_interrupted(
        &self,
        position: &ManagedPosition,
        data: InterruptedRebalanceData,
        at: DateTime<Utc>,
    ) {
        warn!(
            pool = %position.pool_id,
            position = %position.position_id,
            target_range = %data.target_range,
            withdrawn = %data.withdrawn,
            error = %data.error,
            "Rebalance interrupted after withdraw"
        );

        self.add_event(LifecycleEvent::new(
            LifecycleEventType::RebalanceInterrupted,
            position.position_id.clone(),
            position.pool_id.clone(),
            EventData::Interrupted(data),
            at,
        ))
        .await;

        if let Some(summary) = self.summaries.write().await.get_mut(&position.position_id) {
            summary.interrupted_count += 1;
        }
    }

    /// Records a pending deposit that finally landed.
    pub async fn record_deposit_resumed(
        &self,
        position: &ManagedPosition,
        data: RebalanceData,
        at: DateTime<Utc>,
    ) {
        info!(
            pool = %position.pool_id,
            position = %position.position_id,
            new_range = %data.new_range,
            "Pending deposit resumed"
        );

        self.add_event(LifecycleEvent::new(
            LifecycleEventType::DepositResumed,
            position.position_id.clone(),
            position.pool_id.clone(),
            EventData::Rebalance(data),
            at,
        ))
        .await;

        if let Some(summary) = self.summaries.write().await.get_mut(&position.position_id) {
            summary.rebalance_count += 1;
            summary.last_rebalance_at = Some(at);
        }
    }

    /// Records claimed trading fees.
    pub async fn record_fees_claimed(
        &self,
        position: &ManagedPosition,
        fees: TokenAmounts,
        at: DateTime<Utc>,
    ) {
        self.add_event(LifecycleEvent::new(
            LifecycleEventType::FeesClaimed,
            position.position_id.clone(),
            position.pool_id.clone(),
            EventData::Fees(fees),
            at,
        ))
        .await;

        if let Some(summary) = self.summaries.write().await.get_mut(&position.position_id) {
            summary.fees_claimed = summary.fees_claimed + fees;
        }

        info!(
            pool = %position.pool_id,
            position = %position.position_id,
            fees = %fees,
            "Fees claimed"
        );
    }

    /// Records claimed incentive rewards.
    pub async fn record_rewards_claimed(
        &self,
        position: &ManagedPosition,
        rewards: Decimal,
        at: DateTime<Utc>,
    ) {
        self.add_event(LifecycleEvent::new(
            LifecycleEventType::RewardsClaimed,
            position.position_id.clone(),
            position.pool_id.clone(),
            EventData::Rewards(rewards),
            at,
        ))
        .await;

        if let Some(summary) = self.summaries.write().await.get_mut(&position.position_id) {
            summary.rewards_claimed += rewards;
        }

        info!(
            pool = %position.pool_id,
            position = %position.position_id,
            rewards = %rewards,
            "Rewards claimed"
        );
    }

    /// Adds an event to the tracker.
    async fn add_event(&self, event: LifecycleEvent) {
        debug!(event_type = ?event.event_type, position = %event.position, "Lifecycle event");
        let mut events = self.events.write().await;
        events.entry(event.position.clone()).or_default().push(event);
    }

    /// Gets all events for a position.
    pub async fn get_events(&self, position: &PositionId) -> Vec<LifecycleEvent> {
        self.events
            .read()
            .await
            .get(position)
            .cloned()
            .unwrap_or_default()
    }

    /// Gets the summary for a position.
    pub async fn get_summary(&self, position: &PositionId) -> Option<PositionSummary> {
        self.summaries.read().await.get(position).cloned()
    }

    /// Gets all position summaries.
    pub async fn get_all_summaries(&self) -> Vec<PositionSummary> {
        self.summaries.read().await.values().cloned().collect()
    }

    /// Gets aggregate statistics.
    pub async fn get_aggregate_stats(&self) -> AggregateStats {
        let summaries = self.summaries.read().await;

        let mut stats = AggregateStats::default();
        for summary in summaries.values() {
            stats.total_positions += 1;
            stats.total_rebalances += summary.rebalance_count;
            stats.total_interrupted += summary.interrupted_count;
            stats.total_fees = stats.total_fees + summary.fees_claimed;
            stats.total_rewards += summary.rewards_claimed;
        }

        stats
    }
}

impl Default for LifecycleTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregate statistics across all positions.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregateStats {
    /// Positions tracked.
    pub total_positions: u32,
    /// Completed rebalances, resumed deposits included.
    pub total_rebalances: u32,
    /// Interrupted rebalances.
    pub total_interrupted: u32,
    /// Fees claimed.
    pub total_fees: TokenAmounts,
    /// Rewards claimed.
    pub total_rewards: Decimal,
}
