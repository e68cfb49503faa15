//! Time-gated fee and reward claims.

use crate::lifecycle::LifecycleTracker;
use chrono::{DateTime, Utc};
use clmm_keeper_domain::prelude::*;
use clmm_keeper_protocols::prelude::*;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Why a harvest made no claim at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HarvestSkipReason {
    /// Neither timer has run for the full interval.
    IntervalNotElapsed,
    /// A timer is due but nothing has accrued.
    NothingAccrued,
    /// Something is due, but writes are disabled.
    DryRun,
    /// Liquidity is parked between withdraw and deposit.
    PendingDeposit,
}

/// Result of one claim kind within a harvest.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum ClaimStatus<T> {
    /// Not eligible this time.
    NotDue,
    /// Claimed the given amount.
    Claimed(T),
    /// The claim call failed; state was left untouched.
    Failed(String),
}

impl<T> ClaimStatus<T> {
    pub fn is_claimed(&self) -> bool {
        matches!(self, ClaimStatus::Claimed(_))
    }
}

/// Outcome of a harvest attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HarvestOutcome {
    /// No claim was attempted.
    Skipped { reason: HarvestSkipReason },
    /// At least one kind was attempted.
    Harvested {
        fees: ClaimStatus<TokenAmounts>,
        rewards: ClaimStatus<Decimal>,
    },
}

impl HarvestOutcome {
    /// Number of successful claim calls.
    pub fn claims(&self) -> usize {
        match self {
            HarvestOutcome::Skipped { .. } => 0,
            HarvestOutcome::Harvested { fees, rewards } => {
                usize::from(fees.is_claimed()) + usize::from(rewards.is_claimed())
            }
        }
    }
}

impl fmt::Display for HarvestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HarvestOutcome::Skipped { reason } => write!(f, "skipped ({reason:?})"),
            HarvestOutcome::Harvested { fees, rewards } => {
                let fees = match fees {
                    ClaimStatus::NotDue => "not due".to_string(),
                    ClaimStatus::Claimed(amounts) => amounts.to_string(),
                    ClaimStatus::Failed(e) => format!("failed: {e}"),
                };
                let rewards = match rewards {
                    ClaimStatus::NotDue => "not due".to_string(),
                    ClaimStatus::Claimed(amount) => amount.to_string(),
                    ClaimStatus::Failed(e) => format!("failed: {e}"),
                };
                write!(f, "fees {fees}, rewards {rewards}")
            }
        }
    }
}

/// Claims accrued fees and rewards once per interval.
///
/// Fees and rewards run on separate timers. A kind is eligible when its timer
/// has run for at least the interval and something has accrued; a failed
/// claim leaves the timer and the accrued amount as they were so the next
/// eligible tick tries again.
pub struct RewardHarvester {
    client: Arc<dyn PoolClient>,
    lifecycle: Arc<LifecycleTracker>,
    interval: chrono::Duration,
    dry_run: bool,
}

impl RewardHarvester {
    /// Creates a new harvester.
    pub fn new(
        client: Arc<dyn PoolClient>,
        lifecycle: Arc<LifecycleTracker>,
        interval: chrono::Duration,
    ) -> Self {
        Self {
            client,
            lifecycle,
            interval,
            dry_run: false,
        }
    }

    /// Enables or disables dry run mode.
    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.dry_run = dry_run;
    }

    pub fn interval(&self) -> chrono::Duration {
        self.interval
    }

    /// Claims whatever is due on `position` at `now`.
    pub async fn maybe_harvest(
        &self,
        position: &mut ManagedPosition,
        now: DateTime<Utc>,
    ) -> HarvestOutcome {
        if position.has_pending_deposit() {
            return HarvestOutcome::Skipped {
                reason: HarvestSkipReason::PendingDeposit,
            };
        }

        let fees_timer_due = now - position.last_fee_claim_at >= self.interval;
        let rewards_timer_due = now - position.last_reward_claim_at >= self.interval;
        if !fees_timer_due && !rewards_timer_due {
            return HarvestOutcome::Skipped {
                reason: HarvestSkipReason::IntervalNotElapsed,
            };
        }

        let fees_due = fees_timer_due && position.accrued_fees.any_positive();
        let rewards_due = rewards_timer_due && position.accrued_rewards > Decimal::ZERO;
        if !fees_due && !rewards_due {
            debug!(
                pool = %position.pool_id,
                position = %position.position_id,
                "Harvest due but nothing accrued"
            );
            return HarvestOutcome::Skipped {
                reason: HarvestSkipReason::NothingAccrued,
            };
        }

        if self.dry_run {
            return HarvestOutcome::Skipped {
                reason: HarvestSkipReason::DryRun,
            };
        }

        let fees = if fees_due {
            match self.client.claim_fees(&position.position_id).await {
                Ok(claimed) => {
                    position.accrued_fees = TokenAmounts::ZERO;
                    position.last_fee_claim_at = now;
                    self.lifecycle
                        .record_fees_claimed(position, claimed, now)
                        .await;
                    ClaimStatus::Claimed(claimed)
                }
                Err(e) => {
                    warn!(
                        pool = %position.pool_id,
                        position = %position.position_id,
                        error = %e,
                        "Fee claim failed"
                    );
                    ClaimStatus::Failed(e.to_string())
                }
            }
        } else {
            ClaimStatus::NotDue
        };

        let rewards = if rewards_due {
            match self.client.claim_rewards(&position.position_id).await {
                Ok(claimed) => {
                    position.accrued_rewards = Decimal::ZERO;
                    position.last_reward_claim_at = now;
                    self.lifecycle
                        .record_rewards_claimed(position, claimed, now)
                        .await;
                    ClaimStatus::Claimed(claimed)
                }
                Err(e) => {
                    warn!(
                        pool = %position.pool_id,
                        position = %position.position_id,
                        error = %e,
                        "Reward claim failed"
                    );
                    ClaimStatus::Failed(e.to_string())
                }
            }
        } else {
            ClaimStatus::NotDue
        };

        HarvestOutcome::Harvested { fees, rewards }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn setup() -> (Arc<SimulatedPoolClient>, RewardHarvester, ManagedPosition, DateTime<Utc>) {
        let sim = Arc::new(SimulatedPoolClient::new());
        sim.add_pool("pool", 100, AssetPrices::unit());
        let pool = PoolId::new("pool");
        let range = TickRange::centered(100, 10);
        let deposited = TokenAmounts::new(dec!(1), dec!(100));
        let id = sim.insert_position(&pool, range, deposited);
        sim.accrue(&id, TokenAmounts::new(dec!(0.1), dec!(2)), dec!(7));

        let start = Utc::now();
        let mut position = ManagedPosition::opened(pool, id, range, 100, deposited, start);
        position.accrued_fees = TokenAmounts::new(dec!(0.1), dec!(2));
        position.accrued_rewards = dec!(7);

        let harvester = RewardHarvester::new(
            sim.clone(),
            Arc::new(LifecycleTracker::new()),
            chrono::Duration::seconds(3600),
        );
        (sim, harvester, position, start)
    }

    #[tokio::test]
    async fn test_skips_before_interval() {
        let (sim, harvester, mut position, start) = setup();

        let outcome = harvester
            .maybe_harvest(&mut position, start + chrono::Duration::seconds(10))
            .await;

        assert_eq!(
            outcome,
            HarvestOutcome::Skipped {
                reason: HarvestSkipReason::IntervalNotElapsed
            }
        );
        assert_eq!(sim.call_count(ClientOperation::ClaimFees), 0);
        assert_eq!(sim.call_count(ClientOperation::ClaimRewards), 0);
    }

    #[tokio::test]
    async fn test_claims_both_kinds_once_per_window() {
        let (sim, harvester, mut position, start) = setup();
        let later = start + chrono::Duration::seconds(3601);

        let outcome = harvester.maybe_harvest(&mut position, later).await;
        assert_eq!(outcome.claims(), 2);
        assert!(position.accrued_fees.is_zero());
        assert_eq!(position.accrued_rewards, Decimal::ZERO);
        assert_eq!(position.last_fee_claim_at, later);

        sim.accrue(
            &position.position_id,
            TokenAmounts::new(dec!(1), dec!(1)),
            dec!(1),
        );
        position.accrued_fees = TokenAmounts::new(dec!(1), dec!(1));
        let outcome = harvester
            .maybe_harvest(&mut position, later + chrono::Duration::seconds(10))
            .await;
        assert_eq!(outcome.claims(), 0);
        assert_eq!(sim.call_count(ClientOperation::ClaimFees), 1);
        assert_eq!(sim.call_count(ClientOperation::ClaimRewards), 1);
    }

    #[tokio::test]
    async fn test_nothing_accrued_makes_no_calls() {
        let (sim, harvester, mut position, start) = setup();
        position.accrued_fees = TokenAmounts::ZERO;
        position.accrued_rewards = Decimal::ZERO;

        let outcome = harvester
            .maybe_harvest(&mut position, start + chrono::Duration::seconds(7200))
            .await;

        assert_eq!(
            outcome,
            HarvestOutcome::Skipped {
                reason: HarvestSkipReason::NothingAccrued
            }
        );
        assert_eq!(sim.call_count(ClientOperation::ClaimFees), 0);
    }

    #[tokio::test]
    async fn test_failed_claim_keeps_state_for_retry() {
        let (sim, harvester, mut position, start) = setup();
        sim.fail_next(ClientOperation::ClaimRewards, PoolClientError::RateLimited);
        let later = start + chrono::Duration::seconds(3601);

        let outcome = harvester.maybe_harvest(&mut position, later).await;

        match &outcome {
            HarvestOutcome::Harvested { fees, rewards } => {
                assert!(fees.is_claimed());
                assert!(matches!(rewards, ClaimStatus::Failed(_)));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(position.accrued_rewards, dec!(7));
        assert_eq!(position.last_reward_claim_at, start);

        let outcome = harvester
            .maybe_harvest(&mut position, later + chrono::Duration::seconds(10))
            .await;
        match outcome {
            HarvestOutcome::Harvested { fees, rewards } => {
                assert_eq!(fees, ClaimStatus::NotDue);
                assert_eq!(rewards, ClaimStatus::Claimed(dec!(7)));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dry_run_does_not_claim() {
        let (sim, mut harvester, mut position, start) = setup();
        harvester.set_dry_run(true);

        let outcome = harvester
            .maybe_harvest(&mut position, start + chrono::Duration::seconds(3601))
            .await;

        assert_eq!(
            outcome,
            HarvestOutcome::Skipped {
                reason: HarvestSkipReason::DryRun
            }
        );
        assert_eq!(sim.call_count(ClientOperation::ClaimFees), 0);
    }
}
