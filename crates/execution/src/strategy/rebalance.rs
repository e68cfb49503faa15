//! Rebalancing execution logic.

use crate::lifecycle::{InterruptedRebalanceData, LifecycleTracker, RebalanceData};
use crate::scheduler::Clock;
use crate::strategy::PositionTracker;
use clmm_keeper_domain::prelude::*;
use clmm_keeper_protocols::prelude::*;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Step of a rebalance that failed before anything moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceStage {
    /// Creating the initial position.
    Create,
    /// Removing liquidity from the old range.
    Withdraw,
}

/// Why a rebalance did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The position already sits on the requested range.
    AlreadyCentered,
    /// No withdrawn liquidity is waiting to be re-deposited.
    NothingPending,
    /// A previous rebalance must be resumed first.
    PendingDeposit,
}

/// Liquidity withdrawn by a rebalance whose deposit step failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartialRebalance {
    /// Position holding the emptied range.
    pub position_id: PositionId,
    /// Range the liquidity should land in.
    pub target_range: TickRange,
    /// Amounts awaiting re-deposit.
    pub withdrawn: TokenAmounts,
    /// Error from the deposit call.
    pub error: String,
}

/// Outcome of a rebalance or resume attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RebalanceOutcome {
    /// A new position was opened.
    Created {
        position_id: PositionId,
        range: TickRange,
        deposited: TokenAmounts,
    },
    /// The position was moved to a new range.
    Rebalanced {
        position_id: PositionId,
        old_range: TickRange,
        new_range: TickRange,
        moved: TokenAmounts,
    },
    /// A pending deposit from an earlier partial rebalance landed.
    Resumed {
        position_id: PositionId,
        new_range: TickRange,
        moved: TokenAmounts,
    },
    /// Nothing to do.
    Skipped { reason: SkipReason },
    /// Withdraw succeeded, deposit did not.
    Partial(PartialRebalance),
    /// Failed before any liquidity moved.
    Failed { stage: RebalanceStage, error: String },
    /// Dry run: the range that would have been used.
    DryRun { new_range: TickRange },
}

impl RebalanceOutcome {
    /// Whether the position ended in a consistent state.
    pub fn is_success(&self) -> bool {
        !matches!(
            self,
            RebalanceOutcome::Partial(_) | RebalanceOutcome::Failed { .. }
        )
    }
}

impl fmt::Display for RebalanceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebalanceOutcome::Created {
                position_id, range, ..
            } => write!(f, "created {position_id} at {range}"),
            RebalanceOutcome::Rebalanced {
                old_range,
                new_range,
                ..
            } => write!(f, "rebalanced {old_range} -> {new_range}"),
            RebalanceOutcome::Resumed { new_range, .. } => {
                write!(f, "resumed deposit into {new_range}")
            }
            RebalanceOutcome::Skipped { reason } => write!(f, "skipped ({reason:?})"),
            RebalanceOutcome::Partial(p) => write!(
                f,
                "partial: {} withdrawn, deposit into {} failed: {}",
                p.withdrawn, p.target_range, p.error
            ),
            RebalanceOutcome::Failed { stage, error } => {
                write!(f, "failed at {stage:?}: {error}")
            }
            RebalanceOutcome::DryRun { new_range } => write!(f, "dry run, would use {new_range}"),
        }
    }
}

/// Error reported when a shift finds no liquidity to move.
///
/// Usually the previous withdraw landed but its result was lost; the funds are
/// back in the wallet and need an operator.
pub const EMPTY_POSITION: &str = "position holds no liquidity";

/// Executor for range shifts.
///
/// A shift is two client calls: a full withdraw followed by a deposit of the
/// withdrawn amounts into the new range. When the second call fails the
/// withdrawn amounts are parked on the position as a pending deposit, and
/// [`RebalanceExecutor::resume_deposit`] finishes the job without withdrawing
/// again.
pub struct RebalanceExecutor {
    client: Arc<dyn PoolClient>,
    lifecycle: Arc<LifecycleTracker>,
    clock: Arc<dyn Clock>,
    dry_run: bool,
}

impl RebalanceExecutor {
    /// Creates a new rebalance executor.
    pub fn new(
        client: Arc<dyn PoolClient>,
        lifecycle: Arc<LifecycleTracker>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client,
            lifecycle,
            clock,
            dry_run: false,
        }
    }

    /// Enables or disables dry run mode.
    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.dry_run = dry_run;
    }

    /// Centres the pool's position on `new_center`, opening it if `slot` is empty.
    pub async fn rebalance(
        &self,
        slot: &mut Option<ManagedPosition>,
        config: &PoolConfig,
        new_center: i32,
    ) -> RebalanceOutcome {
        let new_range = TickRange::centered(new_center, config.half_width);

        let Some(position) = slot.as_mut() else {
            return self.create(slot, config, new_center, new_range).await;
        };

        if position.has_pending_deposit() {
            return RebalanceOutcome::Skipped {
                reason: SkipReason::PendingDeposit,
            };
        }

        if position.range == new_range {
            debug!(
                pool = %config.pool_id,
                position = %position.position_id,
                range = %new_range,
                "Position already centred"
            );
            if !self.dry_run {
                PositionTracker::for_pool(config).mark_observed(position, new_center);
            }
            return RebalanceOutcome::Skipped {
                reason: SkipReason::AlreadyCentered,
            };
        }

        info!(
            pool = %config.pool_id,
            position = %position.position_id,
            old_range = %position.range,
            new_range = %new_range,
            dry_run = self.dry_run,
            "Executing rebalance"
        );

        if self.dry_run {
            return RebalanceOutcome::DryRun { new_range };
        }

        if position.deposited.is_zero() {
            error!(
                pool = %config.pool_id,
                position = %position.position_id,
                "Position holds no liquidity, refusing to shift an empty range"
            );
            return RebalanceOutcome::Failed {
                stage: RebalanceStage::Withdraw,
                error: EMPTY_POSITION.to_string(),
            };
        }

        let withdrawn = match self
            .client
            .withdraw(&position.position_id, FULL_WITHDRAW_BPS, false)
            .await
        {
            Ok(amounts) => amounts,
            Err(e) => {
                error!(
                    pool = %config.pool_id,
                    position = %position.position_id,
                    error = %e,
                    "Failed to withdraw liquidity"
                );
                return RebalanceOutcome::Failed {
                    stage: RebalanceStage::Withdraw,
                    error: e.to_string(),
                };
            }
        };

        if withdrawn.is_zero() {
            error!(
                pool = %config.pool_id,
                position = %position.position_id,
                "Withdraw returned nothing"
            );
            return RebalanceOutcome::Failed {
                stage: RebalanceStage::Withdraw,
                error: EMPTY_POSITION.to_string(),
            };
        }

        position.deposited = TokenAmounts::ZERO;
        position.pending_deposit = Some(PendingDeposit {
            target_range: new_range,
            center: new_center,
            amounts: withdrawn,
            since: self.clock.now(),
        });

        self.complete_deposit(position, config, false).await
    }

    /// Re-issues the deposit step of an interrupted rebalance.
    pub async fn resume_deposit(
        &self,
        position: &mut ManagedPosition,
        config: &PoolConfig,
    ) -> RebalanceOutcome {
        let Some(pending) = &position.pending_deposit else {
            return RebalanceOutcome::Skipped {
                reason: SkipReason::NothingPending,
            };
        };

        info!(
            pool = %config.pool_id,
            position = %position.position_id,
            target_range = %pending.target_range,
            amounts = %pending.amounts,
            dry_run = self.dry_run,
            "Resuming pending deposit"
        );

        if self.dry_run {
            return RebalanceOutcome::DryRun {
                new_range: pending.target_range,
            };
        }

        self.complete_deposit(position, config, true).await
    }

    async fn create(
        &self,
        slot: &mut Option<ManagedPosition>,
        config: &PoolConfig,
        center: i32,
        range: TickRange,
    ) -> RebalanceOutcome {
        info!(
            pool = %config.pool_id,
            range = %range,
            amounts = %config.deposit_amounts,
            strategy = %config.strategy,
            dry_run = self.dry_run,
            "Opening position"
        );

        if self.dry_run {
            return RebalanceOutcome::DryRun { new_range: range };
        }

        match self
            .client
            .create_position_and_deposit(
                &config.pool_id,
                range,
                config.deposit_amounts,
                config.strategy,
            )
            .await
        {
            Ok(position_id) => {
                let position = ManagedPosition::opened(
                    config.pool_id.clone(),
                    position_id.clone(),
                    range,
                    center,
                    config.deposit_amounts,
                    self.clock.now(),
                );
                self.lifecycle
                    .record_position_opened(&position, false, position.opened_at)
                    .await;
                *slot = Some(position);
                RebalanceOutcome::Created {
                    position_id,
                    range,
                    deposited: config.deposit_amounts,
                }
            }
            Err(e) => {
                error!(pool = %config.pool_id, error = %e, "Failed to open position");
                RebalanceOutcome::Failed {
                    stage: RebalanceStage::Create,
                    error: e.to_string(),
                }
            }
        }
    }

    /// Deposits the pending amounts and settles the position record.
    async fn complete_deposit(
        &self,
        position: &mut ManagedPosition,
        config: &PoolConfig,
        resuming: bool,
    ) -> RebalanceOutcome {
        let Some(pending) = position.pending_deposit.clone() else {
            return RebalanceOutcome::Skipped {
                reason: SkipReason::NothingPending,
            };
        };

        let result = self
            .client
            .deposit(
                &position.position_id,
                pending.target_range,
                pending.amounts,
                config.strategy,
            )
            .await;
        let now = self.clock.now();

        if let Err(e) = result {
            let partial = PartialRebalance {
                position_id: position.position_id.clone(),
                target_range: pending.target_range,
                withdrawn: pending.amounts,
                error: e.to_string(),
            };
            if resuming {
                warn!(
                    pool = %config.pool_id,
                    position = %position.position_id,
                    error = %e,
                    "Pending deposit still failing"
                );
            } else {
                self.lifecycle
                    .record_interrupted(
                        position,
                        InterruptedRebalanceData {
                            target_range: pending.target_range,
                            withdrawn: pending.amounts,
                            error: partial.error.clone(),
                        },
                        now,
                    )
                    .await;
            }
            return RebalanceOutcome::Partial(partial);
        }

        let old_range = position.range;
        position.range = pending.target_range;
        PositionTracker::for_pool(config).mark_observed(position, pending.center);
        position.deposited = pending.amounts;
        position.pending_deposit = None;

        let data = RebalanceData {
            old_range,
            new_range: pending.target_range,
            moved: pending.amounts,
        };
        if resuming {
            self.lifecycle
                .record_deposit_resumed(position, data, now)
                .await;
            RebalanceOutcome::Resumed {
                position_id: position.position_id.clone(),
                new_range: pending.target_range,
                moved: pending.amounts,
            }
        } else {
            self.lifecycle.record_rebalance(position, data, now).await;
            RebalanceOutcome::Rebalanced {
                position_id: position.position_id.clone(),
                old_range,
                new_range: pending.target_range,
                moved: pending.amounts,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualClock;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    struct Fixture {
        sim: Arc<SimulatedPoolClient>,
        executor: RebalanceExecutor,
        config: PoolConfig,
    }

    fn fixture() -> Fixture {
        let sim = Arc::new(SimulatedPoolClient::new());
        sim.add_pool("pool", 100, AssetPrices::unit());
        let executor = RebalanceExecutor::new(
            sim.clone(),
            Arc::new(LifecycleTracker::new()),
            Arc::new(ManualClock::new(Utc::now())),
        );
        let config = PoolConfig::concentrated(
            "pool",
            dec!(100),
            10,
            5,
            TokenAmounts::new(dec!(1), dec!(100)),
        );
        Fixture {
            sim,
            executor,
            config,
        }
    }

    fn assert_centered(position: &ManagedPosition, center: i32) {
        assert!(position.range.lower < center && center < position.range.upper);
    }

    #[tokio::test]
    async fn test_creates_position_when_slot_empty() {
        let f = fixture();
        let mut slot = None;

        let outcome = f.executor.rebalance(&mut slot, &f.config, 100).await;

        assert!(matches!(outcome, RebalanceOutcome::Created { .. }));
        let position = slot.unwrap();
        assert_eq!(position.range, TickRange::new(90, 110));
        assert_eq!(position.last_observed_index, 100);
        assert_centered(&position, 100);
        assert_eq!(f.sim.call_count(ClientOperation::CreatePosition), 1);
    }

    #[tokio::test]
    async fn test_shift_moves_withdrawn_amounts() {
        let f = fixture();
        let mut slot = None;
        f.executor.rebalance(&mut slot, &f.config, 100).await;

        let outcome = f.executor.rebalance(&mut slot, &f.config, 106).await;

        match outcome {
            RebalanceOutcome::Rebalanced {
                old_range,
                new_range,
                moved,
                ..
            } => {
                assert_eq!(old_range, TickRange::new(90, 110));
                assert_eq!(new_range, TickRange::new(96, 116));
                assert_eq!(moved, TokenAmounts::new(dec!(1), dec!(100)));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        let position = slot.unwrap();
        assert_eq!(position.last_observed_index, 106);
        assert_centered(&position, 106);
        let on_chain = f.sim.position(&position.position_id).unwrap();
        assert_eq!(on_chain.range, TickRange::new(96, 116));
    }

    #[tokio::test]
    async fn test_already_centered_skips_client() {
        let f = fixture();
        let mut slot = None;
        f.executor.rebalance(&mut slot, &f.config, 100).await;
        slot.as_mut().unwrap().last_observed_index = 93;

        let outcome = f.executor.rebalance(&mut slot, &f.config, 100).await;

        assert_eq!(
            outcome,
            RebalanceOutcome::Skipped {
                reason: SkipReason::AlreadyCentered
            }
        );
        assert_eq!(slot.unwrap().last_observed_index, 100);
        assert_eq!(f.sim.call_count(ClientOperation::Withdraw), 0);
    }

    #[tokio::test]
    async fn test_withdraw_failure_leaves_position_untouched() {
        let f = fixture();
        let mut slot = None;
        f.executor.rebalance(&mut slot, &f.config, 100).await;
        f.sim
            .fail_next(ClientOperation::Withdraw, PoolClientError::Rejected("no".into()));

        let outcome = f.executor.rebalance(&mut slot, &f.config, 120).await;

        assert!(matches!(
            outcome,
            RebalanceOutcome::Failed {
                stage: RebalanceStage::Withdraw,
                ..
            }
        ));
        let position = slot.unwrap();
        assert_eq!(position.range, TickRange::new(90, 110));
        assert!(!position.has_pending_deposit());
    }

    #[tokio::test]
    async fn test_empty_position_is_not_reported_as_rebalanced() {
        let f = fixture();
        let mut slot = None;
        f.executor.rebalance(&mut slot, &f.config, 100).await;
        let position = slot.as_mut().unwrap();
        // Liquidity left the range without the keeper seeing the result.
        f.sim
            .withdraw(&position.position_id, FULL_WITHDRAW_BPS, false)
            .await
            .unwrap();
        let state = f.sim.get_position_state(&position.position_id).await.unwrap();
        position.refresh(&state);

        let outcome = f.executor.rebalance(&mut slot, &f.config, 120).await;

        assert_eq!(
            outcome,
            RebalanceOutcome::Failed {
                stage: RebalanceStage::Withdraw,
                error: EMPTY_POSITION.to_string(),
            }
        );
        let position = slot.unwrap();
        assert_eq!(position.range, TickRange::new(90, 110));
        assert!(!position.has_pending_deposit());
        assert_eq!(f.sim.call_count(ClientOperation::Withdraw), 1);
        assert_eq!(f.sim.call_count(ClientOperation::Deposit), 0);
    }

    #[tokio::test]
    async fn test_partial_then_resume_without_second_withdraw() {
        let f = fixture();
        let mut slot = None;
        f.executor.rebalance(&mut slot, &f.config, 100).await;
        f.sim
            .fail_next(ClientOperation::Deposit, PoolClientError::Rejected("slippage".into()));

        let outcome = f.executor.rebalance(&mut slot, &f.config, 120).await;
        let RebalanceOutcome::Partial(partial) = outcome else {
            panic!("expected partial rebalance");
        };
        assert_eq!(partial.target_range, TickRange::new(110, 130));
        assert_eq!(partial.withdrawn, TokenAmounts::new(dec!(1), dec!(100)));

        let position = slot.as_mut().unwrap();
        assert!(position.has_pending_deposit());
        assert_eq!(position.range, TickRange::new(90, 110));

        let outcome = f.executor.resume_deposit(position, &f.config).await;
        assert!(matches!(outcome, RebalanceOutcome::Resumed { .. }));
        assert_eq!(position.range, TickRange::new(110, 130));
        assert_eq!(position.last_observed_index, 120);
        assert!(!position.has_pending_deposit());
        assert_eq!(f.sim.call_count(ClientOperation::Withdraw), 1);
        assert_eq!(f.sim.call_count(ClientOperation::Deposit), 2);
    }

    #[tokio::test]
    async fn test_rebalance_refused_while_deposit_pending() {
        let f = fixture();
        let mut slot = None;
        f.executor.rebalance(&mut slot, &f.config, 100).await;
        f.sim
            .fail_next(ClientOperation::Deposit, PoolClientError::Transient("reset".into()));
        f.executor.rebalance(&mut slot, &f.config, 120).await;

        let outcome = f.executor.rebalance(&mut slot, &f.config, 140).await;

        assert_eq!(
            outcome,
            RebalanceOutcome::Skipped {
                reason: SkipReason::PendingDeposit
            }
        );
        assert_eq!(f.sim.call_count(ClientOperation::Withdraw), 1);
    }

    #[tokio::test]
    async fn test_dry_run_makes_no_write_calls() {
        let mut f = fixture();
        f.executor.set_dry_run(true);
        let mut slot = None;

        let outcome = f.executor.rebalance(&mut slot, &f.config, 100).await;

        assert_eq!(
            outcome,
            RebalanceOutcome::DryRun {
                new_range: TickRange::new(90, 110)
            }
        );
        assert!(slot.is_none());
        assert_eq!(f.sim.call_count(ClientOperation::CreatePosition), 0);
    }

    #[tokio::test]
    async fn test_resume_without_pending_is_noop() {
        let f = fixture();
        let mut slot = None;
        f.executor.rebalance(&mut slot, &f.config, 100).await;

        let outcome = f
            .executor
            .resume_deposit(slot.as_mut().unwrap(), &f.config)
            .await;

        assert_eq!(
            outcome,
            RebalanceOutcome::Skipped {
                reason: SkipReason::NothingPending
            }
        );
    }
}
