//! Fixed-interval control loop over all managed pools.

use super::{PoolTickReport, PositionBook, TickReport};
use crate::config::{KeeperConfig, LoopSettings};
use crate::lifecycle::LifecycleTracker;
use crate::portfolio::{PortfolioAllocator, PortfolioTrend, SnapshotHistory};
use crate::scheduler::{Clock, StopHandle};
use crate::store::{PositionStore, StoreError};
use crate::strategy::{
    PositionTracker, RebalanceExecutor, RebalanceOutcome, RewardHarvester, SkipReason,
};
use clmm_keeper_domain::prelude::*;
use clmm_keeper_protocols::prelude::*;
use futures::future::join_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{RwLock, mpsc};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

/// Drives every configured pool through drift check, rebalance and harvest,
/// then values the portfolio.
///
/// Pools run concurrently within a tick; a failure in one pool is recorded in
/// its report and never affects the others.
pub struct ControlLoop {
    settings: LoopSettings,
    pools: Vec<PoolConfig>,
    client: Arc<dyn PoolClient>,
    clock: Arc<dyn Clock>,
    book: PositionBook,
    rebalancer: RebalanceExecutor,
    harvester: RewardHarvester,
    allocator: PortfolioAllocator,
    lifecycle: Arc<LifecycleTracker>,
    history: RwLock<SnapshotHistory>,
    store: Option<PositionStore>,
    report_tx: Option<mpsc::Sender<TickReport>>,
    ticks: AtomicU64,
}

impl ControlLoop {
    /// Creates a new control loop. Refuses invalid settings or pool configs.
    pub fn new(
        settings: LoopSettings,
        pools: Vec<PoolConfig>,
        client: Arc<dyn PoolClient>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        validate_pool_configs(&pools)?;

        let lifecycle = Arc::new(LifecycleTracker::new());

        let mut rebalancer = RebalanceExecutor::new(client.clone(), lifecycle.clone(), clock.clone());
        rebalancer.set_dry_run(settings.dry_run);

        let mut harvester =
            RewardHarvester::new(client.clone(), lifecycle.clone(), settings.harvest_interval());
        harvester.set_dry_run(settings.dry_run);

        let allocator = PortfolioAllocator::new(client.clone(), settings.allocation_tolerance_pct);
        let history = match settings.history_len {
            Some(len) => SnapshotHistory::bounded(len),
            None => SnapshotHistory::new(),
        };
        let book = PositionBook::new(pools.iter().map(|p| &p.pool_id));

        Ok(Self {
            settings,
            pools,
            client,
            clock,
            book,
            rebalancer,
            harvester,
            allocator,
            lifecycle,
            history: RwLock::new(history),
            store: None,
            report_tx: None,
            ticks: AtomicU64::new(0),
        })
    }

    /// Creates a loop from a parsed config file, with its position store if one is set.
    pub fn from_config(
        config: &KeeperConfig,
        client: Arc<dyn PoolClient>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        let control = Self::new(config.keeper.clone(), config.pools.clone(), client, clock)?;
        Ok(match &config.state_file {
            Some(path) => control.with_store(PositionStore::new(path)),
            None => control,
        })
    }

    /// Persists the position table after every tick.
    #[must_use]
    pub fn with_store(mut self, store: PositionStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Sends every tick report produced by [`Self::run`] to `tx`.
    #[must_use]
    pub fn with_report_sink(mut self, tx: mpsc::Sender<TickReport>) -> Self {
        self.report_tx = Some(tx);
        self
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    pub fn pools(&self) -> &[PoolConfig] {
        &self.pools
    }

    /// Gets the lifecycle tracker.
    pub fn lifecycle(&self) -> &Arc<LifecycleTracker> {
        &self.lifecycle
    }

    /// Copies of the managed positions.
    pub async fn positions(&self) -> Vec<ManagedPosition> {
        self.book.positions().await
    }

    pub async fn latest_snapshot(&self) -> Option<PortfolioSnapshot> {
        self.history.read().await.latest().cloned()
    }

    pub async fn snapshot_count(&self) -> usize {
        self.history.read().await.len()
    }

    pub async fn trend(&self) -> Option<PortfolioTrend> {
        self.history.read().await.trend()
    }

    /// Loads stored positions into their slots. Returns how many were restored.
    pub async fn restore(&self) -> Result<usize, StoreError> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let positions = store.load().await?;
        let restored = self.book.restore(positions).await;
        for position in self.book.positions().await {
            self.lifecycle.register_restored(&position).await;
        }
        info!(restored, "Restored managed positions");
        Ok(restored)
    }

    /// Re-issues the deposit step of an interrupted rebalance on one pool.
    ///
    /// This is the manual counterpart of `auto_resume_partial`. Returns `None`
    /// when the pool is not configured. The position table is persisted after a
    /// deposit lands.
    pub async fn resume_pool(&self, pool: &PoolId) -> Option<RebalanceOutcome> {
        let config = self.pools.iter().find(|p| &p.pool_id == pool)?;
        let slot = self.book.slot(pool)?;
        let mut slot = slot.lock().await;

        let Some(position) = slot.as_mut() else {
            return Some(RebalanceOutcome::Skipped {
                reason: SkipReason::NothingPending,
            });
        };
        let outcome = self.rebalancer.resume_deposit(position, config).await;
        drop(slot);

        if matches!(outcome, RebalanceOutcome::Resumed { .. }) {
            let positions = self.book.positions().await;
            self.persist(&positions).await;
        }
        Some(outcome)
    }

    /// Runs ticks at the configured interval until `stop` is signalled.
    ///
    /// The stop signal is honoured while waiting for the next tick; a tick
    /// that has started always completes.
    pub async fn run(&self, stop: StopHandle) {
        let mut ticker = interval(self.settings.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            pools = self.pools.len(),
            interval_secs = self.settings.interval_secs,
            harvest_interval_secs = self.settings.harvest_interval_secs,
            dry_run = self.settings.dry_run,
            "Starting control loop"
        );

        loop {
            tokio::select! {
                biased;
                _ = stop.stopped() => break,
                _ = ticker.tick() => {}
            }

            let report = self.run_once().await;
            if let Some(tx) = &self.report_tx
                && tx.send(report).await.is_err()
            {
                debug!("Report receiver dropped");
            }
        }

        info!(ticks = self.ticks.load(Ordering::SeqCst), "Control loop stopped");
    }

    /// Runs a single tick over every pool.
    pub async fn run_once(&self) -> TickReport {
        let tick = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
        let started_at = self.clock.now();
        debug!(tick, pools = self.pools.len(), "Tick started");

        let pools = join_all(self.pools.iter().map(|config| self.process_pool(config))).await;

        let positions = self.book.positions().await;
        let snapshot = self
            .allocator
            .snapshot(&positions, &self.pools, self.clock.now())
            .await;
        self.history.write().await.push(snapshot.clone());

        let persist_error = self.persist(&positions).await;

        let report = TickReport {
            tick,
            started_at,
            finished_at: self.clock.now(),
            pools,
            snapshot,
            persist_error,
        };
        if report.failed_pools() > 0 {
            warn!(tick, failed = report.failed_pools(), "Tick finished with pool failures");
        } else {
            debug!(tick, "Tick finished");
        }
        report
    }

    async fn process_pool(&self, config: &PoolConfig) -> PoolTickReport {
        let mut report = PoolTickReport::new(config.pool_id.clone());
        let Some(slot) = self.book.slot(&config.pool_id) else {
            report.fail("pool has no position slot");
            return report;
        };
        let mut slot = slot.lock().await;

        let reference = match self.client.get_reference_index(&config.pool_id).await {
            Ok(index) => index,
            Err(e) => {
                warn!(pool = %config.pool_id, error = %e, "Failed to read reference index");
                report.fail(format!("reference index: {e}"));
                return report;
            }
        };
        report.reference_index = Some(reference);

        if slot.is_none()
            && let Err(e) = self.adopt_existing(&mut slot, config).await
        {
            warn!(pool = %config.pool_id, error = %e, "Failed to look up existing position");
            report.fail(format!("position lookup: {e}"));
            return report;
        }

        let mut rebalance_due = slot.is_none();
        if let Some(position) = slot.as_mut() {
            match self.client.get_position_state(&position.position_id).await {
                Ok(state) => position.refresh(&state),
                Err(e) => {
                    warn!(
                        pool = %config.pool_id,
                        position = %position.position_id,
                        error = %e,
                        "Failed to refresh position"
                    );
                    report.position_id = Some(position.position_id.clone());
                    report.range = Some(position.range);
                    report.fail(format!("position state: {e}"));
                    return report;
                }
            }

            if position.has_pending_deposit() {
                if self.settings.auto_resume_partial {
                    let outcome = self.rebalancer.resume_deposit(position, config).await;
                    if !outcome.is_success() {
                        report.fail(outcome.to_string());
                    }
                    report.rebalance = Some(outcome);
                } else {
                    warn!(
                        pool = %config.pool_id,
                        position = %position.position_id,
                        "Deposit pending and auto resume disabled, waiting for resume_pool"
                    );
                    report.fail("deposit pending, auto resume disabled");
                }
            } else {
                let drift = PositionTracker::for_pool(config).check_drift(position, reference);
                debug!(
                    pool = %config.pool_id,
                    reference,
                    bins_moved = drift.bins_moved,
                    needs_rebalance = drift.needs_rebalance,
                    "Drift check"
                );
                rebalance_due = drift.needs_rebalance;
                report.drift = Some(drift);
            }
        }

        if rebalance_due {
            let outcome = self.rebalancer.rebalance(&mut slot, config, reference).await;
            if !outcome.is_success() {
                report.fail(outcome.to_string());
            }
            report.rebalance = Some(outcome);
        }

        if let Some(position) = slot.as_mut() {
            report.harvest = Some(
                self.harvester
                    .maybe_harvest(position, self.clock.now())
                    .await,
            );
            report.position_id = Some(position.position_id.clone());
            report.range = Some(position.range);
        }

        report
    }

    /// Saves the position table when a store is configured. Returns the error text on failure.
    async fn persist(&self, positions: &[ManagedPosition]) -> Option<String> {
        let store = self.store.as_ref()?;
        match store.save(positions, self.clock.now()).await {
            Ok(()) => None,
            Err(e) => {
                error!(path = %store.path().display(), error = %e, "Failed to persist positions");
                Some(e.to_string())
            }
        }
    }

    /// Takes over a position the wallet already holds in the pool, if any.
    async fn adopt_existing(
        &self,
        slot: &mut Option<ManagedPosition>,
        config: &PoolConfig,
    ) -> ClientResult<()> {
        let Some(position_id) = self.client.find_position(&config.pool_id).await? else {
            return Ok(());
        };
        let state = self.client.get_position_state(&position_id).await?;
        let position =
            ManagedPosition::adopted(config.pool_id.clone(), position_id, &state, self.clock.now());
        self.lifecycle
            .record_position_opened(&position, true, position.opened_at)
            .await;
        *slot = Some(position);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ManualClock;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn settings() -> LoopSettings {
        LoopSettings {
            interval_secs: 10,
            ..LoopSettings::default()
        }
    }

    fn pool(id: &str, target: rust_decimal::Decimal) -> PoolConfig {
        PoolConfig::concentrated(id, target, 10, 5, TokenAmounts::new(dec!(1), dec!(100)))
    }

    #[test]
    fn test_new_rejects_invalid_pools() {
        let sim = Arc::new(SimulatedPoolClient::new());
        let result = ControlLoop::new(
            settings(),
            vec![pool("a", dec!(70)), pool("b", dec!(40))],
            sim,
            Arc::new(ManualClock::new(Utc::now())),
        );
        assert!(matches!(result, Err(ConfigError::AllocationOverflow(_))));
    }

    #[tokio::test]
    async fn test_adopts_existing_position_instead_of_creating() {
        let sim = Arc::new(SimulatedPoolClient::new());
        sim.add_pool("a", 100, AssetPrices::unit());
        let existing = sim.insert_position(
            &PoolId::new("a"),
            TickRange::new(90, 110),
            TokenAmounts::new(dec!(1), dec!(100)),
        );
        let control = ControlLoop::new(
            settings(),
            vec![pool("a", dec!(100))],
            sim.clone(),
            Arc::new(ManualClock::new(Utc::now())),
        )
        .unwrap();

        let report = control.run_once().await;

        assert_eq!(report.pools[0].position_id.as_ref(), Some(&existing));
        assert!(report.pools[0].rebalance.is_none());
        assert_eq!(sim.call_count(ClientOperation::CreatePosition), 0);
        let summary = control.lifecycle().get_summary(&existing).await.unwrap();
        assert_eq!(summary.rebalance_count, 0);
    }

    #[tokio::test]
    async fn test_reference_failure_is_reported_per_pool() {
        let sim = Arc::new(SimulatedPoolClient::new());
        sim.add_pool("a", 100, AssetPrices::unit());
        let control = ControlLoop::new(
            settings(),
            vec![pool("a", dec!(50)), pool("missing", dec!(50))],
            sim,
            Arc::new(ManualClock::new(Utc::now())),
        )
        .unwrap();

        let report = control.run_once().await;

        assert!(report.pool(&PoolId::new("a")).unwrap().is_ok());
        let missing = report.pool(&PoolId::new("missing")).unwrap();
        assert!(missing.error.as_deref().unwrap().starts_with("reference index"));
        assert_eq!(control.snapshot_count().await, 1);
    }
}
