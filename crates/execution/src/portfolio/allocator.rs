//! Cross-pool valuation and allocation drift.

use chrono::{DateTime, Utc};
use clmm_keeper_domain::prelude::*;
use clmm_keeper_protocols::prelude::*;
use futures::future::join_all;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Values every managed pool and compares the shares with their targets.
///
/// Only read calls are issued. When a read fails the last known amounts and
/// prices are used and the pool's entry is flagged stale.
pub struct PortfolioAllocator {
    client: Arc<dyn PoolClient>,
    tolerance_pct: Decimal,
    prices: RwLock<HashMap<PoolId, AssetPrices>>,
}

impl PortfolioAllocator {
    /// Creates a new allocator.
    pub fn new(client: Arc<dyn PoolClient>, tolerance_pct: Decimal) -> Self {
        Self {
            client,
            tolerance_pct,
            prices: RwLock::new(HashMap::new()),
        }
    }

    pub fn tolerance_pct(&self) -> Decimal {
        self.tolerance_pct
    }

    /// Takes a snapshot of all configured pools.
    ///
    /// `positions` are the loop's copies of the managed positions; pools with
    /// no position yet are valued at zero.
    pub async fn snapshot(
        &self,
        positions: &[ManagedPosition],
        configs: &[PoolConfig],
        now: DateTime<Utc>,
    ) -> PortfolioSnapshot {
        let valuations = join_all(configs.iter().map(|config| {
            let position = positions.iter().find(|p| p.pool_id == config.pool_id);
            self.value_pool(config, position)
        }))
        .await;

        let snapshot = PortfolioSnapshot::compute(valuations, self.tolerance_pct, now);

        for entry in snapshot.drifted() {
            warn!(
                pool = %entry.pool_id,
                observed_pct = %entry.observed_pct.round_dp(2),
                target_pct = %entry.target_pct,
                drift_pct = %entry.drift_pct.round_dp(2),
                "Allocation drift beyond tolerance"
            );
        }
        info!(
            total_value = %snapshot.total_value.round_dp(4),
            unclaimed_fees = %snapshot.total_unclaimed_fees.round_dp(4),
            unclaimed_rewards = %snapshot.total_unclaimed_rewards.round_dp(4),
            needs_attention = snapshot.needs_attention,
            "Portfolio snapshot"
        );

        snapshot
    }

    async fn value_pool(
        &self,
        config: &PoolConfig,
        position: Option<&ManagedPosition>,
    ) -> PoolValuation {
        let Some(position) = position else {
            return PoolValuation {
                pool_id: config.pool_id.clone(),
                value: Decimal::ZERO,
                target_pct: config.target_allocation_pct,
                unclaimed_fees: Decimal::ZERO,
                unclaimed_rewards: Decimal::ZERO,
                stale: false,
            };
        };

        let (state, prices) = tokio::join!(
            self.client.get_position_state(&position.position_id),
            self.client.get_asset_prices(&config.pool_id),
        );

        let mut stale = false;
        let (deposited, fees, rewards) = match state {
            Ok(state) => (state.deposited, state.accrued_fees, state.accrued_rewards),
            Err(e) => {
                warn!(
                    pool = %config.pool_id,
                    position = %position.position_id,
                    error = %e,
                    "Position read failed, using cached amounts"
                );
                stale = true;
                (
                    position.deposited,
                    position.accrued_fees,
                    position.accrued_rewards,
                )
            }
        };

        let prices = match prices {
            Ok(prices) => {
                self.prices
                    .write()
                    .await
                    .insert(config.pool_id.clone(), prices);
                Some(prices)
            }
            Err(e) => {
                warn!(pool = %config.pool_id, error = %e, "Price read failed, using cached prices");
                stale = true;
                self.prices.read().await.get(&config.pool_id).copied()
            }
        };

        let Some(prices) = prices else {
            // No price was ever observed: the pool cannot be valued yet.
            return PoolValuation {
                pool_id: config.pool_id.clone(),
                value: Decimal::ZERO,
                target_pct: config.target_allocation_pct,
                unclaimed_fees: Decimal::ZERO,
                unclaimed_rewards: Decimal::ZERO,
                stale: true,
            };
        };

        // Withdrawn liquidity awaiting re-deposit still belongs to the pool.
        let parked = position
            .pending_deposit
            .as_ref()
            .map(|p| p.amounts)
            .unwrap_or_default();

        let unclaimed_fees = fees.value(&prices);
        let unclaimed_rewards = rewards * prices.reward;
        let value = (deposited + parked).value(&prices) + unclaimed_fees + unclaimed_rewards;

        debug!(pool = %config.pool_id, value = %value, stale, "Pool valued");

        PoolValuation {
            pool_id: config.pool_id.clone(),
            value,
            target_pct: config.target_allocation_pct,
            unclaimed_fees,
            unclaimed_rewards,
            stale,
        }
    }
}
