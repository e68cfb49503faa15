//! In-memory pool client.
//!
//! Keeps pools and positions in process memory. Used for paper trading
//! (random-walk reference index with fee accrual) and as a scriptable test
//! double with failure injection, artificial latency and call counters.

use crate::client::{ClientOperation, ClientResult, PoolClient, PoolClientError};
use async_trait::async_trait;
use clmm_keeper_domain::prelude::*;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
struct SimPool {
    reference_index: i32,
    prices: AssetPrices,
}

#[derive(Debug, Clone)]
struct SimPosition {
    pool: PoolId,
    state: PositionState,
}

#[derive(Debug, Default)]
struct SimState {
    pools: HashMap<PoolId, SimPool>,
    positions: HashMap<PositionId, SimPosition>,
    next_position: u64,
    failures: HashMap<ClientOperation, VecDeque<PoolClientError>>,
    latency: HashMap<ClientOperation, Duration>,
    calls: HashMap<ClientOperation, u32>,
}

/// Parameters of one paper-trading market step.
#[derive(Debug, Clone)]
pub struct MarketStep {
    /// Standard deviation of the reference index move, in price steps.
    pub volatility_steps: f64,
    /// Fee accrued per step by in-range liquidity, as a fraction of deposits.
    pub fee_rate: Decimal,
    /// Reward units accrued per step by every in-range position.
    pub reward_per_step: Decimal,
}

impl Default for MarketStep {
    fn default() -> Self {
        Self {
            volatility_steps: 2.0,
            fee_rate: Decimal::new(5, 4), // 0.05%
            reward_per_step: Decimal::new(1, 2),
        }
    }
}

/// A pool client backed by process memory.
#[derive(Debug, Default)]
pub struct SimulatedPoolClient {
    state: Mutex<SimState>,
}

impl SimulatedPoolClient {
    /// Creates an empty simulated client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut SimState) -> T) -> T {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut state)
    }

    /// Registers a pool at the given reference index.
    pub fn add_pool(&self, pool: impl Into<String>, reference_index: i32, prices: AssetPrices) {
        self.with_state(|s| {
            s.pools.insert(
                PoolId::new(pool),
                SimPool {
                    reference_index,
                    prices,
                },
            );
        });
    }

    pub fn set_reference_index(&self, pool: &PoolId, index: i32) {
        self.with_state(|s| {
            if let Some(p) = s.pools.get_mut(pool) {
                p.reference_index = index;
            }
        });
    }

    pub fn set_prices(&self, pool: &PoolId, prices: AssetPrices) {
        self.with_state(|s| {
            if let Some(p) = s.pools.get_mut(pool) {
                p.prices = prices;
            }
        });
    }

    /// Inserts a position directly, as if it had been opened outside the keeper.
    pub fn insert_position(
        &self,
        pool: &PoolId,
        range: TickRange,
        deposited: TokenAmounts,
    ) -> PositionId {
        self.with_state(|s| {
            let id = Self::next_id(s);
            s.positions.insert(
                id.clone(),
                SimPosition {
                    pool: pool.clone(),
                    state: PositionState {
                        range,
                        deposited,
                        accrued_fees: TokenAmounts::ZERO,
                        accrued_rewards: Decimal::ZERO,
                    },
                },
            );
            id
        })
    }

    /// Re-creates a position the keeper persisted in an earlier run.
    ///
    /// A position with a pending deposit is restored with the withdrawn amounts
    /// off the range, as they were when it was saved.
    pub fn restore_position(&self, position: &ManagedPosition) {
        self.with_state(|s| {
            if let Some(n) = position
                .position_id
                .0
                .strip_prefix("sim-position-")
                .and_then(|n| n.parse::<u64>().ok())
            {
                s.next_position = s.next_position.max(n);
            }
            s.positions.insert(
                position.position_id.clone(),
                SimPosition {
                    pool: position.pool_id.clone(),
                    state: PositionState {
                        range: position.range,
                        deposited: position.deposited,
                        accrued_fees: position.accrued_fees,
                        accrued_rewards: position.accrued_rewards,
                    },
                },
            );
        });
    }

    /// Adds unclaimed fees and rewards to a position.
    pub fn accrue(&self, position: &PositionId, fees: TokenAmounts, rewards: Decimal) {
        self.with_state(|s| {
            if let Some(p) = s.positions.get_mut(position) {
                p.state.accrued_fees = p.state.accrued_fees + fees;
                p.state.accrued_rewards += rewards;
            }
        });
    }

    /// Queues an error returned by the next call of `operation`.
    pub fn fail_next(&self, operation: ClientOperation, error: PoolClientError) {
        self.with_state(|s| s.failures.entry(operation).or_default().push_back(error));
    }

    /// Delays every call of `operation` by `latency`.
    pub fn set_latency(&self, operation: ClientOperation, latency: Duration) {
        self.with_state(|s| {
            s.latency.insert(operation, latency);
        });
    }

    /// Number of times `operation` was invoked, failed attempts included.
    pub fn call_count(&self, operation: ClientOperation) -> u32 {
        self.with_state(|s| s.calls.get(&operation).copied().unwrap_or(0))
    }

    pub fn position(&self, position: &PositionId) -> Option<PositionState> {
        self.with_state(|s| s.positions.get(position).map(|p| p.state.clone()))
    }

    pub fn positions_in(&self, pool: &PoolId) -> Vec<PositionId> {
        self.with_state(|s| {
            s.positions
                .iter()
                .filter(|(_, p)| &p.pool == pool)
                .map(|(id, _)| id.clone())
                .collect()
        })
    }

    /// Moves every pool's reference index by a normally distributed number of
    /// steps and accrues fees and rewards on positions that are in range.
    pub fn step_market<R: Rng + ?Sized>(&self, rng: &mut R, step: &MarketStep) {
        let normal = Normal::new(0.0, step.volatility_steps.max(0.0)).ok();
        self.with_state(|s| {
            for (id, pool) in s.pools.iter_mut() {
                let shift = normal
                    .as_ref()
                    .map(|n| n.sample(&mut *rng).round() as i32)
                    .unwrap_or(0);
                pool.reference_index = pool.reference_index.saturating_add(shift);
                debug!(pool = %id, reference_index = pool.reference_index, "Market step");
            }

            let pools = &s.pools;
            for position in s.positions.values_mut() {
                let Some(pool) = pools.get(&position.pool) else {
                    continue;
                };
                if !position.state.range.contains(pool.reference_index) {
                    continue;
                }
                let deposited = position.state.deposited;
                position.state.accrued_fees = position.state.accrued_fees
                    + TokenAmounts::new(
                        deposited.token_a * step.fee_rate,
                        deposited.token_b * step.fee_rate,
                    );
                if deposited.any_positive() {
                    position.state.accrued_rewards += step.reward_per_step;
                }
            }
        });
    }

    fn next_id(state: &mut SimState) -> PositionId {
        state.next_position += 1;
        PositionId::new(format!("sim-position-{}", state.next_position))
    }

    /// Records the call and pops any injected failure. Returns the latency to apply.
    fn begin(&self, operation: ClientOperation) -> (Duration, Option<PoolClientError>) {
        self.with_state(|s| {
            *s.calls.entry(operation).or_insert(0) += 1;
            let latency = s.latency.get(&operation).copied().unwrap_or_default();
            let failure = s.failures.get_mut(&operation).and_then(VecDeque::pop_front);
            (latency, failure)
        })
    }

    async fn enter(&self, operation: ClientOperation) -> ClientResult<()> {
        let (latency, failure) = self.begin(operation);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn not_found(what: impl std::fmt::Display) -> PoolClientError {
    PoolClientError::NotFound(what.to_string())
}

#[async_trait]
impl PoolClient for SimulatedPoolClient {
    async fn get_reference_index(&self, pool: &PoolId) -> ClientResult<i32> {
        self.enter(ClientOperation::GetReferenceIndex).await?;
        self.with_state(|s| {
            s.pools
                .get(pool)
                .map(|p| p.reference_index)
                .ok_or_else(|| not_found(pool))
        })
    }

    async fn get_position_state(&self, position: &PositionId) -> ClientResult<PositionState> {
        self.enter(ClientOperation::GetPositionState).await?;
        self.position(position).ok_or_else(|| not_found(position))
    }

    async fn get_asset_prices(&self, pool: &PoolId) -> ClientResult<AssetPrices> {
        self.enter(ClientOperation::GetAssetPrices).await?;
        self.with_state(|s| s.pools.get(pool).map(|p| p.prices).ok_or_else(|| not_found(pool)))
    }

    async fn create_position_and_deposit(
        &self,
        pool: &PoolId,
        range: TickRange,
        amounts: TokenAmounts,
        _shape: LiquidityShape,
    ) -> ClientResult<PositionId> {
        self.enter(ClientOperation::CreatePosition).await?;
        if range.lower >= range.upper {
            return Err(PoolClientError::Rejected(format!("empty range {range}")));
        }
        self.with_state(|s| {
            if !s.pools.contains_key(pool) {
                return Err(not_found(pool));
            }
            let id = Self::next_id(s);
            s.positions.insert(
                id.clone(),
                SimPosition {
                    pool: pool.clone(),
                    state: PositionState {
                        range,
                        deposited: amounts,
                        accrued_fees: TokenAmounts::ZERO,
                        accrued_rewards: Decimal::ZERO,
                    },
                },
            );
            Ok(id)
        })
    }

    async fn withdraw(
        &self,
        position: &PositionId,
        bps: u16,
        close_if_empty: bool,
    ) -> ClientResult<TokenAmounts> {
        self.enter(ClientOperation::Withdraw).await?;
        if bps > 10_000 {
            return Err(PoolClientError::Rejected(format!("invalid bps {bps}")));
        }
        self.with_state(|s| {
            let entry = s.positions.get_mut(position).ok_or_else(|| not_found(position))?;
            let share = Decimal::from(bps) / Decimal::from(10_000);
            let deposited = entry.state.deposited;
            let withdrawn = TokenAmounts::new(deposited.token_a * share, deposited.token_b * share);
            entry.state.deposited = TokenAmounts::new(
                deposited.token_a - withdrawn.token_a,
                deposited.token_b - withdrawn.token_b,
            );
            if close_if_empty && entry.state.deposited.is_zero() {
                s.positions.remove(position);
            }
            Ok(withdrawn)
        })
    }

    async fn deposit(
        &self,
        position: &PositionId,
        range: TickRange,
        amounts: TokenAmounts,
        _shape: LiquidityShape,
    ) -> ClientResult<()> {
        self.enter(ClientOperation::Deposit).await?;
        self.with_state(|s| {
            let entry = s.positions.get_mut(position).ok_or_else(|| not_found(position))?;
            if entry.state.range != range && !entry.state.deposited.is_zero() {
                return Err(PoolClientError::Rejected(
                    "cannot move a range that still holds liquidity".to_string(),
                ));
            }
            entry.state.range = range;
            entry.state.deposited = entry.state.deposited + amounts;
            Ok(())
        })
    }

    async fn claim_fees(&self, position: &PositionId) -> ClientResult<TokenAmounts> {
        self.enter(ClientOperation::ClaimFees).await?;
        self.with_state(|s| {
            let entry = s.positions.get_mut(position).ok_or_else(|| not_found(position))?;
            Ok(std::mem::take(&mut entry.state.accrued_fees))
        })
    }

    async fn claim_rewards(&self, position: &PositionId) -> ClientResult<Decimal> {
        self.enter(ClientOperation::ClaimRewards).await?;
        self.with_state(|s| {
            let entry = s.positions.get_mut(position).ok_or_else(|| not_found(position))?;
            Ok(std::mem::take(&mut entry.state.accrued_rewards))
        })
    }

    async fn find_position(&self, pool: &PoolId) -> ClientResult<Option<PositionId>> {
        self.enter(ClientOperation::FindPosition).await?;
        let mut found = self.positions_in(pool);
        found.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(found.into_iter().next())
    }
}
