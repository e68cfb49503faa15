//! Timeout decorator for pool clients.

use crate::client::{ClientOperation, ClientResult, PoolClient, PoolClientError};
use async_trait::async_trait;
use clmm_keeper_domain::prelude::*;
use rust_decimal::Decimal;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Wraps a client so that every call is bounded by `timeout`.
///
/// An elapsed call yields [`PoolClientError::Timeout`]; the outcome of the
/// underlying request is unknown and must be treated as a failure.
pub struct TimeoutPoolClient<C> {
    inner: C,
    timeout: Duration,
}

impl<C: PoolClient> TimeoutPoolClient<C> {
    /// Creates a new timeout decorator.
    pub fn new(inner: C, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// Gets the configured timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn bounded<T, F>(&self, operation: ClientOperation, call: F) -> ClientResult<T>
    where
        F: Future<Output = ClientResult<T>> + Send,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(operation = %operation, timeout_ms, "Pool client call timed out");
                Err(PoolClientError::Timeout {
                    operation,
                    timeout_ms,
                })
            }
        }
    }
}

#[async_trait]
impl<C: PoolClient> PoolClient for TimeoutPoolClient<C> {
    async fn get_reference_index(&self, pool: &PoolId) -> ClientResult<i32> {
        self.bounded(
            ClientOperation::GetReferenceIndex,
            self.inner.get_reference_index(pool),
        )
        .await
    }

    async fn get_position_state(&self, position: &PositionId) -> ClientResult<PositionState> {
        self.bounded(
            ClientOperation::GetPositionState,
            self.inner.get_position_state(position),
        )
        .await
    }

    async fn get_asset_prices(&self, pool: &PoolId) -> ClientResult<AssetPrices> {
        self.bounded(
            ClientOperation::GetAssetPrices,
            self.inner.get_asset_prices(pool),
        )
        .await
    }

    async fn create_position_and_deposit(
        &self,
        pool: &PoolId,
        range: TickRange,
        amounts: TokenAmounts,
        shape: LiquidityShape,
    ) -> ClientResult<PositionId> {
        self.bounded(
            ClientOperation::CreatePosition,
            self.inner
                .create_position_and_deposit(pool, range, amounts, shape),
        )
        .await
    }

    async fn withdraw(
        &self,
        position: &PositionId,
        bps: u16,
        close_if_empty: bool,
    ) -> ClientResult<TokenAmounts> {
        self.bounded(
            ClientOperation::Withdraw,
            self.inner.withdraw(position, bps, close_if_empty),
        )
        .await
    }

    async fn deposit(
        &self,
        position: &PositionId,
        range: TickRange,
        amounts: TokenAmounts,
        shape: LiquidityShape,
    ) -> ClientResult<()> {
        self.bounded(
            ClientOperation::Deposit,
            self.inner.deposit(position, range, amounts, shape),
        )
        .await
    }

    async fn claim_fees(&self, position: &PositionId) -> ClientResult<TokenAmounts> {
        self.bounded(ClientOperation::ClaimFees, self.inner.claim_fees(position))
            .await
    }

    async fn claim_rewards(&self, position: &PositionId) -> ClientResult<Decimal> {
        self.bounded(
            ClientOperation::ClaimRewards,
            self.inner.claim_rewards(position),
        )
        .await
    }

    async fn find_position(&self, pool: &PoolId) -> ClientResult<Option<PositionId>> {
        self.bounded(ClientOperation::FindPosition, self.inner.find_position(pool))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::SimulatedPoolClient;

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_times_out() {
        let sim = SimulatedPoolClient::new();
        sim.add_pool("pool", 100, AssetPrices::unit());
        sim.set_latency(ClientOperation::GetReferenceIndex, Duration::from_secs(5));

        let client = TimeoutPoolClient::new(sim, Duration::from_secs(1));
        let err = client
            .get_reference_index(&PoolId::new("pool"))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            PoolClientError::Timeout {
                operation: ClientOperation::GetReferenceIndex,
                timeout_ms: 1000
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_call_passes_through() {
        let sim = SimulatedPoolClient::new();
        sim.add_pool("pool", 42, AssetPrices::unit());

        let client = TimeoutPoolClient::new(sim, Duration::from_secs(1));
        assert_eq!(
            client
                .get_reference_index(&PoolId::new("pool"))
                .await
                .unwrap(),
            42
        );
    }
}
