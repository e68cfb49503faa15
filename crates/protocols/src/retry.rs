//! Retry decorator with exponential backoff.

use crate::client::{ClientOperation, ClientResult, PoolClient, PoolClientError};
use async_trait::async_trait;
use clmm_keeper_domain::prelude::*;
use rust_decimal::Decimal;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retrying transient failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound for the doubling backoff.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Reads retry on any transient error. Writes only retry when the request
    /// was refused before processing, so a retry cannot apply it twice.
    pub fn should_retry(&self, operation: ClientOperation, error: &PoolClientError) -> bool {
        if operation.is_write() {
            matches!(error, PoolClientError::RateLimited)
        } else {
            error.is_transient()
        }
    }
}

/// Wraps a client and retries transient failures with backoff.
pub struct RetryingPoolClient<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C: PoolClient> RetryingPoolClient<C> {
    /// Creates a new retry decorator.
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    async fn with_retry<T, F, Fut>(&self, operation: ClientOperation, mut call: F) -> ClientResult<T>
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = ClientResult<T>> + Send,
        T: Send,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.policy.max_retries
                    && self.policy.should_retry(operation, &e) =>
                {
                    attempt += 1;
                    let backoff = self.policy.backoff(attempt);
                    debug!(
                        operation = %operation,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Retrying pool client call"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    if attempt > 0 {
                        warn!(operation = %operation, attempts = attempt + 1, error = %e, "Pool client call failed after retries");
                    }
                    return Err(e);
                }
            }
        }
    }
}

#[async_trait]
impl<C: PoolClient> PoolClient for RetryingPoolClient<C> {
    async fn get_reference_index(&self, pool: &PoolId) -> ClientResult<i32> {
        self.with_retry(ClientOperation::GetReferenceIndex, || {
            self.inner.get_reference_index(pool)
        })
        .await
    }

    async fn get_position_state(&self, position: &PositionId) -> ClientResult<PositionState> {
        self.with_retry(ClientOperation::GetPositionState, || {
            self.inner.get_position_state(position)
        })
        .await
    }

    async fn get_asset_prices(&self, pool: &PoolId) -> ClientResult<AssetPrices> {
        self.with_retry(ClientOperation::GetAssetPrices, || {
            self.inner.get_asset_prices(pool)
        })
        .await
    }

    async fn create_position_and_deposit(
        &self,
        pool: &PoolId,
        range: TickRange,
        amounts: TokenAmounts,
        shape: LiquidityShape,
    ) -> ClientResult<PositionId> {
        self.with_retry(ClientOperation::CreatePosition, || {
            self.inner
                .create_position_and_deposit(pool, range, amounts, shape)
        })
        .await
    }

    async fn withdraw(
        &self,
        position: &PositionId,
        bps: u16,
        close_if_empty: bool,
    ) -> ClientResult<TokenAmounts> {
        self.with_retry(ClientOperation::Withdraw, || {
            self.inner.withdraw(position, bps, close_if_empty)
        })
        .await
    }

    async fn deposit(
        &self,
        position: &PositionId,
        range: TickRange,
        amounts: TokenAmounts,
        shape: LiquidityShape,
    ) -> ClientResult<()> {
        self.with_retry(ClientOperation::Deposit, || {
            self.inner.deposit(position, range, amounts, shape)
        })
        .await
    }

    async fn claim_fees(&self, position: &PositionId) -> ClientResult<TokenAmounts> {
        self.with_retry(ClientOperation::ClaimFees, || {
            self.inner.claim_fees(position)
        })
        .await
    }

    async fn claim_rewards(&self, position: &PositionId) -> ClientResult<Decimal> {
        self.with_retry(ClientOperation::ClaimRewards, || {
            self.inner.claim_rewards(position)
        })
        .await
    }

    async fn find_position(&self, pool: &PoolId) -> ClientResult<Option<PositionId>> {
        self.with_retry(ClientOperation::FindPosition, || {
            self.inner.find_position(pool)
        })
        .await
    }
}
