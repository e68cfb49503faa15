//! The pool client capability.

use async_trait::async_trait;
use clmm_keeper_domain::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Full withdrawal, in basis points.
pub const FULL_WITHDRAW_BPS: u16 = 10_000;

/// Identifies a client call for logging, timeouts and retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClientOperation {
    GetReferenceIndex,
    GetPositionState,
    GetAssetPrices,
    FindPosition,
    CreatePosition,
    Withdraw,
    Deposit,
    ClaimFees,
    ClaimRewards,
}

impl ClientOperation {
    /// Whether the operation moves funds on-chain.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            ClientOperation::CreatePosition
                | ClientOperation::Withdraw
                | ClientOperation::Deposit
                | ClientOperation::ClaimFees
                | ClientOperation::ClaimRewards
        )
    }
}

impl fmt::Display for ClientOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClientOperation::GetReferenceIndex => "get_reference_index",
            ClientOperation::GetPositionState => "get_position_state",
            ClientOperation::GetAssetPrices => "get_asset_prices",
            ClientOperation::FindPosition => "find_position",
            ClientOperation::CreatePosition => "create_position_and_deposit",
            ClientOperation::Withdraw => "withdraw",
            ClientOperation::Deposit => "deposit",
            ClientOperation::ClaimFees => "claim_fees",
            ClientOperation::ClaimRewards => "claim_rewards",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by a pool client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolClientError {
    /// Network hiccup; the request may or may not have been processed.
    #[error("transient network error: {0}")]
    Transient(String),

    /// Rejected by the endpoint before processing.
    #[error("rate limited")]
    RateLimited,

    /// No answer within the bound. Never treated as success.
    #[error("{operation} timed out after {timeout_ms} ms")]
    Timeout {
        operation: ClientOperation,
        timeout_ms: u64,
    },

    /// The pool program refused the operation.
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl PoolClientError {
    /// Transient failures are worth retrying at the client boundary.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PoolClientError::Transient(_)
                | PoolClientError::RateLimited
                | PoolClientError::Timeout { .. }
        )
    }
}

pub type ClientResult<T> = Result<T, PoolClientError>;

/// Capability interface to an external AMM pool program.
///
/// Implementations perform blocking network calls; they are the only
/// suspension points of the keeper.
#[async_trait]
pub trait PoolClient: Send + Sync {
    /// Current reference price-step index (active bin or tick) of a pool.
    async fn get_reference_index(&self, pool: &PoolId) -> ClientResult<i32>;

    async fn get_position_state(&self, position: &PositionId) -> ClientResult<PositionState>;

    /// Unit prices of the pool's assets and reward in the common unit.
    async fn get_asset_prices(&self, pool: &PoolId) -> ClientResult<AssetPrices>;

    /// Opens a position over `range` and deposits `amounts` in one go.
    async fn create_position_and_deposit(
        &self,
        pool: &PoolId,
        range: TickRange,
        amounts: TokenAmounts,
        shape: LiquidityShape,
    ) -> ClientResult<PositionId>;

    /// Removes `bps` of the position's liquidity and returns the withdrawn amounts.
    async fn withdraw(
        &self,
        position: &PositionId,
        bps: u16,
        close_if_empty: bool,
    ) -> ClientResult<TokenAmounts>;

    /// Deposits `amounts` into an existing position, placing it over `range`.
    async fn deposit(
        &self,
        position: &PositionId,
        range: TickRange,
        amounts: TokenAmounts,
        shape: LiquidityShape,
    ) -> ClientResult<()>;

    async fn claim_fees(&self, position: &PositionId) -> ClientResult<TokenAmounts>;

    async fn claim_rewards(&self, position: &PositionId) -> ClientResult<Decimal>;

    /// Looks up a position the wallet already holds in `pool`.
    async fn find_position(&self, _pool: &PoolId) -> ClientResult<Option<PositionId>> {
        Ok(None)
    }
}

#[async_trait]
impl<C: PoolClient + ?Sized> PoolClient for Arc<C> {
    async fn get_reference_index(&self, pool: &PoolId) -> ClientResult<i32> {
        (**self).get_reference_index(pool).await
    }

    async fn get_position_state(&self, position: &PositionId) -> ClientResult<PositionState> {
        (**self).get_position_state(position).await
    }

    async fn get_asset_prices(&self, pool: &PoolId) -> ClientResult<AssetPrices> {
        (**self).get_asset_prices(pool).await
    }

    async fn create_position_and_deposit(
        &self,
        pool: &PoolId,
        range: TickRange,
        amounts: TokenAmounts,
        shape: LiquidityShape,
    ) -> ClientResult<PositionId> {
        (**self)
            .create_position_and_deposit(pool, range, amounts, shape)
            .await
    }

    async fn withdraw(
        &self,
        position: &PositionId,
        bps: u16,
        close_if_empty: bool,
    ) -> ClientResult<TokenAmounts> {
        (**self).withdraw(position, bps, close_if_empty).await
    }

    async fn deposit(
        &self,
        position: &PositionId,
        range: TickRange,
        amounts: TokenAmounts,
        shape: LiquidityShape,
    ) -> ClientResult<()> {
        (**self).deposit(position, range, amounts, shape).await
    }

    async fn claim_fees(&self, position: &PositionId) -> ClientResult<TokenAmounts> {
        (**self).claim_fees(position).await
    }

    async fn claim_rewards(&self, position: &PositionId) -> ClientResult<Decimal> {
        (**self).claim_rewards(position).await
    }

    async fn find_position(&self, pool: &PoolId) -> ClientResult<Option<PositionId>> {
        (**self).find_position(pool).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_operations() {
        assert!(ClientOperation::Withdraw.is_write());
        assert!(ClientOperation::ClaimRewards.is_write());
        assert!(!ClientOperation::GetPositionState.is_write());
        assert!(!ClientOperation::FindPosition.is_write());
    }

    #[test]
    fn test_transient_classification() {
        assert!(PoolClientError::RateLimited.is_transient());
        assert!(
            PoolClientError::Timeout {
                operation: ClientOperation::Deposit,
                timeout_ms: 10
            }
            .is_transient()
        );
        assert!(!PoolClientError::Rejected("slippage".into()).is_transient());
        assert_eq!(
            PoolClientError::Timeout {
                operation: ClientOperation::Deposit,
                timeout_ms: 10
            }
            .to_string(),
            "deposit timed out after 10 ms"
        );
    }
}
