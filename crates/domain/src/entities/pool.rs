use crate::enums::{LiquidityShape, PoolKind};
use crate::value_objects::amount::TokenAmounts;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoolId(pub String);

impl PoolId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Static configuration of one managed pool. Loaded once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(rename = "id")]
    pub pool_id: PoolId,
    pub kind: PoolKind,
    /// Share of the portfolio this pool should hold, 0-100.
    pub target_allocation_pct: Decimal,
    #[serde(default)]
    pub strategy: LiquidityShape,
    /// Half-width of the range in price steps.
    pub half_width: i32,
    /// Price steps the reference may move before a rebalance is due.
    pub rebalance_threshold: u32,
    /// Amounts deposited when the position is first created.
    pub deposit_amounts: TokenAmounts,
}

impl PoolConfig {
    pub fn concentrated(
        pool_id: impl Into<String>,
        target_allocation_pct: Decimal,
        half_width: i32,
        rebalance_threshold: u32,
        deposit_amounts: TokenAmounts,
    ) -> Self {
        Self {
            pool_id: PoolId::new(pool_id),
            kind: PoolKind::ConcentratedLiquidity,
            target_allocation_pct,
            strategy: LiquidityShape::Spot,
            half_width,
            rebalance_threshold,
            deposit_amounts,
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: PoolKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: LiquidityShape) -> Self {
        self.strategy = strategy;
        self
    }
}
