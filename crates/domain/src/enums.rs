use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolKind {
    ConcentratedLiquidity,
    ConstantProduct,
}

impl PoolKind {
    /// Whether positions in this pool have a bounded price-step range that can drift.
    pub fn has_range(&self) -> bool {
        matches!(self, PoolKind::ConcentratedLiquidity)
    }
}

/// Distribution of liquidity across the bins of a range, forwarded to the pool client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiquidityShape {
    #[default]
    Spot,
    Curve,
    BidAsk,
}

impl fmt::Display for LiquidityShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiquidityShape::Spot => write!(f, "spot"),
            LiquidityShape::Curve => write!(f, "curve"),
            LiquidityShape::BidAsk => write!(f, "bid_ask"),
        }
    }
}
