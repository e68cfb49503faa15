//! Startup validation of pool configuration.

use crate::entities::pool::{PoolConfig, PoolId};
use rust_decimal::Decimal;
use std::collections::HashSet;
use thiserror::Error;

/// Fatal configuration problems. The keeper refuses to start on any of these.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("no pools configured")]
    NoPools,

    #[error("pool {0} is configured more than once")]
    DuplicatePool(PoolId),

    #[error("pool {pool}: half width must be positive, got {half_width}")]
    InvalidHalfWidth { pool: PoolId, half_width: i32 },

    #[error("pool {0}: rebalance threshold must be positive")]
    InvalidThreshold(PoolId),

    #[error("pool {pool}: target allocation {pct}% is outside 0..=100")]
    InvalidTarget { pool: PoolId, pct: Decimal },

    #[error("target allocations sum to {0}%, more than 100%")]
    AllocationOverflow(Decimal),

    #[error("pool {0}: deposit amounts must not be negative")]
    NegativeDeposit(PoolId),

    #[error("{0}")]
    Invalid(String),
}

/// Checks every per-pool precondition plus the portfolio-wide allocation cap.
pub fn validate_pool_configs(configs: &[PoolConfig]) -> Result<(), ConfigError> {
    if configs.is_empty() {
        return Err(ConfigError::NoPools);
    }

    let mut seen = HashSet::new();
    let mut total = Decimal::ZERO;

    for config in configs {
        if !seen.insert(&config.pool_id) {
            return Err(ConfigError::DuplicatePool(config.pool_id.clone()));
        }
        if config.half_width <= 0 {
            return Err(ConfigError::InvalidHalfWidth {
                pool: config.pool_id.clone(),
                half_width: config.half_width,
            });
        }
        if config.rebalance_threshold == 0 {
            return Err(ConfigError::InvalidThreshold(config.pool_id.clone()));
        }
        let pct = config.target_allocation_pct;
        if pct < Decimal::ZERO || pct > Decimal::ONE_HUNDRED {
            return Err(ConfigError::InvalidTarget {
                pool: config.pool_id.clone(),
                pct,
            });
        }
        if config.deposit_amounts.token_a < Decimal::ZERO
            || config.deposit_amounts.token_b < Decimal::ZERO
        {
            return Err(ConfigError::NegativeDeposit(config.pool_id.clone()));
        }
        total += pct;
    }

    if total > Decimal::ONE_HUNDRED {
        return Err(ConfigError::AllocationOverflow(total));
    }

    Ok(())
}
