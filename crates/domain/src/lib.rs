//! Domain model for the CLMM keeper.
//!
//! Pure data types shared by the protocol adapters and the execution engine:
//! pool configuration, managed positions, portfolio snapshots and the
//! configuration validation rules.

/// Pool and position entities.
pub mod entities;
/// Domain enums.
pub mod enums;
/// Portfolio snapshots.
pub mod portfolio;
/// Configuration validation.
pub mod validation;
/// Value objects.
pub mod value_objects;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::entities::pool::{PoolConfig, PoolId};
    pub use crate::entities::position::{
        ManagedPosition, PendingDeposit, PositionId, PositionState,
    };
    pub use crate::enums::{LiquidityShape, PoolKind};
    pub use crate::portfolio::{AllocationEntry, PoolValuation, PortfolioSnapshot};
    pub use crate::validation::{ConfigError, validate_pool_configs};
    pub use crate::value_objects::amount::{AssetPrices, TokenAmounts};
    pub use crate::value_objects::tick_range::TickRange;
}
