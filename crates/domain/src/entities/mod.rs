pub mod pool;
pub mod position;

pub use pool::{PoolConfig, PoolId};
pub use position::{ManagedPosition, PendingDeposit, PositionId, PositionState};
