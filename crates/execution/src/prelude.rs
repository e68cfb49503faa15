//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types from the crate.
//!
//! # Example
//!
//! ```rust
//! use clmm_keeper_execution::prelude::*;
//! ```

// Config
pub use crate::config::{KeeperConfig, LoopSettings};

// Control
pub use crate::control::{ControlLoop, PoolTickReport, PositionBook, PositionSlot, TickReport};

// Lifecycle
pub use crate::lifecycle::{
    AggregateStats, EventData, InterruptedRebalanceData, LifecycleEvent, LifecycleEventType,
    LifecycleTracker, PositionOpenedData, PositionSummary, RebalanceData,
};

// Portfolio
pub use crate::portfolio::{PortfolioAllocator, PortfolioTrend, SnapshotHistory};

// Scheduler
pub use crate::scheduler::{Clock, ManualClock, StopHandle, SystemClock};

// Store
pub use crate::store::{PositionStore, StoreError};

// Strategy
pub use crate::strategy::{
    ClaimStatus, DriftResult, EMPTY_POSITION, HarvestOutcome, HarvestSkipReason,
    PartialRebalance, PositionTracker, RebalanceExecutor, RebalanceOutcome, RebalanceStage,
    RewardHarvester, SkipReason,
};
