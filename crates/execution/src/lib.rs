//! Control loop and strategy execution for the CLMM keeper.
//!
//! This crate drives managed liquidity positions through a pool client:
//! - Drift detection against the last acted-upon reference index
//! - Two-step range shifts with resumable partial state
//! - Interval-gated fee and reward harvesting
//! - Portfolio valuation and allocation drift reporting
//! - Position lifecycle tracking
//! - Optional persistence of the managed position table

/// Prelude module for convenient imports.
pub mod prelude;

/// Keeper configuration file.
pub mod config;
/// Fixed-interval control loop.
pub mod control;
/// Position lifecycle tracking.
pub mod lifecycle;
/// Portfolio valuation and snapshot history.
pub mod portfolio;
/// Clock and stop signal.
pub mod scheduler;
/// Position table persistence.
pub mod store;
/// Drift, rebalance and harvest steps.
pub mod strategy;
