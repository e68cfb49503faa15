//! Per-position strategy steps.
//!
//! Provides:
//! - Drift detection against the last acted-upon reference
//! - Withdraw-then-deposit range shifts with resumable partial state
//! - Interval-gated fee and reward harvesting

mod harvest;
mod rebalance;
mod tracker;

pub use harvest::*;
pub use rebalance::*;
pub use tracker::*;
