//! Position lifecycle tracking.
//!
//! Tracks the complete lifecycle of managed positions:
//! - Position opening or adoption
//! - Rebalancing events, interrupted ones included
//! - Fee and reward claims

mod events;
mod tracker;

pub use events::*;
pub use tracker::*;
