//! Portfolio valuation across pools.
//!
//! Provides:
//! - Per-pool valuation with stale fallback and drift against targets
//! - An append-only snapshot history with trend comparison

mod allocator;
mod history;

pub use allocator::*;
pub use history::*;
