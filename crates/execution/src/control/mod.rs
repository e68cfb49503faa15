//! The keeper's control loop.
//!
//! Each tick reads the reference index of every pool, refreshes the managed
//! position, resumes or performs a rebalance when due, harvests on schedule
//! and finally takes one portfolio snapshot.

mod control_loop;
mod locks;
mod report;

pub use control_loop::*;
pub use locks::*;
pub use report::*;
