//! Pool client boundary for the CLMM keeper.
//!
//! This crate defines the only capability the keeper depends on:
//! - [`client::PoolClient`], the async interface to an on-chain pool program
//! - Timeout and retry decorators applied at that boundary
//! - An in-memory simulated client for paper trading and tests

/// Pool client trait and error taxonomy.
pub mod client;
/// Retry with backoff for transient failures.
pub mod retry;
/// In-memory simulated pool client.
pub mod simulated;
/// Bounded timeouts on every client call.
pub mod timeout;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::client::{
        ClientOperation, ClientResult, FULL_WITHDRAW_BPS, PoolClient, PoolClientError,
    };
    pub use crate::retry::{RetryPolicy, RetryingPoolClient};
    pub use crate::simulated::{MarketStep, SimulatedPoolClient};
    pub use crate::timeout::TimeoutPoolClient;
}
