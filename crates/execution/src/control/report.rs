//! Per-tick reports.

use crate::strategy::{DriftResult, HarvestOutcome, RebalanceOutcome};
use chrono::{DateTime, Utc};
use clmm_keeper_domain::prelude::*;
use serde::Serialize;
use std::fmt;

/// What happened to one pool during a tick.
#[derive(Debug, Clone, Serialize)]
pub struct PoolTickReport {
    pub pool_id: PoolId,
    pub reference_index: Option<i32>,
    pub position_id: Option<PositionId>,
    pub range: Option<TickRange>,
    pub drift: Option<DriftResult>,
    pub rebalance: Option<RebalanceOutcome>,
    pub harvest: Option<HarvestOutcome>,
    /// First failure seen for this pool. Never aborts the other pools.
    pub error: Option<String>,
}

impl PoolTickReport {
    pub fn new(pool_id: PoolId) -> Self {
        Self {
            pool_id,
            reference_index: None,
            position_id: None,
            range: None,
            drift: None,
            rebalance: None,
            harvest: None,
            error: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    pub(crate) fn fail(&mut self, error: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(error.into());
        }
    }
}

impl fmt::Display for PoolTickReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pool_id)?;
        if let Some(index) = self.reference_index {
            write!(f, " @ {index}")?;
        }
        if let Some(range) = self.range {
            write!(f, " range {range}")?;
        }
        if let Some(drift) = &self.drift {
            write!(f, " moved {}", drift.bins_moved)?;
        }
        if let Some(rebalance) = &self.rebalance {
            write!(f, "; {rebalance}")?;
        }
        if let Some(harvest) = &self.harvest {
            write!(f, "; harvest {harvest}")?;
        }
        if let Some(error) = &self.error {
            write!(f, "; error: {error}")?;
        }
        Ok(())
    }
}

/// Result of one control-loop tick.
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub pools: Vec<PoolTickReport>,
    pub snapshot: PortfolioSnapshot,
    pub persist_error: Option<String>,
}

impl TickReport {
    pub fn pool(&self, pool_id: &PoolId) -> Option<&PoolTickReport> {
        self.pools.iter().find(|p| &p.pool_id == pool_id)
    }

    pub fn failed_pools(&self) -> usize {
        self.pools.iter().filter(|p| !p.is_ok()).count()
    }
}

impl fmt::Display for TickReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "tick {} at {} ({} pools, {} failed)",
            self.tick,
            self.started_at.format("%Y-%m-%d %H:%M:%S"),
            self.pools.len(),
            self.failed_pools()
        )?;
        for pool in &self.pools {
            writeln!(f, "  {pool}")?;
        }
        write!(
            f,
            "  portfolio {} (unclaimed fees {}, rewards {})",
            self.snapshot.total_value.round_dp(4),
            self.snapshot.total_unclaimed_fees.round_dp(4),
            self.snapshot.total_unclaimed_rewards.round_dp(4)
        )?;
        if self.snapshot.needs_attention {
            write!(f, " NEEDS ATTENTION")?;
        }
        for entry in &self.snapshot.entries {
            write!(
                f,
                "\n    {}: {}% (target {}%, drift {:+}){}",
                entry.pool_id,
                entry.observed_pct.round_dp(2),
                entry.target_pct,
                entry.drift_pct.round_dp(2),
                if entry.stale { " stale" } else { "" }
            )?;
        }
        if let Some(error) = &self.persist_error {
            write!(f, "\n  persist failed: {error}")?;
        }
        Ok(())
    }
}
