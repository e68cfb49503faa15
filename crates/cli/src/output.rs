//! Rendering of tick reports for the terminal.

use anyhow::Result;
use chrono::Local;
use clmm_keeper_execution::prelude::*;
use prettytable::{Table, row};

/// How reports are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

/// Prints one tick report to stdout.
pub fn print_report(report: &TickReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(report)?),
        OutputFormat::Table => {
            let elapsed = report.finished_at - report.started_at;
            println!(
                "Tick {} at {} took {}ms ({} failed)",
                report.tick,
                report.started_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
                elapsed.num_milliseconds(),
                report.failed_pools()
            );
            pools_table(report).printstd();
            allocation_table(report).printstd();
            if let Some(error) = &report.persist_error {
                println!("Persist failed: {error}");
            }
        }
    }
    Ok(())
}

fn pools_table(report: &TickReport) -> Table {
    let mut table = Table::new();
    table.add_row(row!["Pool", "Index", "Range", "Moved", "Rebalance", "Harvest", "Error"]);
    for pool in &report.pools {
        table.add_row(row![
            pool.pool_id,
            opt(pool.reference_index),
            opt(pool.range),
            opt(pool.drift.map(|d| d.bins_moved)),
            opt(pool.rebalance.as_ref()),
            opt(pool.harvest.as_ref()),
            opt(pool.error.as_ref()),
        ]);
    }
    table
}

fn allocation_table(report: &TickReport) -> Table {
    let snapshot = &report.snapshot;
    let mut table = Table::new();
    table.add_row(row!["Pool", "Value", "Share %", "Target %", "Drift %", "Stale"]);
    for entry in &snapshot.entries {
        table.add_row(row![
            entry.pool_id,
            entry.value.round_dp(4),
            entry.observed_pct.round_dp(2),
            entry.target_pct,
            entry.drift_pct.round_dp(2),
            if entry.stale { "yes" } else { "" },
        ]);
    }
    table.add_row(row![
        "TOTAL",
        snapshot.total_value.round_dp(4),
        "",
        "",
        if snapshot.needs_attention { "ATTENTION" } else { "ok" },
        "",
    ]);
    table
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}
