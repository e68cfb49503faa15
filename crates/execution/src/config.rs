//! Keeper configuration file.

use clmm_keeper_domain::prelude::*;
use clmm_keeper_protocols::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Settings for the control loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopSettings {
    /// Seconds between ticks.
    pub interval_secs: u64,
    /// Minimum seconds between two claims of the same kind on a position.
    pub harvest_interval_secs: u64,
    /// Allowed absolute drift from the target share, in percentage points.
    pub allocation_tolerance_pct: Decimal,
    /// Bound on every pool client call.
    pub call_timeout_secs: u64,
    /// Log intended writes without issuing them.
    pub dry_run: bool,
    /// Re-issue the deposit of an interrupted rebalance on the next tick.
    pub auto_resume_partial: bool,
    /// Retries after the first attempt of a transient failure.
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Snapshots kept in memory. Unbounded when unset.
    pub history_len: Option<usize>,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            harvest_interval_secs: 3600,
            allocation_tolerance_pct: Decimal::new(5, 0),
            call_timeout_secs: 30,
            dry_run: false,
            auto_resume_partial: true,
            max_retries: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 5_000,
            history_len: Some(1_440),
        }
    }
}

impl LoopSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn harvest_interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.harvest_interval_secs).unwrap_or(i64::MAX))
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }

    /// Checks the loop-wide settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "keeper.interval_secs must be positive".to_string(),
            ));
        }
        if self.call_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "keeper.call_timeout_secs must be positive".to_string(),
            ));
        }
        if self.allocation_tolerance_pct < Decimal::ZERO {
            return Err(ConfigError::Invalid(format!(
                "keeper.allocation_tolerance_pct must not be negative, got {}",
                self.allocation_tolerance_pct
            )));
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(ConfigError::Invalid(
                "keeper.max_backoff_ms must be at least keeper.initial_backoff_ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Wraps a raw client with the configured per-call timeout and retry policy.
    ///
    /// Each retry attempt gets its own timeout.
    pub fn wrap_client<C: PoolClient + 'static>(&self, client: C) -> Arc<dyn PoolClient> {
        Arc::new(RetryingPoolClient::new(
            TimeoutPoolClient::new(client, self.call_timeout()),
            self.retry_policy(),
        ))
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeeperConfig {
    /// Where the managed position table is persisted between runs.
    #[serde(default)]
    pub state_file: Option<PathBuf>,
    #[serde(default)]
    pub keeper: LoopSettings,
    pub pools: Vec<PoolConfig>,
}

impl KeeperConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Invalid(format!("invalid TOML: {e}")))
    }

    /// Reads and parses a TOML file. Validation is left to [`Self::validate`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::Invalid(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Invalid(format!("cannot serialize config: {e}")))
    }

    /// Validates loop settings and every pool.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.keeper.validate()?;
        validate_pool_configs(&self.pools)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const SAMPLE: &str = r#"
state_file = "state/positions.json"

[keeper]
interval_secs = 30
harvest_interval_secs = 3600
allocation_tolerance_pct = "5"
dry_run = true

[[pools]]
id = "SOL-USDC"
kind = "concentrated_liquidity"
target_allocation_pct = "60"
strategy = "curve"
half_width = 10
rebalance_threshold = 5
deposit_amounts = { token_a = "1.5", token_b = "200" }

[[pools]]
id = "RAY-USDC"
kind = "constant_product"
target_allocation_pct = "40"
half_width = 1
rebalance_threshold = 1
deposit_amounts = { token_a = "10", token_b = "20" }
"#;

    #[test]
    fn test_parse_sample() {
        let config = KeeperConfig::from_toml_str(SAMPLE).unwrap();

        assert_eq!(config.keeper.interval_secs, 30);
        assert!(config.keeper.dry_run);
        assert_eq!(config.keeper.call_timeout_secs, 30);
        assert!(config.keeper.auto_resume_partial);
        assert_eq!(
            config.state_file.as_deref(),
            Some(Path::new("state/positions.json"))
        );
        assert_eq!(config.pools.len(), 2);
        assert_eq!(config.pools[0].strategy, LiquidityShape::Curve);
        assert_eq!(config.pools[0].deposit_amounts.token_a, dec!(1.5));
        assert_eq!(config.pools[1].kind, PoolKind::ConstantProduct);
        assert_eq!(config.pools[1].strategy, LiquidityShape::Spot);
        config.validate().unwrap();
    }

    #[test]
    fn test_toml_round_trip() {
        let config = KeeperConfig::from_toml_str(SAMPLE).unwrap();
        let text = config.to_toml_string().unwrap();
        assert_eq!(KeeperConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_rejects_overallocation() {
        let text = SAMPLE.replace(r#"target_allocation_pct = "40""#, r#"target_allocation_pct = "50""#);
        let config = KeeperConfig::from_toml_str(&text).unwrap();
        assert_eq!(
            config.validate(),
            Err(ConfigError::AllocationOverflow(dec!(110)))
        );
    }

    #[test]
    fn test_rejects_zero_interval() {
        let mut config = KeeperConfig::from_toml_str(SAMPLE).unwrap();
        config.keeper.interval_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_negative_tolerance() {
        let mut config = KeeperConfig::from_toml_str(SAMPLE).unwrap();
        config.keeper.allocation_tolerance_pct = dec!(-1);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let err = KeeperConfig::from_toml_str("pools = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_example_file_is_valid() {
        let config =
            KeeperConfig::from_toml_str(include_str!("../../../keeper.example.toml")).unwrap();
        config.validate().unwrap();
        assert_eq!(config.pools.len(), 3);
    }

    #[test]
    fn test_default_retry_policy() {
        let policy = LoopSettings::default().retry_policy();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.initial_backoff, Duration::from_millis(250));
    }
}
