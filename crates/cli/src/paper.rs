//! Paper-trading market backed by the simulated pool client.

use anyhow::{Context, Result};
use clmm_keeper_domain::prelude::*;
use clmm_keeper_execution::prelude::*;
use clmm_keeper_protocols::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Starting point of one simulated pool.
#[derive(Debug, Clone, Deserialize)]
pub struct PaperPool {
    pub id: PoolId,
    #[serde(default)]
    pub reference_index: i32,
    #[serde(default = "one")]
    pub price_a: Decimal,
    #[serde(default = "one")]
    pub price_b: Decimal,
    #[serde(default = "one")]
    pub reward_price: Decimal,
}

fn one() -> Decimal {
    Decimal::ONE
}

/// `[paper]` section of the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaperSettings {
    /// Seed for the random walk. Random when unset.
    pub seed: Option<u64>,
    /// Seconds between market steps.
    pub step_secs: u64,
    pub volatility_steps: f64,
    pub fee_rate: Decimal,
    pub reward_per_step: Decimal,
    pub pools: Vec<PaperPool>,
}

impl Default for PaperSettings {
    fn default() -> Self {
        let step = MarketStep::default();
        Self {
            seed: None,
            step_secs: 5,
            volatility_steps: step.volatility_steps,
            fee_rate: step.fee_rate,
            reward_per_step: step.reward_per_step,
            pools: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PaperSection {
    #[serde(default)]
    paper: PaperSettings,
}

impl PaperSettings {
    /// Reads the optional `[paper]` section from the same TOML document as the keeper config.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let section: PaperSection =
            toml::from_str(content).context("invalid [paper] section")?;
        Ok(section.paper)
    }

    fn market_step(&self) -> MarketStep {
        MarketStep {
            volatility_steps: self.volatility_steps,
            fee_rate: self.fee_rate,
            reward_per_step: self.reward_per_step,
        }
    }

    /// Builds a simulated client holding every configured pool.
    ///
    /// Pools missing from the `[paper]` section start at index 0 with unit prices.
    pub fn build_client(&self, pools: &[PoolConfig]) -> Arc<SimulatedPoolClient> {
        let sim = Arc::new(SimulatedPoolClient::new());
        for config in pools {
            let start = self.pools.iter().find(|p| p.id == config.pool_id);
            let (index, prices) = match start {
                Some(p) => (
                    p.reference_index,
                    AssetPrices::new(p.price_a, p.price_b, p.reward_price),
                ),
                None => (0, AssetPrices::unit()),
            };
            sim.add_pool(config.pool_id.as_str(), index, prices);
        }
        sim
    }

    /// Moves the simulated market every `step_secs` until `stop` is signalled.
    pub fn spawn_market(&self, sim: Arc<SimulatedPoolClient>, stop: StopHandle) -> JoinHandle<()> {
        let step = self.market_step();
        let period = Duration::from_secs(self.step_secs.max(1));
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        info!(
            step_secs = period.as_secs(),
            volatility_steps = step.volatility_steps,
            seeded = self.seed.is_some(),
            "Starting paper market"
        );

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    biased;
                    _ = stop.stopped() => break,
                    _ = ticker.tick() => sim.step_market(&mut rng, &step),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_missing_section_uses_defaults() {
        let paper = PaperSettings::from_toml_str("pools = []").unwrap();
        assert_eq!(paper.step_secs, 5);
        assert!(paper.pools.is_empty());
    }

    #[test]
    fn test_example_file_paper_section() {
        let paper =
            PaperSettings::from_toml_str(include_str!("../../../keeper.example.toml")).unwrap();
        assert_eq!(paper.seed, Some(42));
        assert_eq!(paper.pools.len(), 3);
        assert_eq!(paper.pools[0].price_a, dec!(150));
    }

    #[tokio::test]
    async fn test_build_client_seeds_pools() {
        let paper = PaperSettings::from_toml_str(
            r#"
pools = []

[paper]
seed = 7

[[paper.pools]]
id = "SOL-USDC"
reference_index = 120
price_a = "150"
"#,
        )
        .unwrap();
        let configs = vec![
            PoolConfig::concentrated("SOL-USDC", dec!(50), 10, 5, TokenAmounts::ZERO),
            PoolConfig::concentrated("RAY-USDC", dec!(50), 10, 5, TokenAmounts::ZERO),
        ];

        let sim = paper.build_client(&configs);

        assert_eq!(
            sim.get_reference_index(&PoolId::new("SOL-USDC")).await.unwrap(),
            120
        );
        let prices = sim.get_asset_prices(&PoolId::new("SOL-USDC")).await.unwrap();
        assert_eq!(prices.token_a, dec!(150));
        assert_eq!(prices.token_b, Decimal::ONE);
        assert_eq!(
            sim.get_reference_index(&PoolId::new("RAY-USDC")).await.unwrap(),
            0
        );
    }
}
