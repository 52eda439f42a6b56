//! Configuration surface (spec §6). Loading/parsing the process's actual
//! config file or env vars is explicitly out of scope (spec §1 Non-goals);
//! this module only defines the recognised options and their validation,
//! the way an `arguments.rs` module defines a `clap`/`serde` struct that
//! downstream bootstrap code is expected to populate.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn default_log_level(self) -> &'static str {
        match self {
            Environment::Development => "debug",
            Environment::Production => "info",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TwapConfig {
    #[serde(with = "humantime_secs")]
    pub update_interval: Duration,
    #[serde(with = "humantime_secs")]
    pub price_update_interval: Duration,
    pub window_min: u32,
    pub window_max: u32,
    pub max_slippage_bps: u32,
    pub default_slippage_bps: u32,
    #[serde(with = "humantime_secs")]
    pub min_execution_interval: Duration,
    #[serde(with = "humantime_secs")]
    pub max_execution_interval: Duration,
    pub min_liquidity: u128,
}

impl Default for TwapConfig {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_secs(15),
            price_update_interval: Duration::from_secs(20),
            window_min: 5,
            window_max: 1440,
            max_slippage_bps: 1000,
            default_slippage_bps: 100,
            min_execution_interval: Duration::from_secs(30),
            max_execution_interval: Duration::from_secs(4320),
            min_liquidity: 1,
        }
    }
}

impl TwapConfig {
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.window_min == 0 || self.window_min > self.window_max {
            return Err(crate::error::Error::validation(
                "twap.window_min must be > 0 and <= twap.window_max",
            ));
        }
        if self.max_slippage_bps == 0 || self.max_slippage_bps > 10_000 {
            return Err(crate::error::Error::validation(
                "twap.max_slippage must be in (0, 10000] bps",
            ));
        }
        if self.default_slippage_bps > self.max_slippage_bps {
            return Err(crate::error::Error::validation(
                "twap.default_slippage must not exceed twap.max_slippage",
            ));
        }
        if self.min_execution_interval > self.max_execution_interval {
            return Err(crate::error::Error::validation(
                "twap.min_execution_interval must be <= twap.max_execution_interval",
            ));
        }
        Ok(())
    }
}

/// Opaque per-chain connection settings (spec §6: "per-chain RPC/REST URLs,
/// keys, gas settings passed opaquely to adapter constructors"). The core
/// never interprets these keys; it only threads the map to the registry,
/// which threads it to whichever adapter owns `chain_id`.
pub type ChainSettings = BTreeMap<String, String>;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub environment: Environment,
    pub supported_chains: Vec<String>,
    pub twap: TwapConfig,
    #[serde(default)]
    pub chains: BTreeMap<String, ChainSettings>,
    /// Per-source API keys/auth tokens for the price feed aggregator.
    #[serde(default)]
    pub price_source_keys: BTreeMap<String, String>,
}

impl Config {
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.supported_chains.is_empty() {
            return Err(crate::error::Error::validation(
                "supported_chains must not be empty",
            ));
        }
        self.twap.validate()
    }
}

/// Serde helper: durations are authored as plain seconds in config sources.
mod humantime_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
