//! Engine configuration.
//!
//! Every section is optional in TOML; missing keys take their defaults.
//!
//! ```toml
//! [tracker]
//! total_participants = 4
//! total_rounds_estimate = 8
//!
//! [conflict]
//! intensity = 0.7
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregator::AggregationConfig;
use crate::conflict::ConflictThresholds;
use crate::debate::DebateRules;
use crate::decay::DecayConfig;
use crate::error::{ConfigError, ConfigResult};
use crate::resolution::ExecutorConfig;
use crate::tracker::TrackerConfig;
use crate::weights::WeightConfig;

/// Overrides `TrackerConfig::total_participants`.
pub const ENV_TOTAL_PARTICIPANTS: &str = "CONSENSUS_TOTAL_PARTICIPANTS";
/// Overrides `TrackerConfig::total_rounds_estimate`.
pub const ENV_TOTAL_ROUNDS: &str = "CONSENSUS_TOTAL_ROUNDS";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tracker: TrackerConfig,
    pub decay: DecayConfig,
    pub weights: WeightConfig,
    pub aggregation: AggregationConfig,
    pub conflict: ConflictThresholds,
    pub debate: DebateRules,
    pub executors: ExecutorConfig,
}

impl EngineConfig {
    /// Parse a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&text)?;
        debug!(path = %path.display(), "Engine config loaded");
        Ok(config)
    }

    pub fn from_toml(text: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Apply `CONSENSUS_*` environment overrides on top of this config.
    pub fn apply_env(&mut self) -> ConfigResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<()> {
        if let Some(value) = lookup(ENV_TOTAL_PARTICIPANTS) {
            self.tracker.total_participants = parse_env(ENV_TOTAL_PARTICIPANTS, &value)?;
        }
        if let Some(value) = lookup(ENV_TOTAL_ROUNDS) {
            self.tracker.total_rounds_estimate = parse_env(ENV_TOTAL_ROUNDS, &value)?;
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> ConfigResult<T> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key: key.to_string(),
        value: value.to_string(),
    })
}
