//! Configuration management for Floodgate.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{FloodgateError, Result};
use crate::ratelimit::{SlidingWindowConfig, Strategy, ThrottleConfig};

/// Prefix for environment variable overrides, e.g. `FLOODGATE_LIMITER__MAX_REQUESTS`.
const ENV_PREFIX: &str = "FLOODGATE";

/// Main configuration for Floodgate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FloodgateConfig {
    /// Admission strategy configuration
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Traffic simulation configuration
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Limiter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Which strategy to build
    #[serde(default)]
    pub strategy: Strategy,

    /// Sliding window length in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Requests admitted per sliding window
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,

    /// Throttle interval in milliseconds; zero disables throttling
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,

    /// Background sweep period in milliseconds; unset disables the sweeper
    #[serde(default)]
    pub sweep_interval_ms: Option<u64>,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            window_ms: default_window_ms(),
            max_requests: default_max_requests(),
            min_interval_ms: default_min_interval_ms(),
            sweep_interval_ms: None,
        }
    }
}

fn default_window_ms() -> u64 {
    10_000
}

fn default_max_requests() -> usize {
    1
}

fn default_min_interval_ms() -> u64 {
    10_000
}

impl LimiterConfig {
    /// Settings for a sliding window limiter.
    pub fn sliding_window(&self) -> SlidingWindowConfig {
        SlidingWindowConfig {
            window: Duration::from_millis(self.window_ms),
            max_requests: self.max_requests,
        }
    }

    /// Settings for a throttle limiter.
    pub fn throttle(&self) -> ThrottleConfig {
        ThrottleConfig {
            min_interval: Duration::from_millis(self.min_interval_ms),
        }
    }

    /// The period after which an idle identity stops mattering to the
    /// configured strategy.
    pub fn horizon(&self) -> Duration {
        match self.strategy {
            Strategy::SlidingWindow => Duration::from_millis(self.window_ms),
            Strategy::Throttle => Duration::from_millis(self.min_interval_ms),
        }
    }

    /// Background sweep period, if enabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_ms.map(Duration::from_millis)
    }
}

/// Traffic simulation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Messages sent in each round
    #[serde(default = "default_messages_per_round")]
    pub messages_per_round: u32,

    /// Number of distinct users sending messages
    #[serde(default = "default_users")]
    pub users: u32,

    /// Number of rounds
    #[serde(default = "default_rounds")]
    pub rounds: u32,

    /// Lower bound of the random delay between messages
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    /// Upper bound of the random delay between messages
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Pause between rounds; defaults to the limiter's window or interval
    #[serde(default)]
    pub pause_ms: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            messages_per_round: default_messages_per_round(),
            users: default_users(),
            rounds: default_rounds(),
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            pause_ms: None,
        }
    }
}

fn default_messages_per_round() -> u32 {
    10
}

fn default_users() -> u32 {
    5
}

fn default_rounds() -> u32 {
    2
}

fn default_min_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    1_000
}

impl FloodgateConfig {
    /// Load configuration from a file, with `FLOODGATE_` environment overrides.
    ///
    /// The file format is inferred from its extension.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: FloodgateConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: FloodgateConfig = serde_yaml::from_str(yaml)
            .map_err(|e| FloodgateError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no limiter or simulation can run with.
    pub fn validate(&self) -> Result<()> {
        if self.limiter.strategy == Strategy::SlidingWindow && self.limiter.max_requests == 0 {
            return Err(FloodgateError::Config(
                "limiter.max_requests must be at least 1".to_string(),
            ));
        }
        if self.limiter.sweep_interval_ms == Some(0) {
            return Err(FloodgateError::Config(
                "limiter.sweep_interval_ms must be positive".to_string(),
            ));
        }
        if self.simulation.users == 0 {
            return Err(FloodgateError::Config(
                "simulation.users must be at least 1".to_string(),
            ));
        }
        if self.simulation.min_delay_ms > self.simulation.max_delay_ms {
            return Err(FloodgateError::Config(format!(
                "simulation.min_delay_ms ({}) exceeds max_delay_ms ({})",
                self.simulation.min_delay_ms, self.simulation.max_delay_ms
            )));
        }
        Ok(())
    }

    /// Pause between simulation rounds.
    pub fn round_pause(&self) -> Duration {
        self.simulation
            .pause_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.limiter.horizon())
    }
}
