//! Strategy selection and limiter construction.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::backend::RateLimiter;
use super::clock::{Clock, SystemClock};
use super::sliding_window::SlidingWindowLimiter;
use super::throttle::ThrottleLimiter;
use crate::config::LimiterConfig;

/// The admission strategy used at a call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Bounded count of requests in a trailing window
    #[default]
    SlidingWindow,
    /// Fixed minimum interval between requests
    Throttle,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::SlidingWindow => f.write_str("sliding_window"),
            Strategy::Throttle => f.write_str("throttle"),
        }
    }
}

/// Build the limiter described by `config`, driven by the system clock.
pub fn build_limiter(config: &LimiterConfig) -> Arc<dyn RateLimiter> {
    build_limiter_with_clock(config, SystemClock)
}

/// Build the limiter described by `config`, driven by `clock`.
pub fn build_limiter_with_clock<C>(config: &LimiterConfig, clock: C) -> Arc<dyn RateLimiter>
where
    C: Clock + 'static,
{
    match config.strategy {
        Strategy::SlidingWindow => {
            let settings = config.sliding_window();
            info!(
                window = ?settings.window,
                max_requests = settings.max_requests,
                "Sliding window limiter initialized"
            );
            Arc::new(SlidingWindowLimiter::with_clock(settings, clock))
        }
        Strategy::Throttle => {
            let settings = config.throttle();
            info!(min_interval = ?settings.min_interval, "Throttle limiter initialized");
            Arc::new(ThrottleLimiter::with_clock(settings, clock))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;
    use std::time::Duration;

    #[test]
    fn test_strategy_display() {
        assert_eq!(Strategy::SlidingWindow.to_string(), "sliding_window");
        assert_eq!(Strategy::Throttle.to_string(), "throttle");
        assert_eq!(Strategy::default(), Strategy::SlidingWindow);
    }

    #[test]
    fn test_build_sliding_window() {
        let config = LimiterConfig {
            strategy: Strategy::SlidingWindow,
            max_requests: 2,
            ..LimiterConfig::default()
        };

        let limiter = build_limiter(&config);

        assert_eq!(limiter.strategy(), Strategy::SlidingWindow);
        assert!(limiter.record("A"));
        assert!(limiter.record("A"));
        assert!(!limiter.record("A"));
    }

    #[test]
    fn test_build_throttle_with_clock() {
        let clock = Arc::new(ManualClock::new());
        let config = LimiterConfig {
            strategy: Strategy::Throttle,
            min_interval_ms: 500,
            ..LimiterConfig::default()
        };

        let limiter = build_limiter_with_clock(&config, Arc::clone(&clock));

        assert_eq!(limiter.strategy(), Strategy::Throttle);
        assert!(limiter.record("A"));
        assert!(!limiter.record("A"));
        clock.advance(Duration::from_millis(500));
        assert!(limiter.record("A"));
    }
}
