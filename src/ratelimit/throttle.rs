//! Minimum-interval throttle limiter.
//!
//! Each identity keeps only the instant of its last admitted request. A new
//! request is admitted once at least `min_interval` has elapsed since then.
//! The first request of an identity is always admitted.
//!
//! `can_send` is a pure query here; all stamping happens in `record`.

use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, trace};

use super::backend::RateLimiter;
use super::clock::{Clock, SystemClock};
use super::identity::IdentityKey;
use super::strategy::Strategy;

/// Default minimum interval between admitted requests.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(10);

/// Configuration for a [`ThrottleLimiter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleConfig {
    /// Minimum spacing between admitted requests; zero disables throttling
    pub min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            min_interval: DEFAULT_MIN_INTERVAL,
        }
    }
}

/// Admits a request per identity at most once every `min_interval`.
///
/// Entries are not evicted on the hot path: one stamp is held per identity
/// until [`RateLimiter::purge_expired`] drops the ones old enough to no
/// longer matter.
pub struct ThrottleLimiter<C: Clock = SystemClock> {
    config: ThrottleConfig,
    clock: C,
    /// Last admitted request per identity
    last_seen: DashMap<IdentityKey, Instant>,
}

impl ThrottleLimiter<SystemClock> {
    /// Create a new throttle driven by the system clock.
    pub fn new(config: ThrottleConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl Default for ThrottleLimiter<SystemClock> {
    fn default() -> Self {
        Self::new(ThrottleConfig::default())
    }
}

impl<C: Clock> ThrottleLimiter<C> {
    /// Create a new throttle driven by the given clock.
    pub fn with_clock(config: ThrottleConfig, clock: C) -> Self {
        Self {
            config,
            clock,
            last_seen: DashMap::new(),
        }
    }

    /// The throttle's configuration.
    pub fn config(&self) -> ThrottleConfig {
        self.config
    }

    fn is_disabled(&self) -> bool {
        self.config.min_interval.is_zero()
    }
}

impl<C: Clock> RateLimiter for ThrottleLimiter<C> {
    fn can_send(&self, id: &str) -> bool {
        if self.is_disabled() {
            return true;
        }

        let now = self.clock.now();
        let allowed = match self.last_seen.get(id) {
            None => true,
            Some(last) => now.saturating_duration_since(*last) >= self.config.min_interval,
        };

        trace!(id = %id, allowed, "Checked throttle");
        allowed
    }

    fn record(&self, id: &str) -> bool {
        if self.is_disabled() {
            return true;
        }

        let now = self.clock.now();
        let accepted = match self.last_seen.entry(IdentityKey::from(id)) {
            Entry::Occupied(mut occupied) => {
                let elapsed = now.saturating_duration_since(*occupied.get());
                if elapsed >= self.config.min_interval {
                    occupied.insert(now);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(now);
                true
            }
        };

        if accepted {
            trace!(id = %id, "Stamped throttled identity");
        } else {
            debug!(
                id = %id,
                min_interval = ?self.config.min_interval,
                "Throttle interval not yet elapsed"
            );
        }
        accepted
    }

    fn time_until_next_allowed(&self, id: &str) -> Duration {
        let now = self.clock.now();
        match self.last_seen.get(id) {
            None => Duration::ZERO,
            Some(last) => self
                .config
                .min_interval
                .saturating_sub(now.saturating_duration_since(*last)),
        }
    }

    fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let min_interval = self.config.min_interval;
        let mut removed = 0;

        self.last_seen.retain(|_, last| {
            let keep = now.saturating_duration_since(*last) < min_interval;
            if !keep {
                removed += 1;
            }
            keep
        });

        if removed > 0 {
            debug!(removed, "Purged idle throttled identities");
        }
        removed
    }

    fn tracked_identities(&self) -> usize {
        self.last_seen.len()
    }

    fn clear(&self) {
        self.last_seen.clear();
    }

    fn strategy(&self) -> Strategy {
        Strategy::Throttle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;
    use std::sync::Arc;

    fn create_throttle(min_interval: Duration) -> (Arc<ManualClock>, ThrottleLimiter<Arc<ManualClock>>) {
        let clock = Arc::new(ManualClock::new());
        let limiter = ThrottleLimiter::with_clock(ThrottleConfig { min_interval }, Arc::clone(&clock));
        (clock, limiter)
    }

    #[test]
    fn test_default_config() {
        let limiter = ThrottleLimiter::new(ThrottleConfig::default());
        assert_eq!(limiter.config().min_interval, Duration::from_secs(10));
        assert_eq!(limiter.strategy(), Strategy::Throttle);
    }

    #[test]
    fn test_throttle_scenario() {
        let (clock, limiter) = create_throttle(Duration::from_secs(10));

        assert!(limiter.record("B"));

        clock.set_elapsed(Duration::from_secs(9));
        assert!(!limiter.record("B"));
        assert_eq!(limiter.time_until_next_allowed("B"), Duration::from_secs(1));

        clock.set_elapsed(Duration::from_secs(10));
        assert!(limiter.record("B"));
    }

    #[test]
    fn test_records_closer_than_interval() {
        let (clock, limiter) = create_throttle(Duration::from_secs(10));

        let first = limiter.record("B");
        clock.advance(Duration::from_millis(9_999));
        let second = limiter.record("B");

        assert_eq!((first, second), (true, false));
    }

    #[test]
    fn test_records_at_least_interval_apart() {
        let (clock, limiter) = create_throttle(Duration::from_secs(10));

        let first = limiter.record("B");
        clock.advance(Duration::from_secs(25));
        let second = limiter.record("B");

        assert_eq!((first, second), (true, true));
    }

    #[test]
    fn test_rejected_record_does_not_restamp() {
        let (clock, limiter) = create_throttle(Duration::from_secs(10));

        limiter.record("B");
        clock.advance(Duration::from_secs(6));
        assert!(!limiter.record("B"));
        clock.advance(Duration::from_secs(4));

        // Interval counts from the accepted request, not the rejected one.
        assert!(limiter.record("B"));
    }

    #[test]
    fn test_can_send_is_pure() {
        let (clock, limiter) = create_throttle(Duration::from_secs(10));

        assert!(limiter.can_send("new"));
        assert_eq!(limiter.tracked_identities(), 0);
        assert_eq!(limiter.time_until_next_allowed("new"), Duration::ZERO);

        limiter.record("new");
        clock.advance(Duration::from_secs(10));
        assert!(limiter.can_send("new"));
        // A positive answer does not consume the slot.
        assert!(limiter.can_send("new"));
        assert!(limiter.record("new"));
        assert!(!limiter.can_send("new"));
    }

    #[test]
    fn test_first_request_always_admitted() {
        let (_clock, limiter) = create_throttle(Duration::from_secs(3600));

        for id in ["a", "b", "c"] {
            assert!(limiter.record(id));
        }
        assert_eq!(limiter.tracked_identities(), 3);
    }

    #[test]
    fn test_zero_interval_disables_throttle() {
        let (_clock, limiter) = create_throttle(Duration::ZERO);

        for _ in 0..10 {
            assert!(limiter.can_send("B"));
            assert!(limiter.record("B"));
            assert!(limiter.record("C"));
        }

        assert_eq!(limiter.tracked_identities(), 0);
        assert_eq!(limiter.time_until_next_allowed("B"), Duration::ZERO);
    }

    #[test]
    fn test_wait_is_bounded_by_interval() {
        let (clock, limiter) = create_throttle(Duration::from_secs(10));

        limiter.record("B");
        assert_eq!(limiter.time_until_next_allowed("B"), Duration::from_secs(10));

        clock.advance(Duration::from_secs(30));
        assert_eq!(limiter.time_until_next_allowed("B"), Duration::ZERO);
    }

    #[test]
    fn test_state_persists_without_purge() {
        let (clock, limiter) = create_throttle(Duration::from_secs(10));

        limiter.record("B");
        clock.advance(Duration::from_secs(100));

        assert!(limiter.can_send("B"));
        assert_eq!(limiter.tracked_identities(), 1);
    }

    #[test]
    fn test_purge_expired() {
        let (clock, limiter) = create_throttle(Duration::from_secs(10));

        limiter.record("old");
        clock.advance(Duration::from_secs(8));
        limiter.record("recent");
        clock.advance(Duration::from_secs(2));

        assert_eq!(limiter.purge_expired(), 1);
        assert_eq!(limiter.tracked_identities(), 1);
        assert!(limiter.can_send("old"));
        assert!(!limiter.can_send("recent"));
    }

    #[test]
    fn test_clear() {
        let (_clock, limiter) = create_throttle(Duration::from_secs(10));

        limiter.record("B");
        limiter.clear();

        assert_eq!(limiter.tracked_identities(), 0);
        assert!(limiter.record("B"));
    }

    #[test]
    fn test_concurrent_first_requests_admit_once() {
        let (_clock, limiter) = create_throttle(Duration::from_secs(10));

        let shared = &limiter;
        let accepted: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(move || (0..50).filter(|_| shared.record("B")).count()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });

        assert_eq!(accepted, 1);
    }
}
