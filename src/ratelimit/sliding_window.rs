//! Sliding time-window limiter.
//!
//! Each identity keeps the timestamps of its admitted requests that are still
//! inside the trailing window, oldest first. Expired timestamps are evicted
//! at the start of every operation on that identity, and an identity whose
//! window empties is removed from the map entirely, so memory is bounded by
//! the number of recently active identities.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, trace};

use super::backend::RateLimiter;
use super::clock::{Clock, SystemClock};
use super::identity::IdentityKey;
use super::strategy::Strategy;

/// Default trailing window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(10);
/// Default number of requests admitted per window.
pub const DEFAULT_MAX_REQUESTS: usize = 1;

/// Configuration for a [`SlidingWindowLimiter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlidingWindowConfig {
    /// Length of the trailing window
    pub window: Duration,
    /// Maximum admitted requests inside one window
    pub max_requests: usize,
}

impl Default for SlidingWindowConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            max_requests: DEFAULT_MAX_REQUESTS,
        }
    }
}

/// Admits at most `max_requests` per identity within any trailing `window`.
///
/// Thread-safe: each identity's cleanup, count check and append happen under
/// that identity's shard lock, so concurrent `record` calls can never push a
/// window past its limit.
pub struct SlidingWindowLimiter<C: Clock = SystemClock> {
    config: SlidingWindowConfig,
    clock: C,
    /// Admitted request timestamps per identity, oldest first
    windows: DashMap<IdentityKey, VecDeque<Instant>>,
}

impl SlidingWindowLimiter<SystemClock> {
    /// Create a new limiter driven by the system clock.
    pub fn new(config: SlidingWindowConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl Default for SlidingWindowLimiter<SystemClock> {
    fn default() -> Self {
        Self::new(SlidingWindowConfig::default())
    }
}

impl<C: Clock> SlidingWindowLimiter<C> {
    /// Create a new limiter driven by the given clock.
    pub fn with_clock(config: SlidingWindowConfig, clock: C) -> Self {
        Self {
            config,
            clock,
            windows: DashMap::new(),
        }
    }

    /// The limiter's configuration.
    pub fn config(&self) -> SlidingWindowConfig {
        self.config
    }

    /// Number of admitted requests for `id` still inside the window.
    pub fn requests_in_window(&self, id: &str) -> usize {
        let now = self.clock.now();
        self.prune(id, now).map_or(0, |(count, _)| count)
    }

    /// Evict expired timestamps for `id`.
    ///
    /// Returns the remaining count and oldest timestamp, or `None` if the
    /// identity holds no state (an emptied window is removed from the map).
    fn prune(&self, id: &str, now: Instant) -> Option<(usize, Instant)> {
        let remaining = {
            let mut window = self.windows.get_mut(id)?;
            evict_expired(&mut window, now, self.config.window);
            window.front().map(|oldest| (window.len(), *oldest))
        };

        if remaining.is_none() {
            // Re-checked under the shard lock in case a record slipped in.
            if self.windows.remove_if(id, |_, window| window.is_empty()).is_some() {
                debug!(id = %id, "Evicted idle identity");
            }
        }

        remaining
    }
}

/// Pop timestamps whose age has reached the window length.
fn evict_expired(window: &mut VecDeque<Instant>, now: Instant, length: Duration) {
    while let Some(oldest) = window.front() {
        if now.saturating_duration_since(*oldest) >= length {
            window.pop_front();
        } else {
            break;
        }
    }
}

impl<C: Clock> RateLimiter for SlidingWindowLimiter<C> {
    fn can_send(&self, id: &str) -> bool {
        let now = self.clock.now();
        let allowed = match self.prune(id, now) {
            None => self.config.max_requests > 0,
            Some((count, _)) => count < self.config.max_requests,
        };

        trace!(id = %id, allowed, "Checked sliding window");
        allowed
    }

    fn record(&self, id: &str) -> bool {
        let now = self.clock.now();
        let max_requests = self.config.max_requests;

        let accepted = match self.windows.entry(IdentityKey::from(id)) {
            Entry::Occupied(mut occupied) => {
                let window = occupied.get_mut();
                evict_expired(window, now, self.config.window);
                if window.len() < max_requests {
                    window.push_back(now);
                    true
                } else {
                    if window.is_empty() {
                        occupied.remove();
                    }
                    false
                }
            }
            Entry::Vacant(vacant) => {
                if max_requests > 0 {
                    vacant.insert(VecDeque::from([now]));
                    true
                } else {
                    false
                }
            }
        };

        if accepted {
            trace!(id = %id, "Recorded request in sliding window");
        } else {
            debug!(
                id = %id,
                max_requests,
                window = ?self.config.window,
                "Sliding window limit exceeded"
            );
        }
        accepted
    }

    fn time_until_next_allowed(&self, id: &str) -> Duration {
        let now = self.clock.now();
        match self.prune(id, now) {
            None => Duration::ZERO,
            Some((_, oldest)) => self
                .config
                .window
                .saturating_sub(now.saturating_duration_since(oldest)),
        }
    }

    fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let length = self.config.window;
        let mut removed = 0;

        self.windows.retain(|_, window| {
            evict_expired(window, now, length);
            let keep = !window.is_empty();
            if !keep {
                removed += 1;
            }
            keep
        });

        if removed > 0 {
            debug!(removed, "Purged idle sliding window identities");
        }
        removed
    }

    fn tracked_identities(&self) -> usize {
        self.windows.len()
    }

    fn clear(&self) {
        self.windows.clear();
    }

    fn strategy(&self) -> Strategy {
        Strategy::SlidingWindow
    }
}
