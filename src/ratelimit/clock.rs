//! Time sources for the limiters.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// A source of "current time" for admission decisions.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> Instant;
}

/// Wall-clock time backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
///
/// Starts at the instant it was created and advances by explicit calls, so
/// elapsed time can be simulated without sleeping.
#[derive(Debug)]
pub struct ManualClock {
    /// Instant the clock was created at
    origin: Instant,
    /// Time elapsed since `origin`
    elapsed: Mutex<Duration>,
}

impl ManualClock {
    /// Create a new manual clock positioned at its origin.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
        }
    }

    /// Move the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut elapsed = self.elapsed.lock();
        *elapsed += by;
    }

    /// Position the clock at `elapsed` past its origin.
    ///
    /// The clock never moves backwards; an earlier position is ignored.
    pub fn set_elapsed(&self, elapsed: Duration) {
        let mut current = self.elapsed.lock();
        if elapsed > *current {
            *current = elapsed;
        }
    }

    /// Time elapsed since the clock's origin.
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.elapsed.lock()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_starts_at_origin() {
        let clock = ManualClock::new();
        let first = clock.now();
        assert_eq!(clock.now(), first);
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new();
        let start = clock.now();

        clock.advance(Duration::from_secs(3));
        clock.advance(Duration::from_millis(500));

        assert_eq!(clock.now() - start, Duration::from_millis(3500));
    }

    #[test]
    fn test_manual_clock_never_moves_backwards() {
        let clock = ManualClock::new();
        clock.set_elapsed(Duration::from_secs(10));
        clock.set_elapsed(Duration::from_secs(4));

        assert_eq!(clock.elapsed(), Duration::from_secs(10));
    }

    #[test]
    fn test_shared_clock_sees_same_time() {
        let clock = Arc::new(ManualClock::new());
        let shared = Arc::clone(&clock);

        clock.advance(Duration::from_secs(7));

        assert_eq!(shared.now(), clock.now());
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
