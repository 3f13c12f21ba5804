//! Background eviction of idle identities.
//!
//! Limiters only evict on access; a sweeper periodically calls
//! [`RateLimiter::purge_expired`] so identities that never return do not
//! linger. Dropping the handle stops the task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::backend::RateLimiter;

/// Smallest accepted sweep period.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Handle to a running sweeper task.
pub struct SweeperHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        let _ = self.task.await;
    }

    /// Whether the sweeper task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawn a task purging `limiter` every `every`.
///
/// Must be called from within a tokio runtime.
pub fn spawn_sweeper(limiter: Arc<dyn RateLimiter>, every: Duration) -> SweeperHandle {
    let every = every.max(MIN_SWEEP_INTERVAL);
    let (shutdown, mut stop) = oneshot::channel();

    info!(strategy = %limiter.strategy(), interval = ?every, "Starting sweeper");

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = limiter.purge_expired();
                    debug!(
                        removed,
                        tracked = limiter.tracked_identities(),
                        "Sweep complete"
                    );
                }
                _ = &mut stop => break,
            }
        }

        info!(strategy = %limiter.strategy(), "Sweeper stopped");
    });

    SweeperHandle { shutdown, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;
    use crate::ratelimit::sliding_window::{SlidingWindowConfig, SlidingWindowLimiter};
    use crate::ratelimit::throttle::{ThrottleConfig, ThrottleLimiter};

    #[tokio::test]
    async fn test_sweeper_evicts_idle_identities() {
        let clock = Arc::new(ManualClock::new());
        let limiter: Arc<dyn RateLimiter> = Arc::new(SlidingWindowLimiter::with_clock(
            SlidingWindowConfig::default(),
            Arc::clone(&clock),
        ));

        limiter.record("A");
        limiter.record("B");
        assert_eq!(limiter.tracked_identities(), 2);

        let sweeper = spawn_sweeper(Arc::clone(&limiter), Duration::from_millis(5));
        clock.advance(Duration::from_secs(11));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(limiter.tracked_identities(), 0);
        sweeper.shutdown().await;
    }

    #[tokio::test]
    async fn test_sweeper_keeps_active_identities() {
        let clock = Arc::new(ManualClock::new());
        let limiter: Arc<dyn RateLimiter> = Arc::new(ThrottleLimiter::with_clock(
            ThrottleConfig::default(),
            Arc::clone(&clock),
        ));

        limiter.record("A");
        let sweeper = spawn_sweeper(Arc::clone(&limiter), Duration::from_millis(5));
        clock.advance(Duration::from_secs(3));
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(limiter.tracked_identities(), 1);
        assert!(!limiter.can_send("A"));
        sweeper.shutdown().await;
    }

    #[tokio::test]
    async fn test_dropping_handle_stops_sweeper() {
        let limiter: Arc<dyn RateLimiter> = Arc::new(ThrottleLimiter::new(ThrottleConfig::default()));

        let sweeper = spawn_sweeper(Arc::clone(&limiter), Duration::from_millis(5));
        let task_limiter_refs = Arc::strong_count(&limiter);
        assert_eq!(task_limiter_refs, 2);

        drop(sweeper);
        for _ in 0..100 {
            if Arc::strong_count(&limiter) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(Arc::strong_count(&limiter), 1);
    }
}
