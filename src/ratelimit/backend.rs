//! Rate limiter trait shared by every admission strategy.

use std::time::Duration;

use super::strategy::Strategy;

/// Trait for rate limiter implementations.
///
/// A deployment picks one strategy per use site; callers only see this
/// capability. Every operation is total: a `false` admission is a normal
/// outcome, not an error.
pub trait RateLimiter: Send + Sync {
    /// Whether a request for `id` would be admitted right now.
    fn can_send(&self, id: &str) -> bool;

    /// Admit a request for `id` if allowed, recording it.
    ///
    /// Returns `true` when the request was accepted.
    fn record(&self, id: &str) -> bool;

    /// How long `id` must wait before its next request can be admitted.
    fn time_until_next_allowed(&self, id: &str) -> Duration;

    /// Drop every identity whose state can no longer affect a decision.
    ///
    /// Returns the number of identities removed.
    fn purge_expired(&self) -> usize;

    /// Number of identities currently holding state.
    fn tracked_identities(&self) -> usize;

    /// Drop all state.
    fn clear(&self);

    /// The strategy this limiter implements.
    fn strategy(&self) -> Strategy;
}
