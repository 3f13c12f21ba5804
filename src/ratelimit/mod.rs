//! Rate limiting logic and state management.

mod backend;
mod clock;
mod identity;
mod sliding_window;
mod strategy;
mod sweeper;
mod throttle;

pub use backend::RateLimiter;
pub use clock::{Clock, ManualClock, SystemClock};
pub use identity::IdentityKey;
pub use sliding_window::{SlidingWindowConfig, SlidingWindowLimiter};
pub use strategy::{build_limiter, build_limiter_with_clock, Strategy};
pub use sweeper::{spawn_sweeper, SweeperHandle};
pub use throttle::{ThrottleConfig, ThrottleLimiter};
