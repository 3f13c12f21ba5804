//! Synthetic traffic driver.
//!
//! Sends rounds of messages from a small pool of users through a limiter,
//! pausing a random delay between messages and a longer pause between
//! rounds, and records every admission decision.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::SimulationConfig;
use crate::ratelimit::{ManualClock, RateLimiter, Strategy};

/// How the simulation lets time pass.
#[derive(Clone)]
pub enum Pacing {
    /// Sleep on the tokio timer
    RealTime,
    /// Advance a manual clock shared with the limiter; runs instantly
    Virtual(Arc<ManualClock>),
}

impl Pacing {
    async fn wait(&self, delay: Duration) {
        if delay.is_zero() {
            return;
        }
        match self {
            Pacing::RealTime => tokio::time::sleep(delay).await,
            Pacing::Virtual(clock) => clock.advance(delay),
        }
    }
}

/// The decision made for one simulated message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageOutcome {
    /// Round the message belongs to, starting at 1
    pub round: u32,
    /// Sequential message id across all rounds, starting at 1
    pub message_id: u32,
    /// Sending user
    pub user: String,
    /// Whether the limiter admitted the message
    pub accepted: bool,
    /// Wait reported right after the decision, in milliseconds
    pub wait_ms: u64,
}

/// Summary of a simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub strategy: Strategy,
    pub accepted: usize,
    pub rejected: usize,
    pub outcomes: Vec<MessageOutcome>,
}

/// Drives synthetic traffic through a limiter.
pub struct Simulation {
    limiter: Arc<dyn RateLimiter>,
    config: SimulationConfig,
    /// Pause between rounds
    pause: Duration,
    pacing: Pacing,
}

impl Simulation {
    /// Create a simulation that sleeps in real time.
    pub fn new(limiter: Arc<dyn RateLimiter>, config: SimulationConfig, pause: Duration) -> Self {
        Self {
            limiter,
            config,
            pause,
            pacing: Pacing::RealTime,
        }
    }

    /// Replace how the simulation lets time pass.
    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// Run every round and collect the outcomes.
    pub async fn run(&self) -> SimulationReport {
        let mut outcomes = Vec::new();
        let mut message_id = 0;

        for round in 1..=self.config.rounds {
            if round > 1 {
                info!(pause = ?self.pause, "Waiting before next round");
                self.pacing.wait(self.pause).await;
            }
            info!(round, strategy = %self.limiter.strategy(), "Starting round");

            for _ in 0..self.config.messages_per_round {
                message_id += 1;
                let outcome = self.send(round, message_id);
                outcomes.push(outcome);

                let delay = self.next_delay();
                debug!(delay = ?delay, "Delaying next message");
                self.pacing.wait(delay).await;
            }
        }

        let accepted = outcomes.iter().filter(|o| o.accepted).count();
        let rejected = outcomes.len() - accepted;
        info!(accepted, rejected, "Simulation finished");

        SimulationReport {
            strategy: self.limiter.strategy(),
            accepted,
            rejected,
            outcomes,
        }
    }

    fn send(&self, round: u32, message_id: u32) -> MessageOutcome {
        let user = user_for(message_id, self.config.users);
        let accepted = self.limiter.record(&user);
        let wait = self.limiter.time_until_next_allowed(&user);

        if accepted {
            info!(message_id, user = %user, "Message accepted");
        } else {
            info!(
                message_id,
                user = %user,
                wait_secs = wait.as_secs_f64(),
                "Message rejected"
            );
        }

        MessageOutcome {
            round,
            message_id,
            user,
            accepted,
            wait_ms: wait.as_millis() as u64,
        }
    }

    fn next_delay(&self) -> Duration {
        let (min, max) = (self.config.min_delay_ms, self.config.max_delay_ms);
        if min >= max {
            return Duration::from_millis(min);
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }
}

/// Users cycle through `1..=users` as message ids increase.
fn user_for(message_id: u32, users: u32) -> String {
    (message_id % users.max(1) + 1).to_string()
}
