//! Floodgate - Per-identity request admission
//!
//! This crate decides whether a request tagged with an identity (a user,
//! client or key) may proceed under a rate policy, and how long that identity
//! must wait before its next request is admitted. Two interchangeable
//! strategies are provided: a sliding time-window counter and a fixed
//! minimum-interval throttle.

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod simulation;
