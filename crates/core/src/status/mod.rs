//! Provider health tracking and escalating backoff.
//!
//! A provider moves from healthy to degraded on each failure, with its
//! suspension window growing with the escalation level. Any success returns
//! it to healthy.

mod tracker;
mod types;

pub use tracker::StatusTracker;
pub use types::{BackoffPolicy, ProviderStatus};
