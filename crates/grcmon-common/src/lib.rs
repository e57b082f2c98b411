//! Shared domain model for the compliance monitoring core.
//!
//! Everything the worker, the store and the alerting crates pass between
//! each other lives here: tests and their schedules, runs, results, alert
//! rules, alerts and delivery intents, plus the clock and id sources.

pub mod clock;
pub mod error;
pub mod id;
pub mod types;
