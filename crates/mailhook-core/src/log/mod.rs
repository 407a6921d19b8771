//! Execution log - durable record of fired actions.
//!
//! The log is what makes `once` rules idempotent across sweeps and restarts:
//! before running a `once` rule the invoker asks whether a record already
//! exists for it, and after every attempt it upserts the outcome.
//!
//! # Keying
//!
//! - `once` rules are keyed by rule name alone ([`LogKey::Rule`]), so the
//!   rule fires at most one time for the lifetime of the log even if a
//!   *different* message matches later.
//! - `every_match` rules are keyed by rule name and matched subject
//!   ([`LogKey::Message`]); re-firing on the same subject updates the
//!   existing record.

mod model;
mod repository;

pub use model::{ExecutionRecord, LAUNCH_FAILED, LogKey};
pub use repository::ExecutionLog;
