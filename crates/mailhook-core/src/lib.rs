//! # mailhook-core
//!
//! Rule-matching, scheduling and idempotent-invocation engine for `mailhook`.
//!
//! This crate provides:
//! - **Rules**: validated, compiled rule definitions ([`RuleSet`])
//! - **Engine**: first-match-wins evaluation of a message against the rules
//! - **Invoker**: runs a rule's action and records the outcome, honouring the
//!   rule's repeat policy
//! - **Execution log**: `SQLite`-backed record of fired actions
//! - **Scheduler**: one-shot history sweeps and a background polling loop
//!
//! The mailbox and the action launcher are collaborators behind the
//! [`MailSource`] and [`ActionRunner`] traits.
//!
//! ## Flow
//!
//! ```text
//! MailSource ──fetch──▶ Scheduler ──message──▶ RuleEngine
//!                           │                      │
//!                           ◀──────── rule ────────┘
//!                           │
//!                           └──(message, rule)──▶ Invoker ──▶ ActionRunner
//!                                                   │
//!                                                   └──has / upsert──▶ ExecutionLog
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod action;
pub mod engine;
mod error;
pub mod invoker;
pub mod log;
pub mod rules;
pub mod scheduler;
pub mod source;

pub use action::{ActionOutput, ActionRunner, LaunchError, ProcessRunner};
pub use engine::{MatchResult, RuleEngine};
pub use error::{ConfigError, Error, Result};
pub use invoker::{Invocation, Invoker};
pub use log::{ExecutionLog, ExecutionRecord, LAUNCH_FAILED, LogKey};
pub use rules::{ContentTarget, OperatingMode, RawRule, RepeatPolicy, Rule, RuleSet};
pub use scheduler::{
    Dispatch, PollOutcome, PollStatus, PreviewRow, ScheduleSettings, Scheduler, SweepReport,
};
pub use source::{FetchOrder, MailSource, Message, SourceError, Uid};
