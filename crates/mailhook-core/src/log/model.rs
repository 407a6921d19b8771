//! Execution log data models.

use chrono::{DateTime, Utc};

use crate::rules::{RepeatPolicy, Rule};

/// Exit code recorded when an action could not be started or did not exit
/// normally.
pub const LAUNCH_FAILED: i32 = -1;

/// Key under which an execution is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogKey {
    /// One record per rule (`once` rules).
    Rule(String),
    /// One record per rule and matched subject (`every_match` rules).
    Message {
        /// Rule name.
        rule: String,
        /// Subject of the matched message.
        subject: String,
    },
}

impl LogKey {
    /// Derives the key for `rule` firing on a message with `subject`.
    #[must_use]
    pub fn for_rule(rule: &Rule, subject: &str) -> Self {
        match rule.repeat {
            RepeatPolicy::Once => Self::Rule(rule.name.clone()),
            RepeatPolicy::EveryMatch => Self::Message {
                rule: rule.name.clone(),
                subject: subject.to_string(),
            },
        }
    }

    /// Rule name part of the key.
    #[must_use]
    pub fn rule_name(&self) -> &str {
        match self {
            Self::Rule(rule) | Self::Message { rule, .. } => rule,
        }
    }

    /// Scope column value. Rule-wide keys use a value no subject key can take.
    pub(crate) fn scope(&self) -> String {
        match self {
            Self::Rule(_) => "*".to_string(),
            Self::Message { subject, .. } => format!("subject:{subject}"),
        }
    }
}

/// Outcome of one invocation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRecord {
    /// Name of the rule that fired.
    pub rule_name: String,
    /// Subject of the message that triggered it.
    pub matched_subject: String,
    /// When the attempt finished.
    pub timestamp: DateTime<Utc>,
    /// Exit code, or [`LAUNCH_FAILED`].
    pub exit_code: i32,
    /// Why the attempt failed, if it did.
    pub error_detail: Option<String>,
}

impl ExecutionRecord {
    /// Record of an action that exited with `exit_code`.
    #[must_use]
    pub fn completed(
        rule_name: impl Into<String>,
        matched_subject: impl Into<String>,
        exit_code: i32,
        error_detail: Option<String>,
    ) -> Self {
        Self {
            rule_name: rule_name.into(),
            matched_subject: matched_subject.into(),
            timestamp: Utc::now(),
            exit_code,
            error_detail,
        }
    }

    /// Record of an action that could not be started or completed.
    #[must_use]
    pub fn failed(
        rule_name: impl Into<String>,
        matched_subject: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::completed(rule_name, matched_subject, LAUNCH_FAILED, Some(detail.into()))
    }

    /// Returns true if the action exited with status 0.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}
