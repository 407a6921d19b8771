//! Action invocation with repeat-policy enforcement.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::action::{ActionOutput, ActionRunner};
use crate::log::{ExecutionLog, ExecutionRecord, LAUNCH_FAILED, LogKey};
use crate::rules::Rule;
use crate::source::Message;
use crate::Result;

/// What happened when a matched rule was handed to the invoker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// The rule is `once` and has already fired; nothing was run or written.
    Skipped,
    /// The action was attempted and its outcome recorded.
    Ran(ExecutionRecord),
}

impl Invocation {
    /// Returns the record of an attempted run.
    #[must_use]
    pub const fn record(&self) -> Option<&ExecutionRecord> {
        match self {
            Self::Skipped => None,
            Self::Ran(record) => Some(record),
        }
    }
}

/// Runs actions for matched rules and records the outcome.
///
/// The check-run-record sequence is serialized, so two passes racing on the
/// same `once` rule cannot both fire it.
pub struct Invoker<R> {
    log: Arc<ExecutionLog>,
    runner: R,
    gate: Mutex<()>,
}

impl<R: ActionRunner> Invoker<R> {
    /// Creates an invoker writing to `log` and launching through `runner`.
    pub fn new(log: Arc<ExecutionLog>, runner: R) -> Self {
        Self {
            log,
            runner,
            gate: Mutex::new(()),
        }
    }

    /// Returns the execution log.
    #[must_use]
    pub const fn log(&self) -> &Arc<ExecutionLog> {
        &self.log
    }

    /// Invoke `rule`'s action for `message`.
    ///
    /// A failed launch or non-zero exit is not an error: it is recorded with
    /// its exit code (or [`LAUNCH_FAILED`]) and returned as
    /// [`Invocation::Ran`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::LogStore`](crate::Error::LogStore) if the execution
    /// log cannot be read or written. If the write fails after the action
    /// ran, the rule may run again on a later pass.
    pub async fn invoke(&self, message: &Message, rule: &Rule) -> Result<Invocation> {
        let _gate = self.gate.lock().await;
        let key = LogKey::for_rule(rule, &message.subject);

        if rule.is_once() && self.log.has(&key).await? {
            debug!(rule = %rule.name, uid = %message.uid, "Rule already fired, skipping");
            return Ok(Invocation::Skipped);
        }

        let record = match self.runner.run(&rule.action).await {
            Ok(output) => record_from_output(rule, message, output),
            Err(e) => ExecutionRecord::failed(&rule.name, &message.subject, e.to_string()),
        };

        if record.succeeded() {
            info!(rule = %rule.name, uid = %message.uid, "Action completed");
        } else {
            warn!(
                rule = %rule.name,
                uid = %message.uid,
                exit_code = record.exit_code,
                error = record.error_detail.as_deref().unwrap_or_default(),
                "Action failed"
            );
        }

        if let Err(e) = self.log.upsert(&key, &record).await {
            warn!(rule = %rule.name, "Could not record execution, rule may fire again: {e}");
            return Err(e);
        }
        Ok(Invocation::Ran(record))
    }
}

fn record_from_output(rule: &Rule, message: &Message, output: ActionOutput) -> ExecutionRecord {
    match output.exit_code {
        Some(0) => ExecutionRecord::completed(&rule.name, &message.subject, 0, None),
        Some(code) => {
            let detail = if output.stderr.is_empty() {
                format!("exited with status {code}")
            } else {
                format!("exited with status {code}: {}", output.stderr)
            };
            ExecutionRecord::completed(&rule.name, &message.subject, code, Some(detail))
        }
        None => ExecutionRecord::completed(
            &rule.name,
            &message.subject,
            LAUNCH_FAILED,
            Some("terminated by signal".to_string()),
        ),
    }
}
