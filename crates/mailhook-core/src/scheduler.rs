//! History sweeps and the background polling loop.
//!
//! A [`Scheduler`] owns the mail source, the rule engine and the invoker.
//! It drives them in two ways:
//!
//! - [`run_history_sweep`](Scheduler::run_history_sweep): one pass over the
//!   most recent `history_limit` messages using `history` rules.
//! - [`start_polling`](Scheduler::start_polling): a timer task that calls
//!   [`poll_once`](Scheduler::poll_once) every `poll_interval`, firing
//!   `polling` rules for newly arrived mail.
//!
//! # Polling state
//!
//! ```text
//! Idle ──start──▶ Polling ──pause──▶ Paused
//!                    ▲                 │
//!                    └─────resume──────┘
//!        any ──stop──▶ Stopped
//! ```
//!
//! Polling only looks at the newest message of each window. If several
//! messages arrive within one interval, only the newest is evaluated.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::action::ActionRunner;
use crate::engine::RuleEngine;
use crate::invoker::{Invocation, Invoker};
use crate::log::LogKey;
use crate::rules::OperatingMode;
use crate::source::{FetchOrder, MailSource, Message, Uid};
use crate::{Error, Result};

/// Default number of messages examined by a history sweep.
pub const DEFAULT_HISTORY_LIMIT: usize = 500;

/// Default number of messages fetched per polling tick.
pub const DEFAULT_POLL_WINDOW: usize = 50;

/// Default polling period.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Fetch sizes and timing for the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleSettings {
    /// Messages fetched by a history sweep.
    pub history_limit: usize,
    /// Messages fetched per polling tick.
    pub poll_window: usize,
    /// Time between polling ticks.
    pub poll_interval: Duration,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            poll_window: DEFAULT_POLL_WINDOW,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Lifecycle of the polling side of a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollStatus {
    /// Polling has not been started.
    #[default]
    Idle,
    /// The timer task is running and ticks are processed.
    Polling,
    /// The timer task is running but ticks are skipped.
    Paused,
    /// Polling has been stopped for good.
    Stopped,
}

impl PollStatus {
    /// Get string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Polling => "polling",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for PollStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
struct PollState {
    status: PollStatus,
    last_seen: Option<Uid>,
}

/// A matched rule and what the invoker did with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    /// Name of the matched rule.
    pub rule: String,
    /// Invocation outcome.
    pub invocation: Invocation,
}

/// Result of one polling tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The mailbox is empty; the cursor was left alone.
    Empty,
    /// First non-empty tick: the cursor was set, nothing was evaluated.
    Primed(Uid),
    /// The newest uid has not changed since the last tick.
    Unchanged(Uid),
    /// A new newest message was seen and evaluated.
    Arrived {
        /// Uid of the newest message.
        uid: Uid,
        /// The matched rule, if any.
        dispatch: Option<Dispatch>,
    },
}

/// Counters for one history sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    /// Messages returned by the source.
    pub fetched: usize,
    /// Messages that matched a rule.
    pub matched: usize,
    /// Actions that exited with status 0.
    pub succeeded: usize,
    /// Actions that failed to launch or exited non-zero.
    pub failed: usize,
    /// `once` rules that had already fired.
    pub skipped: usize,
    /// Invocations that could not be recorded.
    pub errors: usize,
    /// The sweep was stopped before reaching the end of the window.
    pub interrupted: bool,
}

impl SweepReport {
    fn record(&mut self, invocation: &Invocation) {
        self.matched += 1;
        match invocation {
            Invocation::Skipped => self.skipped += 1,
            Invocation::Ran(record) if record.succeeded() => self.succeeded += 1,
            Invocation::Ran(_) => self.failed += 1,
        }
    }
}

/// One line of a dry-run over the history window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewRow {
    /// Message uid.
    pub uid: Uid,
    /// Sender address.
    pub sender: String,
    /// Subject line.
    pub subject: String,
    /// Rule a sweep would hand this message to.
    pub rule: Option<String>,
    /// True if that rule is `once` and has already fired.
    pub already_fired: bool,
}

/// Drives history sweeps and polling over one mailbox.
pub struct Scheduler<S, R> {
    source: S,
    engine: RuleEngine,
    invoker: Invoker<R>,
    settings: ScheduleSettings,
    state: Mutex<PollState>,
    wake: Notify,
}

impl<S: MailSource, R: ActionRunner> Scheduler<S, R> {
    /// Creates a scheduler in the [`PollStatus::Idle`] state.
    pub fn new(
        source: S,
        engine: RuleEngine,
        invoker: Invoker<R>,
        settings: ScheduleSettings,
    ) -> Self {
        Self {
            source,
            engine,
            invoker,
            settings,
            state: Mutex::new(PollState::default()),
            wake: Notify::new(),
        }
    }

    /// Returns the mail source.
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// Consumes the scheduler and returns the mail source.
    pub fn into_source(self) -> S {
        self.source
    }

    /// Returns the scheduler settings.
    pub const fn settings(&self) -> &ScheduleSettings {
        &self.settings
    }

    /// Returns the polling status.
    pub async fn status(&self) -> PollStatus {
        self.state.lock().await.status
    }

    /// Returns the newest uid seen by polling, if any.
    pub async fn last_seen(&self) -> Option<Uid> {
        self.state.lock().await.last_seen
    }

    /// Runs one pass over the history window.
    ///
    /// Messages are processed in fetch order (newest first). An invocation
    /// that cannot be recorded is logged and counted in
    /// [`SweepReport::errors`]; the sweep carries on with the next message.
    /// After [`stop_polling`](Self::stop_polling) the sweep ends before the
    /// next message and sets [`SweepReport::interrupted`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Source`] if the window cannot be fetched.
    pub async fn run_history_sweep(&self) -> Result<SweepReport> {
        let messages = self
            .source
            .fetch(self.settings.history_limit, FetchOrder::NewestFirst)
            .await?;
        info!(count = messages.len(), "History sweep started");

        let mut report = SweepReport {
            fetched: messages.len(),
            ..SweepReport::default()
        };

        for (done, message) in messages.iter().enumerate() {
            if self.status().await == PollStatus::Stopped {
                report.interrupted = true;
                warn!(remaining = messages.len() - done, "History sweep stopped early");
                break;
            }
            match self.dispatch(message, OperatingMode::History).await {
                Ok(Some(dispatch)) => report.record(&dispatch.invocation),
                Ok(None) => {}
                Err(e) => {
                    report.matched += 1;
                    report.errors += 1;
                    warn!(uid = %message.uid, "Skipping message: {e}");
                }
            }
        }

        info!(
            fetched = report.fetched,
            matched = report.matched,
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            errors = report.errors,
            "History sweep finished"
        );
        Ok(report)
    }

    /// Evaluates the history window without running anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the window cannot be fetched or the execution log
    /// cannot be read.
    pub async fn preview_history(&self) -> Result<Vec<PreviewRow>> {
        let messages = self
            .source
            .fetch(self.settings.history_limit, FetchOrder::NewestFirst)
            .await?;

        let mut rows = Vec::with_capacity(messages.len());
        for message in messages {
            let rule = self.engine.evaluate(&message, Some(OperatingMode::History));
            let already_fired = match rule {
                Some(rule) if rule.is_once() => {
                    let key = LogKey::for_rule(rule, &message.subject);
                    self.invoker.log().has(&key).await?
                }
                _ => false,
            };
            rows.push(PreviewRow {
                uid: message.uid,
                rule: rule.map(|rule| rule.name.clone()),
                already_fired,
                sender: message.sender,
                subject: message.subject,
            });
        }
        Ok(rows)
    }

    /// Runs one polling tick.
    ///
    /// The cursor moves to the newest uid of the window before the message is
    /// evaluated, so a message whose invocation fails is not retried.
    ///
    /// # Errors
    ///
    /// Returns an error if the window cannot be fetched or the invocation
    /// cannot be recorded.
    pub async fn poll_once(&self) -> Result<PollOutcome> {
        let messages = self
            .source
            .fetch(self.settings.poll_window, FetchOrder::NewestFirst)
            .await?;

        let Some(newest) = messages.iter().max_by_key(|message| message.uid) else {
            debug!("Mailbox is empty");
            return Ok(PollOutcome::Empty);
        };

        let previous = self.state.lock().await.last_seen.replace(newest.uid);
        match previous {
            None => {
                info!(uid = %newest.uid, "Polling cursor primed");
                Ok(PollOutcome::Primed(newest.uid))
            }
            Some(previous) if previous == newest.uid => Ok(PollOutcome::Unchanged(newest.uid)),
            Some(previous) => {
                info!(from = %previous, to = %newest.uid, "New message");
                let dispatch = self.dispatch(newest, OperatingMode::Polling).await?;
                Ok(PollOutcome::Arrived {
                    uid: newest.uid,
                    dispatch,
                })
            }
        }
    }

    /// Pauses polling. Ticks are skipped until [`resume_polling`](Self::resume_polling).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] if polling is idle or stopped.
    pub async fn pause_polling(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        match state.status {
            PollStatus::Polling => {
                state.status = PollStatus::Paused;
                info!("Polling paused");
                Ok(())
            }
            PollStatus::Paused => {
                debug!("Polling already paused");
                Ok(())
            }
            status => Err(Error::InvalidTransition {
                action: "pause",
                status,
            }),
        }
    }

    /// Resumes paused polling.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] if polling is idle or stopped.
    pub async fn resume_polling(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        match state.status {
            PollStatus::Paused => {
                state.status = PollStatus::Polling;
                info!("Polling resumed");
                Ok(())
            }
            PollStatus::Polling => {
                debug!("Polling already running");
                Ok(())
            }
            status => Err(Error::InvalidTransition {
                action: "resume",
                status,
            }),
        }
    }

    /// Stops polling and wakes the timer task. Also ends a history sweep
    /// in progress once its current message is done.
    ///
    /// A tick already in progress finishes first; await the handle returned
    /// by [`start_polling`](Self::start_polling) to wait for it.
    pub async fn stop_polling(&self) {
        let mut state = self.state.lock().await;
        if state.status == PollStatus::Stopped {
            debug!("Polling already stopped");
            return;
        }
        state.status = PollStatus::Stopped;
        drop(state);
        self.wake.notify_one();
        info!("Polling stopping");
    }

    async fn dispatch(&self, message: &Message, pass: OperatingMode) -> Result<Option<Dispatch>> {
        let Some(rule) = self.engine.evaluate(message, Some(pass)) else {
            return Ok(None);
        };
        let invocation = self.invoker.invoke(message, rule).await?;
        Ok(Some(Dispatch {
            rule: rule.name.clone(),
            invocation,
        }))
    }
}

impl<S, R> Scheduler<S, R>
where
    S: MailSource + 'static,
    R: ActionRunner + 'static,
{
    /// Spawns the polling timer task.
    ///
    /// The first tick runs immediately and primes the cursor. Tick errors are
    /// logged and do not end the loop.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] unless polling is idle.
    pub async fn start_polling(self: &Arc<Self>) -> Result<JoinHandle<()>> {
        {
            let mut state = self.state.lock().await;
            if state.status != PollStatus::Idle {
                return Err(Error::InvalidTransition {
                    action: "start",
                    status: state.status,
                });
            }
            state.status = PollStatus::Polling;
        }

        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let period = scheduler.settings.poll_interval;
            info!("Polling started, every {}s", period.as_secs_f64());

            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    () = scheduler.wake.notified() => {}
                }

                match scheduler.status().await {
                    PollStatus::Stopped => break,
                    PollStatus::Paused => {
                        debug!("Polling paused, tick skipped");
                        continue;
                    }
                    PollStatus::Idle | PollStatus::Polling => {}
                }

                if let Err(e) = scheduler.poll_once().await {
                    error!("Polling tick failed: {e}");
                }
            }
            info!("Polling stopped");
        });
        Ok(handle)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::action::{ActionOutput, LaunchError};
    use crate::log::ExecutionLog;
    use crate::rules::RuleSet;
    use crate::source::SourceError;

    /// Source replaying a list of windows, repeating the last one.
    #[derive(Default)]
    struct ScriptedSource {
        windows: std::sync::Mutex<VecDeque<Vec<Message>>>,
        fetches: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(windows: Vec<Vec<Message>>) -> Self {
            Self {
                windows: std::sync::Mutex::new(windows.into()),
                fetches: AtomicUsize::new(0),
            }
        }
    }

    impl MailSource for ScriptedSource {
        async fn fetch(
            &self,
            _limit: usize,
            _order: FetchOrder,
        ) -> std::result::Result<Vec<Message>, SourceError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let mut windows = self.windows.lock().unwrap();
            if windows.len() > 1 {
                Ok(windows.pop_front().unwrap_or_default())
            } else {
                Ok(windows.front().cloned().unwrap_or_default())
            }
        }
    }

    struct NoopRunner;

    impl ActionRunner for NoopRunner {
        async fn run(&self, _path: &str) -> std::result::Result<ActionOutput, LaunchError> {
            Ok(ActionOutput {
                exit_code: Some(0),
                stderr: String::new(),
            })
        }
    }

    async fn scheduler(source: ScriptedSource) -> Arc<Scheduler<ScriptedSource, NoopRunner>> {
        let log = Arc::new(ExecutionLog::in_memory().await.unwrap());
        let settings = ScheduleSettings {
            poll_interval: Duration::from_secs(1),
            ..ScheduleSettings::default()
        };
        Arc::new(Scheduler::new(
            source,
            RuleEngine::new(RuleSet::default()),
            Invoker::new(log, NoopRunner),
            settings,
        ))
    }

    /// Lets the polling task run; with the clock paused the sleep
    /// auto-advances once every task is idle.
    async fn settle() {
        time::sleep(Duration::from_millis(10)).await;
    }

    fn window(uids: &[u32]) -> Vec<Message> {
        uids.iter()
            .map(|&uid| Message::new(uid, "a@example.com", format!("message {uid}"), ""))
            .collect()
    }

    #[test]
    fn test_default_settings() {
        let settings = ScheduleSettings::default();
        assert_eq!(settings.history_limit, 500);
        assert_eq!(settings.poll_window, 50);
        assert_eq!(settings.poll_interval, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_empty_mailbox_leaves_cursor_alone() {
        let scheduler = scheduler(ScriptedSource::new(vec![vec![], window(&[3])])).await;

        assert_eq!(scheduler.poll_once().await.unwrap(), PollOutcome::Empty);
        assert_eq!(scheduler.last_seen().await, None);
        assert_eq!(scheduler.poll_once().await.unwrap(), PollOutcome::Primed(Uid(3)));
        assert_eq!(scheduler.last_seen().await, Some(Uid(3)));
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let scheduler = scheduler(ScriptedSource::default()).await;
        let handle = scheduler.start_polling().await.unwrap();

        let err = scheduler.start_polling().await.unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidTransition {
                action: "start",
                status: PollStatus::Polling
            }
        ));

        scheduler.stop_polling().await;
        handle.await.unwrap();
        assert!(scheduler.start_polling().await.is_err());
    }

    #[tokio::test]
    async fn test_pause_and_resume_are_idempotent() {
        let scheduler = scheduler(ScriptedSource::default()).await;
        assert!(scheduler.pause_polling().await.is_err());
        assert!(scheduler.resume_polling().await.is_err());

        let handle = scheduler.start_polling().await.unwrap();
        scheduler.resume_polling().await.unwrap();
        assert_eq!(scheduler.status().await, PollStatus::Polling);

        scheduler.pause_polling().await.unwrap();
        scheduler.pause_polling().await.unwrap();
        assert_eq!(scheduler.status().await, PollStatus::Paused);

        scheduler.resume_polling().await.unwrap();
        assert_eq!(scheduler.status().await, PollStatus::Polling);

        scheduler.stop_polling().await;
        scheduler.stop_polling().await;
        assert_eq!(scheduler.status().await, PollStatus::Stopped);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_paused_ticks_do_not_fetch() {
        let scheduler = scheduler(ScriptedSource::new(vec![window(&[1])])).await;
        time::pause();

        let handle = scheduler.start_polling().await.unwrap();
        settle().await;
        // First tick fires immediately.
        assert_eq!(scheduler.source().fetches.load(Ordering::SeqCst), 1);

        scheduler.pause_polling().await.unwrap();
        for _ in 0..5 {
            time::advance(Duration::from_secs(1)).await;
            settle().await;
        }
        assert_eq!(scheduler.source().fetches.load(Ordering::SeqCst), 1);

        scheduler.resume_polling().await.unwrap();
        time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(scheduler.source().fetches.load(Ordering::SeqCst), 2);

        scheduler.stop_polling().await;
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_ends_task_without_waiting_for_tick() {
        let scheduler = scheduler(ScriptedSource::new(vec![window(&[1])])).await;
        time::pause();

        let handle = scheduler.start_polling().await.unwrap();
        settle().await;
        scheduler.stop_polling().await;
        settle().await;

        assert!(handle.is_finished());
        assert_eq!(scheduler.source().fetches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_status_display() {
        assert_eq!(PollStatus::Paused.to_string(), "paused");
        let err = Error::InvalidTransition {
            action: "pause",
            status: PollStatus::Stopped,
        };
        assert_eq!(err.to_string(), "Cannot pause polling while stopped");
    }
}
