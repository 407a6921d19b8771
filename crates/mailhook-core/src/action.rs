//! External action launcher.
//!
//! The core treats an action as "execute the program at this path and report
//! how it exited". [`ProcessRunner`] is the default implementation.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

/// Maximum number of stderr bytes kept for an execution record.
const STDERR_TAIL: usize = 512;

/// How an action exited.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActionOutput {
    /// Exit code, or `None` if the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Trailing part of the process's standard error.
    pub stderr: String,
}

impl ActionOutput {
    /// Returns true if the action exited with status 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// The action could not be started.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    /// Spawning the process failed (missing file, permissions, ...).
    #[error("failed to launch {path}: {source}")]
    Spawn {
        /// Resolved program path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Something that can run an action by path.
pub trait ActionRunner: Send + Sync {
    /// Runs the program at `path` and waits for it to exit.
    ///
    /// # Errors
    ///
    /// Returns an error if the program could not be started.
    fn run(&self, path: &str) -> impl Future<Output = Result<ActionOutput, LaunchError>> + Send;
}

/// Runs actions as child processes.
///
/// Relative action paths are resolved against the actions directory when one
/// is configured, otherwise against the working directory.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    actions_dir: Option<PathBuf>,
}

impl ProcessRunner {
    /// Creates a runner resolving paths against the working directory.
    #[must_use]
    pub const fn new() -> Self {
        Self { actions_dir: None }
    }

    /// Sets the directory relative action paths are resolved against.
    #[must_use]
    pub fn with_actions_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.actions_dir = Some(dir.into());
        self
    }

    /// Resolves an action path.
    #[must_use]
    pub fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        match &self.actions_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl ActionRunner for ProcessRunner {
    async fn run(&self, path: &str) -> Result<ActionOutput, LaunchError> {
        let program = self.resolve(path);
        debug!(program = %program.display(), "Launching action");

        let output = Command::new(&program)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| LaunchError::Spawn {
                path: program.clone(),
                source,
            })?;

        if !output.stdout.is_empty() {
            debug!(
                program = %program.display(),
                stdout = %String::from_utf8_lossy(&output.stdout).trim_end(),
                "Action output"
            );
        }

        Ok(ActionOutput {
            exit_code: output.status.code(),
            stderr: tail(&String::from_utf8_lossy(&output.stderr), STDERR_TAIL),
        })
    }
}

/// Keeps the last `max` bytes of `text`, cut on a character boundary.
fn tail(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.len() <= max {
        return text.to_string();
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}
