//! Tracing setup: a terminal layer and a daily-rotated log file.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const CRATES: [&str; 3] = ["mailhook", "mailhook_core", "mailhook_imap"];

/// How much the terminal layer shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Debug,
}

impl Verbosity {
    pub const fn from_flags(debug: bool, quiet: bool) -> Self {
        match (debug, quiet) {
            (true, _) => Self::Debug,
            (false, true) => Self::Quiet,
            (false, false) => Self::Normal,
        }
    }

    fn directives(self) -> String {
        match self {
            Self::Quiet => "error".to_string(),
            Self::Normal => crate_directives("info"),
            Self::Debug => crate_directives("debug"),
        }
    }
}

fn crate_directives(level: &str) -> String {
    CRATES
        .iter()
        .map(|name| format!("{name}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Installs the global subscriber.
///
/// `RUST_LOG` overrides the terminal filter unless `--quiet` or `--debug`
/// was given. The file layer always records debug events from this
/// application. The returned guard flushes the file writer on drop and must
/// be held until exit.
pub fn init(verbosity: Verbosity, logfile: &Path) -> Result<WorkerGuard> {
    let console_filter = match verbosity {
        Verbosity::Normal => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(verbosity.directives())),
        _ => EnvFilter::new(verbosity.directives()),
    };

    let directory = match logfile.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let file_name = logfile
        .file_name()
        .with_context(|| format!("Log file path {} has no file name", logfile.display()))?;
    std::fs::create_dir_all(directory)
        .with_context(|| format!("Failed to create log directory {}", directory.display()))?;

    let appender = tracing_appender::rolling::daily(directory, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(console_filter))
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(EnvFilter::new(crate_directives("debug"))),
        )
        .try_init()
        .context("Failed to install the tracing subscriber")?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags() {
        assert_eq!(Verbosity::from_flags(false, false), Verbosity::Normal);
        assert_eq!(Verbosity::from_flags(true, false), Verbosity::Debug);
        assert_eq!(Verbosity::from_flags(false, true), Verbosity::Quiet);
    }

    #[test]
    fn test_directives() {
        assert_eq!(
            Verbosity::Normal.directives(),
            "mailhook=info,mailhook_core=info,mailhook_imap=info"
        );
        assert_eq!(Verbosity::Quiet.directives(), "error");
        assert!(Verbosity::Debug.directives().contains("mailhook_imap=debug"));
    }
}
