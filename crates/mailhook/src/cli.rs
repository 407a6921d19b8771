//! Command-line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use mailhook_core::OperatingMode;

#[derive(Debug, Parser)]
#[command(
    name = "mailhook",
    version,
    about = "Run local programs when incoming mail matches configured rules"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Log debug output to the terminal
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub debug: bool,

    /// Only log errors to the terminal
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log file (rotated daily, always at debug level)
    #[arg(short, long, global = true, default_value = "mailhook.log")]
    pub logfile: PathBuf,

    /// Configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    pub config: PathBuf,

    /// Override the configured run mode
    #[arg(short = 'm', long, global = true, value_enum)]
    pub force_mode: Option<ModeArg>,

    /// Fetch messages one at a time (slower, lower memory)
    #[arg(short, long, global = true)]
    pub slow: bool,
}

impl Cli {
    /// The subcommand to execute, `run` when none was given.
    pub fn command(&self) -> Commands {
        self.command.unwrap_or(Commands::Run)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Execute the configured mode(s)
    Run,
    /// Validate the configuration and rules without touching the mailbox
    Check,
    /// Show which rule each message in the history window would trigger
    Preview,
    /// Print the execution log
    Log,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// One sweep over recent mail
    History,
    /// Watch for new mail
    Polling,
    /// A sweep followed by polling
    All,
}

impl From<ModeArg> for OperatingMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::History => Self::History,
            ModeArg::Polling => Self::Polling,
            ModeArg::All => Self::Both,
        }
    }
}
