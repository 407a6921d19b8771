//! Configuration file and credentials.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use mailhook_core::{OperatingMode, RawRule, RuleSet, ScheduleSettings};
use mailhook_imap::Security;
use serde::Deserialize;

/// Environment variable holding the mailbox login.
pub const ADDRESS_VAR: &str = "MAIL_ADDR";

/// Environment variable holding the mailbox password.
pub const PASSWORD_VAR: &str = "MAIL_PWD";

/// Optional file of `NAME=value` lines read next to the config file.
pub const ENV_FILE: &str = ".env";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub mail: MailConfig,
    pub rules: Vec<RawRule>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub run_mode: String,
    pub history_limit: usize,
    pub poll_window: usize,
    pub poll_interval_secs: u64,
    /// Stop polling after this many seconds; 0 polls until interrupted.
    pub poll_timeout_secs: u64,
    pub log_db: PathBuf,
    pub actions_dir: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        let schedule = ScheduleSettings::default();
        Self {
            run_mode: "all".to_string(),
            history_limit: schedule.history_limit,
            poll_window: schedule.poll_window,
            poll_interval_secs: schedule.poll_interval.as_secs(),
            poll_timeout_secs: 0,
            log_db: PathBuf::from("mailhook.db"),
            actions_dir: PathBuf::from("scripts"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub host: String,
    /// Defaults to the standard port for `security`.
    pub port: Option<u16>,
    pub security: String,
    pub mailbox: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            host: "imap.gmail.com".to_string(),
            port: None,
            security: "tls".to_string(),
            mailbox: "INBOX".to_string(),
        }
    }
}

impl AppConfig {
    /// Reads and parses a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        if config.general.poll_interval_secs == 0 {
            bail!("general.poll_interval_secs must be at least 1");
        }
        Ok(config)
    }

    /// Validates the rules in declaration order.
    pub fn rule_set(&self) -> Result<RuleSet> {
        RuleSet::validate(self.rules.clone()).context("Invalid rule configuration")
    }

    /// The run mode, with `forced` taking precedence over the file.
    pub fn run_mode(&self, forced: Option<OperatingMode>) -> Result<OperatingMode> {
        if let Some(mode) = forced {
            return Ok(mode);
        }
        OperatingMode::parse(&self.general.run_mode).with_context(|| {
            format!(
                "general.run_mode '{}' is not one of {}",
                self.general.run_mode,
                OperatingMode::EXPECTED
            )
        })
    }

    pub const fn schedule(&self) -> ScheduleSettings {
        ScheduleSettings {
            history_limit: self.general.history_limit,
            poll_window: self.general.poll_window,
            poll_interval: Duration::from_secs(self.general.poll_interval_secs),
        }
    }

    pub const fn poll_timeout(&self) -> Option<Duration> {
        match self.general.poll_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn imap(&self) -> Result<mailhook_imap::Config> {
        let security = Security::parse(&self.mail.security).with_context(|| {
            format!(
                "mail.security '{}' is not one of tls, plain",
                self.mail.security
            )
        })?;
        if self.mail.host.trim().is_empty() {
            bail!("mail.host is empty");
        }
        let mut imap = mailhook_imap::Config::with_security(self.mail.host.trim(), security)
            .mailbox(&self.mail.mailbox);
        if let Some(port) = self.mail.port {
            imap = imap.port(port);
        }
        Ok(imap)
    }
}

/// Resolves `path` against the directory holding the config file.
pub fn relative_to(config_path: &Path, path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path.to_path_buf(),
    }
}

/// Mailbox login read from the environment or a `.env` file.
pub struct Credentials {
    pub address: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl Credentials {
    /// Reads the login from the environment, falling back to the `.env` file
    /// beside `config_path`.
    pub fn load(config_path: &Path) -> Result<Self> {
        let file = read_env_file(&relative_to(config_path, Path::new(ENV_FILE)))?;
        Self::from_lookup(|name| std::env::var(name).ok().or_else(|| file.get(name).cloned()))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let read = |name: &str| match lookup(name) {
            Some(value) if !value.trim().is_empty() => Ok(value),
            _ => bail!("{name} is not set"),
        };
        Ok(Self {
            address: read(ADDRESS_VAR)?,
            password: read(PASSWORD_VAR)?,
        })
    }
}

/// Parses a dotenv file without touching the process environment. A missing
/// file yields no variables.
fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    match dotenvy::from_path_iter(path) {
        Ok(entries) => entries
            .collect::<Result<_, _>>()
            .with_context(|| format!("Invalid env file {}", path.display())),
        Err(e) if e.not_found() => Ok(HashMap::new()),
        Err(e) => Err(e).with_context(|| format!("Failed to read env file {}", path.display())),
    }
}
