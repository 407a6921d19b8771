//! Rule data models.

use std::fmt;

use regex::Regex;
use serde::Deserialize;

use crate::source::Message;

/// When a rule is eligible to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperatingMode {
    /// Only during a history sweep.
    History,
    /// Only during a polling check.
    Polling,
    /// During both.
    #[default]
    Both,
}

impl OperatingMode {
    /// Accepted configuration spellings.
    pub const EXPECTED: &'static str = "history, polling, both";

    /// Parse from configuration string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "history" => Some(Self::History),
            "polling" => Some(Self::Polling),
            "both" | "all" => Some(Self::Both),
            _ => None,
        }
    }

    /// Convert to configuration string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::History => "history",
            Self::Polling => "polling",
            Self::Both => "both",
        }
    }

    /// Returns true if a rule in this mode may fire during a `pass`.
    #[must_use]
    pub fn admits(self, pass: Self) -> bool {
        self == Self::Both || self == pass
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a rule may fire more than once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatPolicy {
    /// Fire at most one time for the lifetime of the execution log.
    Once,
    /// Fire on every qualifying match.
    EveryMatch,
}

impl RepeatPolicy {
    /// Accepted configuration spellings.
    pub const EXPECTED: &'static str = "once, every_match";

    /// Parse from configuration string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "once" => Some(Self::Once),
            "every_match" | "every-match" | "everymatch" => Some(Self::EveryMatch),
            _ => None,
        }
    }

    /// Convert to configuration string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Once => "once",
            Self::EveryMatch => "every_match",
        }
    }
}

/// Which message field the content pattern is tested against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentTarget {
    /// The subject line.
    #[default]
    Subject,
    /// The plain-text body.
    Body,
}

impl ContentTarget {
    /// Accepted configuration spellings.
    pub const EXPECTED: &'static str = "subject, body";

    /// Parse from configuration string representation.
    ///
    /// `title` is accepted as an alias for `subject`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "subject" | "title" => Some(Self::Subject),
            "body" => Some(Self::Body),
            _ => None,
        }
    }

    /// Convert to configuration string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Subject => "subject",
            Self::Body => "body",
        }
    }

    /// Selects the targeted field of a message.
    #[must_use]
    pub fn select(self, message: &Message) -> &str {
        match self {
            Self::Subject => &message.subject,
            Self::Body => &message.body,
        }
    }
}

/// A rule as written in the configuration file, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRule {
    /// Unique rule name.
    #[serde(default)]
    pub name: String,
    /// Operating mode; `both` when omitted.
    #[serde(default)]
    pub mode: Option<String>,
    /// Path of the program to run.
    #[serde(default)]
    pub action: String,
    /// Repeat policy.
    #[serde(default)]
    pub repeat: String,
    /// Sender pattern; matches anything when omitted.
    #[serde(default)]
    pub sender: Option<String>,
    /// Content pattern.
    #[serde(default)]
    pub pattern: String,
    /// Content target; `subject` when omitted.
    #[serde(default)]
    pub target: Option<String>,
}

/// A validated rule with compiled patterns.
#[derive(Debug, Clone)]
pub struct Rule {
    /// Unique rule name.
    pub name: String,
    /// When the rule is eligible.
    pub mode: OperatingMode,
    /// Path of the program to run on match.
    pub action: String,
    /// Whether the rule may fire repeatedly.
    pub repeat: RepeatPolicy,
    /// Sender pattern (`None` matches any sender).
    pub sender: Option<Regex>,
    /// Content pattern.
    pub pattern: Regex,
    /// Field the content pattern is tested against.
    pub target: ContentTarget,
}

impl Rule {
    /// Returns true if the message satisfies this rule's patterns.
    ///
    /// The operating mode is not considered here.
    #[must_use]
    pub fn matches(&self, message: &Message) -> bool {
        if let Some(sender) = &self.sender
            && !sender.is_match(&message.sender)
        {
            return false;
        }
        self.pattern.is_match(self.target.select(message))
    }

    /// Returns true if the rule fires at most once.
    #[must_use]
    pub fn is_once(&self) -> bool {
        self.repeat == RepeatPolicy::Once
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_operating_mode_parse() {
        assert_eq!(OperatingMode::parse("History"), Some(OperatingMode::History));
        assert_eq!(OperatingMode::parse(" polling "), Some(OperatingMode::Polling));
        assert_eq!(OperatingMode::parse("all"), Some(OperatingMode::Both));
        assert_eq!(OperatingMode::parse("sometimes"), None);
    }

    #[test]
    fn test_operating_mode_admits() {
        assert!(OperatingMode::Both.admits(OperatingMode::History));
        assert!(OperatingMode::Both.admits(OperatingMode::Polling));
        assert!(OperatingMode::History.admits(OperatingMode::History));
        assert!(!OperatingMode::History.admits(OperatingMode::Polling));
        assert!(!OperatingMode::Polling.admits(OperatingMode::History));
    }

    #[test]
    fn test_repeat_policy_spellings() {
        assert_eq!(RepeatPolicy::parse("once"), Some(RepeatPolicy::Once));
        assert_eq!(RepeatPolicy::parse("every-match"), Some(RepeatPolicy::EveryMatch));
        assert_eq!(RepeatPolicy::parse("EVERY_MATCH"), Some(RepeatPolicy::EveryMatch));
        assert_eq!(RepeatPolicy::parse("twice"), None);
    }

    #[test]
    fn test_content_target_title_alias() {
        assert_eq!(ContentTarget::parse("title"), Some(ContentTarget::Subject));
        assert_eq!(ContentTarget::parse("body"), Some(ContentTarget::Body));
        assert_eq!(ContentTarget::parse("headers"), None);
    }

    #[test]
    fn test_rule_matches_sender_and_target() {
        let rule = Rule {
            name: "alerts".into(),
            mode: OperatingMode::Both,
            action: "alert.sh".into(),
            repeat: RepeatPolicy::EveryMatch,
            sender: Some(Regex::new(r"@ops\.example\.com$").unwrap()),
            pattern: Regex::new("(?i)disk full").unwrap(),
            target: ContentTarget::Body,
        };

        let hit = Message::new(1, "pager@ops.example.com", "Alert", "DISK FULL on db1");
        let wrong_sender = Message::new(2, "someone@else.org", "Alert", "disk full on db1");
        let wrong_field = Message::new(3, "pager@ops.example.com", "disk full", "all good");

        assert!(rule.matches(&hit));
        assert!(!rule.matches(&wrong_sender));
        assert!(!rule.matches(&wrong_field));
    }
}
