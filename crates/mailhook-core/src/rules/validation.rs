//! Rule set validation.

use std::collections::HashSet;

use regex::Regex;

use super::model::{ContentTarget, OperatingMode, RawRule, RepeatPolicy, Rule};
use crate::error::ConfigError;

/// Immutable, validated collection of rules in declaration order.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Validate raw rule definitions and compile their patterns.
    ///
    /// # Errors
    ///
    /// Returns the first problem found: an empty or repeated name, an empty
    /// action path, a pattern that does not compile, or an unknown mode,
    /// repeat policy or target.
    pub fn validate(raw: Vec<RawRule>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::with_capacity(raw.len());
        let mut rules = Vec::with_capacity(raw.len());

        for (index, raw) in raw.into_iter().enumerate() {
            let name = raw.name.trim().to_string();
            if name.is_empty() {
                return Err(ConfigError::EmptyName { index });
            }
            if !seen.insert(name.clone()) {
                return Err(ConfigError::DuplicateName(name));
            }
            rules.push(compile(name, raw)?);
        }

        Ok(Self { rules })
    }

    /// Returns the rules in declaration order.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Looks up a rule by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|rule| rule.name == name)
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if there are no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn compile(name: String, raw: RawRule) -> Result<Rule, ConfigError> {
    let action = raw.action.trim().to_string();
    if action.is_empty() {
        return Err(ConfigError::EmptyAction(name));
    }

    let mode = match raw.mode.as_deref() {
        None => OperatingMode::default(),
        Some(value) => OperatingMode::parse(value).ok_or_else(|| ConfigError::InvalidValue {
            rule: name.clone(),
            field: "mode",
            value: value.to_string(),
            expected: OperatingMode::EXPECTED,
        })?,
    };

    let repeat = RepeatPolicy::parse(&raw.repeat).ok_or_else(|| ConfigError::InvalidValue {
        rule: name.clone(),
        field: "repeat",
        value: raw.repeat.clone(),
        expected: RepeatPolicy::EXPECTED,
    })?;

    let target = match raw.target.as_deref() {
        None => ContentTarget::default(),
        Some(value) => ContentTarget::parse(value).ok_or_else(|| ConfigError::InvalidValue {
            rule: name.clone(),
            field: "target",
            value: value.to_string(),
            expected: ContentTarget::EXPECTED,
        })?,
    };

    // An empty sender pattern is the same as none: any sender matches.
    let sender = raw
        .sender
        .as_deref()
        .filter(|pattern| !pattern.is_empty())
        .map(|pattern| compile_pattern(&name, "sender", pattern))
        .transpose()?;
    let pattern = compile_pattern(&name, "pattern", &raw.pattern)?;

    Ok(Rule {
        name,
        mode,
        action,
        repeat,
        sender,
        pattern,
        target,
    })
}

fn compile_pattern(rule: &str, field: &'static str, pattern: &str) -> Result<Regex, ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidValue {
            rule: rule.to_string(),
            field,
            value: String::new(),
            expected: "a non-empty regular expression",
        });
    }
    Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
        rule: rule.to_string(),
        field,
        source: Box::new(source),
    })
}
