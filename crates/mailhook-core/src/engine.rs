//! Rule evaluation.
//!
//! Evaluation is a pure function of one message and the rule set: rules are
//! tried in declaration order and the first one that passes every active
//! check wins. Other messages in the same batch never influence the result.

use tracing::debug;

use crate::rules::{OperatingMode, Rule, RuleSet};
use crate::source::Message;

/// A message paired with the rule it matched.
#[derive(Debug, Clone, Copy)]
pub struct MatchResult<'a> {
    /// The matched message.
    pub message: &'a Message,
    /// The first rule that matched it.
    pub rule: &'a Rule,
}

/// First-match-wins evaluator over a [`RuleSet`].
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    rules: RuleSet,
}

impl RuleEngine {
    /// Creates an engine over a validated rule set.
    #[must_use]
    pub const fn new(rules: RuleSet) -> Self {
        Self { rules }
    }

    /// Returns the rule set.
    #[must_use]
    pub const fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Returns the first rule matching `message`.
    ///
    /// With `pass` set, rules whose operating mode does not admit that pass
    /// are skipped. A message matching no rule yields `None`.
    #[must_use]
    pub fn evaluate(&self, message: &Message, pass: Option<OperatingMode>) -> Option<&Rule> {
        let rule = self
            .rules
            .rules()
            .iter()
            .filter(|rule| pass.is_none_or(|pass| rule.mode.admits(pass)))
            .find(|rule| rule.matches(message));

        match rule {
            Some(rule) => debug!(uid = %message.uid, rule = %rule.name, "Message matched rule"),
            None => debug!(uid = %message.uid, "Message matched no rule"),
        }
        rule
    }

    /// Like [`evaluate`](Self::evaluate), but pairs the result with the message.
    #[must_use]
    pub fn match_message<'a>(
        &'a self,
        message: &'a Message,
        pass: Option<OperatingMode>,
    ) -> Option<MatchResult<'a>> {
        self.evaluate(message, pass)
            .map(|rule| MatchResult { message, rule })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::rules::RawRule;

    fn raw(name: &str, mode: &str, pattern: &str, target: &str) -> RawRule {
        RawRule {
            name: name.into(),
            mode: Some(mode.into()),
            action: format!("{name}.sh"),
            repeat: "every_match".into(),
            sender: None,
            pattern: pattern.into(),
            target: Some(target.into()),
        }
    }

    fn engine(raw: Vec<RawRule>) -> RuleEngine {
        RuleEngine::new(RuleSet::validate(raw).unwrap())
    }

    #[test]
    fn test_first_match_wins() {
        let engine = engine(vec![
            raw("first", "both", "INVOICE", "subject"),
            raw("second", "both", "^INVOICE #\\d+", "subject"),
        ]);
        let msg = Message::new(1, "billing@example.com", "INVOICE #42", "");

        let rule = engine.evaluate(&msg, None).unwrap();
        assert_eq!(rule.name, "first");
    }

    #[test]
    fn test_no_match_is_none() {
        let engine = engine(vec![raw("invoice", "both", "^INVOICE", "subject")]);
        let msg = Message::new(1, "friend@example.com", "hello", "");
        assert!(engine.evaluate(&msg, None).is_none());
    }

    #[test]
    fn test_mode_filter_skips_ineligible_rules() {
        let engine = engine(vec![
            raw("live", "polling", "report", "subject"),
            raw("archive", "history", "report", "subject"),
        ]);
        let msg = Message::new(1, "a@example.com", "weekly report", "");

        assert_eq!(
            engine.evaluate(&msg, Some(OperatingMode::History)).unwrap().name,
            "archive"
        );
        assert_eq!(
            engine.evaluate(&msg, Some(OperatingMode::Polling)).unwrap().name,
            "live"
        );
        assert_eq!(engine.evaluate(&msg, None).unwrap().name, "live");
    }

    #[test]
    fn test_sender_pattern_checked() {
        let mut vip = raw("vip", "both", ".", "subject");
        vip.sender = Some(r"^boss@example\.com$".into());
        let engine = engine(vec![vip, raw("fallback", "both", ".", "subject")]);

        let from_boss = Message::new(1, "boss@example.com", "hi", "");
        let from_other = Message::new(2, "intern@example.com", "hi", "");

        assert_eq!(engine.evaluate(&from_boss, None).unwrap().name, "vip");
        assert_eq!(engine.evaluate(&from_other, None).unwrap().name, "fallback");
    }

    #[test]
    fn test_body_target_and_empty_body() {
        let engine = engine(vec![raw("body", "both", "^$", "body")]);
        // A message whose body could not be decoded arrives as an empty string.
        let msg = Message::new(1, "a@example.com", "subject", "");
        assert!(engine.evaluate(&msg, None).is_some());
    }

    #[test]
    fn test_match_message_pairs_result() {
        let engine = engine(vec![raw("invoice", "both", "^INVOICE", "subject")]);
        let msg = Message::new(7, "a@example.com", "INVOICE #1", "");
        let result = engine.match_message(&msg, None).unwrap();
        assert_eq!(result.message.uid.get(), 7);
        assert_eq!(result.rule.name, "invoice");
    }

    fn subject_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("INVOICE #1".to_string()),
            Just("Re: invoice".to_string()),
            Just("hello".to_string()),
            "[A-Za-z #0-9]{0,16}",
        ]
    }

    proptest! {
        #[test]
        fn prop_evaluation_is_independent_of_batch(
            subjects in proptest::collection::vec(subject_strategy(), 1..12),
            seed in any::<u64>(),
        ) {
            let engine = engine(vec![
                raw("upper", "both", "^INVOICE", "subject"),
                raw("any", "history", "(?i)invoice", "subject"),
            ]);
            let messages: Vec<Message> = subjects
                .iter()
                .enumerate()
                .map(|(i, s)| Message::new(u32::try_from(i).unwrap(), "x@example.com", s.clone(), ""))
                .collect();

            let expected: Vec<Option<String>> = messages
                .iter()
                .map(|m| engine.evaluate(m, Some(OperatingMode::History)).map(|r| r.name.clone()))
                .collect();

            // Evaluate in a rotated order; each message must get the same answer.
            let shift = usize::try_from(seed % messages.len() as u64).unwrap();
            let mut order: Vec<usize> = (0..messages.len()).collect();
            order.rotate_left(shift);
            for i in order {
                let got = engine
                    .evaluate(&messages[i], Some(OperatingMode::History))
                    .map(|r| r.name.clone());
                prop_assert_eq!(&got, &expected[i]);
            }
        }
    }
}
