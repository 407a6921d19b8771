//! Rule definitions.
//!
//! Rules arrive from configuration as [`RawRule`] values (plain strings, not
//! yet checked) and are compiled once at startup into an immutable
//! [`RuleSet`]. A rule set that fails validation must stop the process before
//! any mailbox interaction.
//!
//! # Example
//!
//! ```
//! use mailhook_core::{RawRule, RuleSet};
//!
//! let raw = RawRule {
//!     name: "invoice".into(),
//!     mode: Some("history".into()),
//!     action: "notify.sh".into(),
//!     repeat: "once".into(),
//!     sender: None,
//!     pattern: "^INVOICE".into(),
//!     target: Some("subject".into()),
//! };
//!
//! let rules = RuleSet::validate(vec![raw]).unwrap();
//! assert_eq!(rules.len(), 1);
//! ```

mod model;
mod validation;

pub use model::{ContentTarget, OperatingMode, RawRule, RepeatPolicy, Rule};
pub use validation::RuleSet;
