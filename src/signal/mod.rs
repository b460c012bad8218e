//! Trading signals
//!
//! A [`SignalGenerator`] applies a [`SignalRule`] to each bar and its
//! indicator snapshot and records the resulting [`Signal`]s.

mod generator;
mod rules;
mod types;

pub use generator::{SignalGenerator, DEFAULT_MAX_HISTORY};
pub use rules::{rule_by_name, NeutralRule, RuleDecision, SignalRule, SmaCrossoverRule};
pub use types::{Signal, SignalError, SignalMetadata, SignalType};
