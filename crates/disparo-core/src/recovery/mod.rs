//! Conversation recovery: trigger matching and the per-conversation flow

mod machine;
pub mod matcher;

pub use machine::{Advance, InboundOutcome, RecoveryEngine, CANCEL_REASON};
pub use matcher::{first_match, is_affirmative, matches, AFFIRMATIVE_KEYWORDS};
