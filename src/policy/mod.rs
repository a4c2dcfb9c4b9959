//! Escalation policy for routing malware hits into manual review.
//!
//! The policy evaluates normalized results against configurable rules to
//! decide whether a human must look at the artifact.

mod engine;
mod rules;

pub use engine::EscalationPolicy;
pub use rules::{infected_count, Condition, EscalationRule};
