//! Escalation rules and conditions.

use crate::core::{ScanResult, ScannerKind, Severity};

use serde::{Deserialize, Serialize};

/// A rule that decides whether a result needs human review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationRule {
    /// Unique identifier for this rule.
    pub id: String,

    /// Human-readable name for the rule.
    pub name: String,

    /// Scanner kinds this rule applies to; empty means every malware-class kind.
    #[serde(default)]
    pub scanners: Vec<ScannerKind>,

    /// Conditions that must all match for this rule to fire.
    pub conditions: Vec<Condition>,

    /// Priority of the rule (higher = evaluated first).
    #[serde(default)]
    pub priority: i32,

    /// Whether this rule is enabled.
    pub enabled: bool,
}

impl EscalationRule {
    /// Creates a new, enabled rule with no conditions.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            scanners: Vec::new(),
            conditions: Vec::new(),
            priority: 0,
            enabled: true,
        }
    }

    /// Sets the name of the rule.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Restricts the rule to one scanner kind (may be called repeatedly).
    pub fn for_scanner(mut self, kind: ScannerKind) -> Self {
        self.scanners.push(kind);
        self
    }

    /// Adds a condition.
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Enables or disables the rule.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Evaluates whether this rule fires for the given result.
    ///
    /// A rule with no conditions never fires.
    pub fn matches(&self, result: &ScanResult) -> bool {
        if !self.enabled || self.conditions.is_empty() {
            return false;
        }
        if !self.scanners.is_empty() && !self.scanners.contains(&result.scanner) {
            return false;
        }
        self.conditions.iter().all(|c| c.matches(result))
    }
}

/// A condition evaluated against one normalized result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Matches if the structured detection list is non-empty.
    AnyDetection,

    /// Matches if any detection name contains the substring.
    DetectionNameContains {
        /// Substring to search for.
        substring: String,
    },

    /// Matches if the details text contains the marker.
    DetailsContains {
        /// Marker to search for, case-sensitive.
        marker: String,
    },

    /// Matches if a `Infected files: N` summary line reports more than `count`.
    InfectedCountAbove {
        /// Threshold.
        count: u64,
    },

    /// Matches if the result severity is at least the specified level.
    SeverityAtLeast {
        /// Minimum severity to match.
        severity: Severity,
    },

    /// Logical AND of multiple conditions.
    And {
        /// Conditions that must all match.
        conditions: Vec<Condition>,
    },

    /// Logical OR of multiple conditions.
    Or {
        /// Conditions where at least one must match.
        conditions: Vec<Condition>,
    },

    /// Logical NOT of a condition.
    Not {
        /// Condition to negate.
        condition: Box<Condition>,
    },
}

impl Condition {
    /// Creates a condition that matches a details marker.
    pub fn details_contains(marker: impl Into<String>) -> Self {
        Self::DetailsContains {
            marker: marker.into(),
        }
    }

    /// Creates a condition that matches a detection name substring.
    pub fn detection_name_contains(substring: impl Into<String>) -> Self {
        Self::DetectionNameContains {
            substring: substring.into(),
        }
    }

    /// Creates a condition on the `Infected files:` summary count.
    pub fn infected_count_above(count: u64) -> Self {
        Self::InfectedCountAbove { count }
    }

    /// Creates a minimum severity condition.
    pub fn severity_at_least(severity: Severity) -> Self {
        Self::SeverityAtLeast { severity }
    }

    /// Creates a logical AND condition.
    pub fn and(conditions: Vec<Condition>) -> Self {
        Self::And { conditions }
    }

    /// Creates a logical OR condition.
    pub fn or(conditions: Vec<Condition>) -> Self {
        Self::Or { conditions }
    }

    /// Creates a logical NOT condition.
    #[allow(clippy::should_implement_trait)]
    pub fn not(condition: Condition) -> Self {
        Self::Not {
            condition: Box::new(condition),
        }
    }

    /// Evaluates this condition against a result.
    pub fn matches(&self, result: &ScanResult) -> bool {
        match self {
            Self::AnyDetection => result.has_detections(),
            Self::DetectionNameContains { substring } => result
                .detections
                .iter()
                .any(|d| d.name.contains(substring.as_str())),
            Self::DetailsContains { marker } => result.details.contains(marker.as_str()),
            Self::InfectedCountAbove { count } => {
                infected_count(&result.details).is_some_and(|n| n > *count)
            }
            Self::SeverityAtLeast { severity } => result.severity >= *severity,
            Self::And { conditions } => conditions.iter().all(|c| c.matches(result)),
            Self::Or { conditions } => conditions.iter().any(|c| c.matches(result)),
            Self::Not { condition } => !condition.matches(result),
        }
    }
}

/// Reads the count from a ClamAV `Infected files: N` summary line.
pub fn infected_count(details: &str) -> Option<u64> {
    details.lines().find_map(|line| {
        line.trim()
            .strip_prefix("Infected files:")
            .and_then(|n| n.trim().parse().ok())
    })
}
