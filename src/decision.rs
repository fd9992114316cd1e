//! Authorization decision value type

use serde::{Deserialize, Serialize};

/// Outcome of a single policy evaluation.
///
/// Constructed once per evaluation and never mutated. The reason is
/// diagnostic only; callers must branch on [`Decision::is_granted`] alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    granted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl Decision {
    /// Create a decision with an optional diagnostic reason
    pub fn new(granted: bool, reason: Option<String>) -> Self {
        Self { granted, reason }
    }

    /// Granted decision
    pub fn granted(reason: impl Into<String>) -> Self {
        Self::new(true, Some(reason.into()))
    }

    /// Denied decision
    pub fn denied(reason: impl Into<String>) -> Self {
        Self::new(false, Some(reason.into()))
    }

    /// Whether access was granted
    pub fn is_granted(&self) -> bool {
        self.granted
    }

    /// Diagnostic reason, if one was recorded
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_granted_decision() {
        let decision = Decision::granted("authority present");
        assert!(decision.is_granted());
        assert_eq!(decision.reason(), Some("authority present"));
    }

    #[test]
    fn test_denied_decision() {
        let decision = Decision::denied("no matching rule");
        assert!(!decision.is_granted());
        assert_eq!(decision.reason(), Some("no matching rule"));
    }

    #[test]
    fn test_equality_by_value() {
        assert_eq!(Decision::denied("x"), Decision::denied("x"));
        assert_ne!(Decision::denied("x"), Decision::granted("x"));
        assert_eq!(Decision::new(true, None), Decision::new(true, None));
    }
}
