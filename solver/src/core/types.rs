//! Shared deterministic types for the verification loop.
//!
//! These types define stable contracts between the auditor, the record store
//! and the HTTP surface. They never depend on I/O.

use serde::{Deserialize, Serialize};

use crate::core::script::VerificationOutcome;
use crate::core::tags::ParsedAudit;

/// Per-attempt status computed from the symbolic and semantic signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalStatus {
    Verified,
    SymbolicOnlyPass,
    SemanticOnlyPass,
    BothFailure,
}

impl FinalStatus {
    pub const ALL: [FinalStatus; 4] = [
        FinalStatus::Verified,
        FinalStatus::SymbolicOnlyPass,
        FinalStatus::SemanticOnlyPass,
        FinalStatus::BothFailure,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FinalStatus::Verified => "VERIFIED",
            FinalStatus::SymbolicOnlyPass => "SYMBOLIC_ONLY_PASS",
            FinalStatus::SemanticOnlyPass => "SEMANTIC_ONLY_PASS",
            FinalStatus::BothFailure => "BOTH_FAILURE",
        }
    }

    /// Any status other than `BOTH_FAILURE` ends the loop.
    pub fn is_pass(self) -> bool {
        !matches!(self, FinalStatus::BothFailure)
    }
}

impl std::fmt::Display for FinalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One iteration of the auditor loop. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    /// 1-based attempt index.
    pub attempt: u32,
    pub proposed_solution: String,
    /// Raw Skeptic response.
    pub critique: String,
    pub audit: ParsedAudit,
    pub verification: VerificationOutcome,
    pub final_status: FinalStatus,
    /// Auditor summary for this attempt (fed back to the Proposer on failure).
    pub feedback: String,
}

/// Ordered, non-empty attempt history for one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditHistory {
    attempts: Vec<Attempt>,
}

impl AuditHistory {
    /// Build a history; `None` when `attempts` is empty.
    pub(crate) fn from_attempts(attempts: Vec<Attempt>) -> Option<Self> {
        if attempts.is_empty() {
            return None;
        }
        Some(Self { attempts })
    }

    pub fn attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    /// The authoritative result of the run.
    pub fn final_attempt(&self) -> &Attempt {
        self.attempts
            .last()
            .expect("audit history is never empty")
    }
}

/// Persisted parent record for one solved query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemRecord {
    pub id: String,
    pub prompt: String,
    /// SHA-256 hex digest of the prompt.
    pub query_hash: String,
    pub category: String,
    pub final_solution: String,
    pub verification_status: FinalStatus,
    pub total_attempts: u32,
    /// Label of the credential set that produced the run.
    pub credential: String,
    pub created_at: String,
}

/// Persisted child record, one per attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub problem_id: String,
    pub attempt: u32,
    pub script: String,
    pub is_execution_error: bool,
    pub symbolic_passed: bool,
    pub script_message: String,
    pub semantic_status: bool,
    pub feedback: String,
    pub affirmation: String,
    pub corrections: String,
    pub error_category: String,
    pub critique: String,
    pub proposed_solution: String,
    pub final_status: FinalStatus,
    pub created_at: String,
}

impl AttemptRecord {
    pub fn from_attempt(problem_id: &str, attempt: &Attempt, created_at: &str) -> Self {
        Self {
            problem_id: problem_id.to_string(),
            attempt: attempt.attempt,
            script: attempt.audit.script.clone(),
            is_execution_error: attempt.verification.is_execution_error,
            symbolic_passed: attempt.verification.symbolic_passed,
            script_message: attempt.verification.message.clone(),
            semantic_status: attempt.audit.semantic_status,
            feedback: attempt.audit.feedback.clone(),
            affirmation: attempt.audit.verdict.affirmation().to_string(),
            corrections: attempt.audit.verdict.corrections().to_string(),
            error_category: attempt.audit.verdict.error_category().to_string(),
            critique: attempt.critique.clone(),
            proposed_solution: attempt.proposed_solution.clone(),
            final_status: attempt.final_status,
            created_at: created_at.to_string(),
        }
    }
}

/// Category recorded for a run; blank Skeptic categories fall back to `General`.
pub fn record_category(category: &str) -> String {
    let trimmed = category.trim();
    if trimmed.is_empty() {
        "General".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tags::parse_audit;

    fn attempt(status: FinalStatus) -> Attempt {
        let critique = "[CATEGORY]Statics[/CATEGORY]\nSTATUS=FALSE\n\
                        [CORRECTIONS]Recheck moments.[/CORRECTIONS]";
        Attempt {
            attempt: 1,
            proposed_solution: "R = 10 N".to_string(),
            critique: critique.to_string(),
            audit: parse_audit(critique),
            verification: VerificationOutcome {
                symbolic_passed: false,
                message: "No code provided".to_string(),
                is_execution_error: false,
            },
            final_status: status,
            feedback: String::new(),
        }
    }

    #[test]
    fn empty_history_is_rejected() {
        assert!(AuditHistory::from_attempts(Vec::new()).is_none());
    }

    #[test]
    fn final_attempt_is_last() {
        let mut second = attempt(FinalStatus::Verified);
        second.attempt = 2;
        let history =
            AuditHistory::from_attempts(vec![attempt(FinalStatus::BothFailure), second])
                .expect("non-empty");
        assert_eq!(history.len(), 2);
        assert_eq!(history.final_attempt().final_status, FinalStatus::Verified);
    }

    #[test]
    fn status_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&FinalStatus::SymbolicOnlyPass).expect("serialize");
        assert_eq!(json, "\"SYMBOLIC_ONLY_PASS\"");
    }

    #[test]
    fn attempt_record_flattens_rejected_verdict() {
        let record = AttemptRecord::from_attempt(
            "p-1",
            &attempt(FinalStatus::BothFailure),
            "2026-01-01T00:00:00Z",
        );
        assert_eq!(record.corrections, "Recheck moments.");
        assert_eq!(record.affirmation, "");
        assert!(!record.semantic_status);
        assert_eq!(record.script_message, "No code provided");
    }

    #[test]
    fn blank_category_defaults_to_general() {
        assert_eq!(record_category("  "), "General");
        assert_eq!(record_category(" Fluids "), "Fluids");
    }
}
