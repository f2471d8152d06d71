//! Signal combination for one auditor attempt.
//!
//! The symbolic signal (script verdict) and the semantic signal (Skeptic
//! `STATUS=TRUE`) are independent. Any single pass ends the loop, so a
//! wrong proof is accepted when only one fallible checker agrees with it.

use crate::core::types::FinalStatus;

/// Map the two signals onto a status (exhaustive, exclusive truth table).
pub fn classify(symbolic_passed: bool, semantic_status: bool) -> FinalStatus {
    match (symbolic_passed, semantic_status) {
        (true, true) => FinalStatus::Verified,
        (true, false) => FinalStatus::SymbolicOnlyPass,
        (false, true) => FinalStatus::SemanticOnlyPass,
        (false, false) => FinalStatus::BothFailure,
    }
}

/// Auditor summary stored on the attempt.
///
/// For `BOTH_FAILURE` this text becomes the Proposer's prior feedback.
pub fn attempt_feedback(status: FinalStatus, script_message: &str, corrections: &str) -> String {
    match status {
        FinalStatus::Verified => "Both symbolic and semantic verification passed.".to_string(),
        FinalStatus::SymbolicOnlyPass => {
            format!("Math verified symbolically, but the skeptic flagged logic: {corrections}")
        }
        FinalStatus::SemanticOnlyPass => {
            format!("Skeptic approved the logic, but the verification script failed: {script_message}")
        }
        FinalStatus::BothFailure => format!(
            "Both symbolic and semantic verification failed. Script: {script_message}. Corrections: {corrections}"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truth_table_is_exhaustive_and_exclusive() {
        let cases = [
            (true, true, FinalStatus::Verified),
            (true, false, FinalStatus::SymbolicOnlyPass),
            (false, true, FinalStatus::SemanticOnlyPass),
            (false, false, FinalStatus::BothFailure),
        ];
        for (symbolic, semantic, expected) in cases {
            assert_eq!(classify(symbolic, semantic), expected);
            assert_eq!(expected.is_pass(), symbolic || semantic);
        }
    }

    #[test]
    fn failure_feedback_carries_message_and_corrections() {
        let feedback = attempt_feedback(
            FinalStatus::BothFailure,
            "Execution Error: name 'y' is not defined",
            "Differentiate again.",
        );
        assert!(feedback.contains("name 'y' is not defined"));
        assert!(feedback.contains("Corrections: Differentiate again."));
    }
}
