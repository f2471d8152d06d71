//! Test-only helpers: a scripted completion client and canned agent output.

use std::cell::RefCell;
use std::collections::VecDeque;

use crate::core::script::VerificationOutcome;
use crate::core::status::{attempt_feedback, classify};
use crate::core::tags::parse_audit;
use crate::core::types::{Attempt, AuditHistory, FinalStatus};
use crate::io::llm::{CompletionClient, CompletionError, CompletionRequest};

/// Client that replays queued responses in order and records every request.
///
/// Running out of responses yields a transport error.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    responses: RefCell<VecDeque<Result<String, CompletionError>>>,
    requests: RefCell<Vec<CompletionRequest>>,
}

impl ScriptedClient {
    pub fn new(responses: Vec<Result<String, CompletionError>>) -> Self {
        Self {
            responses: RefCell::new(responses.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Queue alternating Proposer/Skeptic replies for successive attempts.
    pub fn rounds(rounds: &[(&str, &str)]) -> Self {
        let responses = rounds
            .iter()
            .flat_map(|(solution, critique)| [Ok(solution.to_string()), Ok(critique.to_string())])
            .collect();
        Self::new(responses)
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.borrow().clone()
    }

    pub fn remaining(&self) -> usize {
        self.responses.borrow().len()
    }
}

impl CompletionClient for ScriptedClient {
    fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        self.requests.borrow_mut().push(request.clone());
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(CompletionError::Transport("script exhausted".to_string())))
    }
}

/// Skeptic reply that approves the solution.
pub fn approving_critique(category: &str, script: &str) -> String {
    format!(
        "[CATEGORY]{category}[/CATEGORY]\n[SKEPTIC]\n{script}\n[/SKEPTIC]\n\
         [FEEDBACK]The derivation is sound.[/FEEDBACK]\nSTATUS=TRUE\n\
         [AFFIRMATION]Each step follows from the previous one.[/AFFIRMATION]"
    )
}

/// Skeptic reply that rejects the solution.
pub fn rejecting_critique(category: &str, script: &str, corrections: &str) -> String {
    format!(
        "[CATEGORY]{category}[/CATEGORY]\n[SKEPTIC]\n{script}\n[/SKEPTIC]\n\
         [FEEDBACK]The result does not hold.[/FEEDBACK]\nSTATUS=FALSE\n\
         [CORRECTIONS]{corrections}[/CORRECTIONS]\n\
         [ERROR_CATEGORY]Calculation Error[/ERROR_CATEGORY]"
    )
}

/// Deterministic attempt whose signals match `status`.
pub fn attempt(number: u32, status: FinalStatus) -> Attempt {
    let (symbolic, semantic) = match status {
        FinalStatus::Verified => (true, true),
        FinalStatus::SymbolicOnlyPass => (true, false),
        FinalStatus::SemanticOnlyPass => (false, true),
        FinalStatus::BothFailure => (false, false),
    };
    let script = format!("is_correct = {}", if symbolic { "True" } else { "False" });
    let critique = if semantic {
        approving_critique("Calculus", &script)
    } else {
        rejecting_critique("Calculus", &script, "Recheck the integral.")
    };
    let audit = parse_audit(&critique);
    let verification = VerificationOutcome {
        symbolic_passed: symbolic,
        message: if symbolic {
            "Symbolic Match Confirmed".to_string()
        } else {
            "Symbolic Mismatch (Math logic returned False)".to_string()
        },
        is_execution_error: false,
    };
    let final_status = classify(symbolic, semantic);
    Attempt {
        attempt: number,
        proposed_solution: format!("solution {number}"),
        feedback: attempt_feedback(
            final_status,
            &verification.message,
            audit.verdict.corrections(),
        ),
        critique,
        audit,
        verification,
        final_status,
    }
}

/// Wrap attempts in a history. Panics on an empty list.
pub fn history(attempts: Vec<Attempt>) -> AuditHistory {
    AuditHistory::from_attempts(attempts).expect("history needs at least one attempt")
}

/// Temporary data directory with `solver init` already applied.
pub fn initialized_data_dir() -> (tempfile::TempDir, crate::io::init::SolverPaths) {
    let temp = tempfile::tempdir().expect("tempdir");
    let paths = crate::io::init::init_solver(
        &temp.path().join(".solver"),
        &crate::io::init::InitOptions { force: false },
    )
    .expect("init");
    (temp, paths)
}
