//! End-to-end auditor scenarios driven by a scripted completion client.
//!
//! Each scenario queues Proposer/Skeptic replies, runs the full loop
//! (tag parsing, script execution, status combination) and checks the
//! resulting history.

use solver::audit::{Auditor, AuditorConfig};
use solver::core::types::FinalStatus;
use solver::fallback::run_with_fallback;
use solver::io::credentials::Credential;
use solver::io::llm::CompletionError;
use solver::test_support::{ScriptedClient, approving_critique, rejecting_critique};

const INTEGRAL_CHECK: &str = "x = sp.Symbol('x')\n\
proposed_sol = x**3/3 + 2*x\n\
is_correct = sp.simplify(sp.diff(proposed_sol, x) - (x**2 + 2)) == 0";

const WRONG_INTEGRAL_CHECK: &str = "x = sp.Symbol('x')\n\
proposed_sol = x**3 + 2*x\n\
is_correct = sp.simplify(sp.diff(proposed_sol, x) - (x**2 + 2)) == 0";

fn auditor(max_attempts: u32) -> Auditor {
    Auditor::new(&AuditorConfig {
        max_attempts,
        ..AuditorConfig::default()
    })
    .expect("auditor")
}

#[test]
fn corrected_solution_is_verified_on_retry() {
    let client = ScriptedClient::rounds(&[
        (
            "F(x) = x^3 + 2x",
            &rejecting_critique("Calculus", WRONG_INTEGRAL_CHECK, "Divide the cubic term by 3."),
        ),
        (
            "F(x) = x^3/3 + 2x",
            &approving_critique("Calculus", INTEGRAL_CHECK),
        ),
    ]);
    let history = auditor(2)
        .process_query(&client, "Integrate x^2 + 2")
        .expect("history");

    assert_eq!(history.len(), 2);
    let first = &history.attempts()[0];
    assert_eq!(first.final_status, FinalStatus::BothFailure);
    assert!(!first.verification.is_execution_error);
    assert_eq!(
        first.verification.message,
        "Symbolic Mismatch (Math logic returned False)"
    );

    let last = history.final_attempt();
    assert_eq!(last.attempt, 2);
    assert_eq!(last.final_status, FinalStatus::Verified);
    assert_eq!(last.verification.message, "Symbolic Match Confirmed");
    assert_eq!(
        last.audit.verdict.affirmation(),
        "Each step follows from the previous one."
    );
}

#[test]
fn broken_script_and_rejection_exhaust_the_cap() {
    let broken = rejecting_critique("Dynamics", "is_correct = (", "Redo the free body diagram.");
    let client = ScriptedClient::rounds(&[("a", &broken), ("b", &broken)]);
    let history = auditor(2).process_query(&client, "q").expect("history");

    assert_eq!(history.len(), 2);
    for attempt in history.attempts() {
        assert_eq!(attempt.final_status, FinalStatus::BothFailure);
        assert!(attempt.verification.is_execution_error);
        assert!(attempt.verification.message.starts_with("Execution Error: "));
    }
    assert!(
        history
            .final_attempt()
            .feedback
            .contains("Corrections: Redo the free body diagram.")
    );
}

#[test]
fn name_error_message_is_fed_back_to_the_next_attempt() {
    let client = ScriptedClient::rounds(&[
        (
            "F(x) = x^3/3 + 2x",
            &rejecting_critique(
                "Calculus",
                "is_correct = sp.diff(proposed_sol, x) == x**2 + 2",
                "Define the antiderivative before checking it.",
            ),
        ),
        (
            "F(x) = x^3/3 + 2x + C",
            &approving_critique("Calculus", INTEGRAL_CHECK),
        ),
    ]);
    let history = auditor(2)
        .process_query(&client, "Integrate x^2 + 2")
        .expect("history");

    let first = &history.attempts()[0];
    assert_eq!(first.final_status, FinalStatus::BothFailure);
    assert!(first.verification.is_execution_error);
    assert_eq!(
        first.verification.message,
        "Execution Error: name 'proposed_sol' is not defined"
    );

    let second_proposer = &client.requests()[2].messages[1].content;
    assert!(second_proposer.contains("Execution Error: name 'proposed_sol' is not defined"));
    assert!(second_proposer.contains("Corrections: Define the antiderivative before checking it."));
    assert_eq!(history.final_attempt().final_status, FinalStatus::Verified);
}

#[test]
fn missing_script_counts_as_no_code() {
    let critique = "[CATEGORY]Fluids[/CATEGORY]\nSTATUS=TRUE\n[AFFIRMATION]Fine.[/AFFIRMATION]";
    let client = ScriptedClient::rounds(&[("v = 2 m/s", critique)]);
    let history = auditor(2).process_query(&client, "q").expect("history");
    let last = history.final_attempt();
    assert_eq!(last.final_status, FinalStatus::SemanticOnlyPass);
    assert_eq!(last.verification.message, "No code provided");
    assert!(!last.verification.is_execution_error);
}

#[test]
fn disallowed_import_is_an_execution_error() {
    let script = "import subprocess\nis_correct = True";
    let client = ScriptedClient::rounds(&[
        ("a", &rejecting_critique("Statics", script, "none")),
    ]);
    let history = auditor(1).process_query(&client, "q").expect("history");
    let last = history.final_attempt();
    assert_eq!(last.final_status, FinalStatus::BothFailure);
    assert!(last.verification.is_execution_error);
    assert!(last.verification.message.contains("subprocess"));
}

#[test]
fn unreachable_service_degrades_instead_of_failing() {
    let client = ScriptedClient::new(vec![
        Err(CompletionError::Transport("connection reset".to_string())),
        Err(CompletionError::Transport("connection reset".to_string())),
    ]);
    let history = auditor(1).process_query(&client, "q").expect("history");
    let last = history.final_attempt();
    assert!(last.proposed_solution.contains("connection reset"));
    assert_eq!(last.final_status, FinalStatus::BothFailure);
    assert_eq!(last.verification.message, "No code provided");
}

#[test]
fn fallback_discards_partial_work_from_failed_credentials() {
    let credentials = [
        Credential::new("GROQ_API_KEY1", "k1"),
        Credential::new("GROQ_API_KEY2", "k2"),
    ];
    let outcome = run_with_fallback(
        &credentials,
        |credential| {
            Ok(if credential.label == "GROQ_API_KEY1" {
                // Proposer succeeds, then the Skeptic call is rate limited.
                ScriptedClient::new(vec![
                    Ok("partial".to_string()),
                    Err(CompletionError::RateLimited),
                ])
            } else {
                ScriptedClient::rounds(&[(
                    "complete",
                    &approving_critique("Calculus", INTEGRAL_CHECK),
                )])
            })
        },
        &AuditorConfig::default(),
        "Integrate x^2 + 2",
    )
    .expect("outcome");

    assert_eq!(outcome.credential, "GROQ_API_KEY2");
    assert_eq!(outcome.history.len(), 1);
    assert_eq!(outcome.history.final_attempt().proposed_solution, "complete");
}
