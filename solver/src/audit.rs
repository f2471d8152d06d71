//! Auditor: the bounded Proposer → Skeptic → script retry loop.
//!
//! Each attempt asks the Proposer for a solution, asks the Skeptic to audit
//! it, runs the Skeptic's script and combines the symbolic and semantic
//! signals. The first attempt with any passing signal ends the run; after a
//! `BOTH_FAILURE` the Auditor's summary is fed back to the Proposer until
//! `max_attempts` is reached.

use anyhow::{Context, Result, bail};
use tracing::{info, instrument, warn};

use crate::agents::proposer::Proposer;
use crate::agents::skeptic::Skeptic;
use crate::core::script::{ScriptLimits, run_verification_with};
use crate::core::status::{attempt_feedback, classify};
use crate::core::tags::parse_audit;
use crate::core::types::{Attempt, AuditHistory};
use crate::io::config::SolverConfig;
use crate::io::llm::CompletionClient;
use crate::io::prompt::PromptEngine;

/// Settings for one Auditor run.
#[derive(Debug, Clone)]
pub struct AuditorConfig {
    pub max_attempts: u32,
    pub proposer_temperature: f32,
    pub skeptic_temperature: f32,
    pub script: ScriptLimits,
}

impl Default for AuditorConfig {
    fn default() -> Self {
        AuditorConfig::from(&SolverConfig::default())
    }
}

impl From<&SolverConfig> for AuditorConfig {
    fn from(config: &SolverConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            proposer_temperature: config.llm.proposer_temperature,
            skeptic_temperature: config.llm.skeptic_temperature,
            script: config.script,
        }
    }
}

pub struct Auditor {
    proposer: Proposer,
    skeptic: Skeptic,
    prompts: PromptEngine,
    max_attempts: u32,
    limits: ScriptLimits,
}

impl Auditor {
    pub fn new(config: &AuditorConfig) -> Result<Self> {
        if config.max_attempts == 0 {
            bail!("max_attempts must be >= 1");
        }
        Ok(Self {
            proposer: Proposer::new(config.proposer_temperature),
            skeptic: Skeptic::new(config.skeptic_temperature),
            prompts: PromptEngine::new(),
            max_attempts: config.max_attempts,
            limits: config.script,
        })
    }

    /// Run the loop for `query`; the last attempt of the history is authoritative.
    ///
    /// Errors only when an agent's credential was rejected or rate limited.
    #[instrument(skip_all, fields(max_attempts = self.max_attempts))]
    pub fn process_query<C: CompletionClient>(
        &self,
        client: &C,
        query: &str,
    ) -> Result<AuditHistory> {
        let mut attempts = Vec::new();
        let mut feedback = String::new();

        for number in 1..=self.max_attempts {
            let proposed_solution = self
                .proposer
                .generate(client, &self.prompts, query, &feedback)
                .with_context(|| format!("attempt {number}: proposer"))?;
            let critique = self
                .skeptic
                .audit(client, &self.prompts, query, &proposed_solution)
                .with_context(|| format!("attempt {number}: skeptic"))?;

            let audit = parse_audit(&critique);
            let verification = run_verification_with(&audit.script, &self.limits);
            let final_status = classify(verification.symbolic_passed, audit.semantic_status);
            let summary = attempt_feedback(
                final_status,
                &verification.message,
                audit.verdict.corrections(),
            );

            info!(
                attempt = number,
                status = %final_status,
                symbolic_passed = verification.symbolic_passed,
                semantic_status = audit.semantic_status,
                execution_error = verification.is_execution_error,
                "attempt finished"
            );

            attempts.push(Attempt {
                attempt: number,
                proposed_solution,
                critique,
                audit,
                verification,
                final_status,
                feedback: summary.clone(),
            });

            if final_status.is_pass() {
                break;
            }
            if number == self.max_attempts {
                warn!(attempts = number, "attempt cap reached without a passing signal");
            }
            feedback = summary;
        }

        AuditHistory::from_attempts(attempts).context("auditor produced no attempts")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::FinalStatus;
    use crate::test_support::{ScriptedClient, approving_critique, rejecting_critique};

    const PASSING: &str = "x = sp.Symbol('x')\nis_correct = sp.diff(x**2, x) == 2*x";
    const FAILING: &str = "is_correct = False";

    fn auditor(max_attempts: u32) -> Auditor {
        Auditor::new(&AuditorConfig {
            max_attempts,
            ..AuditorConfig::default()
        })
        .expect("auditor")
    }

    #[test]
    fn zero_attempts_is_rejected() {
        assert!(
            Auditor::new(&AuditorConfig {
                max_attempts: 0,
                ..AuditorConfig::default()
            })
            .is_err()
        );
    }

    #[test]
    fn verified_on_first_attempt_stops() {
        let client = ScriptedClient::rounds(&[("2x", &approving_critique("Calculus", PASSING))]);
        let history = auditor(2).process_query(&client, "d/dx x^2").expect("history");
        assert_eq!(history.len(), 1);
        let last = history.final_attempt();
        assert_eq!(last.final_status, FinalStatus::Verified);
        assert_eq!(last.audit.category, "Calculus");
        assert_eq!(client.requests().len(), 2);
    }

    #[test]
    fn failure_feedback_reaches_the_second_proposer_call() {
        let client = ScriptedClient::rounds(&[
            ("x", &rejecting_critique("Calculus", FAILING, "Use the power rule.")),
            ("2x", &approving_critique("Calculus", PASSING)),
        ]);
        let history = auditor(2).process_query(&client, "d/dx x^2").expect("history");
        assert_eq!(history.len(), 2);
        assert_eq!(history.attempts()[0].final_status, FinalStatus::BothFailure);
        assert_eq!(history.final_attempt().final_status, FinalStatus::Verified);

        let second_proposer = &client.requests()[2].messages[1].content;
        assert!(second_proposer.starts_with("Both symbolic and semantic verification failed."));
        assert!(second_proposer.contains("Corrections: Use the power rule."));
        assert!(second_proposer.ends_with("USER PROBLEM: d/dx x^2"));
    }

    #[test]
    fn cap_is_never_exceeded() {
        let reject = rejecting_critique("Statics", FAILING, "Sum the moments.");
        let client = ScriptedClient::rounds(&[("a", &reject), ("b", &reject), ("c", &reject)]);
        let history = auditor(2).process_query(&client, "q").expect("history");
        assert_eq!(history.len(), 2);
        assert!(
            history
                .attempts()
                .iter()
                .all(|a| a.final_status == FinalStatus::BothFailure)
        );
        assert_eq!(client.remaining(), 2);
    }

    #[test]
    fn symbolic_pass_alone_terminates() {
        let client = ScriptedClient::rounds(&[(
            "2x",
            &rejecting_critique("Calculus", PASSING, "Explain the steps."),
        )]);
        let history = auditor(3).process_query(&client, "q").expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(
            history.final_attempt().final_status,
            FinalStatus::SymbolicOnlyPass
        );
    }

    #[test]
    fn semantic_pass_alone_terminates_even_with_script_error() {
        let client = ScriptedClient::rounds(&[(
            "2x",
            &approving_critique("Calculus", "is_correct = undefined_name"),
        )]);
        let history = auditor(3).process_query(&client, "q").expect("history");
        let last = history.final_attempt();
        assert_eq!(last.final_status, FinalStatus::SemanticOnlyPass);
        assert!(last.verification.is_execution_error);
    }

    #[test]
    fn credential_errors_abort_the_run() {
        let client = ScriptedClient::new(vec![
            Ok("solution".to_string()),
            Err(crate::io::llm::CompletionError::RateLimited),
        ]);
        let err = auditor(2).process_query(&client, "q").expect_err("rate limited");
        assert!(format!("{err:#}").contains("attempt 1: skeptic"));
    }
}
