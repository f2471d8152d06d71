//! `solve`: run one query through the fallback driver and persist the result.

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::instrument;

use crate::audit::AuditorConfig;
use crate::core::types::{Attempt, AuditHistory, ProblemRecord};
use crate::fallback::run_with_fallback;
use crate::io::config::SolverConfig;
use crate::io::credentials::Credential;
use crate::io::llm::CompletionClient;
use crate::io::store::RecordStore;

pub const EMPTY_QUERY_MESSAGE: &str = "Query cannot be empty";

/// What a caller gets back after a solve: the saved record and the full history.
#[derive(Debug, Clone, Serialize)]
pub struct SolveOutcome {
    pub problem_id: String,
    pub query: String,
    pub credential: String,
    pub record: ProblemRecord,
    pub history: AuditHistory,
}

impl SolveOutcome {
    pub fn final_attempt(&self) -> &Attempt {
        self.history.final_attempt()
    }
}

#[instrument(skip_all, fields(query_bytes = query.len()))]
pub fn solve_query<C, F>(
    store: &RecordStore,
    config: &SolverConfig,
    credentials: &[Credential],
    build_client: F,
    query: &str,
) -> Result<SolveOutcome>
where
    C: CompletionClient,
    F: Fn(&Credential) -> Result<C>,
{
    let query = query.trim();
    if query.is_empty() {
        bail!(EMPTY_QUERY_MESSAGE);
    }
    let outcome = run_with_fallback(
        credentials,
        build_client,
        &AuditorConfig::from(config),
        query,
    )?;
    let record = store
        .save(query, &outcome.history, &outcome.credential)
        .context("persist problem record")?;
    Ok(SolveOutcome {
        problem_id: record.id.clone(),
        query: query.to_string(),
        credential: outcome.credential,
        record,
        history: outcome.history,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::FinalStatus;
    use crate::io::llm::CompletionError;
    use crate::test_support::{ScriptedClient, approving_critique, rejecting_critique};

    #[test]
    fn empty_query_is_rejected_before_any_call() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = RecordStore::new(temp.path());
        let err = solve_query(
            &store,
            &SolverConfig::default(),
            &[Credential::new("A", "k")],
            |_| -> Result<ScriptedClient> { panic!("no client should be built") },
            "   ",
        )
        .expect_err("empty");
        assert_eq!(err.to_string(), EMPTY_QUERY_MESSAGE);
    }

    #[test]
    fn solved_query_is_persisted_with_all_attempts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = RecordStore::new(temp.path());
        let outcome = solve_query(
            &store,
            &SolverConfig::default(),
            &[Credential::new("A", "k"), Credential::new("B", "k")],
            |credential| {
                Ok(if credential.label == "A" {
                    ScriptedClient::new(vec![Err(CompletionError::CredentialRejected {
                        status: 403,
                    })])
                } else {
                    ScriptedClient::rounds(&[
                        ("v = 3", &rejecting_critique("Circuits", "is_correct = False", "Use KVL.")),
                        ("v = 5", &approving_critique("Circuits", "is_correct = 5 == 5")),
                    ])
                })
            },
            "Find the loop voltage.",
        )
        .expect("solve");

        assert_eq!(outcome.credential, "B");
        assert_eq!(outcome.record.credential, "B");
        assert_eq!(outcome.record.category, "Circuits");
        assert_eq!(outcome.record.final_solution, "v = 5");
        assert_eq!(outcome.final_attempt().final_status, FinalStatus::Verified);

        let stored = store.load(&outcome.problem_id).expect("load");
        assert_eq!(stored.attempts.len(), 2);
        assert_eq!(stored.attempts[0].corrections, "Use KVL.");
    }
}
