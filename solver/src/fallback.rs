//! Credential fallback driver.
//!
//! Credential sets are tried in order, each with a fresh client and Auditor.
//! The first successful run wins and work done under earlier sets is
//! discarded. The Auditor itself never retries across credentials.

use anyhow::{Result, bail};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::audit::{Auditor, AuditorConfig};
use crate::core::types::AuditHistory;
use crate::io::credentials::Credential;
use crate::io::llm::CompletionClient;

/// Successful run and the credential set that produced it.
#[derive(Debug, Clone)]
pub struct FallbackOutcome {
    pub credential: String,
    pub history: AuditHistory,
    /// `(label, error)` for every set that failed before the winner.
    pub failures: Vec<(String, String)>,
}

/// Context attached to the last error once every credential set failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("all {tried} credential sets failed")]
pub struct CredentialsExhausted {
    pub tried: usize,
}

#[instrument(skip_all, fields(credentials = credentials.len()))]
pub fn run_with_fallback<C, F>(
    credentials: &[Credential],
    build_client: F,
    config: &AuditorConfig,
    query: &str,
) -> Result<FallbackOutcome>
where
    C: CompletionClient,
    F: Fn(&Credential) -> Result<C>,
{
    if credentials.is_empty() {
        bail!("no credential sets configured");
    }
    let mut failures = Vec::new();
    let mut last_error = None;
    for credential in credentials {
        let run = build_client(credential).and_then(|client| {
            let auditor = Auditor::new(config)?;
            auditor.process_query(&client, query)
        });
        match run {
            Ok(history) => {
                info!(credential = %credential.label, attempts = history.len(), "query processed");
                return Ok(FallbackOutcome {
                    credential: credential.label.clone(),
                    history,
                    failures,
                });
            }
            Err(err) => {
                let rendered = format!("{err:#}");
                warn!(credential = %credential.label, error = %rendered, "credential set failed, trying next");
                failures.push((credential.label.clone(), rendered));
                last_error = Some(err);
            }
        }
    }
    let exhausted = CredentialsExhausted {
        tried: failures.len(),
    };
    match last_error {
        Some(err) => Err(err.context(exhausted)),
        None => Err(exhausted.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::FinalStatus;
    use crate::io::llm::CompletionError;
    use crate::test_support::{ScriptedClient, approving_critique};
    use anyhow::anyhow;

    fn creds(labels: &[&str]) -> Vec<Credential> {
        labels
            .iter()
            .map(|label| Credential::new(*label, format!("key-{label}")))
            .collect()
    }

    fn verified_client() -> ScriptedClient {
        ScriptedClient::rounds(&[("ok", &approving_critique("Calculus", "is_correct = True"))])
    }

    #[test]
    fn first_success_wins() {
        let outcome = run_with_fallback(
            &creds(&["A", "B"]),
            |_| Ok(verified_client()),
            &AuditorConfig::default(),
            "q",
        )
        .expect("outcome");
        assert_eq!(outcome.credential, "A");
        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.history.final_attempt().final_status, FinalStatus::Verified);
    }

    #[test]
    fn rejected_credential_falls_through_to_next() {
        let outcome = run_with_fallback(
            &creds(&["A", "B", "C"]),
            |credential| {
                Ok(match credential.label.as_str() {
                    "A" => ScriptedClient::new(vec![Err(CompletionError::CredentialRejected {
                        status: 401,
                    })]),
                    _ => verified_client(),
                })
            },
            &AuditorConfig::default(),
            "q",
        )
        .expect("outcome");
        assert_eq!(outcome.credential, "B");
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].0, "A");
    }

    #[test]
    fn client_construction_failure_is_a_fallback() {
        let outcome = run_with_fallback(
            &creds(&["A", "B"]),
            |credential| {
                if credential.label == "A" {
                    Err(anyhow!("bad key format"))
                } else {
                    Ok(verified_client())
                }
            },
            &AuditorConfig::default(),
            "q",
        )
        .expect("outcome");
        assert_eq!(outcome.credential, "B");
    }

    #[test]
    fn exhausting_every_set_is_an_error() {
        let err = run_with_fallback(
            &creds(&["A", "B", "C"]),
            |_| Ok(ScriptedClient::new(vec![Err(CompletionError::RateLimited)])),
            &AuditorConfig::default(),
            "q",
        )
        .expect_err("all failed");
        assert_eq!(
            err.downcast_ref::<CredentialsExhausted>(),
            Some(&CredentialsExhausted { tried: 3 })
        );
        let rendered = format!("{err:#}");
        assert!(rendered.contains("all 3 credential sets failed"));
        assert!(rendered.contains("rate limited"));
    }

    #[test]
    fn empty_credential_list_is_an_error() {
        let err = run_with_fallback(
            &[],
            |_| Ok(verified_client()),
            &AuditorConfig::default(),
            "q",
        )
        .expect_err("no credentials");
        assert!(err.to_string().contains("no credential sets"));
    }
}
