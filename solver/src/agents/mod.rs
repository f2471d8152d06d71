//! Proposer and Skeptic agents.
//!
//! Both agents make exactly one completion call per invocation. Transport,
//! service and malformed-response failures come back as degraded text so
//! the auditor loop keeps running; a rejected or rate-limited credential is
//! returned as an error so the fallback driver can move to the next set.

use anyhow::Result;
use tracing::warn;

use crate::io::llm::{CompletionClient, CompletionRequest};

pub mod proposer;
pub mod skeptic;

/// Prefix of the text an agent returns when the completion call failed.
pub const DEGRADED_PREFIX: &str = "Error connecting to completion service: ";

pub(crate) fn complete_fail_open<C: CompletionClient>(
    client: &C,
    request: &CompletionRequest,
    agent: &'static str,
) -> Result<String> {
    match client.complete(request) {
        Ok(text) => Ok(text),
        Err(err) if err.is_credential_failure() => {
            Err(anyhow::Error::new(err).context(format!("{agent} completion")))
        }
        Err(err) => {
            warn!(agent, error = %err, "completion failed, continuing with degraded text");
            Ok(format!("{DEGRADED_PREFIX}{err}"))
        }
    }
}
