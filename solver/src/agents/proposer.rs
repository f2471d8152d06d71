//! Proposer agent: drafts a step-by-step solution.

use anyhow::Result;
use tracing::{debug, instrument};

use crate::io::llm::{ChatMessage, CompletionClient, CompletionRequest};
use crate::io::prompt::PromptEngine;

use super::complete_fail_open;

#[derive(Debug, Clone)]
pub struct Proposer {
    temperature: f32,
}

impl Proposer {
    pub fn new(temperature: f32) -> Self {
        Self { temperature }
    }

    /// Draft a solution, prefixed by feedback from a failed attempt if any.
    #[instrument(skip_all, fields(has_feedback = !prior_feedback.trim().is_empty()))]
    pub fn generate<C: CompletionClient>(
        &self,
        client: &C,
        prompts: &PromptEngine,
        query: &str,
        prior_feedback: &str,
    ) -> Result<String> {
        let request = CompletionRequest {
            messages: vec![
                ChatMessage::system(prompts.proposer_system()),
                ChatMessage::user(prompts.render_proposer(query, prior_feedback)?),
            ],
            temperature: self.temperature,
        };
        let solution = complete_fail_open(client, &request, "proposer")?;
        debug!(bytes = solution.len(), "proposer solution received");
        Ok(solution)
    }
}
