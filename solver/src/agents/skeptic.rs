//! Skeptic agent: audits a proposed solution and writes the verification
//! script in the tag protocol of [`crate::core::tags`].

use anyhow::Result;
use tracing::{debug, instrument};

use crate::io::llm::{ChatMessage, CompletionClient, CompletionRequest};
use crate::io::prompt::PromptEngine;

use super::complete_fail_open;

#[derive(Debug, Clone)]
pub struct Skeptic {
    temperature: f32,
}

impl Skeptic {
    pub fn new(temperature: f32) -> Self {
        Self { temperature }
    }

    #[instrument(skip_all, fields(solution_bytes = proposed_solution.len()))]
    pub fn audit<C: CompletionClient>(
        &self,
        client: &C,
        prompts: &PromptEngine,
        query: &str,
        proposed_solution: &str,
    ) -> Result<String> {
        let request = CompletionRequest {
            messages: vec![
                ChatMessage::system(prompts.skeptic_system()),
                ChatMessage::user(prompts.render_skeptic(query, proposed_solution)?),
            ],
            temperature: self.temperature,
        };
        let critique = complete_fail_open(client, &request, "skeptic")?;
        debug!(bytes = critique.len(), "skeptic critique received");
        Ok(critique)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::DEGRADED_PREFIX;
    use crate::core::tags::parse_audit;
    use crate::io::llm::CompletionError;
    use crate::test_support::ScriptedClient;

    #[test]
    fn sends_problem_and_solution() {
        let client = ScriptedClient::new(vec![Ok("STATUS=TRUE".to_string())]);
        let critique = Skeptic::new(0.1)
            .audit(&client, &PromptEngine::new(), "Integrate x.", "x**2/2")
            .expect("critique");
        assert_eq!(critique, "STATUS=TRUE");

        let request = &client.requests()[0];
        assert_eq!(request.temperature, 0.1);
        assert!(request.messages[0].content.contains("[SKEPTIC]"));
        assert_eq!(
            request.messages[1].content,
            "PROBLEM: Integrate x.\n\nPROPOSED SOLUTION:\nx**2/2"
        );
    }

    #[test]
    fn degraded_critique_parses_as_a_rejection() {
        let client = ScriptedClient::new(vec![Err(CompletionError::Service {
            status: 500,
            body: "oops".to_string(),
        })]);
        let critique = Skeptic::new(0.1)
            .audit(&client, &PromptEngine::new(), "Q", "S")
            .expect("degraded text");
        assert!(critique.starts_with(DEGRADED_PREFIX));
        let parsed = parse_audit(&critique);
        assert!(!parsed.semantic_status);
        assert_eq!(parsed.script, "");
    }

    #[test]
    fn rate_limits_propagate() {
        let client = ScriptedClient::new(vec![Err(CompletionError::RateLimited)]);
        assert!(
            Skeptic::new(0.1)
                .audit(&client, &PromptEngine::new(), "Q", "S")
                .is_err()
        );
    }
}
