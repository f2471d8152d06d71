//! Prompt rendering for the Proposer and Skeptic.

use anyhow::Result;
use minijinja::{Environment, context};

const PROPOSER_SYSTEM: &str = include_str!("prompts/proposer_system.md");
const PROPOSER_USER: &str = include_str!("prompts/proposer_user.md");
const SKEPTIC_SYSTEM: &str = include_str!("prompts/skeptic_system.md");
const SKEPTIC_USER: &str = include_str!("prompts/skeptic_user.md");

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_keep_trailing_newline(false);
        env.add_template("proposer_user", PROPOSER_USER)
            .expect("proposer template should be valid");
        env.add_template("skeptic_user", SKEPTIC_USER)
            .expect("skeptic template should be valid");
        Self { env }
    }

    pub fn proposer_system(&self) -> &'static str {
        PROPOSER_SYSTEM.trim_end()
    }

    pub fn skeptic_system(&self) -> &'static str {
        SKEPTIC_SYSTEM.trim_end()
    }

    /// Prior feedback (omitted when blank) followed by the problem.
    pub fn render_proposer(&self, query: &str, feedback: &str) -> Result<String> {
        let template = self.env.get_template("proposer_user")?;
        let rendered = template.render(context! {
            feedback => Some(feedback.trim()).filter(|s| !s.is_empty()),
            query => query,
        })?;
        Ok(rendered)
    }

    pub fn render_skeptic(&self, query: &str, solution: &str) -> Result<String> {
        let template = self.env.get_template("skeptic_user")?;
        let rendered = template.render(context! {
            query => query,
            solution => solution,
        })?;
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proposer_omits_empty_feedback() {
        let engine = PromptEngine::new();
        let rendered = engine.render_proposer("Find x.", "  ").expect("render");
        assert_eq!(rendered, "USER PROBLEM: Find x.");
    }

    #[test]
    fn proposer_prepends_feedback() {
        let engine = PromptEngine::new();
        let rendered = engine
            .render_proposer("Find x.", "Both symbolic and semantic verification failed.")
            .expect("render");
        assert_eq!(
            rendered,
            "Both symbolic and semantic verification failed.\n\nUSER PROBLEM: Find x."
        );
    }

    #[test]
    fn skeptic_message_carries_problem_and_solution() {
        let engine = PromptEngine::new();
        let rendered = engine
            .render_skeptic("Integrate x.", "x**2/2 + C")
            .expect("render");
        assert_eq!(
            rendered,
            "PROBLEM: Integrate x.\n\nPROPOSED SOLUTION:\nx**2/2 + C"
        );
    }

    #[test]
    fn skeptic_role_names_every_tag() {
        let engine = PromptEngine::new();
        let system = engine.skeptic_system();
        for tag in crate::core::tags::Tag::ALL {
            assert!(system.contains(&format!("[{}]", tag.as_str())), "{tag:?}");
        }
        assert!(system.contains("STATUS=TRUE"));
        assert!(!system.contains("STATUS=CORRECT"));
        assert!(system.contains("is_correct"));
    }
}
