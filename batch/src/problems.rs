//! Problem list parsing and validation.
//!
//! The list is a TOML file of `[[problems]]` tables; see
//! `batch/problems.toml`.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ProblemFile {
    #[serde(default)]
    pub problems: Vec<Problem>,
}

/// One problem submitted to the solve endpoint.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Problem {
    /// Unique slug (`[a-z0-9_-]+`).
    pub id: String,
    pub domain: String,
    pub query: String,
}

impl ProblemFile {
    /// Load and validate a problem file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read problems {}", path.display()))?;
        Self::parse_str(&contents).with_context(|| format!("load problems {}", path.display()))
    }

    pub fn parse_str(contents: &str) -> Result<Self> {
        let file: ProblemFile = toml::from_str(contents).context("parse problems")?;
        file.validate()?;
        Ok(file)
    }

    fn validate(&self) -> Result<()> {
        if self.problems.is_empty() {
            bail!("problems must be a non-empty array");
        }
        let mut seen = BTreeSet::new();
        for (index, problem) in self.problems.iter().enumerate() {
            problem
                .validate()
                .with_context(|| format!("problems[{index}] invalid"))?;
            if !seen.insert(problem.id.as_str()) {
                bail!("duplicate problem id {}", problem.id);
            }
        }
        Ok(())
    }
}

impl Problem {
    fn validate(&self) -> Result<()> {
        if self.id.is_empty()
            || !self
                .id
                .chars()
                .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '_')
        {
            bail!("id must use [a-z0-9_-] only");
        }
        if self.domain.trim().is_empty() {
            bail!("domain must be non-empty");
        }
        if self.query.trim().is_empty() {
            bail!("query must be non-empty");
        }
        Ok(())
    }
}
