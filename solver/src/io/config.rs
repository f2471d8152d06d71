//! Solver configuration stored under `<data-dir>/config.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::script::ScriptLimits;

/// Solver configuration (TOML).
///
/// Edited by humans; missing fields fall back to the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SolverConfig {
    /// Proposer/Skeptic rounds per query before giving up.
    pub max_attempts: u32,
    pub llm: LlmConfig,
    pub credentials: CredentialsConfig,
    pub script: ScriptLimits,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible API root; `/chat/completions` is appended.
    pub base_url: String,
    pub model: String,
    pub proposer_temperature: f32,
    pub skeptic_temperature: f32,
    /// Per-request timeout. Unset means wait indefinitely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Environment variables holding API keys, tried in order.
    pub env_vars: Vec<String>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            llm: LlmConfig::default(),
            credentials: CredentialsConfig::default(),
            script: ScriptLimits::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            proposer_temperature: 0.2,
            skeptic_temperature: 0.1,
            timeout_secs: None,
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            env_vars: ["GROQ_API_KEY1", "GROQ_API_KEY2", "GROQ_API_KEY3"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be >= 1"));
        }
        if self.llm.base_url.trim().is_empty() {
            return Err(anyhow!("llm.base_url must be non-empty"));
        }
        if self.llm.model.trim().is_empty() {
            return Err(anyhow!("llm.model must be non-empty"));
        }
        for (name, value) in [
            ("llm.proposer_temperature", self.llm.proposer_temperature),
            ("llm.skeptic_temperature", self.llm.skeptic_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(anyhow!("{name} must be within 0.0..=2.0"));
            }
        }
        if self.llm.timeout_secs == Some(0) {
            return Err(anyhow!("llm.timeout_secs must be > 0 when set"));
        }
        if self.credentials.env_vars.is_empty()
            || self.credentials.env_vars.iter().any(|v| v.trim().is_empty())
        {
            return Err(anyhow!(
                "credentials.env_vars must be a non-empty array of names"
            ));
        }
        if self.script.max_script_bytes == 0 {
            return Err(anyhow!("script.max_script_bytes must be > 0"));
        }
        if self.script.step_budget == 0 {
            return Err(anyhow!("script.step_budget must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `SolverConfig::default()`.
pub fn load_config(path: &Path) -> Result<SolverConfig> {
    if !path.exists() {
        let cfg = SolverConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: SolverConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &SolverConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, SolverConfig::default());
        assert_eq!(cfg.max_attempts, 2);
        assert_eq!(cfg.llm.proposer_temperature, 0.2);
        assert_eq!(cfg.llm.skeptic_temperature, 0.1);
        assert_eq!(cfg.credentials.env_vars.len(), 3);
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("config.toml");
        let mut cfg = SolverConfig::default();
        cfg.llm.timeout_secs = Some(30);
        cfg.max_attempts = 3;
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
        assert!(!path.with_extension("toml.tmp").exists());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "max_attempts = 4\n[llm]\nmodel = \"other\"\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_attempts, 4);
        assert_eq!(cfg.llm.model, "other");
        assert_eq!(cfg.llm.skeptic_temperature, 0.1);
        assert_eq!(cfg.script, ScriptLimits::default());
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "max_attempts = 0\n").expect("write");
        let err = load_config(&path).expect_err("invalid");
        assert!(format!("{err:#}").contains("max_attempts"));
    }

    #[test]
    fn empty_credentials_are_rejected() {
        let mut cfg = SolverConfig::default();
        cfg.credentials.env_vars.clear();
        assert!(cfg.validate().is_err());
    }
}
