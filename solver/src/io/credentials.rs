//! API credential sets read from the environment.

use std::fmt;

use anyhow::{Result, bail};
use tracing::warn;

/// One API key, labelled with the variable it came from.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub label: String,
    api_key: String,
}

impl Credential {
    pub fn new(label: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            api_key: api_key.into(),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("label", &self.label)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Read each named variable from the process environment, in order.
pub fn load_credentials(env_vars: &[String]) -> Result<Vec<Credential>> {
    credentials_from(env_vars, |name| std::env::var(name).ok())
}

/// Collect credentials through `lookup`; unset or blank variables are skipped.
pub fn credentials_from(
    env_vars: &[String],
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Vec<Credential>> {
    let mut credentials = Vec::new();
    for name in env_vars {
        match lookup(name).map(|v| v.trim().to_string()) {
            Some(key) if !key.is_empty() => credentials.push(Credential::new(name, key)),
            _ => warn!(env_var = %name, "credential variable unset, skipping"),
        }
    }
    if credentials.is_empty() {
        bail!(
            "no API credentials found (set one of: {})",
            env_vars.join(", ")
        );
    }
    Ok(credentials)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn unset_and_blank_variables_are_skipped() {
        let creds = credentials_from(&names(&["A", "B", "C"]), |name| match name {
            "A" => Some("  ".to_string()),
            "C" => Some("key-c".to_string()),
            _ => None,
        })
        .expect("one credential");
        assert_eq!(creds, vec![Credential::new("C", "key-c")]);
    }

    #[test]
    fn order_is_preserved() {
        let creds = credentials_from(&names(&["B", "A"]), |name| Some(format!("key-{name}")))
            .expect("credentials");
        let labels: Vec<&str> = creds.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, ["B", "A"]);
    }

    #[test]
    fn no_credentials_is_an_error() {
        let err = credentials_from(&names(&["A"]), |_| None).expect_err("empty");
        assert!(err.to_string().contains("A"));
    }

    #[test]
    fn debug_output_hides_the_key() {
        let rendered = format!("{:?}", Credential::new("A", "secret-value"));
        assert!(!rendered.contains("secret-value"));
    }
}
