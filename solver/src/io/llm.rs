//! Chat-completion client abstraction.
//!
//! The [`CompletionClient`] trait decouples the agents from the HTTP backend.
//! Tests use scripted clients that return canned responses without touching
//! the network.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::io::config::LlmConfig;
use crate::io::credentials::Credential;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// One completion call: a system role, a user message, and a temperature.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompletionError {
    #[error("credential rejected (http {status})")]
    CredentialRejected { status: u16 },
    #[error("rate limited (http 429)")]
    RateLimited,
    #[error("completion service returned http {status}: {body}")]
    Service { status: u16, body: String },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("malformed completion response: {0}")]
    Malformed(String),
}

impl CompletionError {
    /// Classify an HTTP status code.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => CompletionError::CredentialRejected { status },
            429 => CompletionError::RateLimited,
            _ => CompletionError::Service { status, body },
        }
    }

    /// Errors that make the whole credential set unusable.
    ///
    /// Agents return everything else as degraded text.
    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            CompletionError::CredentialRejected { .. } | CompletionError::RateLimited
        )
    }
}

/// Abstraction over completion backends.
pub trait CompletionClient {
    fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

impl<C: CompletionClient + ?Sized> CompletionClient for &C {
    fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        (**self).complete(request)
    }
}

impl<C: CompletionClient + ?Sized> CompletionClient for Box<C> {
    fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        (**self).complete(request)
    }
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct HttpCompletionClient {
    agent: ureq::Agent,
    endpoint: String,
    model: String,
    credential: Credential,
}

impl HttpCompletionClient {
    pub fn new(config: &LlmConfig, credential: Credential) -> Self {
        let mut builder = ureq::AgentBuilder::new();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Self {
            agent: builder.build(),
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            credential,
        }
    }

    pub fn credential_label(&self) -> &str {
        &self.credential.label
    }
}

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

impl CompletionClient for HttpCompletionClient {
    #[instrument(skip_all, fields(model = %self.model, credential = %self.credential.label))]
    fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let body = ChatCompletionBody {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
        };
        let response = self
            .agent
            .post(&self.endpoint)
            .set("content-type", "application/json")
            .set(
                "authorization",
                &format!("Bearer {}", self.credential.api_key()),
            )
            .send_json(&body);

        let json: Value = match response {
            Ok(response) => response
                .into_json()
                .map_err(|err| CompletionError::Malformed(err.to_string()))?,
            Err(ureq::Error::Status(code, response)) => {
                let body = response.into_string().unwrap_or_default();
                warn!(status = code, "completion request failed");
                return Err(CompletionError::from_status(code, body));
            }
            Err(ureq::Error::Transport(err)) => {
                return Err(CompletionError::Transport(err.to_string()));
            }
        };
        let content = extract_content(&json)?;
        debug!(bytes = content.len(), "completion received");
        Ok(content)
    }
}

/// Pull `choices[0].message.content` out of a completion response.
pub fn extract_content(json: &Value) -> Result<String, CompletionError> {
    json.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CompletionError::Malformed("missing choices[0].message.content".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_codes_are_classified() {
        assert_eq!(
            CompletionError::from_status(401, String::new()),
            CompletionError::CredentialRejected { status: 401 }
        );
        assert_eq!(
            CompletionError::from_status(403, String::new()),
            CompletionError::CredentialRejected { status: 403 }
        );
        assert_eq!(
            CompletionError::from_status(429, String::new()),
            CompletionError::RateLimited
        );
        assert!(matches!(
            CompletionError::from_status(503, "busy".to_string()),
            CompletionError::Service { status: 503, .. }
        ));
    }

    #[test]
    fn only_credential_errors_propagate() {
        assert!(CompletionError::RateLimited.is_credential_failure());
        assert!(CompletionError::CredentialRejected { status: 401 }.is_credential_failure());
        assert!(!CompletionError::Transport("dns".to_string()).is_credential_failure());
        assert!(
            !CompletionError::Service {
                status: 500,
                body: String::new()
            }
            .is_credential_failure()
        );
        assert!(!CompletionError::Malformed("x".to_string()).is_credential_failure());
    }

    #[test]
    fn content_is_extracted_from_first_choice() {
        let body = json!({"choices": [{"message": {"role": "assistant", "content": "hi"}}]});
        assert_eq!(extract_content(&body).expect("content"), "hi");
        let empty = json!({"choices": []});
        assert!(matches!(
            extract_content(&empty),
            Err(CompletionError::Malformed(_))
        ));
    }

    #[test]
    fn request_body_uses_lowercase_roles() {
        let messages = [ChatMessage::system("role"), ChatMessage::user("ask")];
        let body = ChatCompletionBody {
            model: "m",
            messages: &messages,
            temperature: 0.5,
        };
        let json = serde_json::to_value(&body).expect("serialize");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "ask");
        assert_eq!(json["temperature"], 0.5);
    }

    #[test]
    fn endpoint_joins_base_url() {
        let config = LlmConfig {
            base_url: "http://localhost:9/v1/".to_string(),
            ..LlmConfig::default()
        };
        let client = HttpCompletionClient::new(&config, Credential::new("K", "k"));
        assert_eq!(client.endpoint, "http://localhost:9/v1/chat/completions");
        assert_eq!(client.credential_label(), "K");
    }
}
