// Completion provider: the interface the handlers call, plus the
// OpenRouter-compatible HTTP client that implements it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::AiSettings;
use crate::prompt::PromptMessage;

/// Errors from a completion request.
#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("completion request failed: {0}")]
    Transport(reqwest::Error),
    #[error("completion request timed out")]
    Timeout,
    #[error("completion provider returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("completion provider returned no choices")]
    NoChoices,
}

impl From<reqwest::Error> for AiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AiError::Timeout
        } else {
            AiError::Transport(err)
        }
    }
}

/// External completion service: an ordered role-tagged message list in,
/// a single completion string out.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, AiError>;
}

// ── Wire types ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [PromptMessage],
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

// ── HTTP client ──────────────────────────────────────────────────────

/// Client for an OpenRouter-style chat-completions endpoint.
pub struct OpenRouterClient {
    client: reqwest::Client,
    settings: AiSettings,
}

impl OpenRouterClient {
    /// Build a client with the request deadline from `settings`.
    pub fn new(settings: AiSettings) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()?;
        Ok(Self { client, settings })
    }
}

#[async_trait]
impl CompletionProvider for OpenRouterClient {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, AiError> {
        let request = ChatCompletionRequest {
            model: &self.settings.model,
            messages,
        };

        let response = self
            .client
            .post(&self.settings.base_url)
            .bearer_auth(&self.settings.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatCompletionResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(AiError::NoChoices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::Role;

    #[test]
    fn test_request_wire_shape() {
        let messages = vec![
            PromptMessage::new(Role::System, "You are Bob."),
            PromptMessage::new(Role::User, "hello"),
        ];
        let request = ChatCompletionRequest {
            model: "openai/gpt-4o-mini",
            messages: &messages,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "openai/gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "hello");
    }

    #[test]
    fn test_response_wire_shape() {
        let body = r#"{
            "id": "gen-123",
            "choices": [
                {"message": {"role": "assistant", "content": "Well met."}}
            ]
        }"#;
        let parsed: ChatCompletionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content, "Well met.");
    }

    #[test]
    fn test_empty_choices() {
        let parsed: ChatCompletionResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        let result = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(AiError::NoChoices);
        assert!(matches!(result, Err(AiError::NoChoices)));
    }

    #[test]
    fn test_status_error_display() {
        let err = AiError::Status {
            status: 429,
            body: "rate limited".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "completion provider returned status 429: rate limited"
        );
    }
}
