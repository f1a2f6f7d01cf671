//! `OpenAI` chat-completions client.
use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{AssistantReply, ChatClient, ChatMessage, LlmError, Tool};

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model.
pub const DEFAULT_MODEL: &str = "gpt-4";

/// Per-request timeout. Completions with tool schemas can be slow.
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Request body of `POST /chat/completions`.
#[derive(Serialize)]
struct CompletionRequest<'a> {
    /// Model name.
    model: &'a str,
    /// Conversation so far.
    messages: &'a [ChatMessage],
    /// Offered tools.
    #[serde(skip_serializing_if = "no_tools")]
    tools: &'a [Tool],
}

/// Omit `tools` from the body when none are offered.
fn no_tools(tools: &&[Tool]) -> bool {
    tools.is_empty()
}

/// The parts of the response we read.
#[derive(Deserialize)]
struct CompletionResponse {
    /// Candidate replies, the first one is used.
    choices: Vec<Choice>,
}

/// One candidate reply.
#[derive(Deserialize)]
struct Choice {
    /// The assistant message.
    message: ChatMessage,
}

/// LLM client for an `OpenAI`-compatible chat-completions API.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    /// Shared HTTP client.
    http: Client,
    /// API root without trailing slash.
    base_url: String,
    /// Bearer token.
    api_key: String,
    /// Model name.
    model: String,
}

impl OpenAiClient {
    /// Client for `base_url` using `model`.
    ///
    /// # Errors
    /// Errors if the HTTP client cannot be built.
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Result<Self, LlmError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.to_owned(),
            model: model.to_owned(),
        })
    }

    /// Client configured from `OPENAI_API_KEY`, `OPENAI_BASE_URL` and
    /// `OPENAI_MODEL`.
    ///
    /// # Errors
    /// Errors if no API key is set.
    pub fn from_env() -> Result<Self, LlmError> {
        let api_key = env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.is_empty())
            .ok_or(LlmError::MissingApiKey)?;
        let base_url = env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_owned());
        let model = env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_owned());
        Self::new(&base_url, &api_key, &model)
    }

    /// Model used for completions.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ChatClient for OpenAiClient {
    #[tracing::instrument(skip(self, messages, tools), fields(model = %self.model, messages = messages.len()))]
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[Tool],
    ) -> Result<AssistantReply, LlmError> {
        let body = CompletionRequest {
            model: &self.model,
            messages,
            tools,
        };
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|err| {
                format!("Failed to read error response body: {err}")
            });
            tracing::warn!(status = status.as_u16(), "LLM API request failed");
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let completion: CompletionResponse = response.json().await?;
        let Some(choice) = completion.choices.into_iter().next() else {
            return Err(LlmError::EmptyResponse);
        };
        match choice.message {
            ChatMessage::Assistant {
                content,
                tool_calls,
            } => {
                tracing::debug!(tool_calls = tool_calls.len(), "LLM replied");
                Ok(AssistantReply {
                    content,
                    tool_calls,
                })
            }
            ChatMessage::System { content }
            | ChatMessage::User { content }
            | ChatMessage::Tool { content, .. } => Ok(AssistantReply::text(content)),
        }
    }
}
