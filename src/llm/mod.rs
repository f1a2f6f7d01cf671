//! Language model access.
//!
//! Everything the rest of the crate needs from an LLM goes through the
//! [`ChatClient`] trait: a chat-completions call that may answer with text or
//! with tool calls.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub mod extract;
pub mod openai;
pub mod planner;

pub use openai::OpenAiClient;

/// Errors raised while talking to the LLM.
#[derive(Debug, Error)]
pub enum LlmError {
    /// No API key in the environment.
    #[error("OPENAI_API_KEY environment variable is not set")]
    MissingApiKey,
    /// The request did not complete.
    #[error("Failed to send request to the LLM API: {0}")]
    Http(#[from] reqwest::Error),
    /// The API answered with a non-success status.
    #[error("LLM API returned {status}: {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, as text.
        body: String,
    },
    /// The API answered without any choice.
    #[error("LLM API returned no choices")]
    EmptyResponse,
}

/// One message of a chat conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    /// Instructions.
    System {
        /// Text.
        content: String,
    },
    /// Caller input.
    User {
        /// Text.
        content: String,
    },
    /// Model output.
    Assistant {
        /// Text, absent when only tools are called.
        #[serde(default)]
        content: Option<String>,
        /// Requested tool invocations.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    /// Result of a tool invocation.
    Tool {
        /// Id of the call this answers.
        tool_call_id: String,
        /// Tool name.
        name: String,
        /// Result, usually JSON text.
        content: String,
    },
}

impl ChatMessage {
    /// System message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    /// User message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call id, echoed in the tool result.
    pub id: String,
    /// Always `function`.
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    /// Function and its JSON-encoded arguments.
    pub function: FunctionCall,
}

/// Function name and arguments of a [`ToolCall`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Function name.
    pub name: String,
    /// JSON-encoded arguments.
    pub arguments: String,
}

/// A tool offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tool {
    /// Always `function`.
    #[serde(rename = "type")]
    pub kind: String,
    /// The function.
    pub function: FunctionSpec,
}

/// Function offered as a tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionSpec {
    /// Function name.
    pub name: String,
    /// What it does.
    pub description: String,
    /// JSON schema of the arguments.
    pub parameters: Value,
}

impl Tool {
    /// Offer a function.
    #[must_use]
    pub fn function(name: &str, description: &str, parameters: Value) -> Self {
        Self {
            kind: function_kind(),
            function: FunctionSpec {
                name: name.to_owned(),
                description: description.to_owned(),
                parameters,
            },
        }
    }
}

/// Serde default for tool kinds.
fn function_kind() -> String {
    "function".to_owned()
}

/// What the model answered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssistantReply {
    /// Text content.
    pub content: Option<String>,
    /// Tool invocations.
    pub tool_calls: Vec<ToolCall>,
}

impl AssistantReply {
    /// Text-only reply.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    /// The reply as a conversation message.
    #[must_use]
    pub fn into_message(self) -> ChatMessage {
        ChatMessage::Assistant {
            content: self.content,
            tool_calls: self.tool_calls,
        }
    }
}

/// Chat-completions capable model.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Send the conversation, offering `tools`, and return the next reply.
    ///
    /// # Errors
    /// Errors if the model cannot be reached or answers with an error.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[Tool],
    ) -> Result<AssistantReply, LlmError>;
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_message_serialize_expect_role_tag() {
        let actual = serde_json::to_value(ChatMessage::system("hi")).unwrap();
        assert_eq!(actual, json!({"role": "system", "content": "hi"}));
    }

    #[test]
    fn test_chat_message_when_text_assistant_expect_no_tool_calls_key() {
        let actual = serde_json::to_value(AssistantReply::text("done").into_message()).unwrap();
        assert_eq!(actual, json!({"role": "assistant", "content": "done"}));
    }

    #[test]
    fn test_chat_message_deserialize_when_tool_call_expect_parsed() {
        let raw = json!({
            "role": "assistant",
            "content": null,
            "refusal": null,
            "tool_calls": [{
                "id": "call_1",
                "type": "function",
                "function": {"name": "database_query", "arguments": "{\"query\":\"SELECT 1\"}"}
            }]
        });
        let actual: ChatMessage = serde_json::from_value(raw).unwrap();
        let ChatMessage::Assistant { content, tool_calls } = actual else {
            panic!("expected an assistant message");
        };
        assert!(content.is_none());
        assert_eq!(tool_calls[0].function.name, "database_query");
        assert_eq!(tool_calls[0].kind, "function");
    }
}
