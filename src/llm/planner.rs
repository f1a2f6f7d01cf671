//! Turning a free-text endpoint description into an endpoint plan.
use serde_json::Value;

use super::extract::extract_json;
use super::{ChatClient, ChatMessage, LlmError};
use crate::config::Schema;

/// Implementation plan used when the model gives nothing usable.
pub const DEFAULT_IMPLEMENTATION: &str =
    "1. Parse request parameters\n2. Query the database\n3. Return results";

/// Instructions for designing an endpoint.
const SYSTEM_PROMPT: &str = r#"You are helping to design an API endpoint. Given a user's description,
you'll provide:
1. A concise one-line description of what the API does
2. A detailed step-by-step implementation plan
3. The most appropriate HTTP method (GET, POST, PUT, DELETE, etc.)
4. A response schema that defines the expected JSON structure of the API response

Format your response as a JSON object with these fields:
{
    "method": "HTTP_METHOD",
    "concise_description": "Short description",
    "implementation": "Detailed step-by-step implementation plan including:\n1. The steps to handle the request\n2. The expected response schema in JSON format\n3. Error handling guidelines"
}

Every response of the endpoint must carry a "status" field ("success" or "error"),
and error responses must carry a descriptive message.
Make sure to include a specific JSON schema example in the implementation steps."#;

/// Method, description and plan of an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointPlan {
    /// Upper-case HTTP method.
    pub method: String,
    /// One-line description.
    pub concise_description: String,
    /// Step-by-step implementation plan.
    pub implementation: String,
}

impl EndpointPlan {
    /// Fallback plan for a new endpoint.
    #[must_use]
    pub fn new_default(description: &str) -> Self {
        Self {
            method: "GET".to_owned(),
            concise_description: description.to_owned(),
            implementation: DEFAULT_IMPLEMENTATION.to_owned(),
        }
    }

    /// Read a plan from the model's JSON, taking missing or unusable fields
    /// from `defaults`.
    #[must_use]
    pub fn from_json(value: &Value, defaults: &Self) -> Self {
        let text = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|text| !text.is_empty())
        };
        let method = text("method")
            .map_or_else(|| defaults.method.clone(), str::to_uppercase);
        let concise_description = text("concise_description")
            .map_or_else(|| defaults.concise_description.clone(), str::to_owned);
        let implementation = match value.get("implementation") {
            Some(&Value::String(ref plan)) if !plan.trim().is_empty() => plan.trim().to_owned(),
            Some(other) if other.is_object() || other.is_array() => {
                serde_json::to_string_pretty(other)
                    .unwrap_or_else(|_| defaults.implementation.clone())
            }
            _ => defaults.implementation.clone(),
        };
        Self {
            method,
            concise_description,
            implementation,
        }
    }
}

/// Ask the model to plan the endpoint at `path` from `description`.
///
/// A reply that is not JSON yields `defaults`.
///
/// # Errors
/// Errors if the model cannot be reached.
#[tracing::instrument(skip(client, schema, defaults))]
pub async fn plan_endpoint(
    client: &dyn ChatClient,
    path: &str,
    description: &str,
    schema: &Schema,
    defaults: &EndpointPlan,
) -> Result<EndpointPlan, LlmError> {
    let schema_json = serde_json::to_string(schema).unwrap_or_else(|_| "{}".to_owned());
    let messages = [
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(format!(
            "API Path: {path}\n\
             User Description: {description}\n\
             Database Schema: {schema_json}\n\n\
             IMPORTANT: Return your response as a valid JSON object matching the format described above."
        )),
    ];
    let reply = client.complete(&messages, &[]).await?;
    let content = reply.content.unwrap_or_default();
    match extract_json(&content) {
        Some(value) => Ok(EndpointPlan::from_json(&value, defaults)),
        None => {
            tracing::warn!("Failed to parse LLM response as JSON. Using default values.");
            Ok(defaults.clone())
        }
    }
}
