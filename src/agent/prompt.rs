//! Conversation openers for serving one request.
use serde_json::{json, Map, Value};

use crate::config::{ApiDefinition, Schema};
use crate::llm::Tool;

/// Name of the only tool offered to the model.
pub const DATABASE_QUERY: &str = "database_query";

/// The `database_query` tool.
#[must_use]
pub fn database_query_tool() -> Tool {
    Tool::function(
        DATABASE_QUERY,
        "Execute a SQL query against the database",
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The SQL query to execute"
                },
                "params": {
                    "type": "array",
                    "description": "Parameters for the SQL query",
                    "items": {"type": "string"}
                },
                "read_only": {
                    "type": "boolean",
                    "description": "Whether this is a read-only query (true) or a data modification query (false)",
                    "default": true
                }
            },
            "required": ["query"]
        }),
    )
}

/// Instructions describing the endpoint being served.
#[must_use]
pub fn system(api: &ApiDefinition, schema: &Schema) -> String {
    let schema = serde_json::to_string_pretty(schema).unwrap_or_else(|_| "{}".to_owned());
    format!(
        "You are an API server implementing the following endpoint:

Method: {method}
Path: {path}
Description: {description}

Implementation steps:
{implementation}

Database schema information:
{schema}

When you need to query the database, you can use the '{DATABASE_QUERY}' function.
Use %s or $1, $2, ... placeholders in the query and pass the values in 'params'.

IMPORTANT:
1. Your final response MUST be valid JSON that will be returned to the API caller
2. Strictly follow the response schema defined in the implementation steps
3. Only include data fields that are specified in the schema
4. Always include error handling with appropriate status codes
5. All input and output must be in JSON format
6. When the request fails, include the HTTP status as an integer 'status_code' field",
        method = api.method,
        path = api.path,
        description = api.description,
        implementation = api.implementation,
    )
}

/// The request itself.
#[must_use]
pub fn user(request_data: &Map<String, Value>) -> String {
    let data = serde_json::to_string_pretty(request_data).unwrap_or_else(|_| "{}".to_owned());
    format!(
        "Process this API request:

Request data: {data}

Respond with ONLY the appropriate JSON that should be returned to the client.
Do not include any explanations or markdown formatting in your response.
The response should be a valid JSON object that matches the schema specified in the implementation steps."
    )
}
