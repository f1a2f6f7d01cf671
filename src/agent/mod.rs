//! Serving a request by letting the model work through the endpoint's
//! implementation steps, querying the database as it goes.
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::config::{ApiDefinition, Schema};
use crate::db::QueryRunner;
use crate::llm::extract::extract_json;
use crate::llm::{ChatClient, ChatMessage, LlmError, ToolCall};

pub mod prompt;

/// Model round trips allowed per request.
pub const MAX_TURNS: usize = 10;

/// Arguments of a `database_query` call.
#[derive(Debug, Deserialize)]
struct QueryArguments {
    /// SQL text.
    #[serde(default)]
    query: String,
    /// Placeholder values.
    #[serde(default)]
    params: Option<Vec<Value>>,
    /// What the model claims about the statement.
    #[serde(default = "read_only_default")]
    read_only: bool,
}

/// Serde default for `read_only`.
const fn read_only_default() -> bool {
    true
}

/// Processes requests for any endpoint.
#[derive(Clone)]
pub struct Agent {
    /// Model.
    llm: Arc<dyn ChatClient>,
    /// Database the model may query.
    database: Arc<dyn QueryRunner>,
    /// Schema shown to the model.
    schema: Arc<Schema>,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter
            .debug_struct("Agent")
            .field("tables", &self.schema.values().map(std::collections::BTreeMap::len).sum::<usize>())
            .finish_non_exhaustive()
    }
}

impl Agent {
    /// Agent backed by `llm` and `database`.
    #[must_use]
    pub fn new(llm: Arc<dyn ChatClient>, database: Arc<dyn QueryRunner>, schema: Arc<Schema>) -> Self {
        Self {
            llm,
            database,
            schema,
        }
    }

    /// Produce the JSON response for a request to `api` carrying `request_data`.
    ///
    /// # Errors
    /// Errors only if the model cannot be reached. Query failures are handed
    /// back to the model, and running out of turns yields an error payload.
    #[tracing::instrument(name = "Agent", skip_all, fields(api = %api.name))]
    pub async fn process(
        &self,
        api: &ApiDefinition,
        request_data: &Map<String, Value>,
    ) -> Result<Value, LlmError> {
        let tools = [prompt::database_query_tool()];
        let mut messages = vec![
            ChatMessage::system(prompt::system(api, &self.schema)),
            ChatMessage::user(prompt::user(request_data)),
        ];

        for turn in 1..=MAX_TURNS {
            let reply = self.llm.complete(&messages, &tools).await?;
            if reply.tool_calls.is_empty() {
                tracing::debug!(turn, "Final response");
                let content = reply.content.unwrap_or_default();
                return Ok(extract_json(&content)
                    .unwrap_or_else(|| json!({ "status": "success", "result": content })));
            }

            tracing::debug!(turn, calls = reply.tool_calls.len(), "Tool calls");
            let calls = reply.tool_calls.clone();
            messages.push(reply.into_message());
            for call in calls {
                let result = self.call_tool(&call).await;
                messages.push(ChatMessage::Tool {
                    tool_call_id: call.id,
                    name: call.function.name,
                    content: result.to_string(),
                });
            }
        }

        tracing::warn!("Processing limit of {MAX_TURNS} turns reached");
        Ok(json!({
            "status": "error",
            "error": "Processing limit reached without generating a final response",
        }))
    }

    /// Run one tool call, describing its outcome as JSON.
    async fn call_tool(&self, call: &ToolCall) -> Value {
        if call.function.name != prompt::DATABASE_QUERY {
            tracing::warn!(tool = %call.function.name, "Model called an unknown tool");
            return json!({ "error": format!("Unknown tool: {}", call.function.name) });
        }
        let arguments: QueryArguments = match serde_json::from_str(&call.function.arguments) {
            Ok(arguments) => arguments,
            Err(err) => {
                return json!({ "error": "Invalid tool arguments", "details": err.to_string() })
            }
        };
        if arguments.query.trim().is_empty() {
            return json!({ "error": "Invalid tool arguments", "details": "query is empty" });
        }
        let params = arguments.params.unwrap_or_default();
        self.database
            .run_query(&arguments.query, &params, arguments.read_only)
            .await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::llm::{AssistantReply, FunctionCall, Tool};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned replies and records what it was sent.
    #[derive(Default)]
    struct Scripted {
        replies: Mutex<VecDeque<AssistantReply>>,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl Scripted {
        fn new(replies: impl IntoIterator<Item = AssistantReply>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into_iter().collect()),
                seen: Mutex::default(),
            })
        }
    }

    #[async_trait]
    impl ChatClient for Scripted {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            _tools: &[Tool],
        ) -> Result<AssistantReply, LlmError> {
            self.seen.lock().unwrap().push(messages.to_vec());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or(LlmError::EmptyResponse)
        }
    }

    /// Records queries and answers with one fixed row.
    #[derive(Default)]
    struct Recorder {
        queries: Mutex<Vec<(String, Vec<Value>, bool)>>,
    }

    #[async_trait]
    impl QueryRunner for Recorder {
        async fn run_query(&self, query: &str, params: &[Value], read_only: bool) -> Value {
            self.queries
                .lock()
                .unwrap()
                .push((query.to_owned(), params.to_vec(), read_only));
            json!({"status": "success", "data": [{"id": 1, "name": "ada"}], "rowCount": 1})
        }
    }

    fn tool_call(id: &str, name: &str, arguments: &str) -> AssistantReply {
        AssistantReply {
            content: None,
            tool_calls: vec![ToolCall {
                id: id.into(),
                kind: "function".into(),
                function: FunctionCall {
                    name: name.into(),
                    arguments: arguments.into(),
                },
            }],
        }
    }

    fn agent(llm: Arc<Scripted>, database: Arc<Recorder>) -> Agent {
        Agent::new(llm, database, Arc::new(Schema::new()))
    }

    fn api() -> ApiDefinition {
        ApiDefinition::new("GET", "/users/{id}", "Fetch a user", "1. Select the user by id")
    }

    #[actix_web::test]
    async fn test_process_when_direct_json_expect_parsed() {
        let llm = Scripted::new([AssistantReply::text("{\"status\": \"success\", \"users\": []}")]);
        let actual = agent(llm, Arc::default()).process(&api(), &Map::new()).await.unwrap();
        assert_eq!(actual, json!({"status": "success", "users": []}));
    }

    #[actix_web::test]
    async fn test_process_when_prose_expect_wrapped_result() {
        let llm = Scripted::new([AssistantReply::text("There are no users.")]);
        let actual = agent(llm, Arc::default()).process(&api(), &Map::new()).await.unwrap();
        assert_eq!(actual, json!({"status": "success", "result": "There are no users."}));
    }

    #[actix_web::test]
    async fn test_process_when_tool_call_expect_result_fed_back() {
        let llm = Scripted::new([
            tool_call(
                "call_1",
                "database_query",
                r#"{"query": "SELECT id, name FROM users WHERE id = %s", "params": ["1"]}"#,
            ),
            AssistantReply::text("```json\n{\"status\": \"success\", \"name\": \"ada\"}\n```"),
        ]);
        let database = Arc::new(Recorder::default());
        let mut data = Map::new();
        data.insert("id".into(), json!("1"));
        let actual = agent(llm.clone(), database.clone())
            .process(&api(), &data)
            .await
            .unwrap();
        assert_eq!(actual, json!({"status": "success", "name": "ada"}));

        let queries = database.queries.lock().unwrap();
        assert_eq!(
            *queries,
            vec![(
                "SELECT id, name FROM users WHERE id = %s".to_owned(),
                vec![json!("1")],
                true
            )]
        );

        let seen = llm.seen.lock().unwrap();
        let second = &seen[1];
        assert_eq!(second.len(), 4);
        assert!(matches!(second[2], ChatMessage::Assistant { .. }));
        let ChatMessage::Tool { ref tool_call_id, ref name, ref content } = second[3] else {
            panic!("expected a tool message");
        };
        assert_eq!(tool_call_id, "call_1");
        assert_eq!(name, "database_query");
        assert_eq!(
            serde_json::from_str::<Value>(content).unwrap()["rowCount"],
            json!(1)
        );
    }

    #[actix_web::test]
    async fn test_process_when_unknown_tool_expect_error_result() {
        let llm = Scripted::new([
            tool_call("call_1", "send_email", "{}"),
            AssistantReply::text("{\"status\": \"error\"}"),
        ]);
        let database = Arc::new(Recorder::default());
        agent(llm.clone(), database.clone())
            .process(&api(), &Map::new())
            .await
            .unwrap();
        assert!(database.queries.lock().unwrap().is_empty());
        let seen = llm.seen.lock().unwrap();
        let ChatMessage::Tool { ref content, .. } = seen[1][3] else {
            panic!("expected a tool message");
        };
        assert_eq!(content, r#"{"error":"Unknown tool: send_email"}"#);
    }

    #[actix_web::test]
    async fn test_process_when_bad_arguments_expect_error_result() {
        let llm = Scripted::new([
            tool_call("call_1", "database_query", "not json"),
            AssistantReply::text("{\"status\": \"error\"}"),
        ]);
        let database = Arc::new(Recorder::default());
        agent(llm.clone(), database.clone())
            .process(&api(), &Map::new())
            .await
            .unwrap();
        let seen = llm.seen.lock().unwrap();
        let ChatMessage::Tool { ref content, .. } = seen[1][3] else {
            panic!("expected a tool message");
        };
        assert!(content.contains("Invalid tool arguments"));
    }

    #[actix_web::test]
    async fn test_process_when_never_final_expect_limit_error() {
        let replies = (0..MAX_TURNS).map(|turn| {
            tool_call(&format!("call_{turn}"), "database_query", r#"{"query": "SELECT 1"}"#)
        });
        let database = Arc::new(Recorder::default());
        let actual = agent(Scripted::new(replies), database.clone())
            .process(&api(), &Map::new())
            .await
            .unwrap();
        assert_eq!(
            actual,
            json!({
                "status": "error",
                "error": "Processing limit reached without generating a final response"
            })
        );
        assert_eq!(database.queries.lock().unwrap().len(), MAX_TURNS);
    }

    #[actix_web::test]
    async fn test_process_when_llm_unreachable_expect_error() {
        let actual = agent(Scripted::new([]), Arc::default())
            .process(&api(), &Map::new())
            .await
            .unwrap_err();
        assert!(matches!(actual, LlmError::EmptyResponse));
    }
}
