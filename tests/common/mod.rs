use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use actix_http::body::MessageBody;
use actix_http::Request;
use actix_service::Service;
use actix_web::{dev::ServiceResponse, test, Error};
use async_trait::async_trait;
use serde_json::Value;
use vibe_api::agent::Agent;
use vibe_api::config::{ApiDefinition, ConnectionInfo, DatabaseInfo, DatabaseKind, Schema};
use vibe_api::db::gate::{Approval, Approver, ModificationGate};
use vibe_api::db::introspect::introspect;
use vibe_api::db::{Credentials, Database, DatabaseConnection, Db};
use vibe_api::llm::{
    AssistantReply, ChatClient, ChatMessage, FunctionCall, LlmError, Tool, ToolCall,
};
use vibe_api::server::api::state::AppState;
use vibe_api::server::app::init_app;

/// Replays canned replies and records every conversation it is sent.
#[derive(Default)]
pub struct ScriptedChat {
    replies: Mutex<VecDeque<AssistantReply>>,
    pub seen: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedChat {
    pub fn new(replies: impl IntoIterator<Item = AssistantReply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            seen: Mutex::default(),
        })
    }

    /// Content of the tool message at `index` in the conversation of call `call`.
    pub fn tool_result(&self, call: usize, index: usize) -> Value {
        let seen = self.seen.lock().unwrap();
        let ChatMessage::Tool { ref content, .. } = seen[call][index] else {
            panic!("expected a tool message");
        };
        serde_json::from_str(content).unwrap()
    }

    /// Text of the user message of the first call.
    pub fn request_prompt(&self) -> String {
        let seen = self.seen.lock().unwrap();
        let ChatMessage::User { ref content } = seen[0][1] else {
            panic!("expected a user message");
        };
        content.clone()
    }
}

#[async_trait]
impl ChatClient for ScriptedChat {
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

pub fn query_call(id: &str, arguments: Value) -> AssistantReply {
    AssistantReply {
        content: None,
        tool_calls: vec![ToolCall {
            id: id.to_owned(),
            kind: "function".to_owned(),
            function: FunctionCall {
                name: "database_query".to_owned(),
                arguments: arguments.to_string(),
            },
        }],
    }
}

pub struct Answer(pub Approval);

#[async_trait]
impl Approver for Answer {
    async fn approve(&self, _query: &str, _params: &[Value]) -> Approval {
        self.0
    }
}

pub fn memory_info() -> DatabaseInfo {
    DatabaseInfo {
        kind: DatabaseKind::Sqlite,
        connection: ConnectionInfo {
            dbname: ":memory:".to_owned(),
            host: None,
            port: None,
            user: None,
            password_env_var: None,
            user_env_var: None,
        },
        schema: Schema::new(),
    }
}

/// In-memory database with a seeded `users` table, and its schema.
pub async fn memory_database(approval: Approval) -> (Database, Schema) {
    let connection = DatabaseConnection::connect(&memory_info(), &Credentials::default(), false)
        .await
        .unwrap();
    let DatabaseConnection::Sqlite(ref pool) = connection else {
        panic!("expected sqlite");
    };
    sqlx::query("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, email TEXT)")
        .execute(pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO users (name, email) VALUES ('ada', 'ada@example.com'), ('bob', NULL)")
        .execute(pool)
        .await
        .unwrap();
    let schema = introspect(&connection).await.unwrap();
    let gate = Arc::new(ModificationGate::new(Arc::new(Answer(approval))));
    (Database::new(connection, gate), schema)
}

pub async fn initialize_app(
    apis: Vec<ApiDefinition>,
    llm: Arc<ScriptedChat>,
    database: Database,
    schema: Schema,
) -> impl Service<Request, Response = ServiceResponse<impl MessageBody>, Error = Error> {
    let agent = Agent::new(llm, Arc::new(database), Arc::new(schema));
    let state = AppState::new(apis, agent);
    test::init_service(init_app(&state)).await
}

pub fn user_apis() -> Vec<ApiDefinition> {
    vec![
        ApiDefinition::new(
            "GET",
            "/users/{id}",
            "Fetch a user",
            "1. Select the user by id\n2. Return {\"status\": \"success\", \"user\": {...}}",
        ),
        ApiDefinition::new("POST", "/users", "Create a user", "1. Insert the user"),
        ApiDefinition::new("DELETE", "/users/{id}", "Delete a user", "1. Delete the user"),
    ]
}
