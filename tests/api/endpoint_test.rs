use crate::common::{self, query_call, ScriptedChat};
use actix_web::{http::header::CONTENT_TYPE, test};
use serde_json::{json, Value};
use vibe_api::db::gate::Approval;
use vibe_api::llm::AssistantReply;

#[actix_web::test]
async fn test_endpoint_when_unknown_path_expect_not_found() {
    let (database, schema) = common::memory_database(Approval::Denied).await;
    let llm = ScriptedChat::new([]);
    let app = common::initialize_app(common::user_apis(), llm.clone(), database, schema).await;

    let req = test::TestRequest::get().uri("/rooms").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 404);
    let actual: Value = test::read_body_json(resp).await;
    assert_eq!(actual, json!({"status": "error", "error": "API endpoint not found"}));
    assert!(llm.seen.lock().unwrap().is_empty());
}

#[actix_web::test]
async fn test_endpoint_when_method_differs_expect_not_found() {
    let (database, schema) = common::memory_database(Approval::Denied).await;
    let app = common::initialize_app(common::user_apis(), ScriptedChat::new([]), database, schema).await;
    let req = test::TestRequest::put().uri("/users/1").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 404);
}

#[actix_web::test]
async fn test_endpoint_when_agent_queries_expect_final_json() {
    let (database, schema) = common::memory_database(Approval::Denied).await;
    let llm = ScriptedChat::new([
        query_call(
            "call_1",
            json!({"query": "SELECT id, name, email FROM users WHERE id = %s", "params": ["1"]}),
        ),
        AssistantReply::text(
            r#"{"status": "success", "user": {"id": 1, "name": "ada", "email": "ada@example.com"}}"#,
        ),
    ]);
    let app = common::initialize_app(common::user_apis(), llm.clone(), database, schema).await;

    let req = test::TestRequest::get().uri("/users/1?verbose=1").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    assert_eq!(resp.headers().get(CONTENT_TYPE).unwrap(), "application/json");
    let actual: Value = test::read_body_json(resp).await;
    assert_eq!(
        actual,
        json!({"status": "success", "user": {"id": 1, "name": "ada", "email": "ada@example.com"}})
    );

    let prompt = llm.request_prompt();
    assert!(prompt.contains("\"id\": \"1\""));
    assert!(prompt.contains("\"verbose\": 1"));
    assert_eq!(
        llm.tool_result(1, 3),
        json!({
            "status": "success",
            "data": [{"id": 1, "name": "ada", "email": "ada@example.com"}],
            "rowCount": 1
        })
    );
}

#[actix_web::test]
async fn test_endpoint_when_agent_reports_status_code_expect_that_status() {
    let (database, schema) = common::memory_database(Approval::Denied).await;
    let llm = ScriptedChat::new([AssistantReply::text(
        r#"{"status": "error", "message": "User not found", "status_code": 404}"#,
    )]);
    let app = common::initialize_app(common::user_apis(), llm, database, schema).await;
    let req = test::TestRequest::get().uri("/users/99").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 404);
    let actual: Value = test::read_body_json(resp).await;
    assert_eq!(actual["message"], json!("User not found"));
}

#[actix_web::test]
async fn test_endpoint_when_body_is_invalid_json_expect_bad_request() {
    let (database, schema) = common::memory_database(Approval::Denied).await;
    let llm = ScriptedChat::new([]);
    let app = common::initialize_app(common::user_apis(), llm.clone(), database, schema).await;
    let req = test::TestRequest::post()
        .uri("/users")
        .insert_header((CONTENT_TYPE, "application/json"))
        .set_payload("{\"name\": ")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 400);
    let actual: Value = test::read_body_json(resp).await;
    assert_eq!(actual, json!({"status": "error", "error": "Invalid JSON in request body"}));
    assert!(llm.seen.lock().unwrap().is_empty());
}

#[actix_web::test]
async fn test_endpoint_when_body_is_plain_text_expect_bad_request() {
    let (database, schema) = common::memory_database(Approval::Denied).await;
    let app = common::initialize_app(common::user_apis(), ScriptedChat::new([]), database, schema).await;
    let req = test::TestRequest::post()
        .uri("/users")
        .insert_header((CONTENT_TYPE, "text/plain"))
        .set_payload("name=ada")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 400);
    let actual: Value = test::read_body_json(resp).await;
    assert_eq!(actual["error"], json!("Invalid request format. Expected JSON"));
}

#[actix_web::test]
async fn test_endpoint_when_insert_approved_expect_row_written() {
    let (database, schema) = common::memory_database(Approval::Once).await;
    let llm = ScriptedChat::new([
        query_call(
            "call_1",
            json!({
                "query": "INSERT INTO users (name, email) VALUES (%s, %s) RETURNING id",
                "params": ["cy", "cy@example.com"],
                "read_only": false
            }),
        ),
        query_call("call_2", json!({"query": "SELECT COUNT(*) AS n FROM users"})),
        AssistantReply::text(r#"{"status": "success", "id": 3}"#),
    ]);
    let app = common::initialize_app(common::user_apis(), llm.clone(), database, schema).await;
    let req = test::TestRequest::post()
        .uri("/users")
        .set_json(json!({"name": "cy", "email": "cy@example.com"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    assert_eq!(
        llm.tool_result(1, 3),
        json!({"status": "success", "data": [{"id": 3}], "rowCount": 1})
    );
    assert_eq!(llm.tool_result(2, 5)["data"], json!([{"n": 3}]));
    assert!(llm.request_prompt().contains("\"name\": \"cy\""));
}

#[actix_web::test]
async fn test_endpoint_when_delete_denied_expect_unauthorized_tool_result() {
    let (database, schema) = common::memory_database(Approval::Denied).await;
    let llm = ScriptedChat::new([
        query_call(
            "call_1",
            json!({"query": "DELETE FROM users WHERE id = $1", "params": ["1"], "read_only": false}),
        ),
        query_call("call_2", json!({"query": "SELECT COUNT(*) AS n FROM users"})),
        AssistantReply::text(r#"{"status": "error", "error": "Not allowed", "statusCode": 403}"#),
    ]);
    let app = common::initialize_app(common::user_apis(), llm.clone(), database, schema).await;
    let req = test::TestRequest::delete().uri("/users/1").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 403);

    assert_eq!(
        llm.tool_result(1, 3),
        json!({"error": "Operation not authorized by user"})
    );
    assert_eq!(llm.tool_result(2, 5)["data"], json!([{"n": 2}]));
}

#[actix_web::test]
async fn test_endpoint_when_llm_fails_expect_internal_error() {
    let (database, schema) = common::memory_database(Approval::Denied).await;
    let app = common::initialize_app(common::user_apis(), ScriptedChat::new([]), database, schema).await;
    let req = test::TestRequest::get().uri("/users/1").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 500);
    let actual: Value = test::read_body_json(resp).await;
    assert_eq!(actual["status"], json!("error"));
    assert_eq!(actual["message"], json!("Internal server Error"));
    assert!(actual["error_detail"]
        .as_str()
        .unwrap()
        .contains("LLM API returned no choices"));
}
