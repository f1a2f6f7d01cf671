use crate::common::{self, ScriptedChat};
use actix_web::{http::header::CONTENT_TYPE, test};
use vibe_api::config::docs;
use vibe_api::db::gate::Approval;

#[actix_web::test]
async fn test_docs_when_get_expect_markdown_without_implementation() {
    let (database, schema) = common::memory_database(Approval::Denied).await;
    let llm = ScriptedChat::new([]);
    let app = common::initialize_app(common::user_apis(), llm.clone(), database, schema).await;

    let req = test::TestRequest::get().uri("/docs").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    assert_eq!(resp.headers().get(CONTENT_TYPE).unwrap(), "text/markdown");

    let body = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
    assert_eq!(body, docs::render(&common::user_apis()));
    assert!(body.starts_with("# API Documentation\n\n"));
    assert!(body.contains("- **GET** - /users/{id} - Fetch a user\n"));
    assert!(!body.contains("Implementation"));
    assert!(llm.seen.lock().unwrap().is_empty());
}

#[actix_web::test]
async fn test_docs_when_query_string_expect_docs() {
    let (database, schema) = common::memory_database(Approval::Denied).await;
    let app = common::initialize_app(common::user_apis(), ScriptedChat::new([]), database, schema).await;
    let req = test::TestRequest::get().uri("/docs?format=md").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
}

#[actix_web::test]
async fn test_docs_when_post_expect_not_found() {
    let (database, schema) = common::memory_database(Approval::Denied).await;
    let app = common::initialize_app(common::user_apis(), ScriptedChat::new([]), database, schema).await;
    let req = test::TestRequest::post().uri("/docs").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 404);
}
