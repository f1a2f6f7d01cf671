//! Serving configured endpoints.
use actix_web::http::{header::CONTENT_TYPE, StatusCode};
use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::{json, Value};

use super::request::request_data;
use super::routing::find_endpoint;
use super::state::AppState;
use crate::llm::extract::extract_json;
use crate::server::errors::HttpError;

/// `GET /docs`: endpoint documentation as markdown.
#[expect(clippy::unused_async, reason = "Actix handlers are async")]
pub async fn docs(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/markdown")
        .body(state.docs.as_str().to_owned())
}

/// Any other request: match an endpoint and let the agent answer it.
///
/// # Errors
/// Errors if no endpoint matches, the body is malformed, or the agent fails.
#[tracing::instrument(name = "Endpoint", skip(req, body, state), fields(method = %req.method(), path = %req.path()))]
pub async fn endpoint(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse, HttpError> {
    let method = req.method().as_str();
    let Some((api, path_params)) = find_endpoint(&state.apis, method, req.path()) else {
        tracing::debug!("No endpoint matches");
        return Err(HttpError::NotFound);
    };
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let data = request_data(path_params, req.query_string(), method, content_type, &body)?;

    let result = state
        .agent
        .process(api, &data)
        .await
        .map_err(|err| {
            tracing::error!("Failed to process request: {err}");
            HttpError::internal(&anyhow::Error::new(err).context("Failed to process request"))
        })?;
    let result = unwrap_json_string(result);

    let rendered = serde_json::to_string_pretty(&result)
        .map_err(|err| HttpError::internal(&anyhow::Error::new(err)))?;
    Ok(HttpResponse::build(response_status(&result))
        .content_type(mime::APPLICATION_JSON)
        .body(rendered))
}

/// A reply that is a JSON string is parsed once more, else wrapped.
fn unwrap_json_string(result: Value) -> Value {
    match result {
        Value::String(text) => {
            extract_json(&text).unwrap_or_else(|| json!({ "status": "success", "result": text }))
        }
        other => other,
    }
}

/// Status for an agent result: the error status it names, else `200 OK`.
#[must_use]
pub fn response_status(result: &Value) -> StatusCode {
    ["status_code", "statusCode"]
        .iter()
        .find_map(|key| result.get(*key).and_then(Value::as_u64))
        .filter(|code| (400..=599).contains(code))
        .and_then(|code| u16::try_from(code).ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::OK)
}
