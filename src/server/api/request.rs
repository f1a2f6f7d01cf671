//! Gathering everything a request carries into one JSON object.
use serde_json::{Map, Number, Value};
use url::form_urlencoded;

use crate::server::errors::HttpError;

/// Methods whose body is read.
const METHODS_WITH_BODY: [&str; 3] = ["POST", "PUT", "PATCH"];

/// Request data handed to the agent: path parameters, then query
/// parameters, then body fields, later ones overriding earlier ones.
///
/// # Errors
/// Errors if the body cannot be read as a JSON object or form.
pub fn request_data(
    path_params: Map<String, Value>,
    query: &str,
    method: &str,
    content_type: &str,
    body: &[u8],
) -> Result<Map<String, Value>, HttpError> {
    let mut data = path_params;
    data.extend(query_params(query));
    if METHODS_WITH_BODY
        .iter()
        .any(|with_body| with_body.eq_ignore_ascii_case(method))
    {
        data.extend(body_fields(content_type, body)?);
    }
    Ok(data)
}

/// Parse a query string. Blank values are dropped. A key given once maps to
/// its value, numeric-looking values become numbers. A repeated key maps to
/// the list of its values.
#[must_use]
pub fn query_params(query: &str) -> Map<String, Value> {
    let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        if value.is_empty() {
            continue;
        }
        match grouped.iter_mut().find(|entry| entry.0 == key) {
            Some(entry) => entry.1.push(value.into_owned()),
            None => grouped.push((key.into_owned(), vec![value.into_owned()])),
        }
    }

    grouped
        .into_iter()
        .map(|(key, mut values)| {
            let value = if values.len() == 1 {
                values.pop().map_or(Value::Null, scalar)
            } else {
                Value::Array(values.into_iter().map(Value::String).collect())
            };
            (key, value)
        })
        .collect()
}

/// Integer for digit strings, float for digits with a single `.`, else the
/// string itself.
fn scalar(value: String) -> Value {
    let digits = |text: &str| text.bytes().all(|byte| byte.is_ascii_digit());
    if digits(&value) {
        if let Ok(int) = value.parse::<i64>() {
            return Value::from(int);
        }
        if let Ok(int) = value.parse::<u64>() {
            return Value::from(int);
        }
        return Value::String(value);
    }
    if value.matches('.').count() == 1 && value.len() > 1 && digits(&value.replace('.', "")) {
        if let Some(number) = value.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(number);
        }
    }
    Value::String(value)
}

/// Decode the body according to its content type.
fn body_fields(content_type: &str, body: &[u8]) -> Result<Map<String, Value>, HttpError> {
    let content_type = content_type.to_lowercase();
    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();

    if content_type.contains("json") || trimmed.starts_with('{') {
        return match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Object(fields)) => Ok(fields),
            Ok(_) => Err(HttpError::InvalidFormat),
            Err(_) => Err(HttpError::InvalidJson),
        };
    }
    if content_type.contains("x-www-form-urlencoded") {
        return Ok(form_urlencoded::parse(trimmed.as_bytes())
            .map(|(key, value)| (key.into_owned(), Value::String(value.into_owned())))
            .collect());
    }
    if trimmed.is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(fields)) => Ok(fields),
        _ => Err(HttpError::InvalidFormat),
    }
}
