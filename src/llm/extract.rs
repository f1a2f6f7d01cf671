//! Pulling JSON out of model replies.
//!
//! Models asked for JSON mostly answer with bare JSON, and sometimes wrap it
//! in a fenced markdown code block.
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

lazy_static! {
    static ref FENCED: Regex =
        Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("valid regex");
}

/// Parse `content` as JSON, or the first fenced code block in it.
#[must_use]
pub fn extract_json(content: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str(content.trim()) {
        return Some(value);
    }
    let block = FENCED.captures(content)?.get(1)?.as_str();
    serde_json::from_str(block).ok()
}
