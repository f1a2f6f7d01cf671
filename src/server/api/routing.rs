//! Matching request paths against endpoint path patterns.
use percent_encoding::percent_decode_str;
use serde_json::{Map, Value};

use crate::config::ApiDefinition;

/// Name of a `{name}` pattern segment.
fn param_name(segment: &str) -> Option<&str> {
    segment
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
}

/// Match `path` against `pattern`, returning the captured path parameters.
///
/// The pattern is normalized to `/` plus its segments, so `users/{id}/` and
/// `/users/{id}` are the same pattern. The request path is taken as is:
/// `/users/7/` does not match `/users/{id}`. A `{name}` segment captures one
/// non-empty segment, percent-decoded.
#[must_use]
pub fn match_path(pattern: &str, path: &str) -> Option<Map<String, Value>> {
    let requested = path.strip_prefix('/')?;
    let mut requested = requested.split('/');
    let mut params = Map::new();

    for expected in pattern.trim_matches('/').split('/') {
        let actual = requested.next()?;
        match param_name(expected) {
            Some(name) => {
                if actual.is_empty() {
                    return None;
                }
                let value = percent_decode_str(actual).decode_utf8_lossy().into_owned();
                params.insert(name.to_owned(), Value::String(value));
            }
            None if expected == actual => {}
            None => return None,
        }
    }

    if requested.next().is_some() {
        return None;
    }
    Some(params)
}

/// First endpoint, in configuration order, serving `method` at `path`.
#[must_use]
pub fn find_endpoint<'apis>(
    apis: &'apis [ApiDefinition],
    method: &str,
    path: &str,
) -> Option<(&'apis ApiDefinition, Map<String, Value>)> {
    apis.iter()
        .filter(|api| api.method.eq_ignore_ascii_case(method))
        .find_map(|api| match_path(&api.path, path).map(|params| (api, params)))
}
