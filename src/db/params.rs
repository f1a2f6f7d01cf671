//! Client-side interpolation of query parameters.
//!
//! The agent writes SQL with `%s` or `$1`-style placeholders and sends the
//! parameters separately, usually as strings. Parameters are rendered as SQL
//! literals so that the database infers their types from context: `'42'`
//! compares fine against an integer column, where a bound `TEXT` parameter
//! would not.
use serde_json::Value;
use thiserror::Error;

/// Errors raised while interpolating parameters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParamError {
    /// A placeholder refers past the end of the parameter list.
    #[error("Query references parameter {placeholder} but only {given} were given")]
    Missing {
        /// The placeholder as written.
        placeholder: String,
        /// Number of parameters supplied.
        given: usize,
    },
}

/// Render a JSON value as a SQL literal.
#[must_use]
pub fn literal(value: &Value) -> String {
    match *value {
        Value::Null => "NULL".to_owned(),
        Value::Bool(flag) => (if flag { "TRUE" } else { "FALSE" }).to_owned(),
        Value::Number(ref number) => number.to_string(),
        Value::String(ref text) => quote(text),
        Value::Array(_) | Value::Object(_) => quote(&value.to_string()),
    }
}

/// Single-quote `text`, doubling embedded quotes.
fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Lexical state while scanning a statement.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Scan {
    /// Plain SQL.
    Code,
    /// Inside `'...'`.
    SingleQuoted,
    /// Inside `"..."`.
    DoubleQuoted,
    /// Inside `-- ...` up to the end of line.
    LineComment,
    /// Inside `/* ... */`.
    BlockComment,
}

/// Replace `%s` (sequential) and `$n` (positional, 1-based) placeholders
/// outside of quotes and comments with literal parameters. `%%` becomes `%`,
/// with or without parameters.
///
/// # Errors
/// Errors if a placeholder has no matching parameter.
pub fn interpolate(query: &str, params: &[Value]) -> Result<String, ParamError> {
    let mut out = String::with_capacity(query.len());
    let mut chars = query.chars().peekable();
    let mut state = Scan::Code;
    let mut sequential = 0_usize;

    while let Some(current) = chars.next() {
        match state {
            Scan::Code => match current {
                '\'' => {
                    state = Scan::SingleQuoted;
                    out.push(current);
                }
                '"' => {
                    state = Scan::DoubleQuoted;
                    out.push(current);
                }
                '-' if chars.peek() == Some(&'-') => {
                    state = Scan::LineComment;
                    out.push(current);
                }
                '/' if chars.peek() == Some(&'*') => {
                    state = Scan::BlockComment;
                    out.push(current);
                }
                '%' if chars.peek() == Some(&'%') => {
                    chars.next();
                    out.push('%');
                }
                '%' if chars.peek() == Some(&'s') => {
                    chars.next();
                    let value = params.get(sequential).ok_or_else(|| ParamError::Missing {
                        placeholder: "%s".to_owned(),
                        given: params.len(),
                    })?;
                    sequential += 1;
                    out.push_str(&literal(value));
                }
                '$' if chars.peek().is_some_and(char::is_ascii_digit) => {
                    let mut digits = String::new();
                    while let Some(&digit) = chars.peek() {
                        if !digit.is_ascii_digit() {
                            break;
                        }
                        digits.push(digit);
                        chars.next();
                    }
                    let position: usize = digits.parse().unwrap_or(0);
                    let value = position
                        .checked_sub(1)
                        .and_then(|index| params.get(index))
                        .ok_or_else(|| ParamError::Missing {
                            placeholder: format!("${digits}"),
                            given: params.len(),
                        })?;
                    out.push_str(&literal(value));
                }
                _ => out.push(current),
            },
            Scan::SingleQuoted => {
                out.push(current);
                if current == '\'' {
                    state = Scan::Code;
                }
            }
            Scan::DoubleQuoted => {
                out.push(current);
                if current == '"' {
                    state = Scan::Code;
                }
            }
            Scan::LineComment => {
                out.push(current);
                if current == '\n' {
                    state = Scan::Code;
                }
            }
            Scan::BlockComment => {
                out.push(current);
                if current == '*' && chars.peek() == Some(&'/') {
                    if let Some(slash) = chars.next() {
                        out.push(slash);
                    }
                    state = Scan::Code;
                }
            }
        }
    }
    Ok(out)
}

/// Tag of a dollar-quoted string opening at the start of `rest`, such as
/// `$$` or `$body$`. `$1` placeholders are not tags.
fn dollar_tag(rest: &str) -> Option<&str> {
    let body = rest.strip_prefix('$')?;
    let end = body.find('$')?;
    let tag = &body[..end];
    let valid = !tag.starts_with(|c: char| c.is_ascii_digit())
        && tag.chars().all(|c| c.is_alphanumeric() || c == '_');
    valid.then_some(&rest[..end + 2])
}

/// The code of `query` with every quoted string, dollar-quoted body and
/// comment replaced by a single space, leaving only what the database parses
/// as keywords, identifiers and punctuation.
#[must_use]
pub fn code_outside_literals(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    let mut rest = query;
    while let Some(current) = rest.chars().next() {
        let skipped = match current {
            '\'' => rest[1..].find('\'').map_or(rest.len(), |end| end + 2),
            '"' => rest[1..].find('"').map_or(rest.len(), |end| end + 2),
            '-' if rest.starts_with("--") => rest.find('\n').unwrap_or(rest.len()),
            '/' if rest.starts_with("/*") => rest[2..].find("*/").map_or(rest.len(), |end| end + 4),
            '$' => dollar_tag(rest).map_or(0, |tag| {
                rest[tag.len()..]
                    .find(tag)
                    .map_or(rest.len(), |end| end + 2 * tag.len())
            }),
            _ => 0,
        };
        if skipped == 0 {
            out.push(current);
            rest = &rest[current.len_utf8()..];
        } else {
            out.push(' ');
            rest = &rest[skipped..];
        }
    }
    out
}
