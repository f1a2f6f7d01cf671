//! Reading and writing the markdown configuration layout.
//!
//! ````text
//! # Vibe API Configuration
//!
//! ## Database Info
//! ```json
//! { "type": "postgresql", "connection": { ... }, "schema": { ... } }
//! ```
//!
//! ## API Endpoints
//!
//! - **GET** - /users - List all users
//!
//! ## API Definitions
//!
//! ### API: users
//! #### HTTP Method
//! GET
//! #### Path
//! /users
//! #### Description
//! List all users
//! #### Implementation
//! ```
//! 1. Query the users table
//! ```
//! ````
//!
//! The endpoint summary list is informational; only the `### API:` blocks are
//! read back.

use std::fmt::Write as _;

use lazy_static::lazy_static;
use regex::Regex;

use super::{ApiDefinition, DatabaseInfo};

/// Marker that opens every endpoint block.
const API_HEADING: &str = "### API: ";

lazy_static! {
    static ref DATABASE_SECTION: Regex =
        Regex::new(r"(?s)## Database Info\n```json\n(.*?)\n```").expect("valid regex");
    static ref API_BLOCK: Regex = Regex::new(
        r"(?s)^(.*?)\n#### HTTP Method\n(.*?)\n#### Path\n(.*?)\n#### Description\n(.*?)\n#### Implementation\n```\n(.*)\n```"
    )
    .expect("valid regex");
}

/// Parse configuration file content into the database section and the
/// endpoint definitions.
///
/// Invalid database JSON is logged and treated as "no database".
#[must_use]
pub fn parse(content: &str) -> (Option<DatabaseInfo>, Vec<ApiDefinition>) {
    let content = content.replace("\r\n", "\n");
    (parse_database(&content), parse_apis(&content))
}

/// Extract the `## Database Info` JSON block.
fn parse_database(content: &str) -> Option<DatabaseInfo> {
    let captures = DATABASE_SECTION.captures(content)?;
    let raw = captures.get(1)?.as_str();
    match serde_json::from_str::<DatabaseInfo>(raw) {
        Ok(info) => Some(info),
        Err(err) => {
            tracing::error!("Invalid JSON in database configuration: {err}");
            None
        }
    }
}

/// Extract every `### API:` block, in file order.
///
/// Each block runs until the next heading, and its implementation fence is
/// closed by the last fence in the block, so plans may contain fenced code.
fn parse_apis(content: &str) -> Vec<ApiDefinition> {
    content
        .split(API_HEADING)
        .skip(1)
        .filter_map(|block| {
            let captures = API_BLOCK.captures(block)?;
            let field = |idx: usize| {
                captures
                    .get(idx)
                    .map_or("", |matched| matched.as_str())
                    .trim()
                    .to_owned()
            };
            Some(ApiDefinition {
                name: field(1),
                method: field(2),
                path: field(3),
                description: field(4),
                implementation: field(5),
            })
        })
        .collect()
}

/// Render the endpoint summary list and the detailed definitions.
///
/// With `with_implementation` unset the implementation plans are left out,
/// which is what the public documentation wants.
pub(crate) fn render_apis(
    out: &mut String,
    apis: &[ApiDefinition],
    with_implementation: bool,
) -> std::fmt::Result {
    if apis.is_empty() {
        return Ok(());
    }
    out.push_str("## API Endpoints\n\n");
    for api in apis {
        writeln!(out, "- **{}** - {} - {}", api.method, api.path, api.description)?;
    }
    out.push('\n');

    out.push_str("## API Definitions\n\n");
    for api in apis {
        writeln!(out, "{API_HEADING}{}", api.name)?;
        writeln!(out, "#### HTTP Method\n{}", api.method)?;
        writeln!(out, "#### Path\n{}", api.path)?;
        writeln!(out, "#### Description\n{}", api.description)?;
        if with_implementation {
            writeln!(out, "#### Implementation\n```\n{}\n```\n", api.implementation)?;
        }
    }
    Ok(())
}

/// Render a full configuration file.
///
/// # Errors
/// Errors if the database section cannot be serialized.
pub fn render(database: Option<&DatabaseInfo>, apis: &[ApiDefinition]) -> anyhow::Result<String> {
    let mut out = String::from("# Vibe API Configuration\n\n");
    if let Some(info) = database {
        let json = serde_json::to_string_pretty(info)?;
        writeln!(out, "## Database Info\n```json\n{json}\n```\n")?;
    }
    render_apis(&mut out, apis, true)?;
    Ok(out)
}
