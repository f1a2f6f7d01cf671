//! Public API documentation, served at `GET /docs`.
//!
//! Same layout as the configuration file, minus database details and
//! implementation plans.

use super::markdown::render_apis;
use super::ApiDefinition;

/// Render the markdown documentation for `apis`.
#[must_use]
pub fn render(apis: &[ApiDefinition]) -> String {
    let mut out = String::from("# API Documentation\n\n");
    // Writing into a `String` cannot fail.
    let _ = render_apis(&mut out, apis, false);
    out
}
