//! Shared state of the API server
use std::sync::Arc;

use crate::agent::Agent;
use crate::config::{docs, ApiDefinition};

/// Global, read-only state
#[derive(Debug, Clone)]
pub struct AppState {
    /// Endpoints, in matching order
    pub apis: Arc<Vec<ApiDefinition>>,
    /// Rendered `/docs` page
    pub docs: Arc<String>,
    /// Serves matched requests
    pub agent: Agent,
}

impl AppState {
    /// State serving `apis` through `agent`.
    #[must_use]
    pub fn new(apis: Vec<ApiDefinition>, agent: Agent) -> Self {
        let docs = docs::render(&apis);
        Self {
            apis: Arc::new(apis),
            docs: Arc::new(docs),
            agent,
        }
    }
}
