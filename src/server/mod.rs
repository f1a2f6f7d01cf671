//! The API server: serves every configured endpoint by handing requests to
//! the agent.

pub mod api;
pub mod app;
pub mod errors;
pub mod tracing;
