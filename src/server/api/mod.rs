//! HTTP surface of the API server.
pub mod endpoint;
pub mod request;
pub mod routes;
pub mod routing;
pub mod state;
