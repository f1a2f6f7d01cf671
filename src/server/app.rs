//! Start the API server.
use std::net::TcpListener;
use std::ops::RangeInclusive;
use std::sync::Arc;

use actix_http::body::MessageBody;
use actix_service::ServiceFactory;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::{App, Error, HttpServer};
use anyhow::{bail, Context as _};
use tracing_actix_web::TracingLogger;

use super::api::routes;
use super::api::state::AppState;
use super::tracing::VibeRootSpanBuilder;
use crate::agent::Agent;
use crate::config::Config;
use crate::db::gate::ModificationGate;
use crate::db::{Credentials, Database, DatabaseConnection, Db as _};
use crate::llm::ChatClient;

/// Host the server binds to.
pub const BIND_HOST: &str = "localhost";

/// Ports tried when none is given.
pub const PORT_RANGE: RangeInclusive<u16> = 8000..=9000;

/// How to run the server.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServeOptions {
    /// Fixed port instead of searching `PORT_RANGE`.
    pub port: Option<u16>,
}

/// First port in `ports` that can be bound on `host`.
///
/// # Errors
/// Errors if every port is taken.
pub fn find_available_port(host: &str, ports: RangeInclusive<u16>) -> anyhow::Result<u16> {
    let (first, last) = (*ports.start(), *ports.end());
    for port in ports {
        if TcpListener::bind((host, port)).is_ok() {
            return Ok(port);
        }
    }
    bail!("No available ports found in range {first}-{last}")
}

/// Initialize the application and its routing.
pub fn init_app(
    state: &AppState,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Response = ServiceResponse<impl MessageBody>,
        Config = (),
        InitError = (),
        Error = Error,
    >,
> {
    routes::register_app(App::new(), state).wrap(TracingLogger::<VibeRootSpanBuilder>::new())
}

/// Build the server state from `config`, connecting lazily to its database.
///
/// # Errors
/// Errors if there is nothing to serve or the database cannot be reached.
pub async fn init_state(
    config: &Config,
    llm: Arc<dyn ChatClient>,
    credentials: &Credentials,
    gate: Arc<ModificationGate>,
) -> anyhow::Result<AppState> {
    if config.apis.is_empty() {
        bail!("No API endpoints defined. Please add some before running the server.");
    }
    let Some(info) = config.database.as_ref() else {
        bail!("No database connection configured. Please set up the database first.");
    };
    let connection = match DatabaseConnection::connect(info, credentials, true).await {
        Ok(connection) => connection,
        Err(err) => {
            if let Some(details) = err.details() {
                tracing::error!("{details}");
            }
            return Err(err).context("Could not connect to the database");
        }
    };
    let database = Arc::new(Database::new(connection, gate));
    let agent = Agent::new(llm, database, Arc::new(info.schema.clone()));
    Ok(AppState::new(config.apis.clone(), agent))
}

/// Serve `config`'s endpoints until interrupted.
///
/// # Errors
/// Errors if the server cannot be set up or bound.
pub async fn run_server(
    config: &Config,
    llm: Arc<dyn ChatClient>,
    credentials: &Credentials,
    gate: Arc<ModificationGate>,
    options: ServeOptions,
) -> anyhow::Result<()> {
    let state = init_state(config, llm, credentials, gate).await?;
    let port = match options.port {
        Some(port) => port,
        None => find_available_port(BIND_HOST, PORT_RANGE)?,
    };

    tracing::info!("Starting API Server on http://{BIND_HOST}:{port}");
    tracing::info!("Press Ctrl+C to stop the server");
    HttpServer::new(move || init_app(&state))
        .bind((BIND_HOST, port))
        .with_context(|| format!("Could not bind to {BIND_HOST}:{port}"))?
        .run()
        .await?;
    tracing::info!("Server stopped");
    Ok(())
}
