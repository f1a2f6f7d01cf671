//! Running the CLI

// Allow exits because in this file we ideally handle all errors with known exit codes
#![allow(clippy::exit)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, CONFIG_FILE};
use crate::console::{Console, Prompter as _, TerminalPrompter};
use crate::db::gate::ModificationGate;
use crate::db::Credentials;
use crate::llm::OpenAiClient;
use crate::server::app::{run_server, ServeOptions};

/// Describe JSON API endpoints in plain language and serve them from an
/// existing database.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path.
    #[arg(short, long, default_value = CONFIG_FILE)]
    pub config: PathBuf,
    /// Start the API server immediately instead of the interactive menu.
    #[arg(short, long)]
    pub server: bool,
    /// Serve on this port instead of the first free one in 8000-9000.
    #[arg(short, long)]
    pub port: Option<u16>,
    /// Also write logs to this file.
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Install the global subscriber. `RUST_LOG` sets the level, `info` by default.
///
/// The returned guard flushes the log file when dropped.
fn init_tracing(log_file: Option<&Path>) -> Option<WorkerGuard> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let Some(path) = log_file else {
        tracing_subscriber::fmt().with_env_filter(filter()).init();
        return None;
    };

    let directory = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .map_or_else(|| "vibe-api.log".into(), |name| name.to_os_string());
    let appender = tracing_appender::rolling::never(directory, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Some(guard)
}

/// Run the server or the console, as asked.
///
/// # Errors
/// Errors if the configuration cannot be read, no LLM is configured, or the
/// chosen mode fails.
#[actix_web::main]
pub async fn start(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(&cli.config)?;
    let llm = Arc::new(OpenAiClient::from_env()?);
    tracing::debug!(model = llm.model(), "LLM client ready");
    let gate = Arc::new(ModificationGate::console());
    let options = ServeOptions { port: cli.port };
    let mut prompter = TerminalPrompter::new()?;

    if cli.server {
        let credentials = match config.database.as_ref() {
            Some(info) => Credentials::resolve(info.kind, &info.connection, &mut prompter)?,
            None => Credentials::default(),
        };
        if let Err(err) = run_server(&config, llm, &credentials, gate, options).await {
            prompter.say(&format!("{err:#}"));
        }
        return Ok(());
    }

    Console::new(config, llm, gate, options, prompter)
        .main_menu()
        .await
}

/// Main entrypoint to application
pub fn run() {
    let cli = Cli::parse();
    let guard = init_tracing(cli.log_file.as_deref());
    tracing::debug!("Starting application");
    if let Err(err) = start(cli) {
        tracing::error!("{err:#}");
        drop(guard);
        std::process::exit(1);
    }
}
