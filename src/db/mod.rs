//! Database related module.
//!
//! The API server never owns a schema of its own: it connects to an existing
//! `PostgreSQL` (or `SQLite`) database, introspects it, and lets the agent run
//! SQL against it.
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::instrument;
use url::Url;

use crate::config::{
    ConnectionInfo, DatabaseInfo, DatabaseKind, Schema, DEFAULT_PASSWORD_ENV_VAR,
    DEFAULT_USER_ENV_VAR,
};

pub mod credentials;
pub mod gate;
pub mod introspect;
pub mod params;
pub mod query;

pub use credentials::Credentials;
pub use query::{Database, QueryRunner};

/// Seconds to wait for a database connection.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Upper bound on pooled connections.
const MAX_CONNECTIONS: u32 = 10;

/// Default `PostgreSQL` port.
const DEFAULT_POSTGRES_PORT: u16 = 5432;

/// Errors raised while reaching a database.
#[derive(Debug, Error)]
pub enum DbError {
    /// No user could be found for the connection.
    #[error("Database user not set")]
    MissingUser {
        /// Env var that should hold the user.
        env_var: String,
    },
    /// No password could be found for the connection.
    #[error("Database password not set")]
    MissingPassword {
        /// Env var that should hold the password.
        env_var: String,
    },
    /// Scheme other than `postgresql` or `sqlite`.
    #[error("Unsupported database type: {0}")]
    UnsupportedType(String),
    /// URL could not be parsed.
    #[error("Invalid database URL: {0}")]
    InvalidUrl(String),
    /// The driver failed to connect.
    #[error("Database connection failed")]
    Connection(#[from] sqlx::Error),
}

impl DbError {
    /// Extra detail for JSON error payloads.
    #[must_use]
    pub fn details(&self) -> Option<String> {
        match self {
            Self::MissingUser { env_var } | Self::MissingPassword { env_var } => {
                Some(format!("Please set {env_var} environment variable"))
            }
            Self::Connection(err) => Some(err.to_string()),
            Self::UnsupportedType(_) | Self::InvalidUrl(_) => None,
        }
    }
}

#[async_trait]
/// Generic Database
pub trait Db: Sized {
    /// Connects to the configured database.
    ///
    /// With `lazy` set no connection is opened until the first query.
    ///
    /// # Errors
    /// Errors if credentials are missing or the connection fails.
    async fn connect(
        info: &DatabaseInfo,
        credentials: &Credentials,
        lazy: bool,
    ) -> Result<Self, DbError>;
}

/// Database connection pool.
#[derive(Debug, Clone)]
pub enum DatabaseConnection {
    /// `PostgreSQL` pool.
    Postgres(PgPool),
    /// `SQLite` pool.
    Sqlite(SqlitePool),
}

impl DatabaseConnection {
    /// Engine behind this connection.
    #[must_use]
    pub const fn kind(&self) -> DatabaseKind {
        match *self {
            Self::Postgres(_) => DatabaseKind::Postgresql,
            Self::Sqlite(_) => DatabaseKind::Sqlite,
        }
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        match *self {
            Self::Postgres(ref pool) => pool.close().await,
            Self::Sqlite(ref pool) => pool.close().await,
        }
    }
}

#[async_trait]
impl Db for DatabaseConnection {
    #[instrument(level = "trace", skip(credentials))]
    async fn connect(
        info: &DatabaseInfo,
        credentials: &Credentials,
        lazy: bool,
    ) -> Result<Self, DbError> {
        let connection = match info.kind {
            DatabaseKind::Postgresql => {
                let options = postgres_options(&info.connection, credentials)?;
                let pool_options = PgPoolOptions::new()
                    .max_connections(MAX_CONNECTIONS)
                    .acquire_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS));
                let pool = if lazy {
                    pool_options.connect_lazy_with(options)
                } else {
                    pool_options.connect_with(options).await?
                };
                Self::Postgres(pool)
            }
            DatabaseKind::Sqlite => {
                let (options, pool_options) = sqlite_options(&info.connection.dbname)?;
                let pool = if lazy {
                    pool_options.connect_lazy_with(options)
                } else {
                    pool_options.connect_with(options).await?
                };
                Self::Sqlite(pool)
            }
        };
        tracing::debug!(kind = ?info.kind, "Database pool ready");
        Ok(connection)
    }
}

/// Build `PostgreSQL` connect options, requiring both credentials.
fn postgres_options(
    connection: &ConnectionInfo,
    credentials: &Credentials,
) -> Result<PgConnectOptions, DbError> {
    let Some(user) = credentials.user.as_deref() else {
        return Err(DbError::MissingUser {
            env_var: connection.user_env_var().to_owned(),
        });
    };
    let Some(password) = credentials.password.as_deref() else {
        return Err(DbError::MissingPassword {
            env_var: connection.password_env_var().to_owned(),
        });
    };
    Ok(PgConnectOptions::new()
        .host(connection.host.as_deref().unwrap_or("localhost"))
        .port(connection.port.unwrap_or(DEFAULT_POSTGRES_PORT))
        .database(&connection.dbname)
        .username(user)
        .password(password))
}

/// Build `SQLite` connect and pool options. An in-memory database is private
/// to its connection and lost when it closes, so such pools hold exactly one
/// connection and never retire it.
fn sqlite_options(dbname: &str) -> Result<(SqliteConnectOptions, SqlitePoolOptions), DbError> {
    let pool_options =
        SqlitePoolOptions::new().acquire_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS));
    if dbname == ":memory:" {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool_options = pool_options
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
        return Ok((options, pool_options));
    }
    let options = SqliteConnectOptions::new().filename(dbname);
    Ok((options, pool_options.max_connections(MAX_CONNECTIONS)))
}

/// A database URL taken apart, as typed by the operator during setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDatabaseUrl {
    /// Connection description to store in the configuration (no schema yet).
    pub info: DatabaseInfo,
    /// User embedded in the URL.
    pub user: Option<String>,
    /// Password embedded in the URL.
    pub password: Option<String>,
}

/// Parse `postgresql://[user[:password]@]host[:port]/dbname` or
/// `sqlite://path`.
///
/// # Errors
/// Errors on malformed URLs and on unsupported schemes.
pub fn parse_database_url(raw: &str) -> Result<ParsedDatabaseUrl, DbError> {
    let raw = raw.trim();
    if let Some(path) = raw.strip_prefix("sqlite://") {
        if path.is_empty() {
            return Err(DbError::InvalidUrl(raw.to_owned()));
        }
        return Ok(ParsedDatabaseUrl {
            info: DatabaseInfo {
                kind: DatabaseKind::Sqlite,
                connection: ConnectionInfo {
                    dbname: path.to_owned(),
                    host: None,
                    port: None,
                    user: None,
                    password_env_var: None,
                    user_env_var: None,
                },
                schema: Schema::new(),
            },
            user: None,
            password: None,
        });
    }

    let url = Url::parse(raw).map_err(|err| DbError::InvalidUrl(format!("{raw} ({err})")))?;
    match url.scheme() {
        "postgresql" | "postgres" => {}
        other => return Err(DbError::UnsupportedType(other.to_owned())),
    }
    let dbname = url.path().trim_start_matches('/');
    if dbname.is_empty() {
        return Err(DbError::InvalidUrl(format!("{raw} (missing database name)")));
    }
    let decode = |part: &str| percent_decode_str(part).decode_utf8_lossy().into_owned();
    let user = Some(url.username())
        .filter(|name| !name.is_empty())
        .map(decode);
    let password = url.password().map(decode);

    Ok(ParsedDatabaseUrl {
        info: DatabaseInfo {
            kind: DatabaseKind::Postgresql,
            connection: ConnectionInfo {
                dbname: decode(dbname),
                host: Some(url.host_str().unwrap_or("localhost").to_owned()),
                port: Some(url.port().unwrap_or(DEFAULT_POSTGRES_PORT)),
                user: None,
                password_env_var: Some(DEFAULT_PASSWORD_ENV_VAR.to_owned()),
                user_env_var: Some(DEFAULT_USER_ENV_VAR.to_owned()),
            },
            schema: Schema::new(),
        },
        user,
        password,
    })
}

/// Whether a driver error means the database could not be reached at all,
/// as opposed to a failing statement.
#[must_use]
pub const fn is_connection_error(err: &sqlx::Error) -> bool {
    matches!(
        *err,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Configuration(_)
    )
}
