//! The configuration file: connected database, its introspected schema, and
//! the list of endpoint definitions.
//!
//! The file is plain markdown so that it can be read (and edited) by humans.
//! See [`markdown`] for the exact layout.

use std::collections::BTreeMap;
use std::fs::{read_to_string, write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub mod docs;
pub mod markdown;

/// Default configuration file name, relative to the working directory.
pub const CONFIG_FILE: &str = "vibe-api.txt";

/// Environment variable holding the database user, unless overridden.
pub const DEFAULT_USER_ENV_VAR: &str = "DB_USER";

/// Environment variable holding the database password, unless overridden.
pub const DEFAULT_PASSWORD_ENV_VAR: &str = "DB_PASSWORD";

/// A single endpoint served by the API server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiDefinition {
    /// Identifier derived from the path, e.g. `users_{id}`.
    pub name: String,
    /// Upper-case HTTP method.
    pub method: String,
    /// Path pattern, `{param}` segments capture path parameters.
    pub path: String,
    /// One-line description.
    pub description: String,
    /// Step-by-step implementation plan handed to the agent.
    pub implementation: String,
}

impl ApiDefinition {
    /// Build a new definition, deriving its name from `path`.
    #[must_use]
    pub fn new(method: &str, path: &str, description: &str, implementation: &str) -> Self {
        Self {
            name: api_name_from_path(path),
            method: method.to_owned(),
            path: path.to_owned(),
            description: description.to_owned(),
            implementation: implementation.to_owned(),
        }
    }
}

/// Derive an endpoint name from its path.
///
/// `/users/rooms/` becomes `users_rooms`.
#[must_use]
pub fn api_name_from_path(path: &str) -> String {
    path.trim_matches('/').replace('/', "_")
}

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    /// `PostgreSQL`, addressed as `postgresql://`.
    Postgresql,
    /// `SQLite` file, addressed as `sqlite://`.
    Sqlite,
}

impl DatabaseKind {
    /// URL scheme for this engine.
    #[must_use]
    pub const fn scheme(self) -> &'static str {
        match self {
            Self::Postgresql => "postgresql",
            Self::Sqlite => "sqlite",
        }
    }
}

/// Connection parameters. Credentials themselves are never stored, only the
/// names of the environment variables holding them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConnectionInfo {
    /// Database name, or the file path for `SQLite`.
    pub dbname: String,
    /// Server host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Server port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Fallback user when the user env var is unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Name of the env var with the password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env_var: Option<String>,
    /// Name of the env var with the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_env_var: Option<String>,
}

impl ConnectionInfo {
    /// Env var holding the user.
    #[must_use]
    pub fn user_env_var(&self) -> &str {
        self.user_env_var.as_deref().unwrap_or(DEFAULT_USER_ENV_VAR)
    }

    /// Env var holding the password.
    #[must_use]
    pub fn password_env_var(&self) -> &str {
        self.password_env_var
            .as_deref()
            .unwrap_or(DEFAULT_PASSWORD_ENV_VAR)
    }
}

/// A column of an introspected table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Database type name as reported by the engine.
    #[serde(rename = "type")]
    pub data_type: String,
    /// Whether the column accepts `NULL`.
    pub nullable: bool,
}

/// Target of a foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ForeignKeyTarget {
    /// Referenced schema.
    pub schema: String,
    /// Referenced table.
    pub table: String,
    /// Referenced column.
    pub column: String,
}

/// A foreign key column.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ForeignKey {
    /// Referencing column.
    pub column: String,
    /// What it references.
    pub references: ForeignKeyTarget,
}

/// An index and the columns it covers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Index {
    /// Index name.
    pub name: String,
    /// Indexed columns.
    pub columns: Vec<String>,
}

/// Introspected description of one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct TableInfo {
    /// Columns in ordinal order.
    pub columns: Vec<Column>,
    /// Primary key columns.
    pub primary_keys: Vec<String>,
    /// Foreign key columns.
    pub foreign_keys: Vec<ForeignKey>,
    /// Indexes.
    pub indexes: Vec<Index>,
}

/// Schema name to table name to table description.
pub type Schema = BTreeMap<String, BTreeMap<String, TableInfo>>;

/// Everything known about the connected database.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DatabaseInfo {
    /// Engine.
    #[serde(rename = "type")]
    pub kind: DatabaseKind,
    /// How to reach it.
    pub connection: ConnectionInfo,
    /// Introspected schema.
    #[serde(default)]
    pub schema: Schema,
}

/// In-memory form of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Where the configuration is read from and saved to.
    pub path: PathBuf,
    /// Connected database, if set up.
    pub database: Option<DatabaseInfo>,
    /// Endpoint definitions, in matching order.
    pub apis: Vec<ApiDefinition>,
}

impl Config {
    /// Load the configuration at `path`.
    ///
    /// A missing file yields an empty configuration bound to `path`, so that
    /// the first save creates it.
    ///
    /// # Errors
    /// Errors if the file exists but cannot be read.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::warn!("Configuration file {} not found.", path.display());
            return Ok(Self {
                path: path.to_path_buf(),
                ..Self::default()
            });
        }
        let content = read_to_string(path)?;
        let (database, apis) = markdown::parse(&content);
        tracing::debug!(apis = apis.len(), "Loaded configuration");
        Ok(Self {
            path: path.to_path_buf(),
            database,
            apis,
        })
    }

    /// Write the configuration back to its file.
    ///
    /// # Errors
    /// Errors if the file cannot be written.
    pub fn save(&self) -> anyhow::Result<()> {
        let content = markdown::render(self.database.as_ref(), &self.apis)?;
        write(&self.path, content)?;
        tracing::info!("Configuration saved to {}", self.path.display());
        Ok(())
    }

    /// Whether a database connection has been configured.
    #[must_use]
    pub const fn has_database(&self) -> bool {
        self.database.is_some()
    }

    /// Introspected schema, empty when no database is configured.
    #[must_use]
    pub fn schema(&self) -> Schema {
        self.database
            .as_ref()
            .map(|db| db.schema.clone())
            .unwrap_or_default()
    }

    /// Append an endpoint.
    pub fn add_api(&mut self, api: ApiDefinition) {
        self.apis.push(api);
    }

    /// Replace the method, description and implementation of the endpoint
    /// at `index`. Name and path are kept.
    ///
    /// # Errors
    /// Errors if `index` is out of range.
    pub fn update_api(
        &mut self,
        index: usize,
        method: &str,
        description: &str,
        implementation: &str,
    ) -> anyhow::Result<&ApiDefinition> {
        let Some(api) = self.apis.get_mut(index) else {
            anyhow::bail!("Invalid selection");
        };
        method.clone_into(&mut api.method);
        description.clone_into(&mut api.description);
        implementation.clone_into(&mut api.implementation);
        Ok(api)
    }

    /// Remove the endpoint at `index` and return it.
    ///
    /// # Errors
    /// Errors if `index` is out of range.
    pub fn remove_api(&mut self, index: usize) -> anyhow::Result<ApiDefinition> {
        if index >= self.apis.len() {
            anyhow::bail!("Invalid selection");
        }
        Ok(self.apis.remove(index))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_api_name_from_path_when_nested_expect_underscored() {
        assert_eq!(api_name_from_path("/users/rooms/"), "users_rooms");
        assert_eq!(api_name_from_path("/users/{id}"), "users_{id}");
        assert_eq!(api_name_from_path("/"), "");
    }

    #[test]
    fn test_connection_info_when_no_env_vars_expect_defaults() {
        let info = ConnectionInfo {
            dbname: "app".into(),
            host: None,
            port: None,
            user: None,
            password_env_var: None,
            user_env_var: None,
        };
        assert_eq!(info.user_env_var(), "DB_USER");
        assert_eq!(info.password_env_var(), "DB_PASSWORD");
    }

    #[test]
    fn test_update_api_when_out_of_range_expect_error() {
        let mut config = Config::default();
        let actual = config.update_api(0, "GET", "x", "y").unwrap_err();
        assert_eq!(actual.to_string(), "Invalid selection");
    }

    #[test]
    fn test_remove_api_when_in_range_expect_removed() {
        let mut config = Config::default();
        config.add_api(ApiDefinition::new("GET", "/a", "A", "1."));
        config.add_api(ApiDefinition::new("GET", "/b", "B", "1."));
        let removed = config.remove_api(0).unwrap();
        assert_eq!(removed.path, "/a");
        assert_eq!(config.apis.len(), 1);
        assert_eq!(config.apis[0].path, "/b");
    }

    #[test]
    fn test_load_when_missing_file_expect_empty_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.txt");
        let config = Config::load(&path).unwrap();
        assert!(!config.has_database());
        assert!(config.apis.is_empty());
        assert_eq!(config.path, path);
    }
}
