//! Database credentials.
//!
//! Credentials come from environment variables (`DB_USER` and `DB_PASSWORD`
//! unless the configuration names others) and are otherwise asked for
//! interactively. They are kept in memory only, never written to the
//! configuration file and never exported back into the environment.
use std::env;
use std::fmt;

use crate::config::{ConnectionInfo, DatabaseKind};
use crate::console::Prompter;

/// User and password for a database connection.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Database user.
    pub user: Option<String>,
    /// Database password.
    pub password: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter
            .debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .finish()
    }
}

/// Read a non-empty env var.
fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

impl Credentials {
    /// Credentials available without asking: env vars first, then the user
    /// stored in the configuration.
    #[must_use]
    pub fn from_env(connection: &ConnectionInfo) -> Self {
        Self {
            user: non_empty_var(connection.user_env_var()).or_else(|| connection.user.clone()),
            password: non_empty_var(connection.password_env_var()),
        }
    }

    /// Like [`Credentials::from_env`], then ask for whatever is still
    /// missing. `SQLite` needs no credentials.
    ///
    /// An empty answer leaves the value unset.
    ///
    /// # Errors
    /// Errors if reading from the prompter fails.
    pub fn resolve(
        kind: DatabaseKind,
        connection: &ConnectionInfo,
        prompter: &mut dyn Prompter,
    ) -> anyhow::Result<Self> {
        let mut credentials = Self::from_env(connection);
        if kind == DatabaseKind::Sqlite {
            return Ok(credentials);
        }

        if credentials.password.is_none() {
            let env_var = connection.password_env_var();
            prompter.say(&format!(
                "Database password not found in environment variable {env_var}.\n\
                 Please set {env_var} environment variable or enter it now."
            ));
            credentials.password = prompter
                .read_secret("Enter database password (leave empty to skip): ")?
                .filter(|answer| !answer.is_empty());
            if credentials.password.is_some() {
                prompter.say("Database password set for this session.");
            }
        }

        if credentials.user.is_none() {
            let env_var = connection.user_env_var();
            prompter.say(&format!(
                "Database user not found in environment variable {env_var}.\n\
                 Please set {env_var} environment variable or enter it now."
            ));
            credentials.user = prompter
                .read_line("Enter database username: ")?
                .map(|answer| answer.trim().to_owned())
                .filter(|answer| !answer.is_empty());
            if credentials.user.is_some() {
                prompter.say("Database username set for this session.");
            }
        }
        Ok(credentials)
    }
}
