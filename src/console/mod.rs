//! Interactive management of the configuration: database setup and the
//! endpoint menu.
use std::sync::Arc;

use crate::config::{ApiDefinition, Config, DatabaseKind};
use crate::db::gate::ModificationGate;
use crate::db::introspect::introspect;
use crate::db::{parse_database_url, Credentials, DatabaseConnection, Db as _, DbError};
use crate::llm::planner::{plan_endpoint, EndpointPlan};
use crate::llm::ChatClient;
use crate::server::app::{run_server, ServeOptions};

pub mod prompter;

pub use prompter::{Prompter, ScriptedPrompter, TerminalPrompter};

/// What the main menu should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Next {
    /// Show the menu again.
    Continue,
    /// Leave the menu.
    Exit,
}

/// The interactive console.
pub struct Console<P: Prompter> {
    /// Configuration being edited, saved after every change.
    config: Config,
    /// Plans endpoints and serves requests.
    llm: Arc<dyn ChatClient>,
    /// Asks before data modifications while serving.
    gate: Arc<ModificationGate>,
    /// Credentials known this session.
    credentials: Option<Credentials>,
    /// How to run the server.
    options: ServeOptions,
    /// Operator I/O.
    prompter: P,
}

impl<P: Prompter> std::fmt::Debug for Console<P> {
    fn fmt(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter
            .debug_struct("Console")
            .field("config", &self.config.path)
            .field("apis", &self.config.apis.len())
            .finish_non_exhaustive()
    }
}

impl<P: Prompter> Console<P> {
    /// Console editing `config`.
    #[must_use]
    pub fn new(
        config: Config,
        llm: Arc<dyn ChatClient>,
        gate: Arc<ModificationGate>,
        options: ServeOptions,
        prompter: P,
    ) -> Self {
        Self {
            config,
            llm,
            gate,
            credentials: None,
            options,
            prompter,
        }
    }

    /// Current configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Operator I/O.
    #[must_use]
    pub const fn prompter(&self) -> &P {
        &self.prompter
    }

    /// Run the menu until the operator exits or input ends.
    ///
    /// # Errors
    /// Errors if the terminal cannot be read or the configuration cannot be saved.
    pub async fn main_menu(&mut self) -> anyhow::Result<()> {
        let mut without_database = false;
        loop {
            self.prompter.say("\n=== Vibe API Server ===");

            if !self.config.has_database() && !without_database {
                self.prompter.say("No database connection configured");
                if !self.setup_database().await? {
                    self.prompter.say("Database setup skipped or failed.");
                    let answer = self.prompter.read_line("Continue without database? (y/n): ")?;
                    if !answer.is_some_and(|answer| answer.trim().eq_ignore_ascii_case("y")) {
                        self.prompter.say("Exiting.");
                        return Ok(());
                    }
                    without_database = true;
                }
            }

            self.show_api_list();
            self.prompter.say("\nOptions:");
            self.prompter.say("1. Add an API");
            self.prompter.say("2. Update an API");
            self.prompter.say("3. Delete an API");
            self.prompter.say("4. Run API Server");
            self.prompter.say("5. Exit");

            let Some(choice) = self.prompter.read_line("\nEnter your choice (1-5): ")? else {
                self.prompter.say("Exiting API Server");
                return Ok(());
            };
            let next = match choice.trim() {
                "1" => self.add_api().await?,
                "2" => self.update_api().await?,
                "3" => self.delete_api()?,
                "4" => self.run_server().await?,
                "5" => {
                    self.prompter.say("Exiting API Server");
                    Next::Exit
                }
                _ => {
                    self.prompter
                        .say("Invalid choice. Please enter a number between 1 and 5.");
                    Next::Continue
                }
            };
            if next == Next::Exit {
                return Ok(());
            }
        }
    }

    /// Ask for a database URL, connect, introspect and save.
    ///
    /// Returns whether a database is now configured.
    ///
    /// # Errors
    /// Errors if the terminal cannot be read or the configuration cannot be saved.
    pub async fn setup_database(&mut self) -> anyhow::Result<bool> {
        self.prompter.say("\n=== Database Setup ===");
        let Some(raw_url) = self.prompter.read_line(
            "Enter a database connection URL (e.g., postgresql://localhost/mydatabase): ",
        )?
        else {
            return Ok(false);
        };
        if raw_url.trim().is_empty() {
            return Ok(false);
        }

        let parsed = match parse_database_url(&raw_url) {
            Ok(parsed) => parsed,
            Err(DbError::UnsupportedType(scheme)) => {
                self.prompter
                    .say(&format!("Unsupported database type: {scheme}"));
                self.prompter.say("Currently supported: postgresql, sqlite");
                return Ok(false);
            }
            Err(err) => {
                self.prompter.say(&err.to_string());
                return Ok(false);
            }
        };

        let mut info = parsed.info;
        let mut credentials = Credentials {
            user: parsed.user,
            password: parsed.password,
        };
        if info.kind == DatabaseKind::Postgresql {
            if credentials.user.is_none() {
                credentials.user = self
                    .prompter
                    .read_line("Database username: ")?
                    .map(|user| user.trim().to_owned())
                    .filter(|user| !user.is_empty());
            }
            if credentials.password.is_none() {
                credentials.password = self
                    .prompter
                    .read_secret("Database password: ")?
                    .filter(|password| !password.is_empty());
            }
        }

        let connection = match DatabaseConnection::connect(&info, &credentials, false).await {
            Ok(connection) => connection,
            Err(err) => {
                self.prompter
                    .say(&format!("Error connecting to the database: {err}"));
                if let Some(details) = err.details() {
                    self.prompter.say(&details);
                }
                return Ok(false);
            }
        };
        let schema = introspect(&connection).await;
        connection.close().await;
        info.schema = match schema {
            Ok(schema) => schema,
            Err(err) => {
                self.prompter
                    .say(&format!("Error introspecting the database: {err:#}"));
                return Ok(false);
            }
        };

        self.config.database = Some(info);
        self.credentials = Some(credentials);
        self.prompter
            .say("\nDatabase connection successful and schema introspected.");
        self.config.save()?;
        Ok(true)
    }

    /// List the configured endpoints.
    pub fn show_api_list(&mut self) {
        self.prompter.say("\n=== Current API Endpoints ===");
        if self.config.apis.is_empty() {
            self.prompter.say("No APIs defined yet");
            return;
        }
        for (number, api) in self.config.apis.iter().enumerate() {
            self.prompter.say(&format!(
                "{}. {} - {} - {}",
                number + 1,
                api.method,
                api.path,
                api.description
            ));
        }
    }

    /// Describe a new endpoint and let the model plan it.
    async fn add_api(&mut self) -> anyhow::Result<Next> {
        self.prompter.say("\n=== Add New API Endpoint ===");
        let Some(path) = self.prompter.read_line("Enter API path (e.g., /users/rooms): ")? else {
            return Ok(Next::Exit);
        };
        let path = path.trim().to_owned();
        if path.is_empty() {
            self.prompter.say("API path cannot be empty");
            return Ok(Next::Continue);
        }
        self.prompter.say("\nDescribe what this API should do:");
        let Some(description) = self.prompter.read_line("> ")? else {
            return Ok(Next::Exit);
        };
        let description = description.trim();

        let defaults = EndpointPlan::new_default(description);
        let plan = match plan_endpoint(
            self.llm.as_ref(),
            &path,
            description,
            &self.config.schema(),
            &defaults,
        )
        .await
        {
            Ok(plan) => plan,
            Err(err) => {
                self.prompter
                    .say(&format!("Error creating API endpoint: {err}"));
                return Ok(Next::Continue);
            }
        };

        let api = ApiDefinition::new(
            &plan.method,
            &path,
            &plan.concise_description,
            &plan.implementation,
        );
        self.prompter
            .say(&format!("\nAPI endpoint added: {} {}", api.method, api.path));
        self.prompter
            .say(&format!("Description: {}", api.description));
        self.config.add_api(api);
        self.config.save()?;
        Ok(Next::Continue)
    }

    /// Pick an endpoint by its number in the list. `Ok(None)` after telling
    /// the operator what was wrong with the answer.
    fn select_api(&mut self, prompt: &str) -> anyhow::Result<Option<usize>> {
        let Some(answer) = self.prompter.read_line(prompt)? else {
            return Ok(None);
        };
        let Ok(number) = answer.trim().parse::<usize>() else {
            self.prompter.say("Please enter a valid number");
            return Ok(None);
        };
        if number < 1 || number > self.config.apis.len() {
            self.prompter.say("Invalid selection");
            return Ok(None);
        }
        Ok(Some(number - 1))
    }

    /// Re-plan an endpoint from a new description.
    async fn update_api(&mut self) -> anyhow::Result<Next> {
        self.show_api_list();
        if self.config.apis.is_empty() {
            return Ok(Next::Continue);
        }
        let Some(index) = self.select_api("\nEnter the number of the API to update: ")? else {
            return Ok(Next::Continue);
        };
        let Some(current) = self.config.apis.get(index).cloned() else {
            return Ok(Next::Continue);
        };

        self.prompter
            .say(&format!("\nUpdating API: {} {}", current.method, current.path));
        self.prompter
            .say(&format!("Current description: {}", current.description));
        self.prompter
            .say("\nEnter new description (leave empty to keep current):");
        let description = self.prompter.read_line("> ")?.unwrap_or_default();
        let description = description.trim();
        if description.is_empty() {
            self.prompter.say("No changes made");
            return Ok(Next::Continue);
        }

        let defaults = EndpointPlan {
            method: current.method.clone(),
            concise_description: description.to_owned(),
            implementation: current.implementation.clone(),
        };
        let plan = match plan_endpoint(
            self.llm.as_ref(),
            &current.path,
            description,
            &self.config.schema(),
            &defaults,
        )
        .await
        {
            Ok(plan) => plan,
            Err(err) => {
                self.prompter
                    .say(&format!("Error updating API endpoint: {err}"));
                return Ok(Next::Continue);
            }
        };

        let updated = self
            .config
            .update_api(
                index,
                &plan.method,
                &plan.concise_description,
                &plan.implementation,
            )?
            .clone();
        self.config.save()?;
        self.prompter.say(&format!(
            "\nAPI endpoint updated: {} {}",
            updated.method, updated.path
        ));
        self.prompter
            .say(&format!("New description: {}", updated.description));
        Ok(Next::Continue)
    }

    /// Remove an endpoint after confirmation.
    fn delete_api(&mut self) -> anyhow::Result<Next> {
        self.show_api_list();
        if self.config.apis.is_empty() {
            return Ok(Next::Continue);
        }
        let Some(index) = self.select_api("\nEnter the number of the API to delete: ")? else {
            return Ok(Next::Continue);
        };
        let Some(api) = self.config.apis.get(index) else {
            return Ok(Next::Continue);
        };
        let question = format!(
            "Are you sure you want to delete {} {}? (y/n): ",
            api.method, api.path
        );
        let confirmed = self
            .prompter
            .read_line(&question)?
            .is_some_and(|answer| answer.trim().eq_ignore_ascii_case("y"));
        if confirmed {
            self.config.remove_api(index)?;
            self.config.save()?;
            self.prompter.say("API endpoint deleted");
        } else {
            self.prompter.say("Operation cancelled");
        }
        Ok(Next::Continue)
    }

    /// Serve the endpoints until interrupted, then come back to the menu.
    async fn run_server(&mut self) -> anyhow::Result<Next> {
        let credentials = match (self.credentials.clone(), self.config.database.as_ref()) {
            (Some(credentials), _) => credentials,
            (None, Some(info)) => {
                Credentials::resolve(info.kind, &info.connection, &mut self.prompter)?
            }
            (None, None) => Credentials::default(),
        };
        if let Err(err) = run_server(
            &self.config,
            Arc::clone(&self.llm),
            &credentials,
            Arc::clone(&self.gate),
            self.options,
        )
        .await
        {
            self.prompter.say(&format!("{err:#}"));
            return Ok(Next::Continue);
        }
        self.credentials = Some(credentials);
        Ok(Next::Continue)
    }
}
