//! Environment-supplied store configuration.
//!
//! # Responsibility
//! - Read the store connection settings once, at handle creation time.
//! - Report every missing setting by name instead of failing on the first.
//!
//! # Invariants
//! - Empty or whitespace-only values count as missing.
//! - The project id is a plain identifier, so its database file always lands
//!   inside the data directory.
//! - The API key never appears in `Debug` output.

use crate::store::is_valid_identifier;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::path::PathBuf;

pub const ENV_API_KEY: &str = "TASKBOARD_STORE_API_KEY";
pub const ENV_AUTH_DOMAIN: &str = "TASKBOARD_STORE_AUTH_DOMAIN";
pub const ENV_PROJECT_ID: &str = "TASKBOARD_STORE_PROJECT_ID";
pub const ENV_STORAGE_BUCKET: &str = "TASKBOARD_STORE_STORAGE_BUCKET";
pub const ENV_MESSAGING_SENDER_ID: &str = "TASKBOARD_STORE_MESSAGING_SENDER_ID";
pub const ENV_APP_ID: &str = "TASKBOARD_STORE_APP_ID";
/// Optional directory for a file-backed store. Unset means in-memory.
pub const ENV_DATA_DIR: &str = "TASKBOARD_DATA_DIR";

const DATABASE_FILE_EXTENSION: &str = "sqlite3";

/// Where the store client is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeContext {
    /// Interactive session; a store handle may be created.
    Interactive,
    /// Non-interactive pre-rendering; no store handle is ever created.
    Prerender,
}

impl RuntimeContext {
    pub fn is_interactive(self) -> bool {
        matches!(self, Self::Interactive)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Names of the environment variables that were missing or blank.
    Missing(Vec<&'static str>),
    /// Name of the environment variable whose value is not accepted.
    Invalid(&'static str),
}

impl ConfigError {
    /// Stable code for log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Missing(_) => "config_missing",
            Self::Invalid(_) => "config_invalid",
        }
    }
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing(names) => write!(
                f,
                "missing store configuration: {}",
                names.join(", ")
            ),
            Self::Invalid(name) => write!(
                f,
                "invalid store configuration: {name} may only contain letters, digits, `_` and `-`"
            ),
        }
    }
}

impl Error for ConfigError {}

/// Connection settings for the document store.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub api_key: String,
    pub auth_domain: String,
    pub project_id: String,
    pub storage_bucket: String,
    pub messaging_sender_id: String,
    pub app_id: String,
    pub data_dir: Option<PathBuf>,
}

impl StoreConfig {
    /// Reads configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through `lookup`, keyed by environment variable name.
    ///
    /// # Errors
    /// - Returns `ConfigError::Missing` listing every absent required setting.
    /// - Returns `ConfigError::Invalid` when the project id is not an identifier.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut missing = Vec::new();
        let mut required = |name: &'static str| match non_blank(lookup(name)) {
            Some(value) => value,
            None => {
                missing.push(name);
                String::new()
            }
        };

        let api_key = required(ENV_API_KEY);
        let auth_domain = required(ENV_AUTH_DOMAIN);
        let project_id = required(ENV_PROJECT_ID);
        let storage_bucket = required(ENV_STORAGE_BUCKET);
        let messaging_sender_id = required(ENV_MESSAGING_SENDER_ID);
        let app_id = required(ENV_APP_ID);

        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }
        if !is_valid_identifier(&project_id) {
            return Err(ConfigError::Invalid(ENV_PROJECT_ID));
        }

        Ok(Self {
            api_key,
            auth_domain,
            project_id,
            storage_bucket,
            messaging_sender_id,
            app_id,
            data_dir: non_blank(lookup(ENV_DATA_DIR)).map(PathBuf::from),
        })
    }

    /// Uses `dir` as the data directory unless one is already configured.
    pub fn or_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        if self.data_dir.is_none() {
            self.data_dir = Some(dir.into());
        }
        self
    }

    /// Database file for this project, or `None` for an in-memory store.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| {
            dir.join(format!("{}.{DATABASE_FILE_EXTENSION}", self.project_id))
        })
    }
}

impl Debug for StoreConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("api_key", &"<redacted>")
            .field("auth_domain", &self.auth_domain)
            .field("project_id", &self.project_id)
            .field("storage_bucket", &self.storage_bucket)
            .field("messaging_sender_id", &self.messaging_sender_id)
            .field("app_id", &self.app_id)
            .field("data_dir", &self.data_dir)
            .finish()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
