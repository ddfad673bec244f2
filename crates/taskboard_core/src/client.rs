//! Store client initializer.
//!
//! # Responsibility
//! - Create at most one store handle per client, on first use.
//! - Refuse to create a handle outside an interactive session.
//! - Hand repositories and boards the handle, or the reason there is none.
//!
//! # Invariants
//! - Constructing a client performs no I/O and reads no configuration.
//! - The first creation attempt is cached; later calls never retry it.
//! - A missing configuration never panics; it degrades to `Unavailable`.

use crate::config::{ConfigError, RuntimeContext, StoreConfig};
use crate::repo::task_repo::TaskRepository;
use crate::service::task_board::TaskBoard;
use crate::store::{SqliteDocumentStore, StoreError, StoreResult};
use log::{info, warn};
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// Shared handle to the session's document store.
pub type StoreHandle = Arc<SqliteDocumentStore>;

const PRERENDER_REASON: &str = "store client is not available during prerendering";

type ConfigLoader = Box<dyn Fn() -> Result<StoreConfig, ConfigError> + Send + Sync>;

/// Lazily connected document store client.
pub struct StoreClient {
    context: RuntimeContext,
    loader: ConfigLoader,
    handle: OnceCell<Result<StoreHandle, String>>,
}

impl StoreClient {
    /// Client configured from `TASKBOARD_*` environment variables.
    pub fn from_env(context: RuntimeContext) -> Self {
        Self::with_loader(context, StoreConfig::from_env)
    }

    /// Client with a fixed configuration.
    pub fn with_config(context: RuntimeContext, config: StoreConfig) -> Self {
        Self::with_loader(context, move || Ok(config.clone()))
    }

    /// Client whose configuration is produced by `loader` on first use.
    pub fn with_loader(
        context: RuntimeContext,
        loader: impl Fn() -> Result<StoreConfig, ConfigError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            context,
            loader: Box::new(loader),
            handle: OnceCell::new(),
        }
    }

    pub fn context(&self) -> RuntimeContext {
        self.context
    }

    /// Returns the store handle, creating it on first call.
    ///
    /// Returns `None` outside an interactive context, or when creation failed.
    pub fn handle(&self) -> Option<StoreHandle> {
        self.resolve().ok()
    }

    /// Task repository bound to this client's handle.
    pub fn repository(&self) -> TaskRepository<SqliteDocumentStore> {
        match self.resolve() {
            Ok(store) => TaskRepository::new(store),
            Err(reason) => TaskRepository::unavailable(reason),
        }
    }

    /// Activates a live task board for this client.
    pub fn board(&self) -> TaskBoard<SqliteDocumentStore> {
        TaskBoard::activate(self.repository())
    }

    fn resolve(&self) -> Result<StoreHandle, String> {
        if !self.context.is_interactive() {
            return Err(PRERENDER_REASON.to_string());
        }
        self.handle.get_or_init(|| self.connect()).clone()
    }

    fn connect(&self) -> Result<StoreHandle, String> {
        let config = (self.loader)().map_err(|err| {
            warn!(
                "event=store_handle module=client status=error error_code={} error={err}",
                err.code()
            );
            err.to_string()
        })?;

        let store = open_store(&config).map_err(|err| {
            warn!(
                "event=store_handle module=client status=error error_code=store_open_failed project_id={} error={err}",
                config.project_id
            );
            err.to_string()
        })?;

        info!(
            "event=store_handle module=client status=ok project_id={} app_id={} persistent={}",
            config.project_id,
            config.app_id,
            config.data_dir.is_some()
        );
        Ok(Arc::new(store))
    }
}

fn open_store(config: &StoreConfig) -> StoreResult<SqliteDocumentStore> {
    let store = match config.database_path() {
        Some(path) => {
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir).map_err(|err| {
                    StoreError::Unavailable(format!(
                        "failed to create data directory `{}`: {err}",
                        dir.display()
                    ))
                })?;
            }
            SqliteDocumentStore::open(path)?
        }
        None => SqliteDocumentStore::open_in_memory()?,
    };
    store.bind_project(&config.project_id)?;
    Ok(store)
}
