//! Process-wide logging bootstrap.
//!
//! # Responsibility
//! - Start rolling file logs once per process.
//! - Record panics as single-line `event=panic_captured` entries.
//!
//! # Invariants
//! - Initialization never panics.
//! - Repeating initialization with equal settings is a no-op.
//! - Different settings after initialization are rejected.

use flexi_logger::{
    Cleanup, Criterion, FileSpec, LogSpecification, Logger, LoggerHandle, Naming, WriteMode,
};
use log::{error, info, LevelFilter};
use once_cell::sync::OnceCell;
use std::any::Any;
use std::path::{Path, PathBuf};

pub const ENV_LOG_LEVEL: &str = "TASKBOARD_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "TASKBOARD_LOG_DIR";

const LOG_FILE_BASENAME: &str = "taskboard";
const ROTATE_AT_BYTES: u64 = 4 * 1024 * 1024;
const KEEP_LOG_FILES: usize = 3;
const PANIC_PAYLOAD_LIMIT: usize = 200;

static LOGGER: OnceCell<(LogSettings, LoggerHandle)> = OnceCell::new();
static PANIC_HOOK: OnceCell<()> = OnceCell::new();

/// Level and directory for file logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: LevelFilter,
    pub dir: PathBuf,
}

impl LogSettings {
    /// Parses `level` (`off`, `error` .. `trace`, any case) and anchors a
    /// relative `dir` at the current working directory.
    pub fn new(level: &str, dir: impl AsRef<Path>) -> Result<Self, String> {
        let level = level
            .trim()
            .parse::<LevelFilter>()
            .map_err(|_| format!("unknown log level `{}`", level.trim()))?;
        let dir = dir.as_ref();
        if dir.as_os_str().is_empty() {
            return Err("log directory is empty".to_string());
        }
        let dir = if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|err| format!("cannot resolve log directory: {err}"))?
                .join(dir)
        };
        Ok(Self { level, dir })
    }

    /// Settings from `TASKBOARD_LOG_DIR` / `TASKBOARD_LOG_LEVEL` through `lookup`.
    ///
    /// Returns `Ok(None)` when no directory is set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>, String> {
        let Some(dir) = lookup(ENV_LOG_DIR).filter(|dir| !dir.trim().is_empty()) else {
            return Ok(None);
        };
        let level = lookup(ENV_LOG_LEVEL)
            .filter(|level| !level.trim().is_empty())
            .unwrap_or_else(|| default_log_level().to_string());
        Self::new(&level, dir.trim()).map(Some)
    }
}

/// Starts file logging with `settings`.
///
/// # Errors
/// - The directory cannot be created or the backend fails to start.
/// - Logging already runs with different settings.
pub fn init_logging(settings: &LogSettings) -> Result<(), String> {
    let (active, _) = LOGGER.get_or_try_init(|| {
        start_logger(settings).map(|handle| (settings.clone(), handle))
    })?;
    if active != settings {
        return Err(format!(
            "logging already runs at {} in `{}`",
            active.level,
            active.dir.display()
        ));
    }
    Ok(())
}

/// Starts file logging when `TASKBOARD_LOG_DIR` is set.
///
/// Returns whether logging is now active.
pub fn init_logging_from_env() -> Result<bool, String> {
    match LogSettings::from_lookup(|name| std::env::var(name).ok())? {
        Some(settings) => init_logging(&settings).map(|()| true),
        None => Ok(false),
    }
}

/// `debug` for debug builds, `info` for release builds.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn start_logger(settings: &LogSettings) -> Result<LoggerHandle, String> {
    std::fs::create_dir_all(&settings.dir).map_err(|err| {
        format!("cannot create log directory `{}`: {err}", settings.dir.display())
    })?;

    let spec = LogSpecification::builder().default(settings.level).build();
    let handle = Logger::with(spec)
        .log_to_file(
            FileSpec::default()
                .directory(&settings.dir)
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(ROTATE_AT_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(KEEP_LOG_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| format!("cannot start logger: {err}"))?;

    hook_panics();
    info!(
        "event=logging_init module=logging status=ok level={} log_dir={} version={}",
        settings.level,
        settings.dir.display(),
        env!("CARGO_PKG_VERSION")
    );
    Ok(handle)
}

fn hook_panics() {
    if PANIC_HOOK.set(()).is_err() {
        return;
    }
    let chained = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map_or_else(|| "unknown".to_string(), |loc| format!("{}:{}", loc.file(), loc.line()));
        error!(
            "event=panic_captured module=logging status=error location={location} payload={}",
            one_line(panic_text(info.payload()), PANIC_PAYLOAD_LIMIT)
        );
        chained(info);
    }));
}

fn panic_text(payload: &(dyn Any + Send)) -> &str {
    if let Some(text) = payload.downcast_ref::<&str>() {
        *text
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Collapses line breaks and caps the text at `limit` characters.
fn one_line(text: &str, limit: usize) -> String {
    let mut out: String = text
        .chars()
        .map(|ch| if ch == '\n' || ch == '\r' { ' ' } else { ch })
        .take(limit)
        .collect();
    if text.chars().nth(limit).is_some() {
        out.push_str("...");
    }
    out
}
