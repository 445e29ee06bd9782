//! Logging setup for the CLI.
//!
//! Two sinks: compact human-readable events on stderr, and a JSONL file
//! written through a non-blocking `tracing-appender` writer. The log file
//! location is resolved in this order:
//!
//! 1. `SURVEY_LENS_LOG_PATH` (exact file, no rotation)
//! 2. `SURVEY_LENS_LOG_DIR` (daily rotation)
//! 3. `log_dir` from the loaded configuration
//! 4. the platform data directory, under `logs/`

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

const ENV_LOG_PATH: &str = "SURVEY_LENS_LOG_PATH";
const ENV_LOG_DIR: &str = "SURVEY_LENS_LOG_DIR";
const LOG_FILE_NAME: &str = "survey-lens.jsonl";

/// Where JSONL logs go.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservabilityConfig {
    /// Exact log file; takes precedence over `log_dir`.
    pub log_path: Option<PathBuf>,
    /// Directory for daily-rotated log files.
    pub log_dir: Option<PathBuf>,
}

impl ObservabilityConfig {
    /// Resolve from the environment, falling back to `config_log_dir` and
    /// then the platform data directory.
    pub fn from_env_with_overrides(config_log_dir: Option<PathBuf>) -> Self {
        Self::resolve(
            std::env::var_os(ENV_LOG_PATH).map(PathBuf::from),
            std::env::var_os(ENV_LOG_DIR).map(PathBuf::from),
            config_log_dir,
        )
    }

    fn resolve(
        env_path: Option<PathBuf>,
        env_dir: Option<PathBuf>,
        config_log_dir: Option<PathBuf>,
    ) -> Self {
        let log_path = env_path.filter(|p| !p.as_os_str().is_empty());
        let log_dir = env_dir
            .filter(|p| !p.as_os_str().is_empty())
            .or(config_log_dir)
            .or_else(|| {
                survey_lens_core::config::user_data_dir().map(|d| d.join("logs").into_std_path_buf())
            });
        Self { log_path, log_dir }
    }

    fn file_target(&self) -> Option<(PathBuf, String, bool)> {
        if let Some(ref path) = self.log_path {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
            let name = path.file_name()?.to_string_lossy().into_owned();
            return Some((dir, name, false));
        }
        self.log_dir
            .as_ref()
            .map(|dir| (dir.clone(), LOG_FILE_NAME.to_string(), true))
    }
}

/// Build the global event filter.
///
/// `RUST_LOG` wins when set. Otherwise `-q` means errors only, each `-v`
/// raises the level one step, and the configured level applies by default.
pub fn env_filter(quiet: bool, verbose: u8, configured: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => configured,
            1 => "debug",
            _ => "trace",
        }
    };
    EnvFilter::new(level)
}

fn console_level(quiet: bool, verbose: u8) -> LevelFilter {
    if std::env::var_os("RUST_LOG").is_some() {
        return LevelFilter::TRACE;
    }
    if quiet {
        return LevelFilter::ERROR;
    }
    match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Keeps the non-blocking file writer flushing until dropped.
#[derive(Debug)]
pub struct ObservabilityGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber.
///
/// A log directory that cannot be created disables the file sink instead of
/// failing the command.
pub fn init_observability(
    config: &ObservabilityConfig,
    filter: EnvFilter,
    quiet: bool,
    verbose: u8,
) -> anyhow::Result<ObservabilityGuard> {
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .with_filter(console_level(quiet, verbose));

    let mut skipped_dir = None;
    let (file_layer, guard) = match config.file_target() {
        Some((dir, name, rotate)) => match std::fs::create_dir_all(&dir) {
            Ok(()) => {
                let appender = if rotate {
                    tracing_appender::rolling::daily(&dir, &name)
                } else {
                    tracing_appender::rolling::never(&dir, &name)
                };
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_current_span(true)
                    .with_writer(writer);
                (Some(layer), Some(guard))
            }
            Err(e) => {
                skipped_dir = Some((dir, e));
                (None, None)
            }
        },
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .context("a global tracing subscriber is already installed")?;

    if let Some((dir, e)) = skipped_dir {
        tracing::warn!(dir = %dir.display(), error = %e, "log directory unavailable; file logging disabled");
    }
    Ok(ObservabilityGuard { _file: guard })
}
