//! Logging initialisation.
//!
//! Components write to separate rolling files when file logging is enabled:
//!
//! | Log File      | Component                     | Target Prefixes |
//! |---------------|-------------------------------|-----------------|
//! | mora.log      | Root logger (all components)  | (all)           |
//! | core-auth.log | Token issuance and checking   | mora_auth       |
//! | lock.log      | Distributed locking           | mora_lock       |
//!
//! Log files are stored in `~/mora/logs` unless `log.dir` says otherwise.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Filter, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt as tracing_fmt};

const APP_NAME: &str = "mora";
const ROOT_LOG_FILE: &str = "mora.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

struct ComponentLogDef {
    file_name: &'static str,
    targets: &'static [&'static str],
}

/// Each entry produces a separate rolling file routed by `tracing` target.
/// The root `mora.log` always captures every event.
const COMPONENT_LOGS: &[ComponentLogDef] = &[
    ComponentLogDef {
        file_name: "core-auth.log",
        targets: &["mora_auth"],
    },
    ComponentLogDef {
        file_name: "lock.log",
        targets: &["mora_lock"],
    },
];

/// Log rotation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRotation {
    Daily,
    Hourly,
    Never,
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

impl FromStr for LogRotation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(LogRotation::Daily),
            "hourly" => Ok(LogRotation::Hourly),
            "never" => Ok(LogRotation::Never),
            other => Err(format!("unknown log rotation '{}', expected daily, hourly or never", other)),
        }
    }
}

/// Output encoding for every layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Console,
    /// Bunyan-style JSON objects, one per line
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "console" | "text" => Ok(LogFormat::Console),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}', expected console or json", other)),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Console => f.write_str("console"),
            LogFormat::Json => f.write_str("json"),
        }
    }
}

/// Logging configuration for the entire application.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_dir: PathBuf,
    pub console_output: bool,
    pub file_logging: bool,
    pub level: Level,
    pub format: LogFormat,
    pub rotation: LogRotation,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            console_output: true,
            file_logging: false,
            level: Level::INFO,
            format: LogFormat::Console,
            rotation: LogRotation::Daily,
        }
    }
}

pub fn default_log_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(format!("{}/mora/logs", home))
}

/// Keeps the non-blocking file writers alive; dropping it flushes them.
pub struct LoggingGuard {
    _file_guards: Vec<WorkerGuard>,
}

fn level_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()))
}

fn format_layer<W, F>(format: LogFormat, writer: W, ansi: bool, filter: F) -> BoxedLayer
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    F: Filter<Registry> + Send + Sync + 'static,
{
    match format {
        LogFormat::Console => Box::new(
            tracing_fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(ansi)
                .with_filter(filter),
        ),
        LogFormat::Json => {
            Box::new(BunyanFormattingLayer::new(APP_NAME.to_string(), writer).with_filter(filter))
        }
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the configured level for the console and root file.
/// Component files take everything their targets emit.
pub fn init_logging(
    config: &LoggingConfig,
) -> Result<LoggingGuard, Box<dyn std::error::Error + Send + Sync>> {
    if config.file_logging {
        std::fs::create_dir_all(&config.log_dir)?;
    }

    let mut guards: Vec<WorkerGuard> = Vec::new();
    let mut layers: Vec<BoxedLayer> = Vec::new();

    if config.format == LogFormat::Json {
        layers.push(Box::new(JsonStorageLayer));
    }

    if config.console_output {
        layers.push(format_layer(
            config.format,
            std::io::stdout,
            true,
            level_filter(config.level),
        ));
    }

    if config.file_logging {
        let root_appender =
            RollingFileAppender::new(config.rotation.into(), &config.log_dir, ROOT_LOG_FILE);
        let (root_nb, root_guard) = tracing_appender::non_blocking(root_appender);
        guards.push(root_guard);
        layers.push(format_layer(
            config.format,
            root_nb,
            false,
            level_filter(config.level),
        ));

        for component in COMPONENT_LOGS {
            let appender = RollingFileAppender::new(
                config.rotation.into(),
                &config.log_dir,
                component.file_name,
            );
            let (nb, guard) = tracing_appender::non_blocking(appender);
            guards.push(guard);

            let mut targets = Targets::new();
            for target in component.targets {
                targets = targets.with_target(*target, LevelFilter::TRACE);
            }
            layers.push(format_layer(config.format, nb, false, targets));
        }
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| format!("Failed to initialize logging: {}", e))?;

    if config.file_logging {
        tracing::info!(
            log_dir = %config.log_dir.display(),
            format = %config.format,
            "File logging initialized: {} (root) + {} component log files",
            ROOT_LOG_FILE,
            COMPONENT_LOGS.len()
        );
    }

    Ok(LoggingGuard {
        _file_guards: guards,
    })
}
