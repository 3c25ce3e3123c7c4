//! Configuration management for Mora
//!
//! Sources, lowest precedence first:
//! 1. `conf/application.yml` (or the file given on the command line)
//! 2. environment variables listed in [`ENV_BINDINGS`]
//! 3. command line overrides

use std::path::Path;
use std::time::Duration;

use ::config::{Config, File, ValueKind};
use mora_auth::{
    AUTH_SKIP_PATHS_KEY, DEFAULT_TOKEN_TTL_SECONDS, JWT_SECRET_KEY, JWT_TTL_SECONDS_KEY,
    MAX_TOKEN_TTL_SECONDS, SkipPaths, TokenAuthority,
};
use mora_lock::store::redis::{DEFAULT_REDIS_ADDR, REDIS_ADDR_KEY, REDIS_DB_KEY, REDIS_PASSWORD_KEY};
use mora_lock::{
    DEFAULT_LOCK_TIMEOUT, DEFAULT_LOCK_TTL, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY,
    LOCK_MAX_RETRIES_KEY, LOCK_RETRY_DELAY_MS_KEY, LOCK_TIMEOUT_MS_KEY, LOCK_TTL_MS_KEY,
    LockOptions, RedisConfig,
};
use tracing::Level;

use crate::error::ConfigError;
use crate::startup::{LogFormat, LogRotation, LoggingConfig, default_log_dir};

pub const DEFAULT_CONFIG_FILE: &str = "conf/application.yml";

// Logging configuration keys
pub const LOG_LEVEL_KEY: &str = "log.level";
pub const LOG_FORMAT_KEY: &str = "log.format";
pub const LOG_DIR_KEY: &str = "log.dir";
pub const LOG_CONSOLE_KEY: &str = "log.console";
pub const LOG_FILE_KEY: &str = "log.file";
pub const LOG_ROTATION_KEY: &str = "log.rotation";

type EnvParser = fn(&str) -> Result<ValueKind, String>;

/// One environment variable honoured as a configuration source
pub struct EnvBinding {
    pub key: &'static str,
    pub var: &'static str,
    parse: EnvParser,
}

/// Every environment variable the configuration reads. Nothing else in the
/// environment is consulted.
pub const ENV_BINDINGS: &[EnvBinding] = &[
    EnvBinding {
        key: REDIS_ADDR_KEY,
        var: "MORA_REDIS_ADDR",
        parse: parse_string,
    },
    EnvBinding {
        key: REDIS_PASSWORD_KEY,
        var: "MORA_REDIS_PASSWORD",
        parse: parse_string,
    },
    EnvBinding {
        key: REDIS_DB_KEY,
        var: "MORA_REDIS_DB",
        parse: parse_non_negative,
    },
    EnvBinding {
        key: LOCK_TTL_MS_KEY,
        var: "MORA_LOCK_TTL_MS",
        parse: parse_non_negative,
    },
    EnvBinding {
        key: LOCK_RETRY_DELAY_MS_KEY,
        var: "MORA_LOCK_RETRY_DELAY_MS",
        parse: parse_non_negative,
    },
    EnvBinding {
        key: LOCK_MAX_RETRIES_KEY,
        var: "MORA_LOCK_MAX_RETRIES",
        parse: parse_non_negative,
    },
    EnvBinding {
        key: LOCK_TIMEOUT_MS_KEY,
        var: "MORA_LOCK_TIMEOUT_MS",
        parse: parse_non_negative,
    },
    EnvBinding {
        key: JWT_SECRET_KEY,
        var: "MORA_JWT_SECRET",
        parse: parse_string,
    },
    EnvBinding {
        key: JWT_TTL_SECONDS_KEY,
        var: "MORA_JWT_TTL_SECONDS",
        parse: parse_ttl_seconds,
    },
    EnvBinding {
        key: LOG_LEVEL_KEY,
        var: "MORA_LOG_LEVEL",
        parse: parse_level,
    },
    EnvBinding {
        key: LOG_FORMAT_KEY,
        var: "MORA_LOG_FORMAT",
        parse: parse_log_format,
    },
    EnvBinding {
        key: LOG_DIR_KEY,
        var: "MORA_LOG_DIR",
        parse: parse_string,
    },
    EnvBinding {
        key: LOG_CONSOLE_KEY,
        var: "MORA_LOG_CONSOLE",
        parse: parse_bool,
    },
    EnvBinding {
        key: LOG_FILE_KEY,
        var: "MORA_LOG_FILE",
        parse: parse_bool,
    },
];

fn parse_string(raw: &str) -> Result<ValueKind, String> {
    Ok(ValueKind::String(raw.to_string()))
}

fn parse_int(raw: &str) -> Result<ValueKind, String> {
    raw.trim()
        .parse::<i64>()
        .map(ValueKind::I64)
        .map_err(|e| format!("expected an integer, got '{}' ({})", raw, e))
}

fn parse_non_negative(raw: &str) -> Result<ValueKind, String> {
    match parse_int(raw)? {
        ValueKind::I64(v) if v < 0 => Err(format!("expected a non-negative integer, got {}", v)),
        value => Ok(value),
    }
}

fn parse_ttl_seconds(raw: &str) -> Result<ValueKind, String> {
    match parse_int(raw)? {
        ValueKind::I64(v) if v.checked_abs().is_none_or(|abs| abs > MAX_TOKEN_TTL_SECONDS) => Err(
            format!("token lifetime {} is outside ±{} seconds", v, MAX_TOKEN_TTL_SECONDS),
        ),
        value => Ok(value),
    }
}

fn parse_bool(raw: &str) -> Result<ValueKind, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(ValueKind::Boolean(true)),
        "false" | "0" | "no" | "off" => Ok(ValueKind::Boolean(false)),
        _ => Err(format!("expected a boolean, got '{}'", raw)),
    }
}

fn parse_level(raw: &str) -> Result<ValueKind, String> {
    raw.trim()
        .parse::<Level>()
        .map(|level| ValueKind::String(level.to_string().to_ascii_lowercase()))
        .map_err(|_| format!("unknown log level '{}'", raw))
}

fn parse_log_format(raw: &str) -> Result<ValueKind, String> {
    raw.parse::<LogFormat>()
        .map(|format| ValueKind::String(format.to_string()))
}

/// Application configuration, resolved once at startup
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    /// Load from the file, the process environment and `overrides`.
    ///
    /// Without an explicit file the default one is optional; an explicit file
    /// must exist.
    pub fn load(
        file: Option<&Path>,
        overrides: &[(&'static str, ValueKind)],
    ) -> Result<Self, ConfigError> {
        Self::load_from(file, overrides, |var| std::env::var(var).ok())
    }

    /// Same as [`Configuration::load`] with a custom environment lookup
    pub fn load_from<F>(
        file: Option<&Path>,
        overrides: &[(&'static str, ValueKind)],
        lookup: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Config::builder();

        builder = match file {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        for binding in ENV_BINDINGS {
            let Some(raw) = lookup(binding.var).filter(|v| !v.is_empty()) else {
                continue;
            };
            let value = (binding.parse)(&raw).map_err(|reason| ConfigError::InvalidEnv {
                var: binding.var,
                reason,
            })?;
            builder = builder.set_override(binding.key, value)?;
        }

        for (key, value) in overrides {
            builder = builder.set_override(*key, value.clone())?;
        }

        Ok(Configuration {
            config: builder.build()?,
        })
    }

    // ========================================================================
    // Redis Configuration
    // ========================================================================

    pub fn redis_config(&self) -> RedisConfig {
        RedisConfig {
            addr: self
                .config
                .get_string(REDIS_ADDR_KEY)
                .unwrap_or_else(|_| DEFAULT_REDIS_ADDR.to_string()),
            password: self
                .config
                .get_string(REDIS_PASSWORD_KEY)
                .ok()
                .filter(|p| !p.is_empty()),
            db: self.config.get_int(REDIS_DB_KEY).unwrap_or(0),
        }
    }

    // ========================================================================
    // Lock Configuration
    // ========================================================================

    fn millis(&self, key: &str, default: Duration) -> Duration {
        self.config
            .get_int(key)
            .ok()
            .and_then(|v| u64::try_from(v).ok())
            .map(Duration::from_millis)
            .unwrap_or(default)
    }

    pub fn lock_options(&self) -> LockOptions {
        LockOptions {
            ttl: self.millis(LOCK_TTL_MS_KEY, DEFAULT_LOCK_TTL),
            retry_delay: self.millis(LOCK_RETRY_DELAY_MS_KEY, DEFAULT_RETRY_DELAY),
            max_retries: self
                .config
                .get_int(LOCK_MAX_RETRIES_KEY)
                .ok()
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(DEFAULT_MAX_RETRIES),
            lock_timeout: self.millis(LOCK_TIMEOUT_MS_KEY, DEFAULT_LOCK_TIMEOUT),
        }
    }

    // ========================================================================
    // Auth Configuration
    // ========================================================================

    pub fn jwt_secret(&self) -> Option<String> {
        self.config
            .get_string(JWT_SECRET_KEY)
            .ok()
            .filter(|s| !s.is_empty())
    }

    /// Configured token lifetime; an unrepresentable value falls back to the default
    pub fn token_ttl(&self) -> chrono::Duration {
        self.config
            .get_int(JWT_TTL_SECONDS_KEY)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or_else(|| chrono::Duration::seconds(DEFAULT_TOKEN_TTL_SECONDS))
    }

    pub fn token_authority(&self) -> Result<TokenAuthority, ConfigError> {
        let secret = self.jwt_secret().ok_or(ConfigError::Missing(JWT_SECRET_KEY))?;
        Ok(TokenAuthority::new(secret, self.token_ttl()))
    }

    pub fn skip_paths(&self) -> SkipPaths {
        SkipPaths::new(
            self.config
                .get::<Vec<String>>(AUTH_SKIP_PATHS_KEY)
                .unwrap_or_default(),
        )
    }

    // ========================================================================
    // Logging Configuration
    // ========================================================================

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig {
            log_dir: self
                .config
                .get_string(LOG_DIR_KEY)
                .map(Into::into)
                .unwrap_or_else(|_| default_log_dir()),
            console_output: self.config.get_bool(LOG_CONSOLE_KEY).unwrap_or(true),
            file_logging: self.config.get_bool(LOG_FILE_KEY).unwrap_or(false),
            level: self
                .config
                .get_string(LOG_LEVEL_KEY)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(Level::INFO),
            format: self
                .config
                .get_string(LOG_FORMAT_KEY)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
            rotation: self
                .config
                .get_string(LOG_ROTATION_KEY)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(LogRotation::Daily),
        }
    }
}
