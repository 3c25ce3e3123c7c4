//! Startup error types.

use thiserror::Error;

/// Failures while assembling configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A bound environment variable is set but unparseable
    #[error("invalid value for {var}: {reason}")]
    InvalidEnv { var: &'static str, reason: String },

    #[error("missing required configuration '{0}'")]
    Missing(&'static str),
}
