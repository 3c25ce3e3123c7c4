//! Application startup utilities.

mod logging;

pub use logging::{
    LogFormat, LogRotation, LoggingConfig, LoggingGuard, default_log_dir, init_logging,
};
