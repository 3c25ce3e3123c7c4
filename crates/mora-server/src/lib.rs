//! Mora starter layer
//!
//! Resolves configuration once at startup and hands it to the token authority
//! and lock manager explicitly. There is no process-wide configuration or
//! logger object beyond the installed `tracing` subscriber.

pub mod config; // Configuration loading
pub mod error; // Startup errors
pub mod startup; // Logging initialisation

pub use config::Configuration;
pub use error::ConfigError;
