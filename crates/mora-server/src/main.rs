//! Command line entry point for Mora.
//!
//! Issues and verifies tokens with the configured secret, and takes a
//! distributed lock against the configured Redis.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use config::ValueKind;
use mora_auth::{MAX_TOKEN_TTL_SECONDS, unauthorized_message};
use mora_lock::store::redis::REDIS_ADDR_KEY;
use mora_lock::{LockManager, RedisLockStore};
use mora_server::config::{LOG_FORMAT_KEY, LOG_LEVEL_KEY};
use mora_server::startup::{LogFormat, init_logging};
use mora_server::Configuration;
use tracing::{info, warn};

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "mora", version, about = "Distributed locks and signed tokens")]
struct Cli {
    /// Configuration file (default: conf/application.yml)
    #[arg(short = 'c', long = "config", env = "MORA_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long = "redis-addr")]
    redis_addr: Option<String>,
    #[arg(long = "log-level")]
    log_level: Option<tracing::Level>,
    #[arg(long = "log-format")]
    log_format: Option<LogFormat>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Issue a signed token for a subject
    Issue {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        name: Option<String>,
        /// Lifetime in seconds, overriding auth.jwt.ttl_seconds
        #[arg(
            long,
            value_name = "SECONDS",
            allow_negative_numbers = true,
            value_parser = clap::value_parser!(i64).range(-MAX_TOKEN_TTL_SECONDS..=MAX_TOKEN_TTL_SECONDS)
        )]
        ttl: Option<i64>,
    },
    /// Verify a token and print its claims
    Verify { token: String },
    /// Acquire a lock, hold it, then release it
    Lock {
        #[arg(long)]
        key: String,
        #[arg(long, default_value_t = 1000)]
        hold_ms: u64,
    },
}

impl Cli {
    fn overrides(&self) -> Vec<(&'static str, ValueKind)> {
        let mut overrides = Vec::new();
        if let Some(addr) = &self.redis_addr {
            overrides.push((REDIS_ADDR_KEY, ValueKind::String(addr.clone())));
        }
        if let Some(level) = self.log_level {
            overrides.push((
                LOG_LEVEL_KEY,
                ValueKind::String(level.to_string().to_ascii_lowercase()),
            ));
        }
        if let Some(format) = self.log_format {
            overrides.push((LOG_FORMAT_KEY, ValueKind::String(format.to_string())));
        }
        overrides
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let configuration = Configuration::load(cli.config.as_deref(), &cli.overrides())?;
    let _logging_guard = init_logging(&configuration.logging_config())
        .map_err(|e| anyhow::anyhow!("failed to initialise logging: {}", e))?;

    match cli.command {
        Command::Issue { subject, name, ttl } => {
            let authority = configuration.token_authority()?;
            let token = match ttl {
                Some(seconds) => {
                    let ttl = chrono::Duration::try_seconds(seconds)
                        .with_context(|| format!("token lifetime {} seconds is out of range", seconds))?;
                    authority.issue_with_ttl(&subject, name.as_deref(), ttl)?
                }
                None => authority.issue(&subject, name.as_deref())?,
            };
            println!("{}", token);
        }
        Command::Verify { token } => {
            let authority = configuration.token_authority()?;
            match authority.verify(&token) {
                Ok(claims) => println!("{}", serde_json::to_string_pretty(&claims)?),
                Err(e) => bail!("{}", unauthorized_message(&e)),
            }
        }
        Command::Lock { key, hold_ms } => {
            let redis_config = configuration.redis_config();
            let store = RedisLockStore::from_config(&redis_config)
                .await
                .with_context(|| format!("failed to connect to Redis at {}", redis_config.addr))?;
            let manager = LockManager::with_defaults(Arc::new(store), configuration.lock_options());
            let options = *manager.defaults();

            manager
                .with_lock(&key, &options, || async {
                    info!(key = %key, hold_ms, "Holding lock");
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(hold_ms)) => {}
                        _ = tokio::signal::ctrl_c() => warn!(key = %key, "Interrupted, releasing lock early"),
                    }
                    Ok::<_, anyhow::Error>(())
                })
                .await?;
            println!("released {}", key);
        }
    }

    Ok(())
}
