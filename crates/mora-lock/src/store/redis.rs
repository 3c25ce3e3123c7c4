//! Redis-backed lock store.
//!
//! Acquisition is a single `SET key value NX PX ttl`. Release and extension
//! run as Lua scripts so the ownership check and the mutation happen in one
//! server-side step.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{ConnectionInfo, IntoConnectionInfo, Script};
use tracing::info;

use super::{LockStore, StoreError, StoreResult};

// Redis configuration keys
pub const REDIS_ADDR_KEY: &str = "redis.addr";
pub const REDIS_PASSWORD_KEY: &str = "redis.password";
pub const REDIS_DB_KEY: &str = "redis.db";

pub const DEFAULT_REDIS_ADDR: &str = "localhost:6379";

static RELEASE_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#,
    )
});

static EXTEND_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("PEXPIRE", KEYS[1], ARGV[2])
else
    return 0
end
"#,
    )
});

/// Connection settings for [`RedisLockStore`]
#[derive(Clone, PartialEq, Eq)]
pub struct RedisConfig {
    /// `host:port`
    pub addr: String,
    pub password: Option<String>,
    pub db: i64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_REDIS_ADDR.to_string(),
            password: None,
            db: 0,
        }
    }
}

impl std::fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConfig")
            .field("addr", &self.addr)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("db", &self.db)
            .finish()
    }
}

impl RedisConfig {
    pub fn connection_info(&self) -> StoreResult<ConnectionInfo> {
        let mut info = format!("redis://{}/{}", self.addr, self.db).into_connection_info()?;
        info.redis.password = self.password.clone().filter(|p| !p.is_empty());
        Ok(info)
    }
}

/// Lock store over a multiplexed, auto-reconnecting Redis connection
#[derive(Clone)]
pub struct RedisLockStore {
    conn: ConnectionManager,
}

impl RedisLockStore {
    /// Connect using a URL such as `redis://127.0.0.1:6379/0`
    pub async fn new(url: &str) -> StoreResult<Self> {
        Self::connect(url.into_connection_info()?).await
    }

    pub async fn from_config(config: &RedisConfig) -> StoreResult<Self> {
        Self::connect(config.connection_info()?).await
    }

    async fn connect(info: ConnectionInfo) -> StoreResult<Self> {
        let client = redis::Client::open(info)?;
        let conn = ConnectionManager::new(client).await?;
        let store = Self { conn };

        store.ping().await?;
        info!("Connected to Redis lock store");

        Ok(store)
    }
}

/// Milliseconds for a PX/PEXPIRE argument; Redis rejects zero.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl LockStore for RedisLockStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = RELEASE_SCRIPT
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }

    async fn compare_and_expire(&self, key: &str, expected: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let extended: i64 = EXTEND_SCRIPT
            .key(key)
            .arg(expected)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(extended == 1)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        let mut conn = self.conn.clone();
        let millis: i64 = redis::cmd("PTTL").arg(key).query_async(&mut conn).await?;
        match millis {
            -2 => Ok(None),
            -1 => Err(StoreError::NoExpiry(key.to_string())),
            ms => Ok(Some(Duration::from_millis(ms.max(0) as u64))),
        }
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
