//! Redis-backed counter store
//!
//! One connection pool is built at startup from explicit configuration and
//! shared by every component through [`super::SharedStore`].

use async_trait::async_trait;
use fred::error::{Error as FredError, ErrorKind};
use fred::prelude::{
    Builder, ClientLike, Config, Expiration, KeysInterface, Pool, ReconnectPolicy, ServerConfig,
    SetsInterface,
};
use fred::types::config::TlsConnector;
use std::time::Duration;
use tracing::info;

use super::CounterStore;
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};

/// Pooled Redis client
pub struct RedisStore {
    pool: Pool,
}

impl RedisStore {
    /// Connect to the configured server and wait for the pool to come up
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        let tls = if config.tls {
            let connector = TlsConnector::default_rustls()
                .map_err(|e| StoreError::Connection(format!("TLS setup: {}", e)))?;
            Some(connector.into())
        } else {
            None
        };

        let redis_config = Config {
            server: ServerConfig::new_centralized(config.host.as_str(), config.port),
            password: config.password.clone(),
            database: Some(config.db),
            tls,
            ..Default::default()
        };

        let connect_timeout = config.connect_timeout();
        let command_timeout = config.command_timeout();
        let pool = Builder::from_config(redis_config)
            .with_connection_config(|c| {
                c.connection_timeout = connect_timeout;
            })
            .with_performance_config(|p| {
                p.default_command_timeout = command_timeout;
            })
            .set_policy(ReconnectPolicy::new_exponential(0, 100, 30_000, 2))
            .build_pool(config.pool_size)
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        pool.init()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        info!(
            host = %config.host,
            port = config.port,
            db = config.db,
            tls = config.tls,
            pool_size = config.pool_size,
            "Connected to Redis"
        );

        Ok(Self { pool })
    }
}

fn map_error(command: &'static str) -> impl FnOnce(FredError) -> StoreError {
    move |e| match e.kind() {
        ErrorKind::Timeout => StoreError::Timeout,
        ErrorKind::IO | ErrorKind::Canceled => StoreError::Connection(e.to_string()),
        _ if e.details().starts_with("WRONGTYPE") => StoreError::WrongType(e.to_string()),
        _ => StoreError::Command {
            command,
            message: e.to_string(),
        },
    }
}

fn ttl_secs(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX).max(1)
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<i64>> {
        self.pool
            .next()
            .get::<Option<i64>, _>(key)
            .await
            .map_err(map_error("GET"))
    }

    async fn set_with_ttl(&self, key: &str, value: i64, ttl: Duration) -> StoreResult<()> {
        self.pool
            .next()
            .set::<(), _, _>(key, value, Some(Expiration::EX(ttl_secs(ttl))), None, false)
            .await
            .map_err(map_error("SET"))
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        self.pool
            .next()
            .incr::<i64, _>(key)
            .await
            .map_err(map_error("INCR"))
    }

    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool> {
        let added = self
            .pool
            .next()
            .sadd::<i64, _, _>(key, member)
            .await
            .map_err(map_error("SADD"))?;
        Ok(added > 0)
    }

    async fn scard(&self, key: &str) -> StoreResult<u64> {
        let count = self
            .pool
            .next()
            .scard::<i64, _>(key)
            .await
            .map_err(map_error("SCARD"))?;
        Ok(count.max(0) as u64)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.pool
            .next()
            .expire::<bool, _>(key, ttl_secs(ttl), None)
            .await
            .map_err(map_error("EXPIRE"))
    }

    async fn ping(&self) -> StoreResult<()> {
        self.pool
            .next()
            .ping::<String>(None)
            .await
            .map(|_| ())
            .map_err(map_error("PING"))
    }
}
