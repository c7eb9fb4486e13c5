//! Redis-backed key-value engine.
//!
//! Wire commands used: `MULTI/EXEC/DISCARD`, `HSETNX/HGET/HGETALL/DEL`,
//! `ZADD/ZREM/ZRANGE`, `KEYS`, `EXISTS`, `PING` (`AUTH` is handled at
//! connection setup). Multi-key mutations queue inside `MULTI` and apply
//! atomically on `EXEC`; any queue-time error leads the caller to an
//! explicit `DISCARD`.
//!
//! Connections come from a small internal pool: bounded idle list, idle
//! timeout, lazy dial on first use. A connection is checked out per
//! operation and either returned on success or dropped on error (a dropped
//! connection also discards any open transaction server-side, which covers
//! cancellation mid-transaction).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::MultiplexedConnection;
use redis::{Client, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};

use crate::errors::EngineError;
use crate::traits::{KvEngine, KvTransaction};

/// Connection settings for [`RedisEngine`].
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    /// Idle connections kept for reuse.
    pub max_idle: usize,
    /// Idle connections older than this are dropped instead of reused.
    pub idle_timeout: Duration,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: None,
            max_idle: 3,
            idle_timeout: Duration::from_secs(240),
        }
    }
}

// ---------------------------------------------------------------------------
// Connection pool
// ---------------------------------------------------------------------------

struct IdleConnection {
    conn: MultiplexedConnection,
    parked_at: Instant,
}

struct ConnectionPool {
    client: Client,
    idle: Mutex<Vec<IdleConnection>>,
    max_idle: usize,
    idle_timeout: Duration,
}

impl ConnectionPool {
    fn new(config: &RedisConfig) -> Result<Self, EngineError> {
        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(config.host.clone(), config.port),
            redis: RedisConnectionInfo {
                password: config.password.clone(),
                ..Default::default()
            },
        };
        let client = Client::open(info).map_err(|e| EngineError::Pool {
            message: format!("invalid connection settings: {e}"),
        })?;
        Ok(Self {
            client,
            idle: Mutex::new(Vec::new()),
            max_idle: config.max_idle,
            idle_timeout: config.idle_timeout,
        })
    }

    /// Check out a connection: freshest non-expired idle one, or a new dial.
    async fn checkout(&self) -> Result<MultiplexedConnection, EngineError> {
        loop {
            let candidate = self.idle.lock().pop();
            match candidate {
                Some(parked) if parked.parked_at.elapsed() < self.idle_timeout => {
                    return Ok(parked.conn);
                }
                Some(_) => continue, // expired, drop and keep looking
                None => break,
            }
        }
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| EngineError::Connection {
                message: format!("failed to connect to key-value engine: {e}"),
            })
    }

    /// Return a healthy connection to the idle list (dropped when full).
    fn put_back(&self, conn: MultiplexedConnection) {
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(IdleConnection {
                conn,
                parked_at: Instant::now(),
            });
        }
    }
}

// ---------------------------------------------------------------------------
// RedisEngine
// ---------------------------------------------------------------------------

/// [`KvEngine`] backed by a Redis server.
pub struct RedisEngine {
    pool: Arc<ConnectionPool>,
}

impl RedisEngine {
    /// Create an engine for the given settings. Dialing is lazy: the first
    /// operation opens the first connection.
    pub fn new(config: RedisConfig) -> Result<Self, EngineError> {
        Ok(Self {
            pool: Arc::new(ConnectionPool::new(&config)?),
        })
    }

    /// Run one command on a pooled connection. The connection is returned
    /// to the pool on success and dropped on error.
    async fn run<T: redis::FromRedisValue>(&self, cmd: redis::Cmd) -> Result<T, EngineError> {
        let mut conn = self.pool.checkout().await?;
        match cmd.query_async::<_, T>(&mut conn).await {
            Ok(value) => {
                self.pool.put_back(conn);
                Ok(value)
            }
            Err(e) => Err(EngineError::Command {
                message: e.to_string(),
            }),
        }
    }
}

#[async_trait]
impl KvEngine for RedisEngine {
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, EngineError> {
        let mut cmd = redis::cmd("HGET");
        cmd.arg(key).arg(field);
        self.run(cmd).await
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, EngineError> {
        let mut cmd = redis::cmd("HGETALL");
        cmd.arg(key);
        self.run(cmd).await
    }

    async fn zrange(&self, key: &str) -> Result<Vec<String>, EngineError> {
        let mut cmd = redis::cmd("ZRANGE");
        cmd.arg(key).arg(0).arg(-1);
        self.run(cmd).await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, EngineError> {
        let mut cmd = redis::cmd("KEYS");
        cmd.arg(pattern);
        self.run(cmd).await
    }

    async fn exists(&self, key: &str) -> Result<bool, EngineError> {
        let mut cmd = redis::cmd("EXISTS");
        cmd.arg(key);
        self.run(cmd).await
    }

    async fn ping(&self) -> Result<String, EngineError> {
        self.run(redis::cmd("PING")).await
    }

    async fn begin(&self) -> Result<Box<dyn KvTransaction>, EngineError> {
        let mut conn = self.pool.checkout().await?;
        if let Err(e) = redis::cmd("MULTI").query_async::<_, ()>(&mut conn).await {
            return Err(EngineError::Command {
                message: format!("failed to begin transaction: {e}"),
            });
        }
        Ok(Box::new(RedisTransaction {
            conn: Some(conn),
            pool: Arc::clone(&self.pool),
        }))
    }
}

// ---------------------------------------------------------------------------
// RedisTransaction
// ---------------------------------------------------------------------------

/// An open `MULTI` block on a dedicated pooled connection.
///
/// The connection is held exclusively until `commit` or `discard`; if the
/// transaction is dropped instead (cancellation), the connection is closed
/// and the server discards the block.
struct RedisTransaction {
    conn: Option<MultiplexedConnection>,
    pool: Arc<ConnectionPool>,
}

impl RedisTransaction {
    async fn queue(&mut self, cmd: redis::Cmd) -> Result<(), EngineError> {
        let conn = self.conn.as_mut().ok_or_else(|| EngineError::Command {
            message: "transaction already finished".to_string(),
        })?;
        cmd.query_async::<_, ()>(conn)
            .await
            .map_err(|e| EngineError::Command {
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl KvTransaction for RedisTransaction {
    async fn hsetnx(&mut self, key: &str, field: &str, value: &str) -> Result<(), EngineError> {
        let mut cmd = redis::cmd("HSETNX");
        cmd.arg(key).arg(field).arg(value);
        self.queue(cmd).await
    }

    async fn zadd(&mut self, key: &str, members: &[String]) -> Result<(), EngineError> {
        let mut cmd = redis::cmd("ZADD");
        cmd.arg(key);
        for member in members {
            cmd.arg(0).arg(member);
        }
        self.queue(cmd).await
    }

    async fn zrem(&mut self, key: &str, members: &[String]) -> Result<(), EngineError> {
        let mut cmd = redis::cmd("ZREM");
        cmd.arg(key).arg(members);
        self.queue(cmd).await
    }

    async fn del(&mut self, key: &str) -> Result<(), EngineError> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key);
        self.queue(cmd).await
    }

    async fn commit(mut self: Box<Self>) -> Result<(), EngineError> {
        let mut conn = self.conn.take().ok_or_else(|| EngineError::Command {
            message: "transaction already finished".to_string(),
        })?;
        match redis::cmd("EXEC")
            .query_async::<_, redis::Value>(&mut conn)
            .await
        {
            Ok(_) => {
                self.pool.put_back(conn);
                Ok(())
            }
            Err(e) => Err(EngineError::Command {
                message: format!("failed to execute transaction: {e}"),
            }),
        }
    }

    async fn discard(mut self: Box<Self>) -> Result<(), EngineError> {
        let mut conn = self.conn.take().ok_or_else(|| EngineError::Command {
            message: "transaction already finished".to_string(),
        })?;
        match redis::cmd("DISCARD").query_async::<_, ()>(&mut conn).await {
            Ok(()) => {
                self.pool.put_back(conn);
                Ok(())
            }
            Err(e) => Err(EngineError::Command {
                message: format!("failed to discard transaction: {e}"),
            }),
        }
    }
}
