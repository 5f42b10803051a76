//! # Synchronous Store Client
//!
//! Purpose: Expose a compact, blocking API for the commands the access layer
//! issues against one store endpoint: `PING`, `GET`, `SET`, `SETEX`, `SCAN`.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `StoreClient` hides pooling, handshake and protocol details.
//! 2. **Borrow-Friendly API**: Accept `&[u8]` to avoid unnecessary copies.
//! 3. **Fail Fast**: Protocol violations surface immediately as errors.
//! 4. **Classified Replies**: Credential rejections are told apart from other
//!    server errors so callers never retry them.

use std::time::Duration;

use thiserror::Error;

use rkv_common::{ClientTuning, EndpointConfig, KvStore, RkvError, RkvResult, ScanPage};

use crate::pool::{ConnectionPool, PoolConfig};
use crate::resp::{encode_u64, parse_scan_reply, RespValue};

/// Result type for the sync client.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the sync client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or IO failure while reading/writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// RESP2 framing or parse error.
    #[error("protocol error: {0}")]
    Protocol(&'static str),
    /// Server returned an error reply.
    #[error("server error: {message}")]
    Server { message: String },
    /// Server rejected the credentials or demanded them.
    #[error("authentication rejected: {message}")]
    Auth { message: String },
    /// Reply type did not match the command.
    #[error("unexpected response to {command}")]
    UnexpectedResponse { command: &'static str },
    /// Pool is at capacity and no idle connections are available.
    #[error("connection pool exhausted")]
    PoolExhausted,
    /// Address could not be resolved into a socket address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

impl ClientError {
    /// Classifies an error reply from the server.
    pub fn from_reply(message: Vec<u8>) -> Self {
        let message = String::from_utf8_lossy(&message).into_owned();
        let upper = message.to_ascii_uppercase();
        if upper.starts_with("WRONGPASS")
            || upper.starts_with("NOAUTH")
            || upper.contains("INVALID PASSWORD")
            || upper.contains("INVALID USERNAME-PASSWORD")
        {
            ClientError::Auth { message }
        } else {
            ClientError::Server { message }
        }
    }

    /// Converts into the workspace error, tagging it with `endpoint`.
    pub fn into_rkv(self, endpoint: &str) -> RkvError {
        match self {
            ClientError::Io(err) => RkvError::connection(endpoint, err.to_string()),
            ClientError::PoolExhausted => RkvError::connection(endpoint, "connection pool exhausted"),
            ClientError::Auth { message } => RkvError::authentication(endpoint, message),
            ClientError::Server { message } => RkvError::Server(message),
            ClientError::Protocol(reason) => RkvError::Protocol(reason.to_string()),
            ClientError::UnexpectedResponse { command } => {
                RkvError::Protocol(format!("unexpected response to {}", command))
            }
            ClientError::InvalidAddress(addr) => RkvError::Config(format!("invalid address: {}", addr)),
        }
    }
}

/// Configuration for the synchronous client and its pool.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address, e.g. "127.0.0.1:6379".
    pub addr: String,
    /// Optional ACL user sent with `AUTH`.
    pub username: Option<String>,
    /// Password sent with `AUTH`; no handshake when `None`.
    pub password: Option<String>,
    /// Database selected on every new connection.
    pub db: u32,
    /// Maximum idle connections kept in the pool.
    pub max_idle: usize,
    /// Maximum total connections (idle + in-use).
    pub max_total: usize,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            addr: "127.0.0.1:6379".to_string(),
            username: None,
            password: None,
            db: 0,
            max_idle: 8,
            max_total: 16,
            read_timeout: None,
            write_timeout: None,
            connect_timeout: None,
        }
    }
}

impl ClientConfig {
    /// Builds a client configuration for one configured endpoint.
    pub fn from_endpoint(endpoint: &EndpointConfig, tuning: &ClientTuning) -> Self {
        ClientConfig {
            addr: endpoint.addr(),
            username: endpoint.username.clone(),
            password: endpoint.password.clone().filter(|p| !p.is_empty()),
            db: endpoint.db,
            max_idle: tuning.max_idle,
            max_total: tuning.max_total,
            read_timeout: tuning.read_timeout_ms.map(Duration::from_millis),
            write_timeout: tuning.write_timeout_ms.map(Duration::from_millis),
            connect_timeout: tuning.connect_timeout_ms.map(Duration::from_millis),
        }
    }
}

/// Synchronous client with connection pooling.
///
/// Each call acquires a connection, executes one command, and returns the
/// connection to the pool.
pub struct StoreClient {
    label: String,
    pool: ConnectionPool,
}

impl StoreClient {
    /// Creates a client with default configuration.
    pub fn connect(addr: impl Into<String>) -> ClientResult<Self> {
        let config = ClientConfig {
            addr: addr.into(),
            ..ClientConfig::default()
        };
        Self::with_config(config)
    }

    /// Creates a client with a custom configuration.
    ///
    /// No connection is opened until the first command.
    pub fn with_config(config: ClientConfig) -> ClientResult<Self> {
        let label = config.addr.clone();
        let pool = ConnectionPool::new(PoolConfig {
            addr: config.addr,
            username: config.username,
            password: config.password,
            db: config.db,
            max_idle: config.max_idle,
            max_total: config.max_total,
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            connect_timeout: config.connect_timeout,
        })?;
        Ok(StoreClient { label, pool })
    }

    /// Overrides the label used when converting errors.
    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Pings the server.
    pub fn ping(&self) -> ClientResult<()> {
        let mut conn = self.pool.acquire()?;
        match conn.exec(&[b"PING"])? {
            RespValue::Simple(_) | RespValue::Bulk(Some(_)) => Ok(()),
            RespValue::Error(message) => Err(ClientError::from_reply(message)),
            _ => Err(ClientError::UnexpectedResponse { command: "PING" }),
        }
    }

    /// Fetches a value by key. Returns `Ok(None)` when the key is missing.
    pub fn get(&self, key: &[u8]) -> ClientResult<Option<Vec<u8>>> {
        let mut conn = self.pool.acquire()?;
        match conn.exec(&[b"GET", key])? {
            RespValue::Bulk(data) => Ok(data),
            RespValue::Error(message) => Err(ClientError::from_reply(message)),
            _ => Err(ClientError::UnexpectedResponse { command: "GET" }),
        }
    }

    /// Sets a value for a key without expiration.
    pub fn set(&self, key: &[u8], value: &[u8]) -> ClientResult<()> {
        let mut conn = self.pool.acquire()?;
        match conn.exec(&[b"SET", key, value])? {
            RespValue::Simple(_) => Ok(()),
            RespValue::Error(message) => Err(ClientError::from_reply(message)),
            _ => Err(ClientError::UnexpectedResponse { command: "SET" }),
        }
    }

    /// Sets a value that expires after `seconds`.
    pub fn set_ex(&self, key: &[u8], value: &[u8], seconds: u64) -> ClientResult<()> {
        let (secs, len) = encode_u64(seconds);
        let mut conn = self.pool.acquire()?;
        match conn.exec(&[b"SETEX", key, &secs[..len], value])? {
            RespValue::Simple(_) => Ok(()),
            RespValue::Error(message) => Err(ClientError::from_reply(message)),
            _ => Err(ClientError::UnexpectedResponse { command: "SETEX" }),
        }
    }

    /// Runs one `SCAN cursor MATCH pattern COUNT count` step.
    pub fn scan(&self, cursor: u64, pattern: &[u8], count: usize) -> ClientResult<(u64, Vec<Vec<u8>>)> {
        let (cur, cur_len) = encode_u64(cursor);
        let (cnt, cnt_len) = encode_u64(count as u64);
        let mut conn = self.pool.acquire()?;
        let reply = conn.exec(&[
            b"SCAN",
            &cur[..cur_len],
            b"MATCH",
            pattern,
            b"COUNT",
            &cnt[..cnt_len],
        ])?;
        parse_scan_reply(reply)
    }
}

impl KvStore for StoreClient {
    fn ping(&self) -> RkvResult<()> {
        StoreClient::ping(self).map_err(|err| err.into_rkv(&self.label))
    }

    fn get(&self, key: &[u8]) -> RkvResult<Option<Vec<u8>>> {
        StoreClient::get(self, key).map_err(|err| err.into_rkv(&self.label))
    }

    fn set(&self, key: &[u8], value: &[u8]) -> RkvResult<()> {
        StoreClient::set(self, key, value).map_err(|err| err.into_rkv(&self.label))
    }

    fn set_ex(&self, key: &[u8], value: &[u8], ttl_seconds: u64) -> RkvResult<()> {
        StoreClient::set_ex(self, key, value, ttl_seconds).map_err(|err| err.into_rkv(&self.label))
    }

    fn scan_page(&self, cursor: u64, pattern: &[u8], count: usize) -> RkvResult<ScanPage> {
        let (cursor, keys) = self
            .scan(cursor, pattern, count)
            .map_err(|err| err.into_rkv(&self.label))?;
        Ok(ScanPage { cursor, keys })
    }
}
