//! # Connection Pool
//!
//! Purpose: Reuse authenticated TCP connections to one endpoint so each
//! command skips the connect/AUTH/SELECT round trips.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Keep a bounded set of reusable connections.
//! 2. **Minimal Locking**: Hold the mutex only while moving idle connections.
//! 3. **Fail Fast**: Exceeding the pool limit returns an error immediately.
//! 4. **Handshake Once**: A connection enters the pool only after AUTH/SELECT succeed.

use std::collections::VecDeque;
use std::io::{BufReader, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::debug;

use crate::client::{ClientError, ClientResult};
use crate::resp::{encode_command, encode_u64, read_response, RespValue};

/// Pool configuration for the sync client.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Server address, e.g. "127.0.0.1:6379" or "replica-1:6380".
    pub addr: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub db: u32,
    /// Maximum number of idle connections to keep.
    pub max_idle: usize,
    /// Maximum total connections (idle + in-use).
    pub max_total: usize,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
}

struct PoolState {
    idle: VecDeque<Connection>,
    total: usize,
}

struct PoolInner {
    config: PoolConfig,
    state: Mutex<PoolState>,
}

impl PoolInner {
    // A poisoned lock only means another thread panicked mid-update of two
    // counters; the state is still usable.
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn release_slot(&self) {
        let mut state = self.lock();
        state.total = state.total.saturating_sub(1);
    }

    fn return_connection(&self, conn: Connection) {
        let mut state = self.lock();
        if state.idle.len() < self.config.max_idle {
            state.idle.push_back(conn);
        } else {
            state.total = state.total.saturating_sub(1);
        }
    }
}

/// Connection pool handle.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Creates a new connection pool with the provided configuration.
    pub fn new(config: PoolConfig) -> ClientResult<Self> {
        if config.max_total == 0 {
            return Err(ClientError::PoolExhausted);
        }
        let state = PoolState {
            idle: VecDeque::with_capacity(config.max_idle),
            total: 0,
        };
        Ok(ConnectionPool {
            inner: Arc::new(PoolInner {
                config,
                state: Mutex::new(state),
            }),
        })
    }

    /// Acquires a connection from the pool, dialing a new one when none is idle.
    pub fn acquire(&self) -> ClientResult<PooledConnection> {
        if let Some(conn) = self.inner.lock().idle.pop_front() {
            return Ok(PooledConnection::new(Arc::clone(&self.inner), conn));
        }

        if !self.try_reserve() {
            return Err(ClientError::PoolExhausted);
        }

        match Connection::open(&self.inner.config) {
            Ok(conn) => Ok(PooledConnection::new(Arc::clone(&self.inner), conn)),
            Err(err) => {
                self.inner.release_slot();
                Err(err)
            }
        }
    }

    fn try_reserve(&self) -> bool {
        let mut state = self.inner.lock();
        if state.total >= self.inner.config.max_total {
            return false;
        }
        state.total += 1;
        true
    }
}

/// RAII wrapper returning a connection to the pool on drop.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    conn: Option<Connection>,
    valid: bool,
}

impl PooledConnection {
    fn new(pool: Arc<PoolInner>, conn: Connection) -> Self {
        PooledConnection {
            pool,
            conn: Some(conn),
            valid: true,
        }
    }

    /// Executes a RESP command and returns the parsed reply.
    pub fn exec(&mut self, args: &[&[u8]]) -> ClientResult<RespValue> {
        let conn = match self.conn.as_mut() {
            Some(conn) => conn,
            None => return Err(ClientError::Protocol("connection already released")),
        };
        let response = conn.exec(args);
        if response.is_err() {
            // IO/protocol failures leave the stream in an unknown state.
            self.valid = false;
        }
        response
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => return,
        };

        if self.valid {
            self.pool.return_connection(conn);
        } else {
            self.pool.release_slot();
        }
    }
}

/// Single TCP connection with reusable buffers.
pub struct Connection {
    reader: BufReader<TcpStream>,
    line_buf: Vec<u8>,
    write_buf: Vec<u8>,
}

impl Connection {
    /// Dials, configures the socket, then authenticates and selects the database.
    fn open(config: &PoolConfig) -> ClientResult<Self> {
        let stream = connect_stream(config)?;
        if let Some(timeout) = config.read_timeout {
            stream.set_read_timeout(Some(timeout))?;
        }
        if let Some(timeout) = config.write_timeout {
            stream.set_write_timeout(Some(timeout))?;
        }
        // Disable Nagle to keep request latency low for small payloads.
        stream.set_nodelay(true)?;

        let mut conn = Connection {
            reader: BufReader::new(stream),
            line_buf: Vec::with_capacity(128),
            write_buf: Vec::with_capacity(256),
        };
        conn.handshake(config)?;
        debug!(addr = %config.addr, db = config.db, "opened store connection");
        Ok(conn)
    }

    fn handshake(&mut self, config: &PoolConfig) -> ClientResult<()> {
        if let Some(password) = config.password.as_deref() {
            let reply = match config.username.as_deref() {
                Some(user) => self.exec(&[b"AUTH", user.as_bytes(), password.as_bytes()])?,
                None => self.exec(&[b"AUTH", password.as_bytes()])?,
            };
            expect_ok(reply, "AUTH")?;
        }

        if config.db != 0 {
            let (db, len) = encode_u64(config.db as u64);
            let reply = self.exec(&[b"SELECT", &db[..len]])?;
            expect_ok(reply, "SELECT")?;
        }
        Ok(())
    }

    fn exec(&mut self, args: &[&[u8]]) -> ClientResult<RespValue> {
        self.write_buf.clear();
        encode_command(args, &mut self.write_buf);

        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buf)?;
        stream.flush()?;

        read_response(&mut self.reader, &mut self.line_buf)
    }
}

fn expect_ok(reply: RespValue, command: &'static str) -> ClientResult<()> {
    match reply {
        RespValue::Simple(_) => Ok(()),
        RespValue::Error(message) => Err(ClientError::from_reply(message)),
        _ => Err(ClientError::UnexpectedResponse { command }),
    }
}

fn connect_stream(config: &PoolConfig) -> ClientResult<TcpStream> {
    let addr: SocketAddr = config
        .addr
        .to_socket_addrs()
        .map_err(|err| match err.kind() {
            std::io::ErrorKind::InvalidInput => ClientError::InvalidAddress(config.addr.clone()),
            // Resolver failures are usually transient (node not yet registered).
            _ => ClientError::Io(err),
        })?
        .next()
        .ok_or_else(|| ClientError::InvalidAddress(config.addr.clone()))?;
    let stream = match config.connect_timeout {
        Some(timeout) => TcpStream::connect_timeout(&addr, timeout)?,
        None => TcpStream::connect(addr)?,
    };
    Ok(stream)
}
