//! # Endpoint and Controller Configuration
//!
//! Plain records describing the primary and replica endpoints, plus the retry
//! and pool tuning applied when connecting to them.
//!
//! ## Usage
//!
//! - `ControllerConfig::from_json_str` parses a JSON document.
//! - `ControllerConfig::from_env` reads `REDIS_*` variables: `REDIS_HOST`,
//!   `REDIS_PORT`, `REDIS_PASSWORD`, `REDIS_DB`, `REDIS_USER` for the primary
//!   and `REDIS_REP_{n}_*` for replicas `n = 1, 2, ...` until a host is missing.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RkvError, RkvResult};

/// Environment variable prefix shared by all keys.
pub const ENV_PREFIX: &str = "REDIS_";

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 6379;
const DEFAULT_USER: &str = "default";

/// Connection parameters for a single store endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Human-readable label used in logs; defaults to `host:port`.
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Logical database index selected after connecting.
    #[serde(default)]
    pub db: u32,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for EndpointConfig {
    fn default() -> Self {
        EndpointConfig {
            name: String::new(),
            host: default_host(),
            port: DEFAULT_PORT,
            username: None,
            password: None,
            db: 0,
        }
    }
}

impl EndpointConfig {
    /// Creates an endpoint without credentials on database 0.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        EndpointConfig {
            host: host.into(),
            port,
            ..EndpointConfig::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_credentials(mut self, username: Option<String>, password: impl Into<String>) -> Self {
        self.username = username;
        self.password = Some(password.into());
        self
    }

    pub fn with_db(mut self, db: u32) -> Self {
        self.db = db;
        self
    }

    /// Socket address string, e.g. "127.0.0.1:6379".
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Label used in logs and errors.
    pub fn label(&self) -> String {
        if self.name.is_empty() {
            self.addr()
        } else {
            self.name.clone()
        }
    }
}

/// Bounded exponential backoff applied while establishing connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total connection attempts per endpoint (at least one is always made).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles afterwards.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound for any single delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    5_120
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no sleeping. Handy for tests and fail-fast callers.
    pub fn no_retry() -> Self {
        RetryPolicy {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Pool sizing and socket timeouts for each endpoint client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientTuning {
    #[serde(default = "default_max_idle")]
    pub max_idle: usize,
    #[serde(default = "default_max_total")]
    pub max_total: usize,
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,
    #[serde(default)]
    pub read_timeout_ms: Option<u64>,
    #[serde(default)]
    pub write_timeout_ms: Option<u64>,
}

fn default_max_idle() -> usize {
    8
}

fn default_max_total() -> usize {
    16
}

impl Default for ClientTuning {
    fn default() -> Self {
        ClientTuning {
            max_idle: default_max_idle(),
            max_total: default_max_total(),
            connect_timeout_ms: Some(1_000),
            read_timeout_ms: Some(5_000),
            write_timeout_ms: Some(5_000),
        }
    }
}

/// Full topology: one primary and zero or more replicas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub primary: EndpointConfig,
    #[serde(default)]
    pub replicas: Vec<EndpointConfig>,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub tuning: ClientTuning,
}

impl ControllerConfig {
    pub fn new(primary: EndpointConfig, replicas: Vec<EndpointConfig>) -> Self {
        ControllerConfig {
            primary,
            replicas,
            retry: RetryPolicy::default(),
            tuning: ClientTuning::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Parses a JSON configuration document.
    pub fn from_json_str(raw: &str) -> RkvResult<Self> {
        serde_json::from_str(raw).map_err(|err| RkvError::Config(err.to_string()))
    }

    /// Reads the topology from process environment variables.
    pub fn from_env() -> RkvResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads the topology through an arbitrary key lookup.
    ///
    /// `lookup` receives full variable names such as `REDIS_REP_1_HOST`.
    pub fn from_lookup<F>(lookup: F) -> RkvResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let primary = endpoint_from_lookup(&lookup, ENV_PREFIX, DEFAULT_PORT)?.with_name("primary");

        let mut replicas = Vec::new();
        for idx in 1u16.. {
            let prefix = format!("{}REP_{}_", ENV_PREFIX, idx);
            if lookup(&format!("{}HOST", prefix)).is_none() {
                break;
            }
            let endpoint = endpoint_from_lookup(&lookup, &prefix, DEFAULT_PORT.saturating_add(idx))?;
            replicas.push(endpoint.with_name(format!("replica-{}", idx)));
        }

        Ok(ControllerConfig::new(primary, replicas))
    }
}

fn endpoint_from_lookup<F>(lookup: &F, prefix: &str, default_port: u16) -> RkvResult<EndpointConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |suffix: &str| lookup(&format!("{}{}", prefix, suffix)).filter(|v| !v.is_empty());

    let host = var("HOST").unwrap_or_else(default_host);
    let port: u16 = match var("PORT") {
        Some(raw) => raw
            .parse()
            .map_err(|_| RkvError::Config(format!("{}PORT is not a port number: {}", prefix, raw)))?,
        None => default_port,
    };
    let db: u32 = match var("DB") {
        Some(raw) => raw
            .parse()
            .map_err(|_| RkvError::Config(format!("{}DB is not a database index: {}", prefix, raw)))?,
        None => 0,
    };
    let username = Some(var("USER").unwrap_or_else(|| DEFAULT_USER.to_string()));

    Ok(EndpointConfig {
        name: String::new(),
        host,
        port,
        username,
        password: var("PASSWORD"),
        db,
    })
}
