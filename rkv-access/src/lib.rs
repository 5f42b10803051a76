//! # Replicated KV Access Layer
//!
//! Purpose: Structured keys and values over a store with one writable primary
//! and any number of read replicas.
//!
//! ## Design Principles
//! 1. **Schema First**: Keys are built from a declared `Schema`, never by hand.
//! 2. **Explicit Wiring**: A `Controller` is constructed and injected into an
//!    `AccessClient`; nothing is global.
//! 3. **Pluggable Stores**: Endpoints are reached through a `Connector`, so TCP
//!    clients and in-process stores are interchangeable.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use rkv_access::{AccessClient, Controller, Schema};
//! use rkv_common::{ControllerConfig, Expiry};
//! use serde_json::json;
//!
//! # fn main() -> rkv_common::RkvResult<()> {
//! let controller = Controller::connect(&ControllerConfig::from_env()?)?;
//! let mut client = AccessClient::new(Arc::new(controller));
//! client.set_schema(Schema::new(["users", "profile"], ["region", "id"])?);
//!
//! client.store([("region", "eu"), ("id", "42")], json!({"name": "ada"}), Some(Expiry::hours(1)))?;
//! if let Some(rows) = client.find([("id", "42")])? {
//!     for row in &rows {
//!         println!("{}", row.as_json()?);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod connector;
mod controller;
mod retry;
mod row;
mod schema;

pub use client::{AccessClient, DEFAULT_SCAN_COUNT};
pub use connector::{Connector, TcpConnector};
pub use controller::{Controller, ControllerBuilder, Node};
pub use retry::{with_backoff, Backoff};
pub use row::{Payload, Row, RowSet};
pub use schema::{KeyParts, Schema, DEFAULT_DELIMITER};
