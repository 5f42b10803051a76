//! # Access Client
//!
//! Purpose: Schema-driven `find`/`store` over a `Controller`.
//!
//! ## Design Principles
//! 1. **Fail Fast**: Schema, key and value checks all run before a handle is
//!    requested, so a rejected call never touches the store.
//! 2. **Reads on Replicas**: `find` scans one replica chosen round-robin and
//!    reads every matched key from that same replica, once per key even when
//!    the scan reports it on several pages.
//! 3. **Writes on Primary**: `store` always targets the primary.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use rkv_common::{scan, Expiry, RkvError, RkvResult};

use crate::controller::Controller;
use crate::row::{Payload, Row, RowSet};
use crate::schema::Schema;

/// Default `COUNT` hint sent with each scan page.
pub const DEFAULT_SCAN_COUNT: usize = 100;

/// Facade binding a schema to a controller.
#[derive(Debug, Clone)]
pub struct AccessClient {
    controller: Arc<Controller>,
    schema: Option<Arc<Schema>>,
    scan_count: usize,
}

impl AccessClient {
    /// Creates a client with no schema bound.
    pub fn new(controller: Arc<Controller>) -> Self {
        AccessClient {
            controller,
            schema: None,
            scan_count: DEFAULT_SCAN_COUNT,
        }
    }

    /// Sets the scan page hint; values below 1 are raised to 1.
    pub fn with_scan_count(mut self, count: usize) -> Self {
        self.scan_count = count.max(1);
        self
    }

    /// Replaces the active schema.
    pub fn set_schema(&mut self, schema: Schema) {
        self.schema = Some(Arc::new(schema));
    }

    pub fn schema(&self) -> Option<&Arc<Schema>> {
        self.schema.as_ref()
    }

    pub fn controller(&self) -> &Arc<Controller> {
        &self.controller
    }

    /// # Errors
    /// `RkvError::Schema` when no schema has been declared.
    pub fn require_schema(&self) -> RkvResult<&Arc<Schema>> {
        self.schema
            .as_ref()
            .ok_or_else(|| RkvError::Schema("declare schema first".to_string()))
    }

    /// Looks up every row whose key matches the supplied dynamic values.
    ///
    /// Segments left out match any value. Returns `Ok(None)` when nothing matches.
    ///
    /// # Errors
    /// `RkvError::Schema` without a schema, `RkvError::Key` for a value holding
    /// the delimiter, `RkvError::Connection` when no replica is available, and
    /// any store error raised while scanning or reading.
    pub fn find<I, K, V>(&self, values: I) -> RkvResult<Option<RowSet>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let schema = self.require_schema()?;
        let pattern = schema.search_pattern(values)?;
        let node = self.controller.read_handle()?;
        debug!(replica = node.label(), pattern = %pattern, "find");

        let mut rows = Vec::new();
        let mut seen = HashSet::new();
        for key in scan(&**node, &pattern, self.scan_count) {
            let key = key?;
            if !seen.insert(key.clone()) {
                continue;
            }
            let key = match String::from_utf8(key) {
                Ok(key) => key,
                Err(err) => {
                    debug!(key = ?err.as_bytes(), "skipping non UTF-8 key");
                    continue;
                }
            };
            // `*` also matches the delimiter, so keys with extra segments can match.
            if let Err(err) = schema.split_key(&key) {
                debug!(key = %key, error = %err, "skipping key outside schema");
                continue;
            }
            let raw = match node.get(key.as_bytes())? {
                Some(raw) => raw,
                None => {
                    debug!(key = %key, "key vanished between scan and get");
                    continue;
                }
            };
            rows.push(Row::from_stored(Arc::clone(schema), key, raw)?);
        }

        debug!(pattern = %pattern, matched = rows.len(), "find complete");
        if rows.is_empty() {
            Ok(None)
        } else {
            Ok(Some(RowSet::new(rows)))
        }
    }

    /// Writes `payload` under the key built from `values` and returns the row.
    ///
    /// `values` must name every dynamic segment and nothing else.
    ///
    /// # Errors
    /// `RkvError::Schema` without a schema, `RkvError::Key` for a wrong value
    /// count or a value holding the delimiter, `RkvError::Value` for an
    /// unsupported payload or zero expiry, `RkvError::Connection` when no
    /// primary is available.
    pub fn store<I, K, V>(&self, values: I, payload: impl Into<Payload>, ttl: Option<Expiry>) -> RkvResult<Row>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let schema = self.require_schema()?;
        let values: Vec<(K, V)> = values.into_iter().collect();
        if values.len() != schema.dynamics().len() {
            return Err(RkvError::Key(format!(
                "expected {} dynamic values ({}), got {}",
                schema.dynamics().len(),
                schema.dynamics().join("|"),
                values.len()
            )));
        }

        let mut row = Row::new(Arc::clone(schema));
        row.set_key(values)?;
        row.feed(payload)?;
        if let Some(expiry) = ttl {
            row.set_expiry(expiry)?;
        }
        let (key, value) = match (row.key(), row.value()) {
            (Some(key), Some(value)) => (key, value),
            _ => return Err(RkvError::Key("row is incomplete".to_string())),
        };

        let node = self.controller.write_handle()?;
        match row.ttl() {
            Some(seconds) => node.set_ex(key.as_bytes(), value.as_bytes(), seconds)?,
            None => node.set(key.as_bytes(), value.as_bytes())?,
        }
        debug!(primary = node.label(), key = %key, ttl = ?row.ttl(), "stored");
        Ok(row)
    }
}
