//! # Rows
//!
//! A `Row` binds one resolved key to its canonical stored value and optional
//! expiration, under a shared `Schema`.
//!
//! ## Value Encoding
//!
//! | Input                         | Stored form                         |
//! |-------------------------------|-------------------------------------|
//! | JSON object / array           | compact JSON text                   |
//! | bytes                         | parsed as JSON, re-encoded compactly |
//! | string                        | verbatim                            |
//! | JSON scalar (number, bool...) | rejected with `RkvError::Value`     |

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use rkv_common::{Expiry, RkvError, RkvResult};

use crate::schema::Schema;

/// Input accepted by `Row::feed`.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Mapping or sequence; other JSON shapes are rejected.
    Structured(Value),
    /// Raw JSON bytes, validated and re-encoded.
    Bytes(Vec<u8>),
    /// Stored as-is.
    Text(String),
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Structured(value)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Payload::Bytes(bytes.to_vec())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

/// One key/value unit bound to a schema.
#[derive(Debug, Clone)]
pub struct Row {
    schema: Arc<Schema>,
    key: Option<String>,
    value: Option<String>,
    ttl: Option<u64>,
}

impl Row {
    /// Creates an empty row; bind a key and feed a value before storing it.
    pub fn new(schema: Arc<Schema>) -> Self {
        Row {
            schema,
            key: None,
            value: None,
            ttl: None,
        }
    }

    /// Rebuilds a row from a key found by a scan and the bytes stored under it.
    ///
    /// The value is kept verbatim, so text payloads survive the round trip.
    pub(crate) fn from_stored(schema: Arc<Schema>, key: String, raw: Vec<u8>) -> RkvResult<Self> {
        schema.split_key(&key)?;
        let value = String::from_utf8(raw)
            .map_err(|_| RkvError::Value(format!("stored value for '{}' is not UTF-8", key)))?;
        Ok(Row {
            schema,
            key: Some(key),
            value: Some(value),
            ttl: None,
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// The resolved key, once `set_key` (or a lookup) has bound one.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    fn require_key(&self) -> RkvResult<&str> {
        self.key.as_deref().ok_or_else(|| {
            RkvError::Key(format!(
                "dynamic keys must be set first: {}",
                self.schema.dynamics().join("|")
            ))
        })
    }

    /// Dynamic values of the bound key, in schema order.
    pub fn dynamic_values(&self) -> RkvResult<Vec<&str>> {
        self.schema.split_key(self.require_key()?)
    }

    /// Binds the key from a value for every dynamic segment.
    ///
    /// # Errors
    /// `RkvError::Key` naming the missing segments, or when a value contains
    /// the delimiter. The previous key is kept on error.
    pub fn set_key<I, K, V>(&mut self, values: I) -> RkvResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let parts = self.schema.clean_key_dict(values)?;
        self.key = Some(self.schema.build_key(&parts)?);
        Ok(())
    }

    /// Replaces only the supplied segments of an already bound key.
    ///
    /// # Errors
    /// `RkvError::Key` when no complete key is bound yet or a value contains
    /// the delimiter.
    pub fn update_key<I, K, V>(&mut self, values: I) -> RkvResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let parts = self.schema.clean_key_dict(values)?;
        let current = self.dynamic_values()?;
        let merged = parts.overlay_onto(&current);
        let key = self.schema.build_key(&merged)?;
        self.key = Some(key);
        Ok(())
    }

    /// Encodes `value` into the canonical stored form.
    pub fn feed(&mut self, value: impl Into<Payload>) -> RkvResult<()> {
        let encoded = match value.into() {
            Payload::Structured(value) => encode_structured(&value)?,
            Payload::Bytes(bytes) => {
                let parsed: Value = serde_json::from_slice(&bytes)
                    .map_err(|err| RkvError::Value(format!("invalid JSON payload: {}", err)))?;
                serde_json::to_string(&parsed)?
            }
            Payload::Text(text) => text,
        };
        self.value = Some(encoded);
        Ok(())
    }

    /// Serializes any `Serialize` type that maps to a JSON object or array.
    pub fn feed_serialize<T: Serialize + ?Sized>(&mut self, value: &T) -> RkvResult<()> {
        let value = serde_json::to_value(value)?;
        self.feed(Payload::Structured(value))
    }

    /// Canonical stored string, once fed.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Parses the stored value back into JSON.
    ///
    /// # Errors
    /// `RkvError::Value` when nothing was fed or the content is not JSON.
    pub fn data(&self) -> RkvResult<Value> {
        self.data_as()
    }

    /// Parses the stored value into `T`.
    pub fn data_as<T: DeserializeOwned>(&self) -> RkvResult<T> {
        let raw = self
            .value
            .as_deref()
            .ok_or_else(|| RkvError::Value("row has no value".to_string()))?;
        serde_json::from_str(raw)
            .map_err(|err| RkvError::Value(format!("invalid JSON format in stored value: {}", err)))
    }

    /// Sets the expiration; returns the resulting second count.
    ///
    /// # Errors
    /// `RkvError::Value` for a zero duration, which the store would reject, or
    /// one whose second count overflows.
    pub fn set_expiry(&mut self, expiry: Expiry) -> RkvResult<u64> {
        let seconds = expiry
            .checked_total_seconds()
            .ok_or_else(|| RkvError::Value(format!("expiry {} is too large", expiry)))?;
        if seconds == 0 {
            return Err(RkvError::Value("expiry must be at least one second".to_string()));
        }
        self.ttl = Some(seconds);
        Ok(seconds)
    }

    pub fn clear_expiry(&mut self) {
        self.ttl = None;
    }

    /// Expiration in seconds, if any.
    pub fn ttl(&self) -> Option<u64> {
        self.ttl
    }

    /// Expiration broken into units, if any.
    pub fn expiry(&self) -> Option<Expiry> {
        self.ttl.map(Self::decompose_ttl)
    }

    /// `days*86400 + hours*3600 + minutes*60 + seconds`.
    pub fn compute_ttl_seconds(expiry: &Expiry) -> u64 {
        expiry.total_seconds()
    }

    /// Inverse of `compute_ttl_seconds`: largest unit first, zero units omitted.
    pub fn decompose_ttl(seconds: u64) -> Expiry {
        Expiry::from_seconds(seconds)
    }

    /// `{"keys": <key>, "value": <decoded data>}`.
    pub fn as_json(&self) -> RkvResult<Value> {
        Ok(json!({
            "keys": self.require_key()?,
            "value": self.data()?,
        }))
    }
}

fn encode_structured(value: &Value) -> RkvResult<String> {
    match value {
        Value::Object(_) | Value::Array(_) => Ok(serde_json::to_string(value)?),
        other => Err(RkvError::Value(format!(
            "unsupported value type: {}",
            json_kind(other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Ordered rows returned by a lookup.
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    rows: Vec<Row>,
}

impl RowSet {
    pub fn new(rows: Vec<Row>) -> Self {
        RowSet { rows }
    }

    pub fn all(&self) -> &[Row] {
        &self.rows
    }

    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

impl IntoIterator for RowSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a RowSet {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::new(["users", "profile"], ["region", "id"]).unwrap())
    }

    #[test]
    fn set_key_requires_every_segment() {
        let mut row = Row::new(schema());
        let err = row.set_key([("region", "eu")]).unwrap_err();
        match err {
            RkvError::Key(message) => assert!(message.contains("id")),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(row.key(), None);

        row.set_key([("ID", "42"), ("Region", "eu")]).unwrap();
        assert_eq!(row.key(), Some("users:profile:eu:42"));
        assert_eq!(row.dynamic_values().unwrap(), vec!["eu", "42"]);
    }

    #[test]
    fn set_key_rejects_delimiter() {
        let mut row = Row::new(schema());
        let err = row.set_key([("region", "eu:west"), ("id", "1")]).unwrap_err();
        assert!(matches!(err, RkvError::Key(_)));
    }

    #[test]
    fn update_key_overlays_supplied_segments() {
        let mut row = Row::new(schema());
        assert!(matches!(row.update_key([("id", "7")]), Err(RkvError::Key(_))));

        row.set_key([("region", "eu"), ("id", "42")]).unwrap();
        row.update_key([("id", "7")]).unwrap();
        assert_eq!(row.key(), Some("users:profile:eu:7"));
        row.update_key([("REGION", "us"), ("unknown", "x")]).unwrap();
        assert_eq!(row.key(), Some("users:profile:us:7"));
    }

    #[test]
    fn feed_structured_values() {
        let mut row = Row::new(schema());
        row.feed(json!({"name": "John", "age": 30})).unwrap();
        assert_eq!(row.data().unwrap(), json!({"name": "John", "age": 30}));

        row.feed(json!(["value1", "value2"])).unwrap();
        assert_eq!(row.value(), Some(r#"["value1","value2"]"#));
    }

    #[test]
    fn feed_bytes_reencodes_json() {
        let mut row = Row::new(schema());
        row.feed(&b"{ \"a\" :  [1, 2] }"[..]).unwrap();
        assert_eq!(row.value(), Some(r#"{"a":[1,2]}"#));

        let err = row.feed(b"Some Value to Store".to_vec()).unwrap_err();
        assert!(matches!(err, RkvError::Value(_)));
    }

    #[test]
    fn feed_text_is_verbatim() {
        let mut row = Row::new(schema());
        row.feed("not json").unwrap();
        assert_eq!(row.value(), Some("not json"));
        assert!(matches!(row.data(), Err(RkvError::Value(_))));
    }

    #[test]
    fn feed_rejects_scalars() {
        let mut row = Row::new(schema());
        for scalar in [json!(1), json!(true), json!(null), json!("text")] {
            assert!(matches!(row.feed(scalar), Err(RkvError::Value(_))));
        }
    }

    #[test]
    fn feed_serialize_and_data_as() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Profile {
            name: String,
            tags: Vec<String>,
        }

        let profile = Profile {
            name: "ada".into(),
            tags: vec!["admin".into()],
        };
        let mut row = Row::new(schema());
        row.feed_serialize(&profile).unwrap();
        assert_eq!(row.data_as::<Profile>().unwrap(), profile);
        assert!(matches!(row.feed_serialize(&5u32), Err(RkvError::Value(_))));
    }

    #[test]
    fn data_without_value_fails() {
        let row = Row::new(schema());
        assert!(matches!(row.data(), Err(RkvError::Value(_))));
    }

    #[test]
    fn ttl_compute_and_decompose() {
        assert_eq!(Row::compute_ttl_seconds(&Expiry::minutes(10)), 600);
        assert_eq!(Row::decompose_ttl(600), Expiry::minutes(10));

        let mut row = Row::new(schema());
        assert_eq!(row.set_expiry(Expiry { hours: 1, seconds: 5, ..Expiry::default() }).unwrap(), 3_605);
        assert_eq!(row.expiry(), Some(Expiry { hours: 1, seconds: 5, ..Expiry::default() }));
        assert!(matches!(row.set_expiry(Expiry::default()), Err(RkvError::Value(_))));
        assert!(matches!(row.set_expiry(Expiry::days(u64::MAX)), Err(RkvError::Value(_))));
        assert_eq!(row.ttl(), Some(3_605));
        row.clear_expiry();
        assert_eq!(row.ttl(), None);
    }

    #[test]
    fn from_stored_keeps_key_and_value() {
        let row = Row::from_stored(schema(), "users:profile:eu:1".into(), b"{\"x\":1}".to_vec()).unwrap();
        assert_eq!(
            row.as_json().unwrap(),
            json!({"keys": "users:profile:eu:1", "value": {"x": 1}})
        );
        assert!(Row::from_stored(schema(), "users:profile:eu".into(), b"{}".to_vec()).is_err());
        assert!(Row::from_stored(schema(), "users:profile:eu:1".into(), vec![0xff, 0xfe]).is_err());
    }

    #[test]
    fn row_set_accessors() {
        let rows = RowSet::new(vec![Row::new(schema()), Row::new(schema())]);
        assert_eq!(rows.len(), 2);
        assert!(rows.first().is_some());
        assert_eq!(rows.iter().count(), 2);
        assert_eq!(rows.into_iter().count(), 2);
        assert!(RowSet::default().first().is_none());
    }
}
