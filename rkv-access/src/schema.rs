//! # Key Schema
//!
//! Purpose: Declare how compound keys are laid out and build exact keys and
//! glob search patterns from per-operation segment values.
//!
//! ## Design Principles
//! 1. **Validated Up Front**: Segment names, uniqueness and the delimiter are
//!    checked when the schema is built, never per call.
//! 2. **Typed Segment Values**: Caller maps are folded into `KeyParts`, one slot
//!    per declared dynamic segment, instead of being passed around as loose maps.
//! 3. **Injection-Safe**: A value containing the delimiter is rejected, and
//!    values are glob-escaped inside search patterns.
//!
//! ## Key Layout
//!
//! ```text
//! statics  = [users, profile]      dynamics = [region, id]      delimiter = ':'
//!
//! category        users:profile
//! stored key      users:profile:eu:42
//! merge_key       *:42                 (only `id` supplied)
//! search pattern  users:profile:*:42
//! ```

use std::fmt;

use rkv_common::glob::{self, WILDCARD};
use rkv_common::{RkvError, RkvResult};

/// Separator used when none is given.
pub const DEFAULT_DELIMITER: char = ':';

/// Ordered declaration of static and dynamic key segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    statics: Vec<String>,
    dynamics: Vec<String>,
    /// Upper-cased dynamic names for case-insensitive lookup.
    folded: Vec<String>,
    delimiter: char,
}

impl Schema {
    /// Builds a schema joined with the default `:` delimiter.
    pub fn new<S, D>(statics: S, dynamics: D) -> RkvResult<Self>
    where
        S: IntoIterator,
        S::Item: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        Self::with_delimiter(statics, dynamics, DEFAULT_DELIMITER)
    }

    /// Builds a schema with a custom delimiter.
    ///
    /// # Errors
    /// `RkvError::Schema` when either segment list is empty, a name is empty or
    /// contains the delimiter, dynamic names repeat (ignoring case), or the
    /// delimiter is a glob metacharacter.
    pub fn with_delimiter<S, D>(statics: S, dynamics: D, delimiter: char) -> RkvResult<Self>
    where
        S: IntoIterator,
        S::Item: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        if glob::METACHARS.contains(&delimiter) {
            return Err(RkvError::Schema(format!(
                "delimiter '{}' is a glob metacharacter",
                delimiter
            )));
        }

        let statics: Vec<String> = statics.into_iter().map(Into::into).collect();
        if statics.is_empty() {
            return Err(RkvError::Schema(
                "static keys are required to build a key namespace".to_string(),
            ));
        }
        for name in &statics {
            check_segment_name(name, delimiter)?;
        }

        let mut schema = Schema {
            statics,
            dynamics: Vec::new(),
            folded: Vec::new(),
            delimiter,
        };

        for name in dynamics {
            let name = name.into();
            check_segment_name(&name, delimiter)?;
            if schema.position(&name).is_some() {
                return Err(RkvError::Schema(format!("dynamic key '{}' is declared twice", name)));
            }
            schema.push_dynamic(name);
        }
        if schema.dynamics.is_empty() {
            return Err(RkvError::Schema(
                "dynamic keys are required to build searchable keys".to_string(),
            ));
        }

        Ok(schema)
    }

    /// Appends dynamic segment names, skipping ones already declared.
    ///
    /// Repeated calls with the same names are no-ops; first-insertion order is kept.
    pub fn add_dynamic_names<I>(&mut self, names: I) -> RkvResult<()>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        for name in names {
            let name = name.into();
            check_segment_name(&name, self.delimiter)?;
            if self.position(&name).is_none() {
                self.push_dynamic(name);
            }
        }
        Ok(())
    }

    pub fn statics(&self) -> &[String] {
        &self.statics
    }

    pub fn dynamics(&self) -> &[String] {
        &self.dynamics
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    /// Static segments joined by the delimiter; the namespace prefix of every key.
    pub fn build_category(&self) -> String {
        self.join(&self.statics)
    }

    /// Dynamic segment names joined by the delimiter. Debug output only.
    pub fn build_search_keys(&self) -> String {
        self.join(&self.dynamics)
    }

    /// Index of the dynamic segment called `name`, ignoring case.
    pub fn position(&self, name: &str) -> Option<usize> {
        let folded = name.to_uppercase();
        self.folded.iter().position(|candidate| *candidate == folded)
    }

    /// Keeps only the entries naming a declared dynamic segment.
    ///
    /// Unknown names are ignored. Later entries for the same segment win.
    ///
    /// # Errors
    /// `RkvError::Key` when an accepted value contains the delimiter.
    pub fn clean_key_dict<I, K, V>(&self, values: I) -> RkvResult<KeyParts>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut parts = KeyParts::empty(self.dynamics.len());
        for (name, value) in values {
            let idx = match self.position(name.as_ref()) {
                Some(idx) => idx,
                None => continue,
            };
            let value = value.as_ref();
            if value.contains(self.delimiter) {
                return Err(RkvError::Key(format!(
                    "value for '{}' cannot contain delimiter '{}'",
                    self.dynamics[idx], self.delimiter
                )));
            }
            parts.slots[idx] = Some(value.to_string());
        }
        Ok(parts)
    }

    /// Dynamic-only search pattern: supplied values in declared order, `*` for the rest.
    ///
    /// # Examples
    /// ```rust
    /// use rkv_access::Schema;
    ///
    /// let schema = Schema::new(["users"], ["A", "B", "C"]).unwrap();
    /// assert_eq!(schema.merge_key([("b", "x")]).unwrap(), "*:x:*");
    /// ```
    pub fn merge_key<I, K, V>(&self, values: I) -> RkvResult<String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let parts = self.clean_key_dict(values)?;
        Ok(self.pattern_for(&parts))
    }

    /// Full pattern scanned by lookups: escaped category, delimiter, `merge_key`.
    pub fn search_pattern<I, K, V>(&self, values: I) -> RkvResult<String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let merged = self.merge_key(values)?;
        Ok(format!(
            "{}{}{}",
            glob::escape(&self.build_category()),
            self.delimiter,
            merged
        ))
    }

    /// Joins a complete set of parts into a stored key (category included).
    ///
    /// # Errors
    /// `RkvError::Key` naming every segment left unset.
    pub fn build_key(&self, parts: &KeyParts) -> RkvResult<String> {
        let missing = self.missing(parts);
        if !missing.is_empty() {
            return Err(RkvError::Key(format!(
                "dynamic keys must all be set, missing: {}",
                missing.join("|")
            )));
        }

        let mut key = self.build_category();
        for value in parts.slots.iter().flatten() {
            key.push(self.delimiter);
            key.push_str(value);
        }
        Ok(key)
    }

    /// Splits a stored key back into its dynamic values.
    ///
    /// # Errors
    /// `RkvError::Key` when the key lies outside this schema's namespace or has
    /// the wrong number of dynamic segments.
    pub fn split_key<'k>(&self, key: &'k str) -> RkvResult<Vec<&'k str>> {
        let category = self.build_category();
        let rest = key
            .strip_prefix(category.as_str())
            .and_then(|rest| rest.strip_prefix(self.delimiter))
            .ok_or_else(|| {
                RkvError::Key(format!("key '{}' is outside namespace '{}'", key, category))
            })?;

        let values: Vec<&str> = rest.split(self.delimiter).collect();
        if values.len() != self.dynamics.len() {
            return Err(RkvError::Key(format!(
                "key '{}' has {} dynamic segments, schema declares {}: {}",
                key,
                values.len(),
                self.dynamics.len(),
                self.build_search_keys()
            )));
        }
        Ok(values)
    }

    /// Names of the dynamic segments `parts` leaves unset.
    pub fn missing(&self, parts: &KeyParts) -> Vec<&str> {
        self.dynamics
            .iter()
            .zip(&parts.slots)
            .filter(|(_, slot)| slot.is_none())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    fn pattern_for(&self, parts: &KeyParts) -> String {
        let segments: Vec<String> = parts
            .slots
            .iter()
            .map(|slot| match slot {
                Some(value) => glob::escape(value),
                None => WILDCARD.to_string(),
            })
            .collect();
        self.join(&segments)
    }

    fn join(&self, segments: &[String]) -> String {
        let mut buf = [0u8; 4];
        let sep: &str = self.delimiter.encode_utf8(&mut buf);
        segments.join(sep)
    }

    fn push_dynamic(&mut self, name: String) {
        self.folded.push(name.to_uppercase());
        self.dynamics.push(name);
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{{{}}}",
            self.build_category(),
            self.delimiter,
            self.build_search_keys()
        )
    }
}

fn check_segment_name(name: &str, delimiter: char) -> RkvResult<()> {
    if name.is_empty() {
        return Err(RkvError::Schema("segment names cannot be empty".to_string()));
    }
    if name.contains(delimiter) {
        return Err(RkvError::Schema(format!(
            "segment name '{}' cannot contain delimiter '{}'",
            name, delimiter
        )));
    }
    Ok(())
}

/// Values for a schema's dynamic segments, one slot per declared name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyParts {
    slots: Vec<Option<String>>,
}

impl KeyParts {
    fn empty(len: usize) -> Self {
        KeyParts {
            slots: vec![None; len],
        }
    }

    /// Value for the segment at `idx`, if supplied.
    pub fn get(&self, idx: usize) -> Option<&str> {
        self.slots.get(idx).and_then(|slot| slot.as_deref())
    }

    /// Number of declared segments.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of segments with a value.
    pub fn supplied(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Fills every unset slot from `base`, keeping supplied values.
    pub(crate) fn overlay_onto(mut self, base: &[&str]) -> Self {
        for (slot, fallback) in self.slots.iter_mut().zip(base) {
            if slot.is_none() {
                *slot = Some((*fallback).to_string());
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abc() -> Schema {
        Schema::new(["STATIC_1", "STATIC_2"], ["A", "B", "C"]).unwrap()
    }

    const NONE: [(&str, &str); 0] = [];

    #[test]
    fn rejects_empty_segment_lists() {
        let empty: [&str; 0] = [];
        assert!(matches!(Schema::new(empty, ["A"]), Err(RkvError::Schema(_))));
        assert!(matches!(Schema::new(["S"], empty), Err(RkvError::Schema(_))));
    }

    #[test]
    fn rejects_bad_names_and_delimiters() {
        assert!(matches!(Schema::new(["S"], ["A", "a"]), Err(RkvError::Schema(_))));
        assert!(matches!(Schema::new(["S:T"], ["A"]), Err(RkvError::Schema(_))));
        assert!(matches!(Schema::new(["S"], [""]), Err(RkvError::Schema(_))));
        assert!(matches!(
            Schema::with_delimiter(["S"], ["A"], '*'),
            Err(RkvError::Schema(_))
        ));
    }

    #[test]
    fn category_and_search_keys() {
        let schema = abc();
        assert_eq!(schema.build_category(), "STATIC_1:STATIC_2");
        assert_eq!(schema.build_search_keys(), "A:B:C");
        assert_eq!(schema.to_string(), "STATIC_1:STATIC_2:{A:B:C}");

        let dotted = Schema::with_delimiter(["ns"], ["x", "y"], '.').unwrap();
        assert_eq!(dotted.build_category(), "ns");
        assert_eq!(dotted.build_search_keys(), "x.y");
    }

    #[test]
    fn add_dynamic_names_is_idempotent() {
        let mut schema = abc();
        schema.add_dynamic_names(["D", "a", "D", "E"]).unwrap();
        assert_eq!(schema.dynamics(), ["A", "B", "C", "D", "E"]);
        schema.add_dynamic_names(["d", "e"]).unwrap();
        assert_eq!(schema.dynamics().len(), 5);
        assert!(schema.add_dynamic_names(["F:G"]).is_err());
    }

    #[test]
    fn merge_key_all_wildcards() {
        assert_eq!(abc().merge_key(NONE).unwrap(), "*:*:*");
    }

    #[test]
    fn merge_key_partial_and_case_insensitive() {
        let schema = abc();
        assert_eq!(schema.merge_key([("B", "x")]).unwrap(), "*:x:*");
        assert_eq!(schema.merge_key([("c", "z"), ("a", "x")]).unwrap(), "x:*:z");
    }

    #[test]
    fn merge_key_ignores_unknown_names() {
        assert_eq!(abc().merge_key([("nope", "1"), ("B", "2")]).unwrap(), "*:2:*");
    }

    #[test]
    fn merge_key_rejects_delimiter_in_value() {
        let err = abc().merge_key([("A", "x:y")]).unwrap_err();
        assert!(matches!(err, RkvError::Key(_)));
    }

    #[test]
    fn merge_key_escapes_glob_characters() {
        assert_eq!(abc().merge_key([("A", "a*")]).unwrap(), "a\\*:*:*");
    }

    #[test]
    fn search_pattern_prefixes_category() {
        assert_eq!(
            abc().search_pattern([("B", "x")]).unwrap(),
            "STATIC_1:STATIC_2:*:x:*"
        );
    }

    #[test]
    fn build_key_names_missing_segments() {
        let schema = abc();
        let parts = schema.clean_key_dict([("A", "1"), ("C", "3")]).unwrap();
        assert!(!parts.is_complete());
        assert_eq!(parts.supplied(), 2);
        assert_eq!(schema.missing(&parts), vec!["B"]);
        match schema.build_key(&parts) {
            Err(RkvError::Key(message)) => assert!(message.contains('B')),
            other => panic!("expected key error, got {:?}", other),
        }

        let parts = schema.clean_key_dict([("a", "1"), ("b", "2"), ("c", "3")]).unwrap();
        assert_eq!(parts.get(1), Some("2"));
        assert_eq!(schema.build_key(&parts).unwrap(), "STATIC_1:STATIC_2:1:2:3");
    }

    #[test]
    fn split_key_checks_namespace_and_arity() {
        let schema = abc();
        assert_eq!(
            schema.split_key("STATIC_1:STATIC_2:1:2:3").unwrap(),
            vec!["1", "2", "3"]
        );
        assert!(schema.split_key("OTHER:STATIC_2:1:2:3").is_err());
        assert!(schema.split_key("STATIC_1:STATIC_2:1:2").is_err());
        assert!(schema.split_key("STATIC_1:STATIC_2:1:2:3:4").is_err());
        assert!(schema.split_key("STATIC_1:STATIC_2X1:2:3").is_err());
    }
}
