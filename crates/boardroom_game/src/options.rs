//! Opaque per-table configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Key/value options a table was created with.
///
/// The engine never interprets these; modules read the keys they know.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Options(BTreeMap<String, Value>);

impl Options {
    /// Empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts or replaces a value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Raw value for `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String value for `key`.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Unsigned integer value for `key`.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(Value::as_u64)
    }

    /// Boolean value for `key`.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    /// True when no option is set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates options in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_accessors() {
        let options = Options::new()
            .with("variant", "misere")
            .with("time_limit_secs", 60u64)
            .with("beginner", true);

        assert_eq!(options.get_str("variant"), Some("misere"));
        assert_eq!(options.get_u64("time_limit_secs"), Some(60));
        assert_eq!(options.get_bool("beginner"), Some(true));
        assert_eq!(options.get_u64("variant"), None);
        assert_eq!(options.get("missing"), None);
    }

    #[test]
    fn test_serializes_as_plain_map() {
        let options = Options::new().with("a", 1u64);
        let json = serde_json::to_string(&options).expect("serialize");
        assert_eq!(json, r#"{"a":1}"#);
    }
}
