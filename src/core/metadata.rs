//! Record metadata.
//!
//! Metadata is an ordered association of string keys to typed [`Value`]s.
//! Insertion order is preserved so that serialized forms are stable.

use smallvec::SmallVec;
use std::fmt;

use super::value::{split_top_level, Value};
use crate::util::{Point, Rect};

/// Metadata storage - ordered key-value pairs.
///
/// Uses SmallVec optimization for the common case of few entries.
#[derive(Clone, Default, PartialEq)]
pub struct Metadata {
    entries: SmallVec<[(String, Value); 8]>,
}

impl Metadata {
    /// Create empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a metadata value, replacing any existing value for `key`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();

        for (k, v) in &mut self.entries {
            if k == &key {
                *v = value;
                return;
            }
        }
        self.entries.push((key, value));
    }

    /// Get a metadata value by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Check if a key exists.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Remove a key and return its value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    /// Get the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clear all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterate over key-value pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterate over keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    // === Typed accessors ===

    /// String value. Non-string values are rendered in their text form.
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).map(Value::to_plain_string)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    /// Boolean flag; absent keys are false.
    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn get_point(&self, key: &str) -> Option<Point> {
        self.get(key).and_then(Value::as_point)
    }

    pub fn get_rect(&self, key: &str) -> Option<Rect> {
        self.get(key).and_then(Value::as_rect)
    }

    /// Serialize to the `key=value,key2=value2` text form.
    pub fn serialize(&self) -> String {
        let mut result = String::new();
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                result.push(',');
            }
            result.push_str(k);
            result.push('=');
            result.push_str(&v.to_string());
        }
        result
    }

    /// Parse from the `key=value,key2=value2` text form.
    ///
    /// A bare `key` without `=` is a true flag.
    pub fn parse(s: &str) -> Self {
        let mut meta = Self::new();
        if s.trim().is_empty() {
            return meta;
        }

        for part in split_top_level(s, ',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            match part.find('=') {
                Some(eq) => {
                    let key = part[..eq].trim();
                    if !key.is_empty() {
                        meta.set(key, Value::parse(&part[eq + 1..]));
                    }
                }
                None => meta.set(part, true),
            }
        }
        meta
    }
}

impl fmt::Debug for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries.iter().map(|(k, v)| (k, v))).finish()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut meta = Self::new();
        for (k, v) in iter {
            meta.set(k, v);
        }
        meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_replaces() {
        let mut md = Metadata::new();
        md.set("Label", "a");
        md.set("Label", "b");
        assert_eq!(md.len(), 1);
        assert_eq!(md.get_string("Label").as_deref(), Some("b"));
    }

    #[test]
    fn test_order_preserved() {
        let md: Metadata = [("z", 1i64), ("a", 2), ("m", 3)].into_iter().collect();
        assert_eq!(md.keys().collect::<Vec<_>>(), vec!["z", "a", "m"]);
    }

    #[test]
    fn test_serialize_parse() {
        let mut md = Metadata::new();
        md.set("Label", "subject 1");
        md.set("Face", Rect::new(1.0, 2.0, 30.0, 40.0));
        md.set("Eye", Point::new(3.0, 4.0));
        md.set("FTE", true);

        let text = md.serialize();
        assert_eq!(Metadata::parse(&text), md);
    }

    #[test]
    fn test_parse_flag() {
        let md = Metadata::parse("append, blockSize=10");
        assert!(md.get_bool("append"));
        assert_eq!(md.get_i64("blockSize"), Some(10));
        assert!(!md.get_bool("remove"));
    }

    #[test]
    fn test_remove() {
        let mut md = Metadata::parse("a=1,b=2");
        assert_eq!(md.remove("a"), Some(Value::Int(1)));
        assert!(!md.contains("a"));
        assert_eq!(md.remove("a"), None);
    }
}
