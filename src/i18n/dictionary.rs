//! Dictionary storage for localized messages.
//!
//! Messages are organized per locale as a tree of namespaces addressed by
//! dot-delimited paths ("common.nav.title"). The tree is strictly typed:
//! every node is either a nested table or a leaf string, and traversal fails
//! closed (a lookup through a leaf, or to a table, is a miss rather than a
//! panic or a stringified subtree).

use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// A node in the message tree: either a message string or a nested table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DictNode {
    /// A translated message.
    Leaf(String),
    /// A nested namespace of messages.
    Table(BTreeMap<String, DictNode>),
}

impl DictNode {
    /// Build a node from a JSON value.
    ///
    /// Strings become leaves and objects become tables. Values of any other
    /// shape (numbers, booleans, arrays, null) are dropped: they cannot be
    /// resolved as messages, so they are treated as absent.
    pub fn from_json(value: &Value) -> Option<DictNode> {
        match value {
            Value::String(s) => Some(DictNode::Leaf(s.clone())),
            Value::Object(map) => {
                let mut table = BTreeMap::new();
                for (key, child) in map {
                    if let Some(node) = DictNode::from_json(child) {
                        table.insert(key.clone(), node);
                    }
                }
                Some(DictNode::Table(table))
            }
            _ => None,
        }
    }

    /// Resolve a dot-delimited path to a message string.
    ///
    /// Returns `None` when any segment is missing, when the path descends
    /// through a leaf, or when it ends on a table.
    pub fn get_path(&self, path: &str) -> Option<&str> {
        let mut node = self;
        for segment in path.split('.') {
            match node {
                DictNode::Table(table) => node = table.get(segment)?,
                DictNode::Leaf(_) => return None,
            }
        }
        match node {
            DictNode::Leaf(s) => Some(s),
            DictNode::Table(_) => None,
        }
    }
}

/// Deep-merge one JSON tree into another.
///
/// Objects merge recursively key by key; any other incoming value (strings,
/// numbers, arrays, null) overwrites the base value. Within one key the last
/// write wins.
pub fn deep_merge(base: &mut Value, incoming: Value) {
    match (base, incoming) {
        (Value::Object(base_map), Value::Object(incoming_map)) => {
            for (key, value) in incoming_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base_slot, incoming) => *base_slot = incoming,
    }
}

/// All loaded message trees, keyed by locale.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    locales: HashMap<String, DictNode>,
}

impl Dictionary {
    /// Create an empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a JSON document into the tree for `locale`.
    ///
    /// Repeated calls for the same locale deep-merge, with the incoming
    /// document winning on conflicts.
    pub fn add_locale_json(&mut self, locale: &str, document: Value) {
        let merged = match self.locales.remove(locale) {
            Some(existing) => {
                let mut base = dict_node_to_json(&existing);
                deep_merge(&mut base, document);
                base
            }
            None => document,
        };
        match DictNode::from_json(&merged) {
            Some(node @ DictNode::Table(_)) => {
                self.locales.insert(locale.to_string(), node);
            }
            _ => {
                warn!("Discarding non-object dictionary document for locale {}", locale);
            }
        }
    }

    /// Look up a dot-delimited key within one locale's tree.
    pub fn lookup(&self, locale: &str, key: &str) -> Option<&str> {
        self.locales.get(locale)?.get_path(key)
    }

    /// Whether any messages are loaded for `locale`.
    pub fn has_locale(&self, locale: &str) -> bool {
        self.locales.contains_key(locale)
    }

    /// Number of loaded locales.
    pub fn locale_count(&self) -> usize {
        self.locales.len()
    }

    /// Load every `<locale>.json` file from a directory.
    ///
    /// The file stem names the locale. Files that fail to read or parse are
    /// skipped with a warning so one bad document does not take down startup.
    pub fn load_dir(dir: &Path) -> Result<Dictionary> {
        let mut dictionary = Dictionary::new();
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read locales directory {}", dir.display()))?;

        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(locale) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let raw = match std::fs::read_to_string(&path) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("Skipping unreadable locale file {}: {}", path.display(), e);
                    continue;
                }
            };
            match serde_json::from_str::<Value>(&raw) {
                Ok(document) => {
                    debug!("Loaded locale file {}", path.display());
                    dictionary.add_locale_json(locale, document);
                }
                Err(e) => {
                    warn!("Skipping invalid locale file {}: {}", path.display(), e);
                }
            }
        }

        Ok(dictionary)
    }
}

/// Convert a node tree back into JSON, for re-merging.
fn dict_node_to_json(node: &DictNode) -> Value {
    match node {
        DictNode::Leaf(s) => Value::String(s.clone()),
        DictNode::Table(table) => {
            let mut map = serde_json::Map::new();
            for (key, child) in table {
                map.insert(key.clone(), dict_node_to_json(child));
            }
            Value::Object(map)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ==================== Node Construction Tests ====================

    #[test]
    fn test_from_json_string_leaf() {
        let node = DictNode::from_json(&json!("hello")).expect("leaf");
        assert_eq!(node, DictNode::Leaf("hello".to_string()));
    }

    #[test]
    fn test_from_json_drops_non_message_values() {
        let node = DictNode::from_json(&json!({
            "title": "Products",
            "count": 42,
            "flags": [true, false],
            "nothing": null
        }))
        .expect("table");

        assert_eq!(node.get_path("title"), Some("Products"));
        assert_eq!(node.get_path("count"), None);
        assert_eq!(node.get_path("flags"), None);
        assert_eq!(node.get_path("nothing"), None);
    }

    // ==================== Path Lookup Tests ====================

    #[test]
    fn test_get_path_nested() {
        let node = DictNode::from_json(&json!({
            "nav": { "items": { "title": "Items" } }
        }))
        .expect("table");

        assert_eq!(node.get_path("nav.items.title"), Some("Items"));
    }

    #[test]
    fn test_get_path_missing_segment() {
        let node = DictNode::from_json(&json!({ "nav": { "title": "Nav" } })).expect("table");
        assert_eq!(node.get_path("nav.missing"), None);
    }

    #[test]
    fn test_get_path_through_leaf_is_miss() {
        let node = DictNode::from_json(&json!({ "nav": "not a table" })).expect("table");
        assert_eq!(node.get_path("nav.title"), None);
    }

    #[test]
    fn test_get_path_ending_on_table_is_miss() {
        let node = DictNode::from_json(&json!({ "nav": { "title": "Nav" } })).expect("table");
        assert_eq!(node.get_path("nav"), None);
    }

    // ==================== Deep Merge Tests ====================

    #[test]
    fn test_deep_merge_combines_objects() {
        let mut base = json!({ "a": { "x": 1 } });
        deep_merge(&mut base, json!({ "a": { "y": 2 } }));
        assert_eq!(base, json!({ "a": { "x": 1, "y": 2 } }));
    }

    #[test]
    fn test_deep_merge_scalar_overwrite() {
        let mut base = json!({ "a": 1 });
        deep_merge(&mut base, json!({ "a": 2 }));
        assert_eq!(base, json!({ "a": 2 }));
    }

    #[test]
    fn test_deep_merge_array_overwrites() {
        let mut base = json!({ "a": { "x": 1 } });
        deep_merge(&mut base, json!({ "a": [1, 2] }));
        assert_eq!(base, json!({ "a": [1, 2] }));
    }

    #[test]
    fn test_deep_merge_adds_new_keys() {
        let mut base = json!({ "a": "1" });
        deep_merge(&mut base, json!({ "b": "2" }));
        assert_eq!(base, json!({ "a": "1", "b": "2" }));
    }

    // ==================== Dictionary Tests ====================

    #[test]
    fn test_dictionary_lookup() {
        let mut dictionary = Dictionary::new();
        dictionary.add_locale_json("en", json!({ "common": { "greeting": "Hello" } }));

        assert_eq!(dictionary.lookup("en", "common.greeting"), Some("Hello"));
        assert_eq!(dictionary.lookup("en", "common.missing"), None);
        assert_eq!(dictionary.lookup("uk", "common.greeting"), None);
    }

    #[test]
    fn test_dictionary_merge_last_write_wins() {
        let mut dictionary = Dictionary::new();
        dictionary.add_locale_json("en", json!({ "common": { "greeting": "Hello", "bye": "Bye" } }));
        dictionary.add_locale_json("en", json!({ "common": { "greeting": "Hi" } }));

        assert_eq!(dictionary.lookup("en", "common.greeting"), Some("Hi"));
        assert_eq!(dictionary.lookup("en", "common.bye"), Some("Bye"));
    }

    #[test]
    fn test_dictionary_rejects_non_object_document() {
        let mut dictionary = Dictionary::new();
        dictionary.add_locale_json("en", json!("just a string"));
        assert!(!dictionary.has_locale("en"));
    }

    #[test]
    fn test_load_dir() {
        let temp_dir = tempfile::TempDir::new().expect("temp dir");
        std::fs::write(
            temp_dir.path().join("en.json"),
            r#"{ "common": { "greeting": "Hello" } }"#,
        )
        .expect("write en");
        std::fs::write(
            temp_dir.path().join("uk.json"),
            r#"{ "common": { "greeting": "Привіт" } }"#,
        )
        .expect("write uk");
        std::fs::write(temp_dir.path().join("notes.txt"), "ignored").expect("write txt");
        std::fs::write(temp_dir.path().join("bad.json"), "{ not json").expect("write bad");

        let dictionary = Dictionary::load_dir(temp_dir.path()).expect("load");
        assert_eq!(dictionary.locale_count(), 2);
        assert_eq!(dictionary.lookup("en", "common.greeting"), Some("Hello"));
        assert_eq!(dictionary.lookup("uk", "common.greeting"), Some("Привіт"));
    }
}
