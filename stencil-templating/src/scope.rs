//! Variable scopes used during template expansion
//!
//! A [`Scope`] holds the named bindings one template sees while it is being
//! expanded. Values are stored as Liquid values so the default engine can use
//! them directly, and can be supplied as anything convertible to
//! `serde_json::Value`.

use liquid::model::Value as LiquidValue;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Named variable bindings for a single template expansion
#[derive(Debug, Clone, Default)]
pub struct Scope {
    variables: liquid::Object,
}

impl Scope {
    /// Create an empty scope
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `key` to `value`, replacing any previous binding
    ///
    /// Values that cannot be represented in Liquid are bound as nil.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let value: Value = value.into();
        let value = liquid::model::to_value(&value).unwrap_or(LiquidValue::Nil);
        self.variables.insert(key.into().into(), value);
    }

    /// Builder-style variant of [`Scope::set`]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Look up a binding
    pub fn get(&self, key: &str) -> Option<&LiquidValue> {
        self.variables.get(key)
    }

    /// Whether `key` is bound
    pub fn contains(&self, key: &str) -> bool {
        self.variables.contains_key(key)
    }

    /// Remove a binding, returning its previous value
    pub fn remove(&mut self, key: &str) -> Option<LiquidValue> {
        self.variables.remove(key)
    }

    /// Number of bindings
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Whether the scope has no bindings
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Binding names in unspecified order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(|k| k.as_str())
    }

    /// Copy every binding from `other` into this scope; `other` wins on conflict
    pub fn merge(&mut self, other: &Scope) {
        for (key, value) in other.variables.iter() {
            self.variables.insert(key.clone(), value.clone());
        }
    }

    /// The underlying Liquid object
    pub fn as_object(&self) -> &liquid::Object {
        &self.variables
    }
}

impl From<HashMap<String, String>> for Scope {
    fn from(map: HashMap<String, String>) -> Self {
        let mut scope = Scope::new();
        for (key, value) in map {
            scope.set(key, value);
        }
        scope
    }
}

impl From<BTreeMap<String, Value>> for Scope {
    fn from(map: BTreeMap<String, Value>) -> Self {
        let mut scope = Scope::new();
        for (key, value) in map {
            scope.set(key, value);
        }
        scope
    }
}

impl From<serde_json::Map<String, Value>> for Scope {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        let mut scope = Scope::new();
        for (key, value) in map {
            scope.set(key, value);
        }
        scope
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Scope {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut scope = Scope::new();
        for (key, value) in iter {
            scope.set(key, value);
        }
        scope
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use liquid::model::ValueView;
    use serde_json::json;

    #[test]
    fn test_set_and_get() {
        let mut scope = Scope::new();
        assert!(scope.is_empty());

        scope.set("name", "X");
        scope.set("count", 3);

        assert_eq!(scope.len(), 2);
        assert!(scope.contains("name"));
        assert_eq!(
            scope.get("name").map(|v| v.to_kstr().to_string()),
            Some("X".to_string())
        );
    }

    #[test]
    fn test_set_replaces_previous_binding() {
        let mut scope = Scope::new().with("name", "first");
        scope.set("name", "second");

        assert_eq!(scope.len(), 1);
        assert_eq!(
            scope.get("name").map(|v| v.to_kstr().to_string()),
            Some("second".to_string())
        );
    }

    #[test]
    fn test_nested_values() {
        let scope = Scope::new().with("project", json!({ "name": "demo", "version": "1.0" }));
        let project = scope.get("project").and_then(|v| v.as_object());
        assert!(project.is_some());
    }

    #[test]
    fn test_merge_prefers_other() {
        let mut base = Scope::new().with("a", 1).with("b", 2);
        let other = Scope::new().with("b", 20).with("c", 30);
        base.merge(&other);

        assert_eq!(base.len(), 3);
        assert_eq!(
            base.get("b").map(|v| v.to_kstr().to_string()),
            Some("20".to_string())
        );
    }

    #[test]
    fn test_from_hash_map() {
        let mut map = HashMap::new();
        map.insert("greeting".to_string(), "Hello".to_string());
        let scope = Scope::from(map);
        assert!(scope.contains("greeting"));
    }

    #[test]
    fn test_remove() {
        let mut scope: Scope = [("name", "X")].into_iter().collect();
        assert!(scope.remove("name").is_some());
        assert!(scope.remove("name").is_none());
        assert!(scope.is_empty());
    }
}
