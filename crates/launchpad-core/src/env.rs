//! Ordered environment variable map.

use k8s_openapi::api::core::v1::EnvVar;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map;

/// Environment variables keyed by name, iterated in lexicographic key order.
///
/// Merging is last-writer-wins: entries from the map merged later replace
/// earlier entries with the same key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentMap(BTreeMap<String, String>);

impl EnvironmentMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.0.iter()
    }

    /// Fold `other` into this map; `other` wins on conflicting keys.
    pub fn merge(mut self, other: EnvironmentMap) -> Self {
        self.0.extend(other.0);
        self
    }

    /// Container env entries in key order.
    pub fn to_env_vars(&self) -> Vec<EnvVar> {
        self.0
            .iter()
            .map(|(name, value)| EnvVar {
                name: name.clone(),
                value: Some(value.clone()),
                ..Default::default()
            })
            .collect()
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }
}

impl From<BTreeMap<String, String>> for EnvironmentMap {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvironmentMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl IntoIterator for EnvironmentMap {
    type Item = (String, String);
    type IntoIter = btree_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a EnvironmentMap {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_last_writer_wins() {
        let contributed: EnvironmentMap = [("A", "1"), ("B", "2")].into_iter().collect();
        let extra: EnvironmentMap = [("B", "3")].into_iter().collect();

        let merged = contributed.merge(extra);

        let expected: EnvironmentMap = [("A", "1"), ("B", "3")].into_iter().collect();
        assert_eq!(merged, expected);
    }

    #[test]
    fn test_iteration_is_lexicographic() {
        let env = EnvironmentMap::new()
            .with("ZETA", "z")
            .with("ALPHA", "a")
            .with("MID", "m");
        let keys: Vec<_> = env.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["ALPHA", "MID", "ZETA"]);
    }

    #[test]
    fn test_env_vars_follow_key_order() {
        let env = EnvironmentMap::new().with("B", "2").with("A", "1");
        let vars = env.to_env_vars();
        assert_eq!(vars.len(), 2);
        assert_eq!(vars[0].name, "A");
        assert_eq!(vars[0].value.as_deref(), Some("1"));
        assert_eq!(vars[1].name, "B");
    }

    #[test]
    fn test_serializes_as_plain_map() {
        let env = EnvironmentMap::new().with("DB_URL", "postgres://db:5432/app");
        let json = serde_json::to_string(&env).unwrap();
        assert_eq!(json, r#"{"DB_URL":"postgres://db:5432/app"}"#);
    }
}
