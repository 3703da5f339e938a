use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Claimer;
use crate::error::Result;

/// Dynamic claim set accepting any key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MapClaims(BTreeMap<String, Value>);

impl MapClaims {
    /// Empty claim set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a claim, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    /// Remove a claim.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Number of claims.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no claim is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Claim as a string slice.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for MapClaims {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl Claimer for MapClaims {
    fn get(&self, key: &str) -> Option<Value> {
        self.0.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.0.insert(key.to_owned(), value);
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::Validation;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn collects_from_pairs() {
        let c: MapClaims = [("store", json!("de")), ("sub", json!("bob"))]
            .into_iter()
            .collect();
        assert_eq!(c.len(), 2);
        assert_eq!(c.get_str("store"), Some("de"));
        assert_eq!(c.keys(), vec!["store", "sub"]);
    }

    #[test]
    fn non_numeric_time_claim_is_invalid() {
        let c: MapClaims = [("nbf", json!("soon"))].into_iter().collect();
        let err = c.valid(&Validation::default()).err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::NotValid));
    }
}
