use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{expect_string, Claimer, StandardClaims};
use crate::error::{Error, Result};

/// Claim name carrying the store code.
pub const STORE: &str = "store";
/// Claim name carrying the user identifier.
pub const USER_ID: &str = "userid";

/// Registered claims plus the store code a token is bound to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreClaims {
    /// Registered claims, flattened into the top level.
    #[serde(flatten)]
    pub standard: StandardClaims,
    /// Store code, e.g. `"de"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<String>,
    /// Application user identifier.
    #[serde(rename = "userid", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl StoreClaims {
    /// Claims bound to the store `code`.
    #[must_use]
    pub fn for_store(code: impl Into<String>) -> Self {
        Self {
            store: Some(code.into()),
            ..Self::default()
        }
    }
}

impl Claimer for StoreClaims {
    fn get(&self, key: &str) -> Option<Value> {
        match key {
            STORE => self.store.clone().map(Value::from),
            USER_ID => self.user_id.clone().map(Value::from),
            other => self.standard.get_registered(other),
        }
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        match key {
            STORE => self.store = Some(expect_string(key, value)?),
            USER_ID => self.user_id = Some(expect_string(key, value)?),
            other => {
                if !self.standard.set_registered(other, value)? {
                    return Err(Error::not_supported(format!("claim {other} on StoreClaims")));
                }
            }
        }
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        let mut keys = self.standard.registered_keys();
        if self.store.is_some() {
            keys.push(STORE.to_owned());
        }
        if self.user_id.is_some() {
            keys.push(USER_ID.to_owned());
        }
        keys
    }

    fn expires_at(&self) -> Option<i64> {
        self.standard.exp
    }
}
