use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{expect_i64, expect_string, names, Claimer};
use crate::error::{Error, Result};

/// Registered JWT claims (RFC 7519 section 4.1).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardClaims {
    /// Audience.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    /// Expiry (unix seconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// JWT ID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    /// Issued-at (unix seconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Issuer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Not before (unix seconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    /// Subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
}

impl StandardClaims {
    /// Claims with only the subject set.
    #[must_use]
    pub fn with_subject(sub: impl Into<String>) -> Self {
        Self {
            sub: Some(sub.into()),
            ..Self::default()
        }
    }

    pub(crate) fn get_registered(&self, key: &str) -> Option<Value> {
        match key {
            names::AUDIENCE => self.aud.clone().map(Value::from),
            names::EXPIRES_AT => self.exp.map(Value::from),
            names::ID => self.jti.clone().map(Value::from),
            names::ISSUED_AT => self.iat.map(Value::from),
            names::ISSUER => self.iss.clone().map(Value::from),
            names::NOT_BEFORE => self.nbf.map(Value::from),
            names::SUBJECT => self.sub.clone().map(Value::from),
            _ => None,
        }
    }

    /// Returns `Ok(false)` when `key` is not a registered claim.
    pub(crate) fn set_registered(&mut self, key: &str, value: Value) -> Result<bool> {
        match key {
            names::AUDIENCE => self.aud = Some(expect_string(key, value)?),
            names::EXPIRES_AT => self.exp = Some(expect_i64(key, &value)?),
            names::ID => self.jti = Some(expect_string(key, value)?),
            names::ISSUED_AT => self.iat = Some(expect_i64(key, &value)?),
            names::ISSUER => self.iss = Some(expect_string(key, value)?),
            names::NOT_BEFORE => self.nbf = Some(expect_i64(key, &value)?),
            names::SUBJECT => self.sub = Some(expect_string(key, value)?),
            _ => return Ok(false),
        }
        Ok(true)
    }

    pub(crate) fn registered_keys(&self) -> Vec<String> {
        let present = [
            (names::AUDIENCE, self.aud.is_some()),
            (names::EXPIRES_AT, self.exp.is_some()),
            (names::ID, self.jti.is_some()),
            (names::ISSUED_AT, self.iat.is_some()),
            (names::ISSUER, self.iss.is_some()),
            (names::NOT_BEFORE, self.nbf.is_some()),
            (names::SUBJECT, self.sub.is_some()),
        ];
        present
            .into_iter()
            .filter(|(_, set)| *set)
            .map(|(k, _)| k.to_owned())
            .collect()
    }
}

impl Claimer for StandardClaims {
    fn get(&self, key: &str) -> Option<Value> {
        self.get_registered(key)
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        if self.set_registered(key, value)? {
            Ok(())
        } else {
            Err(Error::not_supported(format!("claim {key} on StandardClaims")))
        }
    }

    fn keys(&self) -> Vec<String> {
        self.registered_keys()
    }

    fn expires_at(&self) -> Option<i64> {
        self.exp
    }
}
