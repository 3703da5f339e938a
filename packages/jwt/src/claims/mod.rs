//! Claim sets.
//!
//! The codec is agnostic of the concrete claim type: anything implementing
//! [`Claimer`] can be signed and parsed. [`StandardClaims`] covers the
//! registered claims, [`StoreClaims`] adds the store code used for scope
//! switching, and [`MapClaims`] accepts arbitrary keys.

mod map;
mod standard;
mod store;
mod validation;

pub use map::MapClaims;
pub use standard::StandardClaims;
pub use store::StoreClaims;
pub use validation::{constant_time_eq, ClaimViolation, Validation, ValidationErrors};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// Registered claim names.
pub mod names {
    /// Audience.
    pub const AUDIENCE: &str = "aud";
    /// Expiration time.
    pub const EXPIRES_AT: &str = "exp";
    /// Token identifier.
    pub const ID: &str = "jti";
    /// Issued at.
    pub const ISSUED_AT: &str = "iat";
    /// Issuer.
    pub const ISSUER: &str = "iss";
    /// Not before.
    pub const NOT_BEFORE: &str = "nbf";
    /// Subject.
    pub const SUBJECT: &str = "sub";
}

/// Capability interface of a claim set.
///
/// `get`/`set` address claims by their wire name, which lets the service
/// stamp `exp`, `iat` and `jti` and lets middleware read a store code without
/// knowing the concrete type.
pub trait Claimer: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Value of the claim `key`, if present.
    fn get(&self, key: &str) -> Option<Value>;

    /// Set claim `key`; fixed-shape claim sets reject unknown keys.
    fn set(&mut self, key: &str, value: Value) -> Result<()>;

    /// Names of the claims currently present.
    fn keys(&self) -> Vec<String>;

    /// `exp` as unix seconds.
    fn expires_at(&self) -> Option<i64> {
        self.get(names::EXPIRES_AT).and_then(|v| v.as_i64())
    }

    /// Check time claims and, when required, `aud`/`iss`.
    fn valid(&self, validation: &Validation) -> Result<()> {
        validation::validate_with(|k| self.get(k), validation).map_err(Error::Validation)
    }
}

/// Copy every claim of `src` into `dst`.
///
/// A claim that already exists in `dst` makes the merge fail with
/// [`Error::AlreadyExists`]; `dst` may be partially updated at that point.
pub fn merge_claims<D: Claimer, S: Claimer>(dst: &mut D, src: &S) -> Result<()> {
    for key in src.keys() {
        if dst.get(&key).is_some() {
            return Err(Error::AlreadyExists(key));
        }
        if let Some(value) = src.get(&key) {
            dst.set(&key, value)?;
        }
    }
    Ok(())
}

pub(crate) fn expect_i64(key: &str, value: &Value) -> Result<i64> {
    value
        .as_i64()
        .ok_or_else(|| Error::not_valid(format!("claim {key} (expected integer, got {value})")))
}

pub(crate) fn expect_string(key: &str, value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(Error::not_valid(format!(
            "claim {key} (expected string, got {other})"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn merge_copies_into_map() {
        let mut dst = MapClaims::new();
        dst.insert("sub", json!("alice"));
        let mut src = MapClaims::new();
        src.insert("store", json!("de"));

        merge_claims(&mut dst, &src).ok();
        assert_eq!(dst.get("store"), Some(json!("de")));
        assert_eq!(dst.get("sub"), Some(json!("alice")));
    }

    #[test]
    fn merge_rejects_existing_claims() {
        let mut dst = MapClaims::new();
        dst.insert("sub", json!("alice"));
        let mut src = MapClaims::new();
        src.insert("sub", json!("mallory"));

        let err = merge_claims(&mut dst, &src).err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::AlreadyExists));
        assert_eq!(dst.get("sub"), Some(json!("alice")));
    }

    #[test]
    fn merge_into_struct_rejects_unknown_keys() {
        let mut dst = StandardClaims::default();
        let mut src = MapClaims::new();
        src.insert("shoe_size", json!(44));

        let err = merge_claims(&mut dst, &src).err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::NotSupported));
    }
}
