//! Token representation and the three-segment wire codec.
//!
//! A [`Token`] is built from claims, signed with a [`Signer`] and a [`Key`],
//! and parsed back by a [`Parser`]. Header and claims are encoded
//! independently with a [`Serializer`] (JSON by default) and joined as
//! `header.claims.signature` in base64url without padding.

pub mod codec;
mod parser;
mod serializer;

pub use parser::Parser;
pub use serializer::{BincodeSerializer, JsonSerializer, Serializer};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::algorithms::Signer;
use crate::claims::{Claimer, MapClaims};
use crate::error::{Result, ResultExt};
use crate::keys::Key;

/// Header parameter names.
pub mod params {
    /// Signing algorithm.
    pub const ALG: &str = "alg";
    /// Media type.
    pub const TYP: &str = "typ";
    /// Key identifier.
    pub const KID: &str = "kid";
}

/// Ordered header parameters.
///
/// Only string-valued parameters are supported; a header carrying anything
/// else does not decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Header(BTreeMap<String, String>);

impl Default for Header {
    fn default() -> Self {
        let mut map = BTreeMap::new();
        map.insert(params::ALG.to_owned(), String::new());
        map.insert(params::TYP.to_owned(), "JWT".to_owned());
        Self(map)
    }
}

impl Header {
    /// `{"alg":"","typ":"JWT"}`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parameter `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Set parameter `name`.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Algorithm name, empty before signing.
    #[must_use]
    pub fn alg(&self) -> &str {
        self.get(params::ALG).unwrap_or_default()
    }

    /// Media type.
    #[must_use]
    pub fn typ(&self) -> Option<&str> {
        self.get(params::TYP)
    }

    /// Key identifier.
    #[must_use]
    pub fn kid(&self) -> Option<&str> {
        self.get(params::KID)
    }

    /// Iterate parameters in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// A signed or parsed token.
#[derive(Debug, Clone, PartialEq)]
pub struct Token<C = MapClaims> {
    /// Header parameters.
    pub header: Header,
    /// Claim set.
    pub claims: C,
    /// Decoded signature bytes.
    pub signature: Vec<u8>,
    /// Complete encoded token, set by signing and parsing.
    pub raw: String,
    /// True once signed, or parsed and verified.
    pub valid: bool,
}

impl<C: Claimer + Default> Default for Token<C> {
    fn default() -> Self {
        Self::new(C::default())
    }
}

impl<C: Claimer> Token<C> {
    /// Unsigned token carrying `claims`.
    #[must_use]
    pub fn new(claims: C) -> Self {
        Self {
            header: Header::new(),
            claims,
            signature: Vec::new(),
            raw: String::new(),
            valid: false,
        }
    }

    /// `b64(header).b64(claims)` with JSON segments.
    pub fn signing_string(&self) -> Result<String> {
        self.signing_string_with(&JsonSerializer)
    }

    /// `b64(header).b64(claims)` with a custom serializer.
    pub fn signing_string_with<S: Serializer>(&self, serializer: &S) -> Result<String> {
        let header = serializer.serialize(&self.header).step("encode header")?;
        let claims = serializer.serialize(&self.claims).step("encode claims")?;
        Ok(format!(
            "{}.{}",
            codec::encode_segment(&header),
            codec::encode_segment(&claims)
        ))
    }

    /// Stamp `alg`, sign and return the complete token with JSON segments.
    pub fn signed_string(&mut self, signer: &dyn Signer, key: &Key) -> Result<String> {
        self.signed_string_with(&JsonSerializer, signer, key)
    }

    /// Stamp `alg`, sign and return the complete token.
    pub fn signed_string_with<S: Serializer>(
        &mut self,
        serializer: &S,
        signer: &dyn Signer,
        key: &Key,
    ) -> Result<String> {
        self.header.set(params::ALG, signer.alg());
        let input = self.signing_string_with(serializer)?;
        let signature = signer.sign(input.as_bytes(), key).step("sign")?;
        let raw = format!("{input}.{}", codec::encode_segment(&signature));
        self.signature = signature;
        self.raw.clone_from(&raw);
        self.valid = true;
        Ok(raw)
    }

    /// Claim `name` as a string, if present and a string.
    #[must_use]
    pub fn claim_str(&self, name: &str) -> Option<String> {
        self.claims
            .get(name)
            .and_then(|v| v.as_str().map(str::to_owned))
    }
}
