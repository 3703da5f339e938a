use std::sync::Arc;
use std::time::Duration;

use super::{codec, Header, JsonSerializer, Serializer, Token};
use crate::algorithms::{Signer, SignerRegistry};
use crate::claims::{Claimer, Validation};
use crate::error::{Error, Result, ResultExt};
use crate::keys::Key;

/// Decodes and verifies raw tokens.
///
/// Parsing checks, in order: segment structure, header and claims decoding,
/// that the announced algorithm is one of the accepted signers, the
/// signature, and finally the claims. Time claims of a token whose signature
/// does not verify are never inspected.
#[derive(Debug, Clone)]
pub struct Parser<S = JsonSerializer> {
    signers: Vec<Arc<dyn Signer>>,
    serializer: S,
    skew: Duration,
    audience: Option<String>,
    issuer: Option<String>,
}

impl Parser<JsonSerializer> {
    /// Parser accepting `signers`, with JSON segments.
    #[must_use]
    pub fn new(signers: Vec<Arc<dyn Signer>>) -> Self {
        Self::with_serializer(signers, JsonSerializer)
    }

    /// Parser accepting every algorithm of `registry`.
    #[must_use]
    pub fn from_registry(registry: &SignerRegistry) -> Self {
        Self::new(registry.signers().collect())
    }
}

impl<S: Serializer> Parser<S> {
    /// Parser accepting `signers` with a custom segment serializer.
    #[must_use]
    pub fn with_serializer(signers: Vec<Arc<dyn Signer>>, serializer: S) -> Self {
        Self {
            signers,
            serializer,
            skew: Duration::ZERO,
            audience: None,
            issuer: None,
        }
    }

    /// Tolerated clock skew for time claims.
    #[must_use]
    pub fn skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }

    /// Require `aud` to match.
    #[must_use]
    pub fn require_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Require `iss` to match.
    #[must_use]
    pub fn require_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Accepted algorithm names.
    pub fn algorithms(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.signers.iter().map(|s| s.alg())
    }

    fn validation(&self) -> Validation {
        let mut v = Validation::with_skew(self.skew);
        v.audience.clone_from(&self.audience);
        v.issuer.clone_from(&self.issuer);
        v
    }

    /// Decode and verify `raw`.
    ///
    /// `key_func` sees the decoded, not yet verified token and returns the
    /// key to verify it with.
    pub fn parse<C, F>(&self, raw: &str, key_func: F) -> Result<Token<C>>
    where
        C: Claimer,
        F: FnOnce(&Token<C>) -> Result<Key>,
    {
        let (h, c, s) = codec::split(raw)?;
        let header: Header = codec::decode_segment(h)
            .and_then(|b| self.serializer.deserialize(&b))
            .step("header")?;
        let claims: C = codec::decode_segment(c)
            .and_then(|b| self.serializer.deserialize(&b))
            .step("claims")?;
        let signature = codec::decode_segment(s).step("signature")?;

        let mut token = Token {
            header,
            claims,
            signature,
            raw: String::new(),
            valid: false,
        };

        let alg = token.header.alg();
        let signer = self
            .signers
            .iter()
            .find(|s| s.alg() == alg)
            .ok_or_else(|| Error::unverifiable(format!("signing method {alg:?} is not accepted")))?;
        let key = key_func(&token).step("key")?;
        let input = &raw[..h.len() + 1 + c.len()];
        signer
            .verify(input.as_bytes(), &token.signature, &key)
            .step("verify")?;
        token.claims.valid(&self.validation())?;

        token.raw = raw.to_owned();
        token.valid = true;
        Ok(token)
    }

    /// Parse into an existing token; `dst` is only replaced on success.
    pub fn parse_into<C, F>(&self, dst: &mut Token<C>, raw: &str, key_func: F) -> Result<()>
    where
        C: Claimer,
        F: FnOnce(&Token<C>) -> Result<Key>,
    {
        *dst = self.parse(raw, key_func)?;
        Ok(())
    }
}
