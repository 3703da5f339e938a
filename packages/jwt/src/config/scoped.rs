//! Immutable per-scope signing policy and the update record that replaces it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::algorithms::{key_fits, HmacFast, Signer, SignerRegistry};
use crate::claims::Claimer;
use crate::error::{Error, Result, ResultExt};
use crate::keys::{Curve, Key, DEFAULT_HMAC_LEN};
use crate::scope::Scope;
use crate::token::{Parser, Token};

/// Default token lifetime.
pub const DEFAULT_EXPIRE: Duration = Duration::from_secs(60 * 60);
/// Default tolerated clock skew.
pub const DEFAULT_SKEW: Duration = Duration::from_secs(2 * 60);
/// Default signing method.
pub const DEFAULT_SIGNING_METHOD: &str = "HS256";
/// Default claim carrying the store code.
pub const DEFAULT_STORE_CODE_FIELD: &str = "store";

/// Signing policy of one scope.
///
/// Instances are never mutated; [`ScopedConfig::apply`] returns a new one.
#[derive(Clone)]
pub struct ScopedConfig {
    /// Scope this policy belongs to.
    pub scope: Scope,
    /// Signing and verification key.
    pub key: Key,
    /// Signer for new tokens.
    pub signer: Arc<dyn Signer>,
    /// Parser accepting the signer's algorithm only.
    pub verifier: Parser,
    /// Lifetime of new tokens.
    pub expire: Duration,
    /// Tolerated clock skew.
    pub skew: Duration,
    /// Token checks are switched off for this scope.
    pub disabled: bool,
    /// Every token may be presented once.
    pub single_token_usage: bool,
    /// Claim carrying the store code.
    pub store_code_field_name: String,
    last_error: Option<Error>,
}

impl ScopedConfig {
    /// Policy with a random HMAC key and default durations.
    #[must_use]
    pub fn new(scope: Scope) -> Self {
        let key = Key::random_hmac(DEFAULT_HMAC_LEN);
        let (signer, last_error): (Arc<dyn Signer>, _) =
            match HmacFast::for_alg(DEFAULT_SIGNING_METHOD, &key) {
                Ok(fast) => (Arc::new(fast), None),
                Err(e) => (Arc::new(crate::algorithms::Hmac::HS256), Some(e)),
            };
        Self {
            scope,
            verifier: Parser::new(vec![Arc::clone(&signer)]).skew(DEFAULT_SKEW),
            key,
            signer,
            expire: DEFAULT_EXPIRE,
            skew: DEFAULT_SKEW,
            disabled: false,
            single_token_usage: false,
            store_code_field_name: DEFAULT_STORE_CODE_FIELD.to_owned(),
            last_error,
        }
    }

    /// Copy of this policy serving `scope`.
    #[must_use]
    pub fn for_scope(&self, scope: Scope) -> Self {
        let mut sc = self.clone();
        sc.scope = scope;
        sc
    }

    /// Error recorded while applying the last update, or a key problem.
    pub fn is_valid(&self) -> Result<()> {
        if let Some(err) = &self.last_error {
            return Err(err.clone());
        }
        if let Some(err) = self.key.error() {
            return Err(err.clone().with_step("key"));
        }
        if self.key.is_empty() {
            return Err(Error::not_valid(format!("{} configuration without key", self.scope)));
        }
        Ok(())
    }

    /// Key for `token`, provided it announces this scope's algorithm.
    pub fn key_for<C>(&self, token: &Token<C>) -> Result<Key> {
        let alg = token.header.alg();
        if alg != self.signer.alg() {
            return Err(Error::unverifiable(format!(
                "{} expects {}, token uses {alg:?}",
                self.scope,
                self.signer.alg()
            )));
        }
        Ok(self.key.clone())
    }

    /// Sign `token` with this policy.
    pub fn sign<C: Claimer>(&self, token: &mut Token<C>) -> Result<String> {
        token.signed_string(self.signer.as_ref(), &self.key)
    }

    /// Decode and verify `raw` with this policy.
    pub fn parse<C: Claimer>(&self, raw: &str) -> Result<Token<C>> {
        self.verifier.parse(raw, |t| self.key_for(t))
    }

    /// New policy with `update` applied.
    ///
    /// Problems with the update are recorded and reported by
    /// [`ScopedConfig::is_valid`] instead of being returned.
    #[must_use]
    pub fn apply(&self, update: ConfigUpdate, registry: &SignerRegistry) -> Self {
        let mut next = self.clone();
        // Only a new key or signing method can resolve a recorded error.
        if update.key.is_some() || update.signing_method.is_some() {
            next.last_error = None;
        }
        if let Some(v) = update.expire {
            next.expire = v;
        }
        if let Some(v) = update.skew {
            next.skew = v;
        }
        if let Some(v) = update.disabled {
            next.disabled = v;
        }
        if let Some(v) = update.single_token_usage {
            next.single_token_usage = v;
        }
        if let Some(v) = update.store_code_field_name {
            next.store_code_field_name = v;
        }

        let key_changed = update.key.is_some();
        if let Some(key) = update.key {
            next.key = key;
        }
        let method = match update.signing_method {
            Some(alg) => Some(alg),
            None if key_changed && key_fits(self.signer.alg(), &next.key) => {
                Some(self.signer.alg().to_owned())
            }
            None if key_changed => inferred_method(&next.key),
            None => None,
        };

        if let Some(err) = next.key.error() {
            next.last_error = Some(err.clone().with_step("key"));
        } else if method.is_some() || key_changed {
            let alg = method.unwrap_or_else(|| self.signer.alg().to_owned());
            match resolve_signer(&alg, &next.key, registry) {
                Ok(signer) => next.signer = signer,
                Err(e) => next.last_error = Some(e.with_step("signing method")),
            }
        }
        next.verifier = Parser::new(vec![Arc::clone(&next.signer)]).skew(next.skew);
        next
    }
}

fn inferred_method(key: &Key) -> Option<String> {
    if key.hmac_secret().is_some() {
        return Some("HS256".to_owned());
    }
    if key.rsa_public_key().is_some() {
        return Some("RS256".to_owned());
    }
    key.ecdsa_public_key().map(|k| {
        match k.curve() {
            Curve::P256 => "ES256",
            Curve::P384 => "ES384",
            Curve::P521 => "ES512",
        }
        .to_owned()
    })
}

fn resolve_signer(alg: &str, key: &Key, registry: &SignerRegistry) -> Result<Arc<dyn Signer>> {
    let signer = registry.get(alg)?;
    if !key_fits(alg, key) {
        return Err(Error::unverifiable(format!("{alg} cannot use a {}", key.kind())));
    }
    if alg.starts_with("HS") {
        return HmacFast::for_alg(alg, key)
            .map(|fast| Arc::new(fast) as Arc<dyn Signer>)
            .step("pooled HMAC");
    }
    Ok(signer)
}

impl fmt::Debug for ScopedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedConfig")
            .field("scope", &self.scope)
            .field("key", &self.key)
            .field("alg", &self.signer.alg())
            .field("expire", &self.expire)
            .field("skew", &self.skew)
            .field("disabled", &self.disabled)
            .field("single_token_usage", &self.single_token_usage)
            .field("store_code_field_name", &self.store_code_field_name)
            .field("last_error", &self.last_error)
            .finish()
    }
}

/// Changes to one scope's policy. Unset fields keep their current value.
#[derive(Debug, Clone, Default)]
pub struct ConfigUpdate {
    pub(crate) key: Option<Key>,
    pub(crate) signing_method: Option<String>,
    pub(crate) expire: Option<Duration>,
    pub(crate) skew: Option<Duration>,
    pub(crate) single_token_usage: Option<bool>,
    pub(crate) disabled: Option<bool>,
    pub(crate) store_code_field_name: Option<String>,
}

impl ConfigUpdate {
    /// Empty update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the key. Without an explicit signing method the method
    /// follows the key class (HS256, RS256 or the curve's ES variant).
    #[must_use]
    pub fn key(mut self, key: Key) -> Self {
        self.key = Some(key);
        self
    }

    /// Replace the signing method, e.g. `"RS384"`.
    #[must_use]
    pub fn signing_method(mut self, alg: impl Into<String>) -> Self {
        self.signing_method = Some(alg.into());
        self
    }

    /// Lifetime of new tokens.
    #[must_use]
    pub fn expiration(mut self, expire: Duration) -> Self {
        self.expire = Some(expire);
        self
    }

    /// Tolerated clock skew.
    #[must_use]
    pub fn skew(mut self, skew: Duration) -> Self {
        self.skew = Some(skew);
        self
    }

    /// Toggle single-use tokens.
    #[must_use]
    pub fn single_token_usage(mut self, on: bool) -> Self {
        self.single_token_usage = Some(on);
        self
    }

    /// Toggle token checks off.
    #[must_use]
    pub fn disabled(mut self, on: bool) -> Self {
        self.disabled = Some(on);
        self
    }

    /// Claim carrying the store code.
    #[must_use]
    pub fn store_code_field_name(mut self, name: impl Into<String>) -> Self {
        self.store_code_field_name = Some(name.into());
        self
    }

    /// True when nothing would change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.key.is_none()
            && self.signing_method.is_none()
            && self.expire.is_none()
            && self.skew.is_none()
            && self.single_token_usage.is_none()
            && self.disabled.is_none()
            && self.store_code_field_name.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::MapClaims;
    use crate::error::ErrorKind;
    use crate::keys::EcdsaPrivateKey;

    fn registry() -> SignerRegistry {
        SignerRegistry::with_defaults()
    }

    #[test]
    fn defaults() {
        let sc = ScopedConfig::new(Scope::Default);
        assert!(sc.is_valid().is_ok());
        assert_eq!(sc.signer.alg(), "HS256");
        assert_eq!(sc.expire, DEFAULT_EXPIRE);
        assert_eq!(sc.skew, DEFAULT_SKEW);
        assert_eq!(sc.store_code_field_name, "store");
        assert!(!sc.disabled && !sc.single_token_usage);
        assert_eq!(sc.key.hmac_secret().map(<[u8]>::len), Some(32));
    }

    #[test]
    fn apply_returns_new_config() {
        let sc = ScopedConfig::new(Scope::Website(1));
        let next = sc.apply(
            ConfigUpdate::new()
                .expiration(Duration::from_secs(5))
                .disabled(true),
            &registry(),
        );
        assert_eq!(sc.expire, DEFAULT_EXPIRE);
        assert_eq!(next.expire, Duration::from_secs(5));
        assert!(next.disabled);
    }

    #[test]
    fn key_infers_signing_method() {
        let sc = ScopedConfig::new(Scope::Default);
        let key = Key::ecdsa_private(EcdsaPrivateKey::generate(Curve::P384));
        let next = sc.apply(ConfigUpdate::new().key(key), &registry());
        assert!(next.is_valid().is_ok());
        assert_eq!(next.signer.alg(), "ES384");
        assert_eq!(next.verifier.algorithms().collect::<Vec<_>>(), vec!["ES384"]);
    }

    #[test]
    fn signing_method_change_regenerates_verifier() {
        let sc = ScopedConfig::new(Scope::Default);
        let next = sc.apply(ConfigUpdate::new().signing_method("HS512"), &registry());
        assert_eq!(next.signer.alg(), "HS512");

        let mut token = Token::new(MapClaims::new());
        let raw = next.sign(&mut token).unwrap_or_default();
        assert!(next.parse::<MapClaims>(&raw).is_ok());
        let err = sc.parse::<MapClaims>(&raw).err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::Unverifiable));
    }

    #[test]
    fn unknown_method_is_recorded() {
        let sc = ScopedConfig::new(Scope::Default);
        let next = sc.apply(ConfigUpdate::new().signing_method("XX999"), &registry());
        let err = next.is_valid().err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::NotSupported));
    }

    #[test]
    fn mismatched_key_is_recorded() {
        let sc = ScopedConfig::new(Scope::Default);
        let next = sc.apply(
            ConfigUpdate::new()
                .key(Key::hmac(b"secret".to_vec()))
                .signing_method("RS256"),
            &registry(),
        );
        let err = next.is_valid().err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::Unverifiable));
    }

    #[test]
    fn unrelated_update_keeps_recorded_error() {
        let sc = ScopedConfig::new(Scope::Default);
        let broken = sc.apply(
            ConfigUpdate::new()
                .key(Key::hmac(b"secret".to_vec()))
                .signing_method("RS256"),
            &registry(),
        );
        let next = broken.apply(
            ConfigUpdate::new().expiration(Duration::from_secs(5)),
            &registry(),
        );
        assert_eq!(next.expire, Duration::from_secs(5));
        let err = next.is_valid().err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::Unverifiable));

        let healed = next.apply(ConfigUpdate::new().signing_method("HS256"), &registry());
        assert!(healed.is_valid().is_ok());
        assert_eq!(healed.signer.alg(), "HS256");
    }

    #[test]
    fn failed_key_is_recorded() {
        let sc = ScopedConfig::new(Scope::Default);
        let next = sc.apply(ConfigUpdate::new().key(Key::rsa_private_pem("nope")), &registry());
        let err = next.is_valid().err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::NotValid));
    }

    #[test]
    fn debug_redacts_key() {
        let sc = ScopedConfig::new(Scope::Default);
        let dbg = format!("{sc:?}");
        assert!(dbg.contains("[redacted]"));
        assert!(dbg.contains("HS256"));
    }
}
