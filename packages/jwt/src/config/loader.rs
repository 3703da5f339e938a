//! Lazy per-scope configuration loading.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::getter::ConfigGetter;
use super::scoped::ConfigUpdate;
use crate::error::{ErrorKind, Result, ResultExt};
use crate::keys::Key;
use crate::scope::Scope;

/// Paths read by [`BackendLoader`].
pub mod paths {
    /// Bool, token checks off.
    pub const DISABLED: &str = "net/jwt/disabled";
    /// Duration, token lifetime.
    pub const EXPIRATION: &str = "net/jwt/expiration";
    /// Duration, tolerated clock skew.
    pub const SKEW: &str = "net/jwt/skew";
    /// Bool, single-use tokens.
    pub const SINGLE_USAGE: &str = "net/jwt/single_usage";
    /// String, algorithm name.
    pub const SIGNING_METHOD: &str = "net/jwt/signing_method";
    /// String, HMAC secret.
    pub const HMAC_PASSWORD: &str = "net/jwt/hmac_password";
    /// String, PEM encoded RSA private key.
    pub const RSA_KEY: &str = "net/jwt/rsa_key";
    /// String, PEM encoded ECDSA private key.
    pub const ECDSA_KEY: &str = "net/jwt/ecdsa_key";
    /// String, claim carrying the store code.
    pub const STORE_CODE_FIELD_NAME: &str = "net/jwt/store_code_field_name";
}

/// Produces the configuration of a scope on its first use.
#[async_trait]
pub trait OptionLoader: Send + Sync {
    /// Update to apply on top of a fresh default policy for `scope`.
    async fn load(&self, scope: Scope) -> Result<ConfigUpdate>;
}

#[async_trait]
impl<F, Fut> OptionLoader for F
where
    F: Fn(Scope) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ConfigUpdate>> + Send,
{
    async fn load(&self, scope: Scope) -> Result<ConfigUpdate> {
        self(scope).await
    }
}

/// Loader reading the `net/jwt/*` paths from a [`ConfigGetter`].
///
/// Missing paths keep the defaults; any other getter error aborts the load.
pub struct BackendLoader<G> {
    getter: Arc<G>,
}

impl<G> Clone for BackendLoader<G> {
    fn clone(&self) -> Self {
        Self {
            getter: Arc::clone(&self.getter),
        }
    }
}

fn optional<T>(r: Result<T>, path: &'static str) -> Result<Option<T>> {
    match r {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.is(ErrorKind::NotFound) => Ok(None),
        Err(e) => Err(e.with_step(path)),
    }
}

impl<G: ConfigGetter> BackendLoader<G> {
    /// Loader over `getter`.
    pub fn new(getter: Arc<G>) -> Self {
        Self { getter }
    }

    fn key(&self, scope: Scope, method: Option<&str>) -> Result<Option<Key>> {
        let g = &self.getter;
        let hmac = || -> Result<Option<Key>> {
            Ok(optional(g.string(scope, paths::HMAC_PASSWORD), paths::HMAC_PASSWORD)?
                .map(|s| Key::hmac(s.into_bytes())))
        };
        let rsa = || -> Result<Option<Key>> {
            Ok(optional(g.string(scope, paths::RSA_KEY), paths::RSA_KEY)?
                .map(|pem| Key::rsa_private_pem(&pem)))
        };
        let ecdsa = || -> Result<Option<Key>> {
            Ok(optional(g.string(scope, paths::ECDSA_KEY), paths::ECDSA_KEY)?
                .map(|pem| Key::ecdsa_private_pem(&pem)))
        };
        match method.map(|m| m.get(..2).unwrap_or_default()) {
            Some("HS") => hmac(),
            Some("RS" | "PS") => rsa(),
            Some("ES") => ecdsa(),
            _ => Ok(hmac()?.or(rsa()?).or(ecdsa()?)),
        }
    }
}

#[async_trait]
impl<G: ConfigGetter + 'static> OptionLoader for BackendLoader<G> {
    #[instrument(skip(self))]
    async fn load(&self, scope: Scope) -> Result<ConfigUpdate> {
        let g = &self.getter;
        let mut update = ConfigUpdate::new();

        if let Some(v) = optional(g.bool(scope, paths::DISABLED), paths::DISABLED)? {
            update = update.disabled(v);
        }
        if let Some(v) = optional(g.duration(scope, paths::EXPIRATION), paths::EXPIRATION)? {
            update = update.expiration(v);
        }
        if let Some(v) = optional(g.duration(scope, paths::SKEW), paths::SKEW)? {
            update = update.skew(v);
        }
        if let Some(v) = optional(g.bool(scope, paths::SINGLE_USAGE), paths::SINGLE_USAGE)? {
            update = update.single_token_usage(v);
        }
        if let Some(v) = optional(
            g.string(scope, paths::STORE_CODE_FIELD_NAME),
            paths::STORE_CODE_FIELD_NAME,
        )? {
            update = update.store_code_field_name(v);
        }

        let method = optional(g.string(scope, paths::SIGNING_METHOD), paths::SIGNING_METHOD)?;
        if let Some(key) = self.key(scope, method.as_deref()).step("key")? {
            update = update.key(key);
        }
        if let Some(m) = method {
            update = update.signing_method(m);
        }
        debug!(empty = update.is_empty(), "loaded scope configuration");
        Ok(update)
    }
}
