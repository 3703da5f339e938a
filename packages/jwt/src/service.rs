//! Token issuing, parsing and revocation across scopes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::algorithms::SignerRegistry;
use crate::claims::{merge_claims, names, Claimer, MapClaims};
use crate::config::{ConfigCache, ConfigUpdate, OptionLoader, ScopedConfig, Settings};
use crate::error::{Error, Result, ResultExt};
use crate::revocation::{Blocklist, MemoryBlocklist, NullBlocklist};
use crate::scope::Scope;
use crate::token::Token;

type Template<C> = Arc<dyn Fn() -> Token<C> + Send + Sync>;

/// Issues, parses and revokes tokens with per-scope policy.
///
/// One instance is shared by all request handlers.
pub struct Service<C: Claimer = MapClaims> {
    configs: ConfigCache,
    blocklist: Arc<dyn Blocklist>,
    template: Template<C>,
    settings: Settings,
}

impl<C: Claimer> fmt::Debug for Service<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("configs", &self.configs)
            .field("blocklist", &self.blocklist)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<C: Claimer + Default> Service<C> {
    /// Builder with default settings and an empty claim template.
    #[must_use]
    pub fn builder() -> ServiceBuilder<C> {
        ServiceBuilder::new(Arc::new(|| Token::new(C::default())))
    }

    /// Service with default settings.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }
}

impl<C: Claimer> Service<C> {
    /// Settings the service was built with.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Revocation store in use.
    #[must_use]
    pub fn blocklist(&self) -> &Arc<dyn Blocklist> {
        &self.blocklist
    }

    /// Policy for `scope`; invalid policies are errors.
    pub async fn config_by_scope(&self, scope: Scope) -> Result<Arc<ScopedConfig>> {
        self.configs.get(scope).await
    }

    /// Replace the policy of `scope`.
    pub fn update_scope(&self, scope: Scope, update: ConfigUpdate) -> Result<Arc<ScopedConfig>> {
        self.configs.update(scope, update)
    }

    /// Forget every cached scope policy.
    pub fn flush(&self) {
        self.configs.flush();
    }

    /// Sign a new token for `scope` carrying `claims`.
    ///
    /// `exp` and `iat` are stamped from the scope policy, and a fresh `jti`
    /// when the scope issues single-use tokens. A claim already set by the
    /// template makes the call fail.
    #[instrument(level = "debug", skip(self, claims))]
    pub async fn new_token<X: Claimer>(&self, scope: Scope, claims: &X) -> Result<Token<C>> {
        let sc = self.configs.get(scope).await.step("config")?;
        let mut token = (self.template)();
        merge_claims(&mut token.claims, claims).step("merge claims")?;

        let now = Utc::now();
        let lifetime = chrono::Duration::from_std(sc.expire)
            .map_err(|e| Error::not_valid(format!("expiration ({e})")))?;
        let exp = now + lifetime;
        token.claims.set(names::EXPIRES_AT, Value::from(exp.timestamp()))?;
        token.claims.set(names::ISSUED_AT, Value::from(now.timestamp()))?;
        if sc.single_token_usage {
            token
                .claims
                .set(names::ID, Value::from(Uuid::new_v4().to_string()))?;
        }
        sc.sign(&mut token).step("sign")?;
        Ok(token)
    }

    /// Parse `raw` with the default scope's policy.
    pub async fn parse(&self, raw: &str) -> Result<Token<C>> {
        self.parse_scoped(Scope::Default, raw).await
    }

    /// Parse `raw` with `scope`'s policy.
    ///
    /// Revoked tokens are rejected. With single-use tokens enabled the token
    /// is revoked as soon as it parsed.
    #[instrument(level = "debug", skip(self, raw))]
    pub async fn parse_scoped(&self, scope: Scope, raw: &str) -> Result<Token<C>> {
        let sc = self.configs.get(scope).await.step("config")?;
        let token: Token<C> = sc.parse(raw)?;
        let id = token.raw.as_bytes();
        let admitted = if sc.single_token_usage {
            let ttl = match token.claims.expires_at() {
                Some(exp) => remaining(Some(exp), sc.skew).unwrap_or(sc.skew),
                None => sc.expire,
            };
            self.blocklist.set_if_absent(id, ttl).step("single use")?
        } else {
            !self.blocklist.has(id)
        };
        if !admitted {
            debug!(%scope, "rejected revoked token");
            return Err(Error::Revoked);
        }
        Ok(token)
    }

    /// Revoke `token` for the rest of its lifetime.
    ///
    /// Unsigned, unparsed or already expired tokens are ignored.
    pub fn logout(&self, token: &Token<C>) -> Result<()> {
        if !token.valid || token.raw.is_empty() {
            return Ok(());
        }
        let ttl = match token.claims.expires_at() {
            Some(exp) => match remaining(Some(exp), Duration::ZERO) {
                Some(ttl) => ttl,
                None => return Ok(()),
            },
            None => self.configs.default_config().expire,
        };
        debug!(ttl_secs = ttl.as_secs(), "token revoked");
        self.blocklist.set(token.raw.as_bytes(), ttl)
    }
}

/// Time left until `exp` plus `skew`, `None` when already past.
fn remaining(exp: Option<i64>, skew: Duration) -> Option<Duration> {
    let exp = exp?;
    let left = exp.saturating_sub(Utc::now().timestamp());
    let left = u64::try_from(left).ok().filter(|s| *s > 0)?;
    Some(Duration::from_secs(left) + skew)
}

/// Builder for [`Service`].
pub struct ServiceBuilder<C: Claimer> {
    template: Template<C>,
    loader: Option<Arc<dyn OptionLoader>>,
    blocklist: Option<Arc<dyn Blocklist>>,
    registry: SignerRegistry,
    settings: Settings,
    default_update: Option<ConfigUpdate>,
}

impl<C: Claimer> ServiceBuilder<C> {
    fn new(template: Template<C>) -> Self {
        Self {
            template,
            loader: None,
            blocklist: None,
            registry: SignerRegistry::with_defaults(),
            settings: Settings::default(),
            default_update: None,
        }
    }

    /// Template every new token starts from.
    #[must_use]
    pub fn template<F>(mut self, template: F) -> Self
    where
        F: Fn() -> Token<C> + Send + Sync + 'static,
    {
        self.template = Arc::new(template);
        self
    }

    /// Load unknown scopes with `loader` instead of falling back to the
    /// default policy.
    #[must_use]
    pub fn loader(mut self, loader: Arc<dyn OptionLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Revocation store. Defaults to [`NullBlocklist`], or a
    /// [`MemoryBlocklist`] when the settings ask for one.
    #[must_use]
    pub fn blocklist(mut self, blocklist: Arc<dyn Blocklist>) -> Self {
        self.blocklist = Some(blocklist);
        self
    }

    /// Signer registry resolving algorithm names.
    #[must_use]
    pub fn registry(mut self, registry: SignerRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Process-level settings.
    #[must_use]
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Extra changes to the default scope, applied after the settings.
    #[must_use]
    pub fn default_config(mut self, update: ConfigUpdate) -> Self {
        self.default_update = Some(update);
        self
    }

    /// Build the service; fails when the default policy is invalid.
    pub fn build(self) -> Result<Service<C>> {
        let configs = ConfigCache::new(Arc::new(self.registry), self.loader);
        configs.update(Scope::Default, self.settings.default_update())?;
        if let Some(update) = self.default_update {
            configs.update(Scope::Default, update)?;
        }
        configs.default_config().is_valid().step("default configuration")?;
        configs.flush();

        let blocklist = self.blocklist.unwrap_or_else(|| {
            if self.settings.memory_blocklist {
                Arc::new(MemoryBlocklist::new())
            } else {
                Arc::new(NullBlocklist)
            }
        });
        Ok(Service {
            configs,
            blocklist,
            template: self.template,
            settings: self.settings,
        })
    }
}
