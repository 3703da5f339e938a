use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::RwLock;
use tracing::{debug, instrument, warn};

use super::loader::OptionLoader;
use super::scoped::{ConfigUpdate, ScopedConfig};
use crate::algorithms::SignerRegistry;
use crate::error::{Error, Result};
use crate::scope::Scope;
use crate::singleflight::SingleFlight;

#[derive(Clone)]
enum Slot {
    Config(Arc<ScopedConfig>),
    UseDefault,
}

/// Per-scope policy cache.
///
/// Lookups resolve in this order:
///
/// 1. Without a loader the default scope is served straight from the
///    default entry.
/// 2. A cached scope is served under the read lock; a scope marked as
///    "use default" is served the default entry.
/// 3. Without a loader an unknown scope is marked "use default" for the
///    lifetime of the cache.
/// 4. With a loader an unknown scope is loaded once, however many callers
///    ask for it concurrently. A failed load is shared by those callers
///    and not cached.
///
/// Loaded and first-time updated scopes start from a copy of the current
/// default policy. A cached policy that carries an error reports that error
/// on every lookup; it never falls back to the default.
pub struct ConfigCache {
    default: Arc<ArcSwap<ScopedConfig>>,
    scopes: Arc<RwLock<HashMap<Scope, Slot>>>,
    loader: Option<Arc<dyn OptionLoader>>,
    registry: Arc<SignerRegistry>,
    flight: SingleFlight<Result<Arc<ScopedConfig>>>,
}

impl Default for ConfigCache {
    fn default() -> Self {
        Self::new(Arc::new(SignerRegistry::with_defaults()), None)
    }
}

impl fmt::Debug for ConfigCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigCache")
            .field("default", &self.default.load())
            .field("scopes", &self.scopes.read().len())
            .field("loader", &self.loader.is_some())
            .finish()
    }
}

fn reject_store(scope: Scope) -> Result<()> {
    match scope {
        Scope::Store(_) => Err(Error::not_supported(format!(
            "per-store configuration ({scope})"
        ))),
        _ => Ok(()),
    }
}

/// Load `scope` unless an update or an earlier load cached it after the
/// caller's lookup. An entry cached while the loader runs wins over the
/// loaded policy.
async fn load_scope(
    scopes: Arc<RwLock<HashMap<Scope, Slot>>>,
    default: Arc<ArcSwap<ScopedConfig>>,
    registry: Arc<SignerRegistry>,
    loader: Arc<dyn OptionLoader>,
    scope: Scope,
) -> Result<Arc<ScopedConfig>> {
    let cached = scopes.read().get(&scope).cloned();
    if let Some(slot) = cached {
        debug!(%scope, "scope cached before load started");
        return Ok(slot_config(slot, &default));
    }

    debug!(%scope, "loading scope configuration");
    let update = loader.load(scope).await.map_err(|e| {
        warn!(%scope, error = %e, "loading scope configuration failed");
        e.with_step("load scope configuration")
    })?;
    let base = default.load_full().for_scope(scope);
    let sc = Arc::new(base.apply(update, &registry));

    let mut guard = scopes.write();
    if let Some(slot) = guard.get(&scope).cloned() {
        debug!(%scope, "scope cached while loading; loaded policy dropped");
        return Ok(slot_config(slot, &default));
    }
    guard.insert(scope, Slot::Config(Arc::clone(&sc)));
    if scope == Scope::Default {
        default.store(Arc::clone(&sc));
    }
    Ok(sc)
}

fn slot_config(slot: Slot, default: &ArcSwap<ScopedConfig>) -> Arc<ScopedConfig> {
    match slot {
        Slot::Config(sc) => sc,
        Slot::UseDefault => default.load_full(),
    }
}

impl ConfigCache {
    /// Cache resolving algorithm names with `registry`, loading unknown
    /// scopes with `loader` when one is given.
    #[must_use]
    pub fn new(registry: Arc<SignerRegistry>, loader: Option<Arc<dyn OptionLoader>>) -> Self {
        Self {
            default: Arc::new(ArcSwap::from_pointee(ScopedConfig::new(Scope::Default))),
            scopes: Arc::new(RwLock::new(HashMap::new())),
            loader,
            registry,
            flight: SingleFlight::new(),
        }
    }

    /// Current default policy.
    #[must_use]
    pub fn default_config(&self) -> Arc<ScopedConfig> {
        self.default.load_full()
    }

    /// Signer registry used to resolve algorithm names.
    #[must_use]
    pub fn registry(&self) -> &SignerRegistry {
        &self.registry
    }

    fn resolve(&self, slot: Slot) -> Result<Arc<ScopedConfig>> {
        let sc = slot_config(slot, &self.default);
        sc.is_valid()?;
        Ok(sc)
    }

    /// Policy for `scope`.
    #[instrument(level = "debug", skip(self))]
    pub async fn get(&self, scope: Scope) -> Result<Arc<ScopedConfig>> {
        reject_store(scope)?;

        if self.loader.is_none() && scope == Scope::Default {
            return self.resolve(Slot::UseDefault);
        }

        let cached = self.scopes.read().get(&scope).cloned();
        if let Some(slot) = cached {
            return self.resolve(slot);
        }

        let Some(loader) = self.loader.clone() else {
            let slot = self
                .scopes
                .write()
                .entry(scope)
                .or_insert(Slot::UseDefault)
                .clone();
            debug!(%scope, "unconfigured scope falls back to default");
            return self.resolve(slot);
        };

        let scopes = Arc::clone(&self.scopes);
        let default = Arc::clone(&self.default);
        let registry = Arc::clone(&self.registry);
        let (loaded, shared) = self
            .flight
            .run(&scope.to_string(), move || {
                load_scope(scopes, default, registry, loader, scope)
            })
            .await;
        if shared {
            debug!(%scope, "joined in-flight load");
        }
        self.resolve(Slot::Config(loaded?))
    }

    /// Apply `update` to `scope` and cache the result.
    ///
    /// The new policy is returned even when it carries an error; lookups of
    /// the scope report that error until a later update fixes it.
    pub fn update(&self, scope: Scope, update: ConfigUpdate) -> Result<Arc<ScopedConfig>> {
        reject_store(scope)?;
        let mut scopes = self.scopes.write();
        let base = match (scope, scopes.get(&scope)) {
            (Scope::Default, _) => self.default.load_full(),
            (_, Some(Slot::Config(sc))) => Arc::clone(sc),
            _ => Arc::new(self.default.load_full().for_scope(scope)),
        };
        let next = Arc::new(base.apply(update, &self.registry));
        if let Err(e) = next.is_valid() {
            warn!(%scope, error = %e, "scope configuration is invalid");
        }
        scopes.insert(scope, Slot::Config(Arc::clone(&next)));
        if scope == Scope::Default {
            self.default.store(Arc::clone(&next));
        }
        Ok(next)
    }

    /// Forget every cached scope. The default policy is kept.
    pub fn flush(&self) {
        self.scopes.write().clear();
        debug!("scope configuration cache flushed");
    }

    /// Number of cached scopes, fallback markers included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scopes.read().len()
    }

    /// True when no scope is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scopes.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::error::ErrorKind;
    use crate::keys::Key;

    #[tokio::test]
    async fn default_scope_fast_path() {
        let cache = ConfigCache::default();
        let a = cache.get(Scope::Default).await.ok();
        assert!(a.is_some_and(|a| Arc::ptr_eq(&a, &cache.default_config())));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn unconfigured_scope_uses_default_and_is_cached() {
        let cache = ConfigCache::default();
        let got = cache.get(Scope::Website(7)).await.ok();
        assert!(got.is_some_and(|g| Arc::ptr_eq(&g, &cache.default_config())));
        assert_eq!(cache.len(), 1);
        let again = cache.get(Scope::Website(7)).await.ok();
        assert!(again.is_some_and(|g| g.scope == Scope::Default));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn store_scope_is_not_supported() {
        let cache = ConfigCache::default();
        let err = cache.get(Scope::Store(1)).await.err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::NotSupported));
        let err = cache.update(Scope::Store(1), ConfigUpdate::new()).err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::NotSupported));
    }

    #[tokio::test]
    async fn update_replaces_scope_policy() {
        let cache = ConfigCache::default();
        let before = cache.get(Scope::Website(1)).await.ok();
        let updated = cache
            .update(Scope::Website(1), ConfigUpdate::new().expiration(Duration::from_secs(9)))
            .ok();
        assert!(updated.is_some());
        let after = cache.get(Scope::Website(1)).await.ok();
        assert_eq!(after.map(|a| a.expire), Some(Duration::from_secs(9)));
        assert_eq!(before.map(|b| b.expire), Some(crate::config::DEFAULT_EXPIRE));
    }

    #[tokio::test]
    async fn invalid_scope_surfaces_its_error() {
        let cache = ConfigCache::default();
        let res = cache.update(Scope::Website(2), ConfigUpdate::new().key(Key::hmac(Vec::new())));
        assert!(res.is_ok());
        let err = cache.get(Scope::Website(2)).await.err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::NotValid));
    }

    #[tokio::test]
    async fn failed_load_is_not_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let loader = move |_scope: Scope| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(Error::internal("backend down"))
                } else {
                    Ok(ConfigUpdate::new().single_token_usage(true))
                }
            }
        };
        let cache = ConfigCache::new(Arc::new(SignerRegistry::with_defaults()), Some(Arc::new(loader)));
        let err = cache.get(Scope::Website(1)).await.err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::Internal));
        assert!(cache.is_empty());

        let sc = cache.get(Scope::Website(1)).await.ok();
        assert!(sc.is_some_and(|s| s.single_token_usage));
        assert!(cache.get(Scope::Website(1)).await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    fn counting_loader(calls: &Arc<AtomicUsize>) -> Arc<dyn OptionLoader> {
        let counter = Arc::clone(calls);
        Arc::new(move |_scope: Scope| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, Error>(ConfigUpdate::new().disabled(true)) }
        })
    }

    #[tokio::test]
    async fn load_skips_scope_cached_after_lookup() {
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = counting_loader(&calls);
        let cache = ConfigCache::new(Arc::new(SignerRegistry::with_defaults()), Some(Arc::clone(&loader)));
        cache
            .update(Scope::Website(1), ConfigUpdate::new().expiration(Duration::from_secs(9)))
            .ok();

        // A caller that missed the cache just before the update reaches the loader here.
        let sc = load_scope(
            Arc::clone(&cache.scopes),
            Arc::clone(&cache.default),
            Arc::clone(&cache.registry),
            loader,
            Scope::Website(1),
        )
        .await
        .ok();
        assert!(sc.is_some_and(|s| s.expire == Duration::from_secs(9) && !s.disabled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concurrent_lookups_load_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = Arc::new(ConfigCache::new(
            Arc::new(SignerRegistry::with_defaults()),
            Some(counting_loader(&calls)),
        ));
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get(Scope::Website(3)).await })
            })
            .collect();
        for task in tasks {
            let sc = task.await.ok().and_then(Result::ok);
            assert!(sc.is_some_and(|s| s.disabled));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn flush_forgets_scopes() {
        let cache = ConfigCache::default();
        cache.get(Scope::Website(1)).await.ok();
        cache
            .update(Scope::Website(2), ConfigUpdate::new().disabled(true))
            .ok();
        assert_eq!(cache.len(), 2);
        cache.flush();
        assert!(cache.is_empty());
        let sc = cache.get(Scope::Website(2)).await.ok();
        assert!(sc.is_some_and(|s| !s.disabled));
    }
}
