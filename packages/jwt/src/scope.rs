//! Configuration scopes and the store hierarchy the middleware consults.
//!
//! Signing policy lives on the [`Scope::Default`] and [`Scope::Website`]
//! tiers. A store never carries its own policy; a request running under a
//! store uses its website's policy, or the default one.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Configuration tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Scope {
    /// Global default, id 0.
    #[default]
    Default,
    /// Website override.
    Website(i64),
    /// Store, read only.
    Store(i64),
}

impl Scope {
    /// Numeric id; 0 for the default scope.
    #[must_use]
    pub fn id(&self) -> i64 {
        match self {
            Scope::Default => 0,
            Scope::Website(id) | Scope::Store(id) => *id,
        }
    }

    /// Website scope, or the default scope for id 0.
    #[must_use]
    pub fn website(id: i64) -> Self {
        if id == 0 {
            Scope::Default
        } else {
            Scope::Website(id)
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Default => f.write_str("Default(0)"),
            Scope::Website(id) => write!(f, "Website({id})"),
            Scope::Store(id) => write!(f, "Store({id})"),
        }
    }
}

/// Scope a request starts in before any token overrides it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RunMode(pub Scope);

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RunMode({})", self.0)
    }
}

/// Store and website a request runs under. Stored in request extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestScope {
    /// Active store id.
    pub store_id: i64,
    /// Website owning the active store.
    pub website_id: i64,
    /// Run mode the request started with.
    pub run_mode: RunMode,
}

impl RequestScope {
    /// Request scope for a resolved store/website pair.
    #[must_use]
    pub fn new(run_mode: RunMode, store_id: i64, website_id: i64) -> Self {
        Self {
            store_id,
            website_id,
            run_mode,
        }
    }

    /// Scope whose signing policy applies to this request.
    #[must_use]
    pub fn config_scope(&self) -> Scope {
        Scope::website(self.website_id)
    }
}

/// Store selected by the store service. Stored in request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveStore {
    /// Store id.
    pub store_id: i64,
    /// Website owning the store.
    pub website_id: i64,
    /// Store code, e.g. `"de"`.
    pub code: String,
}

/// Store hierarchy lookups.
#[async_trait]
pub trait StoreFinder: Send + Sync {
    /// Default `(store_id, website_id)` for a run mode.
    async fn default_store_id(&self, run_mode: RunMode) -> Result<(i64, i64)>;

    /// `(store_id, website_id)` of the store with `code`.
    async fn store_id_by_code(&self, run_mode: RunMode, code: &str) -> Result<(i64, i64)>;
}

/// Resolves the store a request asked for.
#[async_trait]
pub trait StoreService: Send + Sync {
    /// Store with `code`, if the request may switch to it.
    async fn requested_store(&self, run_mode: RunMode, code: &str) -> Result<ActiveStore>;
}

/// Static store table implementing [`StoreFinder`] and [`StoreService`].
#[derive(Debug, Clone, Default)]
pub struct StoreMap {
    stores: HashMap<String, (i64, i64)>,
    defaults: HashMap<RunMode, (i64, i64)>,
}

impl StoreMap {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a store.
    #[must_use]
    pub fn store(mut self, code: impl Into<String>, store_id: i64, website_id: i64) -> Self {
        self.stores.insert(code.into(), (store_id, website_id));
        self
    }

    /// Default store for a run mode.
    #[must_use]
    pub fn default_for(mut self, run_mode: RunMode, store_id: i64, website_id: i64) -> Self {
        self.defaults.insert(run_mode, (store_id, website_id));
        self
    }
}

#[async_trait]
impl StoreFinder for StoreMap {
    async fn default_store_id(&self, run_mode: RunMode) -> Result<(i64, i64)> {
        self.defaults
            .get(&run_mode)
            .copied()
            .ok_or_else(|| Error::not_found(format!("default store for {run_mode}")))
    }

    async fn store_id_by_code(&self, _run_mode: RunMode, code: &str) -> Result<(i64, i64)> {
        self.stores
            .get(code)
            .copied()
            .ok_or_else(|| Error::not_found(format!("store code {code:?}")))
    }
}

#[async_trait]
impl StoreService for StoreMap {
    async fn requested_store(&self, run_mode: RunMode, code: &str) -> Result<ActiveStore> {
        let (store_id, website_id) = self.store_id_by_code(run_mode, code).await?;
        Ok(ActiveStore {
            store_id,
            website_id,
            code: code.to_owned(),
        })
    }
}
