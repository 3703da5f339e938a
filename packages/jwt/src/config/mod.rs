//! Per-scope signing policy.
//!
//! [`ScopedConfig`] is the immutable policy of one scope. [`ConfigCache`]
//! resolves and caches policies, loading unknown scopes through an
//! [`OptionLoader`] such as [`BackendLoader`], which reads the admin
//! configuration tree via a [`ConfigGetter`]. [`Settings`] holds process
//! level defaults.

mod cache;
mod getter;
mod loader;
mod scoped;
mod settings;

pub use cache::ConfigCache;
pub use getter::{ConfigGetter, MemoryConfig};
pub use loader::{paths, BackendLoader, OptionLoader};
pub use scoped::{
    ConfigUpdate, ScopedConfig, DEFAULT_EXPIRE, DEFAULT_SIGNING_METHOD, DEFAULT_SKEW,
    DEFAULT_STORE_CODE_FIELD,
};
pub use settings::{Settings, ENV_PREFIX};
