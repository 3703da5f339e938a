//! Multi-tenant JSON Web Tokens.
//!
//! Tokens are signed and verified with a policy chosen per configuration
//! scope: a default policy plus optional per-website overrides, loaded
//! lazily from a configuration backend and cached. Concurrent cold loads of
//! the same scope share one backend call.
//!
//! - [`token`] encodes and parses compact JWS tokens.
//! - [`algorithms`] holds the HS, RS, PS and ES signers and their registry.
//! - [`config`] resolves a [`ScopedConfig`] per [`Scope`].
//! - [`Service`] issues, parses and revokes tokens.
//! - [`middleware`] binds tokens to the store and website of a request.
//!
//! ```ignore
//! use scopejwt::{MapClaims, Scope, Service};
//!
//! let service = Service::<MapClaims>::new()?;
//! let claims: MapClaims = [("store", "de".into())].into_iter().collect();
//! let token = service.new_token(Scope::Website(1), &claims).await?;
//! let parsed = service.parse_scoped(Scope::Website(1), &token.raw).await?;
//! assert_eq!(parsed.claim_str("store").as_deref(), Some("de"));
//! ```

pub mod algorithms;
pub mod claims;
pub mod config;
mod error;
pub mod keys;
pub mod middleware;
pub mod revocation;
pub mod scope;
mod service;
pub mod singleflight;
pub mod token;

pub use algorithms::{Signer, SignerRegistry};
pub use claims::{merge_claims, Claimer, MapClaims, StandardClaims, StoreClaims, Validation};
pub use config::{ConfigCache, ConfigUpdate, OptionLoader, ScopedConfig, Settings};
pub use error::{Error, ErrorKind, Result, ResultExt};
pub use keys::Key;
pub use middleware::{WithInitTokenAndStoreLayer, WithRunModeLayer, WithTokenLayer};
pub use revocation::{Blocklist, MemoryBlocklist, NullBlocklist};
pub use scope::{ActiveStore, RequestScope, RunMode, Scope, StoreFinder, StoreService};
pub use service::{Service, ServiceBuilder};
pub use token::{Header, Parser, Token};
