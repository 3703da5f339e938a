use std::collections::BTreeMap;
use std::sync::Arc;

use super::{Ecdsa, Hmac, Rsa, RsaPss, Signer};
use crate::error::{Error, Result};

/// Name to signer lookup used for algorithm agility during verification.
///
/// The registry is a plain value; callers own one and hand it to whatever
/// needs to resolve algorithm names.
#[derive(Debug, Clone, Default)]
pub struct SignerRegistry {
    signers: BTreeMap<&'static str, Arc<dyn Signer>>,
}

impl SignerRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in algorithm.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut reg = Self::new();
        for s in [Hmac::HS256, Hmac::HS384, Hmac::HS512] {
            reg.register(Arc::new(s));
        }
        for s in [Rsa::RS256, Rsa::RS384, Rsa::RS512] {
            reg.register(Arc::new(s));
        }
        for s in [RsaPss::PS256, RsaPss::PS384, RsaPss::PS512] {
            reg.register(Arc::new(s));
        }
        for s in [Ecdsa::ES256, Ecdsa::ES384, Ecdsa::ES512] {
            reg.register(Arc::new(s));
        }
        reg
    }

    /// Add or replace the signer for its algorithm name.
    pub fn register(&mut self, signer: Arc<dyn Signer>) -> Option<Arc<dyn Signer>> {
        self.signers.insert(signer.alg(), signer)
    }

    /// Signer registered under `alg`.
    pub fn get(&self, alg: &str) -> Result<Arc<dyn Signer>> {
        self.signers
            .get(alg)
            .cloned()
            .ok_or_else(|| Error::not_supported(format!("signing method {alg:?}")))
    }

    /// Every registered signer, in name order.
    pub fn signers(&self) -> impl Iterator<Item = Arc<dyn Signer>> + '_ {
        self.signers.values().cloned()
    }

    /// Registered algorithm names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.signers.keys().copied().collect()
    }
}
