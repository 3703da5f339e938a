//! Signing algorithms.
//!
//! Every algorithm is a [`Signer`] identified by its JWS name. Signers are
//! stateless apart from [`HmacFast`], which owns a pool of pre-keyed MAC
//! states. A [`SignerRegistry`] maps names to shared instances so a verifier
//! can pick the algorithm a token announces.

mod ecdsa;
mod hmac;
mod hmac_fast;
mod registry;
mod rsa;

pub use self::ecdsa::Ecdsa;
pub use self::hmac::Hmac;
pub use self::hmac_fast::HmacFast;
pub use self::registry::SignerRegistry;
pub use self::rsa::{Rsa, RsaPss};

use std::fmt;

use crate::error::{Error, Result};
use crate::keys::Key;

/// Digest width shared by the algorithm families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Digest {
    /// SHA-256.
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
}

impl Digest {
    fn suffix(self) -> &'static str {
        match self {
            Digest::Sha256 => "256",
            Digest::Sha384 => "384",
            Digest::Sha512 => "512",
        }
    }
}

/// An algorithm able to sign and verify token signing input.
pub trait Signer: Send + Sync + fmt::Debug {
    /// JWS algorithm name, e.g. `"HS256"`.
    fn alg(&self) -> &'static str;

    /// Signature over `input`.
    fn sign(&self, input: &[u8], key: &Key) -> Result<Vec<u8>>;

    /// Check `signature` against `input`.
    ///
    /// A mismatch is [`Error::SignatureInvalid`]; a key of the wrong class is
    /// [`Error::Unverifiable`].
    fn verify(&self, input: &[u8], signature: &[u8], key: &Key) -> Result<()>;
}

/// Reject keys that carry a construction error or are empty.
pub(crate) fn usable(alg: &str, key: &Key) -> Result<()> {
    if let Some(err) = key.error() {
        return Err(err.clone().with_step("key"));
    }
    if key.is_empty() {
        return Err(Error::unverifiable(format!("{alg} requires a key, got none")));
    }
    Ok(())
}

/// True when `key` holds material of the class `alg` signs with.
pub(crate) fn key_fits(alg: &str, key: &Key) -> bool {
    use crate::keys::Curve;
    let curve = || key.ecdsa_public_key().map(|k| k.curve());
    match alg {
        "HS256" | "HS384" | "HS512" => key.hmac_secret().is_some(),
        "RS256" | "RS384" | "RS512" | "PS256" | "PS384" | "PS512" => key.rsa_public_key().is_some(),
        "ES256" => curve() == Some(Curve::P256),
        "ES384" => curve() == Some(Curve::P384),
        "ES512" => curve() == Some(Curve::P521),
        _ => true,
    }
}

pub(crate) fn wrong_key(alg: &str, key: &Key) -> Error {
    Error::unverifiable(format!("{alg} cannot use a {}", key.kind()))
}

#[cfg(test)]
pub(crate) mod test_keys {
    use once_cell::sync::Lazy;
    use rsa::RsaPrivateKey;

    use crate::keys::{Curve, EcdsaPrivateKey, Key};

    static RSA: Lazy<RsaPrivateKey> = Lazy::new(|| {
        let mut rng = p256::elliptic_curve::rand_core::OsRng;
        #[allow(clippy::expect_used)]
        RsaPrivateKey::new(&mut rng, 2048).expect("rsa keygen")
    });

    pub(crate) fn rsa() -> Key {
        Key::rsa_private(RSA.clone())
    }

    pub(crate) fn rsa_public() -> Key {
        Key::rsa_public(RSA.to_public_key())
    }

    pub(crate) fn ecdsa(curve: Curve) -> Key {
        Key::ecdsa_private(EcdsaPrivateKey::generate(curve))
    }

    pub(crate) fn hmac() -> Key {
        Key::hmac(b"0123456789abcdef0123456789abcdef".to_vec())
    }
}
