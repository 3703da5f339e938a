//! Opaque key container.
//!
//! A [`Key`] holds exactly one kind of key material, or the error that
//! occurred while constructing it. Construction from PEM never fails
//! eagerly: the error travels inside the key and surfaces when a signer or
//! a scoped configuration inspects it. Formatting never reveals material.

use std::fmt;
use std::sync::Arc;

use rand::Rng;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use zeroize::Zeroizing;

use crate::error::Error;

/// Placeholder printed instead of key material.
pub const REDACTED: &str = "[redacted]";

/// Default length of generated HMAC secrets.
pub const DEFAULT_HMAC_LEN: usize = 32;

/// NIST curve of an ECDSA key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Curve {
    /// P-256, used by ES256.
    P256,
    /// P-384, used by ES384.
    P384,
    /// P-521, used by ES512.
    P521,
}

impl fmt::Display for Curve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Curve::P256 => "P-256",
            Curve::P384 => "P-384",
            Curve::P521 => "P-521",
        })
    }
}

/// ECDSA signing key on one of the supported curves.
pub enum EcdsaPrivateKey {
    /// P-256 key.
    P256(p256::ecdsa::SigningKey),
    /// P-384 key.
    P384(p384::ecdsa::SigningKey),
    /// P-521 key.
    P521(p521::ecdsa::SigningKey),
}

impl EcdsaPrivateKey {
    /// Generate a random key on `curve`.
    #[must_use]
    pub fn generate(curve: Curve) -> Self {
        use p256::elliptic_curve::rand_core::OsRng;
        match curve {
            Curve::P256 => Self::P256(p256::ecdsa::SigningKey::random(&mut OsRng)),
            Curve::P384 => Self::P384(p384::ecdsa::SigningKey::random(&mut OsRng)),
            Curve::P521 => Self::P521(p521::ecdsa::SigningKey::random(&mut OsRng)),
        }
    }

    /// Curve of this key.
    #[must_use]
    pub fn curve(&self) -> Curve {
        match self {
            Self::P256(_) => Curve::P256,
            Self::P384(_) => Curve::P384,
            Self::P521(_) => Curve::P521,
        }
    }

    /// Matching public key.
    #[must_use]
    pub fn public_key(&self) -> EcdsaPublicKey {
        match self {
            Self::P256(k) => EcdsaPublicKey::P256(k.verifying_key().clone()),
            Self::P384(k) => EcdsaPublicKey::P384(k.verifying_key().clone()),
            Self::P521(k) => EcdsaPublicKey::P521(p521::ecdsa::VerifyingKey::from(k)),
        }
    }

    /// Parse a PKCS#8 or SEC1 PEM private key, trying each curve in turn.
    pub fn from_pem(pem: &str) -> Result<Self, Error> {
        if let Ok(k) = p256::SecretKey::from_pkcs8_pem(pem).or_else(|_| p256::SecretKey::from_sec1_pem(pem)) {
            return Ok(Self::P256(k.into()));
        }
        if let Ok(k) = p384::SecretKey::from_pkcs8_pem(pem).or_else(|_| p384::SecretKey::from_sec1_pem(pem)) {
            return Ok(Self::P384(k.into()));
        }
        if let Ok(k) = p521::SecretKey::from_pkcs8_pem(pem).or_else(|_| p521::SecretKey::from_sec1_pem(pem)) {
            let signing = p521::ecdsa::SigningKey::from_bytes(&k.to_bytes())
                .map_err(|e| Error::not_valid(format!("ECDSA P-521 private key ({e})")))?;
            return Ok(Self::P521(signing));
        }
        Err(Error::not_valid("ECDSA private key PEM"))
    }
}

/// ECDSA verifying key on one of the supported curves.
#[derive(Clone)]
pub enum EcdsaPublicKey {
    /// P-256 key.
    P256(p256::ecdsa::VerifyingKey),
    /// P-384 key.
    P384(p384::ecdsa::VerifyingKey),
    /// P-521 key.
    P521(p521::ecdsa::VerifyingKey),
}

impl EcdsaPublicKey {
    /// Curve of this key.
    #[must_use]
    pub fn curve(&self) -> Curve {
        match self {
            Self::P256(_) => Curve::P256,
            Self::P384(_) => Curve::P384,
            Self::P521(_) => Curve::P521,
        }
    }

    /// Parse an SPKI PEM public key, trying each curve in turn.
    pub fn from_pem(pem: &str) -> Result<Self, Error> {
        if let Ok(k) = p256::PublicKey::from_public_key_pem(pem) {
            return Ok(Self::P256(k.into()));
        }
        if let Ok(k) = p384::PublicKey::from_public_key_pem(pem) {
            return Ok(Self::P384(k.into()));
        }
        if let Ok(k) = p521::PublicKey::from_public_key_pem(pem) {
            let verifying = p521::ecdsa::VerifyingKey::from_sec1_bytes(&k.to_sec1_bytes())
                .map_err(|e| Error::not_valid(format!("ECDSA P-521 public key ({e})")))?;
            return Ok(Self::P521(verifying));
        }
        Err(Error::not_valid("ECDSA public key PEM"))
    }
}

#[derive(Clone)]
enum Material {
    Empty,
    Hmac(Arc<Zeroizing<Vec<u8>>>),
    RsaPublic(Arc<RsaPublicKey>),
    RsaPrivate(Arc<RsaPrivateKey>),
    EcdsaPublic(Arc<EcdsaPublicKey>),
    EcdsaPrivate(Arc<EcdsaPrivateKey>),
    Failed(Error),
}

/// Key material used by signers.
///
/// Cloning is cheap; material is reference counted.
#[derive(Clone)]
pub struct Key {
    material: Material,
}

impl Default for Key {
    fn default() -> Self {
        Self::empty()
    }
}

impl Key {
    /// Key without material.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            material: Material::Empty,
        }
    }

    fn failed(err: Error) -> Self {
        Self {
            material: Material::Failed(err),
        }
    }

    /// HMAC secret. An empty secret yields a key carrying an error.
    #[must_use]
    pub fn hmac(secret: impl Into<Vec<u8>>) -> Self {
        let secret = secret.into();
        if secret.is_empty() {
            return Self::failed(Error::not_valid("empty HMAC secret"));
        }
        Self {
            material: Material::Hmac(Arc::new(Zeroizing::new(secret))),
        }
    }

    /// Random HMAC secret of `len` bytes.
    #[must_use]
    pub fn random_hmac(len: usize) -> Self {
        let mut secret = vec![0u8; len.max(1)];
        rand::rng().fill(secret.as_mut_slice());
        Self::hmac(secret)
    }

    /// RSA public key.
    #[must_use]
    pub fn rsa_public(key: RsaPublicKey) -> Self {
        Self {
            material: Material::RsaPublic(Arc::new(key)),
        }
    }

    /// RSA private key.
    #[must_use]
    pub fn rsa_private(key: RsaPrivateKey) -> Self {
        Self {
            material: Material::RsaPrivate(Arc::new(key)),
        }
    }

    /// RSA public key from SPKI or PKCS#1 PEM.
    #[must_use]
    pub fn rsa_public_pem(pem: &str) -> Self {
        match RsaPublicKey::from_public_key_pem(pem)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        {
            Ok(k) => Self::rsa_public(k),
            Err(e) => Self::failed(Error::not_valid(format!("RSA public key PEM ({e})"))),
        }
    }

    /// RSA private key from PKCS#8 or PKCS#1 PEM.
    #[must_use]
    pub fn rsa_private_pem(pem: &str) -> Self {
        match RsaPrivateKey::from_pkcs8_pem(pem).or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem)) {
            Ok(k) => Self::rsa_private(k),
            Err(e) => Self::failed(Error::not_valid(format!("RSA private key PEM ({e})"))),
        }
    }

    /// ECDSA public key.
    #[must_use]
    pub fn ecdsa_public(key: impl Into<EcdsaPublicKey>) -> Self {
        Self {
            material: Material::EcdsaPublic(Arc::new(key.into())),
        }
    }

    /// ECDSA private key.
    #[must_use]
    pub fn ecdsa_private(key: impl Into<EcdsaPrivateKey>) -> Self {
        Self {
            material: Material::EcdsaPrivate(Arc::new(key.into())),
        }
    }

    /// ECDSA public key from SPKI PEM.
    #[must_use]
    pub fn ecdsa_public_pem(pem: &str) -> Self {
        EcdsaPublicKey::from_pem(pem).map_or_else(Self::failed, Self::ecdsa_public)
    }

    /// ECDSA private key from PKCS#8 or SEC1 PEM.
    #[must_use]
    pub fn ecdsa_private_pem(pem: &str) -> Self {
        EcdsaPrivateKey::from_pem(pem).map_or_else(Self::failed, Self::ecdsa_private)
    }

    /// Error recorded while constructing the key.
    #[must_use]
    pub fn error(&self) -> Option<&Error> {
        match &self.material {
            Material::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// True when the key carries no material and no error.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self.material, Material::Empty)
    }

    /// Human readable kind, safe to log.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match &self.material {
            Material::Empty => "empty",
            Material::Hmac(_) => "HMAC secret",
            Material::RsaPublic(_) => "RSA public key",
            Material::RsaPrivate(_) => "RSA private key",
            Material::EcdsaPublic(_) => "ECDSA public key",
            Material::EcdsaPrivate(_) => "ECDSA private key",
            Material::Failed(_) => "failed key",
        }
    }

    /// HMAC secret bytes.
    pub(crate) fn hmac_secret(&self) -> Option<&[u8]> {
        match &self.material {
            Material::Hmac(s) => Some(s.as_slice()),
            _ => None,
        }
    }

    pub(crate) fn rsa_private_key(&self) -> Option<&RsaPrivateKey> {
        match &self.material {
            Material::RsaPrivate(k) => Some(k),
            _ => None,
        }
    }

    /// Public half, derived from the private key when needed.
    pub(crate) fn rsa_public_key(&self) -> Option<RsaPublicKey> {
        match &self.material {
            Material::RsaPublic(k) => Some(RsaPublicKey::clone(k)),
            Material::RsaPrivate(k) => Some(k.to_public_key()),
            _ => None,
        }
    }

    pub(crate) fn ecdsa_private_key(&self) -> Option<&EcdsaPrivateKey> {
        match &self.material {
            Material::EcdsaPrivate(k) => Some(k),
            _ => None,
        }
    }

    pub(crate) fn ecdsa_public_key(&self) -> Option<EcdsaPublicKey> {
        match &self.material {
            Material::EcdsaPublic(k) => Some(EcdsaPublicKey::clone(k)),
            Material::EcdsaPrivate(k) => Some(k.public_key()),
            _ => None,
        }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.material {
            Material::Failed(e) => f.debug_struct("Key").field("error", e).finish(),
            _ => f
                .debug_struct("Key")
                .field("kind", &self.kind())
                .field("material", &REDACTED)
                .finish(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {REDACTED}", self.kind())
    }
}

impl fmt::Debug for EcdsaPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EcdsaPrivateKey({}, {REDACTED})", self.curve())
    }
}

impl fmt::Debug for EcdsaPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EcdsaPublicKey({}, {REDACTED})", self.curve())
    }
}

impl From<p256::ecdsa::SigningKey> for EcdsaPrivateKey {
    fn from(k: p256::ecdsa::SigningKey) -> Self {
        Self::P256(k)
    }
}

impl From<p384::ecdsa::SigningKey> for EcdsaPrivateKey {
    fn from(k: p384::ecdsa::SigningKey) -> Self {
        Self::P384(k)
    }
}

impl From<p521::ecdsa::SigningKey> for EcdsaPrivateKey {
    fn from(k: p521::ecdsa::SigningKey) -> Self {
        Self::P521(k)
    }
}

impl From<p256::ecdsa::VerifyingKey> for EcdsaPublicKey {
    fn from(k: p256::ecdsa::VerifyingKey) -> Self {
        Self::P256(k)
    }
}

impl From<p384::ecdsa::VerifyingKey> for EcdsaPublicKey {
    fn from(k: p384::ecdsa::VerifyingKey) -> Self {
        Self::P384(k)
    }
}

impl From<p521::ecdsa::VerifyingKey> for EcdsaPublicKey {
    fn from(k: p521::ecdsa::VerifyingKey) -> Self {
        Self::P521(k)
    }
}
