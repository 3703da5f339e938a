//! RSA signers: PKCS#1 v1.5 (RS256/384/512) and PSS (PS256/384/512).

use ::rsa::signature::{RandomizedSigner, SignatureEncoding, Signer as _, Verifier};
use ::rsa::{pkcs1v15, pss, RsaPrivateKey, RsaPublicKey};
use p256::elliptic_curve::rand_core::OsRng;
use sha2::{Sha256, Sha384, Sha512};

use super::{usable, wrong_key, Digest, Signer};
use crate::error::{Error, Result};
use crate::keys::Key;

macro_rules! with_digest {
    ($digest:expr, $d:ident => $body:expr) => {
        match $digest {
            Digest::Sha256 => {
                type $d = Sha256;
                $body
            }
            Digest::Sha384 => {
                type $d = Sha384;
                $body
            }
            Digest::Sha512 => {
                type $d = Sha512;
                $body
            }
        }
    };
}

fn private_key<'k>(alg: &str, key: &'k Key) -> Result<&'k RsaPrivateKey> {
    usable(alg, key)?;
    key.rsa_private_key().ok_or_else(|| wrong_key(alg, key))
}

fn public_key(alg: &str, key: &Key) -> Result<RsaPublicKey> {
    usable(alg, key)?;
    key.rsa_public_key().ok_or_else(|| wrong_key(alg, key))
}

/// RSASSA-PKCS1-v1_5 signer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rsa {
    digest: Digest,
}

impl Rsa {
    /// RS256.
    pub const RS256: Self = Self::new(Digest::Sha256);
    /// RS384.
    pub const RS384: Self = Self::new(Digest::Sha384);
    /// RS512.
    pub const RS512: Self = Self::new(Digest::Sha512);

    /// Signer for `digest`.
    #[must_use]
    pub const fn new(digest: Digest) -> Self {
        Self { digest }
    }
}

impl Signer for Rsa {
    fn alg(&self) -> &'static str {
        match self.digest {
            Digest::Sha256 => "RS256",
            Digest::Sha384 => "RS384",
            Digest::Sha512 => "RS512",
        }
    }

    fn sign(&self, input: &[u8], key: &Key) -> Result<Vec<u8>> {
        let private = private_key(self.alg(), key)?;
        with_digest!(self.digest, D => {
            pkcs1v15::SigningKey::<D>::new(private.clone())
                .try_sign(input)
                .map(|sig| sig.to_vec())
                .map_err(|e| Error::internal(format!("{} signing failed ({e})", self.alg())))
        })
    }

    fn verify(&self, input: &[u8], signature: &[u8], key: &Key) -> Result<()> {
        let public = public_key(self.alg(), key)?;
        let signature = pkcs1v15::Signature::try_from(signature).map_err(|_| Error::SignatureInvalid)?;
        with_digest!(self.digest, D => {
            pkcs1v15::VerifyingKey::<D>::new(public)
                .verify(input, &signature)
                .map_err(|_| Error::SignatureInvalid)
        })
    }
}

/// RSASSA-PSS signer with MGF1 over the same digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RsaPss {
    digest: Digest,
}

impl RsaPss {
    /// PS256.
    pub const PS256: Self = Self::new(Digest::Sha256);
    /// PS384.
    pub const PS384: Self = Self::new(Digest::Sha384);
    /// PS512.
    pub const PS512: Self = Self::new(Digest::Sha512);

    /// Signer for `digest`.
    #[must_use]
    pub const fn new(digest: Digest) -> Self {
        Self { digest }
    }
}

impl Signer for RsaPss {
    fn alg(&self) -> &'static str {
        match self.digest {
            Digest::Sha256 => "PS256",
            Digest::Sha384 => "PS384",
            Digest::Sha512 => "PS512",
        }
    }

    fn sign(&self, input: &[u8], key: &Key) -> Result<Vec<u8>> {
        let private = private_key(self.alg(), key)?;
        with_digest!(self.digest, D => {
            pss::BlindedSigningKey::<D>::new(private.clone())
                .try_sign_with_rng(&mut OsRng, input)
                .map(|sig| sig.to_vec())
                .map_err(|e| Error::internal(format!("{} signing failed ({e})", self.alg())))
        })
    }

    fn verify(&self, input: &[u8], signature: &[u8], key: &Key) -> Result<()> {
        let public = public_key(self.alg(), key)?;
        let signature = pss::Signature::try_from(signature).map_err(|_| Error::SignatureInvalid)?;
        with_digest!(self.digest, D => {
            pss::VerifyingKey::<D>::new(public)
                .verify(input, &signature)
                .map_err(|_| Error::SignatureInvalid)
        })
    }
}
