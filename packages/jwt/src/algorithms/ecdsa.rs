//! ECDSA signers (ES256, ES384, ES512) with fixed-size `r || s` signatures.

use p256::ecdsa::signature::{Signer as _, Verifier};

use super::{usable, wrong_key, Signer};
use crate::error::{Error, Result};
use crate::keys::{Curve, EcdsaPrivateKey, EcdsaPublicKey, Key};

/// ECDSA signer for one curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ecdsa {
    curve: Curve,
}

impl Ecdsa {
    /// ES256 over P-256.
    pub const ES256: Self = Self::new(Curve::P256);
    /// ES384 over P-384.
    pub const ES384: Self = Self::new(Curve::P384);
    /// ES512 over P-521.
    pub const ES512: Self = Self::new(Curve::P521);

    /// Signer for `curve`.
    #[must_use]
    pub const fn new(curve: Curve) -> Self {
        Self { curve }
    }

    /// Signature length in bytes.
    #[must_use]
    pub fn signature_len(&self) -> usize {
        match self.curve {
            Curve::P256 => 64,
            Curve::P384 => 96,
            Curve::P521 => 132,
        }
    }

    fn curve_mismatch(&self, got: Curve) -> Error {
        Error::unverifiable(format!(
            "{} needs a {} key, got {got}",
            self.alg(),
            self.curve
        ))
    }
}

fn failed(alg: &str, e: impl std::fmt::Display) -> Error {
    Error::internal(format!("{alg} signing failed ({e})"))
}

impl Signer for Ecdsa {
    fn alg(&self) -> &'static str {
        match self.curve {
            Curve::P256 => "ES256",
            Curve::P384 => "ES384",
            Curve::P521 => "ES512",
        }
    }

    fn sign(&self, input: &[u8], key: &Key) -> Result<Vec<u8>> {
        usable(self.alg(), key)?;
        let private = key.ecdsa_private_key().ok_or_else(|| wrong_key(self.alg(), key))?;
        if private.curve() != self.curve {
            return Err(self.curve_mismatch(private.curve()));
        }
        match private {
            EcdsaPrivateKey::P256(k) => k
                .try_sign(input)
                .map(|s: p256::ecdsa::Signature| s.to_bytes().to_vec())
                .map_err(|e| failed(self.alg(), e)),
            EcdsaPrivateKey::P384(k) => k
                .try_sign(input)
                .map(|s: p384::ecdsa::Signature| s.to_bytes().to_vec())
                .map_err(|e| failed(self.alg(), e)),
            EcdsaPrivateKey::P521(k) => k
                .try_sign(input)
                .map(|s: p521::ecdsa::Signature| s.to_bytes().to_vec())
                .map_err(|e| failed(self.alg(), e)),
        }
    }

    fn verify(&self, input: &[u8], signature: &[u8], key: &Key) -> Result<()> {
        usable(self.alg(), key)?;
        let public = key.ecdsa_public_key().ok_or_else(|| wrong_key(self.alg(), key))?;
        if public.curve() != self.curve {
            return Err(self.curve_mismatch(public.curve()));
        }
        if signature.len() != self.signature_len() {
            return Err(Error::SignatureInvalid);
        }
        match &public {
            EcdsaPublicKey::P256(k) => p256::ecdsa::Signature::from_slice(signature)
                .map_err(|_| Error::SignatureInvalid)
                .and_then(|s| k.verify(input, &s).map_err(|_| Error::SignatureInvalid)),
            EcdsaPublicKey::P384(k) => p384::ecdsa::Signature::from_slice(signature)
                .map_err(|_| Error::SignatureInvalid)
                .and_then(|s| k.verify(input, &s).map_err(|_| Error::SignatureInvalid)),
            EcdsaPublicKey::P521(k) => p521::ecdsa::Signature::from_slice(signature)
                .map_err(|_| Error::SignatureInvalid)
                .and_then(|s| k.verify(input, &s).map_err(|_| Error::SignatureInvalid)),
        }
    }
}
