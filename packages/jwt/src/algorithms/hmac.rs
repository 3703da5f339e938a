//! HMAC-SHA signers (HS256, HS384, HS512).

use ::hmac::digest::KeyInit;
use ::hmac::Mac;
use sha2::{Sha256, Sha384, Sha512};

use super::{usable, wrong_key, Digest, Signer};
use crate::claims::constant_time_eq;
use crate::error::{Error, Result};
use crate::keys::Key;

/// HMAC signer keyed per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hmac {
    digest: Digest,
}

impl Hmac {
    /// HS256.
    pub const HS256: Self = Self {
        digest: Digest::Sha256,
    };
    /// HS384.
    pub const HS384: Self = Self {
        digest: Digest::Sha384,
    };
    /// HS512.
    pub const HS512: Self = Self {
        digest: Digest::Sha512,
    };

    /// Signer for `digest`.
    #[must_use]
    pub const fn new(digest: Digest) -> Self {
        Self { digest }
    }
}

pub(super) type HmacSha256 = ::hmac::Hmac<Sha256>;
pub(super) type HmacSha384 = ::hmac::Hmac<Sha384>;
pub(super) type HmacSha512 = ::hmac::Hmac<Sha512>;

fn run<M: Mac + KeyInit>(secret: &[u8], input: &[u8]) -> Result<Vec<u8>> {
    let mut m = <M as KeyInit>::new_from_slice(secret).map_err(|_| Error::not_valid("HMAC secret"))?;
    m.update(input);
    Ok(m.finalize().into_bytes().to_vec())
}

pub(super) fn mac(digest: Digest, secret: &[u8], input: &[u8]) -> Result<Vec<u8>> {
    match digest {
        Digest::Sha256 => run::<HmacSha256>(secret, input),
        Digest::Sha384 => run::<HmacSha384>(secret, input),
        Digest::Sha512 => run::<HmacSha512>(secret, input),
    }
}

pub(super) fn hmac_alg(digest: Digest) -> &'static str {
    match digest {
        Digest::Sha256 => "HS256",
        Digest::Sha384 => "HS384",
        Digest::Sha512 => "HS512",
    }
}

impl Hmac {
    fn secret<'k>(&self, key: &'k Key) -> Result<&'k [u8]> {
        usable(self.alg(), key)?;
        match key.hmac_secret() {
            Some(s) if !s.is_empty() => Ok(s),
            Some(_) => Err(Error::not_valid("empty HMAC secret")),
            None => Err(wrong_key(self.alg(), key)),
        }
    }
}

impl Signer for Hmac {
    fn alg(&self) -> &'static str {
        hmac_alg(self.digest)
    }

    fn sign(&self, input: &[u8], key: &Key) -> Result<Vec<u8>> {
        let secret = self.secret(key)?;
        mac(self.digest, secret, input)
    }

    fn verify(&self, input: &[u8], signature: &[u8], key: &Key) -> Result<()> {
        let secret = self.secret(key)?;
        let expected = mac(self.digest, secret, input)?;
        if constant_time_eq(&expected, signature) {
            Ok(())
        } else {
            Err(Error::SignatureInvalid)
        }
    }
}
