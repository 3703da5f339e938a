//! HMAC signer bound to one secret with a pool of pre-keyed MAC states.

use std::fmt;

use ::hmac::digest::{FixedOutputReset, KeyInit};
use ::hmac::Mac;
use parking_lot::Mutex;

use super::hmac::{hmac_alg, HmacSha256, HmacSha384, HmacSha512};
use super::{Digest, Signer};
use crate::claims::constant_time_eq;
use crate::error::{Error, Result};
use crate::keys::{Key, REDACTED};

struct MacPool<M> {
    seed: M,
    idle: Mutex<Vec<M>>,
}

impl<M: Mac + KeyInit + FixedOutputReset + Clone> MacPool<M> {
    fn new(secret: &[u8]) -> Result<Self> {
        let seed = <M as KeyInit>::new_from_slice(secret).map_err(|_| Error::not_valid("HMAC secret"))?;
        Ok(Self {
            seed,
            idle: Mutex::new(Vec::new()),
        })
    }

    fn compute(&self, input: &[u8]) -> Vec<u8> {
        let mut mac = self.idle.lock().pop().unwrap_or_else(|| self.seed.clone());
        Mac::update(&mut mac, input);
        let out = mac.finalize_reset().into_bytes().to_vec();
        self.idle.lock().push(mac);
        out
    }

    fn idle(&self) -> usize {
        self.idle.lock().len()
    }
}

enum Pool {
    Sha256(MacPool<HmacSha256>),
    Sha384(MacPool<HmacSha384>),
    Sha512(MacPool<HmacSha512>),
}

/// HMAC signer with its secret fixed at construction.
///
/// The key passed to [`Signer::sign`] and [`Signer::verify`] is ignored.
/// MAC states are checked out of a pool per call and reset before they go
/// back, so the signer can be shared across threads.
pub struct HmacFast {
    digest: Digest,
    pool: Pool,
}

impl HmacFast {
    /// Pooled signer for `digest` keyed with `secret`.
    pub fn new(digest: Digest, secret: &[u8]) -> Result<Self> {
        if secret.is_empty() {
            return Err(Error::not_valid("empty HMAC secret"));
        }
        let pool = match digest {
            Digest::Sha256 => Pool::Sha256(MacPool::new(secret)?),
            Digest::Sha384 => Pool::Sha384(MacPool::new(secret)?),
            Digest::Sha512 => Pool::Sha512(MacPool::new(secret)?),
        };
        Ok(Self { digest, pool })
    }

    /// Pooled signer keyed with the secret held by `key`.
    pub fn with_key(digest: Digest, key: &Key) -> Result<Self> {
        if let Some(err) = key.error() {
            return Err(err.clone());
        }
        match key.hmac_secret() {
            Some(secret) => Self::new(digest, secret),
            None => Err(super::wrong_key(hmac_alg(digest), key)),
        }
    }

    /// Pooled signer for the HMAC algorithm named `alg`.
    pub fn for_alg(alg: &str, key: &Key) -> Result<Self> {
        let digest = match alg {
            "HS256" => Digest::Sha256,
            "HS384" => Digest::Sha384,
            "HS512" => Digest::Sha512,
            other => return Err(Error::not_supported(format!("pooled HMAC for {other:?}"))),
        };
        Self::with_key(digest, key)
    }

    fn compute(&self, input: &[u8]) -> Vec<u8> {
        match &self.pool {
            Pool::Sha256(p) => p.compute(input),
            Pool::Sha384(p) => p.compute(input),
            Pool::Sha512(p) => p.compute(input),
        }
    }

    /// Number of MAC states currently parked in the pool.
    #[must_use]
    pub fn idle(&self) -> usize {
        match &self.pool {
            Pool::Sha256(p) => p.idle(),
            Pool::Sha384(p) => p.idle(),
            Pool::Sha512(p) => p.idle(),
        }
    }
}

impl fmt::Debug for HmacFast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HmacFast")
            .field("alg", &self.alg())
            .field("secret", &REDACTED)
            .finish()
    }
}

impl Signer for HmacFast {
    fn alg(&self) -> &'static str {
        hmac_alg(self.digest)
    }

    fn sign(&self, input: &[u8], _key: &Key) -> Result<Vec<u8>> {
        Ok(self.compute(input))
    }

    fn verify(&self, input: &[u8], signature: &[u8], _key: &Key) -> Result<()> {
        if constant_time_eq(&self.compute(input), signature) {
            Ok(())
        } else {
            Err(Error::SignatureInvalid)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::algorithms::{test_keys, Hmac};
    use crate::error::ErrorKind;

    #[test]
    fn matches_plain_hmac() {
        let key = test_keys::hmac();
        for digest in [Digest::Sha256, Digest::Sha384, Digest::Sha512] {
            let fast = HmacFast::with_key(digest, &key).ok();
            let plain = Hmac::new(digest);
            let a = fast.as_ref().and_then(|f| f.sign(b"input", &Key::empty()).ok());
            let b = plain.sign(b"input", &key).ok();
            assert!(a.is_some());
            assert_eq!(a, b);
        }
    }

    #[test]
    fn state_is_reset_between_calls() {
        let fast = HmacFast::new(Digest::Sha256, b"secret").ok();
        let Some(fast) = fast else { panic!("construct") };
        let first = fast.sign(b"abc", &Key::empty()).unwrap_or_default();
        let second = fast.sign(b"abc", &Key::empty()).unwrap_or_default();
        assert_eq!(first, second);
        assert_eq!(fast.idle(), 1);
        assert!(fast.verify(b"abc", &first, &Key::empty()).is_ok());
        let err = fast.verify(b"abd", &first, &Key::empty()).err();
        assert_eq!(err.map(|e| e.kind()), Some(ErrorKind::SignatureInvalid));
    }

    #[test]
    fn rejects_empty_secret() {
        assert!(HmacFast::new(Digest::Sha512, b"").is_err());
    }

    #[test]
    fn debug_hides_secret() {
        let fast = HmacFast::new(Digest::Sha384, b"hunter2").ok();
        let dbg = format!("{fast:?}");
        assert!(dbg.contains(REDACTED) && !dbg.contains("hunter2"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_use() {
        let fast = match HmacFast::new(Digest::Sha256, b"shared") {
            Ok(f) => Arc::new(f),
            Err(e) => panic!("{e}"),
        };
        let expected = fast.sign(b"payload", &Key::empty()).unwrap_or_default();
        let mut handles = Vec::new();
        for _ in 0..32 {
            let fast = Arc::clone(&fast);
            handles.push(tokio::spawn(async move {
                fast.sign(b"payload", &Key::empty()).unwrap_or_default()
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap_or_default(), expected);
        }
        assert!(fast.idle() >= 1);
    }
}
