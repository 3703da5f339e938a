//! Token revocation.
//!
//! A [`Blocklist`] remembers identifiers of tokens that must be rejected
//! before their natural expiry: logged-out tokens and single-use tokens that
//! were already presented. [`NullBlocklist`] is the default and remembers
//! nothing; [`MemoryBlocklist`] keeps hashed identifiers in memory.

use std::fmt;
use std::hash::{BuildHasher, BuildHasherDefault, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use tracing::debug;
use twox_hash::XxHash64;

use crate::error::Result;

type IdHasher = BuildHasherDefault<XxHash64>;

static HASHER: Lazy<IdHasher> = Lazy::new(BuildHasherDefault::default);

/// Number of `set` calls between two full sweeps of expired entries.
pub const PURGE_EVERY: u64 = 5;

/// Store of revoked token identifiers.
pub trait Blocklist: Send + Sync + fmt::Debug {
    /// Remember `id` for `ttl`.
    fn set(&self, id: &[u8], ttl: Duration) -> Result<()>;

    /// True while `id` is remembered and its ttl has not elapsed.
    fn has(&self, id: &[u8]) -> bool;

    /// Remember `id` for `ttl` unless it is already remembered.
    ///
    /// Returns false when `id` was present. The default implementation is
    /// not atomic; stores shared between threads should override it.
    fn set_if_absent(&self, id: &[u8], ttl: Duration) -> Result<bool> {
        if self.has(id) {
            return Ok(false);
        }
        self.set(id, ttl)?;
        Ok(true)
    }
}

/// Blocklist that never blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBlocklist;

impl Blocklist for NullBlocklist {
    fn set(&self, _id: &[u8], _ttl: Duration) -> Result<()> {
        Ok(())
    }

    fn has(&self, _id: &[u8]) -> bool {
        false
    }
}

/// In-memory blocklist keyed by the xxhash64 of the identifier.
///
/// Expired entries are dropped when `has` touches them, and every
/// [`PURGE_EVERY`]th `set` sweeps the whole map inline.
pub struct MemoryBlocklist {
    entries: DashMap<u64, Instant, IdHasher>,
    sets: AtomicU64,
}

impl Default for MemoryBlocklist {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBlocklist {
    /// Empty blocklist.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::with_hasher(HASHER.clone()),
            sets: AtomicU64::new(0),
        }
    }

    fn hash(id: &[u8]) -> u64 {
        let mut h = HASHER.build_hasher();
        h.write(id);
        h.finish()
    }

    /// Number of stored entries, expired ones included until purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn count_set(&self) {
        if (self.sets.fetch_add(1, Ordering::Relaxed) + 1) % PURGE_EVERY == 0 {
            self.purge();
        }
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, expires| *expires > now);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "blocklist purged expired entries");
        }
        removed
    }
}

impl fmt::Debug for MemoryBlocklist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBlocklist")
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl Blocklist for MemoryBlocklist {
    fn set(&self, id: &[u8], ttl: Duration) -> Result<()> {
        let expires = Instant::now() + ttl;
        self.entries.insert(Self::hash(id), expires);
        self.count_set();
        Ok(())
    }

    fn set_if_absent(&self, id: &[u8], ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        // The shard lock is released before `count_set` may sweep.
        let inserted = match self.entries.entry(Self::hash(id)) {
            Entry::Occupied(mut e) if *e.get() <= now => {
                e.insert(now + ttl);
                true
            }
            Entry::Occupied(_) => false,
            Entry::Vacant(e) => {
                e.insert(now + ttl);
                true
            }
        };
        if inserted {
            self.count_set();
        }
        Ok(inserted)
    }

    fn has(&self, id: &[u8]) -> bool {
        let key = Self::hash(id);
        let Some(expires) = self.entries.get(&key).map(|e| *e) else {
            return false;
        };
        if expires > Instant::now() {
            return true;
        }
        self.entries.remove_if(&key, |_, e| *e <= Instant::now());
        false
    }
}
