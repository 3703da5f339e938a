//! Per-key request coalescing.
//!
//! While a computation for a key is in flight, later callers for the same
//! key await that computation instead of starting their own. The entry is
//! dropped as soon as the computation completes, so the next caller after
//! completion starts a fresh one.

use std::collections::HashMap;
use std::future::Future;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

struct Call<T> {
    generation: u64,
    future: Shared<BoxFuture<'static, T>>,
}

/// Coalesces concurrent computations by key.
pub struct SingleFlight<T> {
    calls: Mutex<(u64, HashMap<String, Call<T>>)>,
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            calls: Mutex::new((0, HashMap::new())),
        }
    }
}

impl<T> std::fmt::Debug for SingleFlight<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &self.calls.lock().1.len())
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> SingleFlight<T> {
    /// Empty group.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `make()` for `key`, or join the call already in flight.
    ///
    /// Returns the result and whether it came from a call started by
    /// another caller.
    pub async fn run<F, Fut>(&self, key: &str, make: F) -> (T, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (generation, future, shared) = {
            let mut guard = self.calls.lock();
            let (next, calls) = &mut *guard;
            match calls.get(key) {
                Some(call) => (call.generation, call.future.clone(), true),
                None => {
                    *next += 1;
                    let future = make().boxed().shared();
                    calls.insert(
                        key.to_owned(),
                        Call {
                            generation: *next,
                            future: future.clone(),
                        },
                    );
                    (*next, future, false)
                }
            }
        };

        let out = future.await;

        let mut guard = self.calls.lock();
        if guard.1.get(key).is_some_and(|c| c.generation == generation) {
            guard.1.remove(key);
        }
        (out, shared)
    }

    /// Number of keys with a call in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.calls.lock().1.len()
    }

    /// Detach `key`; callers arriving afterwards start a new call.
    pub fn forget(&self, key: &str) {
        self.calls.lock().1.remove(key);
    }
}
