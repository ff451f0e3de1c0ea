//! Rendezvous table pairing correlation keys with values.
//!
//! The [`CorrelationStore`] is where a reply meets the caller waiting for it.
//! Whichever side shows up first creates the entry:
//!
//! ```text
//! store(k, v) first:   k -> Buffered(v)        find(k) takes it, zero wait
//! find(k, t) first:    k -> Waiting(sender)    store(k, v) hands v over, wakes waiter
//! ```
//!
//! # Guarantees
//!
//! - At most one live entry per key.
//! - A buffered value is returned by exactly one `find`.
//! - `store` and `find` racing on one key never both miss: the value is
//!   either handed to the waiter or buffered, and a waiter whose deadline
//!   passes at the same moment a value arrives still returns the value.
//! - Waiters are removed on hand-off, on timeout and when the `find` future
//!   is dropped.
//! - With a buffer TTL, expired values are never returned or counted, and
//!   `store` sweeps them out at most once per TTL.
//!
//! # Concurrency
//!
//! Keys are spread over independently locked shards, so transitions on one
//! key never wait for unrelated keys on other shards. Locks are only held for
//! map operations, never across an `.await`.
//!
//! # Example
//!
//! ```
//! use syncbridge_runtime::correlation_store::CorrelationStore;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = CorrelationStore::new();
//!
//! store.store("req-1", "OK".to_string());
//! let reply = store.find("req-1", Duration::from_secs(5)).await?;
//!
//! assert_eq!(reply, "OK");
//! assert!(store.is_empty());
//! # Ok(())
//! # }
//! ```

use crate::error::StoreError;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Number of independently locked shards.
const SHARD_COUNT: usize = 16;

/// Deadline used when `now + timeout` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// A single table entry.
enum Slot<T> {
    /// Value waiting to be picked up
    Buffered { value: T, stored_at: Instant },

    /// Caller parked until a value arrives
    Waiting {
        waiter_id: u64,
        sender: oneshot::Sender<T>,
        deadline: Instant,
    },
}

type Shard<T> = HashMap<String, Slot<T>>;

/// Rendezvous table keyed by correlation key.
///
/// Generic over the stored value: producers keep reply messages in it,
/// consumers keep reply destinations.
pub struct CorrelationStore<T> {
    shards: Box<[Mutex<Shard<T>>]>,
    aliases: Mutex<HashMap<String, String>>,
    next_waiter: AtomicU64,
    buffer_ttl: Option<Duration>,
    last_sweep: Mutex<Instant>,
}

impl<T> CorrelationStore<T> {
    /// Create an empty store. Buffered values never expire.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect(),
            aliases: Mutex::new(HashMap::new()),
            next_waiter: AtomicU64::new(1),
            buffer_ttl: None,
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    /// Evict buffered values nobody picked up within `ttl`
    #[must_use]
    pub const fn with_buffer_ttl(mut self, ttl: Duration) -> Self {
        self.buffer_ttl = Some(ttl);
        self
    }

    /// Buffer TTL, if configured
    #[must_use]
    pub const fn buffer_ttl(&self) -> Option<Duration> {
        self.buffer_ttl
    }

    /// Store a value under `key`.
    ///
    /// If a waiter is parked on `key` the value is handed to it directly and
    /// the waiter wakes up. Otherwise the value is buffered. Storing onto an
    /// already buffered key replaces the previous value (last write wins).
    pub fn store(&self, key: impl Into<String>, value: T) {
        if self.sweep_due() {
            self.purge_expired();
        }

        let key = key.into();
        let mut shard = self.lock_shard(&key);

        let value = match shard.remove(&key) {
            Some(Slot::Waiting {
                waiter_id, sender, ..
            }) => match sender.send(value) {
                Ok(()) => {
                    tracing::debug!(key = %key, waiter_id, "Handed value to parked waiter");
                    metrics::counter!("correlation_store_rendezvous_total").increment(1);
                    return;
                }
                // The waiting future was dropped between parking and now
                Err(value) => value,
            },
            Some(Slot::Buffered { .. }) => {
                tracing::warn!(key = %key, "Replacing unconsumed value for correlation key");
                metrics::counter!("correlation_store_overwrites_total").increment(1);
                value
            }
            None => value,
        };

        shard.insert(
            key,
            Slot::Buffered {
                value,
                stored_at: Instant::now(),
            },
        );
        metrics::counter!("correlation_store_buffered_total").increment(1);
    }

    /// Wait up to `timeout` for the value stored under `key`.
    ///
    /// Returns immediately if a value is already buffered. The entry is
    /// removed in every outcome.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Timeout`]: nothing was stored within `timeout`
    /// - [`StoreError::KeyInUse`]: another `find` is already waiting on `key`
    /// - [`StoreError::Discarded`]: the store was cleared while waiting
    pub async fn find(&self, key: &str, timeout: Duration) -> Result<T, StoreError> {
        let started = Instant::now();

        let (waiter_id, mut receiver) = {
            let mut shard = self.lock_shard(key);

            match shard.remove(key) {
                Some(Slot::Buffered { value, stored_at }) if !self.is_expired(stored_at) => {
                    tracing::debug!(key, "Found buffered value");
                    return Ok(value);
                }
                Some(Slot::Buffered { .. }) => {
                    tracing::debug!(key, "Dropped expired buffered value");
                    metrics::counter!("correlation_store_expired_total").increment(1);
                }
                Some(Slot::Waiting {
                    waiter_id,
                    sender,
                    deadline,
                }) if !sender.is_closed() => {
                    shard.insert(
                        key.to_string(),
                        Slot::Waiting {
                            waiter_id,
                            sender,
                            deadline,
                        },
                    );
                    return Err(StoreError::KeyInUse {
                        key: key.to_string(),
                    });
                }
                // Stale waiter whose future is gone
                Some(Slot::Waiting { .. }) | None => {}
            }

            let waiter_id = self.next_waiter.fetch_add(1, Ordering::Relaxed);
            let (sender, receiver) = oneshot::channel();
            shard.insert(
                key.to_string(),
                Slot::Waiting {
                    waiter_id,
                    sender,
                    deadline: deadline_after(started, timeout),
                },
            );
            (waiter_id, receiver)
        };

        let _guard = WaiterGuard {
            store: self,
            key,
            waiter_id,
        };

        let result = match tokio::time::timeout(timeout, &mut receiver).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(StoreError::Discarded {
                key: key.to_string(),
            }),
            Err(_) => {
                self.remove_waiter(key, waiter_id);
                // A store() that won the race against the deadline already
                // handed its value over under the shard lock.
                receiver.try_recv().map_err(|_| {
                    metrics::counter!("correlation_store_timeouts_total").increment(1);
                    StoreError::Timeout {
                        key: key.to_string(),
                        timeout,
                    }
                })
            }
        };

        metrics::histogram!("correlation_store_find_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        result
    }

    /// Remove and return a buffered value without waiting.
    ///
    /// A parked waiter on `key` is left untouched.
    pub fn take(&self, key: &str) -> Option<T> {
        let mut shard = self.lock_shard(key);

        match shard.remove(key) {
            Some(Slot::Buffered { value, stored_at }) if !self.is_expired(stored_at) => Some(value),
            Some(Slot::Buffered { .. }) => None,
            Some(waiting @ Slot::Waiting { .. }) => {
                shard.insert(key.to_string(), waiting);
                None
            }
            None => None,
        }
    }

    /// Remember `key` under a human readable `alias`.
    ///
    /// Used when the real key only becomes known after an earlier step, such
    /// as a generated request id.
    pub fn save_correlation_key(&self, alias: impl Into<String>, key: impl Into<String>) {
        let alias = alias.into();
        let key = key.into();
        tracing::trace!(alias = %alias, key = %key, "Saving correlation key");

        self.aliases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(alias, key);
    }

    /// Key previously saved under `alias`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownAlias`] if nothing was saved under `alias`.
    pub fn correlation_key(&self, alias: &str) -> Result<String, StoreError> {
        self.aliases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(alias)
            .cloned()
            .ok_or_else(|| StoreError::UnknownAlias {
                alias: alias.to_string(),
            })
    }

    /// Evict expired buffered values, returning how many were dropped.
    ///
    /// A no-op without a buffer TTL.
    pub fn purge_expired(&self) -> usize {
        if self.buffer_ttl.is_none() {
            return 0;
        }

        let mut purged = 0;
        for shard in &*self.shards {
            let mut shard = shard.lock().unwrap_or_else(PoisonError::into_inner);
            let before = shard.len();
            shard.retain(|_, slot| self.is_live(slot));
            purged += before - shard.len();
        }

        if purged > 0 {
            tracing::debug!(purged, "Purged expired buffered values");
            metrics::counter!("correlation_store_expired_total").increment(purged as u64);
        }
        purged
    }

    /// Drop every entry. Parked waiters fail with [`StoreError::Discarded`].
    pub fn clear(&self) {
        for shard in &*self.shards {
            shard.lock().unwrap_or_else(PoisonError::into_inner).clear();
        }
        self.aliases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Whether an entry (buffered or waiting) exists for `key`
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.lock_shard(key).contains_key(key)
    }

    /// Number of buffered values, not counting expired ones
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.count(|slot| matches!(slot, Slot::Buffered { .. }))
    }

    /// Number of parked waiters
    #[must_use]
    pub fn waiting_len(&self) -> usize {
        self.count(|slot| matches!(slot, Slot::Waiting { .. }))
    }

    /// Whether the table holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count(|_| true) == 0
    }

    /// Time left for the waiter parked on `key`, if any
    #[must_use]
    pub fn remaining_wait(&self, key: &str) -> Option<Duration> {
        match self.lock_shard(key).get(key) {
            Some(Slot::Waiting { deadline, .. }) => {
                Some(deadline.saturating_duration_since(Instant::now()))
            }
            _ => None,
        }
    }

    fn count(&self, predicate: impl Fn(&Slot<T>) -> bool) -> usize {
        self.shards
            .iter()
            .map(|shard| {
                shard
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .values()
                    .filter(|slot| self.is_live(slot) && predicate(slot))
                    .count()
            })
            .sum()
    }

    fn remove_waiter(&self, key: &str, waiter_id: u64) {
        let mut shard = self.lock_shard(key);
        if matches!(shard.get(key), Some(Slot::Waiting { waiter_id: id, .. }) if *id == waiter_id) {
            shard.remove(key);
        }
    }

    fn is_live(&self, slot: &Slot<T>) -> bool {
        match slot {
            Slot::Buffered { stored_at, .. } => !self.is_expired(*stored_at),
            Slot::Waiting { .. } => true,
        }
    }

    fn sweep_due(&self) -> bool {
        let Some(ttl) = self.buffer_ttl else {
            return false;
        };

        let mut last_sweep = self
            .last_sweep
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if last_sweep.elapsed() < ttl {
            return false;
        }
        *last_sweep = Instant::now();
        true
    }

    fn is_expired(&self, stored_at: Instant) -> bool {
        self.buffer_ttl
            .is_some_and(|ttl| stored_at.elapsed() >= ttl)
    }

    fn lock_shard(&self, key: &str) -> MutexGuard<'_, Shard<T>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        // Note: Truncation is fine, only the low bits pick the shard
        #[allow(clippy::cast_possible_truncation)]
        let index = hasher.finish() as usize % self.shards.len();

        self.shards[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn deadline_after(started: Instant, timeout: Duration) -> Instant {
    started
        .checked_add(timeout)
        .or_else(|| started.checked_add(FAR_FUTURE))
        .unwrap_or(started)
}

impl<T> Default for CorrelationStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for CorrelationStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrelationStore")
            .field("buffered", &self.buffered_len())
            .field("waiting", &self.waiting_len())
            .field("buffer_ttl", &self.buffer_ttl)
            .finish_non_exhaustive()
    }
}

/// Removes a parked waiter when its `find` future goes away early.
struct WaiterGuard<'a, T> {
    store: &'a CorrelationStore<T>,
    key: &'a str,
    waiter_id: u64,
}

impl<T> Drop for WaiterGuard<'_, T> {
    fn drop(&mut self) {
        self.store.remove_waiter(self.key, self.waiter_id);
    }
}
