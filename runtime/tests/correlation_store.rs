//! Property and concurrency tests for the correlation store
//!
//! Verifies the rendezvous guarantees under arbitrary interleavings:
//! every stored value reaches exactly one `find`, whichever side arrives
//! first, and the table is left empty afterwards.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use syncbridge_runtime::{CorrelationStore, StoreError};
use syncbridge_testing::properties::distinct_keys;

// ============================================================================
// Test Fixtures
// ============================================================================

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .expect("failed to build test runtime")
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Each stored value is delivered to exactly one lookup, whether the
    /// value or the lookup came first.
    #[test]
    fn prop_every_value_is_delivered_exactly_once(
        keys in distinct_keys(16),
        store_first in prop::collection::vec(any::<bool>(), 16),
    ) {
        runtime().block_on(async {
            let store = Arc::new(CorrelationStore::new());
            let mut waiters = Vec::new();

            for (i, key) in keys.iter().enumerate() {
                if store_first[i] {
                    store.store(key.clone(), i);
                } else {
                    let store = Arc::clone(&store);
                    let key = key.clone();
                    waiters.push((i, tokio::spawn(async move {
                        store.find(&key, Duration::from_secs(10)).await
                    })));
                }
            }
            tokio::time::sleep(Duration::from_millis(1)).await;

            for (i, key) in keys.iter().enumerate() {
                if store_first[i] {
                    assert_eq!(store.find(key, Duration::ZERO).await, Ok(i));
                    assert!(matches!(
                        store.find(key, Duration::ZERO).await,
                        Err(StoreError::Timeout { .. })
                    ));
                } else {
                    store.store(key.clone(), i);
                }
            }

            for (i, waiter) in waiters {
                assert_eq!(waiter.await.unwrap(), Ok(i));
            }
            assert!(store.is_empty());
        });
    }

    /// A lookup without a matching store times out after its full timeout.
    #[test]
    fn prop_timeout_is_never_early(timeout_ms in 1u64..5_000) {
        runtime().block_on(async {
            let store: CorrelationStore<u8> = CorrelationStore::new();
            let timeout = Duration::from_millis(timeout_ms);

            let started = tokio::time::Instant::now();
            let result = store.find("absent", timeout).await;

            assert!(matches!(result, Err(StoreError::Timeout { .. })));
            assert!(started.elapsed() >= timeout);
            assert_eq!(store.waiting_len(), 0);
        });
    }
}

// ============================================================================
// Races
// ============================================================================

/// Stores and lookups racing on real threads never lose a value.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_store_and_find_never_both_miss() {
    let store = Arc::new(CorrelationStore::new());

    let mut handles = Vec::new();
    for i in 0..500_usize {
        let key = format!("key-{i}");

        let finder = {
            let store = Arc::clone(&store);
            let key = key.clone();
            tokio::spawn(async move { store.find(&key, Duration::from_secs(10)).await })
        };
        let storer = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.store(key, i) })
        };
        handles.push((i, finder, storer));
    }

    for (i, finder, storer) in handles {
        storer.await.unwrap();
        assert_eq!(finder.await.unwrap(), Ok(i));
    }
    assert!(store.is_empty());
}

/// Waiters on unrelated keys are woken independently.
#[tokio::test(start_paused = true)]
async fn test_unrelated_keys_do_not_interfere() {
    let store = Arc::new(CorrelationStore::new());

    let slow = {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.find("slow", Duration::from_millis(500)).await })
    };
    let fast = {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.find("fast", Duration::from_secs(10)).await })
    };
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(store.waiting_len(), 2);

    store.store("fast", "ok");
    assert_eq!(fast.await.unwrap(), Ok("ok"));
    assert!(matches!(
        slow.await.unwrap(),
        Err(StoreError::Timeout { .. })
    ));
}
