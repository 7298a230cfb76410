//! Integration tests for the named lock registry: cross-instance
//! accounting, mutual exclusion under real concurrency, and the
//! registration-race retry path.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use named_locks::{LockRegistry, NamedLocks};

// ============================================================================
// Cross-instance accounting
// ============================================================================

#[tokio::test]
async fn acquire_via_one_handle_release_via_another() {
   let registry = LockRegistry::new();
   let a = NamedLocks::new(&registry, ["accounts:A1"], false);
   let b = NamedLocks::new(&registry, ["accounts:A1"], false);

   assert!(a.acquire("accounts:A1", None).await);
   assert_eq!(registry.holder_count("accounts:A1"), 1);

   // Handle b releases what handle a acquired; the registry ends up in the
   // same state as if a had released it itself.
   b.release("accounts:A1");
   assert!(registry.is_empty());

   // And the key is immediately acquirable again
   assert!(b.acquire("accounts:A1", Some(Duration::from_millis(50))).await);
   b.release("accounts:A1");
}

#[tokio::test]
async fn two_handles_on_same_key_share_one_counter() {
   let registry = LockRegistry::new();
   let a = NamedLocks::new(&registry, ["k"], true);
   let b = NamedLocks::new(&registry, ["k"], false);

   assert!(a.acquire("k", None).await);
   assert!(!b.acquire("k", Some(Duration::from_millis(20))).await);

   a.release("k");
   assert!(b.acquire("k", Some(Duration::from_millis(50))).await);
   b.release("k");
   assert!(registry.is_empty());
}

// ============================================================================
// Reentrant accounting
// ============================================================================

#[tokio::test]
async fn reentrant_partial_release_keeps_key_registered() {
   let registry = LockRegistry::new();
   let locks = NamedLocks::new(&registry, ["k"], true);

   for _ in 0..5 {
      assert!(locks.acquire("k", None).await);
   }
   for _ in 0..3 {
      locks.release("k");
   }
   assert_eq!(registry.holder_count("k"), 2);

   locks.release("k");
   locks.release("k");
   assert!(registry.is_empty());
}

// ============================================================================
// Mutual exclusion under concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_key_never_overlaps_across_tasks() {
   let registry = LockRegistry::new();
   let in_section = Arc::new(AtomicU32::new(0));
   let max_seen = Arc::new(AtomicU32::new(0));

   let mut handles = Vec::new();
   for _ in 0..8 {
      let registry = registry.clone();
      let in_section = in_section.clone();
      let max_seen = max_seen.clone();
      handles.push(tokio::spawn(async move {
         for _ in 0..25 {
            assert!(registry.acquire("hot", None).await);
            let now = in_section.fetch_add(1, Ordering::SeqCst) + 1;
            max_seen.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
            in_section.fetch_sub(1, Ordering::SeqCst);
            registry.release("hot");
         }
      }));
   }
   for handle in handles {
      handle.await.unwrap();
   }

   assert_eq!(max_seen.load(Ordering::SeqCst), 1);
   assert!(registry.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn independent_keys_proceed_concurrently() {
   let registry = LockRegistry::new();

   let mut handles = Vec::new();
   for i in 0..4 {
      let registry = registry.clone();
      handles.push(tokio::spawn(async move {
         let key = format!("key-{i}");
         for _ in 0..50 {
            assert!(registry.acquire(&key, Some(Duration::from_secs(5))).await);
            registry.release(&key);
         }
      }));
   }
   for handle in handles {
      handle.await.unwrap();
   }
   assert!(registry.is_empty());
}

// ============================================================================
// Drain/re-create race
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn waiters_survive_full_drain_and_recreate() {
   // Hammer one key with short hold times so waiters regularly observe the
   // entry being removed (holder count draining to zero) and re-created
   // while they were queued on the old primitive.
   let registry = LockRegistry::new();
   let completed = Arc::new(AtomicU32::new(0));

   let mut handles = Vec::new();
   for _ in 0..6 {
      let registry = registry.clone();
      let completed = completed.clone();
      handles.push(tokio::spawn(async move {
         for _ in 0..40 {
            assert!(registry.acquire("churn", None).await);
            registry.release("churn");
            completed.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
         }
      }));
   }
   for handle in handles {
      handle.await.unwrap();
   }

   assert_eq!(completed.load(Ordering::SeqCst), 240);
   assert!(registry.is_empty());
}
