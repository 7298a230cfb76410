//! Named mutex registry with shared holder accounting.
//!
//! Keys are arbitrary strings (typically a table name plus a primary-key
//! tuple). All handles naming the same key share one primitive and one
//! holder counter, so acquiring through one handle and releasing through
//! another is valid — the registry, not the handle, owns the held guard.
//!
//! The wait for a contended key happens outside the registry's bookkeeping
//! lock. Because a fully-released key is removed from the registry, a waiter
//! that finally acquires the primitive re-validates its registration
//! identity and retries when the entry was drained and re-created while it
//! waited.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

struct KeyEntry {
   primitive: Arc<AsyncMutex<()>>,
   holders: u32,
   // Held by the registry so any handle can release it
   guard: Option<OwnedMutexGuard<()>>,
}

/// Shared registry of named locks.
///
/// Cloning is cheap and every clone observes the same registrations.
/// Registries are constructed explicitly and injected — there is no ambient
/// process-global instance.
#[derive(Clone, Default)]
pub struct LockRegistry {
   inner: Arc<Mutex<HashMap<String, KeyEntry>>>,
}

impl LockRegistry {
   pub fn new() -> Self {
      Self::default()
   }

   /// Acquire `key`, waiting at most `timeout` (forever when `None`).
   ///
   /// Returns `false` only when the timeout elapses. The internal
   /// registration-race retry never surfaces as a failure, only as latency.
   pub async fn acquire(&self, key: &str, timeout: Option<Duration>) -> bool {
      loop {
         let primitive = self.register(key);
         let guard = match timeout {
            Some(limit) => {
               match tokio::time::timeout(limit, primitive.clone().lock_owned()).await {
                  Ok(guard) => guard,
                  Err(_) => {
                     self.unregister_if_unheld(key, &primitive);
                     return false;
                  }
               }
            }
            None => primitive.clone().lock_owned().await,
         };
         if self.commit(key, &primitive, guard) {
            return true;
         }
         // The entry drained to zero and was re-created while we waited;
         // the guard we hold belongs to a dead registration. Retry.
      }
   }

   /// Non-blocking acquire.
   pub fn try_acquire(&self, key: &str) -> bool {
      loop {
         let primitive = self.register(key);
         match primitive.clone().try_lock_owned() {
            Ok(guard) => {
               if self.commit(key, &primitive, guard) {
                  return true;
               }
            }
            Err(_) => {
               self.unregister_if_unheld(key, &primitive);
               return false;
            }
         }
      }
   }

   /// Release one hold on `key`. The last release removes the registration
   /// and unlocks the primitive. Releasing an unknown key is a logged no-op:
   /// mismatched acquire/release counts are a caller bug, not a fault worth
   /// failing an otherwise-healthy operation for.
   pub fn release(&self, key: &str) {
      let held_guard = {
         let mut map = self.lock_map();
         let Some(entry) = map.get_mut(key) else {
            debug!("release of unregistered lock key '{key}' ignored");
            return;
         };
         entry.holders = entry.holders.saturating_sub(1);
         if entry.holders == 0 {
            map.remove(key).and_then(|mut removed| removed.guard.take())
         } else {
            None
         }
      };
      // Dropping the guard outside the bookkeeping lock unlocks the
      // primitive for any waiters.
      drop(held_guard);
   }

   /// Increment the holder count of an already-held key without touching the
   /// primitive. Returns `false` when the key is not registered (it was
   /// fully released in the meantime).
   pub(crate) fn bump(&self, key: &str) -> bool {
      let mut map = self.lock_map();
      match map.get_mut(key) {
         Some(entry) if entry.holders > 0 => {
            entry.holders += 1;
            true
         }
         _ => false,
      }
   }

   /// Current holder count for `key` (0 when unregistered).
   pub fn holder_count(&self, key: &str) -> u32 {
      self.lock_map().get(key).map_or(0, |e| e.holders)
   }

   /// Number of registered keys.
   pub fn len(&self) -> usize {
      self.lock_map().len()
   }

   pub fn is_empty(&self) -> bool {
      self.lock_map().is_empty()
   }

   fn lock_map(&self) -> std::sync::MutexGuard<'_, HashMap<String, KeyEntry>> {
      self.inner.lock().unwrap_or_else(|e| e.into_inner())
   }

   /// Register `key` (or reuse the existing registration) and return its
   /// primitive. Holder count is not touched here — registration and
   /// acquisition are separate steps.
   fn register(&self, key: &str) -> Arc<AsyncMutex<()>> {
      let mut map = self.lock_map();
      let entry = map.entry(key.to_string()).or_insert_with(|| KeyEntry {
         primitive: Arc::new(AsyncMutex::new(())),
         holders: 0,
         guard: None,
      });
      entry.primitive.clone()
   }

   /// After the primitive is acquired, verify the registration identity and
   /// record the hold. Returns `false` (dropping the guard) when the entry
   /// was removed or replaced while the caller waited.
   fn commit(&self, key: &str, primitive: &Arc<AsyncMutex<()>>, guard: OwnedMutexGuard<()>) -> bool {
      let mut map = self.lock_map();
      match map.get_mut(key) {
         Some(entry) if Arc::ptr_eq(&entry.primitive, primitive) => {
            entry.holders += 1;
            entry.guard = Some(guard);
            true
         }
         _ => false,
      }
   }

   /// Drop a zero-holder registration left behind by a failed acquire.
   fn unregister_if_unheld(&self, key: &str, primitive: &Arc<AsyncMutex<()>>) {
      let mut map = self.lock_map();
      if let Some(entry) = map.get(key)
         && entry.holders == 0
         && Arc::ptr_eq(&entry.primitive, primitive)
      {
         map.remove(key);
      }
   }
}

/// A handle over a fixed key set bound to one registry.
///
/// In reentrant mode the handle may re-acquire keys it already holds without
/// blocking; the registry counter tracks total nested holds. Non-reentrant
/// handles block (or time out) even against themselves.
pub struct NamedLocks {
   registry: LockRegistry,
   keys: Vec<String>,
   reentrant: bool,
   // This handle's nesting depth per key (reentrant fast-path bookkeeping)
   depth: Mutex<HashMap<String, u32>>,
}

impl NamedLocks {
   pub fn new<I, S>(registry: &LockRegistry, keys: I, reentrant: bool) -> Self
   where
      I: IntoIterator<Item = S>,
      S: Into<String>,
   {
      Self {
         registry: registry.clone(),
         keys: keys.into_iter().map(Into::into).collect(),
         reentrant,
         depth: Mutex::new(HashMap::new()),
      }
   }

   pub fn keys(&self) -> &[String] {
      &self.keys
   }

   /// Acquire one key, waiting at most `timeout` (forever when `None`).
   pub async fn acquire(&self, key: &str, timeout: Option<Duration>) -> bool {
      if self.reentrant && self.depth_of(key) > 0 && self.registry.bump(key) {
         self.note_acquired(key);
         return true;
      }
      let acquired = self.registry.acquire(key, timeout).await;
      if acquired {
         self.note_acquired(key);
      }
      acquired
   }

   /// Non-blocking acquire of one key.
   pub fn try_acquire(&self, key: &str) -> bool {
      if self.reentrant && self.depth_of(key) > 0 && self.registry.bump(key) {
         self.note_acquired(key);
         return true;
      }
      let acquired = self.registry.try_acquire(key);
      if acquired {
         self.note_acquired(key);
      }
      acquired
   }

   /// Release one hold on `key`, through this handle or any other handle on
   /// the same registry.
   pub fn release(&self, key: &str) {
      self.note_released(key);
      self.registry.release(key);
   }

   /// Acquire every key of this handle in declaration order, waiting as long
   /// as necessary, and return a guard that releases them (in the same
   /// order) when dropped — on every exit path.
   pub async fn acquire_all(&self) -> NamedLocksGuard<'_> {
      for key in &self.keys {
         self.acquire(key, None).await;
      }
      NamedLocksGuard { locks: self }
   }

   fn depth_of(&self, key: &str) -> u32 {
      self.lock_depth().get(key).copied().unwrap_or(0)
   }

   fn note_acquired(&self, key: &str) {
      *self.lock_depth().entry(key.to_string()).or_insert(0) += 1;
   }

   fn note_released(&self, key: &str) {
      let mut depth = self.lock_depth();
      if let Some(count) = depth.get_mut(key) {
         *count -= 1;
         if *count == 0 {
            depth.remove(key);
         }
      }
   }

   fn lock_depth(&self) -> std::sync::MutexGuard<'_, HashMap<String, u32>> {
      self.depth.lock().unwrap_or_else(|e| e.into_inner())
   }
}

/// Scope guard returned by [`NamedLocks::acquire_all`].
#[must_use = "dropping the guard releases the acquired keys"]
pub struct NamedLocksGuard<'a> {
   locks: &'a NamedLocks,
}

impl Drop for NamedLocksGuard<'_> {
   fn drop(&mut self) {
      for key in &self.locks.keys {
         self.locks.release(key);
      }
   }
}
