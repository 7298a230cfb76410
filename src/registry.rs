//! Per-environment application registry.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::app::ConsoleApp;

/// Registry mapping a system environment id to its owning application
/// instance.
///
/// This is read-mostly shared state: entries are written once when an
/// application finishes construction and read thereafter. The registry is
/// constructed explicitly and passed where needed, so tests can run
/// isolated instances side by side.
#[derive(Clone, Default)]
pub struct AppRegistry(Arc<RwLock<HashMap<String, Arc<ConsoleApp>>>>);

impl AppRegistry {
   pub fn new() -> Self {
      Self::default()
   }

   /// Register `app` under `env_id`, replacing any previous registration.
   pub fn register(&self, env_id: &str, app: Arc<ConsoleApp>) {
      let mut map = self.0.write().unwrap_or_else(|e| e.into_inner());
      map.insert(env_id.to_string(), app);
   }

   /// The application owning `env_id`, if registered.
   pub fn get(&self, env_id: &str) -> Option<Arc<ConsoleApp>> {
      let map = self.0.read().unwrap_or_else(|e| e.into_inner());
      map.get(env_id).cloned()
   }

   pub fn len(&self) -> usize {
      self.0.read().unwrap_or_else(|e| e.into_inner()).len()
   }

   pub fn is_empty(&self) -> bool {
      self.len() == 0
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::app::ConsoleApp;
   use layered_config::{ConfigStore, SourceChain};

   fn app(name: &str) -> Arc<ConsoleApp> {
      let store = ConfigStore::load(SourceChain::from_files(vec![]), None);
      Arc::new(ConsoleApp::with_store(name, store))
   }

   #[test]
   fn register_and_lookup() {
      let registry = AppRegistry::new();
      assert!(registry.is_empty());

      registry.register("TEST", app("a"));
      assert_eq!(registry.len(), 1);
      assert!(registry.get("TEST").is_some());
      assert!(registry.get("OTHER").is_none());
   }

   #[test]
   fn isolated_registries_do_not_share_state() {
      let first = AppRegistry::new();
      let second = AppRegistry::new();
      first.register("TEST", app("a"));
      assert!(second.get("TEST").is_none());
   }
}
