//! Merged configuration store with reload detection and write-back.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use indexmap::IndexMap;
use tracing::debug;

use crate::chain::SourceChain;
use crate::error::{ConfigError, Result};
use crate::source::ConfigFile;
use crate::value::ConfigValue;

/// Default section holding recognized options.
pub const SETTINGS_SECTION: &str = "Settings";

/// A raw value together with the file it was read from.
#[derive(Debug, Clone)]
pub struct SourcedRaw {
   pub raw: String,
   pub source: PathBuf,
}

/// Merged view over a [`SourceChain`]: candidate files are read in order and
/// later files override identically-named keys of the designated section.
///
/// The store records the main file's modification timestamp at load time;
/// [`ConfigStore::is_stale`] reports (and never acts on) on-disk changes —
/// reloading is always an explicit caller decision, and previously resolved
/// option values are not invalidated by it.
#[derive(Debug)]
pub struct ConfigStore {
   chain: SourceChain,
   section: String,
   entries: IndexMap<String, SourcedRaw>,
   main_modified: Option<SystemTime>,
   // Serializes write-backs across threads sharing this store
   write_lock: Mutex<()>,
}

impl ConfigStore {
   /// Load every existing candidate of `chain`. Missing or unreadable files
   /// are skipped silently; resolution falls through to lower-precedence
   /// values in that case.
   pub fn load(chain: SourceChain, section: Option<&str>) -> Self {
      let section = section.unwrap_or(SETTINGS_SECTION).to_string();
      let mut store = Self {
         chain,
         section,
         entries: IndexMap::new(),
         main_modified: None,
         write_lock: Mutex::new(()),
      };
      store.read_chain();
      store
   }

   fn read_chain(&mut self) {
      self.entries.clear();
      for path in self.chain.candidates().to_vec() {
         if !path.is_file() {
            continue;
         }
         let file = match ConfigFile::load(&path) {
            Ok(f) => f,
            Err(e) => {
               debug!("skipping unreadable config file {}: {e}", path.display());
               continue;
            }
         };
         if let Some(keys) = file.section(&self.section) {
            for (key, raw) in keys {
               self.entries.insert(
                  key.clone(),
                  SourcedRaw {
                     raw: raw.clone(),
                     source: path.clone(),
                  },
               );
            }
         }
         if path == self.chain.main_file() {
            self.main_modified = file.modified();
         }
      }
   }

   /// The raw merged value for `name`, if any candidate file defines it.
   pub fn get_raw(&self, name: &str) -> Option<&SourcedRaw> {
      self.entries.get(name)
   }

   /// Names of all keys defined by the chain, in merged order.
   pub fn keys(&self) -> impl Iterator<Item = &str> {
      self.entries.keys().map(String::as_str)
   }

   pub fn main_file(&self) -> &Path {
      self.chain.main_file()
   }

   pub fn section(&self) -> &str {
      &self.section
   }

   /// Whether the main file changed on disk after it was last read.
   /// Reports only; never reloads.
   pub fn is_stale(&self) -> bool {
      let Some(recorded) = self.main_modified else {
         return false;
      };
      match fs::metadata(self.chain.main_file()).and_then(|m| m.modified()) {
         Ok(on_disk) => on_disk > recorded,
         Err(_) => false,
      }
   }

   /// Re-read the full source chain.
   pub fn reload(&mut self) {
      self.read_chain();
   }

   /// Persist one name/value pair into `section` of `file` (both default to
   /// the designated section of the main file). The target must already
   /// exist; a missing target is a descriptive error, never a new file.
   pub fn persist(
      &self,
      name: &str,
      value: &ConfigValue,
      section: Option<&str>,
      file: Option<&Path>,
   ) -> Result<()> {
      let target = file.unwrap_or_else(|| self.chain.main_file());
      let section = section.unwrap_or(&self.section);

      let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

      if !target.is_file() {
         return Err(ConfigError::WriteTarget {
            path: target.to_path_buf(),
         });
      }

      let text = fs::read_to_string(target)?;
      let updated = splice_key(&text, section, name, &value.persist_repr());
      fs::write(target, updated)?;
      Ok(())
   }
}

/// Rewrite `text` so `section` contains `key = value`, replacing an existing
/// assignment (and its continuation lines) in place, appending to the
/// section, or appending a new section at the end.
fn splice_key(text: &str, section: &str, key: &str, value: &str) -> String {
   let assignment = format!("{key} = {value}");
   let mut out: Vec<String> = Vec::new();
   let mut in_target_section = section.is_empty();
   let mut wrote = false;
   let mut skipping_continuation = false;

   for line in text.lines() {
      if skipping_continuation {
         if line.starts_with([' ', '\t']) && !line.trim().is_empty() {
            continue;
         }
         skipping_continuation = false;
      }

      let trimmed = line.trim();
      if let Some(header) = trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
         if in_target_section && !wrote {
            // Leaving the target section without a match: insert before the
            // next header.
            out.push(assignment.clone());
            wrote = true;
         }
         in_target_section = header.trim() == section;
         out.push(line.to_string());
         continue;
      }

      if in_target_section
         && !wrote
         && let Some((k, _)) = trimmed.split_once('=')
         && k.trim() == key
      {
         out.push(assignment.clone());
         wrote = true;
         skipping_continuation = true;
         continue;
      }

      out.push(line.to_string());
   }

   if !wrote {
      if !in_target_section {
         out.push(format!("[{section}]"));
      }
      out.push(assignment);
   }

   let mut joined = out.join("\n");
   joined.push('\n');
   joined
}
