//! INI-style configuration file parsing.
//!
//! The on-disk format is deliberately small: `[section]` headers,
//! `key = value` lines, full-line `#`/`;` comments, and indented
//! continuation lines that extend the previous value (so triple-quoted
//! literals may span lines). Values are kept raw here; coercion happens at
//! resolution time.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use indexmap::IndexMap;

use crate::error::Result;

/// One parsed configuration file: raw section/key/value text plus the
/// modification timestamp observed at load time.
#[derive(Debug, Clone)]
pub struct ConfigFile {
   path: PathBuf,
   sections: IndexMap<String, IndexMap<String, String>>,
   modified: Option<SystemTime>,
}

impl ConfigFile {
   /// Load and parse a file. IO failures propagate; the caller decides
   /// whether a missing file is fatal (for the cascade it never is).
   pub fn load(path: &Path) -> Result<Self> {
      let text = fs::read_to_string(path)?;
      let modified = fs::metadata(path).and_then(|m| m.modified()).ok();
      Ok(Self {
         path: path.to_path_buf(),
         sections: parse_ini(&text),
         modified,
      })
   }

   pub fn path(&self) -> &Path {
      &self.path
   }

   pub fn modified(&self) -> Option<SystemTime> {
      self.modified
   }

   /// Raw value for `key` in `section`, if present.
   pub fn get(&self, section: &str, key: &str) -> Option<&str> {
      self.sections.get(section)?.get(key).map(String::as_str)
   }

   /// All key/value pairs of one section, in file order.
   pub fn section(&self, section: &str) -> Option<&IndexMap<String, String>> {
      self.sections.get(section)
   }
}

fn parse_ini(text: &str) -> IndexMap<String, IndexMap<String, String>> {
   let mut sections: IndexMap<String, IndexMap<String, String>> = IndexMap::new();
   let mut current_section = String::new();
   let mut current_key: Option<String> = None;

   for line in text.lines() {
      // Indented non-blank lines continue the previous value
      if line.starts_with([' ', '\t']) && !line.trim().is_empty() {
         if let Some(key) = &current_key
            && let Some(section) = sections.get_mut(&current_section)
            && let Some(value) = section.get_mut(key)
         {
            value.push('\n');
            value.push_str(line.trim());
         }
         continue;
      }

      let trimmed = line.trim();
      if trimmed.is_empty() || trimmed.starts_with(['#', ';']) {
         current_key = None;
         continue;
      }

      if let Some(name) = trimmed.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
         current_section = name.trim().to_string();
         sections.entry(current_section.clone()).or_default();
         current_key = None;
         continue;
      }

      if let Some((key, value)) = trimmed.split_once('=') {
         let key = key.trim().to_string();
         let value = value.trim().to_string();
         sections
            .entry(current_section.clone())
            .or_default()
            .insert(key.clone(), value);
         current_key = Some(key);
      }
      // Lines without '=' are ignored; a malformed config line never aborts
      // the cascade.
   }

   sections
}
