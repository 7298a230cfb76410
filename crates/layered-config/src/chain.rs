//! Cascading configuration source discovery.
//!
//! Candidate files are ordered most-general to most-specific; the store
//! reads them in order and lets later files override identically-named keys.
//! Exactly one candidate is designated the *main* file — the first
//! `.ini`-suffixed candidate that exists — and write-backs target it. When
//! no `.ini` candidate exists on disk, a default path next to the
//! application is synthesized so write-backs still have a target.

use std::path::{Path, PathBuf};

/// Conventional per-directory file names, in override order (generic first).
const DIR_FILE_NAMES: [&str; 2] = [".console_app_env.cfg", ".sys_env.cfg"];

/// The ordered candidate list plus the designated main file.
#[derive(Debug, Clone)]
pub struct SourceChain {
   candidates: Vec<PathBuf>,
   main_file: PathBuf,
}

impl SourceChain {
   /// Discover candidates for an application.
   ///
   /// `app_path` is the application binary/script path (its directory and
   /// stem feed the per-app candidates), `env_id` selects the optional
   /// `.sys_env<ID>.cfg` variant, `cwd` anchors the directory cascade, and
   /// `extra_files` are appended last so they override everything else.
   pub fn discover(
      app_path: &Path,
      env_id: Option<&str>,
      cwd: &Path,
      extra_files: &[PathBuf],
   ) -> Self {
      let app_dir = app_path.parent().unwrap_or(Path::new("."));
      let app_name = app_path
         .file_stem()
         .map(|s| s.to_string_lossy().into_owned())
         .unwrap_or_else(|| "app".to_string());

      let parent = cwd.parent();
      let grandparent = parent.and_then(Path::parent);

      let mut candidates = Vec::new();
      let dirs = [grandparent, Some(app_dir), parent, Some(cwd)];
      for dir in dirs.into_iter().flatten() {
         candidates.push(dir.join(DIR_FILE_NAMES[0]));
         if let Some(id) = env_id {
            candidates.push(dir.join(format!(".sys_env{id}.cfg")));
         }
         candidates.push(dir.join(DIR_FILE_NAMES[1]));
      }

      candidates.push(app_path.with_extension("cfg"));
      candidates.push(app_path.with_extension("ini"));
      candidates.push(cwd.join(format!("{app_name}.cfg")));
      candidates.push(cwd.join(format!("{app_name}.ini")));
      candidates.extend(extra_files.iter().cloned());

      let main_file = candidates
         .iter()
         .find(|p| p.extension().is_some_and(|e| e == "ini") && p.is_file())
         .cloned()
         .unwrap_or_else(|| app_dir.join(format!("{app_name}.ini")));

      Self {
         candidates,
         main_file,
      }
   }

   /// A chain over an explicit file list; the first `.ini` entry (or the
   /// first entry) becomes the main file. Used by tests and by callers that
   /// bypass discovery.
   pub fn from_files(files: Vec<PathBuf>) -> Self {
      let main_file = files
         .iter()
         .find(|p| p.extension().is_some_and(|e| e == "ini"))
         .or_else(|| files.first())
         .cloned()
         .unwrap_or_else(|| PathBuf::from("app.ini"));
      Self {
         candidates: files,
         main_file,
      }
   }

   /// All candidate paths in read order. Candidates need not exist.
   pub fn candidates(&self) -> &[PathBuf] {
      &self.candidates
   }

   /// The designated write-back target.
   pub fn main_file(&self) -> &Path {
      &self.main_file
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use std::fs;

   #[test]
   fn discovery_orders_generic_before_specific() {
      let temp = tempfile::tempdir().unwrap();
      let cwd = temp.path().join("a/b/c");
      fs::create_dir_all(&cwd).unwrap();
      let app_path = temp.path().join("tools/sync");

      let chain = SourceChain::discover(&app_path, Some("TEST"), &cwd, &[]);
      let candidates = chain.candidates();

      // Grandparent dir comes first, cwd-specific names come last
      assert_eq!(
         candidates[0],
         temp.path().join("a").join(".console_app_env.cfg")
      );
      assert!(candidates.contains(&cwd.join(".sys_envTEST.cfg")));
      let last = candidates.last().unwrap();
      assert_eq!(*last, cwd.join("sync.ini"));
   }

   #[test]
   fn main_file_is_first_existing_ini() {
      let temp = tempfile::tempdir().unwrap();
      let cwd = temp.path().join("wd");
      fs::create_dir_all(&cwd).unwrap();
      let app_path = temp.path().join("sync");
      let app_ini = temp.path().join("sync.ini");
      fs::write(&app_ini, "[Settings]\n").unwrap();

      let chain = SourceChain::discover(&app_path, None, &cwd, &[]);
      assert_eq!(chain.main_file(), app_ini);
   }

   #[test]
   fn main_file_is_synthesized_when_no_ini_exists() {
      let temp = tempfile::tempdir().unwrap();
      let cwd = temp.path().join("wd");
      fs::create_dir_all(&cwd).unwrap();
      let app_path = temp.path().join("tools/sync");

      let chain = SourceChain::discover(&app_path, None, &cwd, &[]);
      assert_eq!(chain.main_file(), temp.path().join("tools/sync.ini"));
   }

   #[test]
   fn extra_files_come_last() {
      let temp = tempfile::tempdir().unwrap();
      let cwd = temp.path().to_path_buf();
      let extra = temp.path().join("override.cfg");

      let chain = SourceChain::discover(Path::new("app"), None, &cwd, &[extra.clone()]);
      assert_eq!(chain.candidates().last().unwrap(), &extra);
   }
}
