//! Cooperative cross-process lock files.
//!
//! A lock file marks a whole job (not a single row) as in progress, so a
//! second invocation of the same job aborts instead of interleaving. Unlike
//! the in-process registry this survives process boundaries, and therefore
//! also survives crashes: a lock file older than the policy's expiry window
//! is treated as orphaned and taken over. The orphaned file is renamed with
//! a forensic suffix rather than deleted, so the previous run's remains stay
//! inspectable.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::warn;

/// Errors from lock-file acquisition.
#[derive(Error, Debug)]
pub enum LockError {
   /// Another live process holds the lock (its file is younger than the
   /// expiry window). Hard error: the operation must abort.
   #[error("lock file {} is held by another process (age {age_secs}s)", path.display())]
   HeldByOther { path: PathBuf, age_secs: u64 },

   /// IO error while reading, renaming, or writing the lock file.
   #[error("io error: {0}")]
   Io(#[from] std::io::Error),
}

/// Takeover policy for orphaned lock files.
///
/// The expiry window encodes the longest legitimate job runtime; it is a
/// per-call-site parameter, not a constant, because that assumption differs
/// between jobs.
#[derive(Debug, Clone)]
pub struct LockFilePolicy {
   pub expiry: Duration,
}

impl Default for LockFilePolicy {
   fn default() -> Self {
      Self {
         expiry: Duration::from_secs(6 * 3600),
      }
   }
}

/// An acquired lock file. Released explicitly via [`LockFile::release`] or
/// implicitly on drop.
#[derive(Debug)]
pub struct LockFile {
   path: PathBuf,
   released: bool,
}

impl LockFile {
   /// Acquire the lock at `path`.
   ///
   /// An existing file younger than `policy.expiry` is a hard
   /// [`LockError::HeldByOther`]. An older file is considered orphaned: it
   /// is renamed aside for forensics and the lock is taken over.
   pub fn acquire(path: &Path, policy: &LockFilePolicy) -> Result<Self, LockError> {
      match fs::metadata(path) {
         Ok(meta) => {
            let age = meta
               .modified()
               .ok()
               .and_then(|m| SystemTime::now().duration_since(m).ok())
               .unwrap_or_default();
            if age < policy.expiry {
               return Err(LockError::HeldByOther {
                  path: path.to_path_buf(),
                  age_secs: age.as_secs(),
               });
            }
            let aside = stale_path(path);
            fs::rename(path, &aside)?;
            warn!(
               "took over stale lock file {} (age {}s), orphan kept as {}",
               path.display(),
               age.as_secs(),
               aside.display()
            );
         }
         Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
         Err(e) => return Err(e.into()),
      }

      fs::write(path, format!("pid={}\n", std::process::id()))?;
      Ok(Self {
         path: path.to_path_buf(),
         released: false,
      })
   }

   /// Remove the lock file.
   pub fn release(mut self) -> Result<(), LockError> {
      self.released = true;
      fs::remove_file(&self.path)?;
      Ok(())
   }

   pub fn path(&self) -> &Path {
      &self.path
   }
}

impl Drop for LockFile {
   fn drop(&mut self) {
      if !self.released {
         let _ = fs::remove_file(&self.path);
      }
   }
}

fn stale_path(path: &Path) -> PathBuf {
   let epoch_secs = SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .map(|d| d.as_secs())
      .unwrap_or_default();
   let mut name = path.as_os_str().to_os_string();
   name.push(format!(".stale-{epoch_secs}"));
   PathBuf::from(name)
}
