//! Error types for layered-config

use std::path::PathBuf;

use thiserror::Error;

use crate::value::ValueKind;

/// Errors that may occur while resolving or persisting configuration values
#[derive(Error, Debug)]
pub enum ConfigError {
   /// A raw value could not be coerced toward the option's declared kind.
   #[error("option '{option}': cannot coerce {raw:?} to {kind:?}")]
   Coercion {
      option: String,
      raw: String,
      kind: ValueKind,
   },

   /// A literal expression failed to parse. Byte offset is relative to the
   /// start of the literal text (after any triple-quote wrapper is stripped).
   #[error("literal parse error at byte {pos}: {message}")]
   Literal { pos: usize, message: String },

   /// The write-back target file does not exist. Write-back never creates
   /// files; the caller picks an existing target or the synthesized main path.
   #[error("config write target does not exist: {}", path.display())]
   WriteTarget { path: PathBuf },

   /// The write-back target exists but the designated section/key could not
   /// be updated.
   #[error("cannot write '{key}' to section [{section}] of {}: {message}", path.display())]
   WriteBack {
      path: PathBuf,
      section: String,
      key: String,
      message: String,
   },

   /// IO error when reading or writing a configuration file.
   #[error("io error: {0}")]
   Io(#[from] std::io::Error),
}

/// A type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, ConfigError>;
