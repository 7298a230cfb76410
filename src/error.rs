//! Error type for the console application framework

use thiserror::Error;

/// Errors surfaced by the framework layer.
///
/// Command-line parse failures normally terminate the process with a usage
/// message before this type is ever seen; [`AppError::Usage`] exists for the
/// non-exiting parse entry point used by tests and embedders.
#[derive(Error, Debug)]
pub enum AppError {
   /// Error from configuration resolution or write-back.
   #[error(transparent)]
   Config(#[from] layered_config::ConfigError),

   /// Error from the generic database layer.
   #[error(transparent)]
   Db(#[from] sqlx_upsert::Error),

   /// Option name that is neither declared nor present in any config file.
   #[error("unknown option '{0}'")]
   UnknownOption(String),

   /// Command-line usage failure (bad arity, unknown flag, disallowed
   /// choice value).
   #[error("{0}")]
   Usage(String),

   /// IO error.
   #[error("io error: {0}")]
   Io(#[from] std::io::Error),
}

/// A type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, AppError>;
