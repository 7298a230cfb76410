/// Result type alias for database operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for generic database access and upsert orchestration.
#[derive(Debug, thiserror::Error)]
pub enum Error {
   /// Error from SQLx operations.
   #[error(transparent)]
   Sqlx(#[from] sqlx::Error),

   /// A placeholder in the statement has no bound value.
   #[error("missing bind value for placeholder ':{name}'")]
   MissingBind { name: String },

   /// A caller-supplied bind name collides with a name generated by IN-list
   /// expansion.
   #[error("bind name '{name}' collides with an expanded list placeholder")]
   BindCollision { name: String },

   /// Table or column name contains invalid characters.
   ///
   /// Identifiers must match `[a-zA-Z_][a-zA-Z0-9_.]*` (letters, digits,
   /// underscores, and dots for qualified names).
   #[error("invalid identifier '{name}': must match [a-zA-Z_][a-zA-Z0-9_.]*")]
   InvalidIdentifier { name: String },

   /// Column value that cannot be mapped to JSON.
   #[error("unsupported datatype: {0}")]
   UnsupportedDatatype(String),

   /// The existence check matched neither zero nor one row and multi-row
   /// update was not allowed. No write was attempted; whether this is
   /// retryable is the caller's decision.
   #[error("upsert check on '{table}' matched {matches} rows; refusing to write")]
   AmbiguousMatch { table: String, matches: i64 },

   /// The named lock for the upsert key could not be acquired in time.
   #[error("timed out acquiring upsert lock '{key}'")]
   LockTimeout { key: String },

   /// I/O error when accessing database files.
   #[error("io error: {0}")]
   Io(#[from] std::io::Error),
}

impl Error {
   /// Extract a structured error code from the error type.
   ///
   /// This provides machine-readable error codes for error handling.
   pub fn error_code(&self) -> String {
      match self {
         Error::Sqlx(e) => {
            if let Some(code) = e.as_database_error().and_then(|db_err| db_err.code()) {
               return format!("SQLITE_{}", code);
            }
            "SQLX_ERROR".to_string()
         }
         Error::MissingBind { .. } => "MISSING_BIND".to_string(),
         Error::BindCollision { .. } => "BIND_COLLISION".to_string(),
         Error::InvalidIdentifier { .. } => "INVALID_IDENTIFIER".to_string(),
         Error::UnsupportedDatatype(_) => "UNSUPPORTED_DATATYPE".to_string(),
         Error::AmbiguousMatch { .. } => "AMBIGUOUS_MATCH".to_string(),
         Error::LockTimeout { .. } => "LOCK_TIMEOUT".to_string(),
         Error::Io(_) => "IO_ERROR".to_string(),
      }
   }
}
