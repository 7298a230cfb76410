//! # sqlx-upsert
//!
//! Generic database access with race-free insert-or-update semantics.
//!
//! ## Core Types
//!
//! - **[`DbHandle`]**: One connection plus dialect and last-error state
//! - **[`Dialect`]**: Named-placeholder passthrough (SQLite) or `$N`
//!   translation (Postgres) applied just before execution
//! - **[`UpsertOptions`]**: Knobs for the check-then-write protocol
//! - **[`Error`]**: Error type with machine-readable codes
//!
//! ## Architecture
//!
//! - **Named placeholders at the call site**: SQL is written with `:name`
//!   everywhere; the statement layer expands sequence binds into `IN` lists
//!   and adapts placeholders per dialect
//! - **Check-then-write under a named lock**: `upsert` serializes on a lock
//!   key derived from the table and the sorted check values, so two callers
//!   deciding "absent" for the same logical row can never both insert
//! - **Errors mirror to a string**: every operation resets the handle's
//!   `last_error` on entry and records a dsn/operation/SQL description on
//!   failure, alongside the returned typed error

mod error;
mod handle;
mod statement;
mod upsert;
mod value;

pub use error::{Error, Result};
pub use handle::DbHandle;
pub use statement::{Dialect, prepare, rebind};
pub use upsert::{UpsertOptions, lock_key};
pub use value::normalize_col_values;
