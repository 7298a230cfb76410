//! # layered-config
//!
//! Layered configuration resolution for console applications.
//!
//! ## Core Types
//!
//! - **[`ConfigStore`]**: Merged view over a cascade of configuration files
//! - **[`SourceChain`]**: Cascading file discovery with main-file designation
//! - **[`ConfigValue`]** / **[`ValueKind`]**: Typed option values and coercion
//! - **[`ConfigError`]**: Error type for parsing, coercion, and write-back
//!
//! ## Architecture
//!
//! - **Cascading sources**: Generic directories are read first, more specific
//!   directories and file names override them key-by-key
//! - **Typed coercion**: Raw strings coerce toward a declared kind; structured
//!   values use a safe literal parser instead of evaluation
//! - **Write-back**: A single name/value pair can be persisted into the
//!   designated main file, serialized so it reads back equal

mod chain;
mod error;
mod literal;
mod source;
mod store;
mod value;

pub use chain::SourceChain;
pub use error::{ConfigError, Result};
pub use literal::parse_literal;
pub use source::ConfigFile;
pub use store::{ConfigStore, SourcedRaw};
pub use value::{ConfigValue, ValueKind};
