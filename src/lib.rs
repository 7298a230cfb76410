//! # console-app-toolkit
//!
//! A framework for console data-synchronization tools: layered
//! configuration resolution, named process-wide locks, and race-free
//! database upserts, tied together behind one application type.
//!
//! ## Core Types
//!
//! - **[`ConsoleApp`]**: Option declaration, command-line parsing, and
//!   precedence resolution (command line > explicit set > config files >
//!   declared default)
//! - **[`AppRegistry`]**: Environment-id to application map, shared
//!   read-mostly
//! - **[`Output`]**: Severity-prefixed console output with optional
//!   duplication into a rotating log file
//!
//! The member crates are re-exported for direct use: `layered_config` for
//! the store and value model, `named_locks` for the lock registry and lock
//! files, and `sqlx_upsert` for the generic database layer.
//!
//! # Example
//!
//! ```no_run
//! use console_app_toolkit::{ConsoleApp, OptionSpec};
//! use layered_config::ConfigValue;
//!
//! let app = ConsoleApp::new("sync_reservations", Some("PROD"));
//! app.declare(OptionSpec::new("retryCount", ConfigValue::Int(3)).help("Retries per request"));
//! app.parse_args();
//!
//! let retries = app.get_int("retryCount").expect("valid retryCount");
//! let output = app.build_output().expect("output setup");
//! output.info(&format!("starting with {retries} retries"));
//! ```

mod app;
mod cli;
mod error;
mod output;
mod registry;

pub use app::{
   ConsoleApp, DEBUG_LEVEL_OPTION, LOG_FILE_MAX_SIZE_OPTION, LOG_FILE_OPTION, Normalizer,
   OptionSpec,
};
pub use error::{AppError, Result};
pub use output::{ConsoleSink, DebugLevel, Output, OutputSink, RotatingFileSink, TeeSink};
pub use registry::AppRegistry;

pub use layered_config;
pub use named_locks;
pub use sqlx_upsert;
