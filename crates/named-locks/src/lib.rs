//! # named-locks
//!
//! Named, process-wide, optionally-reentrant mutexes.
//!
//! ## Core Types
//!
//! - **[`LockRegistry`]**: Shared registry mapping string keys to mutex
//!   primitives with holder accounting
//! - **[`NamedLocks`]**: A handle over a key set, with scoped acquisition
//! - **[`LockFile`]** / **[`LockFilePolicy`]**: Cooperative cross-process
//!   lock files with stale-lock takeover
//!
//! ## Architecture
//!
//! - **Shared accounting**: All handles naming the same key observe a single
//!   primitive and holder counter; acquiring through one handle and
//!   releasing through another is valid
//! - **No global state**: Registries are constructed explicitly and passed
//!   to the code that needs them, so tests can run isolated registries
//! - **Waits outside the bookkeeping lock**: A slow acquisition on one key
//!   never delays registration on unrelated keys

mod lockfile;
mod registry;

pub use lockfile::{LockError, LockFile, LockFilePolicy};
pub use registry::{LockRegistry, NamedLocks, NamedLocksGuard};
