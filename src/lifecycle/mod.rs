//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Host starts one process per user action:
//!     argv = [program, plugin URL, handle, ?query, resume:flag]
//!     → invocation.rs (HostInvocation: URL to dispatch, handle)
//!
//! Startup (startup.rs):
//!     Load config (optional file) → Validate → Init logging
//! ```
//!
//! # Design Decisions
//! - Fail fast: a bad config or argv aborts before any dispatch
//! - No shutdown coordination: the host ends the process after one call

pub mod invocation;
pub mod startup;

pub use invocation::{HostInvocation, InvocationError};
pub use startup::startup;
