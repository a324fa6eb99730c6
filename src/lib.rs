//! Bidirectional URL router for media-center plugins.
//!
//! Handlers are registered with an explicit parameter schema and an optional
//! path pattern. The same router builds URLs from calls (reverse routing) and
//! turns URLs back into calls (forward routing and dispatch).

pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod routing;

pub use config::schema::RouterConfig;
pub use routing::{Router, RouterError, RouterResult};
