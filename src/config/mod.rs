//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! router.toml (optional)
//!     → loader.rs (read & deserialize)
//!     → validation.rs (semantic checks)
//!     → RouterConfig (validated, immutable)
//!     → handed to Router::new / init_logging
//! ```
//!
//! # Design Decisions
//! - Every field has a default so an absent file is a valid configuration
//! - Validation separates syntactic (serde) from semantic checks
//! - One plugin invocation loads the config once; there is no reload

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{ObservabilityConfig, RouterConfig};
pub use validation::ValidationError;
