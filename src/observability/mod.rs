//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Router / Dispatcher produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, histograms through the `metrics` facade)
//!     → tracing.rs (one span per dispatch with a correlation ID)
//!
//! Consumers:
//!     → stderr (host log capture)
//!     → whatever metrics recorder the embedding binary installs
//! ```
//!
//! # Design Decisions
//! - Structured fields everywhere; JSON output is opt-in
//! - No exporter is installed here; without a recorder metric calls are no-ops
//! - Dispatch ID flows through every event of one dispatch

pub mod logging;
pub mod metrics;
pub mod tracing;
