//! Metrics collection.
//!
//! # Metrics
//! - `router_dispatch_total` (counter): dispatches by outcome
//! - `router_dispatch_duration_seconds` (histogram): resolve + invoke latency
//! - `router_build_url_total` (counter): reverse routing calls by outcome
//! - `router_endpoints` (gauge): endpoints in the table
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; installing an exporter is the
//!   embedding binary's business
//! - Outcome labels are the `RouterError::kind` strings plus `ok`

use std::time::Instant;

/// Outcome label for a result.
pub fn outcome<T>(result: &crate::routing::RouterResult<T>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    }
}

pub fn record_dispatch(outcome: &'static str, started: Instant) {
    metrics::counter!("router_dispatch_total", "outcome" => outcome).increment(1);
    metrics::histogram!("router_dispatch_duration_seconds").record(started.elapsed().as_secs_f64());
}

pub fn record_build_url(outcome: &'static str) {
    metrics::counter!("router_build_url_total", "outcome" => outcome).increment(1);
}

pub fn record_endpoints(count: usize) {
    metrics::gauge!("router_endpoints").set(count as f64);
}
