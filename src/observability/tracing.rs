//! Dispatch spans.
//!
//! Every dispatch gets a UUID v4 so the events of one host invocation can be
//! told apart in aggregated logs.

use tracing::Span;
use uuid::Uuid;

/// Span wrapping one dispatch of `url`.
pub fn dispatch_span(url: &str) -> (Uuid, Span) {
    let id = Uuid::new_v4();
    let span = tracing::info_span!("dispatch", dispatch_id = %id, url = %url);
    (id, span)
}
