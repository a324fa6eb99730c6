//! Routing error taxonomy.
//!
//! Every error is raised synchronously to the immediate caller of
//! `build_url` or one of the dispatch entry points. The router never retries
//! and never recovers partially; callers decide whether to degrade per entry
//! or abort the whole pass.

use thiserror::Error;

/// Boxed error returned by handler bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by pattern compilation, reverse routing and dispatch.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Malformed pattern or unknown placeholder type tag.
    #[error("Invalid pattern {pattern:?}: {reason}")]
    Pattern { pattern: String, reason: String },

    /// Handler parameter schema is inconsistent.
    #[error("Invalid signature for {handler}: {reason}")]
    InvalidSignature { handler: String, reason: String },

    /// Path substitution or binding references a name the call does not carry.
    #[error("Unknown argument {name:?} for {handler}")]
    UnknownArgument { handler: String, name: String },

    /// Required parameter absent at bind time.
    #[error("Missing argument {name:?} for {handler}")]
    MissingArgument { handler: String, name: String },

    /// Same logical parameter supplied twice.
    #[error("Multiple values for argument {name:?} of {handler}")]
    DuplicateArgument { handler: String, name: String },

    /// Declared-type conversion failed.
    #[error("Argument {name:?} of {handler}: expected {expected}, got {value}")]
    ArgumentType {
        handler: String,
        name: String,
        expected: &'static str,
        value: String,
    },

    /// Excess positional values with no var-positional sink.
    #[error("{handler} takes {expected} positional arguments but {given} were given")]
    TooManyArguments {
        handler: String,
        expected: usize,
        given: usize,
    },

    /// No dotted path could be found for an instance method.
    #[error("Cannot resolve object path for {0}")]
    UnresolvableEndpoint(String),

    /// Safe mode blocked reverse routing to a handler without a declared pattern.
    #[error("URL to {0} is forbidden, endpoint has no declared pattern")]
    ForbiddenEndpoint(String),

    /// Forward dispatch matched nothing and no fallback is configured.
    #[error("No route found for {0:?}")]
    NoRouteFound(String),

    /// The synchronous entry point resolved an asynchronous handler.
    #[error("Handler {0} is asynchronous and cannot run in a synchronous dispatch")]
    AsyncInSyncContext(String),

    /// A function, or a method of the same class, is already registered
    /// under this name.
    #[error("Endpoint {0} is already registered")]
    DuplicateEndpoint(String),

    /// Endpoint id not present in the route table.
    #[error("Unknown endpoint {0}")]
    UnknownEndpoint(String),

    /// Object id not present in the object graph.
    #[error("Unknown object {0}")]
    UnknownObject(String),

    /// Opaque argument bundle could not be decoded.
    #[error("Cannot decode opaque arguments: {0}")]
    OpaqueDecode(String),

    /// URL could not be parsed or assembled.
    #[error("Invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// A blocking dispatch was attempted from inside a running scheduler.
    #[error("Blocking dispatch called from inside a running async runtime")]
    SchedulerActive,

    /// The blocking dispatcher could not start its runtime.
    #[error("Runtime error: {0}")]
    Runtime(#[from] std::io::Error),

    /// The handler body itself failed.
    #[error("Handler {handler} failed: {source}")]
    Handler {
        handler: String,
        #[source]
        source: BoxError,
    },
}

/// Result type for routing operations.
pub type RouterResult<T> = Result<T, RouterError>;

impl RouterError {
    pub(crate) fn pattern(pattern: &str, reason: impl Into<String>) -> Self {
        Self::Pattern {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }

    /// Short stable label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Pattern { .. } => "pattern",
            Self::InvalidSignature { .. } => "invalid_signature",
            Self::DuplicateEndpoint(_) => "duplicate_endpoint",
            Self::UnknownArgument { .. } => "unknown_argument",
            Self::MissingArgument { .. } => "missing_argument",
            Self::DuplicateArgument { .. } => "duplicate_argument",
            Self::ArgumentType { .. } => "argument_type",
            Self::TooManyArguments { .. } => "too_many_arguments",
            Self::UnresolvableEndpoint(_) => "unresolvable_endpoint",
            Self::ForbiddenEndpoint(_) => "forbidden_endpoint",
            Self::NoRouteFound(_) => "no_route_found",
            Self::AsyncInSyncContext(_) => "async_in_sync_context",
            Self::UnknownEndpoint(_) => "unknown_endpoint",
            Self::UnknownObject(_) => "unknown_object",
            Self::OpaqueDecode(_) => "opaque_decode",
            Self::InvalidUrl { .. } => "invalid_url",
            Self::SchedulerActive => "scheduler_active",
            Self::Runtime(_) => "runtime",
            Self::Handler { .. } => "handler",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RouterError::MissingArgument {
            handler: "foo".into(),
            name: "d".into(),
        };
        assert_eq!(err.to_string(), "Missing argument \"d\" for foo");

        let err = RouterError::TooManyArguments {
            handler: "foo".into(),
            expected: 2,
            given: 3,
        };
        assert!(err.to_string().contains("takes 2 positional"));
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(RouterError::SchedulerActive.kind(), "scheduler_active");
        assert_eq!(
            RouterError::NoRouteFound("/x".into()).kind(),
            "no_route_found"
        );
    }
}
