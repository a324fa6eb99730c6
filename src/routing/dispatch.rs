//! Dispatcher: invoke resolved calls.
//!
//! # Responsibilities
//! - Run a resolved call synchronously or on a cooperative scheduler
//! - Apply root/missing fallbacks chosen per call
//! - Log each lifecycle transition and record dispatch metrics
//!
//! # Design Decisions
//! - Three explicit entry points instead of probing the execution context:
//!   `sync_dispatch`, `async_dispatch` and `dispatch_blocking`
//! - `dispatch_blocking` refuses to nest inside a running runtime rather
//!   than panicking
//! - Nothing survives between dispatches; each one loads its own table
//!   snapshot

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::Instrument;

use crate::observability::metrics;
use crate::observability::tracing::dispatch_span;
use crate::routing::args::Value;
use crate::routing::endpoint::{Endpoint, EndpointId, Handler, Invocation};
use crate::routing::error::{RouterError, RouterResult};
use crate::routing::router::Router;

/// Which fallback served a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackKind {
    Root,
    Missing,
}

/// Router lifecycle as seen by one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPhase {
    Uninitialized,
    Ready,
    Resolving,
    Invoking,
    Fallback(FallbackKind),
    Done,
    Error,
}

impl fmt::Display for DispatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Ready => write!(f, "ready"),
            Self::Resolving => write!(f, "resolving"),
            Self::Invoking => write!(f, "invoking"),
            Self::Fallback(FallbackKind::Root) => write!(f, "fallback(root)"),
            Self::Fallback(FallbackKind::Missing) => write!(f, "fallback(missing)"),
            Self::Done => write!(f, "done"),
            Self::Error => write!(f, "error"),
        }
    }
}

fn enter(phase: DispatchPhase) {
    tracing::trace!(%phase, "Dispatch phase");
}

/// Per-call fallback overrides; unset fields use the router defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Fallbacks {
    pub root: Option<EndpointId>,
    pub missing: Option<EndpointId>,
}

impl Fallbacks {
    pub fn root(mut self, endpoint: EndpointId) -> Self {
        self.root = Some(endpoint);
        self
    }

    pub fn missing(mut self, endpoint: EndpointId) -> Self {
        self.missing = Some(endpoint);
        self
    }
}

/// Handler plus bound arguments, ready to run.
#[derive(Debug, Clone)]
pub struct ResolvedCall {
    pub endpoint: Arc<Endpoint>,
    pub invocation: Invocation,
    pub fallback: Option<FallbackKind>,
}

impl ResolvedCall {
    pub fn is_async(&self) -> bool {
        self.endpoint.spec.handler.is_async()
    }

    /// Run a synchronous handler.
    pub fn invoke_sync(self) -> RouterResult<Value> {
        let name = self.endpoint.qualified_name();
        match &self.endpoint.spec.handler {
            Handler::Sync(f) => f(self.invocation).map_err(|source| RouterError::Handler {
                handler: name,
                source,
            }),
            Handler::Async(_) => Err(RouterError::AsyncInSyncContext(name)),
        }
    }

    /// Run either kind of handler, awaiting asynchronous ones.
    pub async fn invoke(self) -> RouterResult<Value> {
        let name = self.endpoint.qualified_name();
        let result = match &self.endpoint.spec.handler {
            Handler::Sync(f) => f(self.invocation),
            Handler::Async(f) => f(self.invocation).await,
        };
        result.map_err(|source| RouterError::Handler {
            handler: name,
            source,
        })
    }
}

impl Router {
    fn resolve_logged(&self, url: &str, fallbacks: &Fallbacks) -> RouterResult<ResolvedCall> {
        enter(DispatchPhase::Resolving);
        let call = self.resolve(url, fallbacks)?;
        match call.fallback {
            Some(kind) => {
                enter(DispatchPhase::Fallback(kind));
                tracing::info!(
                    handler = %call.endpoint.qualified_name(),
                    fallback = ?kind,
                    "Dispatching to fallback"
                );
            }
            None => enter(DispatchPhase::Invoking),
        }
        tracing::debug!(
            handler = %call.endpoint.qualified_name(),
            args = call.invocation.args.len(),
            kwargs = call.invocation.kwargs.len(),
            "Call resolved"
        );
        Ok(call)
    }

    fn finish(&self, result: RouterResult<Value>, started: Instant) -> RouterResult<Value> {
        metrics::record_dispatch(metrics::outcome(&result), started);
        match &result {
            Ok(_) => {
                enter(DispatchPhase::Done);
                tracing::debug!(elapsed = ?started.elapsed(), "Dispatch finished");
            }
            Err(e) => {
                enter(DispatchPhase::Error);
                tracing::warn!(error = %e, kind = e.kind(), "Dispatch failed");
            }
        }
        result
    }

    /// Resolve and run `url`; asynchronous handlers are refused.
    pub fn sync_dispatch(&self, url: &str) -> RouterResult<Value> {
        self.sync_dispatch_with(url, &Fallbacks::default())
    }

    pub fn sync_dispatch_with(&self, url: &str, fallbacks: &Fallbacks) -> RouterResult<Value> {
        let (_, span) = dispatch_span(url);
        let _guard = span.enter();
        let started = Instant::now();
        let result = self.resolve_logged(url, fallbacks).and_then(ResolvedCall::invoke_sync);
        self.finish(result, started)
    }

    /// Resolve and run `url`, awaiting the handler when it is asynchronous.
    pub async fn async_dispatch(&self, url: &str) -> RouterResult<Value> {
        self.async_dispatch_with(url, &Fallbacks::default()).await
    }

    pub async fn async_dispatch_with(
        &self,
        url: &str,
        fallbacks: &Fallbacks,
    ) -> RouterResult<Value> {
        let (_, span) = dispatch_span(url);
        async move {
            let started = Instant::now();
            let result = match self.resolve_logged(url, fallbacks) {
                Ok(call) => call.invoke().await,
                Err(e) => Err(e),
            };
            self.finish(result, started)
        }
        .instrument(span)
        .await
    }

    /// Drive `async_dispatch` to completion on a fresh current-thread
    /// runtime.
    ///
    /// Fails with `SchedulerActive` when called from inside a runtime; use
    /// `async_dispatch` there.
    pub fn dispatch_blocking(&self, url: &str) -> RouterResult<Value> {
        self.dispatch_blocking_with(url, &Fallbacks::default())
    }

    pub fn dispatch_blocking_with(&self, url: &str, fallbacks: &Fallbacks) -> RouterResult<Value> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(RouterError::SchedulerActive);
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.async_dispatch_with(url, fallbacks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouterConfig;
    use crate::routing::args::Signature;
    use crate::routing::endpoint::{EndpointMeta, HandlerSpec};
    use serde_json::json;

    fn router() -> (Router, EndpointId, EndpointId) {
        let router = Router::new(RouterConfig::default());
        let sync = router
            .register(
                Some("/sync"),
                HandlerSpec::function(
                    "sync",
                    Signature::empty(),
                    Handler::sync(|_| Ok(json!("s"))),
                ),
                EndpointMeta::default(),
            )
            .unwrap();
        let asynchronous = router
            .register(
                Some("/async"),
                HandlerSpec::function(
                    "later",
                    Signature::empty(),
                    Handler::asynchronous(|_| async {
                        tokio::task::yield_now().await;
                        Ok(json!("a"))
                    }),
                ),
                EndpointMeta::default(),
            )
            .unwrap();
        (router, sync, asynchronous)
    }

    #[test]
    fn test_sync_dispatch_refuses_async_handler() {
        let (router, _, _) = router();
        assert_eq!(router.sync_dispatch("/sync").unwrap(), json!("s"));
        assert!(matches!(
            router.sync_dispatch("/async"),
            Err(RouterError::AsyncInSyncContext(name)) if name == "later"
        ));
    }

    #[tokio::test]
    async fn test_async_dispatch_runs_both_kinds() {
        let (router, _, _) = router();
        assert_eq!(router.async_dispatch("/sync").await.unwrap(), json!("s"));
        assert_eq!(router.async_dispatch("/async").await.unwrap(), json!("a"));
    }

    #[test]
    fn test_dispatch_blocking() {
        let (router, _, _) = router();
        assert_eq!(router.dispatch_blocking("/async").unwrap(), json!("a"));
    }

    #[tokio::test]
    async fn test_dispatch_blocking_inside_runtime() {
        let (router, _, _) = router();
        assert!(matches!(
            router.dispatch_blocking("/sync"),
            Err(RouterError::SchedulerActive)
        ));
    }

    #[test]
    fn test_handler_error_is_wrapped() {
        let router = Router::new(RouterConfig::default());
        router
            .register(
                Some("/boom"),
                HandlerSpec::function(
                    "boom",
                    Signature::empty(),
                    Handler::sync(|_| Err("kaput".into())),
                ),
                EndpointMeta::default(),
            )
            .unwrap();
        match router.sync_dispatch("/boom") {
            Err(RouterError::Handler { handler, source }) => {
                assert_eq!(handler, "boom");
                assert_eq!(source.to_string(), "kaput");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(DispatchPhase::Fallback(FallbackKind::Missing).to_string(), "fallback(missing)");
        let (router, _, _) = router();
        assert_eq!(router.phase(), DispatchPhase::Ready);
    }
}
