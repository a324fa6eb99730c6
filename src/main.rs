//! Sample plugin entry point.
//!
//! The host starts this binary once per user action and passes the plugin
//! URL, a listing handle and the query string on the command line.
//!
//! # Architecture Overview
//!
//! ```text
//!     Host process call
//!     ───────────────────▶ lifecycle::HostInvocation (argv → URL)
//!                                   │
//!                                   ▼
//!     ┌────────────────────────────────────────────────────────────┐
//!     │                         Router                             │
//!     │  codec ─▶ table (first match) ─▶ objects (walk) ─▶ binder   │
//!     │                                    │                       │
//!     │                                    ▼                       │
//!     │                         dispatch (sync / async)            │
//!     └────────────────────────────────────────────────────────────┘
//!                                   │
//!                                   ▼
//!     Handler result (JSON on stdout); listing entries carry URLs built
//!     by reverse routing through the same router
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use serde_json::json;

use plugin_router::lifecycle::startup::CONFIG_ENV;
use plugin_router::lifecycle::{startup, HostInvocation};
use plugin_router::routing::{
    ArgType, CallDescriptor, EndpointMeta, Handler, HandlerSpec, Param, Router, RouterResult,
    Signature,
};
use plugin_router::RouterConfig;

/// Catalog of a small video plugin.
fn build_router(config: RouterConfig) -> RouterResult<Router> {
    let mut router = Router::new(config);

    let root = router.objects_mut().create("Addon");
    let library = router.objects_mut().create("Library");
    router.objects_mut().attach(root, "library", library)?;
    router.set_root_object(root)?;

    let episode = router.register(
        Some("/show/<name>/<int:season>"),
        HandlerSpec::function(
            "episodes",
            Signature::builder()
                .named("episodes")
                .positional("name")
                .param(Param::positional("season").typed(ArgType::Int))
                .param(Param::keyword_only("page").typed(ArgType::PInt).default(1))
                .build()?,
            Handler::sync(|inv| {
                Ok(json!({
                    "show": inv.get("name"),
                    "season": inv.get("season"),
                    "page": inv.get("page"),
                }))
            }),
        ),
        EndpointMeta::titled("Episodes"),
    )?;

    let movies = router.register(
        None,
        HandlerSpec::method(
            "Library",
            "movies",
            Signature::builder()
                .named("Library.movies")
                .receiver()
                .param(Param::positional("genre").path().default("all"))
                .param(Param::keyword_only("page").typed(ArgType::PInt).default(1))
                .build()?,
            Handler::sync(|inv| Ok(json!({"genre": inv.get("genre"), "page": inv.get("page")}))),
        ),
        EndpointMeta::titled("Movies"),
    )?;

    let search = router.register(
        Some("/search"),
        HandlerSpec::function(
            "search",
            Signature::builder()
                .named("search")
                .positional("query")
                .param(Param::keyword_only("filters").raw().default(json!({})))
                .build()?,
            Handler::asynchronous(|inv| async move {
                tokio::task::yield_now().await;
                Ok(json!({"query": inv.get("query"), "filters": inv.get("filters")}))
            }),
        ),
        EndpointMeta::titled("Search"),
    )?;

    let missing = router.register(
        None,
        HandlerSpec::function(
            "missing",
            Signature::builder()
                .named("missing")
                .var_positional("segments")
                .var_keyword("query")
                .build()?,
            Handler::sync(|inv| Ok(json!({"missing": inv.args, "query": inv.kwargs}))),
        ),
        EndpointMeta::default(),
    )?;

    let entries = [
        router.entry_link(None, &CallDescriptor::new(episode).arg("Dark").arg(1))?,
        router.entry_link(None, &CallDescriptor::method(library, movies).arg("drama"))?,
        router.entry_link(
            Some("Search: cats"),
            &CallDescriptor::new(search).arg("cats").raw("filters", json!({"year": 2001})),
        )?,
    ];
    let listing: Vec<_> = entries
        .into_iter()
        .map(|(title, url)| json!({"title": title, "url": url}))
        .collect();

    let home = router.register(
        None,
        HandlerSpec::function(
            "home",
            Signature::empty(),
            Handler::sync(move |_| Ok(json!({"entries": listing.clone()}))),
        ),
        EndpointMeta::titled("Home"),
    )?;
    router.set_root_handler(home)?;
    router.set_missing_handler(missing)?;
    Ok(router)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let config_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
    let config = match startup(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let invocation = match HostInvocation::from_args(std::env::args()) {
        Ok(invocation) => invocation,
        Err(e) => {
            tracing::error!(error = %e, "Bad host invocation");
            return ExitCode::FAILURE;
        }
    };
    tracing::debug!(handle = invocation.handle, url = %invocation.url(), "Host invocation");

    let router = match build_router(config) {
        Ok(router) => router,
        Err(e) => {
            tracing::error!(error = %e, "Cannot build router");
            return ExitCode::FAILURE;
        }
    };

    match router.async_dispatch(&invocation.url()).await {
        Ok(result) => {
            println!("{result}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, kind = e.kind(), "Dispatch failed");
            ExitCode::FAILURE
        }
    }
}
