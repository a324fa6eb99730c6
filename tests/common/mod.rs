//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};

use plugin_router::routing::{
    ArgType, EndpointId, EndpointMeta, Handler, HandlerSpec, Invocation, ObjectId, Param, Router,
    Signature,
};
use plugin_router::RouterConfig;

pub const BASE: &str = "plugin://plugin.video.example";

/// Handler echoing what it was called with.
pub fn echo(name: &'static str) -> Handler {
    Handler::sync(move |inv: Invocation| Ok(described(name, &inv)))
}

/// Async flavour of `echo`.
pub fn echo_async(name: &'static str) -> Handler {
    Handler::asynchronous(move |inv: Invocation| async move {
        tokio::task::yield_now().await;
        Ok(described(name, &inv))
    })
}

pub fn described(name: &str, inv: &Invocation) -> Value {
    json!({
        "handler": name,
        "receiver": inv.receiver.map(|r| r.to_string()),
        "args": inv.args,
        "kwargs": inv.kwargs,
    })
}

/// `foo(a, b: int, c=1, *, d: int, e=2)`
pub fn foo_signature() -> Signature {
    Signature::builder()
        .positional("a")
        .param(Param::positional("b").typed(ArgType::Int))
        .param(Param::positional("c").default(1))
        .param(Param::keyword_only("d").typed(ArgType::Int))
        .param(Param::keyword_only("e").default(2))
        .build()
        .unwrap()
}

pub fn receiver_only() -> Signature {
    Signature::builder().receiver().build().unwrap()
}

/// Router with a small catalog:
///
/// - `foo` on `/Foo/<a>/<int:b>`
/// - `int_route` on `/aaa/<a>/<int:b>`, then `str_route` on `/aaa/<a>/<b>`
/// - object tree `root.owner.sub` with method `Sub.go` (no pattern)
/// - `Owner.show` on `/<self>/show/<int:n>`
/// - async `later` on `/later/<x>`
pub struct Sample {
    pub router: Router,
    pub foo: EndpointId,
    pub int_route: EndpointId,
    pub str_route: EndpointId,
    pub go: EndpointId,
    pub show: EndpointId,
    pub later: EndpointId,
    pub root: ObjectId,
    pub owner: ObjectId,
    pub sub: ObjectId,
}

pub fn sample_router(config: RouterConfig) -> Sample {
    let mut router = Router::new(config);
    let root = router.objects_mut().create("Addon");
    let owner = router.objects_mut().create("Owner");
    let sub = router.objects_mut().create("Sub");
    router.objects_mut().attach(root, "owner", owner).unwrap();
    router.objects_mut().attach(owner, "sub", sub).unwrap();
    router.set_root_object(root).unwrap();

    let foo = router
        .register(
            Some("/Foo/<a>/<int:b>"),
            HandlerSpec::function("foo", foo_signature(), echo("foo")),
            EndpointMeta::titled("Foo"),
        )
        .unwrap();
    let ab = || Signature::builder().positional("a").positional("b").build().unwrap();
    let int_route = router
        .register(
            Some("/aaa/<a>/<int:b>"),
            HandlerSpec::function("int_route", ab(), echo("int_route")),
            EndpointMeta::default(),
        )
        .unwrap();
    let str_route = router
        .register(
            Some("/aaa/<a>/<b>"),
            HandlerSpec::function("str_route", ab(), echo("str_route")),
            EndpointMeta::default(),
        )
        .unwrap();
    let go = router
        .register(
            None,
            HandlerSpec::method("Sub", "go", receiver_only(), echo("go")),
            EndpointMeta::default(),
        )
        .unwrap();
    let show = router
        .register(
            Some("/<self>/show/<int:n>"),
            HandlerSpec::method(
                "Owner",
                "show",
                Signature::builder().receiver().positional("n").build().unwrap(),
                echo("show"),
            ),
            EndpointMeta::default(),
        )
        .unwrap();
    let later = router
        .register(
            Some("/later/<x>"),
            HandlerSpec::function(
                "later",
                Signature::builder().positional("x").build().unwrap(),
                echo_async("later"),
            ),
            EndpointMeta::default(),
        )
        .unwrap();

    Sample {
        router,
        foo,
        int_route,
        str_route,
        go,
        show,
        later,
        root,
        owner,
        sub,
    }
}

/// Counting handler for fallback tests.
pub fn counting(name: &'static str, hits: Arc<AtomicUsize>) -> Handler {
    Handler::sync(move |inv: Invocation| {
        hits.fetch_add(1, Ordering::SeqCst);
        Ok(described(name, &inv))
    })
}
