//! Append-only route table.
//!
//! # Responsibilities
//! - Side table of endpoints keyed by `EndpointId`
//! - Ordered route list (registration order = dispatch priority)
//! - Global function names and class method tables
//!
//! # Design Decisions
//! - One `RouteTable` value may be shared by several routers; sharing is
//!   explicit (clone the handle), never a hidden global
//! - Registration swaps in a new snapshot; a dispatch works on the snapshot it
//!   loaded, so it never sees a half-registered route
//! - Registration is expected to finish before the first dispatch; the swap
//!   keeps readers safe but does not order concurrent writers

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::routing::endpoint::{Endpoint, EndpointId};
use crate::routing::error::{RouterError, RouterResult};
use crate::routing::pattern::PathPattern;

/// Compiled pattern bound to an endpoint.
#[derive(Debug, Clone)]
pub struct Route {
    pub pattern: PathPattern,
    pub endpoint: EndpointId,
}

/// Immutable snapshot of the table.
#[derive(Debug, Clone, Default)]
pub struct TableState {
    endpoints: HashMap<EndpointId, Arc<Endpoint>>,
    routes: Vec<Arc<Route>>,
    functions: BTreeMap<String, EndpointId>,
    methods: HashMap<String, BTreeMap<String, EndpointId>>,
}

impl TableState {
    pub fn endpoint(&self, id: EndpointId) -> RouterResult<&Arc<Endpoint>> {
        self.endpoints
            .get(&id)
            .ok_or_else(|| RouterError::UnknownEndpoint(id.to_string()))
    }

    /// Routes in priority order.
    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    /// Global function by name.
    pub fn function(&self, name: &str) -> Option<EndpointId> {
        self.functions.get(name).copied()
    }

    /// Method `name` of `class`.
    pub fn method(&self, class: &str, name: &str) -> Option<EndpointId> {
        self.methods.get(class)?.get(name).copied()
    }

    /// Global name of a function endpoint.
    pub fn function_name(&self, id: EndpointId) -> Option<&str> {
        self.functions
            .iter()
            .find(|(_, e)| **e == id)
            .map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

/// Shareable handle over the route table.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    inner: Arc<ArcSwap<TableState>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<TableState> {
        self.inner.load_full()
    }

    /// Append an endpoint (and its route, if it declares a pattern).
    ///
    /// Fails with `DuplicateEndpoint` when the function name, or the method
    /// name within its class, is already taken.
    pub fn insert(&self, endpoint: Endpoint) -> RouterResult<EndpointId> {
        let id = endpoint.id;
        let endpoint = Arc::new(endpoint);
        let route = endpoint.pattern.clone().map(|pattern| {
            Arc::new(Route {
                pattern,
                endpoint: id,
            })
        });
        let mut taken = false;
        self.inner.rcu(|state| {
            let name = &endpoint.spec.name;
            taken = match &endpoint.spec.class {
                Some(class) => state.method(class, name).is_some(),
                None => state.function(name).is_some(),
            };
            if taken {
                return TableState::clone(state);
            }
            let mut next = TableState::clone(state);
            next.endpoints.insert(id, endpoint.clone());
            if let Some(route) = &route {
                next.routes.push(route.clone());
            }
            match &endpoint.spec.class {
                Some(class) => {
                    next.methods
                        .entry(class.clone())
                        .or_default()
                        .insert(name.clone(), id);
                }
                None => {
                    next.functions.insert(name.clone(), id);
                }
            }
            next
        });
        if taken {
            return Err(RouterError::DuplicateEndpoint(endpoint.qualified_name()));
        }
        Ok(id)
    }

    /// Number of endpoints.
    pub fn len(&self) -> usize {
        self.inner.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.load().is_empty()
    }

    /// True when both handles point at the same table.
    pub fn shares_with(&self, other: &RouteTable) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::args::Signature;
    use crate::routing::endpoint::{EndpointMeta, Handler, HandlerSpec};
    use serde_json::json;

    fn endpoint(spec: HandlerSpec, pattern: Option<&str>) -> Endpoint {
        Endpoint {
            id: EndpointId::next(),
            spec,
            pattern: pattern.map(|p| PathPattern::compile(p).unwrap()),
            meta: EndpointMeta::default(),
        }
    }

    #[test]
    fn test_insert_keeps_order_and_indexes() {
        let table = RouteTable::new();
        let h = Handler::sync(|_| Ok(json!(null)));
        let a = table
            .insert(endpoint(
                HandlerSpec::function("a", Signature::empty(), h.clone()),
                Some("/a"),
            ))
            .unwrap();
        let b = table
            .insert(endpoint(
                HandlerSpec::function("b", Signature::empty(), h.clone()),
                None,
            ))
            .unwrap();
        let sig = Signature::builder().receiver().build().unwrap();
        let m = table
            .insert(endpoint(HandlerSpec::method("Bar", "go", sig, h), Some("/m")))
            .unwrap();

        let snap = table.snapshot();
        assert_eq!(snap.len(), 3);
        let order: Vec<_> = snap.routes().iter().map(|r| r.endpoint).collect();
        assert_eq!(order, vec![a, m]);
        assert_eq!(snap.function("b"), Some(b));
        assert_eq!(snap.function_name(a), Some("a"));
        assert_eq!(snap.method("Bar", "go"), Some(m));
        assert!(snap.method("Bar", "nope").is_none());
    }

    #[test]
    fn test_shared_handles_see_appends() {
        let table = RouteTable::new();
        let shared = table.clone();
        let before = shared.snapshot();
        table
            .insert(endpoint(
                HandlerSpec::function("x", Signature::empty(), Handler::sync(|_| Ok(json!(1)))),
                Some("/x"),
            ))
            .unwrap();
        assert!(table.shares_with(&shared));
        assert_eq!(shared.len(), 1);
        // Old snapshot stays as it was.
        assert!(before.is_empty());
        assert!(!RouteTable::new().shares_with(&table));
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let table = RouteTable::new();
        let h = Handler::sync(|_| Ok(json!(null)));
        table
            .insert(endpoint(HandlerSpec::function("list", Signature::empty(), h.clone()), None))
            .unwrap();
        let second = HandlerSpec::function("list", Signature::empty(), h.clone());
        let err = table.insert(endpoint(second, Some("/l"))).unwrap_err();
        assert!(matches!(err, RouterError::DuplicateEndpoint(name) if name == "list"));
        assert_eq!(table.len(), 1);
        assert!(table.snapshot().routes().is_empty());

        let sig = Signature::builder().receiver().build().unwrap();
        table
            .insert(endpoint(HandlerSpec::method("Bar", "list", sig.clone(), h.clone()), None))
            .unwrap();
        table
            .insert(endpoint(HandlerSpec::method("Baz", "list", sig.clone(), h.clone()), None))
            .unwrap();
        assert!(table
            .insert(endpoint(HandlerSpec::method("Bar", "list", sig, h), None))
            .is_err());
        assert_eq!(table.len(), 3);
    }
}
