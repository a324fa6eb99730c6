//! Router: registration, reverse routing and call resolution.
//!
//! # Responsibilities
//! - Register handlers (compile patterns, check them against signatures)
//! - Build URLs from call descriptors (reverse routing)
//! - Resolve URLs into ready calls (forward routing); invocation lives in
//!   `dispatch.rs`
//!
//! # Design Decisions
//! - Registration order is dispatch priority; first full match wins
//! - Pattern matching, binding and object resolution never suspend
//! - Safe mode refuses to synthesize paths for handlers without a pattern

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::RouterConfig;
use crate::observability::metrics;
use crate::routing::args::{to_text, ArgTag, ParamKind, Value, RECEIVER};
use crate::routing::binder::{bind_forward, bind_reverse, ArgKey, ArgPool, UrlArgument};
use crate::routing::call::{CallDescriptor, Target};
use crate::routing::codec::{
    assemble_url, decode_component, decode_opaque, encode_opaque, encode_path, encode_segment,
    ParsedRequest,
};
use crate::routing::dispatch::{DispatchPhase, FallbackKind, Fallbacks, ResolvedCall};
use crate::routing::endpoint::{Endpoint, EndpointId, EndpointMeta, HandlerSpec};
use crate::routing::error::{RouterError, RouterResult};
use crate::routing::objects::{ObjectGraph, ObjectId};
use crate::routing::pattern::{PathPattern, PlaceholderKey};
use crate::routing::table::{RouteTable, TableState};

/// Bidirectional URL router.
#[derive(Debug)]
pub struct Router {
    config: RouterConfig,
    table: RouteTable,
    objects: ObjectGraph,
    root_object: Option<ObjectId>,
    root_handler: Option<EndpointId>,
    missing_handler: Option<EndpointId>,
}

impl Router {
    /// Router with a private route table.
    pub fn new(config: RouterConfig) -> Self {
        Self::with_table(config, RouteTable::new())
    }

    /// Router sharing an existing route table.
    pub fn with_table(config: RouterConfig, table: RouteTable) -> Self {
        Self {
            config,
            table,
            objects: ObjectGraph::new(),
            root_object: None,
            root_handler: None,
            missing_handler: None,
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    pub fn objects(&self) -> &ObjectGraph {
        &self.objects
    }

    pub fn objects_mut(&mut self) -> &mut ObjectGraph {
        &mut self.objects
    }

    pub fn root_object(&self) -> Option<ObjectId> {
        self.root_object
    }

    /// Object that dotted paths and `<self>` placeholders are relative to.
    pub fn set_root_object(&mut self, object: ObjectId) -> RouterResult<()> {
        self.objects.class_of(object)?;
        self.root_object = Some(object);
        Ok(())
    }

    /// Default handler for `/`.
    pub fn set_root_handler(&mut self, endpoint: EndpointId) -> RouterResult<()> {
        self.table.snapshot().endpoint(endpoint)?;
        self.root_handler = Some(endpoint);
        Ok(())
    }

    /// Default handler for paths nothing else resolves.
    pub fn set_missing_handler(&mut self, endpoint: EndpointId) -> RouterResult<()> {
        self.table.snapshot().endpoint(endpoint)?;
        self.missing_handler = Some(endpoint);
        Ok(())
    }

    pub fn endpoint(&self, id: EndpointId) -> RouterResult<Arc<Endpoint>> {
        self.table.snapshot().endpoint(id).cloned()
    }

    /// `Uninitialized` until something is registered, `Ready` afterwards.
    pub fn phase(&self) -> DispatchPhase {
        if self.table.is_empty() {
            DispatchPhase::Uninitialized
        } else {
            DispatchPhase::Ready
        }
    }

    /// Register a handler, optionally under a declared path pattern.
    pub fn register(
        &self,
        pattern: Option<&str>,
        spec: HandlerSpec,
        meta: EndpointMeta,
    ) -> RouterResult<EndpointId> {
        let handler = spec.qualified_name();
        let signature = &spec.signature;
        let invalid = |reason: &str| RouterError::InvalidSignature {
            handler: handler.clone(),
            reason: reason.to_string(),
        };
        match (&spec.class, signature.has_receiver()) {
            (Some(_), false) => return Err(invalid("method must take the receiver first")),
            (None, true) => return Err(invalid("function cannot take a receiver")),
            _ => {}
        }

        let pattern = pattern.map(PathPattern::compile).transpose()?;
        if let Some(pattern) = &pattern {
            check_placeholders(pattern, &spec)?;
        }

        let endpoint = Endpoint {
            id: EndpointId::next(),
            spec,
            pattern,
            meta,
        };
        let pattern_source = endpoint.pattern.as_ref().map(|p| p.source().to_string());
        let id = self.table.insert(endpoint)?;
        tracing::debug!(
            endpoint = %id,
            handler = %handler,
            pattern = pattern_source.as_deref(),
            "Registered endpoint"
        );
        metrics::record_endpoints(self.table.len());
        Ok(id)
    }

    /// Build the URL for a call.
    pub fn build_url(&self, call: &CallDescriptor) -> RouterResult<String> {
        let result = self.build_url_inner(call);
        metrics::record_build_url(metrics::outcome(&result));
        if let Err(e) = &result {
            tracing::debug!(target_call = ?call.target, error = %e, "Reverse routing failed");
        }
        result
    }

    /// Shorthand for `build_url` with explicit argument lists.
    pub fn build_url_for(
        &self,
        target: impl Into<Target>,
        args: Vec<Value>,
        kwargs: BTreeMap<String, Value>,
    ) -> RouterResult<String> {
        let mut call = CallDescriptor::new(target);
        call.args = args;
        call.kwargs = kwargs;
        self.build_url(&call)
    }

    /// `(title, url)` pair for a listing entry.
    ///
    /// Title falls back to the endpoint's title, then its label, then its
    /// handler name.
    pub fn entry_link(
        &self,
        title: Option<&str>,
        call: &CallDescriptor,
    ) -> RouterResult<(String, String)> {
        let url = self.build_url(call)?;
        let title = match title {
            Some(title) => title.to_string(),
            None => {
                let state = self.table.snapshot();
                match self.target_endpoint(&state, &call.target)? {
                    Some(endpoint) => endpoint.display_title().to_string(),
                    None => match &call.target {
                        Target::Name(name) => name.clone(),
                        other => format!("{other:?}"),
                    },
                }
            }
        };
        Ok((title, url))
    }

    fn target_endpoint(
        &self,
        state: &TableState,
        target: &Target,
    ) -> RouterResult<Option<Arc<Endpoint>>> {
        Ok(match target {
            Target::Function(id) | Target::Method { endpoint: id, .. } => {
                Some(state.endpoint(*id)?.clone())
            }
            Target::Name(name) => match state.function(name) {
                Some(id) => Some(state.endpoint(id)?.clone()),
                None => None,
            },
        })
    }

    fn build_url_inner(&self, call: &CallDescriptor) -> RouterResult<String> {
        let state = self.table.snapshot();
        let Some(endpoint) = self.target_endpoint(&state, &call.target)? else {
            return self.build_plain_url(call);
        };
        let handler = endpoint.qualified_name();

        let object = match call.target {
            Target::Method { object, .. } => {
                let class = self.objects.class_of(object)?;
                if endpoint.spec.class.as_deref() != Some(class) {
                    return Err(RouterError::UnresolvableEndpoint(format!(
                        "{handler} on {object} ({class})"
                    )));
                }
                Some(object)
            }
            _ if endpoint.is_method() => {
                return Err(RouterError::UnresolvableEndpoint(handler));
            }
            _ => None,
        };

        let signature = endpoint.signature();
        let mut kwargs = call.kwargs.clone();
        kwargs.extend(call.raw.iter().map(|(k, v)| (k.clone(), v.clone())));
        let bound = bind_reverse(&handler, signature, &call.args, &kwargs)?;
        let mut pending = bound.encodable(signature);
        for arg in pending.iter_mut() {
            if matches!(&arg.key, ArgKey::Name(name) if call.raw.contains_key(name)) {
                arg.tag = ArgTag::Raw;
            }
        }

        let path = match &endpoint.pattern {
            Some(pattern) => {
                let slots = signature.positional_names();
                pattern.render(&handler, |key| {
                    let key = match key {
                        PlaceholderKey::Receiver => {
                            return match object {
                                Some(object) => self.receiver_path(object).map(Some),
                                None => Ok(None),
                            }
                        }
                        PlaceholderKey::Index(k) => match slots.get(*k) {
                            Some(name) => ArgKey::for_param(signature, name),
                            None => ArgKey::Index(*k),
                        },
                        PlaceholderKey::Name(name) => ArgKey::for_param(signature, name),
                    };
                    Ok(take(&mut pending, &key).map(|arg| to_text(&arg.value)))
                })?
            }
            None if self.config.safe_mode => return Err(RouterError::ForbiddenEndpoint(handler)),
            None => self.default_path(&state, &endpoint, object, &mut pending)?,
        };

        let mut pairs = Vec::new();
        let mut opaque = BTreeMap::new();
        for arg in pending.into_iter().filter(|a| !a.is_default()) {
            let key = arg.key.to_string();
            // A literal pair under the opaque key would be read back as the bundle.
            if arg.tag == ArgTag::Raw || key == self.config.opaque_key {
                opaque.insert(key, arg.value);
            } else {
                pairs.push((key, to_text(&arg.value)));
            }
        }
        if !opaque.is_empty() {
            pairs.push((self.config.opaque_key.clone(), encode_opaque(&opaque)?));
        }
        Ok(assemble_url(&self.config.base_url, &path, &pairs))
    }

    /// URL for a name no endpoint is registered under.
    fn build_plain_url(&self, call: &CallDescriptor) -> RouterResult<String> {
        let Target::Name(name) = &call.target else {
            return Err(RouterError::UnknownEndpoint(format!("{:?}", call.target)));
        };
        let path = format!("/{}", encode_path(name.trim_start_matches('/')));
        let mut pairs: Vec<(String, String)> = call
            .args
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), to_text(v)))
            .collect();
        let mut opaque = call.raw.clone();
        for (key, value) in &call.kwargs {
            if *key == self.config.opaque_key {
                opaque.insert(key.clone(), value.clone());
            } else {
                pairs.push((key.clone(), to_text(value)));
            }
        }
        if !opaque.is_empty() {
            pairs.push((self.config.opaque_key.clone(), encode_opaque(&opaque)?));
        }
        Ok(assemble_url(&self.config.base_url, &path, &pairs))
    }

    /// Dotted path of a receiver, `:` for the root itself.
    fn receiver_path(&self, object: ObjectId) -> RouterResult<String> {
        let names = self.objects.find_path(object, self.root_object)?;
        Ok(if names.is_empty() {
            ":".to_string()
        } else {
            names.join(".")
        })
    }

    /// `/object/path/handler` plus path-tagged arguments.
    fn default_path(
        &self,
        state: &TableState,
        endpoint: &Endpoint,
        object: Option<ObjectId>,
        pending: &mut Vec<UrlArgument>,
    ) -> RouterResult<String> {
        let mut names = match object {
            Some(object) => {
                let mut names = self.objects.find_path(object, self.root_object)?;
                names.push(endpoint.name().to_string());
                names
            }
            None => vec![state
                .function_name(endpoint.id)
                .unwrap_or(endpoint.name())
                .to_string()],
        };
        let mut names: Vec<String> = names.drain(..).map(|n| encode_segment(&n)).collect();

        let mut i = 0;
        while i < pending.len() {
            if pending[i].tag != ArgTag::Path {
                i += 1;
                continue;
            }
            let arg = pending.remove(i);
            let text = to_text(&arg.value);
            if text.is_empty() {
                return Err(RouterError::ArgumentType {
                    handler: endpoint.qualified_name(),
                    name: arg.key.to_string(),
                    expected: "non-empty path segment",
                    value: text,
                });
            }
            names.push(encode_segment(&text));
        }
        Ok(format!("/{}", names.join("/")))
    }

    /// Parse a URL and find the call it describes.
    pub fn resolve(&self, url: &str, fallbacks: &Fallbacks) -> RouterResult<ResolvedCall> {
        let state = self.table.snapshot();
        let request = ParsedRequest::parse(url)?;
        let mut query = request.query.clone();
        let opaque = match query.remove(&self.config.opaque_key) {
            Some(text) => decode_opaque(&text)?,
            None => BTreeMap::new(),
        };
        let mut pool = ArgPool::from_query(query.args());
        pool.merge_opaque(opaque);

        for route in state.routes() {
            let Some(captures) = route.pattern.matches(&request.path) else {
                continue;
            };
            let endpoint = state.endpoint(route.endpoint)?.clone();
            tracing::debug!(
                pattern = %route.pattern,
                handler = %endpoint.qualified_name(),
                "Route matched"
            );
            let mut pool = pool.clone();
            let mut receiver_path = None;
            for (key, value) in captures {
                match key {
                    PlaceholderKey::Name(name) => {
                        pool.insert_param(endpoint.signature(), name, value);
                    }
                    PlaceholderKey::Index(index) => {
                        pool.positional.insert(index, value);
                    }
                    PlaceholderKey::Receiver => receiver_path = Some(to_text(&value)),
                }
            }
            let receiver = receiver_path.map_or(Receiver::Unspecified, Receiver::Path);
            return self.bind_call(endpoint, receiver, pool, None);
        }

        let path = decode_component(&request.path)?;
        if path.trim_matches('/').is_empty() {
            let root = self.fallback(
                &state,
                fallbacks.root,
                self.root_handler,
                &self.config.root_endpoint,
            )?;
            if let Some(root) = root {
                return self.bind_call(root, Receiver::Unspecified, pool, Some(FallbackKind::Root));
            }
        }

        if let Some((endpoint, object, leftovers)) = self.walk(&state, &request.path)? {
            let mut pool = pool;
            pool.push_path_segments(&endpoint.qualified_name(), endpoint.signature(), &leftovers)?;
            let receiver = object.map_or(Receiver::Unspecified, Receiver::Object);
            return self.bind_call(endpoint, receiver, pool, None);
        }

        let missing = self.fallback(
            &state,
            fallbacks.missing,
            self.missing_handler,
            &self.config.missing_endpoint,
        )?;
        match missing {
            Some(missing) => {
                let mut pool = pool;
                let segments = request
                    .path
                    .split('/')
                    .filter(|s| !s.is_empty())
                    .map(decode_component)
                    .collect::<RouterResult<Vec<_>>>()?;
                for (i, segment) in segments.into_iter().enumerate() {
                    pool.positional.insert(i, Value::String(segment));
                }
                self.bind_call(missing, Receiver::Unspecified, pool, Some(FallbackKind::Missing))
            }
            None => Err(RouterError::NoRouteFound(request.path.clone())),
        }
    }

    fn fallback(
        &self,
        state: &TableState,
        explicit: Option<EndpointId>,
        default: Option<EndpointId>,
        configured: &Option<String>,
    ) -> RouterResult<Option<Arc<Endpoint>>> {
        let id = explicit
            .or(default)
            .or_else(|| configured.as_deref().and_then(|name| state.function(name)));
        id.map(|id| state.endpoint(id).cloned()).transpose()
    }

    /// Attribute walk over a path for handlers without a matching route.
    ///
    /// Returns the handler, the object it was reached through and the
    /// leftover segments.
    fn walk(
        &self,
        state: &TableState,
        encoded_path: &str,
    ) -> RouterResult<Option<(Arc<Endpoint>, Option<ObjectId>, Vec<String>)>> {
        let segments: Vec<String> = encoded_path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(decode_component)
            .collect::<RouterResult<_>>()?;
        let mut current = self.root_object;
        let mut first = true;

        for (si, segment) in segments.iter().enumerate() {
            let names: Vec<&str> = segment.split(['.', ':']).filter(|n| !n.is_empty()).collect();
            for (ni, name) in names.iter().enumerate() {
                let at_start = std::mem::replace(&mut first, false);
                let found = match current {
                    Some(object) => {
                        if let Some(child) = self.objects.attr(object, name) {
                            current = Some(child);
                            continue;
                        }
                        state
                            .method(self.objects.class_of(object)?, name)
                            .map(|id| (id, Some(object)))
                    }
                    None => None,
                };
                let found = match found {
                    Some(found) => Some(found),
                    None if at_start => {
                        if let Some(id) = state.function(name) {
                            Some((id, None))
                        } else if let Some(global) = self.objects.global(name) {
                            current = Some(global);
                            continue;
                        } else {
                            None
                        }
                    }
                    None => None,
                };
                let Some((id, object)) = found else {
                    tracing::debug!(path = %encoded_path, segment = %name, "Object walk failed");
                    return Ok(None);
                };
                let leftovers = names[ni + 1..]
                    .iter()
                    .map(|n| n.to_string())
                    .chain(segments[si + 1..].iter().cloned())
                    .collect();
                return Ok(Some((state.endpoint(id)?.clone(), object, leftovers)));
            }
        }
        Ok(None)
    }

    /// Resolve a dotted object path from the root.
    fn object_at(&self, path: &str) -> RouterResult<ObjectId> {
        let unresolvable = || RouterError::UnresolvableEndpoint(path.to_string());
        let mut current = self.root_object;
        for (i, name) in path.split(['.', ':', '/']).filter(|n| !n.is_empty()).enumerate() {
            let next = current
                .and_then(|object| self.objects.attr(object, name))
                .or_else(|| if i == 0 { self.objects.global(name) } else { None });
            current = Some(next.ok_or_else(unresolvable)?);
        }
        current.ok_or_else(unresolvable)
    }

    fn bind_call(
        &self,
        endpoint: Arc<Endpoint>,
        receiver: Receiver,
        mut pool: ArgPool,
        fallback: Option<FallbackKind>,
    ) -> RouterResult<ResolvedCall> {
        let handler = endpoint.qualified_name();
        let receiver = match &endpoint.spec.class {
            Some(class) => {
                let named_self = pool.named.remove(RECEIVER).map(|v| to_text(&v));
                let object = match receiver {
                    Receiver::Object(object) => object,
                    Receiver::Path(path) => self.object_at(&path)?,
                    Receiver::Unspecified => match named_self
                        .or_else(|| endpoint.meta.owner.clone())
                    {
                        Some(path) => self.object_at(&path)?,
                        None => self
                            .root_object
                            .ok_or_else(|| RouterError::UnresolvableEndpoint(handler.clone()))?,
                    },
                };
                if self.objects.class_of(object)? != class {
                    return Err(RouterError::UnresolvableEndpoint(format!(
                        "{handler} on {object} ({})",
                        self.objects.class_of(object)?
                    )));
                }
                Some(object)
            }
            None => None,
        };
        let invocation = bind_forward(&handler, endpoint.signature(), receiver, pool)?;
        Ok(ResolvedCall {
            endpoint,
            invocation,
            fallback,
        })
    }
}

/// Where the receiver of a method call comes from.
#[derive(Debug, Clone, PartialEq)]
enum Receiver {
    /// Nothing in the route; fall back to `self` in the query, the owner
    /// hint, then the root object.
    Unspecified,
    /// Dotted path captured by `<self>`.
    Path(String),
    /// Object reached by walking the path.
    Object(ObjectId),
}

/// Remove the pending argument stored under `key`.
fn take(pending: &mut Vec<UrlArgument>, key: &ArgKey) -> Option<UrlArgument> {
    let index = pending.iter().position(|a| &a.key == key)?;
    Some(pending.remove(index))
}

/// Every placeholder must land on a parameter the handler accepts.
fn check_placeholders(pattern: &PathPattern, spec: &HandlerSpec) -> RouterResult<()> {
    let signature = &spec.signature;
    let slots = signature.positional_names().len();
    for placeholder in pattern.placeholders() {
        let ok = match &placeholder.key {
            PlaceholderKey::Receiver => spec.class.is_some(),
            PlaceholderKey::Index(k) => *k < slots || signature.var_positional().is_some(),
            PlaceholderKey::Name(name) => {
                let declared = signature.param(name).is_some_and(|p| {
                    !p.is_receiver()
                        && !matches!(p.kind, ParamKind::VarPositional | ParamKind::VarKeyword)
                });
                declared || signature.var_keyword().is_some()
            }
        };
        if !ok {
            return Err(RouterError::pattern(
                pattern.source(),
                format!(
                    "placeholder <{}> has no matching parameter in {}",
                    placeholder.key,
                    spec.qualified_name()
                ),
            ));
        }
    }
    Ok(())
}
