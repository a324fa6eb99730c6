//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (composition time):
//!     HandlerSpec + Option<pattern> + EndpointMeta
//!     → pattern.rs (compile placeholders to a full-match regex)
//!     → router.rs (check placeholders against the signature)
//!     → table.rs (append Endpoint + Route, copy-on-write)
//!
//! Reverse routing:
//!     CallDescriptor
//!     → binder.rs (bind_reverse, declared-type conversion)
//!     → pattern.rs render / objects.rs find_path (path)
//!     → codec.rs (query pairs, opaque bundle)
//!     → URL
//!
//! Forward routing:
//!     URL
//!     → codec.rs (ParsedRequest, opaque bundle)
//!     → table.rs routes in order (first full match wins)
//!       or object walk from the root, or root/missing fallback
//!     → binder.rs (bind_forward, defaults re-applied)
//!     → dispatch.rs (sync / async / blocking invocation)
//! ```
//!
//! # Design Decisions
//! - Handler parameter schemas are declared once with a builder; nothing is
//!   discovered at runtime
//! - Endpoint metadata lives in a side table keyed by `EndpointId`
//! - Sharing a route table between routers is explicit
//! - Reverse routing is the left inverse of forward routing up to defaults

pub mod args;
pub mod binder;
pub mod call;
pub mod codec;
pub mod dispatch;
pub mod endpoint;
pub mod error;
pub mod objects;
pub mod pattern;
pub mod router;
pub mod table;

pub use args::{ArgTag, ArgType, Param, ParamKind, Signature, SignatureBuilder, Value};
pub use call::{CallDescriptor, Target};
pub use dispatch::{DispatchPhase, FallbackKind, Fallbacks, ResolvedCall};
pub use endpoint::{
    Endpoint, EndpointId, EndpointMeta, Handler, HandlerResult, HandlerSpec, Invocation,
};
pub use error::{BoxError, RouterError, RouterResult};
pub use objects::{ObjectGraph, ObjectId};
pub use pattern::PathPattern;
pub use router::Router;
pub use table::RouteTable;
