//! Deferred call descriptions.

use std::collections::BTreeMap;

use crate::routing::args::Value;
use crate::routing::endpoint::EndpointId;
use crate::routing::objects::ObjectId;

/// What a call points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Registered global function.
    Function(EndpointId),
    /// Method bound to an instance.
    Method { object: ObjectId, endpoint: EndpointId },
    /// Plain name; upgraded to the global function of that name if one is
    /// registered, otherwise rendered as `/name`.
    Name(String),
}

impl From<EndpointId> for Target {
    fn from(id: EndpointId) -> Self {
        Self::Function(id)
    }
}

impl From<&str> for Target {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

/// Handler reference plus arguments, convertible to and from a URL.
#[derive(Debug, Clone, PartialEq)]
pub struct CallDescriptor {
    pub target: Target,
    pub args: Vec<Value>,
    pub kwargs: BTreeMap<String, Value>,
    /// Extra keyword values always sent through the opaque bundle.
    pub raw: BTreeMap<String, Value>,
}

impl CallDescriptor {
    pub fn new(target: impl Into<Target>) -> Self {
        Self {
            target: target.into(),
            args: Vec::new(),
            kwargs: BTreeMap::new(),
            raw: BTreeMap::new(),
        }
    }

    /// Bound method call.
    pub fn method(object: ObjectId, endpoint: EndpointId) -> Self {
        Self::new(Target::Method { object, endpoint })
    }

    /// Append a positional value.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Set a keyword value.
    pub fn kwarg(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.to_string(), value.into());
        self
    }

    /// Set an opaque keyword value.
    pub fn raw(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.raw.insert(name.to_string(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder() {
        let call = CallDescriptor::new("listing")
            .arg(1)
            .kwarg("page", 2)
            .raw("filter", json!({"genre": "drama"}));
        assert_eq!(call.target, Target::Name("listing".into()));
        assert_eq!(call.args, vec![json!(1)]);
        assert_eq!(call.kwargs["page"], json!(2));
        assert_eq!(call.raw["filter"]["genre"], json!("drama"));
    }
}
