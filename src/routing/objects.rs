//! Object graph and object path resolution.
//!
//! # Responsibilities
//! - Hold routable objects (instances of a named class) in an arena
//! - Record declarative "owned sub-object" attachments (ownership index)
//! - Find the dotted attribute path from the routing root to an object
//!
//! # Design Decisions
//! - The ownership index is a lookup aid, not storage: the visible
//!   attribute on the parent stays authoritative
//! - Scanning visible attributes is only a bounded fallback (one parent, or
//!   one level below the root and the global objects)
//! - Walks are bounded by the number of objects, so cycles cannot hang

use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::routing::error::{RouterError, RouterResult};

/// Identity of an object in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(usize);

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "object#{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct ObjectNode {
    class: String,
    attrs: BTreeMap<String, ObjectId>,
}

/// Arena of routable objects.
#[derive(Debug, Clone, Default)]
pub struct ObjectGraph {
    objects: Vec<ObjectNode>,
    /// Ownership index: owner -> {attribute name -> child}.
    owned: HashMap<ObjectId, BTreeMap<String, ObjectId>>,
    /// Back-references: child -> owner.
    parents: HashMap<ObjectId, ObjectId>,
    globals: BTreeMap<String, ObjectId>,
}

impl ObjectGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an instance of `class`.
    pub fn create(&mut self, class: impl Into<String>) -> ObjectId {
        self.objects.push(ObjectNode {
            class: class.into(),
            attrs: BTreeMap::new(),
        });
        ObjectId(self.objects.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn node(&self, id: ObjectId) -> RouterResult<&ObjectNode> {
        self.objects
            .get(id.0)
            .ok_or_else(|| RouterError::UnknownObject(id.to_string()))
    }

    fn node_mut(&mut self, id: ObjectId) -> RouterResult<&mut ObjectNode> {
        self.objects
            .get_mut(id.0)
            .ok_or_else(|| RouterError::UnknownObject(id.to_string()))
    }

    /// Class name of an object.
    pub fn class_of(&self, id: ObjectId) -> RouterResult<&str> {
        Ok(self.node(id)?.class.as_str())
    }

    /// Plain attribute: visible on the parent, no back-reference.
    pub fn set_attr(&mut self, parent: ObjectId, name: &str, child: ObjectId) -> RouterResult<()> {
        self.node(child)?;
        self.node_mut(parent)?.attrs.insert(name.to_string(), child);
        Ok(())
    }

    /// Declaratively attach an owned sub-object.
    ///
    /// Sets the visible attribute, records `{parent: {name: child}}` in the
    /// ownership index and stores the child's back-reference.
    pub fn attach(&mut self, parent: ObjectId, name: &str, child: ObjectId) -> RouterResult<()> {
        self.set_attr(parent, name, child)?;
        let entry = self.owned.entry(parent).or_default();
        entry.retain(|_, c| *c != child);
        entry.insert(name.to_string(), child);
        self.parents.insert(child, parent);
        tracing::trace!(%parent, %child, name, "Attached sub-object");
        Ok(())
    }

    /// Register a top-level object under a global name.
    pub fn set_global(&mut self, name: &str, object: ObjectId) -> RouterResult<()> {
        self.node(object)?;
        self.globals.insert(name.to_string(), object);
        Ok(())
    }

    pub fn global(&self, name: &str) -> Option<ObjectId> {
        self.globals.get(name).copied()
    }

    /// Visible attribute lookup.
    pub fn attr(&self, object: ObjectId, name: &str) -> Option<ObjectId> {
        self.objects.get(object.0)?.attrs.get(name).copied()
    }

    fn global_name(&self, object: ObjectId) -> Option<&str> {
        self.globals
            .iter()
            .find(|(_, id)| **id == object)
            .map(|(name, _)| name.as_str())
    }

    fn scan_attrs(&self, parent: ObjectId, child: ObjectId) -> Option<&str> {
        self.objects
            .get(parent.0)?
            .attrs
            .iter()
            .find(|(_, id)| **id == child)
            .map(|(name, _)| name.as_str())
    }

    /// Attribute names from `root` down to `object`.
    ///
    /// When the walk ends at a global object that is not the root, its global
    /// name becomes the first element.
    pub fn find_path(&self, object: ObjectId, root: Option<ObjectId>) -> RouterResult<Vec<String>> {
        self.node(object)?;
        let unresolvable = || RouterError::UnresolvableEndpoint(object.to_string());

        let mut names = VecDeque::new();
        let mut current = object;
        for _ in 0..=self.objects.len() {
            if Some(current) == root {
                return Ok(names.into());
            }
            if let Some(&parent) = self.parents.get(&current) {
                let name = self
                    .owned
                    .get(&parent)
                    .and_then(|children| {
                        children
                            .iter()
                            .find(|(_, id)| **id == current)
                            .map(|(name, _)| name.as_str())
                    })
                    .or_else(|| self.scan_attrs(parent, current))
                    .ok_or_else(unresolvable)?;
                names.push_front(name.to_string());
                current = parent;
                continue;
            }
            if let Some(name) = self.global_name(current) {
                names.push_front(name.to_string());
                return Ok(names.into());
            }
            // No back-reference: look one level below the root and the globals.
            let holders = root.into_iter().chain(self.globals.values().copied());
            for holder in holders {
                if let Some(name) = self.scan_attrs(holder, current) {
                    names.push_front(name.to_string());
                    if Some(holder) != root {
                        if let Some(global) = self.global_name(holder) {
                            names.push_front(global.to_string());
                        }
                    }
                    return Ok(names.into());
                }
            }
            return Err(unresolvable());
        }
        tracing::warn!(%object, "Ownership cycle while resolving object path");
        Err(unresolvable())
    }
}
