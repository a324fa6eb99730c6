//! Argument binding.
//!
//! # Responsibilities
//! - Reverse: bind caller values against a signature and list what has to
//!   be encoded, in declaration order
//! - Forward: turn the argument pool gathered from a URL into the final
//!   positional and keyword values of a handler call
//! - Apply declared-type converters on the way in
//!
//! # Design Decisions
//! - The receiver is never counted as a caller argument; it is filled by
//!   resolution
//! - One logical argument has exactly one encoding: positional-only
//!   parameters travel under their slot index, every other named parameter
//!   under its keyword
//! - Defaults are expanded for path substitution and dropped from the query
//!   (minimality); dispatch re-applies them

use std::collections::{BTreeMap, HashMap};

use crate::routing::args::{ArgTag, Param, ParamKind, Signature, Value, RECEIVER};
use crate::routing::endpoint::Invocation;
use crate::routing::error::{RouterError, RouterResult};
use crate::routing::objects::ObjectId;

fn convert(handler: &str, param: &Param, value: &Value) -> RouterResult<Value> {
    param
        .ty
        .convert(value)
        .map_err(|e| RouterError::ArgumentType {
            handler: handler.to_string(),
            name: param.name.clone(),
            expected: e.expected,
            value: e.value,
        })
}

/// Key under which an argument travels in a URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArgKey {
    Name(String),
    Index(usize),
}

impl ArgKey {
    /// URL key of the declared parameter `name`.
    pub fn for_param(signature: &Signature, name: &str) -> Self {
        match signature.positional_only_slot(name) {
            Some(slot) => Self::Index(slot),
            None => Self::Name(name.to_string()),
        }
    }
}

impl std::fmt::Display for ArgKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{name}"),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

/// One argument waiting to be placed in a URL.
#[derive(Debug, Clone, PartialEq)]
pub struct UrlArgument {
    pub key: ArgKey,
    pub value: Value,
    pub tag: ArgTag,
    pub default: Option<Value>,
}

impl UrlArgument {
    /// Equal to its declared default, so it can be left out.
    pub fn is_default(&self) -> bool {
        self.default.as_ref() == Some(&self.value)
    }
}

/// Result of reverse binding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundArguments {
    /// Values bound to positional slots, then var-positional extras.
    pub positional: Vec<Value>,
    /// Values bound by keyword, then var-keyword extras.
    pub keywords: BTreeMap<String, Value>,
    /// Every named parameter, defaults expanded.
    pub arguments: BTreeMap<String, Value>,
    /// Names bound positionally, in order.
    pub positional_names: Vec<String>,
    pub indexes: HashMap<String, usize>,
    pub defaults: BTreeMap<String, Value>,
    extra_args: Vec<Value>,
    extra_kwargs: BTreeMap<String, Value>,
}

impl BoundArguments {
    /// Everything that has to be encoded, in declaration order.
    ///
    /// Positional-only parameters and var-positional extras use their
    /// absolute slot index as key.
    pub fn encodable(&self, signature: &Signature) -> Vec<UrlArgument> {
        let slots = signature.positional_names().len();
        let mut out = Vec::new();
        for p in signature.caller_params() {
            match p.kind {
                ParamKind::VarPositional => {
                    out.extend(self.extra_args.iter().enumerate().map(|(j, v)| UrlArgument {
                        key: ArgKey::Index(slots + j),
                        value: v.clone(),
                        tag: ArgTag::Plain,
                        default: None,
                    }));
                }
                ParamKind::VarKeyword => {
                    out.extend(self.extra_kwargs.iter().map(|(k, v)| UrlArgument {
                        key: ArgKey::Name(k.clone()),
                        value: v.clone(),
                        tag: ArgTag::Plain,
                        default: None,
                    }));
                }
                _ => {
                    if let Some(value) = self.arguments.get(&p.name) {
                        out.push(UrlArgument {
                            key: ArgKey::for_param(signature, &p.name),
                            value: value.clone(),
                            tag: p.tag,
                            default: p.default.clone(),
                        });
                    }
                }
            }
        }
        out
    }
}

/// Bind caller values for reverse routing.
pub fn bind_reverse(
    handler: &str,
    signature: &Signature,
    args: &[Value],
    kwargs: &BTreeMap<String, Value>,
) -> RouterResult<BoundArguments> {
    let slots: Vec<&Param> = signature
        .caller_params()
        .filter(|p| p.kind.is_positional())
        .collect();
    let var_positional = signature.var_positional().is_some();
    let var_keyword = signature.var_keyword().is_some();
    let mut bound = BoundArguments::default();

    for (i, value) in args.iter().enumerate() {
        match slots.get(i) {
            Some(p) => {
                let value = convert(handler, p, value)?;
                bound.arguments.insert(p.name.clone(), value.clone());
                bound.positional.push(value);
                bound.indexes.insert(p.name.clone(), i);
                bound.positional_names.push(p.name.clone());
            }
            None if var_positional => {
                bound.positional.push(value.clone());
                bound.extra_args.push(value.clone());
            }
            None => {
                return Err(RouterError::TooManyArguments {
                    handler: handler.to_string(),
                    expected: slots.len(),
                    given: args.len(),
                })
            }
        }
    }

    for (name, value) in kwargs {
        let declared = signature
            .param(name)
            .filter(|p| !p.is_receiver())
            .filter(|p| matches!(p.kind, ParamKind::PositionalOrKeyword | ParamKind::KeywordOnly));
        match declared {
            Some(p) => {
                if bound.arguments.contains_key(name) {
                    return Err(RouterError::DuplicateArgument {
                        handler: handler.to_string(),
                        name: name.clone(),
                    });
                }
                let value = convert(handler, p, value)?;
                bound.arguments.insert(name.clone(), value.clone());
                bound.keywords.insert(name.clone(), value);
            }
            None if var_keyword && name != RECEIVER => {
                bound.keywords.insert(name.clone(), value.clone());
                bound.extra_kwargs.insert(name.clone(), value.clone());
            }
            None => {
                return Err(RouterError::UnknownArgument {
                    handler: handler.to_string(),
                    name: name.clone(),
                })
            }
        }
    }

    for p in signature.caller_params() {
        if let Some(default) = &p.default {
            bound.defaults.insert(p.name.clone(), default.clone());
        }
        if !matches!(p.kind, ParamKind::VarPositional | ParamKind::VarKeyword)
            && !bound.arguments.contains_key(&p.name)
        {
            match &p.default {
                Some(default) => {
                    bound.arguments.insert(p.name.clone(), default.clone());
                }
                None => {
                    return Err(RouterError::MissingArgument {
                        handler: handler.to_string(),
                        name: p.name.clone(),
                    })
                }
            }
        }
    }
    Ok(bound)
}

/// Values gathered from a URL before binding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgPool {
    pub positional: BTreeMap<usize, Value>,
    pub named: BTreeMap<String, Value>,
}

impl ArgPool {
    /// Pool from single-valued query arguments; digit keys address slots.
    pub fn from_query(args: BTreeMap<String, String>) -> Self {
        let mut pool = Self::default();
        for (key, value) in args {
            pool.insert_keyed(key, Value::String(value));
        }
        pool
    }

    fn insert_keyed(&mut self, key: String, value: Value) {
        match key.parse::<usize>() {
            Ok(index) if key.bytes().all(|b| b.is_ascii_digit()) => {
                self.positional.insert(index, value);
            }
            _ => {
                self.named.insert(key, value);
            }
        }
    }

    /// Place a value captured for the declared parameter `name`.
    pub fn insert_param(&mut self, signature: &Signature, name: String, value: Value) {
        match ArgKey::for_param(signature, &name) {
            ArgKey::Index(slot) => {
                self.positional.insert(slot, value);
            }
            ArgKey::Name(_) => {
                self.named.insert(name, value);
            }
        }
    }

    /// Merge decoded opaque values; digit keys address slots.
    pub fn merge_opaque(&mut self, values: BTreeMap<String, Value>) {
        for (key, value) in values {
            self.insert_keyed(key, value);
        }
    }

    /// Spread leftover path segments over path-tagged parameters in
    /// declaration order, then over the var-positional sink.
    pub fn push_path_segments(
        &mut self,
        handler: &str,
        signature: &Signature,
        segments: &[String],
    ) -> RouterResult<()> {
        let mut rest = segments.iter();
        let path_params: Vec<String> = signature
            .caller_params()
            .filter(|p| p.tag == ArgTag::Path)
            .filter(|p| match ArgKey::for_param(signature, &p.name) {
                ArgKey::Index(slot) => !self.positional.contains_key(&slot),
                ArgKey::Name(_) => !self.named.contains_key(&p.name),
            })
            .map(|p| p.name.clone())
            .collect();
        for (name, segment) in path_params.into_iter().zip(rest.by_ref()) {
            self.insert_param(signature, name, Value::String(segment.clone()));
        }
        let remaining: Vec<&String> = rest.collect();
        if remaining.is_empty() {
            return Ok(());
        }
        if signature.var_positional().is_none() {
            let slots = signature.positional_names().len();
            return Err(RouterError::TooManyArguments {
                handler: handler.to_string(),
                expected: slots,
                given: slots + remaining.len(),
            });
        }
        let mut index = signature.positional_names().len();
        for segment in remaining {
            while self.positional.contains_key(&index) {
                index += 1;
            }
            self.positional.insert(index, Value::String(segment.clone()));
        }
        Ok(())
    }
}

/// Bind a URL argument pool into a ready handler call.
pub fn bind_forward(
    handler: &str,
    signature: &Signature,
    receiver: Option<ObjectId>,
    mut pool: ArgPool,
) -> RouterResult<Invocation> {
    let mut args = Vec::new();
    let mut kwargs = BTreeMap::new();
    let mut positional_names = Vec::new();
    let mut slot = 0usize;
    let missing = |name: &str| RouterError::MissingArgument {
        handler: handler.to_string(),
        name: name.to_string(),
    };

    for p in signature.params() {
        if p.is_receiver() {
            if receiver.is_none() {
                return Err(missing(RECEIVER));
            }
            pool.named.remove(RECEIVER);
            continue;
        }
        match p.kind {
            ParamKind::PositionalOnly | ParamKind::PositionalOrKeyword => {
                let by_index = pool.positional.remove(&slot);
                // A keyword matching a positional-only name belongs to **kwargs.
                let by_name = match p.kind {
                    ParamKind::PositionalOrKeyword => pool.named.remove(&p.name),
                    _ => None,
                };
                let value = match (by_index, by_name) {
                    (Some(_), Some(_)) => {
                        return Err(RouterError::DuplicateArgument {
                            handler: handler.to_string(),
                            name: p.name.clone(),
                        })
                    }
                    (Some(v), None) | (None, Some(v)) => convert(handler, p, &v)?,
                    (None, None) => p.default.clone().ok_or_else(|| missing(&p.name))?,
                };
                args.push(value);
                positional_names.push(p.name.clone());
                slot += 1;
            }
            ParamKind::VarPositional => {
                let mut index = slot;
                while let Some(v) = pool.positional.remove(&index) {
                    args.push(v);
                    index += 1;
                }
            }
            ParamKind::KeywordOnly => {
                let value = match pool.named.remove(&p.name) {
                    Some(v) => convert(handler, p, &v)?,
                    None => p.default.clone().ok_or_else(|| missing(&p.name))?,
                };
                kwargs.insert(p.name.clone(), value);
            }
            ParamKind::VarKeyword => {
                kwargs.append(&mut pool.named);
            }
        }
    }

    if !pool.positional.is_empty() {
        return Err(RouterError::TooManyArguments {
            handler: handler.to_string(),
            expected: slot,
            given: args.len() + pool.positional.len(),
        });
    }
    if let Some(name) = pool.named.keys().next() {
        return Err(RouterError::UnknownArgument {
            handler: handler.to_string(),
            name: name.clone(),
        });
    }

    Ok(Invocation {
        endpoint: handler.to_string(),
        receiver,
        args,
        kwargs,
        positional_names,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::args::ArgType;
    use serde_json::json;

    /// `foo(a, b: int, c=1, *, d: int, e=2)`
    fn foo() -> Signature {
        Signature::builder()
            .positional("a")
            .param(Param::positional("b").typed(ArgType::Int))
            .param(Param::positional("c").default(1))
            .param(Param::keyword_only("d").typed(ArgType::Int))
            .param(Param::keyword_only("e").default(2))
            .build()
            .unwrap()
    }

    fn kw(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_reverse_binding_expands_defaults() {
        let args = [json!(11), json!(12), json!(13)];
        let bound = bind_reverse("foo", &foo(), &args, &kw(&[("d", json!(14))])).unwrap();
        assert_eq!(bound.positional, vec![json!(11), json!(12), json!(13)]);
        assert_eq!(bound.positional_names, vec!["a", "b", "c"]);
        assert_eq!(bound.indexes["c"], 2);
        assert_eq!(bound.arguments["e"], json!(2));
        assert_eq!(bound.keywords, kw(&[("d", json!(14))]));
        assert_eq!(bound.defaults, kw(&[("c", json!(1)), ("e", json!(2))]));

        let keys: Vec<String> = bound
            .encodable(&foo())
            .iter()
            .filter(|a| !a.is_default())
            .map(|a| a.key.to_string())
            .collect();
        assert_eq!(keys, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_reverse_binding_errors() {
        let sig = foo();
        assert!(matches!(
            bind_reverse("foo", &sig, &[json!(1), json!(2)], &BTreeMap::new()),
            Err(RouterError::MissingArgument { name, .. }) if name == "d"
        ));
        assert!(matches!(
            bind_reverse(
                "foo",
                &sig,
                &[json!(1), json!(2), json!(3), json!(4)],
                &kw(&[("d", json!(1))])
            ),
            Err(RouterError::TooManyArguments { expected: 3, given: 4, .. })
        ));
        assert!(matches!(
            bind_reverse("foo", &sig, &[json!(1), json!("x")], &kw(&[("d", json!(1))])),
            Err(RouterError::ArgumentType { name, .. }) if name == "b"
        ));
        assert!(matches!(
            bind_reverse(
                "foo",
                &sig,
                &[json!(1), json!(2)],
                &kw(&[("a", json!(1)), ("d", json!(1))])
            ),
            Err(RouterError::DuplicateArgument { name, .. }) if name == "a"
        ));
        assert!(matches!(
            bind_reverse(
                "foo",
                &sig,
                &[json!(1), json!(2)],
                &kw(&[("zz", json!(1)), ("d", json!(1))])
            ),
            Err(RouterError::UnknownArgument { name, .. }) if name == "zz"
        ));
    }

    #[test]
    fn test_reverse_var_params_and_positional_only() {
        let sig = Signature::builder()
            .positional_only("a")
            .positional("b")
            .var_positional("rest")
            .var_keyword("extra")
            .build()
            .unwrap();
        let bound = bind_reverse(
            "xxx",
            &sig,
            &[json!(10), json!(11), json!(12), json!(13)],
            &kw(&[("g", json!(26)), ("a", json!(99))]),
        )
        .unwrap();
        let encoded = bound.encodable(&sig);
        let keys: Vec<String> = encoded.iter().map(|a| a.key.to_string()).collect();
        // Positional-only `a` travels by slot; keyword `a` lands in **extra.
        assert_eq!(keys, vec!["0", "b", "2", "3", "a", "g"]);

        let pool = ArgPool::from_query(
            encoded
                .iter()
                .map(|a| (a.key.to_string(), crate::routing::args::to_text(&a.value)))
                .collect(),
        );
        let inv = bind_forward("xxx", &sig, None, pool).unwrap();
        assert_eq!(inv.args, vec![json!("10"), json!("11"), json!("12"), json!("13")]);
        assert_eq!(inv.kwargs, kw(&[("a", json!("99")), ("g", json!("26"))]));
    }

    #[test]
    fn test_forward_positional_only_ignores_keyword() {
        let sig = Signature::builder()
            .positional_only("a")
            .var_keyword("extra")
            .build()
            .unwrap();
        let pool = ArgPool::from_query(BTreeMap::from([
            ("0".to_string(), "10".to_string()),
            ("a".to_string(), "99".to_string()),
        ]));
        let inv = bind_forward("x", &sig, None, pool).unwrap();
        assert_eq!(inv.args, vec![json!("10")]);
        assert_eq!(inv.kwargs, kw(&[("a", json!("99"))]));

        let strict = Signature::builder().positional_only("a").build().unwrap();
        let pool = ArgPool::from_query(BTreeMap::from([("a".to_string(), "1".to_string())]));
        assert!(matches!(
            bind_forward("x", &strict, None, pool),
            Err(RouterError::MissingArgument { name, .. }) if name == "a"
        ));
    }

    #[test]
    fn test_receiver_is_not_a_caller_argument() {
        let sig = Signature::builder().receiver().positional("a").build().unwrap();
        let bound = bind_reverse("Bar.goo", &sig, &[json!(5)], &BTreeMap::new()).unwrap();
        assert_eq!(bound.arguments["a"], json!(5));
        assert!(!bound.arguments.contains_key(RECEIVER));
        assert!(matches!(
            bind_reverse("Bar.goo", &sig, &[], &kw(&[("self", json!(1)), ("a", json!(1))])),
            Err(RouterError::UnknownArgument { .. })
        ));
    }

    #[test]
    fn test_forward_binding_reapplies_defaults() {
        let mut pool = ArgPool::default();
        pool.named.insert("a".into(), json!("11"));
        pool.named.insert("b".into(), json!(12));
        pool.named.insert("c".into(), json!("13"));
        pool.named.insert("d".into(), json!("14"));
        let inv = bind_forward("foo", &foo(), None, pool).unwrap();
        assert_eq!(inv.args, vec![json!("11"), json!(12), json!("13")]);
        assert_eq!(inv.kwargs, kw(&[("d", json!(14)), ("e", json!(2))]));
    }

    #[test]
    fn test_forward_binding_errors() {
        let pool = ArgPool::from_query(BTreeMap::from([
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
        ]));
        assert!(matches!(
            bind_forward("foo", &foo(), None, pool.clone()),
            Err(RouterError::MissingArgument { name, .. }) if name == "d"
        ));

        let mut extra = pool.clone();
        extra.named.insert("d".into(), json!("4"));
        extra.named.insert("bogus".into(), json!("x"));
        assert!(matches!(
            bind_forward("foo", &foo(), None, extra),
            Err(RouterError::UnknownArgument { name, .. }) if name == "bogus"
        ));

        let mut dup = pool.clone();
        dup.named.insert("d".into(), json!("4"));
        dup.positional.insert(0, json!("x"));
        assert!(matches!(
            bind_forward("foo", &foo(), None, dup),
            Err(RouterError::DuplicateArgument { name, .. }) if name == "a"
        ));

        let mut bad = pool;
        bad.named.insert("d".into(), json!("four"));
        assert!(matches!(
            bind_forward("foo", &foo(), None, bad),
            Err(RouterError::ArgumentType { name, .. }) if name == "d"
        ));
    }

    #[test]
    fn test_forward_receiver_required() {
        let sig = Signature::builder().receiver().build().unwrap();
        assert!(matches!(
            bind_forward("Bar.go", &sig, None, ArgPool::default()),
            Err(RouterError::MissingArgument { name, .. }) if name == "self"
        ));
    }

    #[test]
    fn test_forward_var_params() {
        let sig = Signature::builder()
            .positional("a")
            .var_positional("rest")
            .var_keyword("extra")
            .build()
            .unwrap();
        let pool = ArgPool::from_query(BTreeMap::from([
            ("0".to_string(), "x".to_string()),
            ("1".to_string(), "y".to_string()),
            ("2".to_string(), "z".to_string()),
            ("q".to_string(), "w".to_string()),
        ]));
        let inv = bind_forward("f", &sig, None, pool).unwrap();
        assert_eq!(inv.args, vec![json!("x"), json!("y"), json!("z")]);
        assert_eq!(inv.extra_args(), &[json!("y"), json!("z")]);
        assert_eq!(inv.kwargs, kw(&[("q", json!("w"))]));
    }

    #[test]
    fn test_path_segments_fill_path_params() {
        let sig = Signature::builder()
            .receiver()
            .param(Param::positional("a").path())
            .param(Param::positional("b").path().typed(ArgType::Int))
            .param(Param::positional("c").default(42))
            .build()
            .unwrap();
        let mut pool = ArgPool::default();
        pool.push_path_segments("goo", &sig, &["x".to_string(), "7".to_string()])
            .unwrap();
        let object = {
            let mut graph = crate::routing::objects::ObjectGraph::new();
            graph.create("Addon")
        };
        let inv = bind_forward("goo", &sig, Some(object), pool).unwrap();
        assert_eq!(inv.args, vec![json!("x"), json!(7), json!(42)]);

        let mut pool = ArgPool::default();
        let err = pool
            .push_path_segments("goo", &sig, &["x".into(), "7".into(), "8".into()])
            .unwrap_err();
        assert!(matches!(err, RouterError::TooManyArguments { .. }));
    }
}
