//! Handler parameter schema.
//!
//! # Responsibilities
//! - Describe a handler's parameters (kind, default, declared type, tags)
//! - Convert raw values into the declared type
//! - Render values as URL text
//!
//! # Design Decisions
//! - Schema is built once at registration time through `SignatureBuilder`
//! - Values are `serde_json::Value`, so opaque arguments can carry any shape
//! - Converters never pass invalid input through: they either produce the
//!   declared type or fail

use serde_json::Number;

use crate::routing::error::{RouterError, RouterResult};

/// Dynamic argument value.
pub type Value = serde_json::Value;

/// Conventional name of the owning-instance parameter.
pub const RECEIVER: &str = "self";

const TRUE_WORDS: &[&str] = &["true", "on", "1", "hi", "high", "up", "enable", "enabled"];
const FALSE_WORDS: &[&str] = &["false", "off", "0", "lo", "low", "down", "disable", "disabled"];

/// Parameter kind, in canonical declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ParamKind {
    PositionalOnly,
    PositionalOrKeyword,
    VarPositional,
    KeywordOnly,
    VarKeyword,
}

impl ParamKind {
    /// True for kinds that occupy a positional slot.
    pub fn is_positional(self) -> bool {
        matches!(self, Self::PositionalOnly | Self::PositionalOrKeyword)
    }
}

/// Declared argument type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArgType {
    /// Universal marker, no conversion.
    #[default]
    Any,
    Str,
    Int,
    UInt,
    PInt,
    Float,
    Bool,
}

/// Where an argument travels during reverse routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArgTag {
    /// Query string literal.
    #[default]
    Plain,
    /// Extra path segment of a synthesized default path.
    Path,
    /// Serialized into the opaque bundle.
    Raw,
}

/// Conversion failure, without handler context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionError {
    pub expected: &'static str,
    pub value: String,
}

impl ArgType {
    /// Human readable type name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Str => "str",
            Self::Int => "int",
            Self::UInt => "uint",
            Self::PInt => "pint",
            Self::Float => "float",
            Self::Bool => "bool",
        }
    }

    /// Convert `value` into this type.
    pub fn convert(self, value: &Value) -> Result<Value, ConversionError> {
        let fail = || ConversionError {
            expected: self.name(),
            value: value.to_string(),
        };
        match self {
            Self::Any => Ok(value.clone()),
            Self::Str => match value {
                Value::Array(_) | Value::Object(_) => Err(fail()),
                other => Ok(Value::String(to_text(other))),
            },
            Self::Int => int_of(value).map(int_value).ok_or_else(fail),
            Self::UInt => int_of(value)
                .and_then(|n| u64::try_from(n).ok())
                .map(Value::from)
                .ok_or_else(fail),
            Self::PInt => int_of(value)
                .filter(|n| *n > 0)
                .map(int_value)
                .ok_or_else(fail),
            Self::Float => {
                let f = match value {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    _ => None,
                };
                f.and_then(Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(fail)
            }
            Self::Bool => match value {
                Value::Bool(b) => Ok(Value::Bool(*b)),
                Value::Number(n) => match n.as_i64() {
                    Some(0) => Ok(Value::Bool(false)),
                    Some(1) => Ok(Value::Bool(true)),
                    _ => Err(fail()),
                },
                Value::String(s) => parse_bool(s).map(Value::Bool).ok_or_else(fail),
                _ => Err(fail()),
            },
        }
    }
}

fn int_of(value: &Value) -> Option<i128> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from)),
        Value::String(s) => s.trim().parse::<i128>().ok(),
        _ => None,
    }
    .filter(|n| *n >= i128::from(i64::MIN) && *n <= i128::from(u64::MAX))
}

fn int_value(n: i128) -> Value {
    match i64::try_from(n) {
        Ok(signed) => Value::from(signed),
        Err(_) => u64::try_from(n).map(Value::from).unwrap_or(Value::Null),
    }
}

/// Parse a boolean word, case-insensitive.
pub fn parse_bool(text: &str) -> Option<bool> {
    let lower = text.to_ascii_lowercase();
    if TRUE_WORDS.contains(&lower.as_str()) {
        Some(true)
    } else if FALSE_WORDS.contains(&lower.as_str()) {
        Some(false)
    } else {
        None
    }
}

/// Literal text of a value as it appears in a URL.
pub fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// One handler parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
    pub default: Option<Value>,
    pub ty: ArgType,
    pub tag: ArgTag,
}

impl Param {
    fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            ty: ArgType::Any,
            tag: ArgTag::Plain,
        }
    }

    /// Positional-or-keyword parameter.
    pub fn positional(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::PositionalOrKeyword)
    }

    /// Positional-only parameter.
    pub fn positional_only(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::PositionalOnly)
    }

    /// Keyword-only parameter.
    pub fn keyword_only(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::KeywordOnly)
    }

    /// Set the declared default.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Set the declared type.
    pub fn typed(mut self, ty: ArgType) -> Self {
        self.ty = ty;
        self
    }

    /// Emit into the URL path instead of the query.
    pub fn path(mut self) -> Self {
        self.tag = ArgTag::Path;
        self
    }

    /// Transport through the opaque bundle.
    pub fn raw(mut self) -> Self {
        self.tag = ArgTag::Raw;
        self
    }

    /// True when this is the owning-instance parameter.
    pub fn is_receiver(&self) -> bool {
        self.kind.is_positional() && self.name == RECEIVER
    }
}

/// Ordered parameter schema of one handler.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signature {
    params: Vec<Param>,
}

impl Signature {
    /// Start building a signature.
    pub fn builder() -> SignatureBuilder {
        SignatureBuilder::default()
    }

    /// Signature accepting nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Whether the first parameter is the owning instance.
    pub fn has_receiver(&self) -> bool {
        self.params.first().is_some_and(Param::is_receiver)
    }

    /// Parameters the caller supplies, without the receiver.
    pub fn caller_params(&self) -> impl Iterator<Item = &Param> {
        self.params.iter().filter(|p| !p.is_receiver())
    }

    /// Names of caller-visible positional slots, in order.
    pub fn positional_names(&self) -> Vec<&str> {
        self.caller_params()
            .filter(|p| p.kind.is_positional())
            .map(|p| p.name.as_str())
            .collect()
    }

    /// Slot of a positional-only parameter; such parameters travel in URLs
    /// under their index.
    pub fn positional_only_slot(&self, name: &str) -> Option<usize> {
        self.caller_params()
            .filter(|p| p.kind.is_positional())
            .position(|p| p.name == name && p.kind == ParamKind::PositionalOnly)
    }

    pub fn param(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn var_positional(&self) -> Option<&Param> {
        self.params
            .iter()
            .find(|p| p.kind == ParamKind::VarPositional)
    }

    pub fn var_keyword(&self) -> Option<&Param> {
        self.params.iter().find(|p| p.kind == ParamKind::VarKeyword)
    }
}

/// Builder for `Signature`.
#[derive(Debug, Default)]
pub struct SignatureBuilder {
    handler: Option<String>,
    params: Vec<Param>,
}

impl SignatureBuilder {
    /// Name reported in `InvalidSignature` errors.
    pub fn named(mut self, handler: impl Into<String>) -> Self {
        self.handler = Some(handler.into());
        self
    }

    /// Add the owning-instance parameter (must come first).
    pub fn receiver(mut self) -> Self {
        self.params.push(Param::positional_only(RECEIVER));
        self
    }

    /// Add any parameter.
    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    /// Add an untyped positional-or-keyword parameter.
    pub fn positional(self, name: &str) -> Self {
        self.param(Param::positional(name))
    }

    /// Add an untyped positional-only parameter.
    pub fn positional_only(self, name: &str) -> Self {
        self.param(Param::positional_only(name))
    }

    /// Add an untyped keyword-only parameter.
    pub fn keyword_only(self, name: &str) -> Self {
        self.param(Param::keyword_only(name))
    }

    /// Add the `*args` sink.
    pub fn var_positional(self, name: &str) -> Self {
        self.param(Param::new(name, ParamKind::VarPositional))
    }

    /// Add the `**kwargs` sink.
    pub fn var_keyword(self, name: &str) -> Self {
        self.param(Param::new(name, ParamKind::VarKeyword))
    }

    /// Validate and freeze the schema.
    pub fn build(self) -> RouterResult<Signature> {
        match check_params(&self.params) {
            Ok(()) => Ok(Signature {
                params: self.params,
            }),
            Err(reason) => Err(RouterError::InvalidSignature {
                handler: self.handler.unwrap_or_else(|| "<unnamed>".to_string()),
                reason,
            }),
        }
    }
}

fn check_params(params: &[Param]) -> Result<(), String> {
    let mut seen = std::collections::HashSet::new();
    let mut last_kind = ParamKind::PositionalOnly;
    let mut defaulted_positional = false;
    for (i, p) in params.iter().enumerate() {
        if p.name.is_empty() {
            return Err(format!("parameter {i} has an empty name"));
        }
        if !seen.insert(p.name.as_str()) {
            return Err(format!("duplicate parameter {:?}", p.name));
        }
        if p.name == RECEIVER && !(i == 0 && p.is_receiver()) {
            return Err(format!("{RECEIVER:?} must be the first positional parameter"));
        }
        if p.kind < last_kind {
            return Err(format!("parameter {:?} is out of order", p.name));
        }
        if matches!(p.kind, ParamKind::VarPositional | ParamKind::VarKeyword) {
            if p.kind == last_kind && i > 0 {
                return Err(format!("more than one {:?} parameter", p.kind));
            }
            if p.default.is_some() || p.tag != ArgTag::Plain {
                return Err(format!("{:?} cannot carry a default or tag", p.name));
            }
        }
        if p.kind.is_positional() && !p.is_receiver() {
            if p.default.is_some() {
                defaulted_positional = true;
            } else if defaulted_positional {
                return Err(format!(
                    "required parameter {:?} follows a parameter with a default",
                    p.name
                ));
            }
        }
        last_kind = p.kind;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_int_conversion() {
        assert_eq!(ArgType::Int.convert(&json!("12")).unwrap(), json!(12));
        assert_eq!(ArgType::Int.convert(&json!("-3")).unwrap(), json!(-3));
        assert_eq!(ArgType::Int.convert(&json!(7)).unwrap(), json!(7));
        assert!(ArgType::Int.convert(&json!("1.5")).is_err());
        assert!(ArgType::Int.convert(&json!("abc")).is_err());
    }

    #[test]
    fn test_unsigned_conversion() {
        assert_eq!(ArgType::UInt.convert(&json!("0")).unwrap(), json!(0));
        assert!(ArgType::UInt.convert(&json!("-1")).is_err());
        assert!(ArgType::PInt.convert(&json!("0")).is_err());
        assert_eq!(ArgType::PInt.convert(&json!("5")).unwrap(), json!(5));
    }

    #[test]
    fn test_bool_and_float_conversion() {
        assert_eq!(ArgType::Bool.convert(&json!("ON")).unwrap(), json!(true));
        assert_eq!(ArgType::Bool.convert(&json!("disabled")).unwrap(), json!(false));
        assert!(ArgType::Bool.convert(&json!("maybe")).is_err());
        assert_eq!(ArgType::Float.convert(&json!("2.5")).unwrap(), json!(2.5));
        assert_eq!(ArgType::Float.convert(&json!("1e3")).unwrap(), json!(1000.0));
        assert!(ArgType::Float.convert(&json!("nan")).is_err());
    }

    #[test]
    fn test_str_conversion_and_text() {
        assert_eq!(ArgType::Str.convert(&json!(13)).unwrap(), json!("13"));
        assert!(ArgType::Str.convert(&json!([1])).is_err());
        assert_eq!(to_text(&json!(true)), "true");
        assert_eq!(to_text(&json!(null)), "");
        assert_eq!(to_text(&json!("a b")), "a b");
    }

    fn reason(builder: SignatureBuilder) -> String {
        match builder.build() {
            Err(RouterError::InvalidSignature { reason, .. }) => reason,
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_signature_order_validation() {
        let err = reason(Signature::builder().keyword_only("d").positional("a"));
        assert!(err.contains("out of order"));

        let err = reason(
            Signature::builder()
                .param(Param::positional("a").default(1))
                .positional("b"),
        );
        assert!(err.contains("follows a parameter with a default"));

        let err = reason(Signature::builder().positional("a").receiver());
        assert!(err.contains("first positional"));
    }

    #[test]
    fn test_signature_error_names_handler() {
        let err = Signature::builder()
            .named("Bar.goo")
            .var_positional("a")
            .var_positional("b")
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            RouterError::InvalidSignature { handler, .. } if handler == "Bar.goo"
        ));
    }

    #[test]
    fn test_receiver_allows_positional_only_params() {
        let sig = Signature::builder()
            .receiver()
            .param(Param::positional_only("a").path())
            .positional("b")
            .build()
            .unwrap();
        assert!(sig.has_receiver());
        assert_eq!(sig.positional_names(), vec!["a", "b"]);
        assert_eq!(sig.positional_only_slot("a"), Some(0));
        assert_eq!(sig.positional_only_slot("b"), None);
        assert_eq!(sig.positional_only_slot("self"), None);
    }

    #[test]
    fn test_signature_helpers() {
        let sig = Signature::builder()
            .receiver()
            .positional_only("a")
            .param(Param::positional("b").typed(ArgType::Int))
            .var_positional("rest")
            .keyword_only("d")
            .var_keyword("extra")
            .build()
            .unwrap();
        assert!(sig.has_receiver());
        assert_eq!(sig.positional_names(), vec!["a", "b"]);
        assert_eq!(sig.var_positional().unwrap().name, "rest");
        assert_eq!(sig.var_keyword().unwrap().name, "extra");
        assert_eq!(sig.param("b").unwrap().ty, ArgType::Int);
    }
}
