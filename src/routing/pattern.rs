//! Path pattern compilation.
//!
//! # Responsibilities
//! - Parse `<name>` and `<type:name>` placeholders out of a pattern
//! - Build a full-match regex plus one converter per placeholder
//! - Render a pattern back into a path for reverse routing
//!
//! # Design Decisions
//! - Full match only, no prefix matching
//! - Matching runs on the percent-encoded path; captured values are decoded
//!   before conversion, and literals are encoded the same way at compile time
//! - A capture whose converter rejects it makes the whole route miss, so the
//!   next route gets a chance (first match wins)

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};

use crate::routing::args::{ArgType, ConversionError, Value, RECEIVER};
use crate::routing::codec::{decode_component, encode_path, encode_segment};
use crate::routing::error::{RouterError, RouterResult};

/// Maximum size of a compiled route regex.
const MAX_REGEX_SIZE: usize = 1 << 20;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"<(?:(?P<type>[^:<>]*):)?(?P<name>[^:<>]*)>").expect("static placeholder regex")
    })
}

fn name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:[A-Za-z_]\w*|\d+)$").expect("static name regex"))
}

/// Built-in placeholder types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderType {
    /// Any characters except `/`.
    Str,
    /// Greedy, may include `/`.
    Path,
    /// Optionally signed integer.
    Int,
    /// Non-negative integer.
    UInt,
    /// Strictly positive integer.
    PInt,
    /// Decimal with optional exponent.
    Float,
    /// `true` or `false` literal.
    Bool,
}

impl PlaceholderType {
    /// Look up a type tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "str" => Self::Str,
            "path" => Self::Path,
            "int" => Self::Int,
            "uint" => Self::UInt,
            "pint" => Self::PInt,
            "float" => Self::Float,
            "bool" => Self::Bool,
            _ => return None,
        })
    }

    pub fn tag(self) -> &'static str {
        match self {
            Self::Str => "str",
            Self::Path => "path",
            Self::Int => "int",
            Self::UInt => "uint",
            Self::PInt => "pint",
            Self::Float => "float",
            Self::Bool => "bool",
        }
    }

    /// Regex fragment matching this type.
    pub fn fragment(self) -> &'static str {
        match self {
            Self::Str => r"[^/]+",
            Self::Path => r".+",
            Self::Int => r"[+-]?\d+",
            Self::UInt => r"\d+",
            Self::PInt => r"[1-9]\d*",
            Self::Float => r"[+-]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][+-]?\d+)?",
            Self::Bool => r"true|false",
        }
    }

    fn arg_type(self) -> ArgType {
        match self {
            Self::Str | Self::Path => ArgType::Str,
            Self::Int => ArgType::Int,
            Self::UInt => ArgType::UInt,
            Self::PInt => ArgType::PInt,
            Self::Float => ArgType::Float,
            Self::Bool => ArgType::Bool,
        }
    }

    /// Convert matched (decoded) text.
    pub fn convert(self, text: &str) -> Result<Value, ConversionError> {
        match self {
            // Only the two literals reach here through the fragment.
            Self::Bool => match text {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(ConversionError {
                    expected: "bool",
                    value: text.to_string(),
                }),
            },
            other => other.arg_type().convert(&Value::String(text.to_string())),
        }
    }
}

/// What a placeholder binds to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PlaceholderKey {
    /// Keyword argument.
    Name(String),
    /// Positional slot.
    Index(usize),
    /// Dotted path of the owning instance.
    Receiver,
}

impl std::fmt::Display for PlaceholderKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Name(name) => write!(f, "{name}"),
            Self::Index(index) => write!(f, "{index}"),
            Self::Receiver => write!(f, "{RECEIVER}"),
        }
    }
}

/// One variable segment.
#[derive(Debug, Clone)]
pub struct Placeholder {
    pub key: PlaceholderKey,
    pub ty: PlaceholderType,
    group: String,
    validator: Regex,
}

impl Placeholder {
    /// Render a value for reverse routing, checking it would match again.
    fn render(&self, text: &str) -> Option<String> {
        let encoded = match self.ty {
            PlaceholderType::Path => encode_path(text),
            _ => encode_segment(text),
        };
        if self.validator.is_match(&encoded) && self.ty.convert(text).is_ok() {
            Some(encoded)
        } else {
            None
        }
    }
}

/// Pattern piece.
#[derive(Debug, Clone)]
pub enum Segment {
    Literal(String),
    Placeholder(Placeholder),
}

/// Compiled path pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    source: String,
    segments: Vec<Segment>,
    regex: Regex,
}

impl PathPattern {
    /// Compile a declarative pattern such as `/Foo/<a>/<int:b>`.
    pub fn compile(pattern: &str) -> RouterResult<Self> {
        if !pattern.starts_with('/') {
            return Err(RouterError::pattern(pattern, "pattern must start with '/'"));
        }

        let mut segments = Vec::new();
        let mut regex_str = String::from("^");
        let mut seen = HashSet::new();
        let mut last = 0;

        for caps in placeholder_re().captures_iter(pattern) {
            let whole = caps.get(0).map_or(0..0, |m| m.range());
            push_literal(pattern, &pattern[last..whole.start], &mut segments, &mut regex_str)?;
            last = whole.end;

            let tag = caps.name("type").map_or("str", |m| m.as_str());
            let name = caps.name("name").map_or("", |m| m.as_str());
            if !name_re().is_match(name) {
                return Err(RouterError::pattern(
                    pattern,
                    format!("invalid placeholder name {name:?}"),
                ));
            }
            let ty = PlaceholderType::from_tag(tag).ok_or_else(|| {
                RouterError::pattern(pattern, format!("unknown placeholder type {tag:?}"))
            })?;
            let key = if name == RECEIVER {
                PlaceholderKey::Receiver
            } else if let Ok(index) = name.parse::<usize>() {
                PlaceholderKey::Index(index)
            } else if name.bytes().all(|b| b.is_ascii_digit()) {
                return Err(RouterError::pattern(pattern, format!("index {name} out of range")));
            } else {
                PlaceholderKey::Name(name.to_string())
            };
            if !seen.insert(key.clone()) {
                return Err(RouterError::pattern(
                    pattern,
                    format!("duplicate placeholder {name:?}"),
                ));
            }

            let group = format!("p{}", seen.len() - 1);
            regex_str.push_str(&format!("(?P<{}>{})", group, ty.fragment()));
            let validator = Regex::new(&format!("^(?:{})$", ty.fragment()))
                .map_err(|e| RouterError::pattern(pattern, e.to_string()))?;
            segments.push(Segment::Placeholder(Placeholder {
                key,
                ty,
                group,
                validator,
            }));
        }
        push_literal(pattern, &pattern[last..], &mut segments, &mut regex_str)?;
        regex_str.push('$');

        let regex = RegexBuilder::new(&regex_str)
            .size_limit(MAX_REGEX_SIZE)
            .build()
            .map_err(|e| RouterError::pattern(pattern, format!("cannot compile: {e}")))?;

        Ok(Self {
            source: pattern.to_string(),
            segments,
            regex,
        })
    }

    /// Original pattern text.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Placeholders in pattern order.
    pub fn placeholders(&self) -> impl Iterator<Item = &Placeholder> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(p) => Some(p),
            Segment::Literal(_) => None,
        })
    }

    pub fn has_receiver(&self) -> bool {
        self.placeholders()
            .any(|p| p.key == PlaceholderKey::Receiver)
    }

    /// Full-match an encoded path, returning converted captures.
    ///
    /// Returns `None` when the path does not match, a capture is not valid
    /// UTF-8 once unescaped, or a capture fails its converter.
    pub fn matches(&self, path: &str) -> Option<Vec<(PlaceholderKey, Value)>> {
        let caps = self.regex.captures(path)?;
        let mut out = Vec::new();
        for p in self.placeholders() {
            let raw = caps.name(&p.group)?.as_str();
            let text = decode_component(raw).ok()?;
            let value = p.ty.convert(&text).ok()?;
            out.push((p.key.clone(), value));
        }
        Some(out)
    }

    /// Build a path by asking `fill` for each placeholder's text.
    ///
    /// `fill` returns `Ok(None)` when the call has no value for the
    /// placeholder; that becomes `UnknownArgument`. A value that would not
    /// match the placeholder again becomes `ArgumentType`.
    pub fn render<F>(&self, handler: &str, mut fill: F) -> RouterResult<String>
    where
        F: FnMut(&PlaceholderKey) -> RouterResult<Option<String>>,
    {
        let mut path = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => path.push_str(text),
                Segment::Placeholder(p) => {
                    let text = fill(&p.key)?.ok_or_else(|| RouterError::UnknownArgument {
                        handler: handler.to_string(),
                        name: p.key.to_string(),
                    })?;
                    let rendered = p.render(&text).ok_or_else(|| RouterError::ArgumentType {
                        handler: handler.to_string(),
                        name: p.key.to_string(),
                        expected: p.ty.tag(),
                        value: text.clone(),
                    })?;
                    path.push_str(&rendered);
                }
            }
        }
        Ok(path)
    }
}

impl std::fmt::Display for PathPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)
    }
}

fn push_literal(
    pattern: &str,
    literal: &str,
    segments: &mut Vec<Segment>,
    regex_str: &mut String,
) -> RouterResult<()> {
    if literal.is_empty() {
        return Ok(());
    }
    if literal.contains('<') || literal.contains('>') {
        return Err(RouterError::pattern(pattern, "unbalanced '<' or '>'"));
    }
    let encoded = encode_path(literal);
    regex_str.push_str(&regex::escape(&encoded));
    segments.push(Segment::Literal(encoded));
    Ok(())
}
