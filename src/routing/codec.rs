//! URL codec.
//!
//! # Responsibilities
//! - Split a plugin URL into scheme, host, path, query multimap and fragment
//! - Percent-encode path segments and form-encode query pairs
//! - Encode and decode the opaque argument bundle
//!
//! # Wire Format
//! ```text
//! scheme://host/path?key=value&key=value&_=<opaque>#fragment
//!
//! opaque = base64url(gzip(json({name: value, ...}))) with '=' stripped
//! ```
//!
//! # Design Decisions
//! - The path is never normalized: dot segments and escapes survive as-is so
//!   that reverse and forward routing stay exact inverses
//! - Padding is restored from `len % 4` on decode

use std::collections::BTreeMap;
use std::io::{Read, Write};

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use url::form_urlencoded;

use crate::routing::args::Value;
use crate::routing::error::{RouterError, RouterResult};

/// Characters escaped inside a single path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'/');

/// Same as `SEGMENT` but keeps `/`.
const PATH: &AsciiSet = &SEGMENT.remove(b'/');

/// Escape one path segment (`/` included).
pub fn encode_segment(text: &str) -> String {
    utf8_percent_encode(text, SEGMENT).to_string()
}

/// Escape a multi-segment path (`/` kept).
pub fn encode_path(text: &str) -> String {
    utf8_percent_encode(text, PATH).to_string()
}

/// Undo path escaping. Escapes that decode to invalid UTF-8 are rejected.
pub fn decode_component(text: &str) -> RouterResult<String> {
    percent_decode_str(text)
        .decode_utf8()
        .map(|text| text.into_owned())
        .map_err(|e| RouterError::InvalidUrl {
            url: text.to_string(),
            reason: e.to_string(),
        })
}

/// Ordered query multimap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pairs: Vec<(String, String)>,
}

impl Query {
    /// Parse a form-encoded query string (without `?`).
    pub fn parse(query: &str) -> Self {
        Self {
            pairs: form_urlencoded::parse(query.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        }
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// All values of `key`, in order.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Last value of `key`.
    pub fn get<'a>(&'a self, key: &'a str) -> Option<&'a str> {
        self.get_all(key).last()
    }

    /// Remove every pair for `key`, returning the last value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let mut last = None;
        self.pairs.retain(|(k, v)| {
            if k == key {
                last = Some(v.clone());
                false
            } else {
                true
            }
        });
        last
    }

    /// Single-valued view: the last value wins for repeated keys.
    pub fn args(&self) -> BTreeMap<String, String> {
        self.pairs.iter().cloned().collect()
    }
}

/// URL parsed once per dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    pub scheme: String,
    pub host: String,
    /// Still percent-encoded; always starts with `/` when non-empty.
    pub path: String,
    pub query: Query,
    pub fragment: Option<String>,
}

impl ParsedRequest {
    /// Split a URL of the shape `scheme://host/path?query#fragment`.
    ///
    /// Every part is optional; a bare `/path?x=1` parses with an empty
    /// scheme and host.
    pub fn parse(url: &str) -> RouterResult<Self> {
        let (link, fragment) = match url.split_once('#') {
            Some((link, fragment)) => (link, Some(fragment.to_string())),
            None => (url, None),
        };
        let (link, query) = link.split_once('?').unwrap_or((link, ""));
        let (scheme, rest) = match link.split_once("://") {
            Some((scheme, rest)) => (scheme, rest),
            None if link.starts_with('/') => ("", link),
            None => {
                return Err(RouterError::InvalidUrl {
                    url: url.to_string(),
                    reason: "missing scheme separator".into(),
                })
            }
        };
        let (host, path) = match rest.find('/') {
            Some(0) if scheme.is_empty() => ("", rest),
            Some(at) => (&rest[..at], &rest[at..]),
            None => (rest, ""),
        };
        let host = host.rsplit('@').next().unwrap_or(host);
        Ok(Self {
            scheme: scheme.to_string(),
            host: host.to_string(),
            path: path.to_string(),
            query: Query::parse(query),
            fragment,
        })
    }

    /// `scheme://host/path` without query.
    pub fn link(&self) -> String {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        format!("{}://{}{}", self.scheme, self.host, path)
    }
}

/// Assemble `base` + `path` + query pairs.
///
/// `base` is `scheme://host` (a trailing path on it is replaced).
pub fn assemble_url(base: &str, path: &str, pairs: &[(String, String)]) -> String {
    let origin = match base.find("://") {
        Some(at) => {
            let after = at + 3;
            match base[after..].find('/') {
                Some(slash) => &base[..after + slash],
                None => base,
            }
        }
        None => base.trim_end_matches('/'),
    };
    let mut url = format!("{origin}{path}");
    if !pairs.is_empty() {
        let mut query = form_urlencoded::Serializer::new(String::new());
        for (k, v) in pairs {
            query.append_pair(k, v);
        }
        url.push('?');
        url.push_str(&query.finish());
    }
    url
}

/// Serialize, compress and base64url-encode an opaque argument map.
pub fn encode_opaque(values: &BTreeMap<String, Value>) -> RouterResult<String> {
    let json = serde_json::to_vec(values).map_err(|e| RouterError::OpaqueDecode(e.to_string()))?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    let compressed = encoder.finish()?;
    let mut text = URL_SAFE.encode(compressed);
    text.truncate(text.trim_end_matches('=').len());
    Ok(text)
}

/// Reverse of `encode_opaque`.
pub fn decode_opaque(text: &str) -> RouterResult<BTreeMap<String, Value>> {
    let mut padded = text.trim().to_string();
    let rem = padded.len() % 4;
    if rem != 0 {
        padded.extend(std::iter::repeat('=').take(4 - rem));
    }
    let compressed = URL_SAFE
        .decode(padded.as_bytes())
        .map_err(|e| RouterError::OpaqueDecode(format!("base64: {e}")))?;
    let mut json = Vec::new();
    GzDecoder::new(compressed.as_slice())
        .read_to_end(&mut json)
        .map_err(|e| RouterError::OpaqueDecode(format!("gzip: {e}")))?;
    serde_json::from_slice(&json).map_err(|e| RouterError::OpaqueDecode(format!("json: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_parse_plugin_url() {
        let req = ParsedRequest::parse("plugin://plugin.video.x/Foo/11/12?c=13&d=14&c=15#frag")
            .unwrap();
        assert_eq!(req.scheme, "plugin");
        assert_eq!(req.host, "plugin.video.x");
        assert_eq!(req.path, "/Foo/11/12");
        assert_eq!(req.query.get("c"), Some("15"));
        assert_eq!(req.query.get_all("c").collect::<Vec<_>>(), vec!["13", "15"]);
        assert_eq!(req.fragment.as_deref(), Some("frag"));
        assert_eq!(req.link(), "plugin://plugin.video.x/Foo/11/12");
    }

    #[test]
    fn test_parse_without_path_or_scheme() {
        let req = ParsedRequest::parse("plugin://plugin.video.x").unwrap();
        assert_eq!(req.path, "");
        assert!(req.query.is_empty());

        let req = ParsedRequest::parse("/a/b?x=a+b").unwrap();
        assert_eq!(req.host, "");
        assert_eq!(req.path, "/a/b");
        assert_eq!(req.query.get("x"), Some("a b"));

        assert!(ParsedRequest::parse("not a url").is_err());
    }

    #[test]
    fn test_path_is_not_normalized() {
        let req = ParsedRequest::parse("plugin://x/a/../b/./c").unwrap();
        assert_eq!(req.path, "/a/../b/./c");
    }

    #[test]
    fn test_assemble_url() {
        let pairs = vec![("c".to_string(), "1 3".to_string()), ("d".to_string(), "&".to_string())];
        assert_eq!(
            assemble_url("plugin://plugin.video.x", "/Foo/11", &pairs),
            "plugin://plugin.video.x/Foo/11?c=1+3&d=%26"
        );
        assert_eq!(
            assemble_url("plugin://plugin.video.x/old/path", "/new", &[]),
            "plugin://plugin.video.x/new"
        );
    }

    #[test]
    fn test_query_get_with_short_lived_key() {
        let query = Query::parse("k=1&k=2");
        let key = String::from("k");
        let value = query.get(&key);
        assert_eq!(value, Some("2"));
    }

    #[test]
    fn test_query_remove() {
        let mut query = Query::parse("_=abc&x=1&_=def");
        assert_eq!(query.remove("_").as_deref(), Some("def"));
        assert_eq!(query.pairs(), &[("x".to_string(), "1".to_string())]);
        assert_eq!(query.args().get("x").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_opaque_strips_padding() {
        let mut values = BTreeMap::new();
        values.insert("z".to_string(), json!({"nested": [1, 2.5, null, "s"]}));
        let text = encode_opaque(&values).unwrap();
        assert!(!text.contains('='));
        assert!(!text.contains('+') && !text.contains('/'));
        assert_eq!(decode_opaque(&text).unwrap(), values);
    }

    #[test]
    fn test_opaque_rejects_garbage() {
        assert!(matches!(
            decode_opaque("!!!"),
            Err(RouterError::OpaqueDecode(_))
        ));
        assert!(matches!(
            decode_opaque("aGVsbG8"),
            Err(RouterError::OpaqueDecode(_))
        ));
    }

    #[test]
    fn test_segment_escaping() {
        assert_eq!(encode_segment("a/b c"), "a%2Fb%20c");
        assert_eq!(encode_path("a/b c"), "a/b%20c");
        assert_eq!(decode_component("a%2Fb%20c").unwrap(), "a/b c");
        assert!(matches!(
            decode_component("caf%E9"),
            Err(RouterError::InvalidUrl { .. })
        ));
    }

    fn leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            ".{0,12}".prop_map(Value::String),
        ]
    }

    proptest! {
        #[test]
        fn prop_opaque_round_trip(
            entries in proptest::collection::btree_map("[a-z]{1,6}", leaf(), 0..6),
            list in proptest::collection::vec(leaf(), 0..5),
        ) {
            let mut values = entries;
            values.insert("list".to_string(), Value::Array(list));
            let text = encode_opaque(&values).unwrap();
            prop_assert_eq!(decode_opaque(&text).unwrap(), values);
        }
    }
}
