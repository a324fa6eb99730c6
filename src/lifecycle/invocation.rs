//! Host invocation arguments.

use thiserror::Error;

/// Handle value when the host passes none (script-style invocation).
pub const NO_HANDLE: i32 = -1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvocationError {
    #[error("missing plugin URL argument")]
    MissingUrl,

    #[error("invalid handle {0:?}")]
    InvalidHandle(String),
}

/// One host call: `program <plugin-url> <handle> <?query> [resume:<bool>]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInvocation {
    /// `scheme://host/path` as passed by the host.
    pub base: String,
    pub handle: i32,
    /// Query string without the leading `?`.
    pub query: String,
    pub resume: Option<bool>,
}

impl HostInvocation {
    /// Parse process arguments (the program name included).
    pub fn from_args<I>(args: I) -> Result<Self, InvocationError>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut args = args.into_iter().map(Into::into).skip(1);
        let base = args.next().ok_or(InvocationError::MissingUrl)?;
        if base.is_empty() {
            return Err(InvocationError::MissingUrl);
        }
        let handle = match args.next() {
            Some(text) if !text.is_empty() => text
                .parse()
                .map_err(|_| InvocationError::InvalidHandle(text.clone()))?,
            _ => NO_HANDLE,
        };
        let query = args
            .next()
            .map(|q| q.trim_start_matches('?').to_string())
            .unwrap_or_default();
        let resume = args
            .next()
            .and_then(|flag| flag.strip_prefix("resume:").map(|v| v.eq_ignore_ascii_case("true")));
        Ok(Self {
            base,
            handle,
            query,
            resume,
        })
    }

    /// Full URL to dispatch.
    pub fn url(&self) -> String {
        if self.query.is_empty() {
            self.base.clone()
        } else {
            format!("{}?{}", self.base, self.query)
        }
    }

    /// Started from a directory listing (has a handle) rather than as a script.
    pub fn has_handle(&self) -> bool {
        self.handle != NO_HANDLE
    }
}
